//! Rename command

use anyhow::Result;
use std::path::Path;

use super::{Session, parse_ids};

/// Give an addon a custom name, or restore its title
pub async fn rename(
    session: &Session,
    game_root: Option<&Path>,
    id: &str,
    name: Option<String>,
) -> Result<()> {
    let id = parse_ids(&[id.to_string()])?.remove(0);
    let ctx = session.context(game_root)?;

    ctx.registry.rename(id.clone(), name).await?;
    if let Some(addon) = ctx.registry.get(id).await? {
        session
            .output
            .success(&format!("{} is now shown as '{}'", addon.id, addon.display_name()));
    }
    session.output.wait_async().await;
    Ok(())
}
