//! Addon tables for `list`, `search` and `orphans`.

use super::theme::{Theme, format_size};
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};
use lam_core::store::{ArchiveInfo, ArchiveKind};
use lam_schema::Addon;

fn base_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::DarkGrey)));
    table
}

/// One row per registry entry: state, id, name, size, install date.
pub fn addon_table<'a>(addons: impl IntoIterator<Item = &'a Addon>) -> Table {
    let icons = Theme::default().icons;
    let mut table = base_table(&["", "ID", "NAME", "SIZE", "INSTALLED"]);
    for addon in addons {
        let (icon, color) = if addon.is_broken() {
            (icons.warning, Color::Yellow)
        } else if addon.enabled {
            (icons.enabled, Color::Green)
        } else {
            (icons.disabled, Color::DarkGrey)
        };
        let mut name = addon.display_name().to_string();
        if addon.is_broken() {
            name.push_str(" (missing archive)");
        }
        table.add_row(vec![
            Cell::new(icon).fg(color),
            Cell::new(addon.id.as_str()),
            Cell::new(name).fg(Color::Cyan),
            Cell::new(format_size(addon.size_bytes))
                .fg(Color::DarkGrey)
                .set_alignment(CellAlignment::Right),
            Cell::new(addon.installed_at.format("%Y-%m-%d")).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Untracked archives found on disk.
pub fn orphan_table(orphans: &[ArchiveInfo]) -> Table {
    let mut table = base_table(&["ID", "FILE", "SIZE", "KIND"]);
    for info in orphans {
        let file = info
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = match info.kind {
            ArchiveKind::Vpk => Cell::new("vpk"),
            ArchiveKind::Unknown => Cell::new("unrecognized").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(info.id.as_str()),
            Cell::new(file),
            Cell::new(format_size(info.size_bytes))
                .fg(Color::DarkGrey)
                .set_alignment(CellAlignment::Right),
            kind,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lam_schema::{AddonId, AddonSource, AddonStatus};
    use std::path::PathBuf;

    fn addon(id: &str, enabled: bool, status: AddonStatus) -> Addon {
        Addon {
            id: id.parse::<AddonId>().unwrap(),
            title: format!("Addon {id}"),
            custom_name: None,
            archive_path: PathBuf::from(format!("/x/{id}.vpk")),
            size_bytes: 2048,
            installed_at: Utc::now(),
            enabled,
            source: AddonSource::Local,
            status,
        }
    }

    #[test]
    fn test_addon_table_rows() {
        let rows = [
            addon("1", true, AddonStatus::Ok),
            addon("2", false, AddonStatus::Broken),
        ];
        let rendered = addon_table(&rows).to_string();
        assert!(rendered.contains("Addon 1"));
        assert!(rendered.contains("(missing archive)"));
        assert!(rendered.contains("2.0 KB"));
    }
}
