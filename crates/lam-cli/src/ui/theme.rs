//! UI Theme - Design system constants
//!
//! Colors and icons shared by every command's output.

use crossterm::style::Color;

/// Default theme for lam output
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
}

/// Color scheme for UI elements
#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Addon names (primary content)
    pub name: Color,
    /// Addon ids
    pub id: Color,
    /// Sizes, dates and secondary info
    pub secondary: Color,
    /// Section headers and labels
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    /// In-progress downloads
    pub active: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            name: Color::Cyan,
            id: Color::White,
            secondary: Color::DarkGrey,
            header: Color::DarkGrey,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            active: Color::Blue,
        }
    }
}

/// Status icons
#[derive(Debug, Clone)]
pub struct Icons {
    /// Disabled addon (○)
    pub disabled: &'static str,
    /// Enabled addon / active download (●)
    pub enabled: &'static str,
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    /// Skipped item (–)
    pub skipped: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            disabled: "○",
            enabled: "●",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
            skipped: "–",
        }
    }
}

/// Format bytes for human-readable display
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024 * 5), "5.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_theme_defaults() {
        let theme = Theme::default();
        assert_eq!(theme.icons.success, "✓");
        assert_eq!(theme.icons.enabled, "●");
    }
}
