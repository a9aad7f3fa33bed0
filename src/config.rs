//! Pagination settings.

use std::fmt;
use std::str::FromStr;

/// How stylesheets are treated in produced sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum, serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "lowercase"))]
pub enum CssMode {
    /// Inline linked stylesheets as `<style>` blocks, otherwise leave markup alone.
    #[default]
    Keep,
    /// Strip stylesheets and flatten tables into plain rows.
    Omit,
    /// Fold `<style>` rules into `style` attributes of the matching tags.
    Distribute,
}

impl CssMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CssMode::Keep => "keep",
            CssMode::Omit => "omit",
            CssMode::Distribute => "distribute",
        }
    }
}

impl fmt::Display for CssMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CssMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(CssMode::Keep),
            "omit" => Ok(CssMode::Omit),
            "distribute" => Ok(CssMode::Distribute),
            other => Err(format!("unknown css mode: {other}")),
        }
    }
}

/// Settings for one reading session.
///
/// ```
/// use folio::{Config, CssMode};
///
/// let config = Config::default()
///     .with_max_content(2000)
///     .with_text_content(true)
///     .with_css_mode(CssMode::Omit);
/// assert!(config.is_budgeted());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    /// Maximum text length (bytes) per section; `0` means unlimited.
    pub max_content_per_section: usize,
    /// Also produce a tag-stripped copy of every section.
    pub include_text_content: bool,
    pub css_mode: CssMode,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_content(mut self, max: usize) -> Self {
        self.max_content_per_section = max;
        self
    }

    pub fn with_text_content(mut self, include: bool) -> Self {
        self.include_text_content = include;
        self
    }

    pub fn with_css_mode(mut self, mode: CssMode) -> Self {
        self.css_mode = mode;
        self
    }

    /// Whether sections are split by the content budget.
    pub fn is_budgeted(&self) -> bool {
        self.max_content_per_section != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_mode_from_str() {
        assert_eq!("keep".parse::<CssMode>(), Ok(CssMode::Keep));
        assert_eq!("OMIT".parse::<CssMode>(), Ok(CssMode::Omit));
        assert_eq!(" distribute ".parse::<CssMode>(), Ok(CssMode::Distribute));
        assert!("inline".parse::<CssMode>().is_err());
    }

    #[test]
    fn test_css_mode_display_roundtrips() {
        for mode in [CssMode::Keep, CssMode::Omit, CssMode::Distribute] {
            assert_eq!(mode.to_string().parse::<CssMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_default_config_is_unlimited() {
        let config = Config::default();
        assert_eq!(config.max_content_per_section, 0);
        assert!(!config.include_text_content);
        assert_eq!(config.css_mode, CssMode::Keep);
        assert!(!config.is_budgeted());
    }
}
