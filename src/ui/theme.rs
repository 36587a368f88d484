use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles used by the progress renderer and the report printers
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
    /// Relation kind labels
    pub relation: Style,
}

impl Theme {
    fn new(colored: bool) -> Self {
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            header: pick(Style::new().cyan().bold()),
            success: pick(Style::new().green().bold()),
            error: pick(Style::new().red().bold()),
            warn: pick(Style::new().yellow().bold()),
            info: pick(Style::new().magenta()),
            dim: pick(Style::new().dimmed()),
            relation: pick(Style::new().blue().bold()),
        }
    }
}

/// Colored on a terminal unless `NO_COLOR` is set
pub fn theme() -> &'static Theme {
    THEME.get_or_init(|| {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Theme::new(!no_color && console::Term::stdout().is_term())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use owo_colors::OwoColorize;

    #[test]
    fn test_plain_theme_has_no_styling() {
        let plain = Theme::new(false);
        assert_eq!(format!("{}", "x".style(plain.relation)), "x");
        assert_ne!(format!("{}", "x".style(Theme::new(true).relation)), "x");
    }
}
