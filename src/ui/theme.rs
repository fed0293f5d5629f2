use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for CLI output.
///
/// Tables and reports go to stdout, `error` and `warn` go to stderr, so each
/// group is colored only when its own stream accepts colors.
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub info: Style,
    pub dim: Style,
    pub error: Style,
    pub warn: Style,
}

impl Theme {
    pub fn detect() -> Self {
        Self::for_streams(console::colors_enabled(), console::colors_enabled_stderr())
    }

    pub fn plain() -> Self {
        Self::for_streams(false, false)
    }

    fn for_streams(stdout: bool, stderr: bool) -> Self {
        let pick = |enabled: bool, style: Style| if enabled { style } else { Style::new() };
        Self {
            header: pick(stdout, Style::new().cyan().bold()),
            success: pick(stdout, Style::new().green().bold()),
            info: pick(stdout, Style::new().magenta()),
            dim: pick(stdout, Style::new().dimmed()),
            error: pick(stderr, Style::new().red().bold()),
            warn: pick(stderr, Style::new().yellow().bold()),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
