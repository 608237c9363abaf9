use std::env;

use color_eyre::owo_colors::OwoColorize;
use yoink_core::CommandStatus;

pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(force_no_color: bool, is_tty: bool) -> Self {
        let env_no_color = env::var_os("NO_COLOR").is_some();
        Self {
            enabled: !(force_no_color || env_no_color) && is_tty,
        }
    }

    pub fn status(&self, status: &CommandStatus, text: &str) -> String {
        let (symbol, tone) = match status {
            CommandStatus::Ok => ("✔", Tone::Green),
            CommandStatus::UserError => ("✗", Tone::Yellow),
            CommandStatus::Failure => ("✖", Tone::Red),
        };
        let line = format!("yoink ▸ {symbol} {text}");
        self.paint(&line, tone, true)
    }

    pub fn hint(&self, hint: &str) -> String {
        if !self.enabled {
            return format!("yoink ▸ Hint: {hint}");
        }
        let prefix = "yoink ▸ Hint:".cyan().bold().to_string();
        format!("{prefix} {hint}")
    }

    /// Backend output, indented under the error line.
    pub fn diagnostics(&self, text: &str) -> String {
        let body = text
            .lines()
            .map(|line| format!("    {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        if !self.enabled {
            return body;
        }
        body.dimmed().to_string()
    }

    fn paint(&self, text: &str, tone: Tone, bold: bool) -> String {
        if !self.enabled {
            return text.to_string();
        }
        match (tone, bold) {
            (Tone::Green, true) => text.green().bold().to_string(),
            (Tone::Green, false) => text.green().to_string(),
            (Tone::Yellow, true) => text.yellow().bold().to_string(),
            (Tone::Yellow, false) => text.yellow().to_string(),
            (Tone::Red, true) => text.red().bold().to_string(),
            (Tone::Red, false) => text.red().to_string(),
        }
    }
}

enum Tone {
    Green,
    Yellow,
    Red,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_style_has_no_escapes() {
        let style = Style::new(true, true);
        assert_eq!(
            style.status(&CommandStatus::Failure, "boom"),
            "yoink ▸ ✖ boom"
        );
        assert_eq!(style.diagnostics("a\nb"), "    a\n    b");
        assert_eq!(style.hint("retry"), "yoink ▸ Hint: retry");
    }

    #[test]
    fn non_tty_disables_color() {
        let style = Style::new(false, false);
        assert!(!style.status(&CommandStatus::Ok, "done").contains('\x1b'));
    }
}
