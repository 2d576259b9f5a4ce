use crate::pipeline::{DisplayLine, Tint};
use crossterm::style::{style, Color, Stylize};
use std::io::Write;
use tracing::debug;

/// Where rendered event lines go.
pub trait Console: Send + Sync {
    fn emit(&self, line: &DisplayLine);
}

/// Coloured lines on stdout.
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn emit(&self, line: &DisplayLine) {
        let color = match line.tint {
            Tint::Red => Color::Red,
            Tint::Green => Color::Green,
            Tint::Blue => Color::Blue,
            Tint::Magenta => Color::Magenta,
            Tint::Cyan => Color::Cyan,
        };

        let mut styled = style(line.text.as_str()).with(color);
        if line.bold {
            styled = styled.bold();
        }

        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", styled) {
            debug!("Failed to write console line: {}", e);
        }
    }
}
