//! Minimal ANSI escape sequence helpers for terminal output.
//!
//! Styling can be switched off process-wide with [`set_enabled`], which is
//! what callers do when the output stream is not a terminal so that the text
//! stays machine readable.

#![no_std]

use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turns escape sequences on or off for every [`WithFg`] in the process.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Returns `true` if escape sequences are currently emitted.
#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    DarkGray,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Default,
}

impl Color {
    fn fg(self) -> u8 {
        match self {
            Self::DarkGray => 90,
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
            Self::Cyan => 36,
            Self::Default => 39,
        }
    }
}

/// A value rendered with a foreground color.
pub struct WithFg<T> {
    color: Color,
    bold: bool,
    value: T,
}

impl<T> fmt::Display for WithFg<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = &self.value;
        if !is_enabled() {
            return write!(f, "{value}");
        }
        let fg = self.color.fg();
        if self.bold {
            write!(f, "\x1B[{fg};1m{value}\x1B[0m")
        } else {
            write!(f, "\x1B[{fg}m{value}\x1B[0m")
        }
    }
}

impl<T> WithFg<T> {
    /// Bold text in `color`.
    pub fn new(color: Color, value: T) -> Self {
        Self {
            color,
            bold: true,
            value,
        }
    }

    /// Regular weight text in `color`.
    pub fn regular(color: Color, value: T) -> Self {
        Self {
            color,
            bold: false,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;

    use super::*;

    // Single test because the switch is process-wide and tests run in parallel.
    #[test]
    fn switch_controls_escape_sequences() {
        assert_eq!(
            format!("{}", WithFg::new(Color::Red, "boom")),
            "\x1B[31;1mboom\x1B[0m"
        );
        assert_eq!(
            format!("{}", WithFg::regular(Color::DarkGray, 42)),
            "\x1B[90m42\x1B[0m"
        );

        set_enabled(false);
        assert!(!is_enabled());
        assert_eq!(format!("{}", WithFg::new(Color::Red, "boom")), "boom");

        set_enabled(true);
        assert!(is_enabled());
    }
}
