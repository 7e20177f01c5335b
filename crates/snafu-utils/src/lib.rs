//! Error plumbing shared by the workspace crates.
//!
//! - [`Location`]: the source location of a call, captured implicitly through
//!   `#[track_caller]` by snafu context selectors.
//! - [`GenericError`]: a stringly typed error for application code.
//! - [`Report`]: multi-line rendering of an error and its sources.

#![no_std]

extern crate alloc;

use alloc::{boxed::Box, string::String};
use core::{error::Error, fmt, panic};

use ansi_term::{Color, WithFg};
use snafu::{GenerateImplicitData, Snafu};

/// Source location (`file:line`) of the code that triggered an error.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl Location {
    /// Captures the location of the caller.
    ///
    /// Inside a `#[track_caller]` function this is the location of the
    /// outermost caller in the chain.
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Formats as `file:line`.
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file(), self.line())
    }
}

#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
pub struct GenericError {
    message: String,
    #[snafu(implicit)]
    location: Location,
    #[snafu(source(from(Box<dyn core::error::Error>, Some)))]
    source: Option<Box<dyn core::error::Error>>,
}

impl GenericError {
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }
}

fn location_of(error: &(dyn Error + 'static)) -> Option<Location> {
    error
        .downcast_ref::<GenericError>()
        .map(GenericError::location)
}

/// Renders an error followed by its chain of sources.
///
/// ```text
/// Error: coalescing test failed
///   at crates/memgrind/src/memtest.rs:120
///
/// Caused by:
///    0: not enough memory to allocate 104 bytes
/// ```
pub struct Report<E> {
    error: E,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", WithFg::new(Color::Red, &self.error))?;
        if let Some(loc) = location_of(&self.error) {
            writeln!(f, "  at {}", WithFg::regular(Color::DarkGray, loc))?;
        }
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {}", WithFg::new(Color::Red, s))?;
            if let Some(loc) = location_of(s) {
                writeln!(f, "      at {}", WithFg::regular(Color::DarkGray, loc))?;
            }
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{format, string::ToString as _};

    use snafu::{ResultExt as _, whatever};

    use super::*;

    #[track_caller]
    fn tracked() -> Location {
        Location::caller()
    }

    #[test]
    fn location_points_at_the_outermost_caller() {
        let expected_line = line!() + 1;
        let loc = tracked();
        assert_eq!(loc.file(), file!());
        assert_eq!(loc.line(), expected_line);
        assert_eq!(loc.to_string(), format!("{}:{expected_line}", file!()));
    }

    fn failing() -> Result<(), GenericError> {
        whatever!("inner failure");
    }

    fn wrapping() -> Result<(), GenericError> {
        failing().whatever_context("outer failure")
    }

    #[test]
    fn report_lists_sources() {
        ansi_term::set_enabled(false);
        let Err(err) = wrapping() else {
            panic!("expected an error");
        };
        let report = Report::new(err).to_string();
        let lines = report.lines().collect::<std::vec::Vec<_>>();
        assert_eq!(lines[0], "Error: outer failure");
        assert!(lines[1].starts_with("  at "));
        assert_eq!(lines[3], "Caused by:");
        assert_eq!(lines[4], "   0: inner failure");
        assert!(lines[5].starts_with("      at "));
    }
}
