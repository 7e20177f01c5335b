//! Deliberate misuse and leaks, meant to be run in a child process.

use std::str::FromStr;

use arrayvec::ArrayVec;
use snafu::{OptionExt as _, ensure_whatever, whatever};
use snafu_utils::GenericError;
use static_heap::HeapPtr;

use crate::heap::{free, malloc};

/// The ways `free` can be called with a bad reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misuse {
    /// A reference that was never returned by `malloc`.
    InvalidPointer,
    /// A reference into the middle of an allocation.
    NotChunkStart,
    /// The same reference released twice.
    DoubleFree,
}

impl FromStr for Misuse {
    type Err = GenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let misuse = match s {
            "invalid-pointer" => Self::InvalidPointer,
            "not-chunk-start" => Self::NotChunkStart,
            "double-free" => Self::DoubleFree,
            _ => {
                whatever!(
                    "unknown misuse `{s}`, expected one of invalid-pointer, not-chunk-start, double-free"
                );
            }
        };
        Ok(misuse)
    }
}

/// Performs `misuse`.
///
/// Only returns if the misuse went undetected.
pub fn misuse(misuse: Misuse) -> Result<(), GenericError> {
    match misuse {
        Misuse::InvalidPointer => {
            // An offset past the end of the arena cannot belong to any block.
            let _keep = malloc(8).whatever_context("allocation failed")?;
            info!("attempting to free an invalid pointer");
            free(Some(HeapPtr::from_offset(1 << 20)));
        }
        Misuse::NotChunkStart => {
            let ptr = malloc(2 * size_of::<i32>()).whatever_context("allocation failed")?;
            info!("attempting to free a pointer not at the start of the allocated chunk");
            free(Some(ptr.byte_add(size_of::<i32>())));
        }
        Misuse::DoubleFree => {
            let ptr = malloc(100 * size_of::<i32>()).whatever_context("allocation failed")?;
            info!("attempting to free the same pointer twice");
            free(Some(ptr));
            free(Some(ptr));
        }
    }
    whatever!("{misuse:?} was not detected");
}

/// Allocates `objects` blocks of `size` bytes and never frees them.
pub fn leak(objects: usize, size: usize) -> Result<(), GenericError> {
    const MAX_OBJECTS: usize = 512;

    ensure_whatever!(
        objects <= MAX_OBJECTS,
        "at most {MAX_OBJECTS} objects can be leaked, got {objects}"
    );
    let mut leaked = ArrayVec::<HeapPtr, MAX_OBJECTS>::new();
    for i in 0..objects {
        let ptr = malloc(size).with_whatever_context(|| format!("unable to allocate object {i}"))?;
        leaked.push(ptr);
    }
    info!("leaking {} objects of {size} bytes", leaked.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_misuse() {
        assert_eq!(
            "invalid-pointer".parse::<Misuse>().unwrap(),
            Misuse::InvalidPointer
        );
        assert_eq!(
            "not-chunk-start".parse::<Misuse>().unwrap(),
            Misuse::NotChunkStart
        );
        assert_eq!("double-free".parse::<Misuse>().unwrap(), Misuse::DoubleFree);
        assert!("use-after-free".parse::<Misuse>().is_err());
    }
}
