//! Errors reported by [`Heap`](crate::Heap).
//!
//! [`AcquireError`] is the recoverable capacity exhaustion case.
//! [`ReleaseError`] reports caller misuse; the engine leaves its state
//! untouched and it is up to the application to decide how fatal that is.

use core::fmt;

use snafu::Snafu;
use snafu_utils::Location;

use crate::HeapPtr;

/// No free block is large enough to serve the request.
#[derive(Debug, Snafu)]
#[snafu(display("not enough memory to allocate {requested} bytes"))]
#[snafu(visibility(pub(crate)))]
pub struct AcquireError {
    requested: usize,
    largest_free: usize,
    #[snafu(implicit)]
    location: Location,
}

impl AcquireError {
    /// Number of bytes the caller asked for.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Usable size of the largest free block at the time of the failure.
    #[must_use]
    pub fn largest_free(&self) -> usize {
        self.largest_free
    }

    /// Call site of the failed request.
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }
}

/// A reference passed to [`Heap::release`](crate::Heap::release) failed
/// validation.
#[derive(Debug, Snafu, derive_more::IsVariant)]
#[snafu(visibility(pub(crate)))]
pub enum ReleaseError {
    #[snafu(display("invalid pointer {ptr}"))]
    InvalidPointer {
        ptr: HeapPtr,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pointer {ptr} is not at the start of a chunk (chunk starts at {chunk})"))]
    NotChunkStart {
        ptr: HeapPtr,
        chunk: HeapPtr,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("double free of pointer {ptr}"))]
    DoubleFree {
        ptr: HeapPtr,
        #[snafu(implicit)]
        location: Location,
    },
}

impl ReleaseError {
    /// The rejected reference.
    #[must_use]
    pub fn ptr(&self) -> HeapPtr {
        match self {
            Self::InvalidPointer { ptr, .. }
            | Self::NotChunkStart { ptr, .. }
            | Self::DoubleFree { ptr, .. } => *ptr,
        }
    }

    /// Call site of the rejected release.
    #[must_use]
    pub fn location(&self) -> Location {
        match self {
            Self::InvalidPointer { location, .. }
            | Self::NotChunkStart { location, .. }
            | Self::DoubleFree { location, .. } => *location,
        }
    }
}

/// A structural invariant of the block list does not hold.
///
/// Returned by [`Heap::check`](crate::Heap::check). Offsets are arena offsets
/// of block headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InvariantError {
    #[snafu(display("block at {offset:#x} leaves a gap, expected next block at {expected:#x}"))]
    Gap { offset: usize, expected: usize },
    #[snafu(display("block at {offset:#x} overlaps its predecessor ending at {expected:#x}"))]
    Overlap { offset: usize, expected: usize },
    #[snafu(display("block header at {offset:#x} does not fit in {capacity} bytes"))]
    OutOfBounds { offset: usize, capacity: usize },
    #[snafu(display("last block ends at {end:#x}, arena ends at {capacity:#x}"))]
    BadEnd { end: usize, capacity: usize },
    #[snafu(display("block at {offset:#x} is {total_size} bytes, smaller than its header"))]
    Undersized { offset: usize, total_size: usize },
    #[snafu(display("adjacent blocks at {first:#x} and {second:#x} are both free"))]
    AdjacentFree { first: usize, second: usize },
}

/// Renders an error as a one-line diagnostic:
/// `<operation>: <reason> (<file>:<line>)`.
///
/// ```
/// # use static_heap::{Diagnostic, Heap};
/// let mut heap = Heap::<64>::new();
/// let err = heap.acquire(100).unwrap_err();
/// let line = err.diagnostic("malloc").to_string();
/// assert!(line.starts_with("malloc: not enough memory to allocate 100 bytes ("));
/// ```
pub struct Diagnostic<'a, E> {
    operation: &'a str,
    error: &'a E,
    location: Location,
}

impl<'a, E> Diagnostic<'a, E> {
    pub fn new(operation: &'a str, error: &'a E, location: Location) -> Self {
        Self {
            operation,
            error,
            location,
        }
    }
}

impl<E> fmt::Display for Diagnostic<'_, E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            operation,
            error,
            location,
        } = self;
        write!(f, "{operation}: {error} ({location})")
    }
}

impl AcquireError {
    /// Diagnostic line for this error, prefixed with `operation`.
    #[must_use]
    pub fn diagnostic<'a>(&'a self, operation: &'a str) -> Diagnostic<'a, Self> {
        Diagnostic::new(operation, self, self.location)
    }
}

impl ReleaseError {
    /// Diagnostic line for this error, prefixed with `operation`.
    #[must_use]
    pub fn diagnostic<'a>(&'a self, operation: &'a str) -> Diagnostic<'a, Self> {
        Diagnostic::new(operation, self, self.location())
    }
}
