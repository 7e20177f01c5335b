//! A first-fit heap allocator over a single fixed-size buffer.
//!
//! [`Heap`] manages a `CAPACITY`-byte arena it owns outright. It never grows,
//! never asks the operating system for memory and never hands out raw
//! pointers: allocations are identified by [`HeapPtr`], a payload offset into
//! the arena, and their bytes are reached through [`Heap::payload`] and
//! [`Heap::payload_mut`].
//!
//! # Algorithm
//!
//! The arena is tiled by blocks, each a [`HEADER_SIZE`]-byte header followed
//! by its payload. Headers are linked in address order.
//!
//! - **Acquire** rounds the request up to [`ALIGNMENT`], adds a header and
//!   takes the first free block that is large enough. If the leftover can
//!   hold another header plus at least one aligned unit, it is split off as a
//!   new free block; otherwise it stays inside the allocation as slack.
//! - **Release** validates the reference, marks the block free, then merges
//!   it with a free successor and a free predecessor.
//! - **Leak scan** sums the payloads of blocks still allocated.
//!
//! Acquire and release are O(n) in the number of blocks.
//!
//! # Errors
//!
//! Running out of space is recoverable and reported as [`AcquireError`].
//! Releasing something that is not a live allocation is caller misuse,
//! reported as [`ReleaseError`]; the heap is not modified in that case. Both
//! carry the source location of the offending call, and
//! [`Diagnostic`] renders them as `<operation>: <reason> (<file>:<line>)`.
//!
//! # Usage
//!
//! ```rust
//! use static_heap::{Heap, HeapPtr};
//!
//! let mut heap = Heap::<4096>::new();
//!
//! let a = heap.acquire(40).unwrap();
//! let b = heap.acquire(40).unwrap();
//! heap.payload_mut(a).unwrap().fill(0xAA);
//!
//! heap.release(Some(b)).unwrap();
//!
//! // Misuse is reported, not acted upon.
//! let err = heap.release(Some(b)).unwrap_err();
//! assert!(err.is_double_free());
//! let err = heap.release(Some(a.byte_add(8))).unwrap_err();
//! assert!(err.is_not_chunk_start());
//! let err = heap.release(Some(HeapPtr::from_offset(10_000))).unwrap_err();
//! assert!(err.is_invalid_pointer());
//!
//! assert_eq!(heap.leaks().to_string(), "40 leaked in 1 objects.");
//! heap.check().unwrap();
//! ```
//!
//! # Thread Safety
//!
//! `Heap` has no internal synchronization. A heap shared between threads must
//! be wrapped in a lock, for example `spin::Mutex<Heap>`.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    block::{Block, Blocks},
    error::{AcquireError, Diagnostic, InvariantError, ReleaseError},
    header::{ALIGNMENT, HEADER_SIZE},
    heap::{DEFAULT_CAPACITY, Heap, HeapPtr},
    stats::{HeapStats, LeakReport},
};

mod block;
pub mod error;
mod header;
mod heap;
mod stats;
