//! The process-wide heap and its `malloc`/`free` front end.
//!
//! Misuse detected by [`free`] ends the process with
//! [`MISUSE_EXIT_STATUS`] after printing a diagnostic and the leak report.

use std::{
    process,
    sync::atomic::{AtomicBool, Ordering},
};

use spin::Mutex;
use static_heap::{Heap, HeapPtr, HeapStats, InvariantError};

/// Exit status of a process that passed a bad reference to [`free`].
pub const MISUSE_EXIT_STATUS: i32 = 2;

static HEAP: Mutex<Heap> = Mutex::new(Heap::new());
static LEAKS_REPORTED: AtomicBool = AtomicBool::new(false);

/// Allocates `size` bytes from the process-wide heap.
///
/// On failure a `malloc:` diagnostic naming the caller is written to stderr
/// and `None` is returned.
#[track_caller]
pub fn malloc(size: usize) -> Option<HeapPtr> {
    let result = HEAP.lock().acquire(size);
    match result {
        Ok(ptr) => {
            trace!("malloc({size}) = {ptr}");
            Some(ptr)
        }
        Err(err) => {
            eprintln!("{}", err.diagnostic("malloc"));
            None
        }
    }
}

/// Returns an allocation to the process-wide heap.
///
/// `None` is ignored. Any other reference that does not name a live
/// allocation terminates the process with [`MISUSE_EXIT_STATUS`].
#[track_caller]
pub fn free(ptr: Option<HeapPtr>) {
    let result = HEAP.lock().release(ptr);
    match result {
        Ok(()) => {
            if let Some(ptr) = ptr {
                trace!("free({ptr})");
            }
        }
        Err(err) => {
            eprintln!("{}", err.diagnostic("free"));
            report_leaks();
            process::exit(MISUSE_EXIT_STATUS);
        }
    }
}

/// Runs `f` on the usable bytes of the allocation `ptr` refers to.
///
/// Returns `None` if `ptr` is not a live allocation.
pub fn with_payload<F, R>(ptr: HeapPtr, f: F) -> Option<R>
where
    F: FnOnce(&mut [u8]) -> R,
{
    HEAP.lock().payload_mut(ptr).map(f)
}

pub fn stats() -> HeapStats {
    HEAP.lock().stats()
}

pub fn check() -> Result<(), InvariantError> {
    HEAP.lock().check()
}

/// Prints the leak summary to stderr if any allocation is still live.
///
/// Only the first call scans the heap; later calls do nothing.
pub fn report_leaks() {
    if LEAKS_REPORTED.swap(true, Ordering::AcqRel) {
        return;
    }
    let report = HEAP.lock().leaks();
    if !report.is_empty() {
        eprintln!("{report}");
    }
}
