//! Correctness suite run against the process-wide heap.

use arrayvec::ArrayVec;
use snafu::{OptionExt as _, ResultExt as _, ensure_whatever};
use snafu_utils::GenericError;
use static_heap::{DEFAULT_CAPACITY, HEADER_SIZE, HeapPtr};

use crate::heap::{self, free, malloc, with_payload};

pub const OBJECTS: usize = 64;
pub const OBJSIZE: usize = DEFAULT_CAPACITY / OBJECTS - HEADER_SIZE;

type Objects = ArrayVec<HeapPtr, OBJECTS>;

/// Runs the whole suite.
///
/// With `leak` set, only the fill test runs and its objects are never
/// released, leaving them for the leak report at exit.
pub fn run(leak: bool) -> Result<(), GenericError> {
    if leak {
        return run_test("fill and verify", || fill_and_verify(false));
    }

    let tests: [(&str, fn() -> Result<(), GenericError>); 6] = [
        ("fill and verify", || fill_and_verify(true)),
        ("allocation of unallocated memory", allocation),
        ("non-overlapping allocations", non_overlapping_allocations),
        ("data integrity", data_integrity),
        ("coalescing of free blocks", coalescing),
        ("leak detection", leak_detection),
    ];
    for (name, test) in tests {
        run_test(name, test)?;
    }
    println!("All tests completed.");
    Ok(())
}

fn run_test<F>(name: &str, test: F) -> Result<(), GenericError>
where
    F: FnOnce() -> Result<(), GenericError>,
{
    info!("running test: {name}");
    test().with_whatever_context(|_| format!("test `{name}` failed"))?;
    heap::check().with_whatever_context(|_| format!("heap corrupted after test `{name}`"))?;
    debug!("heap after `{name}`: {:?}", heap::stats());
    Ok(())
}

fn alloc_objects(count: usize, size: usize) -> Result<Objects, GenericError> {
    let mut objects = Objects::new();
    for i in 0..count {
        let ptr = malloc(size).with_whatever_context(|| format!("unable to allocate object {i}"))?;
        objects.push(ptr);
    }
    Ok(objects)
}

fn free_objects(objects: Objects) {
    for ptr in objects {
        free(Some(ptr));
    }
}

/// Fills object `i` with the byte `i`.
fn fill_distinct(objects: &[HeapPtr]) -> Result<(), GenericError> {
    for (i, &ptr) in objects.iter().enumerate() {
        let byte = u8::try_from(i).whatever_context("object index does not fit in a byte")?;
        with_payload(ptr, |payload| payload[..OBJSIZE].fill(byte))
            .whatever_context("object vanished")?;
    }
    Ok(())
}

/// Counts bytes that no longer hold the pattern written by [`fill_distinct`].
fn count_incorrect(objects: &[HeapPtr]) -> Result<usize, GenericError> {
    let mut errors = 0;
    for (i, &ptr) in objects.iter().enumerate() {
        let byte = u8::try_from(i).whatever_context("object index does not fit in a byte")?;
        let wrong = with_payload(ptr, |payload| {
            payload[..OBJSIZE]
                .iter()
                .enumerate()
                .filter(|&(_, b)| *b != byte)
                .inspect(|&(j, b)| {
                    error!("object {i} byte {j} incorrect: {b}");
                })
                .count()
        })
        .whatever_context("object vanished")?;
        errors += wrong;
    }
    Ok(errors)
}

fn fill_and_verify(release: bool) -> Result<(), GenericError> {
    let objects = alloc_objects(OBJECTS, OBJSIZE)?;
    fill_distinct(&objects)?;
    let errors = count_incorrect(&objects)?;
    if release {
        free_objects(objects);
    }
    println!("{errors} incorrect bytes");
    ensure_whatever!(errors == 0, "{errors} incorrect bytes");
    Ok(())
}

fn allocation() -> Result<(), GenericError> {
    let ptr = malloc(OBJSIZE).whatever_context("malloc() returned nothing")?;
    println!("Test 1 Passed: malloc() allocated memory at {ptr}");
    free(Some(ptr));
    Ok(())
}

fn non_overlapping_allocations() -> Result<(), GenericError> {
    let objects = alloc_objects(OBJECTS, OBJSIZE)?;
    for (i, a) in objects.iter().enumerate() {
        for (j, b) in objects.iter().enumerate().skip(i + 1) {
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            ensure_whatever!(
                lo.offset() + OBJSIZE <= hi.offset(),
                "objects {i} and {j} overlap"
            );
        }
    }
    println!("Test 2 Passed: No overlapping allocations detected");
    free_objects(objects);
    Ok(())
}

fn data_integrity() -> Result<(), GenericError> {
    let objects = alloc_objects(OBJECTS, OBJSIZE)?;
    fill_distinct(&objects)?;
    let errors = count_incorrect(&objects)?;
    free_objects(objects);
    ensure_whatever!(errors == 0, "{errors} incorrect bytes");
    println!("Test 3 Passed: Data integrity maintained");
    Ok(())
}

fn coalescing() -> Result<(), GenericError> {
    let objects = alloc_objects(4, OBJSIZE)?;

    free(Some(objects[1]));
    free(Some(objects[2]));

    let large_size = 2 * (OBJSIZE + HEADER_SIZE) - HEADER_SIZE;
    let large = malloc(large_size)
        .whatever_context("unable to allocate large object after coalescing")?;
    ensure_whatever!(
        large == objects[1],
        "large object placed at {large}, expected {}",
        objects[1]
    );
    println!("Test 4 Passed: Coalescing successful, large object allocated");

    free(Some(objects[0]));
    free(Some(objects[3]));
    free(Some(large));
    Ok(())
}

fn leak_detection() -> Result<(), GenericError> {
    let objects = alloc_objects(OBJECTS, OBJSIZE)?;
    let stats = heap::stats();
    ensure_whatever!(
        stats.allocated_blocks == objects.len(),
        "expected {} live objects, found {}",
        objects.len(),
        stats.allocated_blocks
    );
    println!("Test 5: Allocated memory without freeing to test leak detection");
    Ok(())
}
