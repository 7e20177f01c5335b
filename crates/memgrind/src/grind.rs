//! Timed allocation workloads.

use std::time::{Duration, Instant};

use arrayvec::ArrayVec;
use snafu::{OptionExt as _, ResultExt as _, ensure_whatever};
use snafu_utils::GenericError;
use static_heap::{DEFAULT_CAPACITY, HEADER_SIZE, HeapPtr};

use crate::heap::{self, free, malloc, with_payload};

const ALLOCATIONS: usize = 120;

type Workload = fn(&mut XorShift) -> Result<(), GenericError>;

const WORKLOADS: [(&str, Workload); 5] = [
    ("malloc and immediately free", immediate_free),
    ("malloc all then free all", batch_free),
    ("random malloc and free", random_malloc_free),
    ("linked list build and teardown", linked_list),
    ("fragment then coalesce", fragment_and_coalesce),
];

/// Runs every workload `runs` times and prints the average time per run.
pub fn run(runs: u32, seed: u64) -> Result<(), GenericError> {
    ensure_whatever!(runs > 0, "number of runs must be positive");
    let mut rng = XorShift::new(seed);

    for (name, workload) in WORKLOADS {
        let mut total = Duration::ZERO;
        for run in 0..runs {
            let start = Instant::now();
            workload(&mut rng)
                .with_whatever_context(|_| format!("workload `{name}` failed in run {run}"))?;
            total += start.elapsed();
            verify_empty(name)?;
        }
        println!("{name}: {:?} per run (average of {runs})", total / runs);
    }
    Ok(())
}

fn verify_empty(name: &str) -> Result<(), GenericError> {
    heap::check().with_whatever_context(|_| format!("heap corrupted by workload `{name}`"))?;
    let stats = heap::stats();
    ensure_whatever!(
        stats.allocated_blocks == 0,
        "workload `{name}` left {} objects allocated",
        stats.allocated_blocks
    );
    trace!("heap after `{name}`: {stats:?}");
    Ok(())
}

fn immediate_free(_rng: &mut XorShift) -> Result<(), GenericError> {
    for _ in 0..ALLOCATIONS {
        let ptr = malloc(1).whatever_context("1-byte allocation failed")?;
        free(Some(ptr));
    }
    Ok(())
}

fn batch_free(_rng: &mut XorShift) -> Result<(), GenericError> {
    let mut objects = ArrayVec::<HeapPtr, ALLOCATIONS>::new();
    for _ in 0..ALLOCATIONS {
        objects.push(malloc(1).whatever_context("1-byte allocation failed")?);
    }
    for ptr in objects {
        free(Some(ptr));
    }
    Ok(())
}

fn random_malloc_free(rng: &mut XorShift) -> Result<(), GenericError> {
    let mut objects = ArrayVec::<HeapPtr, ALLOCATIONS>::new();
    let mut allocated = 0;
    while allocated < ALLOCATIONS {
        if objects.is_empty() || rng.next_bool() {
            objects.push(malloc(1).whatever_context("1-byte allocation failed")?);
            allocated += 1;
        } else if let Some(ptr) = objects.pop() {
            free(Some(ptr));
        }
    }
    for ptr in objects {
        free(Some(ptr));
    }
    Ok(())
}

const LIST_NODES: usize = 100;
const NODE_SIZE: usize = 2 * size_of::<u64>();
const NO_NODE: u64 = u64::MAX;

/// Builds a singly linked list whose nodes live in the heap, then walks it
/// and frees every node.
///
/// A node stores its value and the offset of the next node.
fn linked_list(_rng: &mut XorShift) -> Result<(), GenericError> {
    let mut head = NO_NODE;
    for value in 0..LIST_NODES {
        let node = malloc(NODE_SIZE).whatever_context("node allocation failed")?;
        let value = u64::try_from(value).whatever_context("node value out of range")?;
        with_payload(node, |payload| {
            payload[..8].copy_from_slice(&value.to_le_bytes());
            payload[8..16].copy_from_slice(&head.to_le_bytes());
        })
        .whatever_context("new node vanished")?;
        head = u64::try_from(node.offset()).whatever_context("node offset out of range")?;
    }

    let mut expected = LIST_NODES;
    while head != NO_NODE {
        let node = HeapPtr::from_offset(
            usize::try_from(head).whatever_context("node offset out of range")?,
        );
        let (value, next) = with_payload(node, |payload| {
            let mut value = [0; 8];
            let mut next = [0; 8];
            value.copy_from_slice(&payload[..8]);
            next.copy_from_slice(&payload[8..16]);
            (u64::from_le_bytes(value), u64::from_le_bytes(next))
        })
        .whatever_context("list node vanished")?;

        expected -= 1;
        ensure_whatever!(
            u64::try_from(expected).is_ok_and(|expected| expected == value),
            "node holds {value}, expected {expected}"
        );
        free(Some(node));
        head = next;
    }
    ensure_whatever!(expected == 0, "list lost {expected} nodes");
    Ok(())
}

/// Splits the arena into equal blocks, frees the odd then the even ones and
/// requests the whole arena, which only fits if every block was merged back.
fn fragment_and_coalesce(_rng: &mut XorShift) -> Result<(), GenericError> {
    const BLOCKS: usize = 32;
    const SIZE: usize = DEFAULT_CAPACITY / BLOCKS - HEADER_SIZE;

    let mut objects = ArrayVec::<HeapPtr, BLOCKS>::new();
    for _ in 0..BLOCKS {
        objects.push(malloc(SIZE).whatever_context("block allocation failed")?);
    }
    for ptr in objects.iter().skip(1).step_by(2) {
        free(Some(*ptr));
    }
    ensure_whatever!(
        heap::stats().free_blocks == BLOCKS / 2,
        "odd blocks were merged across live neighbours"
    );
    for ptr in objects.iter().step_by(2) {
        free(Some(*ptr));
    }

    let whole = malloc(DEFAULT_CAPACITY - HEADER_SIZE)
        .whatever_context("arena still fragmented after freeing every block")?;
    free(Some(whole));
    Ok(())
}

/// xorshift64 generator, deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct XorShift(u64);

impl XorShift {
    const DEFAULT_SEED: u64 = 0x2545_f491_4f6c_dd1d;

    pub fn new(seed: u64) -> Self {
        Self(if seed == 0 { Self::DEFAULT_SEED } else { seed })
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    pub fn next_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_seed_is_replaced() {
        let mut zero = XorShift::new(0);
        let mut default = XorShift::new(XorShift::DEFAULT_SEED);
        assert_ne!(zero.next_u64(), 0);
        assert_eq!(zero.next_u64(), {
            default.next_u64();
            default.next_u64()
        });
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = XorShift::new(42);
        let mut b = XorShift::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn both_outcomes_occur() {
        let mut rng = XorShift::new(7);
        let heads = (0..1000).filter(|_| rng.next_bool()).count();
        assert!((300..700).contains(&heads), "heads = {heads}");
    }
}
