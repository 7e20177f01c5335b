//! The heap engine: a first-fit allocator over one fixed-size arena.

use core::fmt;

use snafu::ensure;

use crate::{
    AcquireError, Block, Blocks, InvariantError, ReleaseError,
    error::{
        AcquireSnafu, AdjacentFreeSnafu, BadEndSnafu, DoubleFreeSnafu, GapSnafu,
        InvalidPointerSnafu, NotChunkStartSnafu, OutOfBoundsSnafu, OverlapSnafu, UndersizedSnafu,
    },
    header::{ALIGNMENT, HEADER_SIZE, Header, needed_span},
    stats::{HeapStats, LeakReport},
};

/// Arena size used when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 4096;

#[repr(C, align(8))]
struct Arena<const N: usize>([u8; N]);

/// Reference to the payload of a block, as an offset into the arena.
///
/// Values are normally obtained from [`Heap::acquire`]. Arbitrary values can
/// be built with [`HeapPtr::from_offset`]; [`Heap::release`] rejects the ones
/// that do not name an allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{_0:#x}")]
pub struct HeapPtr(usize);

impl HeapPtr {
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Returns a reference `count` bytes further into the arena.
    #[must_use]
    pub const fn byte_add(self, count: usize) -> Self {
        Self(self.0.saturating_add(count))
    }
}

/// A first-fit heap allocator over a fixed `CAPACITY`-byte arena.
///
/// The arena is tiled by a singly linked list of blocks in address order.
/// Each block starts with a header (see [`HEADER_SIZE`](crate::HEADER_SIZE))
/// followed by its payload.
///
/// ```text
///  offset 0                                                   CAPACITY
///  ┌────────┬──────────┬────────┬─────┬────────┬──────────────────┐
///  │ header │ payload  │ header │ pay │ header │ payload          │
///  │ alloc  │          │ free   │     │ alloc  │                  │
///  └────────┴──────────┴────────┴─────┴────────┴──────────────────┘
///      │                   ▲  │          ▲
///      └──── next ─────────┘  └─ next ───┘
/// ```
///
/// The list is created lazily by the first [`acquire`](Self::acquire). Every
/// operation leaves the list tiling the whole arena with no two neighbouring
/// free blocks.
///
/// The heap is not synchronized; callers sharing one across threads must
/// serialize access themselves.
///
/// # Examples
///
/// ```
/// use static_heap::Heap;
///
/// let mut heap = Heap::<4096>::new();
/// let ptr = heap.acquire(13).unwrap();
/// heap.payload_mut(ptr).unwrap()[..5].copy_from_slice(b"hello");
/// assert_eq!(&heap.payload(ptr).unwrap()[..5], b"hello");
/// heap.release(Some(ptr)).unwrap();
/// assert!(heap.leaks().is_empty());
/// ```
pub struct Heap<const CAPACITY: usize = DEFAULT_CAPACITY> {
    arena: Arena<CAPACITY>,
    head: Option<usize>,
}

impl<const CAPACITY: usize> Default for Heap<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> fmt::Debug for Heap<CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("capacity", &CAPACITY)
            .field("blocks", &DebugBlocks(self.blocks()))
            .finish()
    }
}

struct DebugBlocks<'a>(Blocks<'a>);

impl fmt::Debug for DebugBlocks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.clone()).finish()
    }
}

impl<const CAPACITY: usize> Heap<CAPACITY> {
    /// Creates a heap with an empty block list.
    ///
    /// Fails to compile if `CAPACITY` is not a multiple of
    /// [`ALIGNMENT`](crate::ALIGNMENT) or cannot hold a single header.
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(
                CAPACITY % ALIGNMENT == 0,
                "heap capacity must be a multiple of the alignment"
            );
            assert!(CAPACITY >= HEADER_SIZE, "heap capacity must hold a header");
        }
        Self {
            arena: Arena([0; CAPACITY]),
            head: None,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Returns `true` once the block list exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.head.is_some()
    }

    /// Creates the block list as a single free block covering the arena.
    ///
    /// Does nothing if the list already exists. Called implicitly by
    /// [`acquire`](Self::acquire).
    pub fn initialize(&mut self) {
        if self.head.is_some() {
            return;
        }
        let header = Header {
            total_size: CAPACITY,
            is_free: true,
            next: None,
        };
        header.write(&mut self.arena.0, 0);
        self.head = Some(0);
    }

    /// Reserves a block with at least `size` usable bytes.
    ///
    /// The request is rounded up to a multiple of
    /// [`ALIGNMENT`](crate::ALIGNMENT) and the first free block large enough
    /// to hold it plus a header is taken. The block is split when the leftover
    /// can hold a header and at least one aligned payload unit; otherwise the
    /// leftover stays in the allocated block as slack.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] carrying the caller's location if no free
    /// block is large enough. The heap is left unchanged.
    #[track_caller]
    pub fn acquire(&mut self, size: usize) -> Result<HeapPtr, AcquireError> {
        self.initialize();

        let found = needed_span(size).and_then(|needed| Some((self.first_fit(needed)?, needed)));
        let Some((offset, needed)) = found else {
            let largest_free = self.largest_free_payload();
            return AcquireSnafu {
                requested: size,
                largest_free,
            }
            .fail();
        };

        let mut header = self.header(offset);
        let excess = header.total_size - needed;
        if excess > HEADER_SIZE {
            let remainder_offset = offset + needed;
            let remainder = Header {
                total_size: excess,
                is_free: true,
                next: header.next,
            };
            self.set_header(remainder_offset, remainder);
            header.total_size = needed;
            header.next = Some(remainder_offset);
        }
        header.is_free = false;
        self.set_header(offset, header);

        Ok(HeapPtr(offset + HEADER_SIZE))
    }

    /// Releases a block obtained from [`acquire`](Self::acquire).
    ///
    /// `None` is accepted and ignored. The reference is validated before any
    /// state changes; on success the block is marked free and merged with free
    /// neighbours.
    ///
    /// # Errors
    ///
    /// - [`ReleaseError::InvalidPointer`] if `ptr` lies outside every block.
    /// - [`ReleaseError::NotChunkStart`] if `ptr` lies inside a block but is
    ///   not the start of its payload.
    /// - [`ReleaseError::DoubleFree`] if the block is already free.
    ///
    /// The heap is left unchanged on error.
    #[track_caller]
    pub fn release(&mut self, ptr: Option<HeapPtr>) -> Result<(), ReleaseError> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        let block = self.validate(ptr)?;

        let mut header = self.header(block.offset());
        header.is_free = true;
        self.set_header(block.offset(), header);
        self.coalesce(block.offset());
        Ok(())
    }

    /// Returns the usable bytes of the allocated block `ptr` refers to.
    ///
    /// Returns `None` if `ptr` does not name an allocated block.
    #[must_use]
    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let block = self.allocated_block(ptr)?;
        Some(&self.arena.0[block.payload_range()])
    }

    /// Mutable variant of [`payload`](Self::payload).
    #[must_use]
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let block = self.allocated_block(ptr)?;
        Some(&mut self.arena.0[block.payload_range()])
    }

    /// Number of usable bytes of the allocated block `ptr` refers to.
    ///
    /// This can exceed the requested size by the alignment padding and by any
    /// slack left when the block was not split.
    #[must_use]
    pub fn usable_size(&self, ptr: HeapPtr) -> Option<usize> {
        self.allocated_block(ptr).map(|block| block.payload_len())
    }

    /// Iterates over all blocks in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks::new(&self.arena.0, self.head)
    }

    /// Scans for blocks that are still allocated.
    #[must_use]
    pub fn leaks(&self) -> LeakReport {
        self.blocks()
            .filter(|block| !block.is_free())
            .fold(LeakReport::default(), |report, block| {
                report.with_object(block.payload_len())
            })
    }

    /// Summarizes the current block list.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: CAPACITY,
            ..HeapStats::default()
        };
        for block in self.blocks() {
            stats.blocks += 1;
            if block.is_free() {
                stats.free_blocks += 1;
                stats.free_bytes += block.payload_len();
                stats.largest_free_payload = stats.largest_free_payload.max(block.payload_len());
            } else {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += block.payload_len();
            }
        }
        stats
    }

    /// Verifies the structural invariants of the block list.
    ///
    /// The blocks must tile the arena exactly, each block must be at least a
    /// header long, and no two neighbouring blocks may both be free. A heap
    /// that has not been initialized yet is valid.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, walking in address order.
    pub fn check(&self) -> Result<(), InvariantError> {
        let Some(mut offset) = self.head else {
            return Ok(());
        };
        ensure!(
            offset == 0,
            GapSnafu {
                offset,
                expected: 0_usize
            }
        );

        let mut prev_free = None;
        loop {
            ensure!(
                offset.saturating_add(HEADER_SIZE) <= CAPACITY,
                OutOfBoundsSnafu {
                    offset,
                    capacity: CAPACITY
                }
            );
            let header = self.header(offset);
            ensure!(
                header.total_size >= HEADER_SIZE,
                UndersizedSnafu {
                    offset,
                    total_size: header.total_size
                }
            );
            if let (true, Some(first)) = (header.is_free, prev_free) {
                return AdjacentFreeSnafu {
                    first,
                    second: offset,
                }
                .fail();
            }
            prev_free = header.is_free.then_some(offset);

            let end = offset.saturating_add(header.total_size);
            let Some(next) = header.next else {
                ensure!(
                    end == CAPACITY,
                    BadEndSnafu {
                        end,
                        capacity: CAPACITY
                    }
                );
                return Ok(());
            };
            ensure!(
                next <= end,
                GapSnafu {
                    offset: next,
                    expected: end
                }
            );
            ensure!(
                next >= end,
                OverlapSnafu {
                    offset: next,
                    expected: end
                }
            );
            offset = next;
        }
    }

    fn header(&self, offset: usize) -> Header {
        Header::read(&self.arena.0, offset)
    }

    fn set_header(&mut self, offset: usize, header: Header) {
        header.write(&mut self.arena.0, offset);
    }

    fn first_fit(&self, needed: usize) -> Option<usize> {
        self.blocks()
            .find(|block| block.is_free() && block.total_size() >= needed)
            .map(|block| block.offset())
    }

    fn largest_free_payload(&self) -> usize {
        self.blocks()
            .filter(Block::is_free)
            .map(|block| block.payload_len())
            .max()
            .unwrap_or(0)
    }

    fn allocated_block(&self, ptr: HeapPtr) -> Option<Block> {
        let header_offset = ptr.0.checked_sub(HEADER_SIZE)?;
        self.blocks()
            .find(|block| block.offset() == header_offset)
            .filter(|block| !block.is_free())
    }

    /// Finds the allocated block whose payload starts at `ptr`.
    #[track_caller]
    fn validate(&self, ptr: HeapPtr) -> Result<Block, ReleaseError> {
        let header_offset = ptr.0.checked_sub(HEADER_SIZE);
        for block in self.blocks() {
            if Some(block.offset()) == header_offset {
                if block.is_free() {
                    return DoubleFreeSnafu { ptr }.fail();
                }
                return Ok(block);
            }
            // Blocks are in address order: a later block cannot start at
            // `ptr - HEADER_SIZE` once `ptr` falls inside this one.
            if block.span().contains(&ptr.0) {
                return NotChunkStartSnafu {
                    ptr,
                    chunk: block.payload_ptr(),
                }
                .fail();
            }
        }
        InvalidPointerSnafu { ptr }.fail()
    }

    /// Merges the free block at `offset` with free neighbours.
    fn coalesce(&mut self, offset: usize) {
        let mut block = self.header(offset);
        debug_assert!(block.is_free);

        if let Some(next_offset) = block.next {
            let next = self.header(next_offset);
            if next.is_free {
                block.total_size += next.total_size;
                block.next = next.next;
                self.set_header(offset, block);
            }
        }

        if let Some(prev_offset) = self.predecessor(offset) {
            let mut prev = self.header(prev_offset);
            if prev.is_free {
                prev.total_size += block.total_size;
                prev.next = block.next;
                self.set_header(prev_offset, prev);
            }
        }
    }

    fn predecessor(&self, offset: usize) -> Option<usize> {
        let mut prev = None;
        for block in self.blocks() {
            if block.offset() == offset {
                return prev;
            }
            prev = Some(block.offset());
        }
        None
    }
}
