use core::ops::Range;

use crate::{
    HeapPtr,
    header::{HEADER_SIZE, Header},
};

/// Snapshot of one block of a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    offset: usize,
    total_size: usize,
    is_free: bool,
}

impl Block {
    /// Offset of the block header from the start of the arena.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of header plus payload.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.is_free
    }

    /// Offset one past the last byte of the block.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.total_size
    }

    /// Range of arena offsets covered by the block, header included.
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Reference handed out for this block by [`Heap::acquire`](crate::Heap::acquire).
    #[must_use]
    pub fn payload_ptr(&self) -> HeapPtr {
        HeapPtr::from_offset(self.offset + HEADER_SIZE)
    }

    /// Number of usable payload bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.total_size - HEADER_SIZE
    }

    /// Range of arena offsets covered by the payload.
    #[must_use]
    pub fn payload_range(&self) -> Range<usize> {
        self.offset + HEADER_SIZE..self.end()
    }
}

/// Iterator over the blocks of a heap in address order.
///
/// Created by [`Heap::blocks`](crate::Heap::blocks).
#[derive(Debug, Clone)]
pub struct Blocks<'heap> {
    arena: &'heap [u8],
    next: Option<usize>,
}

impl<'heap> Blocks<'heap> {
    pub(crate) fn new(arena: &'heap [u8], head: Option<usize>) -> Self {
        Self { arena, next: head }
    }
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next?;
        let header = Header::read(self.arena, offset);
        self.next = header.next;
        Some(Block {
            offset,
            total_size: header.total_size,
            is_free: header.is_free,
        })
    }
}
