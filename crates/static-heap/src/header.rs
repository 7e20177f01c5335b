//! Block header layout.
//!
//! Every block starts with a fixed-size header stored inline in the arena,
//! immediately followed by the block's payload:
//!
//! ```text
//! offset          offset + HEADER_SIZE                 offset + total_size
//! ┌─────────────────────────────────┬────────────────────────────┐
//! │ total_size: u64                 │                            │
//! │ is_free: u8   (+ 7 bytes pad)   │   payload                  │
//! │ next: u64     (u64::MAX = none) │                            │
//! └─────────────────────────────────┴────────────────────────────┘
//! ```
//!
//! `next` holds the arena offset of the following header, not an address.

use dataview::{DataView, Pod};
use platform_cast::CastFrom as _;

/// Granularity of payload sizes, in bytes.
pub const ALIGNMENT: usize = 8;

/// Size of the header preceding every payload, in bytes.
pub const HEADER_SIZE: usize = size_of::<RawHeader>();
const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);

const NO_NEXT: u64 = u64::MAX;

#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct RawHeader {
    total_size: u64,
    is_free: u8,
    _reserved: [u8; 7],
    next: u64,
}

/// Decoded view of a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    /// Size of header plus payload.
    pub(crate) total_size: usize,
    pub(crate) is_free: bool,
    /// Offset of the following header, `None` for the last block.
    pub(crate) next: Option<usize>,
}

impl Header {
    /// Reads the header stored at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the header does not fit in `arena` at `offset`.
    pub(crate) fn read(arena: &[u8], offset: usize) -> Self {
        let raw = DataView::from(arena).read::<RawHeader>(offset);
        Self {
            total_size: usize::cast_from(raw.total_size),
            is_free: raw.is_free != 0,
            next: (raw.next != NO_NEXT).then(|| usize::cast_from(raw.next)),
        }
    }

    /// Writes this header at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the header does not fit in `arena` at `offset`.
    pub(crate) fn write(self, arena: &mut [u8], offset: usize) {
        let raw = RawHeader {
            total_size: u64::cast_from(self.total_size),
            is_free: self.is_free.into(),
            _reserved: [0; 7],
            next: self.next.map_or(NO_NEXT, u64::cast_from),
        };
        DataView::from_mut(arena).write(offset, &raw);
    }
}

/// Full span (header included) needed to serve a request of `size` bytes.
///
/// Returns `None` if the computation overflows.
pub(crate) fn needed_span(size: usize) -> Option<usize> {
    size.checked_next_multiple_of(ALIGNMENT)?
        .checked_add(HEADER_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_matches_field_layout() {
        assert_eq!(HEADER_SIZE, 24);
    }

    #[test]
    fn header_survives_write_and_read() {
        let mut arena = [0xAA_u8; 64];
        let header = Header {
            total_size: 40,
            is_free: true,
            next: Some(40),
        };
        header.write(&mut arena, 32);
        assert_eq!(Header::read(&arena, 32), header);

        let last = Header {
            total_size: 16,
            is_free: false,
            next: None,
        };
        last.write(&mut arena, 0);
        assert_eq!(Header::read(&arena, 0), last);
        // Writing the first header must not touch the second one.
        assert_eq!(Header::read(&arena, 32), header);
    }

    #[test]
    fn needed_span_rounds_payload_up() {
        let spans = [(0, 24), (1, 32), (8, 32), (9, 40), (40, 64), (104, 128)];
        for (size, expected) in spans {
            assert_eq!(needed_span(size), Some(expected), "size = {size}");
        }
    }

    #[test]
    fn needed_span_overflow() {
        assert_eq!(needed_span(usize::MAX), None);
        assert_eq!(needed_span(usize::MAX - 16), None);
    }
}
