use core::fmt;

/// Blocks still allocated, as found by [`Heap::leaks`](crate::Heap::leaks).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LeakReport {
    bytes: usize,
    objects: usize,
}

impl LeakReport {
    pub(crate) fn with_object(self, payload_len: usize) -> Self {
        Self {
            bytes: self.bytes + payload_len,
            objects: self.objects + 1,
        }
    }

    /// Total usable bytes of the leaked blocks.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Number of leaked blocks.
    #[must_use]
    pub fn objects(&self) -> usize {
        self.objects
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects == 0
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} leaked in {} objects.", self.bytes, self.objects)
    }
}

/// Occupancy summary of a heap, from [`Heap::stats`](crate::Heap::stats).
///
/// Byte counts are usable payload bytes; headers are not included.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub capacity: usize,
    pub blocks: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub largest_free_payload: usize,
}

impl HeapStats {
    /// Arena bytes taken up by block headers.
    #[must_use]
    pub fn overhead(&self) -> usize {
        self.capacity - self.free_bytes - self.allocated_bytes
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::string::ToString as _;

    use super::*;

    #[test]
    fn empty_report() {
        let report = LeakReport::default();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "0 leaked in 0 objects.");
    }

    #[test]
    fn report_accumulates_objects() {
        let report = LeakReport::default().with_object(40).with_object(8);
        assert!(!report.is_empty());
        assert_eq!(report.bytes(), 48);
        assert_eq!(report.objects(), 2);
        assert_eq!(report.to_string(), "48 leaked in 2 objects.");
    }
}
