/// A contiguous byte range of the source file: the unit of network transfer.
///
/// The range is fixed at planning time; only `retries` changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position of this chunk in the file, starting at 0.
    pub index: usize,
    /// First byte offset (inclusive).
    pub start: u64,
    /// End byte offset (exclusive).
    pub end: u64,
    /// `end - start`, never zero.
    pub size: u64,
    /// Failed transfer attempts so far.
    pub retries: u32,
}

impl ChunkDescriptor {
    /// Creates a descriptor for `[start, end)`.
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        debug_assert!(end > start, "chunk {index} has an empty range");
        Self {
            index,
            start,
            end,
            size: end - start,
            retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_descriptor_derives_size() {
        let c = ChunkDescriptor::new(2, 20, 25);
        assert_eq!(c.size, 5);
        assert_eq!(c.retries, 0);
    }
}
