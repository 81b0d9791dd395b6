use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::types::ChunkDescriptor;

/// Partitions `total_size` bytes into fixed-size chunks.
///
/// Chunk `i` covers `[i * chunk_size, min((i + 1) * chunk_size, total_size))`.
/// Only the last chunk may be shorter than `chunk_size`, no chunk is empty,
/// and an empty file yields no chunks at all. The result depends only on
/// the inputs, so planning the same file twice gives identical descriptors.
pub fn plan_chunks(
    total_size: u64,
    chunk_size: usize,
) -> Result<Vec<ChunkDescriptor>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::ZeroChunkSize);
    }
    let chunk_size = chunk_size as u64;
    let count = total_size.div_ceil(chunk_size);

    let chunks = (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = std::cmp::min(start + chunk_size, total_size);
            ChunkDescriptor::new(i as usize, start, end)
        })
        .collect();
    Ok(chunks)
}

/// Reads exactly the byte range described by `chunk` from `path`.
pub async fn read_chunk(path: &Path, chunk: &ChunkDescriptor) -> Result<Vec<u8>, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(chunk.start)).await?;

    let mut buf = Vec::with_capacity(chunk.size as usize);
    let read = (&mut file).take(chunk.size).read_to_end(&mut buf).await? as u64;
    if read != chunk.size {
        return Err(TransferError::ShortRead {
            index: chunk.index,
            expected: chunk.size,
            actual: read,
        });
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    fn assert_partition(total: u64, chunk_size: usize) {
        let chunks = plan_chunks(total, chunk_size).unwrap();
        let c = chunk_size as u64;
        assert_eq!(chunks.len() as u64, total.div_ceil(c), "size {total} / {c}");

        let mut expected_start = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.start, expected_start);
            assert!(chunk.size > 0);
            assert!(chunk.size <= c);
            assert_eq!(chunk.end - chunk.start, chunk.size);
            expected_start = chunk.end;
        }
        assert_eq!(expected_start, total);

        if let Some(last) = chunks.last() {
            assert_eq!(last.size, total - (chunks.len() as u64 - 1) * c);
        }
    }

    #[test]
    fn plan_partitions_exactly() {
        for total in [1, 2, 9, 10, 11, 99, 100, 101, 4096, 65_537] {
            for chunk_size in [1, 3, 10, 64, 4096] {
                assert_partition(total, chunk_size);
            }
        }
    }

    #[test]
    fn plan_25mb_with_10mib_chunks() {
        let total = 25 * MIB;
        let chunks = plan_chunks(total, 10 * MIB as usize).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].size, 10 * MIB);
        assert_eq!(chunks[1].size, 10 * MIB);
        assert_eq!(chunks[2].size, 5 * MIB);
    }

    #[test]
    fn plan_exact_multiple_has_no_tail() {
        let chunks = plan_chunks(30, 10).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.size == 10));
    }

    #[test]
    fn plan_empty_file_has_no_chunks() {
        assert!(plan_chunks(0, 10).unwrap().is_empty());
    }

    #[test]
    fn plan_rejects_zero_chunk_size() {
        assert!(matches!(
            plan_chunks(10, 0),
            Err(TransferError::ZeroChunkSize)
        ));
    }

    #[test]
    fn plan_is_idempotent() {
        let a = plan_chunks(12_345, 1000).unwrap();
        let b = plan_chunks(12_345, 1000).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn read_chunk_returns_exact_range() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let chunks = plan_chunks(10, 4).unwrap();
        assert_eq!(read_chunk(&path, &chunks[0]).await.unwrap(), b"AABB");
        assert_eq!(read_chunk(&path, &chunks[1]).await.unwrap(), b"CCDD");
        assert_eq!(read_chunk(&path, &chunks[2]).await.unwrap(), b"EE");
    }

    #[tokio::test]
    async fn read_chunk_reassembles_original() {
        let dir = TempDir::new().unwrap();
        let original = b"The quick brown fox jumps over the lazy dog";
        let path = create_test_file(dir.path(), "fox.txt", original);

        let mut reassembled = Vec::new();
        for chunk in plan_chunks(original.len() as u64, 7).unwrap() {
            reassembled.extend(read_chunk(&path, &chunk).await.unwrap());
        }
        assert_eq!(&reassembled, original);
    }

    #[tokio::test]
    async fn read_chunk_past_eof_is_short_read() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "small.bin", b"abc");

        let chunk = ChunkDescriptor::new(1, 2, 8);
        let err = read_chunk(&path, &chunk).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::ShortRead {
                index: 1,
                expected: 6,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn read_chunk_missing_file() {
        let dir = TempDir::new().unwrap();
        let chunk = ChunkDescriptor::new(0, 0, 1);
        let err = read_chunk(&dir.path().join("missing"), &chunk)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
