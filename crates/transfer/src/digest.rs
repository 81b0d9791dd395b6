use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DEFAULT_HASH_WINDOW, TransferError};

/// Content digest used to identify a file on the server.
///
/// The server stores MD5 hashes, so that is the default. Both ends must
/// agree on the algorithm or instant uploads never match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => f.write_str("md5"),
            HashAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

/// Incremental digest over one of the supported algorithms.
pub enum StreamingDigest {
    Md5(Md5),
    Sha256(Sha256),
}

impl StreamingDigest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => StreamingDigest::Md5(Md5::new()),
            HashAlgorithm::Sha256 => StreamingDigest::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingDigest::Md5(h) => h.update(data),
            StreamingDigest::Sha256(h) => h.update(data),
        }
    }

    /// Consumes the digest and returns lowercase hex.
    pub fn finalize_hex(self) -> String {
        match self {
            StreamingDigest::Md5(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Digest of an in-memory buffer as lowercase hex.
pub fn checksum_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut digest = StreamingDigest::new(algorithm);
    digest.update(data);
    digest.finalize_hex()
}

/// Hashes whole files by reading them in fixed windows.
///
/// Memory use is bounded by the window size no matter how large the file
/// is. Reads are blocking; callers run this on a worker thread.
#[derive(Debug, Clone)]
pub struct WindowedHasher {
    algorithm: HashAlgorithm,
    window_size: usize,
}

impl Default for WindowedHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_HASH_WINDOW)
    }
}

impl WindowedHasher {
    /// A zero `window_size` falls back to [`DEFAULT_HASH_WINDOW`].
    pub fn new(algorithm: HashAlgorithm, window_size: usize) -> Self {
        let window_size = if window_size == 0 {
            DEFAULT_HASH_WINDOW
        } else {
            window_size
        };
        Self {
            algorithm,
            window_size,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Computes the digest of the file at `path`.
    ///
    /// `on_progress` receives the percentage read after every window. Values
    /// never decrease and the last one is exactly 100, also for empty files.
    /// `is_cancelled` is polled between windows; once it returns `true` the
    /// read stops with [`TransferError::Cancelled`].
    pub fn hash_file<P, C>(
        &self,
        path: &Path,
        mut on_progress: P,
        is_cancelled: C,
    ) -> Result<String, TransferError>
    where
        P: FnMut(f64),
        C: Fn() -> bool,
    {
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();

        let mut digest = StreamingDigest::new(self.algorithm);
        let mut buf = vec![0u8; self.window_size];
        let mut read_total: u64 = 0;
        let mut last_reported = 0.0_f64;

        loop {
            if is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let n = fill_window(&mut file, &mut buf)?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
            read_total += n as u64;

            // The file may grow while it is being read; clamp so the
            // reported value stays within 0..=100.
            let pct = if total == 0 {
                100.0
            } else {
                (read_total as f64 * 100.0 / total as f64).min(100.0)
            };
            if pct >= last_reported {
                last_reported = pct;
                if pct < 100.0 {
                    on_progress(pct);
                }
            }
        }

        on_progress(100.0);
        Ok(digest.finalize_hex())
    }
}

/// Reads until `buf` is full or EOF. Returns the number of bytes read.
fn fill_window(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn checksum_known_vectors() {
        assert_eq!(checksum_bytes(HashAlgorithm::Md5, b"abc"), ABC_MD5);
        assert_eq!(checksum_bytes(HashAlgorithm::Sha256, b"abc"), ABC_SHA256);
    }

    #[test]
    fn hash_algorithm_serde() {
        assert_eq!(serde_json::to_string(&HashAlgorithm::Md5).unwrap(), "\"md5\"");
        let alg: HashAlgorithm = serde_json::from_str("\"sha256\"").unwrap();
        assert_eq!(alg, HashAlgorithm::Sha256);
    }

    #[test]
    fn hash_file_matches_in_memory_digest() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let path = create_test_file(dir.path(), "data.bin", &data);

        for window in [1, 7, 4096, 10_000, 1 << 20] {
            for alg in [HashAlgorithm::Md5, HashAlgorithm::Sha256] {
                let hasher = WindowedHasher::new(alg, window);
                let hash = hasher.hash_file(&path, |_| {}, || false).unwrap();
                assert_eq!(hash, checksum_bytes(alg, &data), "window {window}");
            }
        }
    }

    #[test]
    fn hash_file_progress_is_monotonic_and_ends_at_100() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "data.bin", &[7u8; 1000]);

        let mut seen = Vec::new();
        WindowedHasher::new(HashAlgorithm::Md5, 300)
            .hash_file(&path, |p| seen.push(p), || false)
            .unwrap();

        assert_eq!(seen, vec![30.0, 60.0, 90.0, 100.0]);
    }

    #[test]
    fn hash_file_exact_window_multiple_reports_100_once() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "data.bin", &[1u8; 400]);

        let mut seen = Vec::new();
        WindowedHasher::new(HashAlgorithm::Md5, 200)
            .hash_file(&path, |p| seen.push(p), || false)
            .unwrap();

        assert_eq!(seen, vec![50.0, 100.0]);
    }

    #[test]
    fn hash_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");

        let mut seen = Vec::new();
        let hash = WindowedHasher::default()
            .hash_file(&path, |p| seen.push(p), || false)
            .unwrap();

        assert_eq!(hash, EMPTY_MD5);
        assert_eq!(seen, vec![100.0]);
    }

    #[test]
    fn hash_file_stops_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "data.bin", &[0u8; 1000]);

        let windows = Cell::new(0);
        let err = WindowedHasher::new(HashAlgorithm::Md5, 100)
            .hash_file(
                &path,
                |_| windows.set(windows.get() + 1),
                || windows.get() >= 3,
            )
            .unwrap_err();

        assert!(matches!(err, TransferError::Cancelled));
        assert_eq!(windows.get(), 3);
    }

    #[test]
    fn hash_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = WindowedHasher::default()
            .hash_file(&dir.path().join("nope"), |_| {}, || false)
            .unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn zero_window_falls_back_to_default() {
        let hasher = WindowedHasher::new(HashAlgorithm::Sha256, 0);
        assert_eq!(hasher.window_size(), DEFAULT_HASH_WINDOW);
        assert_eq!(hasher.algorithm(), HashAlgorithm::Sha256);
    }
}
