use std::time::Instant;

use chunkup_protocol::types::{UploadPhase, UploadProgress};

/// Aggregates chunk completions into [`UploadProgress`] snapshots.
///
/// Bytes the server already held when the session started are counted
/// towards the percentage but not towards the speed, since they were never
/// sent in this session.
///
/// The speed clock starts when the tracker is created. The uploader builds
/// it once the chunk plan and the server's chunk list are known, so time
/// spent hashing and checking is not averaged into the reported speed.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_bytes: u64,
    total_chunks: usize,
    uploaded_bytes: u64,
    uploaded_chunks: usize,
    transferred_bytes: u64,
    started_at: Instant,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, total_chunks: usize) -> Self {
        Self::starting_at(total_bytes, total_chunks, Instant::now())
    }

    pub fn starting_at(total_bytes: u64, total_chunks: usize, started_at: Instant) -> Self {
        Self {
            total_bytes,
            total_chunks,
            uploaded_bytes: 0,
            uploaded_chunks: 0,
            transferred_bytes: 0,
            started_at,
        }
    }

    /// Accounts for chunks the server reported as already present.
    pub fn seed(&mut self, chunks: usize, bytes: u64) {
        self.uploaded_chunks += chunks;
        self.uploaded_bytes += bytes;
    }

    /// Records one chunk sent during this session.
    pub fn record_chunk(&mut self, size: u64) -> UploadProgress {
        self.record_chunk_at(size, Instant::now())
    }

    pub fn record_chunk_at(&mut self, size: u64, now: Instant) -> UploadProgress {
        self.uploaded_chunks += 1;
        self.uploaded_bytes += size;
        self.transferred_bytes += size;
        self.snapshot_at(UploadPhase::Uploading, now)
    }

    pub fn snapshot(&self, phase: UploadPhase) -> UploadProgress {
        self.snapshot_at(phase, Instant::now())
    }

    pub fn snapshot_at(&self, phase: UploadPhase, now: Instant) -> UploadProgress {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let speed = if elapsed > 0.0 {
            self.transferred_bytes as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total_bytes.saturating_sub(self.uploaded_bytes);
        let eta_secs = if speed > 0.0 {
            remaining as f64 / speed
        } else {
            0.0
        };
        let percentage = if self.total_bytes == 0 {
            if self.uploaded_chunks >= self.total_chunks { 100.0 } else { 0.0 }
        } else {
            (self.uploaded_bytes as f64 * 100.0 / self.total_bytes as f64).min(100.0)
        };

        UploadProgress {
            total_bytes: self.total_bytes,
            uploaded_bytes: self.uploaded_bytes,
            percentage,
            speed,
            eta_secs,
            uploaded_chunks: self.uploaded_chunks,
            total_chunks: self.total_chunks,
            phase,
        }
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks >= self.total_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_tracker_reports_zero() {
        let tracker = ProgressTracker::new(100, 4);
        let p = tracker.snapshot(UploadPhase::Preparing);
        assert_eq!(p.uploaded_bytes, 0);
        assert_eq!(p.percentage, 0.0);
        assert_eq!(p.speed, 0.0);
        assert_eq!(p.eta_secs, 0.0);
        assert_eq!(p.phase, UploadPhase::Preparing);
    }

    #[test]
    fn record_chunk_updates_speed_and_eta() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(1000, 4, start);

        let p = tracker.record_chunk_at(250, start + Duration::from_secs(1));
        assert_eq!(p.uploaded_chunks, 1);
        assert_eq!(p.uploaded_bytes, 250);
        assert_eq!(p.percentage, 25.0);
        assert_eq!(p.speed, 250.0);
        assert_eq!(p.eta_secs, 3.0);
        assert_eq!(p.phase, UploadPhase::Uploading);
    }

    #[test]
    fn seeded_bytes_count_for_percentage_not_speed() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(1000, 4, start);
        tracker.seed(2, 500);

        let p = tracker.snapshot_at(UploadPhase::Uploading, start + Duration::from_secs(1));
        assert_eq!(p.percentage, 50.0);
        assert_eq!(p.speed, 0.0);
        assert_eq!(p.eta_secs, 0.0);

        let p = tracker.record_chunk_at(250, start + Duration::from_secs(2));
        assert_eq!(p.uploaded_chunks, 3);
        assert_eq!(p.percentage, 75.0);
        assert_eq!(p.speed, 125.0);
        assert_eq!(p.eta_secs, 2.0);
    }

    #[test]
    fn complete_session_reaches_100() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(30, 3, start);
        for i in 1..=3 {
            tracker.record_chunk_at(10, start + Duration::from_secs(i));
        }
        let p = tracker.snapshot_at(UploadPhase::Merging, start + Duration::from_secs(3));
        assert!(tracker.is_complete());
        assert_eq!(p.percentage, 100.0);
        assert_eq!(p.eta_secs, 0.0);
    }

    #[test]
    fn empty_file_is_complete_immediately() {
        let tracker = ProgressTracker::new(0, 0);
        assert!(tracker.is_complete());
        assert_eq!(tracker.snapshot(UploadPhase::Merging).percentage, 100.0);
    }
}
