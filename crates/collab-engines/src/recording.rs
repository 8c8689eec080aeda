//! Recording pipeline - captures a media stream into timed segments.
//!
//! State machine: `idle -> recording <-> paused -> idle` (via `stop`).
//! Media arrives as chunks and is buffered only while `recording`; `stop`
//! concatenates the chunks into one segment. The segment duration comes from
//! an independently-ticking accumulated timer, not from chunk metadata, so a
//! dropped chunk never shortens the reported duration.
//!
//! Capture acquisition is a [`MediaSource`]; the device is released on every
//! exit path - `stop`, explicit shutdown, and drop.
//!
//! Time is passed in explicitly (`Instant` parameters) so the timer is
//! testable without a clock.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineError;

/// Handle to an underlying capture device.
///
/// `open` acquires the device and fails with `CaptureUnavailable` when it
/// cannot be acquired; `close` must be safe to call more than once.
pub trait MediaSource: Send {
    /// Acquire the capture device.
    fn open(&mut self) -> Result<(), EngineError>;

    /// Release the capture device.
    fn close(&mut self);

    /// MIME content type of the produced media (e.g. `video/webm`).
    fn content_type(&self) -> &str;

    /// File extension for the finalized artifact (e.g. `webm`).
    fn file_extension(&self) -> &str;
}

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Recording,
    Paused,
}

/// A finalized recording: one opaque media blob plus metadata.
#[derive(Debug, Clone)]
pub struct RecordingSegment {
    /// Segment id, unique within the session.
    pub segment_id: String,
    /// Concatenated media chunks.
    pub media: Bytes,
    /// MIME content type.
    pub content_type: String,
    /// Download file name, `class-recording-<ISO date>.<ext>`.
    pub file_name: String,
    /// Recorded duration from the pipeline timer.
    pub duration_seconds: f64,
    /// When the segment was finalized.
    pub timestamp: DateTime<Utc>,
}

impl RecordingSegment {
    /// Serializable descriptor (everything but the blob itself).
    #[must_use]
    pub fn descriptor(&self) -> SegmentDescriptor {
        SegmentDescriptor {
            segment_id: self.segment_id.clone(),
            content_type: self.content_type.clone(),
            file_name: self.file_name.clone(),
            duration_seconds: self.duration_seconds,
            timestamp: self.timestamp,
            size_bytes: self.media.len(),
        }
    }
}

/// Wire-ready segment metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentDescriptor {
    pub segment_id: String,
    pub content_type: String,
    pub file_name: String,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: usize,
}

/// Recording pipeline for one session.
pub struct RecordingPipeline {
    state: PipelineState,
    source: Option<Box<dyn MediaSource>>,
    chunks: Vec<Bytes>,
    /// Time accumulated in `recording` before the current stretch.
    recorded: Duration,
    /// Start of the current `recording` stretch, if recording.
    resumed_at: Option<Instant>,
    segments: Vec<RecordingSegment>,
}

impl std::fmt::Debug for RecordingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingPipeline")
            .field("state", &self.state)
            .field("chunks", &self.chunks.len())
            .field("segments", &self.segments.len())
            .finish_non_exhaustive()
    }
}

impl Default for RecordingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            source: None,
            chunks: Vec::new(),
            recorded: Duration::ZERO,
            resumed_at: None,
            segments: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Finalized segments, oldest first.
    #[must_use]
    pub fn list_segments(&self) -> &[RecordingSegment] {
        &self.segments
    }

    /// Acquire the capture device and start recording.
    ///
    /// On acquisition failure the state remains `idle` and the source is
    /// released.
    pub fn start(
        &mut self,
        mut source: Box<dyn MediaSource>,
        now: Instant,
    ) -> Result<(), EngineError> {
        if self.state != PipelineState::Idle {
            return Err(EngineError::Conflict("Recording already in progress".to_string()));
        }

        if let Err(e) = source.open() {
            source.close();
            return Err(e);
        }

        self.source = Some(source);
        self.chunks.clear();
        self.recorded = Duration::ZERO;
        self.resumed_at = Some(now);
        self.state = PipelineState::Recording;

        info!(target: "lc.engine.recording", "Recording started");
        Ok(())
    }

    /// Buffer a media chunk. Chunks are accepted only while `recording`;
    /// anything else is discarded. Returns whether the chunk was kept.
    pub fn push_chunk(&mut self, data: Bytes) -> bool {
        if self.state == PipelineState::Recording {
            self.chunks.push(data);
            true
        } else {
            false
        }
    }

    /// Pause recording. A no-op outside `recording`.
    pub fn pause(&mut self, now: Instant) {
        if self.state == PipelineState::Recording {
            if let Some(resumed_at) = self.resumed_at.take() {
                self.recorded += now.duration_since(resumed_at);
            }
            self.state = PipelineState::Paused;
            debug!(target: "lc.engine.recording", "Recording paused");
        }
    }

    /// Resume recording. A no-op outside `paused`.
    pub fn resume(&mut self, now: Instant) {
        if self.state == PipelineState::Paused {
            self.resumed_at = Some(now);
            self.state = PipelineState::Recording;
            debug!(target: "lc.engine.recording", "Recording resumed");
        }
    }

    /// Stop recording, finalize the segment and release the device.
    pub fn stop(&mut self, now: Instant) -> Result<RecordingSegment, EngineError> {
        if self.state == PipelineState::Idle {
            return Err(EngineError::Conflict("No recording in progress".to_string()));
        }

        if let Some(resumed_at) = self.resumed_at.take() {
            self.recorded += now.duration_since(resumed_at);
        }

        let (content_type, extension) = match self.source.take() {
            Some(mut source) => {
                let meta = (
                    source.content_type().to_string(),
                    source.file_extension().to_string(),
                );
                source.close();
                meta
            }
            None => ("application/octet-stream".to_string(), "bin".to_string()),
        };

        let mut media = BytesMut::with_capacity(self.chunks.iter().map(Bytes::len).sum());
        for chunk in self.chunks.drain(..) {
            media.extend_from_slice(&chunk);
        }

        let timestamp = Utc::now();
        let segment = RecordingSegment {
            segment_id: Uuid::new_v4().to_string(),
            media: media.freeze(),
            content_type,
            file_name: format!(
                "class-recording-{}.{extension}",
                timestamp.format("%Y-%m-%d")
            ),
            duration_seconds: self.recorded.as_secs_f64(),
            timestamp,
        };

        self.recorded = Duration::ZERO;
        self.state = PipelineState::Idle;
        self.segments.push(segment.clone());

        info!(
            target: "lc.engine.recording",
            duration_seconds = segment.duration_seconds,
            size_bytes = segment.media.len(),
            "Recording finalized"
        );
        Ok(segment)
    }

    /// Abort any in-flight recording and release the device without
    /// producing a segment. Session-end cleanup hook.
    pub fn shutdown(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.chunks.clear();
        self.recorded = Duration::ZERO;
        self.resumed_at = None;
        self.state = PipelineState::Idle;
    }
}

impl Drop for RecordingPipeline {
    fn drop(&mut self) {
        // Last-resort device release.
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Fake source that records open/close calls and can be set to fail.
    struct FakeSource {
        fail_open: bool,
        opened: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl FakeSource {
        fn tracked(fail_open: bool) -> (Box<Self>, Arc<AtomicBool>, Arc<AtomicBool>) {
            let opened = Arc::new(AtomicBool::new(false));
            let closed = Arc::new(AtomicBool::new(false));
            (
                Box::new(Self {
                    fail_open,
                    opened: Arc::clone(&opened),
                    closed: Arc::clone(&closed),
                }),
                opened,
                closed,
            )
        }
    }

    impl MediaSource for FakeSource {
        fn open(&mut self) -> Result<(), EngineError> {
            if self.fail_open {
                return Err(EngineError::CaptureUnavailable("device busy".to_string()));
            }
            self.opened.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn content_type(&self) -> &str {
            "video/webm"
        }

        fn file_extension(&self) -> &str {
            "webm"
        }
    }

    #[test]
    fn test_full_recording_cycle() {
        let mut pipeline = RecordingPipeline::new();
        let (source, opened, closed) = FakeSource::tracked(false);
        let t0 = Instant::now();

        pipeline.start(source, t0).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Recording);
        assert!(opened.load(Ordering::SeqCst));

        assert!(pipeline.push_chunk(Bytes::from_static(b"aaa")));
        assert!(pipeline.push_chunk(Bytes::from_static(b"bbb")));

        let segment = pipeline.stop(t0 + Duration::from_secs(90)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(&segment.media[..], b"aaabbb");
        assert!((segment.duration_seconds - 90.0).abs() < 0.001);
        assert_eq!(segment.content_type, "video/webm");
        assert!(segment.file_name.starts_with("class-recording-"));
        assert!(segment.file_name.ends_with(".webm"));
        assert_eq!(pipeline.list_segments().len(), 1);
    }

    #[test]
    fn test_pause_excludes_time_and_chunks() {
        let mut pipeline = RecordingPipeline::new();
        let (source, _, _) = FakeSource::tracked(false);
        let t0 = Instant::now();

        pipeline.start(source, t0).unwrap();
        pipeline.pause(t0 + Duration::from_secs(10));
        assert_eq!(pipeline.state(), PipelineState::Paused);

        // Chunks while paused are discarded.
        assert!(!pipeline.push_chunk(Bytes::from_static(b"dropped")));

        pipeline.resume(t0 + Duration::from_secs(60));
        assert!(pipeline.push_chunk(Bytes::from_static(b"kept")));

        // 10s recording + 5s after resume; the 50s pause does not count.
        let segment = pipeline.stop(t0 + Duration::from_secs(65)).unwrap();
        assert!((segment.duration_seconds - 15.0).abs() < 0.001);
        assert_eq!(&segment.media[..], b"kept");
    }

    #[test]
    fn test_pause_resume_are_noops_in_wrong_state() {
        let mut pipeline = RecordingPipeline::new();
        let t0 = Instant::now();

        pipeline.pause(t0);
        pipeline.resume(t0);
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let (source, _, _) = FakeSource::tracked(false);
        pipeline.start(source, t0).unwrap();
        // Resume while recording changes nothing.
        pipeline.resume(t0 + Duration::from_secs(1));
        assert_eq!(pipeline.state(), PipelineState::Recording);
    }

    #[test]
    fn test_capture_unavailable_leaves_idle() {
        let mut pipeline = RecordingPipeline::new();
        let (source, _, closed) = FakeSource::tracked(true);

        let result = pipeline.start(source, Instant::now());
        assert!(matches!(result, Err(EngineError::CaptureUnavailable(_))));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        // Failed acquisition still releases the device handle.
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_while_idle_is_conflict() {
        let mut pipeline = RecordingPipeline::new();
        assert!(matches!(
            pipeline.stop(Instant::now()),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn test_double_start_is_conflict() {
        let mut pipeline = RecordingPipeline::new();
        let (first, _, _) = FakeSource::tracked(false);
        let (second, _, _) = FakeSource::tracked(false);
        let t0 = Instant::now();

        pipeline.start(first, t0).unwrap();
        assert!(matches!(
            pipeline.start(second, t0),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn test_stop_from_paused() {
        let mut pipeline = RecordingPipeline::new();
        let (source, _, _) = FakeSource::tracked(false);
        let t0 = Instant::now();

        pipeline.start(source, t0).unwrap();
        pipeline.pause(t0 + Duration::from_secs(30));
        let segment = pipeline.stop(t0 + Duration::from_secs(100)).unwrap();
        assert!((segment.duration_seconds - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_shutdown_releases_device_without_segment() {
        let mut pipeline = RecordingPipeline::new();
        let (source, _, closed) = FakeSource::tracked(false);

        pipeline.start(source, Instant::now()).unwrap();
        pipeline.push_chunk(Bytes::from_static(b"partial"));
        pipeline.shutdown();

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.list_segments().is_empty());
    }

    #[test]
    fn test_drop_releases_device() {
        let (source, _, closed) = FakeSource::tracked(false);
        {
            let mut pipeline = RecordingPipeline::new();
            pipeline.start(source, Instant::now()).unwrap();
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_descriptor_matches_segment() {
        let mut pipeline = RecordingPipeline::new();
        let (source, _, _) = FakeSource::tracked(false);
        let t0 = Instant::now();

        pipeline.start(source, t0).unwrap();
        pipeline.push_chunk(Bytes::from_static(b"xyz"));
        let segment = pipeline.stop(t0 + Duration::from_secs(1)).unwrap();

        let descriptor = segment.descriptor();
        assert_eq!(descriptor.segment_id, segment.segment_id);
        assert_eq!(descriptor.size_bytes, 3);
        assert_eq!(descriptor.file_name, segment.file_name);
    }
}
