//! Progress-callback trait for per-document pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! stage transitions and per-segment results as a document moves through
//! the pipeline.
//!
//! # Example
//!
//! ```rust
//! use esg2sheet::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     classified: Arc<AtomicUsize>,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_segment_complete(&self, _doc: &str, index: usize, total: usize, rows: usize) {
//!         self.classified.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("segment {}/{}: {} rows", index + 1, total, rows);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     classified: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::PipelineStage;
use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// Implementations must be `Send + Sync`: segments of one document and
/// documents of one batch are processed concurrently. All methods have
/// no-op defaults.
///
/// Every method receives the document label (the input file name) so one
/// callback can serve a whole batch.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called on each state transition, including `Failed`.
    fn on_stage(&self, document: &str, stage: PipelineStage) {
        let _ = (document, stage);
    }

    /// Called once segmentation is done, before any classification call.
    fn on_segments_ready(&self, document: &str, total_segments: usize) {
        let _ = (document, total_segments);
    }

    /// Called when a segment was classified and parsed.
    ///
    /// `index` is 0-based; `rows` may be zero.
    fn on_segment_complete(&self, document: &str, index: usize, total: usize, rows: usize) {
        let _ = (document, index, total, rows);
    }

    /// Called when a segment's response was skipped as unparseable.
    fn on_segment_error(&self, document: &str, index: usize, total: usize, error: &str) {
        let _ = (document, index, total, error);
    }

    /// Called once after the spreadsheet was written.
    fn on_document_complete(&self, document: &str, rows: usize) {
        let _ = (document, rows);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<PipelineStage>>,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage(&self, _document: &str, stage: PipelineStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_segment_complete(&self, _document: &str, _index: usize, _total: usize, _rows: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_error(&self, _document: &str, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage("a.pdf", PipelineStage::Submitted);
        cb.on_segments_ready("a.pdf", 3);
        cb.on_segment_complete("a.pdf", 0, 3, 2);
        cb.on_segment_error("a.pdf", 1, 3, "bad table");
        cb.on_document_complete("a.pdf", 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage("a.pdf", PipelineStage::Submitted);
        tracker.on_stage("a.pdf", PipelineStage::Polling);
        tracker.on_segment_complete("a.pdf", 0, 2, 4);
        tracker.on_segment_error("a.pdf", 1, 2, "junk");

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![PipelineStage::Submitted, PipelineStage::Polling]
        );
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn PipelineProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_stage("b.pdf", PipelineStage::Exported);
        cb.on_document_complete("b.pdf", 10);
    }
}
