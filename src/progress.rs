//! Observer trait for per-request pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive state
//! transitions and per-stage reports as a request moves through the pipeline.
//! The CLI uses it to drive a spinner; a server would forward the events to
//! its own telemetry.
//!
//! # Example
//!
//! ```rust
//! use torsion_rings::{PipelineConfig, PipelineObserver, PipelineState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     transitions: AtomicUsize,
//! }
//!
//! impl PipelineObserver for CountingObserver {
//!     fn on_state_change(&self, request_id: &str, state: PipelineState) {
//!         self.transitions.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{request_id}: {state}");
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { transitions: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .observer(observer as Arc<dyn PipelineObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::StageReport;
use crate::state::PipelineState;
use std::sync::Arc;

/// Called by the orchestrator as each request progresses.
///
/// Implementations must be `Send + Sync`: batches run several requests at
/// once, so calls for different `request_id`s may arrive concurrently. All
/// methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// A request passed validation and owns a workspace.
    fn on_request_start(&self, request_id: &str, artifact_name: &str) {
        let _ = (request_id, artifact_name);
    }

    /// The request entered `state`.
    fn on_state_change(&self, request_id: &str, state: PipelineState) {
        let _ = (request_id, state);
    }

    /// A stage finished, produced or skipped.
    fn on_stage_complete(&self, request_id: &str, report: &StageReport) {
        let _ = (request_id, report);
    }

    /// The request reached `Done` (`success = true`) or `Failed`.
    fn on_request_complete(&self, request_id: &str, success: bool) {
        let _ = (request_id, success);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Stage;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<PipelineState>>,
        stages: Mutex<Vec<Stage>>,
    }

    impl PipelineObserver for Recorder {
        fn on_state_change(&self, _request_id: &str, state: PipelineState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_stage_complete(&self, _request_id: &str, report: &StageReport) {
            self.stages.lock().unwrap().push(report.stage);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_request_start("r1", "input.pdb");
        o.on_state_change("r1", PipelineState::Extracting);
        o.on_stage_complete("r1", &StageReport::produced(Stage::Extraction, 12));
        o.on_request_complete("r1", true);
    }

    #[test]
    fn recorder_receives_events() {
        let rec = Recorder::default();
        rec.on_state_change("r", PipelineState::Extracting);
        rec.on_state_change("r", PipelineState::Encoding);
        rec.on_stage_complete("r", &StageReport::produced(Stage::Extraction, 5));
        assert_eq!(
            *rec.states.lock().unwrap(),
            vec![PipelineState::Extracting, PipelineState::Encoding]
        );
        assert_eq!(*rec.stages.lock().unwrap(), vec![Stage::Extraction]);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: ProgressObserver = Arc::new(NoopObserver);
        o.on_request_complete("r", false);
    }
}
