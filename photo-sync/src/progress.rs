//! Weighted progress reporting for the multi-phase sync session.
//!
//! Item counts per phase are unknown until the diff is computed, so the
//! overall percentage is derived from fixed per-phase weights: the weights
//! of all completed earlier phases plus the current phase scaled by its
//! item ratio, clamped to [0, 100] and forced monotonic.

use std::fmt;

/// Phases of one sync session, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Initializing,
    CalculatingDiff,
    PullDeleting,
    PullDownloading,
    PullUpdating,
    PullReplacing,
    PushDeleting,
    PushUploading,
    PushUpdating,
    PushReplacing,
    Finalizing,
    Completed,
    Failed,
}

/// Execution order of the weighted phases
const PHASE_ORDER: [SyncPhase; 11] = [
    SyncPhase::Initializing,
    SyncPhase::CalculatingDiff,
    SyncPhase::PullDeleting,
    SyncPhase::PullDownloading,
    SyncPhase::PullUpdating,
    SyncPhase::PullReplacing,
    SyncPhase::PushDeleting,
    SyncPhase::PushUploading,
    SyncPhase::PushUpdating,
    SyncPhase::PushReplacing,
    SyncPhase::Finalizing,
];

impl SyncPhase {
    /// Relative weight of this phase in the overall percentage. Transfer
    /// phases dominate; the weights over-sum slightly and are clamped.
    pub fn weight(self) -> f64 {
        match self {
            SyncPhase::Initializing => 5.0,
            SyncPhase::CalculatingDiff => 5.0,
            SyncPhase::PullDeleting => 5.0,
            SyncPhase::PullDownloading => 20.0,
            SyncPhase::PullUpdating => 5.0,
            SyncPhase::PullReplacing => 15.0,
            SyncPhase::PushDeleting => 5.0,
            SyncPhase::PushUploading => 20.0,
            SyncPhase::PushUpdating => 5.0,
            SyncPhase::PushReplacing => 15.0,
            SyncPhase::Finalizing => 5.0,
            SyncPhase::Completed | SyncPhase::Failed => 0.0,
        }
    }

    /// Sum of the weights of all phases that run before this one
    fn base_weight(self) -> f64 {
        PHASE_ORDER
            .iter()
            .take_while(|p| **p != self)
            .map(|p| p.weight())
            .sum()
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Initializing => "initializing",
            SyncPhase::CalculatingDiff => "calculating diff",
            SyncPhase::PullDeleting => "applying remote deletions",
            SyncPhase::PullDownloading => "downloading new photos",
            SyncPhase::PullUpdating => "updating local metadata",
            SyncPhase::PullReplacing => "replacing local photos",
            SyncPhase::PushDeleting => "propagating local deletions",
            SyncPhase::PushUploading => "uploading new photos",
            SyncPhase::PushUpdating => "updating remote metadata",
            SyncPhase::PushReplacing => "replacing remote photos",
            SyncPhase::Finalizing => "finalizing",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One progress update emitted to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: SyncPhase,
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub percentage: f64,
}

/// Sink for progress events, injected per sync call
pub type ProgressSink = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Maps (phase, current, total) to a monotonically non-decreasing overall
/// percentage and forwards the event to the sink.
pub struct ProgressReporter {
    sink: ProgressSink,
    last_percentage: f64,
}

impl ProgressReporter {
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            sink,
            last_percentage: 0.0,
        }
    }

    /// Sink that only logs, for headless callers
    pub fn logging() -> Self {
        Self::new(Box::new(|event: ProgressEvent| {
            log::info!(
                "sync {:.0}%: {} ({}/{}) {}",
                event.percentage,
                event.phase,
                event.current,
                event.total,
                event.message
            );
        }))
    }

    pub fn report(
        &mut self,
        phase: SyncPhase,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) {
        let percentage = self.percentage_for(phase, current, total);
        (self.sink)(ProgressEvent {
            phase,
            current,
            total,
            message: message.into(),
            percentage,
        });
    }

    fn percentage_for(&mut self, phase: SyncPhase, current: usize, total: usize) -> f64 {
        let raw = match phase {
            SyncPhase::Completed => 100.0,
            SyncPhase::Failed => 0.0,
            _ => {
                // An empty phase counts as fully done the moment it starts.
                let ratio = if total == 0 {
                    1.0
                } else {
                    (current as f64 / total as f64).min(1.0)
                };
                phase.base_weight() + phase.weight() * ratio
            }
        };
        let clamped = raw.clamp(0.0, 100.0);

        if phase == SyncPhase::Failed {
            self.last_percentage = 0.0;
            return 0.0;
        }
        // Never move backwards within a session.
        self.last_percentage = self.last_percentage.max(clamped);
        self.last_percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting_reporter() -> (ProgressReporter, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let reporter = ProgressReporter::new(Box::new(move |event| {
            sink_events.lock().unwrap().push(event);
        }));
        (reporter, events)
    }

    #[test]
    fn test_percentages_are_monotonic_and_end_at_100() {
        let (mut reporter, events) = collecting_reporter();

        reporter.report(SyncPhase::Initializing, 0, 1, "start");
        reporter.report(SyncPhase::Initializing, 1, 1, "done");
        reporter.report(SyncPhase::CalculatingDiff, 1, 1, "diff");
        reporter.report(SyncPhase::PullDeleting, 0, 0, "nothing to delete");
        reporter.report(SyncPhase::PullDownloading, 1, 4, "");
        reporter.report(SyncPhase::PullDownloading, 4, 4, "");
        reporter.report(SyncPhase::PullUpdating, 0, 0, "");
        reporter.report(SyncPhase::PullReplacing, 0, 0, "");
        reporter.report(SyncPhase::PushDeleting, 2, 2, "");
        reporter.report(SyncPhase::PushUploading, 9, 10, "");
        reporter.report(SyncPhase::PushUpdating, 0, 0, "");
        reporter.report(SyncPhase::PushReplacing, 3, 3, "");
        reporter.report(SyncPhase::Finalizing, 1, 1, "");
        reporter.report(SyncPhase::Completed, 0, 0, "done");

        let events = events.lock().unwrap();
        let percentages: Vec<f64> = events.iter().map(|e| e.percentage).collect();
        assert!(
            percentages.windows(2).all(|w| w[0] <= w[1]),
            "percentages must be non-decreasing: {:?}",
            percentages
        );
        assert_eq!(*percentages.last().unwrap(), 100.0);
    }

    #[test]
    fn test_weights_are_clamped_to_100() {
        let (mut reporter, events) = collecting_reporter();
        for phase in PHASE_ORDER {
            reporter.report(phase, 1, 1, "");
        }
        let events = events.lock().unwrap();
        assert!(events.iter().all(|e| e.percentage <= 100.0));
        // The raw weights sum past 100; the tail phases saturate.
        assert_eq!(events.last().unwrap().percentage, 100.0);
    }

    #[test]
    fn test_failed_reports_zero() {
        let (mut reporter, events) = collecting_reporter();
        reporter.report(SyncPhase::PushUploading, 3, 10, "");
        reporter.report(SyncPhase::Failed, 0, 0, "network error");
        let events = events.lock().unwrap();
        assert_eq!(events.last().unwrap().percentage, 0.0);
    }

    #[test]
    fn test_completed_reports_exactly_100() {
        let (mut reporter, events) = collecting_reporter();
        reporter.report(SyncPhase::Initializing, 1, 1, "");
        reporter.report(SyncPhase::Completed, 0, 0, "already in sync");
        assert_eq!(events.lock().unwrap().last().unwrap().percentage, 100.0);
    }

    #[test]
    fn test_partial_phase_scales_by_item_ratio() {
        let (mut reporter, events) = collecting_reporter();
        reporter.report(SyncPhase::PullDownloading, 1, 2, "");
        let events = events.lock().unwrap();
        // Everything before downloading (5+5+5) plus half of its 20.
        assert_eq!(events[0].percentage, 25.0);
    }
}
