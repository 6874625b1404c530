//! Sweep State Machine
//!
//! `Idle -> Running -> Finished`, with one pure transition function. Every
//! transition yields a new state value; the runner publishes each one as an
//! immutable snapshot.

use crate::harness::HarnessError;
use sweepbench_report::RawSample;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Could not start execution context: {0}")]
    HarnessSpawn(#[source] HarnessError),

    #[error("Invalid state transition: {action} while {state}")]
    InvalidStateTransition {
        action: &'static str,
        state: &'static str,
    },
}

/// How a sweep ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every planned task ran
    Completed,
    /// The cancellation flag was observed between tasks
    Cancelled,
    /// A call failed; remaining tasks were abandoned
    Failed {
        /// Display form of the harness error
        error: String,
    },
}

impl Termination {
    /// Short name for logs and output
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::Cancelled => "cancelled",
            Termination::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Failed { error } => write!(f, "failed: {}", error),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Data carried by an active or finished sweep
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepData {
    /// Input file name
    pub filename: String,
    /// Input size in bytes
    pub total_bytes: u64,
    /// Current progress label
    pub status: Option<String>,
    /// Samples in completion order
    pub samples: Vec<RawSample>,
}

/// Sweep lifecycle
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SweepState {
    /// No input yet
    #[default]
    Idle,
    /// Tasks are being dispatched
    Running(SweepData),
    /// Terminal
    Finished {
        /// Everything collected before the end
        data: SweepData,
        /// Why the sweep stopped
        termination: Termination,
    },
}

/// Transition inputs
#[derive(Debug, Clone, PartialEq)]
pub enum SweepAction {
    /// Start a sweep over a new input
    NewFile {
        /// Input file name
        filename: String,
        /// Input size in bytes
        total_bytes: u64,
    },
    /// Update the progress label
    Status(String),
    /// Append one sample
    NewResult(RawSample),
    /// End the sweep
    Finish(Termination),
}

impl SweepAction {
    /// Action name for errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            SweepAction::NewFile { .. } => "new-file",
            SweepAction::Status(_) => "status",
            SweepAction::NewResult(_) => "new-result",
            SweepAction::Finish(_) => "finish",
        }
    }
}

impl SweepState {
    /// State name for errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            SweepState::Idle => "idle",
            SweepState::Running(_) => "running",
            SweepState::Finished { .. } => "finished",
        }
    }

    /// Sweep data, absent while idle
    pub fn data(&self) -> Option<&SweepData> {
        match self {
            SweepState::Idle => None,
            SweepState::Running(data) | SweepState::Finished { data, .. } => Some(data),
        }
    }

    /// Samples so far
    pub fn samples(&self) -> &[RawSample] {
        self.data().map(|d| d.samples.as_slice()).unwrap_or(&[])
    }

    /// Termination, once finished
    pub fn termination(&self) -> Option<&Termination> {
        match self {
            SweepState::Finished { termination, .. } => Some(termination),
            _ => None,
        }
    }

    /// Whether tasks are being dispatched
    pub fn is_running(&self) -> bool {
        matches!(self, SweepState::Running(_))
    }

    /// Compute the next state. Never mutates `self`.
    pub fn apply(&self, action: SweepAction) -> Result<SweepState, SweepError> {
        match (self, action) {
            (SweepState::Idle, SweepAction::NewFile {
                filename,
                total_bytes,
            }) => Ok(SweepState::Running(SweepData {
                filename,
                total_bytes,
                status: None,
                samples: Vec::new(),
            })),
            (SweepState::Running(data), SweepAction::Status(label)) => {
                let mut data = data.clone();
                data.status = Some(label);
                Ok(SweepState::Running(data))
            }
            (SweepState::Running(data), SweepAction::NewResult(sample)) => {
                let mut data = data.clone();
                data.samples.push(sample);
                Ok(SweepState::Running(data))
            }
            (SweepState::Running(data), SweepAction::Finish(termination)) => {
                let mut data = data.clone();
                data.status = None;
                Ok(SweepState::Finished { data, termination })
            }
            (state, action) => Err(SweepError::InvalidStateTransition {
                action: action.name(),
                state: state.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> SweepState {
        SweepState::Idle
            .apply(SweepAction::NewFile {
                filename: "input.txt".to_string(),
                total_bytes: 100,
            })
            .unwrap()
    }

    #[test]
    fn test_new_file_starts_empty() {
        let state = running();
        assert!(state.is_running());
        let data = state.data().unwrap();
        assert_eq!(data.filename, "input.txt");
        assert_eq!(data.total_bytes, 100);
        assert!(data.samples.is_empty());
        assert!(data.status.is_none());
    }

    #[test]
    fn test_running_accepts_status_and_results() {
        let state = running()
            .apply(SweepAction::Status("zstd-1: (1/3)".to_string()))
            .unwrap()
            .apply(SweepAction::NewResult(RawSample::compression("zstd-1", 1.0, 10)))
            .unwrap();

        assert_eq!(state.data().unwrap().status.as_deref(), Some("zstd-1: (1/3)"));
        assert_eq!(state.samples().len(), 1);
    }

    #[test]
    fn test_apply_does_not_mutate() {
        let before = running();
        let after = before
            .apply(SweepAction::NewResult(RawSample::decompression("lz4", 1.0)))
            .unwrap();
        assert!(before.samples().is_empty());
        assert_eq!(after.samples().len(), 1);
    }

    #[test]
    fn test_status_and_result_rejected_outside_running() {
        let idle = SweepState::Idle;
        assert!(matches!(
            idle.apply(SweepAction::Status("x".to_string())),
            Err(SweepError::InvalidStateTransition {
                action: "status",
                state: "idle"
            })
        ));
        assert!(
            idle.apply(SweepAction::NewResult(RawSample::decompression("lz4", 1.0)))
                .is_err()
        );

        let finished = running()
            .apply(SweepAction::Finish(Termination::Completed))
            .unwrap();
        assert!(
            finished
                .apply(SweepAction::Status("x".to_string()))
                .is_err()
        );
        assert!(
            finished
                .apply(SweepAction::NewResult(RawSample::decompression("lz4", 1.0)))
                .is_err()
        );
        assert!(
            finished
                .apply(SweepAction::Finish(Termination::Completed))
                .is_err()
        );
    }

    #[test]
    fn test_new_file_only_from_idle() {
        let err = running()
            .apply(SweepAction::NewFile {
                filename: "other".to_string(),
                total_bytes: 1,
            })
            .unwrap_err();
        assert!(err.to_string().contains("new-file while running"));
    }

    #[test]
    fn test_finish_keeps_samples() {
        let finished = running()
            .apply(SweepAction::NewResult(RawSample::compression("lz4", 1.0, 5)))
            .unwrap()
            .apply(SweepAction::Finish(Termination::Cancelled))
            .unwrap();

        assert_eq!(finished.samples().len(), 1);
        assert_eq!(finished.termination(), Some(&Termination::Cancelled));
        assert_eq!(finished.data().unwrap().status, None);
    }
}
