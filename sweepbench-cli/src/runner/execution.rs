//! Sweep Execution
//!
//! Drives a [`SweepPlan`] through one harness, one task at a time. The
//! cancellation flag is checked before every dispatch; a running call is never
//! interrupted. The harness is released exactly once on every path.

use super::machine::{SweepAction, SweepData, SweepError, SweepState, Termination};
use crate::harness::{Harness, HarnessFactory};
use crate::planner::{AlgorithmConfig, Direction, SourceBinding, SweepPlan, build_plan};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use sweepbench_ipc::{Invocation, Payload};
use sweepbench_report::RawSample;
use tokio::sync::watch;

/// Shared flag observed between tasks
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// New, unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Withdraw a pending request
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// User input for one sweep
#[derive(Debug, Clone)]
pub struct SweepInput {
    /// File name shown in output and exports
    pub filename: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl SweepInput {
    /// Read a file from disk
    pub fn read(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}

/// Final data of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    /// Everything collected
    pub data: SweepData,
    /// Why the sweep stopped
    pub termination: Termination,
    /// Decode-only algorithms left out of the plan
    pub skipped: Vec<String>,
}

/// Runs sweeps against harnesses from one factory
pub struct SweepRunner {
    factory: Arc<dyn HarnessFactory>,
    iterations: u32,
    cancel: CancellationFlag,
    state: watch::Sender<Arc<SweepState>>,
}

impl SweepRunner {
    /// Create a runner
    pub fn new(factory: Arc<dyn HarnessFactory>, iterations: u32) -> Self {
        let (state, _) = watch::channel(Arc::new(SweepState::Idle));
        Self {
            factory,
            iterations,
            cancel: CancellationFlag::new(),
            state,
        }
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the sweep at the next task boundary
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Observe state snapshots
    pub fn subscribe(&self) -> watch::Receiver<Arc<SweepState>> {
        self.state.subscribe()
    }

    /// Latest snapshot
    pub fn state(&self) -> Arc<SweepState> {
        self.state.borrow().clone()
    }

    fn transition(
        &self,
        current: &mut Arc<SweepState>,
        action: SweepAction,
    ) -> Result<(), SweepError> {
        let next = Arc::new(current.apply(action)?);
        *current = Arc::clone(&next);
        self.state.send_replace(next);
        Ok(())
    }

    /// Run one sweep over `input` with the given algorithm configuration.
    ///
    /// A cancellation requested before or during the call applies to this
    /// sweep only; the flag is clear again once `run` returns.
    pub async fn run(
        &self,
        input: &SweepInput,
        algorithms: &[AlgorithmConfig],
    ) -> Result<SweepResult, SweepError> {
        let plan = build_plan(algorithms, self.iterations);
        tracing::info!(
            file = %input.filename,
            bytes = input.bytes.len(),
            tasks = plan.tasks.len(),
            "starting sweep"
        );
        for id in &plan.skipped {
            tracing::info!("{} skipped: reference payload not in plan", id);
        }

        let mut current = Arc::new(SweepState::Idle);
        self.state.send_replace(Arc::clone(&current));

        let mut harness = match self.factory.acquire().await {
            Ok(harness) => harness,
            Err(e) => {
                self.cancel.reset();
                return Err(SweepError::HarnessSpawn(e));
            }
        };

        let driven = self
            .drive(harness.as_mut(), &plan, input, &mut current)
            .await;
        self.cancel.reset();

        if let Err(e) = harness.release().await {
            tracing::warn!("failed to release execution context: {}", e);
        }

        let termination = driven?;
        match &termination {
            Termination::Failed { error } => tracing::error!("sweep failed: {}", error),
            other => tracing::info!("sweep {}", other),
        }
        self.transition(&mut current, SweepAction::Finish(termination.clone()))?;

        let data = current.data().cloned().unwrap_or_default();
        Ok(SweepResult {
            data,
            termination,
            skipped: plan.skipped,
        })
    }

    async fn drive(
        &self,
        harness: &mut dyn Harness,
        plan: &SweepPlan,
        input: &SweepInput,
        current: &mut Arc<SweepState>,
    ) -> Result<Termination, SweepError> {
        self.transition(
            current,
            SweepAction::NewFile {
                filename: input.filename.clone(),
                total_bytes: input.bytes.len() as u64,
            },
        )?;

        let mut preceding: Option<Payload> = None;
        let mut references: HashMap<usize, Payload> = HashMap::new();

        for (index, task) in plan.tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation observed after {} of {} tasks", index, plan.tasks.len());
                return Ok(Termination::Cancelled);
            }

            self.transition(current, SweepAction::Status(task.status_label(plan.iterations)))?;

            let payload = match task.source {
                SourceBinding::Input => Some(Payload::copy_from(&input.bytes)),
                SourceBinding::PrecedingCompress => preceding.take(),
                SourceBinding::Reference { producer } => references
                    .get(&producer)
                    .map(|p| Payload::copy_from(p.as_slice())),
            };
            let Some(payload) = payload else {
                return Ok(Termination::Failed {
                    error: format!("no input buffer for {}", task.status_label(plan.iterations)),
                });
            };

            tracing::debug!(task = index, "{} {}", task.operation(), task.sample_id());
            let outcome = match harness
                .call(Invocation::new(task.operation(), task.level, payload))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    return Ok(Termination::Failed {
                        error: e.to_string(),
                    });
                }
            };

            let sample = match task.direction {
                Direction::Compress => {
                    let Some(output) = outcome.output else {
                        return Ok(Termination::Failed {
                            error: format!("{} returned no output", task.operation()),
                        });
                    };
                    let size = output.len() as u64;
                    if task.captures_reference {
                        references.insert(index, Payload::copy_from(output.as_slice()));
                    }
                    preceding = Some(output);
                    RawSample::compression(task.sample_id(), outcome.elapsed_ms, size)
                }
                Direction::Decompress => {
                    RawSample::decompression(task.sample_id(), outcome.elapsed_ms)
                }
            };

            self.transition(current, SweepAction::NewResult(sample))?;
        }

        Ok(Termination::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::tests::test_registry;
    use crate::harness::{HarnessError, InProcessHarnessFactory};
    use crate::planner::{Capability, default_algorithms};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use sweepbench_ipc::{CallOutcome, FailureKind, Operation};

    /// Scripted harness: echoes input, optionally fails or cancels at a call
    #[derive(Default)]
    struct Script {
        calls: AtomicUsize,
        releases: AtomicUsize,
        acquires: AtomicUsize,
        fail_at: Option<usize>,
        cancel_after: Option<(usize, CancellationFlag)>,
        spawn_fails: bool,
        seen: Mutex<Vec<(Operation, usize)>>,
    }

    struct ScriptedHarness(Arc<Script>);

    #[async_trait]
    impl Harness for ScriptedHarness {
        async fn call(&mut self, invocation: Invocation) -> Result<CallOutcome, HarnessError> {
            let n = self.0.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.0
                .seen
                .lock()
                .unwrap()
                .push((invocation.operation.clone(), invocation.input.len()));

            if let Some((k, flag)) = &self.0.cancel_after {
                if n == *k {
                    flag.cancel();
                }
            }
            if self.0.fail_at == Some(n) {
                return Err(HarnessError::Operation {
                    operation: invocation.operation.to_string(),
                    kind: FailureKind::Operation,
                    message: "scripted failure".to_string(),
                });
            }

            let output = match invocation.operation {
                // "compress" halves the buffer
                Operation::Compress { .. } => {
                    let mut bytes = invocation.input.into_vec();
                    bytes.truncate(bytes.len() / 2);
                    Some(Payload::new(bytes))
                }
                _ => Some(invocation.input),
            };
            Ok(CallOutcome {
                elapsed_ms: 2.0,
                output,
            })
        }

        async fn release(self: Box<Self>) -> Result<(), HarnessError> {
            self.0.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedFactory(Arc<Script>);

    #[async_trait]
    impl HarnessFactory for ScriptedFactory {
        async fn acquire(&self) -> Result<Box<dyn Harness>, HarnessError> {
            self.0.acquires.fetch_add(1, Ordering::SeqCst);
            if self.0.spawn_fails {
                return Err(HarnessError::SpawnFailed(std::io::Error::other("no worker")));
            }
            Ok(Box::new(ScriptedHarness(Arc::clone(&self.0))))
        }
    }

    fn input() -> SweepInput {
        SweepInput {
            filename: "input.bin".to_string(),
            bytes: vec![7u8; 100],
        }
    }

    fn algorithms() -> Vec<AlgorithmConfig> {
        default_algorithms(&test_registry())
            .into_iter()
            .filter(|a| a.id == "reverse")
            .collect()
    }

    #[tokio::test]
    async fn test_full_sweep_releases_once() {
        let script = Arc::new(Script::default());
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 3);

        let result = runner.run(&input(), &algorithms()).await.unwrap();

        // 2 levels x 3 iterations x 2 tasks
        assert_eq!(result.termination, Termination::Completed);
        assert_eq!(result.data.samples.len(), 12);
        assert_eq!(script.releases.load(Ordering::SeqCst), 1);
        assert_eq!(result.data.samples[0], RawSample::compression("reverse-1", 2.0, 50));
        assert_eq!(result.data.samples[1], RawSample::decompression("reverse-1", 2.0));

        // decompress received the preceding compress output
        let seen = script.seen.lock().unwrap();
        assert_eq!(seen[0].1, 100);
        assert_eq!(seen[1].1, 50);

        let state = runner.state();
        assert_eq!(state.termination(), Some(&Termination::Completed));
    }

    #[tokio::test]
    async fn test_cancellation_after_k_tasks() {
        let flag = CancellationFlag::new();
        let script = Arc::new(Script {
            cancel_after: Some((5, flag.clone())),
            ..Default::default()
        });
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 3)
            .with_cancellation(flag);

        let result = runner.run(&input(), &algorithms()).await.unwrap();

        assert_eq!(result.termination, Termination::Cancelled);
        assert_eq!(result.data.samples.len(), 5);
        assert_eq!(script.calls.load(Ordering::SeqCst), 5);
        assert_eq!(script.releases.load(Ordering::SeqCst), 1);
        assert!(matches!(*runner.state(), SweepState::Finished { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let script = Arc::new(Script::default());
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 3);
        runner.cancellation().cancel();

        let result = runner.run(&input(), &algorithms()).await.unwrap();
        assert_eq!(result.termination, Termination::Cancelled);
        assert!(result.data.samples.is_empty());
        assert_eq!(script.calls.load(Ordering::SeqCst), 0);
        assert_eq!(script.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_runner_reusable_after_cancel() {
        let script = Arc::new(Script::default());
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 1);
        let flag = runner.cancellation();

        flag.cancel();
        let first = runner.run(&input(), &algorithms()).await.unwrap();
        assert_eq!(first.termination, Termination::Cancelled);
        assert!(!flag.is_cancelled());

        let second = runner.run(&input(), &algorithms()).await.unwrap();
        assert_eq!(second.termination, Termination::Completed);
        // 2 levels x 1 iteration x 2 tasks
        assert_eq!(second.data.samples.len(), 4);
        assert_eq!(script.acquires.load(Ordering::SeqCst), 2);
        assert_eq!(script.releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_operation_failure_stops_and_releases() {
        let script = Arc::new(Script {
            fail_at: Some(4),
            ..Default::default()
        });
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 3);

        let result = runner.run(&input(), &algorithms()).await.unwrap();

        match &result.termination {
            Termination::Failed { error } => assert!(error.contains("scripted failure")),
            other => panic!("unexpected termination: {}", other),
        }
        assert_eq!(result.data.samples.len(), 3);
        assert_eq!(script.calls.load(Ordering::SeqCst), 4);
        assert_eq!(script.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_stays_idle() {
        let script = Arc::new(Script {
            spawn_fails: true,
            ..Default::default()
        });
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 3);

        let err = runner.run(&input(), &algorithms()).await.unwrap_err();
        assert!(matches!(err, SweepError::HarnessSpawn(_)));
        assert_eq!(*runner.state(), SweepState::Idle);
        assert_eq!(script.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_snapshots_are_published() {
        let script = Arc::new(Script::default());
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 1);
        let mut rx = runner.subscribe();

        runner.run(&input(), &algorithms()).await.unwrap();

        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.samples().len(), 4);
        assert!(latest.termination().is_some());
    }

    #[tokio::test]
    async fn test_decode_only_uses_reference_payload() {
        let script = Arc::new(Script::default());
        let runner = SweepRunner::new(Arc::new(ScriptedFactory(Arc::clone(&script))), 2);

        let mut algos = algorithms();
        algos.push(AlgorithmConfig {
            id: "unreverse".to_string(),
            enabled: true,
            levels: Vec::new(),
            capability: Capability::DecodeOnly {
                reference: crate::planner::ReferenceSpec {
                    codec: "reverse".to_string(),
                    level: Some(2),
                    iteration: 1,
                },
            },
            lib_size_kb: None,
        });

        let result = runner.run(&input(), &algos).await.unwrap();
        assert_eq!(result.data.samples.len(), 8 + 2);

        let seen = script.seen.lock().unwrap();
        let decode_inputs: Vec<_> = seen
            .iter()
            .filter(|(op, _)| op.target() == "unreverse")
            .map(|(_, len)| *len)
            .collect();
        assert_eq!(decode_inputs, vec![50, 50]);
    }

    #[tokio::test]
    async fn test_in_process_sweep() {
        let factory = InProcessHarnessFactory::new(test_registry());
        let runner = SweepRunner::new(Arc::new(factory), 2);

        let result = runner.run(&input(), &default_algorithms(&test_registry())).await.unwrap();

        // "reject" fails its first compress
        match result.termination {
            Termination::Failed { error } => assert!(error.contains("rejected")),
            other => panic!("unexpected termination: {}", other),
        }
        assert_eq!(result.data.samples.len(), 8);
        assert!(result.data.samples.iter().all(|s| s.family() == "reverse"));
    }
}
