//! Execution Harness
//!
//! One harness owns one execution context for one sweep. Two flavours:
//! - [`WorkerProcess`]: re-executes the current binary as an isolated worker and
//!   talks rkyv frames over its stdin/stdout
//! - [`InProcessHarness`]: runs the same dispatch code on a dedicated thread
//!
//! Callers get a `Box<dyn Harness>` from a [`HarnessFactory`] and must hand it
//! back through [`Harness::release`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use sweepbench_core::{DispatchFailure, Registry, dispatch};
use sweepbench_ipc::{
    CallOutcome, FailureKind, FrameError, HarnessCommand, Invocation, PROTOCOL_VERSION,
    WORKER_FLAG, WorkerCapabilities, WorkerMessage, read_frame_async, write_frame_async,
};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;

/// Drain window between SIGTERM and SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Timeout after {0:?} waiting for worker")]
    Timeout(Duration),

    #[error("Worker protocol error: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },

    #[error("{operation} failed ({kind}): {message}")]
    Operation {
        operation: String,
        kind: FailureKind,
        message: String,
    },
}

impl From<FrameError> for HarnessError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::EndOfStream => {
                HarnessError::WorkerCrashed("Worker closed connection unexpectedly".to_string())
            }
            other => HarnessError::Ipc(other.to_string()),
        }
    }
}

impl HarnessError {
    fn from_dispatch(operation: String, failure: DispatchFailure) -> Self {
        HarnessError::Operation {
            operation,
            kind: failure.kind,
            message: failure.message,
        }
    }
}

/// Call surface of one execution context
#[async_trait]
pub trait Harness: Send {
    /// Run one timed operation. The input payload moves into the context.
    async fn call(&mut self, invocation: Invocation) -> Result<CallOutcome, HarnessError>;

    /// Tear the context down. Consumes the handle so it can only happen once.
    async fn release(self: Box<Self>) -> Result<(), HarnessError>;
}

/// Produces a fresh execution context per sweep
#[async_trait]
pub trait HarnessFactory: Send + Sync {
    /// Spawn one context
    async fn acquire(&self) -> Result<Box<dyn Harness>, HarnessError>;
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<(), std::io::Error> {
    Ok(())
}

/// Worker process handle
pub struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    capabilities: WorkerCapabilities,
    timeout: Duration,
    next_call_id: u64,
}

impl WorkerProcess {
    /// Spawn the current executable as a worker
    pub async fn spawn(timeout: Duration) -> Result<Self, HarnessError> {
        let binary = std::env::current_exe().map_err(HarnessError::SpawnFailed)?;
        Self::spawn_binary(&binary, timeout).await
    }

    /// Spawn a specific binary as a worker
    pub async fn spawn_binary(binary: &Path, timeout: Duration) -> Result<Self, HarnessError> {
        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Own process group, so a terminal Ctrl-C reaches only the coordinator
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(HarnessError::SpawnFailed)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(HarnessError::SpawnFailed(std::io::Error::other(
                    "worker stdio was not captured",
                )));
            }
        };

        let mut stdout = BufReader::with_capacity(64 * 1024, stdout);
        let capabilities = match tokio::time::timeout(timeout, Self::wait_for_hello(&mut stdout))
            .await
        {
            Ok(Ok(caps)) => caps,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(e);
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(HarnessError::Timeout(timeout));
            }
        };

        tracing::debug!(
            pid = child.id(),
            cpu = %capabilities.cpu_model,
            codecs = capabilities.codecs.len(),
            "worker ready"
        );

        Ok(Self {
            child,
            stdin,
            stdout,
            capabilities,
            timeout,
            next_call_id: 1,
        })
    }

    /// Wait for Hello message from worker and validate protocol version
    async fn wait_for_hello(
        stdout: &mut BufReader<ChildStdout>,
    ) -> Result<WorkerCapabilities, HarnessError> {
        let msg: WorkerMessage = read_frame_async(stdout).await?;

        match msg {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != PROTOCOL_VERSION {
                    return Err(HarnessError::Protocol {
                        expected: format!("protocol version {}", PROTOCOL_VERSION),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                Ok(caps)
            }
            other => Err(HarnessError::Protocol {
                expected: "Hello".to_string(),
                got: format!("{:?}", other),
            }),
        }
    }

    /// Capabilities reported in the handshake
    pub fn capabilities(&self) -> &WorkerCapabilities {
        &self.capabilities
    }

    /// OS process id, while the worker has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM, wait out the grace window, then SIGKILL
    async fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            let _ = send_sigterm(pid);
        }
        if tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
        }
    }
}

#[async_trait]
impl Harness for WorkerProcess {
    async fn call(&mut self, invocation: Invocation) -> Result<CallOutcome, HarnessError> {
        let call_id = self.next_call_id;
        self.next_call_id += 1;
        let operation = invocation.operation.to_string();

        let command = HarnessCommand::Invoke {
            call_id,
            invocation,
        };
        if let Err(e) = write_frame_async(&mut self.stdin, &command).await {
            if !self.is_alive() {
                return Err(HarnessError::WorkerCrashed(format!(
                    "Worker exited before {}",
                    operation
                )));
            }
            return Err(e.into());
        }

        let reply = tokio::time::timeout(
            self.timeout,
            read_frame_async::<_, WorkerMessage>(&mut self.stdout),
        )
        .await;

        let msg = match reply {
            Ok(Ok(msg)) => msg,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::warn!("{} timed out after {:?}, terminating worker", operation, self.timeout);
                self.terminate().await;
                return Err(HarnessError::Timeout(self.timeout));
            }
        };

        match msg {
            WorkerMessage::Completed { call_id: id, outcome } if id == call_id => Ok(outcome),
            WorkerMessage::Failure {
                call_id: id,
                kind,
                message,
                backtrace,
            } if id == call_id => {
                if let Some(bt) = backtrace {
                    tracing::debug!("worker backtrace:\n{}", bt);
                }
                Err(HarnessError::Operation {
                    operation,
                    kind,
                    message,
                })
            }
            other => Err(HarnessError::Protocol {
                expected: format!("reply to call {}", call_id),
                got: format!("{:?}", other),
            }),
        }
    }

    async fn release(mut self: Box<Self>) -> Result<(), HarnessError> {
        // A dead worker cannot take the command; that is fine at teardown
        let _ = write_frame_async(&mut self.stdin, &HarnessCommand::Shutdown).await;

        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("worker exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(HarnessError::WorkerCrashed(e.to_string())),
            Err(_) => {
                tracing::warn!("worker ignored shutdown, terminating");
                self.terminate().await;
                Ok(())
            }
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            tracing::debug!("worker handle dropped without release, killing");
            let _ = self.child.start_kill();
        }
    }
}

/// Spawns [`WorkerProcess`]es
#[derive(Debug, Clone)]
pub struct ProcessHarnessFactory {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessHarnessFactory {
    /// Workers re-execute the current binary
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: None,
            timeout,
        }
    }

    /// Workers run a specific binary
    pub fn with_binary(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: Some(binary.into()),
            timeout,
        }
    }
}

#[async_trait]
impl HarnessFactory for ProcessHarnessFactory {
    async fn acquire(&self) -> Result<Box<dyn Harness>, HarnessError> {
        let worker = match &self.binary {
            Some(binary) => WorkerProcess::spawn_binary(binary, self.timeout).await?,
            None => WorkerProcess::spawn(self.timeout).await?,
        };
        Ok(Box::new(worker))
    }
}

type Request = (
    Invocation,
    oneshot::Sender<Result<CallOutcome, DispatchFailure>>,
);

/// Same-process execution context on a dedicated thread
pub struct InProcessHarness {
    requests: std::sync::mpsc::Sender<Request>,
    thread: std::thread::JoinHandle<()>,
}

impl InProcessHarness {
    /// Start the dispatch thread
    pub fn start(registry: Registry) -> Result<Self, HarnessError> {
        let (requests, inbox) = std::sync::mpsc::channel::<Request>();
        let thread = std::thread::Builder::new()
            .name("sweepbench-dispatch".to_string())
            .spawn(move || {
                for (invocation, reply) in inbox {
                    let _ = reply.send(dispatch(&registry, invocation));
                }
            })
            .map_err(HarnessError::SpawnFailed)?;

        Ok(Self { requests, thread })
    }
}

#[async_trait]
impl Harness for InProcessHarness {
    async fn call(&mut self, invocation: Invocation) -> Result<CallOutcome, HarnessError> {
        let operation = invocation.operation.to_string();
        let (reply, response) = oneshot::channel();

        self.requests
            .send((invocation, reply))
            .map_err(|_| HarnessError::WorkerCrashed("dispatch thread is gone".to_string()))?;

        match response.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(failure)) => Err(HarnessError::from_dispatch(operation, failure)),
            Err(_) => Err(HarnessError::WorkerCrashed(
                "dispatch thread dropped the call".to_string(),
            )),
        }
    }

    async fn release(self: Box<Self>) -> Result<(), HarnessError> {
        let Self { requests, thread } = *self;
        drop(requests);

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| HarnessError::WorkerCrashed(e.to_string()))?
            .map_err(|_| HarnessError::WorkerCrashed("dispatch thread panicked".to_string()))
    }
}

/// Starts [`InProcessHarness`]es over a registry
#[derive(Debug, Clone)]
pub struct InProcessHarnessFactory {
    registry: Registry,
}

impl InProcessHarnessFactory {
    /// Factory over the given registry
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HarnessFactory for InProcessHarnessFactory {
    async fn acquire(&self) -> Result<Box<dyn Harness>, HarnessError> {
        Ok(Box::new(InProcessHarness::start(self.registry.clone())?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sweepbench_core::{CodecDef, CodecError};
    use sweepbench_ipc::{Operation, Payload};

    fn reverse(data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
        Ok(data.iter().rev().copied().collect())
    }

    fn reject(_data: &[u8], _level: Option<i32>) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::msg("rejected"))
    }

    pub static REVERSE: CodecDef = CodecDef {
        id: "reverse",
        name: "Reverse",
        order: 0,
        levels: &[1, 2],
        compress: Some(reverse),
        decompress: reverse,
        reference: None,
        lib_size_kb: None,
    };

    pub static REJECT: CodecDef = CodecDef {
        id: "reject",
        name: "Reject",
        order: 1,
        levels: &[],
        compress: Some(reject),
        decompress: reject,
        reference: None,
        lib_size_kb: None,
    };

    pub fn test_registry() -> Registry {
        Registry::from_defs(vec![&REVERSE, &REJECT], Vec::new())
    }

    #[tokio::test]
    async fn test_in_process_call_moves_payload() {
        let factory = InProcessHarnessFactory::new(test_registry());
        let mut harness = factory.acquire().await.unwrap();

        let outcome = harness
            .call(Invocation::new(
                Operation::Compress {
                    codec: "reverse".to_string(),
                },
                Some(1),
                Payload::copy_from(b"abc"),
            ))
            .await
            .unwrap();
        assert_eq!(outcome.output.unwrap().as_slice(), b"cba");

        harness.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_in_process_operation_error() {
        let mut harness = InProcessHarnessFactory::new(test_registry())
            .acquire()
            .await
            .unwrap();

        let err = harness
            .call(Invocation::new(
                Operation::Compress {
                    codec: "reject".to_string(),
                },
                None,
                Payload::default(),
            ))
            .await
            .unwrap_err();

        match err {
            HarnessError::Operation { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Operation);
                assert_eq!(message, "rejected");
            }
            other => panic!("unexpected error: {}", other),
        }

        harness.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let factory = ProcessHarnessFactory::with_binary(
            "/nonexistent/sweepbench-worker",
            Duration::from_secs(1),
        );
        let result = factory.acquire().await;
        assert!(matches!(result, Err(HarnessError::SpawnFailed(_))));
    }

    #[test]
    fn test_end_of_stream_is_crash() {
        let err: HarnessError = FrameError::EndOfStream.into();
        assert!(matches!(err, HarnessError::WorkerCrashed(_)));
    }
}
