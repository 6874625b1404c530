//! Worker Process Entry Point
//!
//! Serves [`HarnessCommand`]s over stdin/stdout until the coordinator sends
//! `Shutdown`, closes the pipe, or SIGTERM arrives. Stdout carries frames only;
//! anything human-readable goes to stderr.

use crate::dispatch::dispatch;
use crate::measure::pin_to_cpu;
use crate::registry::Registry;
use std::io::{Read, Stdin, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use sweepbench_ipc::{
    FrameError, FrameReader, FrameWriter, HarnessCommand, WorkerCapabilities, WorkerMessage,
};

/// Global flag set by SIGTERM handler to request graceful shutdown.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if a graceful shutdown has been requested via SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Install a SIGTERM handler that sets the `SHUTDOWN_REQUESTED` flag.
/// The handler is async-signal-safe (only sets an atomic).
///
/// SIGINT is ignored: a terminal Ctrl-C belongs to the coordinator, which
/// lets the in-flight call finish before it stops the sweep.
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
        libc::signal(libc::SIGINT, libc::SIG_IGN);
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

/// Worker main loop
pub struct WorkerMain<R: Read, W: Write> {
    registry: Registry,
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl WorkerMain<Stdin, Stdout> {
    /// Worker talking to the coordinator over stdin/stdout
    pub fn stdio(registry: Registry) -> Self {
        Self::new(registry, std::io::stdin(), std::io::stdout())
    }
}

impl<R: Read, W: Write> WorkerMain<R, W> {
    /// Worker over an arbitrary byte transport
    pub fn new(registry: Registry, reader: R, writer: W) -> Self {
        Self {
            registry,
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// Run until shutdown. A closed command pipe is a clean exit.
    pub fn run(&mut self) -> Result<(), FrameError> {
        install_sigterm_handler();

        self.writer.write(&WorkerMessage::Hello(WorkerCapabilities::detect(
            self.registry.codec_ids(),
            self.registry.allocator_ids(),
        )))?;

        if let Err(e) = pin_to_cpu(0) {
            tracing::debug!("could not pin worker to cpu 0: {}", e);
        }

        loop {
            if shutdown_requested() {
                tracing::debug!("SIGTERM received, worker exiting");
                break;
            }

            let command: HarnessCommand = match self.reader.read() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                HarnessCommand::Invoke {
                    call_id,
                    invocation,
                } => {
                    let operation = invocation.operation.clone();
                    let reply = match dispatch(&self.registry, invocation) {
                        Ok(outcome) => WorkerMessage::Completed { call_id, outcome },
                        Err(failure) => {
                            tracing::debug!(call_id, %operation, "call failed: {}", failure);
                            WorkerMessage::Failure {
                                call_id,
                                kind: failure.kind,
                                message: failure.message,
                                backtrace: failure.backtrace,
                            }
                        }
                    };
                    self.writer.write(&reply)?;
                }
                HarnessCommand::Shutdown => break,
            }
        }

        Ok(())
    }
}
