use std::any::Any;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use jb_types::Literal;

use crate::{
    ExecutionLedger, ExecutionPolicy, ExecutionRecord, ExecutionRequest, Isolation,
    IsolationKind, Observation, SubjectFn, now_unix_ms,
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

enum Running {
    Worker(Receiver<Observation>),
    Child(WatchedChild),
    Settled(Observation),
}

/// A child process whose output pipes are drained while it runs, so a chatty
/// subject cannot block on a full pipe.
struct WatchedChild {
    child: Child,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
}

/// An execution that has been started but not yet observed.
///
/// The deadline is measured from dispatch, so many executions can be started
/// before any of them is settled.
pub struct PendingExecution {
    subject: String,
    case_index: usize,
    isolation: IsolationKind,
    started: Instant,
    running: Running,
}

/// Starts `function` on the request's arguments under the policy's isolation.
pub fn dispatch(
    policy: &ExecutionPolicy,
    request: ExecutionRequest,
    function: SubjectFn,
) -> PendingExecution {
    let started = Instant::now();
    let running = match &policy.isolation {
        Isolation::Thread => spawn_worker(&request, function),
        Isolation::Process { program, args } => {
            let spawned = Command::new(program)
                .args(args)
                .arg("exec")
                .arg(&request.subject)
                .arg(request.case_index.to_string())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn();
            match spawned {
                Ok(child) => watch_child(child),
                Err(err) => Running::Settled(Observation::Crashed(format!(
                    "failed to spawn {}: {err}",
                    program.display()
                ))),
            }
        }
    };
    PendingExecution {
        subject: request.subject,
        case_index: request.case_index,
        isolation: policy.isolation.kind(),
        started,
        running,
    }
}

fn spawn_worker(request: &ExecutionRequest, function: SubjectFn) -> Running {
    let (tx, rx) = mpsc::channel();
    let arguments = request.arguments.clone();
    let spawned = thread::Builder::new()
        .name(format!("jb-{}#{}", request.subject, request.case_index))
        .spawn(move || {
            // Receiver may be gone if the deadline already passed.
            let _ = tx.send(run_in_process(function, &arguments));
        });
    match spawned {
        Ok(_detached) => Running::Worker(rx),
        Err(err) => Running::Settled(Observation::Crashed(format!(
            "failed to spawn worker thread: {err}"
        ))),
    }
}

fn watch_child(mut child: Child) -> Running {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    match (stdout, stderr) {
        (Ok(stdout), Ok(stderr)) => Running::Child(WatchedChild {
            child,
            stdout,
            stderr,
        }),
        (Err(err), _) | (_, Err(err)) => {
            let _ = child.kill();
            let _ = child.wait();
            Running::Settled(Observation::Crashed(format!(
                "failed to spawn pipe reader: {err}"
            )))
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::io::Result<JoinHandle<Vec<u8>>> {
    thread::Builder::new()
        .name("pipe-reader".to_owned())
        .spawn(move || {
            let mut buffer = Vec::new();
            if let Some(mut pipe) = pipe {
                // A read error leaves whatever arrived before it.
                let _ = pipe.read_to_end(&mut buffer);
            }
            buffer
        })
}

/// Runs `function` on the current thread, containing panics.
pub fn run_in_process(function: SubjectFn, arguments: &[Literal]) -> Observation {
    match panic::catch_unwind(AssertUnwindSafe(|| function(arguments))) {
        Ok(Ok(value)) => Observation::Returned(value),
        Ok(Err(fault)) => Observation::Faulted(fault),
        Err(payload) => Observation::Crashed(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}

impl PendingExecution {
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn case_index(&self) -> usize {
        self.case_index
    }

    /// Blocks until the execution concludes or `time_limit` after dispatch
    /// has elapsed, records the result, and returns it.
    pub fn settle(self, time_limit: Duration, ledger: &mut ExecutionLedger) -> Observation {
        let deadline = self.started + time_limit;
        let observation = match self.running {
            Running::Settled(observation) => observation,
            Running::Worker(rx) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(remaining) {
                    Ok(observation) => observation,
                    Err(RecvTimeoutError::Timeout) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            subject = %self.subject,
                            case = self.case_index,
                            "abandoning worker thread past its deadline"
                        );
                        Observation::TimedOut
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        Observation::Crashed("worker exited without reporting".to_owned())
                    }
                }
            }
            Running::Child(child) => settle_child(child, deadline, &self.subject, self.case_index),
        };

        ledger.push(ExecutionRecord {
            ts_unix_ms: now_unix_ms(),
            subject: self.subject,
            case_index: self.case_index,
            isolation: self.isolation,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            observation: observation.kind(),
        });
        observation
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn settle_child(
    watched: WatchedChild,
    deadline: Instant,
    subject: &str,
    case_index: usize,
) -> Observation {
    let WatchedChild {
        mut child,
        stdout,
        stderr,
    } = watched;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return read_child(status, stdout, stderr),
            Ok(None) => {
                let now = Instant::now();
                if now >= deadline {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        subject = %subject,
                        case = case_index,
                        pid = child.id(),
                        "killing child process past its deadline"
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    // The readers finish once the killed child's pipes close.
                    return Observation::TimedOut;
                }
                thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Observation::Crashed(format!("lost track of child process: {err}"));
            }
        }
    }
}

fn read_child(
    status: ExitStatus,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
) -> Observation {
    let stdout = stdout.join().unwrap_or_default();
    let stdout = String::from_utf8_lossy(&stdout);
    match Observation::decode(&stdout) {
        Ok(observation) => observation,
        Err(err) => {
            let stderr = stderr.join().unwrap_or_default();
            let stderr = String::from_utf8_lossy(&stderr);
            Observation::Crashed(format!(
                "child exited with {status} ({err}): {}",
                stderr.trim()
            ))
        }
    }
}
