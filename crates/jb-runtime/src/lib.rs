#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jb_types::{Fault, Literal, Outcome, Return};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod worker;

pub use worker::{PendingExecution, dispatch, run_in_process};

/// Signature every subject function is compiled to.
pub type SubjectFn = fn(&[Literal]) -> Result<Return, Fault>;

/// Binds qualified subject names to the functions that implement them.
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    functions: BTreeMap<String, SubjectFn>,
}

impl SubjectTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the function previously bound to `name`, if any.
    pub fn insert(&mut self, name: impl Into<String>, function: SubjectFn) -> Option<SubjectFn> {
        self.functions.insert(name.into(), function)
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, function: SubjectFn) -> Self {
        self.insert(name, function);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<SubjectFn> {
        self.functions.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

/// How one execution actually concluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Observation {
    Returned(Option<Literal>),
    Faulted(Fault),
    TimedOut,
    Crashed(String),
}

impl Observation {
    #[must_use]
    pub fn kind(&self) -> ObservationKind {
        match self {
            Self::Returned(_) => ObservationKind::Returned,
            Self::Faulted(_) => ObservationKind::Faulted,
            Self::TimedOut => ObservationKind::TimedOut,
            Self::Crashed(_) => ObservationKind::Crashed,
        }
    }

    /// The observation in outcome terms; `None` when the subject crashed.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Returned(None) => Some(Outcome::Ok),
            Self::Returned(Some(value)) => Some(Outcome::Value(value.clone())),
            Self::Faulted(fault) => Some(fault.outcome()),
            Self::TimedOut => Some(Outcome::NonTerminating),
            Self::Crashed(_) => None,
        }
    }

    /// Single-line JSON, the wire form between a child process and the harness.
    pub fn encode(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads the last non-blank line of a child's stdout.
    pub fn decode(stdout: &str) -> Result<Self, RuntimeError> {
        let line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| RuntimeError::Protocol("child wrote no observation".to_owned()))?;
        Ok(serde_json::from_str(line)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Returned,
    Faulted,
    TimedOut,
    Crashed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolation {
    /// Detached worker thread; abandoned at the deadline.
    Thread,
    /// `program <args..> exec <subject> <case-index>`; killed at the deadline.
    Process { program: PathBuf, args: Vec<String> },
}

impl Isolation {
    #[must_use]
    pub fn kind(&self) -> IsolationKind {
        match self {
            Self::Thread => IsolationKind::Thread,
            Self::Process { .. } => IsolationKind::Process,
        }
    }

    /// Whether a running execution can be stopped at its deadline. A worker
    /// thread cannot; it keeps running after it is abandoned.
    #[must_use]
    pub fn is_killable(&self) -> bool {
        matches!(self, Self::Process { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    Thread,
    Process,
}

/// What to do with cases declared `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonTerminatingPolicy {
    #[default]
    Skip,
    /// Run under the time limit; still running at the deadline is consistent.
    /// Only honoured under process isolation.
    SmokeTest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub time_limit: Duration,
    pub isolation: Isolation,
    pub non_terminating: NonTerminatingPolicy,
}

impl ExecutionPolicy {
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_millis(1_000);

    #[must_use]
    pub fn thread(time_limit: Duration) -> Self {
        Self {
            time_limit,
            isolation: Isolation::Thread,
            non_terminating: NonTerminatingPolicy::Skip,
        }
    }

    #[must_use]
    pub fn process(program: impl Into<PathBuf>, args: Vec<String>, time_limit: Duration) -> Self {
        Self {
            time_limit,
            isolation: Isolation::Process {
                program: program.into(),
                args,
            },
            non_terminating: NonTerminatingPolicy::Skip,
        }
    }

    #[must_use]
    pub fn with_non_terminating(mut self, policy: NonTerminatingPolicy) -> Self {
        self.non_terminating = policy;
        self
    }

    /// Rejects combinations that would leave executions running after the
    /// harness has moved on: smoke-testing `*` cases needs killable isolation.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.time_limit.is_zero() {
            return Err(RuntimeError::Policy("time limit must be positive".to_owned()));
        }
        if self.non_terminating == NonTerminatingPolicy::SmokeTest && !self.isolation.is_killable()
        {
            return Err(RuntimeError::Policy(
                "smoke-testing non-terminating cases requires process isolation".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::thread(Self::DEFAULT_TIME_LIMIT)
    }
}

/// Identifies one execution; `arguments` are already bound to the subject's
/// parameter types.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub subject: String,
    pub case_index: usize,
    pub arguments: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub ts_unix_ms: u64,
    pub subject: String,
    pub case_index: usize,
    pub isolation: IsolationKind,
    pub elapsed_ms: u64,
    pub observation: ObservationKind,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLedger {
    records: Vec<ExecutionRecord>,
}

impl ExecutionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    #[must_use]
    pub fn count(&self, kind: ObservationKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.observation == kind)
            .count()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("observation protocol error: {0}")]
    Protocol(String),
    #[error("invalid execution policy: {0}")]
    Policy(String),
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
