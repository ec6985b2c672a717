use std::fmt;

use jb_case::decode_case;
use jb_registry::{SourceLocation, Subject};
use jb_runtime::{
    ExecutionLedger, ExecutionPolicy, ExecutionRequest, NonTerminatingPolicy, Observation,
    PendingExecution, SubjectFn, dispatch,
};
use jb_types::{Outcome, ParamType, bind_arguments};
use serde::{Deserialize, Serialize};

pub const SKIPPED_NON_TERMINATING: &str = "non-terminating by declaration";
pub const SKIPPED_NOT_KILLABLE: &str = "non-terminating case needs process isolation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail(String),
    Skipped(String),
    /// The case cannot be applied to its subject at all.
    Invalid(String),
}

impl Verdict {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail(_) => "fail",
            Self::Skipped(_) => "skipped",
            Self::Invalid(_) => "invalid",
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Fail(reason) | Self::Skipped(reason) | Self::Invalid(reason) => Some(reason),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {reason}", self.status()),
            None => f.write_str(self.status()),
        }
    }
}

/// A case that is either already decided or waiting on one execution.
pub(crate) enum Prepared {
    Decided(Verdict),
    Running {
        expected: Outcome,
        pending: PendingExecution,
    },
}

impl Prepared {
    pub(crate) fn settle(self, policy: &ExecutionPolicy, ledger: &mut ExecutionLedger) -> Verdict {
        match self {
            Self::Decided(verdict) => verdict,
            Self::Running { expected, pending } => {
                let observation = pending.settle(policy.time_limit, ledger);
                judge(&expected, &observation)
            }
        }
    }
}

/// Starts the case's execution unless its verdict is known up front.
pub(crate) fn prepare(
    subject: &Subject,
    case_index: usize,
    function: SubjectFn,
    policy: &ExecutionPolicy,
) -> Prepared {
    let Some(case) = subject.cases.get(case_index) else {
        return Prepared::Decided(Verdict::Invalid(format!(
            "{} has no case {case_index}",
            subject.qualified_name
        )));
    };
    if case.expected.is_non_terminating() {
        if policy.non_terminating == NonTerminatingPolicy::Skip {
            return Prepared::Decided(Verdict::Skipped(SKIPPED_NON_TERMINATING.to_owned()));
        }
        // An abandoned worker thread would spin for the rest of the process.
        if !policy.isolation.is_killable() {
            return Prepared::Decided(Verdict::Skipped(SKIPPED_NOT_KILLABLE.to_owned()));
        }
    }

    let arguments = match bind_arguments(&subject.params, &case.arguments) {
        Ok(arguments) => arguments,
        Err(err) => return Prepared::Decided(Verdict::Invalid(err.to_string())),
    };
    let request = ExecutionRequest {
        subject: subject.qualified_name.clone(),
        case_index,
        arguments,
    };
    Prepared::Running {
        expected: case.expected.clone(),
        pending: dispatch(policy, request, function),
    }
}

/// Runs one case of `subject` under `policy` and compares the observation
/// with the declared outcome.
#[must_use]
pub fn evaluate(
    subject: &Subject,
    case_index: usize,
    function: SubjectFn,
    policy: &ExecutionPolicy,
) -> Verdict {
    let mut ledger = ExecutionLedger::new();
    prepare(subject, case_index, function, policy).settle(policy, &mut ledger)
}

/// Like [`evaluate`], starting from an undecoded case string.
#[must_use]
pub fn evaluate_raw(
    name: &str,
    params: &[ParamType],
    raw: &str,
    function: SubjectFn,
    policy: &ExecutionPolicy,
) -> Verdict {
    let case = match decode_case(raw) {
        Ok(case) => case,
        Err(err) => return Verdict::Invalid(err.to_string()),
    };
    let subject = Subject {
        qualified_name: name.to_owned(),
        params: params.to_vec(),
        cases: vec![case],
        tags: Default::default(),
        location: SourceLocation::new("<raw>", 0),
    };
    evaluate(&subject, 0, function, policy)
}

/// Compares one observation with the declared outcome.
#[must_use]
pub fn judge(expected: &Outcome, observation: &Observation) -> Verdict {
    match (expected, observation) {
        (Outcome::NonTerminating, Observation::TimedOut) => Verdict::Pass,
        (Outcome::NonTerminating, other) => Verdict::Fail(format!(
            "expected non-termination, got {}",
            describe(other)
        )),
        (_, Observation::TimedOut) => Verdict::Fail("timeout".to_owned()),
        (_, Observation::Crashed(message)) => {
            Verdict::Fail(format!("subject crashed: {message}"))
        }
        // Any normal return satisfies `ok`, value or not.
        (Outcome::Ok, Observation::Returned(_)) => Verdict::Pass,
        (Outcome::Value(want), Observation::Returned(Some(got))) if want.semantic_eq(got) => {
            Verdict::Pass
        }
        (expected, Observation::Faulted(fault)) if expected.same_kind(&fault.outcome()) => {
            Verdict::Pass
        }
        (expected, other) => Verdict::Fail(format!(
            "expected {}, got {}",
            expected.render(),
            describe(other)
        )),
    }
}

fn describe(observation: &Observation) -> String {
    match observation {
        Observation::Returned(None) => "ok".to_owned(),
        Observation::Returned(Some(value)) => value.render(),
        Observation::Faulted(fault) => fault.to_string(),
        Observation::TimedOut => "timeout".to_owned(),
        Observation::Crashed(message) => format!("crash ({message})"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jb_runtime::{ExecutionPolicy, NonTerminatingPolicy, Observation};
    use jb_types::{Fault, Literal, Outcome, ParamType, Return};

    use super::{SKIPPED_NOT_KILLABLE, Verdict, evaluate_raw, judge};

    fn void(_: &[Literal]) -> Result<Return, Fault> {
        Ok(None)
    }

    fn ten(_: &[Literal]) -> Result<Return, Fault> {
        Ok(Some(Literal::Integer(10)))
    }

    fn spin(_: &[Literal]) -> Result<Return, Fault> {
        loop {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn policy() -> ExecutionPolicy {
        ExecutionPolicy::thread(Duration::from_millis(200))
    }

    #[test]
    fn ok_accepts_any_normal_return() {
        assert_eq!(judge(&Outcome::Ok, &Observation::Returned(None)), Verdict::Pass);
        assert_eq!(
            judge(&Outcome::Ok, &Observation::Returned(Some(Literal::text("ok")))),
            Verdict::Pass
        );
    }

    #[test]
    fn assertion_message_is_informational() {
        let expected = Outcome::AssertionError(None);
        let observed = Observation::Faulted(Fault::assertion("anything"));
        assert_eq!(judge(&expected, &observed), Verdict::Pass);
    }

    #[test]
    fn mismatches_name_both_sides() {
        let verdict = judge(
            &Outcome::Value(Literal::text("small")),
            &Observation::Returned(Some(Literal::text("large"))),
        );
        assert_eq!(
            verdict,
            Verdict::Fail(r#"expected "small", got "large""#.to_owned())
        );
        let verdict = judge(&Outcome::Ok, &Observation::Faulted(Fault::DivideByZero));
        assert_eq!(verdict, Verdict::Fail("expected ok, got divide by zero".to_owned()));
    }

    #[test]
    fn timeouts_and_crashes_fail_terminating_cases() {
        assert_eq!(
            judge(&Outcome::Ok, &Observation::TimedOut),
            Verdict::Fail("timeout".to_owned())
        );
        assert_eq!(
            judge(&Outcome::Ok, &Observation::Crashed("boom".to_owned())),
            Verdict::Fail("subject crashed: boom".to_owned())
        );
    }

    #[test]
    fn non_terminating_cases_never_run_on_threads() {
        let skipped = evaluate_raw("T.spin", &[], "() -> *", spin, &policy());
        assert_eq!(skipped, Verdict::Skipped("non-terminating by declaration".to_owned()));

        let smoke = policy().with_non_terminating(NonTerminatingPolicy::SmokeTest);
        assert_eq!(
            evaluate_raw("T.spin", &[], "() -> *", spin, &smoke),
            Verdict::Skipped(SKIPPED_NOT_KILLABLE.to_owned())
        );
        // Terminating cases still run on a worker under the same policy.
        assert_eq!(evaluate_raw("T.void", &[], "() -> ok", void, &smoke), Verdict::Pass);
    }

    #[test]
    fn non_terminating_expectation_rejects_any_conclusion() {
        assert_eq!(
            judge(&Outcome::NonTerminating, &Observation::TimedOut),
            Verdict::Pass
        );
        assert_eq!(
            judge(&Outcome::NonTerminating, &Observation::Returned(None)),
            Verdict::Fail("expected non-termination, got ok".to_owned())
        );
    }

    #[test]
    fn raw_cases_bind_before_running() {
        assert_eq!(
            evaluate_raw("T.ten", &[ParamType::Int], "(3) -> 10", ten, &policy()),
            Verdict::Pass
        );
        assert!(matches!(
            evaluate_raw("T.ten", &[ParamType::Int], "() -> 10", ten, &policy()),
            Verdict::Invalid(_)
        ));
        assert!(matches!(
            evaluate_raw("T.ten", &[ParamType::Short], "(70000) -> 10", ten, &policy()),
            Verdict::Invalid(_)
        ));
        assert!(matches!(
            evaluate_raw("T.ten", &[], "() => 10", ten, &policy()),
            Verdict::Invalid(_)
        ));
    }
}
