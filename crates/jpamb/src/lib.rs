#![forbid(unsafe_code)]

//! One import for the whole benchmark toolkit.
//!
//! ```
//! use jpamb::{Literal, Outcome, decode_case};
//!
//! let case = decode_case(r#"("a1b2c3") -> ok"#).unwrap();
//! assert_eq!(case.arguments, vec![Literal::text("a1b2c3")]);
//! assert_eq!(case.expected, Outcome::Ok);
//! ```

pub use jb_case as case;
pub use jb_conformance as conformance;
pub use jb_corpus as corpus;
pub use jb_registry as registry;
pub use jb_runtime as runtime;
pub use jb_types as types;

pub use jb_case::{Case, CaseError, decode_case, decode_outcome, parse_literal};
pub use jb_conformance::{
    Harness, HarnessConfig, HarnessError, RunReport, Verdict, evaluate, evaluate_raw,
};
pub use jb_registry::{
    Declaration, Diagnostic, Discovery, DuplicatePolicy, Registry, RegistryError, SourceLocation,
    Scanned, Subject, Tag, TagRegistry, scan_source,
};
pub use jb_runtime::{
    ExecutionPolicy, Isolation, NonTerminatingPolicy, Observation, SubjectFn, SubjectTable,
};
pub use jb_types::{Fault, Literal, Outcome, ParamType, TypeError};
