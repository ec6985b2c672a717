#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use jb_case::{Case, CaseError, decode_case};
use jb_types::ParamType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod scan;
pub mod tags;

pub use scan::{Scanned, scan_source};
pub use tags::{Tag, TagRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
}

impl SourceLocation {
    #[must_use]
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Raw, undecoded metadata for one subject function as discovery found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub qualified_name: String,
    pub params: Vec<ParamType>,
    pub cases: Vec<String>,
    pub tags: Vec<String>,
    pub location: SourceLocation,
}

impl Declaration {
    #[must_use]
    pub fn new(qualified_name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            params: Vec::new(),
            cases: Vec::new(),
            tags: Vec::new(),
            location,
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParamType) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn case(mut self, raw: impl Into<String>) -> Self {
        self.cases.push(raw.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, token: impl Into<String>) -> Self {
        self.tags.push(token.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: String,
    pub declarations: Vec<Declaration>,
}

/// A subject function with its decoded cases and resolved tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub qualified_name: String,
    pub params: Vec<ParamType>,
    pub cases: Vec<Case>,
    pub tags: BTreeSet<Tag>,
    pub location: SourceLocation,
}

impl Subject {
    #[must_use]
    pub fn parameter_arity(&self) -> usize {
        self.params.len()
    }

    /// The last segment of the qualified name.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    #[must_use]
    pub fn has_tag(&self, symbol: &str) -> bool {
        self.tags.iter().any(|tag| tag.as_str() == symbol)
    }

    fn from_declaration(
        declaration: &Declaration,
        tags: &TagRegistry,
    ) -> Result<Self, RegistryError> {
        let cases = declaration
            .cases
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                decode_case(raw).map_err(|source| RegistryError::Case {
                    index,
                    raw: raw.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            qualified_name: declaration.qualified_name.clone(),
            params: declaration.params.clone(),
            cases,
            tags: tags.resolve_all(&declaration.tags)?,
            location: declaration.location.clone(),
        })
    }
}

/// How discovery treats two declarations with an identical qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first declaration and report every later one.
    #[default]
    Reject,
    /// The later declaration replaces the earlier one, including when the
    /// later one fails to decode (the name is then unregistered).
    LastWins,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("case {index} {raw:?}: {source}")]
    Case {
        index: usize,
        raw: String,
        #[source]
        source: CaseError,
    },
    #[error("unknown tag {0:?}")]
    UnknownTag(String),
    #[error("duplicate subject {name}: first declared at {first}, again at {second}")]
    DuplicateSubject {
        name: String,
        first: SourceLocation,
        second: SourceLocation,
    },
    #[error("scan error at line {line}: {reason}")]
    Scan { line: usize, reason: String },
    #[error("invalid scanner pattern: {0}")]
    Pattern(String),
    #[error("unknown subject {0:?}")]
    UnknownSubject(String),
    #[error("subject name {name:?} is ambiguous between {candidates:?}")]
    AmbiguousSubject {
        name: String,
        candidates: Vec<String>,
    },
}

/// A rejected declaration, reported instead of being silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub subject: String,
    pub location: SourceLocation,
    pub error: RegistryError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.subject, self.location, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub registry: Registry,
    pub diagnostics: Vec<Diagnostic>,
}

impl Discovery {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Immutable map from qualified name to subject, built once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    subjects: BTreeMap<String, Subject>,
    policy: DuplicatePolicy,
}

impl Registry {
    #[must_use]
    pub fn discover(
        units: &[SourceUnit],
        tags: &TagRegistry,
        policy: DuplicatePolicy,
    ) -> Discovery {
        let mut subjects = BTreeMap::new();
        let mut first_seen: BTreeMap<String, SourceLocation> = BTreeMap::new();
        let mut diagnostics = Vec::new();

        for declaration in units.iter().flat_map(|unit| &unit.declarations) {
            let name = &declaration.qualified_name;
            let reject = |error: RegistryError| Diagnostic {
                subject: name.clone(),
                location: declaration.location.clone(),
                error,
            };

            if let Some(first) = first_seen.get(name) {
                if policy == DuplicatePolicy::Reject {
                    diagnostics.push(reject(RegistryError::DuplicateSubject {
                        name: name.clone(),
                        first: first.clone(),
                        second: declaration.location.clone(),
                    }));
                    continue;
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    subject = %name,
                    earlier = %first,
                    later = %declaration.location,
                    "later declaration replaces earlier one"
                );
                subjects.remove(name);
            } else {
                first_seen.insert(name.clone(), declaration.location.clone());
            }

            match Subject::from_declaration(declaration, tags) {
                Ok(subject) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        subject = %name,
                        cases = subject.cases.len(),
                        tags = subject.tags.len(),
                        "registered subject"
                    );
                    subjects.insert(name.clone(), subject);
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(subject = %name, %error, "declaration rejected");
                    diagnostics.push(reject(error));
                }
            }
        }

        Discovery {
            registry: Self { subjects, policy },
            diagnostics,
        }
    }

    #[must_use]
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    #[must_use]
    pub fn get(&self, qualified_name: &str) -> Option<&Subject> {
        self.subjects.get(qualified_name)
    }

    /// Looks a subject up by qualified name, falling back to a unique simple
    /// name (`alternatingSum` for `jpamb.cases.Branch.alternatingSum`).
    pub fn resolve(&self, name: &str) -> Result<&Subject, RegistryError> {
        if let Some(subject) = self.subjects.get(name) {
            return Ok(subject);
        }
        let matches: Vec<&Subject> = self
            .subjects
            .values()
            .filter(|subject| subject.simple_name() == name)
            .collect();
        match matches.as_slice() {
            [] => Err(RegistryError::UnknownSubject(name.to_owned())),
            [only] => Ok(*only),
            many => Err(RegistryError::AmbiguousSubject {
                name: name.to_owned(),
                candidates: many
                    .iter()
                    .map(|subject| subject.qualified_name.clone())
                    .collect(),
            }),
        }
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.values()
    }

    /// Read-only copy of every subject in name order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subject> {
        self.subjects.values().cloned().collect()
    }

    /// `sha256:` digest over the canonical form of every subject, so a
    /// consumer can tell whether the corpus changed between runs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for subject in self.subjects.values() {
            let params = subject
                .params
                .iter()
                .map(|param| param.source_name())
                .collect::<Vec<_>>()
                .join(",");
            let tags = subject
                .tags
                .iter()
                .map(Tag::as_str)
                .collect::<Vec<_>>()
                .join(",");
            hasher.update(format!("{}({params})[{tags}]\n", subject.qualified_name).as_bytes());
            for case in &subject.cases {
                hasher.update(format!("\t{}\n", case.render()).as_bytes());
            }
        }
        format!("sha256:{}", hex_encode(&hasher.finalize()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(DIGITS[usize::from(byte >> 4)]));
        out.push(char::from(DIGITS[usize::from(byte & 0x0f)]));
    }
    out
}

#[cfg(test)]
mod tests {
    use jb_case::CaseError;
    use jb_types::{Literal, Outcome, ParamType};

    use super::{
        Declaration, DuplicatePolicy, Registry, RegistryError, SourceLocation, SourceUnit,
        TagRegistry,
    };

    fn unit(path: &str, declarations: Vec<Declaration>) -> SourceUnit {
        SourceUnit {
            path: path.to_owned(),
            declarations,
        }
    }

    fn alternating_sum(file: &str, line: usize) -> Declaration {
        Declaration::new(
            "jpamb.cases.Branch.alternatingSum",
            SourceLocation::new(file, line),
        )
        .param(ParamType::Text)
        .case("(\"a1b2c3\") -> ok")
        .case("(\"a1b2c4\") -> assertion error")
    }

    #[test]
    fn discovery_decodes_cases_in_declaration_order() {
        let discovery = Registry::discover(
            &[unit("Branch.java", vec![alternating_sum("Branch.java", 12)])],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        assert!(discovery.is_clean());
        let subject = discovery
            .registry
            .get("jpamb.cases.Branch.alternatingSum")
            .expect("registered");
        assert_eq!(subject.parameter_arity(), 1);
        assert_eq!(subject.cases[0].arguments, vec![Literal::text("a1b2c3")]);
        assert_eq!(subject.cases[1].expected, Outcome::AssertionError(None));
        assert_eq!(subject.simple_name(), "alternatingSum");
    }

    #[test]
    fn tags_only_subjects_are_registered() {
        let forever = Declaration::new("Loops.spin", SourceLocation::new("Loops.java", 3))
            .tag("LOOP");
        let discovery = Registry::discover(
            &[unit("Loops.java", vec![forever])],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        let subject = discovery.registry.get("Loops.spin").expect("registered");
        assert!(subject.cases.is_empty());
        assert!(subject.has_tag("LOOP"));
    }

    #[test]
    fn bad_case_rejects_only_the_offending_subject() {
        let broken = Declaration::new("A.broken", SourceLocation::new("A.java", 4))
            .case("(1 -> ok");
        let fine = Declaration::new("A.fine", SourceLocation::new("A.java", 9)).case("() -> ok");
        let discovery = Registry::discover(
            &[unit("A.java", vec![broken, fine])],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        assert_eq!(discovery.registry.len(), 1);
        assert!(discovery.registry.get("A.fine").is_some());
        let diagnostic = &discovery.diagnostics[0];
        assert_eq!(diagnostic.subject, "A.broken");
        assert_eq!(diagnostic.location.line, 4);
        assert!(matches!(
            diagnostic.error,
            RegistryError::Case {
                index: 0,
                source: CaseError::MalformedCase { .. },
                ..
            }
        ));
    }

    #[test]
    fn unknown_tag_rejects_subject() {
        let declaration =
            Declaration::new("A.f", SourceLocation::new("A.java", 2)).tag("TELEPORT");
        let discovery = Registry::discover(
            &[unit("A.java", vec![declaration])],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        assert!(discovery.registry.is_empty());
        assert_eq!(
            discovery.diagnostics[0].error,
            RegistryError::UnknownTag("TELEPORT".to_owned())
        );
    }

    #[test]
    fn reject_policy_keeps_first_and_reports_every_duplicate() {
        let later = alternating_sum("Branch2.java", 40).case("(\"a1b2\") -> assertion error");
        let discovery = Registry::discover(
            &[
                unit("Branch.java", vec![alternating_sum("Branch.java", 12)]),
                unit("Branch2.java", vec![later]),
            ],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        let subject = discovery
            .registry
            .get("jpamb.cases.Branch.alternatingSum")
            .expect("first stays");
        assert_eq!(subject.cases.len(), 2);
        assert_eq!(subject.location.file, "Branch.java");
        assert!(matches!(
            &discovery.diagnostics[..],
            [diagnostic] if matches!(diagnostic.error, RegistryError::DuplicateSubject { .. })
        ));
    }

    #[test]
    fn last_wins_policy_replaces_earlier_declaration() {
        let later = alternating_sum("Branch2.java", 40).case("(\"a1b2\") -> assertion error");
        let discovery = Registry::discover(
            &[
                unit("Branch.java", vec![alternating_sum("Branch.java", 12)]),
                unit("Branch2.java", vec![later]),
            ],
            &TagRegistry::standard(),
            DuplicatePolicy::LastWins,
        );
        assert!(discovery.is_clean());
        assert_eq!(discovery.registry.policy(), DuplicatePolicy::LastWins);
        let subject = discovery
            .registry
            .resolve("alternatingSum")
            .expect("resolves by simple name");
        assert_eq!(subject.cases.len(), 3);
        assert_eq!(subject.location.file, "Branch2.java");
    }

    #[test]
    fn last_wins_unregisters_name_when_later_declaration_is_broken() {
        let broken = Declaration::new(
            "jpamb.cases.Branch.alternatingSum",
            SourceLocation::new("Branch2.java", 7),
        )
        .case("nonsense");
        let discovery = Registry::discover(
            &[
                unit("Branch.java", vec![alternating_sum("Branch.java", 12)]),
                unit("Branch2.java", vec![broken]),
            ],
            &TagRegistry::standard(),
            DuplicatePolicy::LastWins,
        );
        assert!(discovery.registry.is_empty());
        assert_eq!(discovery.diagnostics.len(), 1);
    }

    #[test]
    fn resolve_reports_ambiguous_simple_names() {
        let discovery = Registry::discover(
            &[unit(
                "mixed",
                vec![
                    Declaration::new("A.run", SourceLocation::new("A.java", 1)),
                    Declaration::new("B.run", SourceLocation::new("B.java", 1)),
                ],
            )],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        assert_eq!(discovery.registry.len(), 2);
        assert!(matches!(
            discovery.registry.resolve("run"),
            Err(RegistryError::AmbiguousSubject { .. })
        ));
        assert!(discovery.registry.resolve("A.run").is_ok());
        assert_eq!(
            discovery.registry.resolve("walk"),
            Err(RegistryError::UnknownSubject("walk".to_owned()))
        );
    }

    #[test]
    fn fingerprint_tracks_case_changes() {
        let tags = TagRegistry::standard();
        let before = Registry::discover(
            &[unit("Branch.java", vec![alternating_sum("Branch.java", 12)])],
            &tags,
            DuplicatePolicy::Reject,
        )
        .registry;
        let after = Registry::discover(
            &[unit(
                "Branch.java",
                vec![alternating_sum("Branch.java", 12).case("(\"\") -> assertion error")],
            )],
            &tags,
            DuplicatePolicy::Reject,
        )
        .registry;
        assert!(before.fingerprint().starts_with("sha256:"));
        assert_eq!(before.fingerprint(), before.clone().fingerprint());
        assert_ne!(before.fingerprint(), after.fingerprint());
    }

    #[test]
    fn subjects_serialize_with_decoded_cases_and_tags() {
        let declaration = alternating_sum("Branch.java", 12).tag("TagType.LOOP");
        let discovery = Registry::discover(
            &[unit("Branch.java", vec![declaration])],
            &TagRegistry::standard(),
            DuplicatePolicy::Reject,
        );
        let subject = discovery
            .registry
            .get("jpamb.cases.Branch.alternatingSum")
            .expect("registered");

        let json = serde_json::to_value(subject).expect("serialize");
        assert_eq!(json["tags"], serde_json::json!(["LOOP"]));
        assert_eq!(json["location"]["line"], 12);

        let back: super::Subject = serde_json::from_value(json).expect("deserialize");
        assert_eq!(&back, subject);
        assert!(back.has_tag("LOOP"));
    }
}
