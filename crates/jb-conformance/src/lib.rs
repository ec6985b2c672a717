#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jb_registry::{
    Diagnostic, DuplicatePolicy, Registry, RegistryError, Scanned, SourceLocation, Subject,
    TagRegistry, scan_source,
};
use jb_runtime::{
    ExecutionLedger, ExecutionPolicy, ExecutionRecord, Isolation, IsolationKind,
    NonTerminatingPolicy, Observation, SubjectTable, run_in_process,
};
use jb_types::bind_arguments;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod verdict;

pub use verdict::{
    SKIPPED_NON_TERMINATING, SKIPPED_NOT_KILLABLE, Verdict, evaluate, evaluate_raw, judge,
};

use verdict::{Prepared, prepare};

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub repo_root: PathBuf,
    pub fixture_root: PathBuf,
    pub artifact_root: PathBuf,
    pub policy: ExecutionPolicy,
    pub duplicates: DuplicatePolicy,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            artifact_root: repo_root.join("artifacts/jpamb"),
            policy: ExecutionPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            repo_root,
        }
    }

    /// Default paths overlaid with the fields present in a YAML document.
    pub fn from_yaml_file(path: &Path) -> Result<Self, HarnessError> {
        let body = fs::read_to_string(path)?;
        let file: ConfigFile = serde_yaml::from_str(&body)?;
        Self::default_paths().overlay(file)
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }

    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.artifact_root.join("run_report.json")
    }

    fn overlay(mut self, file: ConfigFile) -> Result<Self, HarnessError> {
        if let Some(ms) = file.time_limit_ms {
            if ms == 0 {
                return Err(HarnessError::Config("time_limit_ms must be positive".to_owned()));
            }
            self.policy.time_limit = Duration::from_millis(ms);
        }
        match (file.isolation, file.program) {
            (Some(IsolationSetting::Process), Some(program)) => {
                self.policy.isolation = Isolation::Process {
                    program,
                    args: file.program_args,
                };
            }
            (Some(IsolationSetting::Process), None) => {
                return Err(HarnessError::Config(
                    "process isolation requires `program`".to_owned(),
                ));
            }
            (Some(IsolationSetting::Thread), _) => self.policy.isolation = Isolation::Thread,
            (None, _) => {}
        }
        if let Some(non_terminating) = file.non_terminating {
            self.policy.non_terminating = non_terminating;
        }
        if let Some(duplicates) = file.duplicates {
            self.duplicates = duplicates;
        }
        if let Some(artifact_root) = file.artifact_root {
            self.artifact_root = artifact_root;
        }
        self.policy
            .validate()
            .map_err(|err| HarnessError::Config(err.to_string()))?;
        Ok(self)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IsolationSetting {
    Thread,
    Process,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    time_limit_ms: Option<u64>,
    #[serde(default)]
    isolation: Option<IsolationSetting>,
    #[serde(default)]
    program: Option<PathBuf>,
    #[serde(default)]
    program_args: Vec<String>,
    #[serde(default)]
    non_terminating: Option<NonTerminatingPolicy>,
    #[serde(default)]
    duplicates: Option<DuplicatePolicy>,
    #[serde(default)]
    artifact_root: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown subject {0:?}")]
    UnknownSubject(String),
    #[error("{subject} has {count} cases, no case {index}")]
    CaseIndexOutOfRange {
        subject: String,
        index: usize,
        count: usize,
    },
    #[error(transparent)]
    Registry(RegistryError),
    #[error("config error: {0}")]
    Config(String),
}

impl From<RegistryError> for HarnessError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownSubject(name) => Self::UnknownSubject(name),
            other => Self::Registry(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub subject: String,
    pub case_index: usize,
    pub case: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub suite: String,
    pub registry_fingerprint: String,
    pub time_limit_ms: u64,
    pub isolation: IsolationKind,
    pub non_terminating: NonTerminatingPolicy,
    pub case_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub results: Vec<CaseResult>,
    pub executions: Vec<ExecutionRecord>,
}

impl RunReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.invalid == 0 && self.case_count > 0
    }

    /// Results that did not pass and were not skipped.
    pub fn problems(&self) -> impl Iterator<Item = &CaseResult> {
        self.results
            .iter()
            .filter(|result| matches!(result.verdict, Verdict::Fail(_) | Verdict::Invalid(_)))
    }
}

/// Runs registered subjects against their declared cases.
///
/// The registry is shared read-only; every execution gets its own worker or
/// child process, so harness methods only need `&self`.
#[derive(Debug, Clone)]
pub struct Harness {
    registry: Arc<Registry>,
    table: SubjectTable,
    config: HarnessConfig,
}

impl Harness {
    #[must_use]
    pub fn new(registry: Arc<Registry>, table: SubjectTable, config: HarnessConfig) -> Self {
        Self {
            registry,
            table,
            config,
        }
    }

    /// The bundled corpus, discovered under `config.duplicates`.
    #[must_use]
    pub fn corpus(config: HarnessConfig) -> (Self, Vec<Diagnostic>) {
        let discovery = jb_corpus::discover(config.duplicates);
        let harness = Self::new(
            Arc::new(discovery.registry),
            jb_corpus::subject_table(),
            config,
        );
        (harness, discovery.diagnostics)
    }

    /// Subjects discovered from the annotated sources under
    /// [`HarnessConfig::case_fixture_root`], bound to the corpus functions.
    /// Scan and decode diagnostics are returned together; neither stops the
    /// other subjects from registering.
    pub fn from_sources(config: HarnessConfig) -> Result<(Self, Vec<Diagnostic>), HarnessError> {
        let scanned = scan_tree(&config.case_fixture_root())?;
        let discovery =
            Registry::discover(&scanned.units, &TagRegistry::standard(), config.duplicates);
        let mut diagnostics = scanned.diagnostics;
        diagnostics.extend(discovery.diagnostics);
        let harness = Self::new(
            Arc::new(discovery.registry),
            jb_corpus::subject_table(),
            config,
        );
        Ok((harness, diagnostics))
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn list_subjects(&self) -> Vec<Subject> {
        self.registry.snapshot()
    }

    pub fn run_case(&self, subject_name: &str, case_index: usize) -> Result<Verdict, HarnessError> {
        let subject = self.case_subject(subject_name, case_index)?;
        let mut ledger = ExecutionLedger::new();
        let verdict = self.prepare(subject, case_index).settle(&self.config.policy, &mut ledger);
        Ok(verdict)
    }

    #[must_use]
    pub fn run_all(&self) -> BTreeMap<(String, usize), Verdict> {
        let mut ledger = ExecutionLedger::new();
        self.run_subjects(self.registry.subjects(), &mut ledger)
    }

    #[must_use]
    pub fn run_report(&self) -> RunReport {
        let mut ledger = ExecutionLedger::new();
        let verdicts = self.run_subjects(self.registry.subjects(), &mut ledger);
        self.build_report(verdicts, ledger)
    }

    /// Report over a single subject's cases.
    pub fn run_subject_report(&self, subject_name: &str) -> Result<RunReport, HarnessError> {
        let subject = self.registry.resolve(subject_name)?;
        let mut ledger = ExecutionLedger::new();
        let verdicts = self.run_subjects(std::iter::once(subject), &mut ledger);
        Ok(self.build_report(verdicts, ledger))
    }

    /// Writes pretty JSON to [`HarnessConfig::report_path`].
    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf, HarnessError> {
        let path = self.config.report_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        Ok(path)
    }

    /// Runs one case on the current thread, for the child side of process
    /// isolation. Looping subjects never return from here.
    pub fn exec_observation(
        &self,
        subject_name: &str,
        case_index: usize,
    ) -> Result<Observation, HarnessError> {
        let subject = self.case_subject(subject_name, case_index)?;
        let Some(function) = self.table.get(&subject.qualified_name) else {
            return Ok(Observation::Crashed(unbound(subject)));
        };
        let case = &subject.cases[case_index];
        Ok(match bind_arguments(&subject.params, &case.arguments) {
            Ok(arguments) => run_in_process(function, &arguments),
            Err(err) => Observation::Crashed(format!("cannot bind arguments: {err}")),
        })
    }

    fn case_subject(&self, subject_name: &str, case_index: usize) -> Result<&Subject, HarnessError> {
        let subject = self.registry.resolve(subject_name)?;
        if case_index >= subject.cases.len() {
            return Err(HarnessError::CaseIndexOutOfRange {
                subject: subject.qualified_name.clone(),
                index: case_index,
                count: subject.cases.len(),
            });
        }
        Ok(subject)
    }

    fn prepare(&self, subject: &Subject, case_index: usize) -> Prepared {
        match self.table.get(&subject.qualified_name) {
            Some(function) => prepare(subject, case_index, function, &self.config.policy),
            None => Prepared::Decided(Verdict::Invalid(unbound(subject))),
        }
    }

    /// Dispatches every case before settling any, so each deadline runs
    /// from its own dispatch and loops overlap instead of queueing.
    fn run_subjects<'a>(
        &self,
        subjects: impl Iterator<Item = &'a Subject>,
        ledger: &mut ExecutionLedger,
    ) -> BTreeMap<(String, usize), Verdict> {
        let prepared: Vec<((String, usize), Prepared)> = subjects
            .flat_map(|subject| {
                (0..subject.cases.len()).map(move |case_index| (subject, case_index))
            })
            .map(|(subject, case_index)| {
                (
                    (subject.qualified_name.clone(), case_index),
                    self.prepare(subject, case_index),
                )
            })
            .collect();

        prepared
            .into_iter()
            .map(|(key, prepared)| {
                let verdict = prepared.settle(&self.config.policy, ledger);
                #[cfg(feature = "tracing")]
                tracing::debug!(subject = %key.0, case = key.1, %verdict, "case settled");
                (key, verdict)
            })
            .collect()
    }

    fn build_report(
        &self,
        verdicts: BTreeMap<(String, usize), Verdict>,
        ledger: ExecutionLedger,
    ) -> RunReport {
        let count = |status: &str| {
            verdicts
                .values()
                .filter(|verdict| verdict.status() == status)
                .count()
        };
        let (passed, failed, skipped, invalid) =
            (count("pass"), count("fail"), count("skipped"), count("invalid"));

        let results = verdicts
            .iter()
            .map(|((subject, case_index), verdict)| CaseResult {
                subject: subject.clone(),
                case_index: *case_index,
                case: self
                    .registry
                    .get(subject)
                    .and_then(|subject| subject.cases.get(*case_index))
                    .map(|case| case.render())
                    .unwrap_or_default(),
                verdict: verdict.clone(),
            })
            .collect();

        RunReport {
            suite: "jpamb".to_owned(),
            registry_fingerprint: self.registry.fingerprint(),
            time_limit_ms: self.config.policy.time_limit.as_millis() as u64,
            isolation: self.config.policy.isolation.kind(),
            non_terminating: self.config.policy.non_terminating,
            case_count: verdicts.len(),
            passed,
            failed,
            skipped,
            invalid,
            results,
            executions: ledger.records().to_vec(),
        }
    }
}

fn unbound(subject: &Subject) -> String {
    format!("no function bound to {}", subject.qualified_name)
}

/// Scans every `.java` file under `root` for annotated declarations.
///
/// Only a directory that cannot be listed is an error; an unreadable file or
/// an unreadable declaration becomes a diagnostic.
pub fn scan_tree(root: &Path) -> Result<Scanned, HarnessError> {
    let mut scanned = Scanned::default();
    for path in list_source_files(root)? {
        let display = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        match fs::read_to_string(&path) {
            Ok(text) => scanned.extend(scan_source(&display, &text)?),
            Err(err) => scanned.diagnostics.push(Diagnostic {
                subject: display.clone(),
                location: SourceLocation::new(display, 0),
                error: RegistryError::Scan {
                    line: 0,
                    reason: format!("cannot read source: {err}"),
                },
            }),
        }
    }
    Ok(scanned)
}

fn list_source_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "java") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use jb_registry::DuplicatePolicy;
    use jb_runtime::{Isolation, NonTerminatingPolicy};

    use super::{Harness, HarnessConfig, HarnessError, Verdict};

    fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("harness.yaml");
        fs::write(&path, body).expect("write config");
        (dir, path)
    }

    #[test]
    fn yaml_overlays_defaults() {
        let (_dir, path) = write_config(
            "time_limit_ms: 250\nisolation: process\nprogram: /bin/jb-harness\nnon_terminating: smoke_test\nduplicates: last_wins\n",
        );
        let config = HarnessConfig::from_yaml_file(&path).expect("valid config");
        assert_eq!(config.policy.time_limit, Duration::from_millis(250));
        assert_eq!(config.policy.non_terminating, NonTerminatingPolicy::SmokeTest);
        assert!(config.policy.isolation.is_killable());
        assert_eq!(config.duplicates, DuplicatePolicy::LastWins);
        assert_eq!(config.fixture_root, HarnessConfig::default_paths().fixture_root);
    }

    #[test]
    fn smoke_testing_on_threads_is_rejected() {
        let (_dir, path) = write_config("non_terminating: smoke_test\n");
        let err = HarnessConfig::from_yaml_file(&path).expect_err("threads cannot be killed");
        assert!(matches!(err, HarnessError::Config(reason) if reason.contains("process isolation")));

        let (_dir, path) = write_config("isolation: thread\nnon_terminating: skip\n");
        let config = HarnessConfig::from_yaml_file(&path).expect("valid config");
        assert_eq!(config.policy.isolation, Isolation::Thread);
    }

    #[test]
    fn one_bad_source_file_spares_the_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cases = dir.path().join("fixtures/cases");
        fs::create_dir_all(&cases).expect("cases dir");
        fs::write(
            cases.join("Good.java"),
            "package jpamb.cases;\nclass Good {\n  @Case(\"() -> ok\")\n  static void fine() {}\n}\n",
        )
        .expect("write good");
        fs::write(
            cases.join("Bad.java"),
            "package jpamb.cases;\nclass Bad {\n  @Case(\"('x') -> ok\")\n  static void g(char c) {}\n  @Case(\"() -> ok\")\n  static void h() {}\n  @Case(\"(1 -> ok\")\n  static void broken(int x) {}\n}\n",
        )
        .expect("write bad");

        let scanned = super::scan_tree(&cases).expect("tree scans");
        assert_eq!(scanned.units.len(), 2);
        assert_eq!(scanned.diagnostics.len(), 1);
        assert_eq!(scanned.diagnostics[0].subject, "jpamb.cases.Bad.g");
        assert_eq!(scanned.diagnostics[0].location.line, 4);

        let mut config = HarnessConfig::default_paths();
        config.fixture_root = dir.path().join("fixtures");
        let (harness, diagnostics) = Harness::from_sources(config).expect("discovers");
        let names: Vec<String> = harness
            .list_subjects()
            .into_iter()
            .map(|subject| subject.qualified_name)
            .collect();
        assert_eq!(names, vec!["jpamb.cases.Bad.h", "jpamb.cases.Good.fine"]);
        let rejected: Vec<&str> = diagnostics
            .iter()
            .map(|diagnostic| diagnostic.subject.as_str())
            .collect();
        assert_eq!(rejected, vec!["jpamb.cases.Bad.g", "jpamb.cases.Bad.broken"]);

        // Neither subject has a function in the corpus.
        assert!(matches!(harness.run_case("fine", 0), Ok(Verdict::Invalid(_))));
    }

    #[test]
    fn process_isolation_needs_a_program() {
        let (_dir, path) = write_config("isolation: process\n");
        let err = HarnessConfig::from_yaml_file(&path).expect_err("no program");
        assert!(matches!(err, HarnessError::Config(_)));

        let (_dir, path) = write_config("isolation: process\nprogram: /bin/jb-harness\n");
        let config = HarnessConfig::from_yaml_file(&path).expect("valid config");
        assert!(matches!(config.policy.isolation, Isolation::Process { .. }));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let (_dir, path) = write_config("time_limit: 5\n");
        let err = HarnessConfig::from_yaml_file(&path).expect_err("unknown key");
        assert!(matches!(err, HarnessError::Yaml(_)));
    }

    #[test]
    fn lookups_report_unknown_subjects_and_indices() {
        let (harness, _) = Harness::corpus(HarnessConfig::default_paths());
        assert!(matches!(
            harness.run_case("noSuchSubject", 0),
            Err(HarnessError::UnknownSubject(_))
        ));
        assert!(matches!(
            harness.run_case("alternatingSum", 4),
            Err(HarnessError::CaseIndexOutOfRange { index: 4, count: 4, .. })
        ));
    }

    #[test]
    fn arity_mismatch_is_invalid_not_failed() {
        let (harness, _) = Harness::corpus(HarnessConfig::default_paths());
        let verdict = harness
            .run_case("spellsExactlyProgramAnalysis", 0)
            .expect("known case");
        assert_eq!(
            verdict,
            Verdict::Invalid("case supplies 0 arguments but subject takes 1".to_owned())
        );
    }

    #[test]
    fn report_is_written_under_the_artifact_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = HarnessConfig::default_paths();
        config.artifact_root = dir.path().join("artifacts");
        let (harness, _) = Harness::corpus(config);

        let report = harness
            .run_subject_report("fireTheNukes")
            .expect("known subject");
        assert!(report.is_green());
        assert_eq!(report.executions.len(), 4);

        let path = harness.write_report(&report).expect("report written");
        let body = fs::read_to_string(path).expect("report readable");
        let parsed: super::RunReport = serde_json::from_str(&body).expect("report parses");
        assert_eq!(parsed, report);
    }
}
