#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use jb_conformance::{Harness, HarnessConfig};
use jb_registry::Diagnostic;
use jb_runtime::{Isolation, NonTerminatingPolicy};

/// Options that apply to every command and are forwarded to child processes.
struct Global {
    config_path: Option<PathBuf>,
    from_sources: bool,
}

impl Global {
    fn discover(
        &self,
        config: HarnessConfig,
    ) -> Result<(Harness, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        if self.from_sources {
            Ok(Harness::from_sources(config)?)
        } else {
            Ok(Harness::corpus(config))
        }
    }

    fn child_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.config_path {
            args.push("--config".to_owned());
            args.push(path.display().to_string());
        }
        if self.from_sources {
            args.push("--from-sources".to_owned());
        }
        args
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path: Option<PathBuf> = None;
    let mut from_sources = false;
    let mut args = std::env::args().skip(1).peekable();

    while args.peek().is_some_and(|arg| arg.starts_with('-')) {
        let Some(arg) = args.next() else { break };
        match arg.as_str() {
            "--config" => {
                let value = args.next().ok_or("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--from-sources" => {
                from_sources = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }

    let mut config = match &config_path {
        Some(path) => HarnessConfig::from_yaml_file(path)?,
        None => HarnessConfig::default_paths(),
    };
    let global = Global {
        config_path,
        from_sources,
    };

    match args.next().as_deref() {
        Some("run") => run(&mut config, &global, args.collect()),
        Some("exec") => {
            let subject = args.next().ok_or("exec requires a subject name")?;
            let index = args
                .next()
                .ok_or("exec requires a case index")?
                .parse::<usize>()?;
            let (harness, _) = global.discover(config)?;
            println!("{}", harness.exec_observation(&subject, index)?.encode()?);
            Ok(())
        }
        Some("list") => {
            let (harness, diagnostics) = global.discover(config)?;
            for subject in harness.list_subjects() {
                let tags = subject
                    .tags
                    .iter()
                    .map(|tag| tag.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                println!(
                    "{} cases={} tags=[{tags}] at={}",
                    subject.qualified_name,
                    subject.cases.len(),
                    subject.location
                );
            }
            for diagnostic in diagnostics {
                eprintln!("rejected {diagnostic}");
            }
            Ok(())
        }
        Some(other) => Err(format!("unknown command: {other}").into()),
        None => {
            print_help();
            Ok(())
        }
    }
}

fn run(
    config: &mut HarnessConfig,
    global: &Global,
    flags: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut subject_filter: Option<String> = None;
    let mut write_report = false;
    let mut require_green = false;

    let mut flags = flags.into_iter();
    while let Some(flag) = flags.next() {
        match flag.as_str() {
            "--subject" => {
                let value = flags
                    .next()
                    .ok_or("--subject requires a value (e.g. alternatingSum)")?;
                subject_filter = Some(value);
            }
            "--smoke-non-terminating" => {
                config.policy.non_terminating = NonTerminatingPolicy::SmokeTest;
            }
            "--time-limit-ms" => {
                let value = flags.next().ok_or("--time-limit-ms requires a value")?;
                let ms = value.parse::<u64>()?;
                if ms == 0 {
                    return Err("--time-limit-ms must be positive".into());
                }
                config.policy.time_limit = Duration::from_millis(ms);
            }
            "--process-isolation" => {
                config.policy.isolation = Isolation::Process {
                    program: std::env::current_exe()?,
                    args: global.child_args(),
                };
            }
            "--write-report" => {
                write_report = true;
            }
            "--require-green" => {
                require_green = true;
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }

    if let Err(err) = config.policy.validate() {
        return Err(format!("{err} (add --process-isolation)").into());
    }

    let (harness, diagnostics) = global.discover(config.clone())?;
    for diagnostic in &diagnostics {
        eprintln!("rejected {diagnostic}");
    }

    let report = match &subject_filter {
        Some(name) => harness.run_subject_report(name)?,
        None => harness.run_report(),
    };
    for result in &report.results {
        println!(
            "{}#{} {} => {}",
            result.subject, result.case_index, result.case, result.verdict
        );
    }
    println!(
        "suite={} cases={} passed={} failed={} skipped={} invalid={} green={} fingerprint={}",
        report.suite,
        report.case_count,
        report.passed,
        report.failed,
        report.skipped,
        report.invalid,
        report.is_green(),
        report.registry_fingerprint
    );

    if write_report {
        let path = harness.write_report(&report)?;
        println!("wrote report={}", path.display());
    }

    if require_green && (!report.is_green() || !diagnostics.is_empty()) {
        return Err(format!(
            "run is not green: {} failed, {} invalid, {} rejected declarations",
            report.failed,
            report.invalid,
            diagnostics.len()
        )
        .into());
    }

    Ok(())
}

fn print_help() {
    println!(
        "jb-harness\n\
         Usage:\n\
         \tjb-harness [--config harness.yaml] [--from-sources] run [--subject NAME] [--smoke-non-terminating] [--time-limit-ms N] [--process-isolation] [--write-report] [--require-green]\n\
         \tjb-harness [--config harness.yaml] [--from-sources] exec NAME INDEX\n\
         \tjb-harness [--config harness.yaml] [--from-sources] list\n\
         Options:\n\
         \t--config <path>          Overlay a YAML config on the default paths\n\
         \t--from-sources           Discover subjects from the annotated sources under the fixture root\n\
         \t--subject <name>         Run only one subject (qualified or unique simple name)\n\
         \t--smoke-non-terminating  Run `*` cases under the time limit instead of skipping them (needs --process-isolation)\n\
         \t--time-limit-ms <n>      Per-case deadline in milliseconds\n\
         \t--process-isolation      Run each case in a killable child process\n\
         \t--write-report           Write the run report JSON under the artifact root\n\
         \t--require-green          Exit non-zero when any case fails or is invalid\n\
         \t-h, --help               Show this help"
    );
}
