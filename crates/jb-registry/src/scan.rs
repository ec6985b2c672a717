use jb_types::ParamType;
use regex::Regex;

use crate::{Declaration, Diagnostic, RegistryError, SourceLocation, SourceUnit};

struct Patterns {
    package: Regex,
    class: Regex,
    case: Regex,
    tag: Regex,
    method: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, RegistryError> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|err| RegistryError::Pattern(err.to_string()))
        };
        Ok(Self {
            package: build(r"^\s*package\s+([\w.]+)\s*;")?,
            class: build(r"^\s*(?:(?:public|final|abstract)\s+)*class\s+(\w+)")?,
            case: build(r#"^\s*@Case\(\s*"((?:[^"\\]|\\.)*)"\s*\)"#)?,
            tag: build(r"^\s*@Tag\(\s*\{([^}]*)\}\s*\)")?,
            method: build(r"\bstatic\s+[\w.<>\[\]]+\s+(\w+)\s*\(([^)]*)\)")?,
        })
    }
}

#[derive(Default)]
struct Pending {
    cases: Vec<String>,
    tags: Vec<String>,
    first_line: Option<usize>,
}

impl Pending {
    fn note(&mut self, line: usize) {
        self.first_line.get_or_insert(line);
    }
}

/// What a scan found: the declarations it could read, and one diagnostic per
/// declaration or annotation run it had to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scanned {
    pub units: Vec<SourceUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Scanned {
    pub fn extend(&mut self, other: Scanned) {
        self.units.extend(other.units);
        self.diagnostics.extend(other.diagnostics);
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Extracts declarations from annotated JVM-style source.
///
/// Recognised lines: `package a.b;`, `class Name`, `@Case("...")`,
/// `@Tag({ A, B })`, and a `static <ret> name(<params>)` signature, which
/// consumes every annotation seen since the previous signature. A signature
/// the scanner cannot read drops only that declaration.
pub fn scan_source(path: &str, text: &str) -> Result<Scanned, RegistryError> {
    let patterns = Patterns::compile()?;
    let mut package: Option<String> = None;
    let mut class: Option<String> = None;
    let mut pending = Pending::default();
    let mut declarations = Vec::new();
    let mut diagnostics = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(caps) = patterns.package.captures(line) {
            package = Some(caps[1].to_owned());
        } else if let Some(caps) = patterns.case.captures(line) {
            pending.note(line_no);
            pending.cases.push(unescape_source_string(&caps[1]));
        } else if let Some(caps) = patterns.tag.captures(line) {
            pending.note(line_no);
            pending.tags.extend(
                caps[1]
                    .split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .map(str::to_owned),
            );
        } else if let Some(caps) = patterns.class.captures(line) {
            let dangling = std::mem::take(&mut pending);
            diagnostics.extend(dangling_diagnostic(
                &dangling,
                qualify(package.as_deref(), class.as_deref(), None),
                path,
            ));
            class = Some(caps[1].to_owned());
        } else if let Some(caps) = patterns.method.captures(line) {
            let qualified_name = qualify(package.as_deref(), class.as_deref(), Some(&caps[1]));
            let annotations = std::mem::take(&mut pending);
            let location = SourceLocation::new(path, line_no);
            match parse_params(&caps[2], line_no) {
                Ok(params) => declarations.push(Declaration {
                    qualified_name,
                    params,
                    cases: annotations.cases,
                    tags: annotations.tags,
                    location,
                }),
                Err(error) => diagnostics.push(Diagnostic {
                    subject: qualified_name,
                    location,
                    error,
                }),
            }
        }
    }
    diagnostics.extend(dangling_diagnostic(
        &pending,
        qualify(package.as_deref(), class.as_deref(), None),
        path,
    ));

    Ok(Scanned {
        units: vec![SourceUnit {
            path: path.to_owned(),
            declarations,
        }],
        diagnostics,
    })
}

fn qualify(package: Option<&str>, class: Option<&str>, name: Option<&str>) -> String {
    [package, class, name]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(".")
}

fn dangling_diagnostic(pending: &Pending, enclosing: String, path: &str) -> Option<Diagnostic> {
    let line = pending.first_line?;
    Some(Diagnostic {
        subject: enclosing,
        location: SourceLocation::new(path, line),
        error: RegistryError::Scan {
            line,
            reason: "annotations are not followed by a static method".to_owned(),
        },
    })
}

fn parse_params(raw: &str, line: usize) -> Result<Vec<ParamType>, RegistryError> {
    raw.split(',')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .map(|param| {
            let words: Vec<&str> = param
                .split_whitespace()
                .filter(|word| *word != "final")
                .collect();
            let type_name = match words.as_slice() {
                [type_name, _name] => *type_name,
                _ => {
                    return Err(RegistryError::Scan {
                        line,
                        reason: format!("cannot read parameter {param:?}"),
                    });
                }
            };
            ParamType::from_source_name(type_name).ok_or_else(|| RegistryError::Scan {
                line,
                reason: format!("unsupported parameter type {type_name}"),
            })
        })
        .collect()
}

/// Undoes source-string escaping so the case decoder sees the annotation's
/// runtime value.
fn unescape_source_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
