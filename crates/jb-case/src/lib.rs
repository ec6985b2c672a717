#![forbid(unsafe_code)]

use std::fmt;

use jb_types::{Literal, Outcome};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One declared example for a subject: the arguments to call it with and
/// how the call is expected to conclude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub arguments: Vec<Literal>,
    pub expected: Outcome,
}

impl Case {
    #[must_use]
    pub fn new(arguments: Vec<Literal>, expected: Outcome) -> Self {
        Self {
            arguments,
            expected,
        }
    }

    /// Canonical case string; decodes back to an equal `Case`.
    #[must_use]
    pub fn render(&self) -> String {
        let args = self
            .arguments
            .iter()
            .map(Literal::render)
            .collect::<Vec<_>>()
            .join(", ");
        format!("({args}) -> {}", self.expected.render())
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaseError {
    #[error("parse error at position {position}: {reason}")]
    Parse { reason: String, position: usize },
    #[error("malformed case {case:?}: {reason}")]
    MalformedCase { case: String, reason: String },
    #[error("unknown outcome {0:?}")]
    UnknownOutcome(String),
}

impl CaseError {
    fn parse(reason: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            reason: reason.into(),
            position,
        }
    }

    fn malformed(case: &str, reason: impl Into<String>) -> Self {
        Self::MalformedCase {
            case: case.to_owned(),
            reason: reason.into(),
        }
    }

    fn shifted(self, by: usize) -> Self {
        match self {
            Self::Parse { reason, position } => Self::Parse {
                reason,
                position: position + by,
            },
            other => other,
        }
    }
}

const ASSERTION_KEYWORD: &str = "assertion error";

/// Decodes a single literal token.
///
/// Grammar (positions are char offsets into `token`):
///   literal → text | integer | float | "true" | "false" | "null"
///   text    → '"' ( '\' ( '"' | '\' | 'n' | 't' | 'r' ) | [^"\\] )* '"'
///   integer → [+-]? DIGIT+
///   float   → [+-]? DIGIT+ ( "." DIGIT+ )? ( [eE] [+-]? DIGIT+ )?   (one of the two groups required)
pub fn parse_literal(token: &str) -> Result<Literal, CaseError> {
    let chars: Vec<char> = token.chars().collect();
    match chars.first() {
        None => Err(CaseError::parse("empty literal", 0)),
        Some('"') => {
            let (text, end) = scan_text(&chars, 0)?;
            if end != chars.len() {
                return Err(CaseError::parse(
                    "unexpected characters after text literal",
                    end,
                ));
            }
            Ok(Literal::Text(text))
        }
        Some(c) if *c == '+' || *c == '-' || c.is_ascii_digit() => parse_number(token, &chars),
        Some(_) => match token {
            "true" => Ok(Literal::Boolean(true)),
            "false" => Ok(Literal::Boolean(false)),
            "null" => Ok(Literal::Null),
            _ => Err(CaseError::parse(
                format!("unrecognised literal {token:?}"),
                0,
            )),
        },
    }
}

/// Reads a quoted text literal whose opening quote sits at `start`.
/// Returns the unescaped text and the index just past the closing quote.
fn scan_text(chars: &[char], start: usize) -> Result<(String, usize), CaseError> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let escaped = match chars.get(i + 1) {
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some(other) => {
                        return Err(CaseError::parse(
                            format!("unsupported escape '\\{other}'"),
                            i,
                        ));
                    }
                    None => break,
                };
                out.push(escaped);
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(CaseError::parse("unterminated text literal", start))
}

fn parse_number(token: &str, chars: &[char]) -> Result<Literal, CaseError> {
    let digits_from = |mut i: usize| {
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = usize::from(matches!(chars[0], '+' | '-'));
    let int_end = digits_from(i);
    if int_end == i {
        return Err(CaseError::parse("expected digit", i));
    }
    i = int_end;

    let mut is_float = false;
    if i < chars.len() && chars[i] == '.' {
        let frac_end = digits_from(i + 1);
        if frac_end == i + 1 {
            return Err(CaseError::parse("expected digit after '.'", i + 1));
        }
        is_float = true;
        i = frac_end;
    }
    if i < chars.len() && matches!(chars[i], 'e' | 'E') {
        let mut exp = i + 1;
        if exp < chars.len() && matches!(chars[exp], '+' | '-') {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end == exp {
            return Err(CaseError::parse("expected exponent digits", exp));
        }
        is_float = true;
        i = exp_end;
    }
    if i < chars.len() {
        return Err(CaseError::parse(
            format!("unexpected character '{}' in number", chars[i]),
            i,
        ));
    }

    if is_float {
        let value = token
            .parse::<f64>()
            .map_err(|_| CaseError::parse(format!("invalid float: {token}"), 0))?;
        if !value.is_finite() {
            return Err(CaseError::parse(
                format!("float literal out of range: {token}"),
                0,
            ));
        }
        Ok(Literal::Float(value))
    } else {
        token
            .parse::<i64>()
            .map(Literal::Integer)
            .map_err(|_| CaseError::parse(format!("integer literal out of range: {token}"), 0))
    }
}

/// Bare outcome words such as `small` or `too big` decode as text values.
fn parse_bare_word(segment: &str) -> Option<Literal> {
    let plain = !segment.is_empty()
        && segment
            .chars()
            .all(|c| !c.is_control() && !matches!(c, '(' | ')' | ',' | '"'));
    plain.then(|| Literal::text(segment))
}

/// Decodes the text after `->`.
pub fn decode_outcome(segment: &str) -> Result<Outcome, CaseError> {
    let segment = segment.trim();
    match segment {
        "" => return Err(CaseError::UnknownOutcome(String::new())),
        "ok" => return Ok(Outcome::Ok),
        "*" => return Ok(Outcome::NonTerminating),
        "divide by zero" => return Ok(Outcome::DivideByZero),
        "null pointer" => return Ok(Outcome::NullPointer),
        "out of bounds" => return Ok(Outcome::OutOfBounds),
        _ => {}
    }

    if let Some(rest) = segment.strip_prefix(ASSERTION_KEYWORD) {
        if rest.is_empty() {
            return Ok(Outcome::AssertionError(None));
        }
        if rest.starts_with(char::is_whitespace) {
            return match parse_literal(rest.trim()) {
                Ok(Literal::Text(message)) => Ok(Outcome::AssertionError(Some(message))),
                _ => Err(CaseError::UnknownOutcome(segment.to_owned())),
            };
        }
    }

    match parse_literal(segment) {
        Ok(value) => Ok(Outcome::Value(value)),
        Err(_) => parse_bare_word(segment)
            .map(Outcome::Value)
            .ok_or_else(|| CaseError::UnknownOutcome(segment.to_owned())),
    }
}

/// Decodes a full case string `(<arg>, ...) -> <outcome>`.
pub fn decode_case(input: &str) -> Result<Case, CaseError> {
    let text = input.trim();
    let chars: Vec<char> = text.chars().collect();
    if chars.first() != Some(&'(') {
        return Err(CaseError::malformed(text, "case must start with '('"));
    }

    let close = find_closing_paren(text, &chars)?;
    let arguments = decode_arguments(text, &chars[1..close], 1)?;

    let rest: String = chars[close + 1..].iter().collect();
    let outcome = rest
        .trim_start()
        .strip_prefix("->")
        .ok_or_else(|| CaseError::malformed(text, "missing '->' separator"))?;
    let expected = decode_outcome(outcome)?;

    Ok(Case {
        arguments,
        expected,
    })
}

fn find_closing_paren(text: &str, chars: &[char]) -> Result<usize, CaseError> {
    let mut i = 1;
    while i < chars.len() {
        match chars[i] {
            '"' => {
                let (_, end) = scan_text(chars, i)?;
                i = end;
            }
            ')' => return Ok(i),
            '(' => {
                return Err(CaseError::malformed(
                    text,
                    "nested '(' in argument list",
                ));
            }
            _ => i += 1,
        }
    }
    Err(CaseError::malformed(text, "missing closing ')'"))
}

/// Splits on top-level commas and parses each argument. `base` is the char
/// offset of `segment` in the case string, used to position parse errors.
fn decode_arguments(text: &str, segment: &[char], base: usize) -> Result<Vec<Literal>, CaseError> {
    if segment.iter().all(|c| c.is_whitespace()) {
        return Ok(Vec::new());
    }

    let mut bounds = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < segment.len() {
        match segment[i] {
            '"' => {
                let (_, end) = scan_text(segment, i).map_err(|err| err.shifted(base))?;
                i = end;
            }
            ',' => {
                bounds.push((start, i));
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    bounds.push((start, segment.len()));

    bounds
        .into_iter()
        .map(|(from, to)| {
            let raw = &segment[from..to];
            let leading = raw.iter().take_while(|c| c.is_whitespace()).count();
            let token: String = raw.iter().collect::<String>().trim().to_owned();
            if token.is_empty() {
                return Err(CaseError::malformed(text, "empty argument"));
            }
            parse_literal(&token).map_err(|err| err.shifted(base + from + leading))
        })
        .collect()
}
