#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    Integer,
    Float,
    Boolean,
    Text,
    Null,
}

/// A typed case value: a subject argument or an expected return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Integer(i64),
    Float(#[serde(with = "float_repr")] f64),
    Boolean(bool),
    Text(String),
    Null,
}

impl Literal {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn kind(&self) -> LiteralKind {
        match self {
            Self::Integer(_) => LiteralKind::Integer,
            Self::Float(_) => LiteralKind::Float,
            Self::Boolean(_) => LiteralKind::Boolean,
            Self::Text(_) => LiteralKind::Text,
            Self::Null => LiteralKind::Null,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// `None` for anything but `Text`, including `Null`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Structural equality where two NaN floats compare equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self == other,
        }
    }

    /// Canonical case-string form. Text is quoted and escaped, floats always
    /// carry a fractional part or exponent.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Integer(v) => v.to_string(),
            Self::Float(v) => format!("{v:?}"),
            Self::Boolean(v) => v.to_string(),
            Self::Text(v) => quote_text(v),
            Self::Null => "null".to_owned(),
        }
    }
}

/// JSON numbers cannot carry NaN or infinities, so those travel as the
/// strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("not a float: {other:?}"))),
            },
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[must_use]
pub fn quote_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Declared parameter type of a subject, with JVM widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Boolean,
    Short,
    Int,
    Long,
    Float,
    Double,
    Text,
}

impl ParamType {
    #[must_use]
    pub fn from_source_name(name: &str) -> Option<Self> {
        let out = match name {
            "boolean" => Self::Boolean,
            "short" => Self::Short,
            "int" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "String" | "java.lang.String" => Self::Text,
            _ => return None,
        };
        Some(out)
    }

    #[must_use]
    pub fn source_name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Text => "String",
        }
    }

    /// Checks `value` against this parameter and narrows it to the declared
    /// width. Integers widen into floating parameters.
    pub fn bind(self, position: usize, value: &Literal) -> Result<Literal, TypeError> {
        let out_of_range = |value: i64| TypeError::IntegerOutOfRange {
            position,
            param: self,
            value,
        };

        match (self, value) {
            (Self::Boolean, Literal::Boolean(v)) => Ok(Literal::Boolean(*v)),
            (Self::Short, Literal::Integer(v)) => i16::try_from(*v)
                .map(|narrow| Literal::Integer(i64::from(narrow)))
                .map_err(|_| out_of_range(*v)),
            (Self::Int, Literal::Integer(v)) => i32::try_from(*v)
                .map(|narrow| Literal::Integer(i64::from(narrow)))
                .map_err(|_| out_of_range(*v)),
            (Self::Long, Literal::Integer(v)) => Ok(Literal::Integer(*v)),
            (Self::Float, Literal::Integer(v)) => Ok(Literal::Float(f64::from(*v as f32))),
            (Self::Float, Literal::Float(v)) => {
                if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                    return Err(TypeError::FloatOutOfRange {
                        position,
                        param: self,
                        value: *v,
                    });
                }
                Ok(Literal::Float(f64::from(*v as f32)))
            }
            (Self::Double, Literal::Integer(v)) => Ok(Literal::Float(*v as f64)),
            (Self::Double, Literal::Float(v)) => Ok(Literal::Float(*v)),
            (Self::Text, Literal::Text(_) | Literal::Null) => Ok(value.clone()),
            _ => Err(TypeError::ParamMismatch {
                position,
                param: self,
                found: value.kind(),
            }),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

/// Binds a decoded argument list to a subject's declared parameters.
pub fn bind_arguments(params: &[ParamType], args: &[Literal]) -> Result<Vec<Literal>, TypeError> {
    if params.len() != args.len() {
        return Err(TypeError::ArityMismatch {
            expected: params.len(),
            found: args.len(),
        });
    }
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(position, (param, value))| param.bind(position, value))
        .collect()
}

/// Abnormal termination of a subject call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Fault {
    Assertion(Option<String>),
    DivideByZero,
    NullPointer,
    OutOfBounds,
}

impl Fault {
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(Some(message.into()))
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Assertion(message) => Outcome::AssertionError(message.clone()),
            Self::DivideByZero => Outcome::DivideByZero,
            Self::NullPointer => Outcome::NullPointer,
            Self::OutOfBounds => Outcome::OutOfBounds,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.outcome().render())
    }
}

/// What a subject call returns when it terminates normally; `None` is void.
pub type Return = Option<Literal>;

/// Expected or observed conclusion of a subject call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Value(Literal),
    AssertionError(Option<String>),
    NonTerminating,
    DivideByZero,
    NullPointer,
    OutOfBounds,
}

impl Outcome {
    #[must_use]
    pub fn is_non_terminating(&self) -> bool {
        matches!(self, Self::NonTerminating)
    }

    /// `true` for the variants a subject reports through a [`Fault`].
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::AssertionError(_) | Self::DivideByZero | Self::NullPointer | Self::OutOfBounds
        )
    }

    /// Same variant, ignoring the assertion message and the value payload.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Ok => "ok".to_owned(),
            Self::Value(value) => value.render(),
            Self::AssertionError(None) => "assertion error".to_owned(),
            Self::AssertionError(Some(message)) => {
                format!("assertion error {}", quote_text(message))
            }
            Self::NonTerminating => "*".to_owned(),
            Self::DivideByZero => "divide by zero".to_owned(),
            Self::NullPointer => "null pointer".to_owned(),
            Self::OutOfBounds => "out of bounds".to_owned(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("case supplies {found} arguments but subject takes {expected}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("argument {position} has kind {found:?} but parameter is {param}")]
    ParamMismatch {
        position: usize,
        param: ParamType,
        found: LiteralKind,
    },
    #[error("argument {position} value {value} does not fit parameter type {param}")]
    IntegerOutOfRange {
        position: usize,
        param: ParamType,
        value: i64,
    },
    #[error("argument {position} value {value} does not fit parameter type {param}")]
    FloatOutOfRange {
        position: usize,
        param: ParamType,
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::{Fault, Literal, LiteralKind, Outcome, ParamType, TypeError, bind_arguments};

    #[test]
    fn text_render_escapes_quotes_and_backslashes() {
        let value = Literal::text("say \"hi\" \\ bye");
        assert_eq!(value.render(), r#""say \"hi\" \\ bye""#);
    }

    #[test]
    fn float_render_keeps_fractional_part() {
        assert_eq!(Literal::Float(1.0).render(), "1.0");
        assert_eq!(Literal::Float(-1.5).render(), "-1.5");
    }

    #[test]
    fn semantic_eq_treats_nan_as_equal() {
        assert!(Literal::Float(f64::NAN).semantic_eq(&Literal::Float(f64::NAN)));
        assert!(!Literal::Float(1.0).semantic_eq(&Literal::Integer(1)));
    }

    #[test]
    fn int_parameter_rejects_values_wider_than_32_bits() {
        let err = ParamType::Int
            .bind(0, &Literal::Integer(i64::from(i32::MAX) + 1))
            .expect_err("must overflow");
        assert!(matches!(err, TypeError::IntegerOutOfRange { position: 0, .. }));
        assert_eq!(
            ParamType::Short.bind(1, &Literal::Integer(-5)),
            Ok(Literal::Integer(-5))
        );
    }

    #[test]
    fn float_parameter_narrows_to_single_precision() {
        let bound = ParamType::Float
            .bind(0, &Literal::Float(3.3))
            .expect("binds");
        assert_eq!(bound, Literal::Float(f64::from(3.3_f32)));
        let widened = ParamType::Double.bind(0, &Literal::Integer(2)).expect("binds");
        assert_eq!(widened, Literal::Float(2.0));
    }

    #[test]
    fn null_binds_only_to_text() {
        assert_eq!(ParamType::Text.bind(0, &Literal::Null), Ok(Literal::Null));
        let err = ParamType::Int.bind(0, &Literal::Null).expect_err("mismatch");
        assert_eq!(
            err,
            TypeError::ParamMismatch {
                position: 0,
                param: ParamType::Int,
                found: LiteralKind::Null,
            }
        );
    }

    #[test]
    fn arity_mismatch_is_reported_before_binding() {
        let err = bind_arguments(&[ParamType::Text], &[]).expect_err("arity");
        assert_eq!(
            err.to_string(),
            "case supplies 0 arguments but subject takes 1"
        );
    }

    #[test]
    fn outcome_render_uses_case_keywords() {
        assert_eq!(Outcome::Ok.render(), "ok");
        assert_eq!(Outcome::NonTerminating.render(), "*");
        assert_eq!(
            Outcome::AssertionError(Some("bad \"x\"".to_owned())).render(),
            r#"assertion error "bad \"x\"""#
        );
        assert_eq!(Outcome::Value(Literal::text("ok")).render(), "\"ok\"");
        assert_eq!(Fault::DivideByZero.outcome(), Outcome::DivideByZero);
    }

    #[test]
    fn same_kind_ignores_assertion_message() {
        let with = Outcome::AssertionError(Some("x".to_owned()));
        assert!(with.same_kind(&Outcome::AssertionError(None)));
        assert!(!with.same_kind(&Outcome::Ok));
    }

    #[test]
    fn literal_serialization_is_tagged() {
        let json = serde_json::to_string(&Literal::Integer(5)).expect("serialize");
        assert_eq!(json, r#"{"kind":"integer","value":5}"#);
        let back: Literal = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Literal::Integer(5));
    }

    #[test]
    fn non_finite_floats_survive_json() {
        for value in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -0.5] {
            let json = serde_json::to_string(&Literal::Float(value)).expect("serialize");
            let back: Literal = serde_json::from_str(&json).expect("deserialize");
            assert!(back.semantic_eq(&Literal::Float(value)), "{json}");
        }
        assert_eq!(
            serde_json::to_string(&Literal::Float(f64::NAN)).expect("serialize"),
            r#"{"kind":"float","value":"NaN"}"#
        );
        assert!(serde_json::from_str::<Literal>(r#"{"kind":"float","value":"lots"}"#).is_err());
    }
}
