//! Single-precision comparisons.

use jb_registry::SourceUnit;
use jb_runtime::SubjectTable;
use jb_types::{Fault, Literal, ParamType, Return};

use crate::{check, declare, float_arg, qualified};

const CLASS: &str = "Floats";

#[must_use]
pub fn unit() -> SourceUnit {
    SourceUnit {
        path: file!().to_owned(),
        declarations: vec![
            declare!(CLASS, "nonNegativeFloat")
                .param(ParamType::Float)
                .case("(0.0) -> ok")
                .case("(-1.5) -> ok"),
            declare!(CLASS, "floatGreaterThanThree")
                .param(ParamType::Float)
                .case("(3.14) -> ok")
                .case("(2.71) -> assertion error"),
            declare!(CLASS, "floatIsPositive")
                .param(ParamType::Float)
                .case("(1.0) -> ok")
                .case("(0.0) -> assertion error"),
        ],
    }
}

pub fn bind(table: &mut SubjectTable) {
    table.insert(qualified(CLASS, "nonNegativeFloat"), non_negative_float);
    table.insert(qualified(CLASS, "floatGreaterThanThree"), float_greater_than_three);
    table.insert(qualified(CLASS, "floatIsPositive"), float_is_positive);
}

pub fn non_negative_float(args: &[Literal]) -> Result<Return, Fault> {
    check(float_arg(args, 0)? >= 0.0, "input must be non-negative")?;
    Ok(None)
}

pub fn float_greater_than_three(args: &[Literal]) -> Result<Return, Fault> {
    check(float_arg(args, 0)? > 3.0, "input must be greater than 3.0")?;
    Ok(None)
}

pub fn float_is_positive(args: &[Literal]) -> Result<Return, Fault> {
    check(float_arg(args, 0)? > 0.0, "input must be positive")?;
    Ok(None)
}
