//! Preconditions over string arguments.

use jb_registry::SourceUnit;
use jb_runtime::SubjectTable;
use jb_types::{Fault, Literal, ParamType, Return};

use crate::{check, declare, qualified, text_arg};

const CLASS: &str = "Strings";

#[must_use]
pub fn unit() -> SourceUnit {
    SourceUnit {
        path: file!().to_owned(),
        declarations: vec![
            declare!(CLASS, "nonEmptyString")
                .param(ParamType::Text)
                .case(r#"("") -> assertion error"#)
                .case(r#"("PA") -> ok"#),
            declare!(CLASS, "stringIsUppercase")
                .param(ParamType::Text)
                .case(r#"("HELLO") -> ok"#)
                .case(r#"("hello") -> assertion error"#),
            declare!(CLASS, "atLeastThreeChars")
                .param(ParamType::Text)
                .case(r#"("ab") -> assertion error"#)
                .case(r#"("abc") -> ok"#)
                .case(r#"("abcd") -> ok"#),
            declare!(CLASS, "startsWithH")
                .param(ParamType::Text)
                .case(r#"("hello") -> ok"#)
                .case(r#"("world") -> assertion error"#),
            declare!(CLASS, "spellsExactlyProgramAnalysis")
                .param(ParamType::Text)
                .case("() -> assertion error")
                .case(r#"("ProgramAnalysis") -> ok"#),
        ],
    }
}

pub fn bind(table: &mut SubjectTable) {
    table.insert(qualified(CLASS, "nonEmptyString"), non_empty_string);
    table.insert(qualified(CLASS, "stringIsUppercase"), string_is_uppercase);
    table.insert(qualified(CLASS, "atLeastThreeChars"), at_least_three_chars);
    table.insert(qualified(CLASS, "startsWithH"), starts_with_h);
    table.insert(
        qualified(CLASS, "spellsExactlyProgramAnalysis"),
        spells_exactly_program_analysis,
    );
}

fn non_null(args: &[Literal]) -> Result<&str, Fault> {
    text_arg(args, 0)?.ok_or_else(|| Fault::assertion("input must not be null"))
}

pub fn non_empty_string(args: &[Literal]) -> Result<Return, Fault> {
    let input = non_null(args)?;
    check(!input.is_empty(), "input must not be empty")?;
    Ok(None)
}

pub fn string_is_uppercase(args: &[Literal]) -> Result<Return, Fault> {
    let input = non_null(args)?;
    check(input == input.to_uppercase(), "input must be uppercase")?;
    Ok(None)
}

pub fn at_least_three_chars(args: &[Literal]) -> Result<Return, Fault> {
    let input = non_null(args)?;
    check(
        input.chars().count() >= 3,
        "input must have at least 3 characters",
    )?;
    Ok(None)
}

pub fn starts_with_h(args: &[Literal]) -> Result<Return, Fault> {
    let input = non_null(args)?;
    check(!input.is_empty(), "input must not be empty")?;
    check(input.starts_with('h'), "input must start with 'h'")?;
    Ok(None)
}

pub fn spells_exactly_program_analysis(args: &[Literal]) -> Result<Return, Fault> {
    let input = non_null(args)?;
    check(
        input == "ProgramAnalysis",
        "string does not match 'ProgramAnalysis'",
    )?;
    Ok(None)
}
