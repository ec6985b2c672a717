//! String validators with deep branching.

use jb_registry::SourceUnit;
use jb_runtime::SubjectTable;
use jb_types::{Fault, Literal, ParamType, Return};

use crate::{check, declare, qualified, text_arg};

const CLASS: &str = "Branch";

#[must_use]
pub fn unit() -> SourceUnit {
    SourceUnit {
        path: file!().to_owned(),
        declarations: vec![
            declare!(CLASS, "alternatingSum")
                .param(ParamType::Text)
                .case(r#"("a1b2c3") -> ok"#)
                .case(r#"("a1b2c4") -> assertion error"#)
                .case(r#"("11b2c3") -> assertion error"#)
                .case(r#"("a1b2") -> assertion error"#),
            declare!(CLASS, "fireTheNukes")
                .param(ParamType::Text)
                .case(r#"("PA02242") -> ok"#)
                .case(r#"("PA02243") -> assertion error"#)
                .case(r#"("PB02242") -> assertion error"#)
                .case(r#"("PA0224") -> assertion error"#),
            declare!(CLASS, "deepNesting")
                .param(ParamType::Text)
                .case(r#"("This1GoesDeep") -> ok"#)
                .case(r#"("") -> assertion error"#)
                .case(r#"("This1GoesDeeper") -> assertion error"#)
                .case(r#"("This2GoesDeep") -> assertion error"#),
        ],
    }
}

pub fn bind(table: &mut SubjectTable) {
    table.insert(qualified(CLASS, "alternatingSum"), alternating_sum);
    table.insert(qualified(CLASS, "fireTheNukes"), fire_the_nukes);
    table.insert(qualified(CLASS, "deepNesting"), deep_nesting);
}

/// Letter, digit, letter, digit, ... with the digits summing to exactly 6.
pub fn alternating_sum(args: &[Literal]) -> Result<Return, Fault> {
    let Some(input) = text_arg(args, 0)? else {
        return Err(Fault::Assertion(None));
    };

    let mut sum = 0;
    let mut expect_letter = true;
    for (i, c) in input.chars().enumerate() {
        if expect_letter {
            check(!c.is_ascii_digit(), &format!("expected letter at index {i}"))?;
            expect_letter = false;
        } else {
            let digit = c
                .to_digit(10)
                .ok_or_else(|| Fault::assertion(format!("expected digit at index {i}")))?;
            sum += digit;
            expect_letter = true;
        }
    }

    check(sum == 6 && expect_letter, "invalid sum or incomplete sequence")?;
    Ok(None)
}

/// Accepts only the launch code `PA02242`.
pub fn fire_the_nukes(args: &[Literal]) -> Result<Return, Fault> {
    let Some(input) = text_arg(args, 0)? else {
        return Err(Fault::Assertion(None));
    };

    let chars: Vec<char> = input.chars().collect();
    check(chars.len() == 7, "invalid code length")?;
    check(chars[..2] == ['P', 'A'], "invalid code prefix")?;
    let number: String = chars[2..].iter().collect();
    check(number == "02242", "invalid code number")?;
    Ok(None)
}

/// Accepts `This1GoesDeep`, consuming the words a token at a time.
pub fn deep_nesting(args: &[Literal]) -> Result<Return, Fault> {
    let Some(input) = text_arg(args, 0)? else {
        return Err(Fault::Assertion(None));
    };
    if input.is_empty() {
        return Err(Fault::Assertion(None));
    }

    let chars: Vec<char> = input.chars().collect();
    let word_at = |i: usize, word: &str| {
        i + 3 < chars.len() && chars[i..i + 4].iter().copied().eq(word.chars())
    };

    let mut i = 0;
    while i < chars.len() {
        let word = match chars[i] {
            'T' => Some("This"),
            'G' => Some("Goes"),
            'D' => Some("Deep"),
            '1' => None,
            other => {
                return Err(Fault::assertion(format!(
                    "unexpected character '{other}' at index {i}"
                )));
            }
        };
        if let Some(word) = word {
            check(word_at(i, word), &format!("expected '{word}' at index {i}"))?;
            i += 3;
        }
        i += 1;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use jb_types::{Fault, Literal};

    use super::{alternating_sum, deep_nesting, fire_the_nukes};

    fn text(value: &str) -> Vec<Literal> {
        vec![Literal::text(value)]
    }

    #[test]
    fn alternating_sum_checks_shape_and_total() {
        assert_eq!(alternating_sum(&text("a1b2c3")), Ok(None));
        assert_eq!(
            alternating_sum(&text("a1b2c4")),
            Err(Fault::assertion("invalid sum or incomplete sequence"))
        );
        assert_eq!(
            alternating_sum(&text("11b2c3")),
            Err(Fault::assertion("expected letter at index 0"))
        );
        assert!(alternating_sum(&text("a1b2")).is_err());
        assert_eq!(alternating_sum(&[Literal::Null]), Err(Fault::Assertion(None)));
    }

    #[test]
    fn fire_the_nukes_reports_the_failing_part() {
        assert_eq!(fire_the_nukes(&text("PA02242")), Ok(None));
        assert_eq!(
            fire_the_nukes(&text("PB02242")),
            Err(Fault::assertion("invalid code prefix"))
        );
        assert_eq!(
            fire_the_nukes(&text("PA0224")),
            Err(Fault::assertion("invalid code length"))
        );
    }

    #[test]
    fn deep_nesting_walks_words() {
        assert_eq!(deep_nesting(&text("This1GoesDeep")), Ok(None));
        assert_eq!(deep_nesting(&text("")), Err(Fault::Assertion(None)));
        assert_eq!(
            deep_nesting(&text("This1GoesDeeper")),
            Err(Fault::assertion("unexpected character 'e' at index 13"))
        );
        assert_eq!(
            deep_nesting(&text("This2GoesDeep")),
            Err(Fault::assertion("unexpected character '2' at index 4"))
        );
        assert_eq!(
            deep_nesting(&text("Dee")),
            Err(Fault::assertion("expected 'Deep' at index 0"))
        );
    }
}
