//! Loops, including ones that never exit.

use std::hint::{black_box, spin_loop};

use jb_registry::SourceUnit;
use jb_registry::tags::{INTEGER_OVERFLOW, LOOP};
use jb_runtime::SubjectTable;
use jb_types::{Fault, Literal, ParamType, Return};

use crate::{declare, int_arg, qualified};

const CLASS: &str = "Loops";

#[must_use]
pub fn unit() -> SourceUnit {
    SourceUnit {
        path: file!().to_owned(),
        declarations: vec![
            declare!(CLASS, "forever").case("() -> *").tag(LOOP),
            declare!(CLASS, "neverAsserts").case("() -> *").tag(LOOP),
            declare!(CLASS, "neverDivides").case("() -> *").tag(LOOP),
            declare!(CLASS, "terminates")
                .case("() -> assertion error")
                .tag(LOOP)
                .tag(INTEGER_OVERFLOW),
            declare!(CLASS, "testMultipleBranches")
                .param(ParamType::Int)
                .case("(5) -> small")
                .case("(10) -> medium")
                .case("(20) -> large"),
            declare!(CLASS, "testEqual")
                .param(ParamType::Int)
                .case("(5) -> less")
                .case("(10) -> equal")
                .case("(15) -> greater"),
            declare!(CLASS, "testNotEqual")
                .param(ParamType::Int)
                .case("(5) -> not equal")
                .case("(10) -> is ten"),
            declare!(CLASS, "testGreaterOrEqual")
                .param(ParamType::Int)
                .case("(15) -> ok")
                .case("(5) -> too small"),
            declare!(CLASS, "testLessOrEqual")
                .param(ParamType::Int)
                .case("(5) -> ok")
                .case("(15) -> too big"),
        ],
    }
}

pub fn bind(table: &mut SubjectTable) {
    table.insert(qualified(CLASS, "forever"), forever);
    table.insert(qualified(CLASS, "neverAsserts"), never_asserts);
    table.insert(qualified(CLASS, "neverDivides"), never_divides);
    table.insert(qualified(CLASS, "terminates"), terminates);
    table.insert(qualified(CLASS, "testMultipleBranches"), test_multiple_branches);
    table.insert(qualified(CLASS, "testEqual"), test_equal);
    table.insert(qualified(CLASS, "testNotEqual"), test_not_equal);
    table.insert(qualified(CLASS, "testGreaterOrEqual"), test_greater_or_equal);
    table.insert(qualified(CLASS, "testLessOrEqual"), test_less_or_equal);
}

/// Spins while `counter` stays positive; it never changes.
fn spin_while_positive(counter: i32) {
    while black_box(counter) > 0 {
        spin_loop();
    }
}

pub fn forever(_: &[Literal]) -> Result<Return, Fault> {
    loop {
        black_box(());
        spin_loop();
    }
}

pub fn never_asserts(_: &[Literal]) -> Result<Return, Fault> {
    spin_while_positive(1);
    Err(Fault::Assertion(None))
}

pub fn never_divides(_: &[Literal]) -> Result<Return, Fault> {
    spin_while_positive(1);
    let zero = black_box(0_i32);
    zero.checked_div(zero)
        .map(|quotient| Some(Literal::Integer(i64::from(quotient))))
        .ok_or(Fault::DivideByZero)
}

/// A 16-bit post-increment loop that exits on its first test.
pub fn terminates(_: &[Literal]) -> Result<Return, Fault> {
    let mut i: i16 = 0;
    loop {
        let before = i;
        i = i.wrapping_add(1);
        if before == 0 {
            break;
        }
    }
    black_box(i);
    Err(Fault::Assertion(None))
}

fn word(value: &str) -> Result<Return, Fault> {
    Ok(Some(Literal::text(value)))
}

pub fn test_multiple_branches(args: &[Literal]) -> Result<Return, Fault> {
    let x = int_arg(args, 0)?;
    if x < 10 {
        return word("small");
    }
    if x < 20 {
        return word("medium");
    }
    word("large")
}

pub fn test_equal(args: &[Literal]) -> Result<Return, Fault> {
    let x = int_arg(args, 0)?;
    if x == 10 {
        return word("equal");
    }
    if x < 10 {
        return word("less");
    }
    word("greater")
}

pub fn test_not_equal(args: &[Literal]) -> Result<Return, Fault> {
    if int_arg(args, 0)? != 10 {
        return word("not equal");
    }
    word("is ten")
}

pub fn test_greater_or_equal(args: &[Literal]) -> Result<Return, Fault> {
    if int_arg(args, 0)? >= 10 {
        return word("ok");
    }
    word("too small")
}

pub fn test_less_or_equal(args: &[Literal]) -> Result<Return, Fault> {
    if int_arg(args, 0)? <= 10 {
        return word("ok");
    }
    word("too big")
}
