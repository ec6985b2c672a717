#![forbid(unsafe_code)]

//! Subject functions and their case declarations.
//!
//! Every subject lives under the `jpamb.cases` package, one module per
//! class. Declarations carry the case strings verbatim; the functions are
//! bound by the same qualified names in [`subject_table`].

use jb_registry::{Declaration, Discovery, DuplicatePolicy, Registry, SourceUnit, TagRegistry};
use jb_runtime::SubjectTable;
use jb_types::{Fault, Literal};

pub const PACKAGE: &str = "jpamb.cases";

/// Declares a subject of `$class` at the call site's source location.
macro_rules! declare {
    ($class:expr, $method:expr) => {
        jb_registry::Declaration::new(
            $crate::qualified($class, $method),
            jb_registry::SourceLocation::new(file!(), line!() as usize),
        )
    };
}
pub(crate) use declare;

pub mod branch;
pub mod floats;
pub mod loops;
pub mod strings;

#[must_use]
pub fn qualified(class: &str, method: &str) -> String {
    format!("{PACKAGE}.{class}.{method}")
}

#[must_use]
pub fn source_units() -> Vec<SourceUnit> {
    vec![
        branch::unit(),
        floats::unit(),
        loops::unit(),
        strings::unit(),
    ]
}

#[must_use]
pub fn declarations() -> Vec<Declaration> {
    source_units()
        .into_iter()
        .flat_map(|unit| unit.declarations)
        .collect()
}

#[must_use]
pub fn subject_table() -> SubjectTable {
    let mut table = SubjectTable::new();
    branch::bind(&mut table);
    floats::bind(&mut table);
    loops::bind(&mut table);
    strings::bind(&mut table);
    table
}

/// Builds the corpus registry with the standard tag set.
#[must_use]
pub fn discover(policy: DuplicatePolicy) -> Discovery {
    Registry::discover(&source_units(), &TagRegistry::standard(), policy)
}

/// `assert cond : message`.
fn check(condition: bool, message: &str) -> Result<(), Fault> {
    if condition {
        Ok(())
    } else {
        Err(Fault::assertion(message))
    }
}

/// A reference argument; `None` when the case passed `null`.
fn text_arg(args: &[Literal], position: usize) -> Result<Option<&str>, Fault> {
    match args.get(position) {
        Some(Literal::Text(value)) => Ok(Some(value)),
        Some(Literal::Null) => Ok(None),
        Some(_) => Err(Fault::assertion(format!("argument {position} is not a string"))),
        None => Err(Fault::OutOfBounds),
    }
}

fn int_arg(args: &[Literal], position: usize) -> Result<i64, Fault> {
    match args.get(position) {
        Some(Literal::Integer(value)) => Ok(*value),
        Some(_) => Err(Fault::assertion(format!("argument {position} is not an integer"))),
        None => Err(Fault::OutOfBounds),
    }
}

fn float_arg(args: &[Literal], position: usize) -> Result<f32, Fault> {
    match args.get(position) {
        Some(Literal::Float(value)) => Ok(*value as f32),
        Some(Literal::Integer(value)) => Ok(*value as f32),
        Some(_) => Err(Fault::assertion(format!("argument {position} is not a float"))),
        None => Err(Fault::OutOfBounds),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use jb_registry::DuplicatePolicy;

    use super::{declarations, discover, subject_table};

    #[test]
    fn every_declaration_is_bound_to_a_function() {
        let declared: BTreeSet<String> = declarations()
            .into_iter()
            .map(|declaration| declaration.qualified_name)
            .collect();
        let table = subject_table();
        let bound: BTreeSet<String> = table.names().map(str::to_owned).collect();
        assert_eq!(declared, bound);
    }

    #[test]
    fn corpus_discovers_cleanly() {
        let discovery = discover(DuplicatePolicy::Reject);
        assert!(discovery.is_clean(), "{:?}", discovery.diagnostics);
        assert_eq!(discovery.registry.len(), 20);

        let forever = discovery
            .registry
            .resolve("forever")
            .expect("unique simple name");
        assert_eq!(forever.qualified_name, "jpamb.cases.Loops.forever");
        assert!(forever.has_tag("LOOP"));
    }

    #[test]
    fn corpus_case_count_matches_declarations() {
        let discovery = discover(DuplicatePolicy::Reject);
        let registered: usize = discovery
            .registry
            .subjects()
            .map(|subject| subject.cases.len())
            .sum();
        let declared: usize = declarations()
            .iter()
            .map(|declaration| declaration.cases.len())
            .sum();
        assert_eq!(registered, declared);
    }
}
