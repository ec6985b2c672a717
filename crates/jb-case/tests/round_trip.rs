use jb_case::{Case, decode_case, parse_literal};
use jb_types::{Literal, Outcome};
use proptest::prelude::*;

fn literal_strategy() -> impl Strategy<Value = Literal> {
    prop_oneof![
        any::<i64>().prop_map(Literal::Integer),
        any::<f64>()
            .prop_filter("finite floats only", |v| v.is_finite())
            .prop_map(Literal::Float),
        any::<bool>().prop_map(Literal::Boolean),
        any::<String>().prop_map(Literal::Text),
    ]
}

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Ok),
        Just(Outcome::NonTerminating),
        Just(Outcome::DivideByZero),
        proptest::option::of(any::<String>()).prop_map(Outcome::AssertionError),
        literal_strategy().prop_map(Outcome::Value),
    ]
}

proptest! {
    #[test]
    fn rendered_literals_parse_back(value in literal_strategy()) {
        let parsed = parse_literal(&value.render()).expect("rendered literal parses");
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn rendered_cases_decode_back(
        arguments in proptest::collection::vec(literal_strategy(), 0..5),
        expected in outcome_strategy(),
    ) {
        let case = Case::new(arguments, expected);
        let decoded = decode_case(&case.render()).expect("rendered case decodes");
        prop_assert_eq!(decoded, case);
    }

    #[test]
    fn decoding_never_panics(input in "\\PC{0,40}") {
        let first = decode_case(&input);
        prop_assert_eq!(first, decode_case(&input));
    }
}
