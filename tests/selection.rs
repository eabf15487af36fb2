use std::sync::Arc;

use dapce::error::ErrorKind;
use dapce::reader::MemoryReader;
use dapce::variable::{Array, Dimension};
use dapce::{Clause, DapError, Dds, TypeTag, Value, Variable};

fn setup() -> (Dds, Arc<MemoryReader>) {
    let reader = Arc::new(
        MemoryReader::new()
            .with_scalar("x", Value::Int32(2))
            .with_scalar("a", Value::Int32(1))
            .with_scalar("b", Value::Int32(2))
            .with_scalar("c", Value::Int32(3))
            .with_scalar("u", Value::UInt16(7))
            .with_scalar("name", Value::Str("temperature".into()))
            .with_scalar("s.id", Value::Int32(9))
            .with_values("v", (1..=4).map(|i| Value::Float64(f64::from(i))).collect()),
    );
    let mut dds = Dds::new("sel", reader.clone());
    for (name, tag) in [
        ("x", TypeTag::Int32),
        ("a", TypeTag::Int32),
        ("b", TypeTag::Int32),
        ("c", TypeTag::Int32),
        ("u", TypeTag::UInt16),
        ("name", TypeTag::Str),
    ] {
        dds.add_var(&Variable::atomic(name, tag).unwrap());
    }
    dds.add_var(&Variable::structure("s", vec![Variable::atomic("id", TypeTag::Int32).unwrap()]));
    let v = Array::new(TypeTag::Float64, vec![Dimension::new(Some("i"), 4)]).unwrap();
    dds.add_var(&Variable::array("v", v));
    (dds, reader)
}

#[test]
fn empty_selection_is_true() {
    let (mut dds, reader) = setup();
    dds.parse_constraint("").unwrap();
    assert!(dds.clauses().is_empty());
    assert!(dds.eval_selection("sel").unwrap());
    assert!(dds.eval_selection("any other dataset").unwrap());
    assert_eq!(reader.total_reads(), 0);
}

#[test]
fn right_hand_list_is_an_or_that_stops_at_the_first_match() {
    let (mut dds, reader) = setup();
    dds.parse_constraint("&x=a,b,c").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    assert_eq!(reader.reads_of("a"), 1);
    assert_eq!(reader.reads_of("b"), 1);
    assert_eq!(reader.reads_of("c"), 0);
}

#[test]
fn literal_lists() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&x={5,6,2}").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&x=5,6,7").unwrap();
    assert!(!dds.eval_selection("sel").unwrap());
}

#[test]
fn clauses_are_anded_and_short_circuit() {
    let (mut dds, reader) = setup();
    dds.parse_constraint("&a>1&b<5").unwrap();
    assert!(!dds.eval_selection("sel").unwrap());
    assert_eq!(reader.reads_of("a"), 1);
    assert_eq!(reader.reads_of("b"), 0);

    let (mut dds, _) = setup();
    dds.parse_constraint("&a>0&b<5").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&a>0&b>5").unwrap();
    assert!(!dds.eval_selection("sel").unwrap());
}

#[test]
fn each_variable_is_read_at_most_once() {
    let (mut dds, reader) = setup();
    dds.parse_constraint("&x>0&x<5&x=a,x").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    assert!(dds.eval_selection("sel").unwrap());
    assert_eq!(reader.reads_of("x"), 1);
}

#[test]
fn bare_words_that_are_not_variables_become_strings() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&name=temperature").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    assert_eq!(dds.constants()[0].value(), Some(&Value::Str("temperature".into())));
}

#[test]
fn regex_selection() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&name=~\"temp\"").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&name=~\"ature\"").unwrap();
    assert!(!dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&x=~\"2\"").unwrap();
    let err = dds.eval_selection("sel").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedExpression);
}

#[test]
fn mixed_signedness_in_selections() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&u>-1").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&u<4000000000").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&x<2.5").unwrap();
    assert!(dds.eval_selection("sel").unwrap());
}

#[test]
fn number_against_string_is_false() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&x=\"2\"").unwrap();
    assert!(!dds.eval_selection("sel").unwrap());
}

#[test]
fn non_scalar_operands() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&x=s").unwrap();
    assert!(!dds.eval_selection("sel").unwrap());
    dds.parse_constraint("&s=x").unwrap();
    let err = dds.eval_selection("sel").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedExpression);
}

#[test]
fn selection_flags_referenced_variables() {
    let (mut dds, _) = setup();
    dds.parse_constraint("x&s.id>3").unwrap();
    assert!(dds.var("s.id").unwrap().in_selection());
    assert!(!dds.var("x").unwrap().in_selection());
    assert!(dds.var("x").unwrap().send_p());
    assert!(!dds.var("s").unwrap().send_p());
    assert!(dds.eval_selection("sel").unwrap());
}

#[test]
fn functional_and_boolean_forms_are_exclusive() {
    let (mut dds, _) = setup();
    dds.parse_constraint("version()").unwrap();
    assert!(dds.functional_expression());
    assert!(!dds.boolean_expression());

    dds.parse_constraint("&x>1&a<3").unwrap();
    assert!(dds.boolean_expression());
    assert!(!dds.functional_expression());

    let err = dds.parse_constraint("version()&x>1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedExpression);
    assert!(dds.clauses().is_empty());
}

#[test]
fn wrong_accessors_are_internal_errors() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&x>1").unwrap();
    let err = dds.eval_function("sel").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    dds.parse_constraint("&x>1&a>0").unwrap();
    let err = dds.eval_function("sel").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn parse_failures_leave_no_clauses() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&x>1").unwrap();
    let err = dds.parse_constraint("&x>").unwrap_err();
    assert!(matches!(err, DapError::Parse { line: Some(1), .. }));
    assert!(dds.clauses().is_empty());
    assert!(dds.constants().is_empty());
}

#[test]
fn unreadable_variables_surface_as_read_errors() {
    let reader = Arc::new(MemoryReader::new());
    let mut dds = Dds::new("empty", reader);
    dds.add_var(&Variable::atomic("t", TypeTag::Float32).unwrap());
    dds.parse_constraint("&t>0").unwrap();
    let err = dds.eval_selection("empty").unwrap_err();
    assert!(matches!(err, DapError::Read { ref variable, .. } if variable == "t"));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn operands_name_their_variables() {
    let (mut dds, _) = setup();
    dds.parse_constraint("&s.id>length(v)").unwrap();
    let Clause::Relation { left, right, .. } = &dds.clauses()[0] else {
        panic!("expected a relation");
    };
    assert_eq!(left.value_name(&dds).unwrap(), "id");
    assert_eq!(right[0].value_name(&dds).unwrap_err().kind(), ErrorKind::Internal);
}
