use dapce::dataset;
use dapce::error::ErrorKind;
use dapce::functions::Function;
use dapce::projection::IndexTriple;
use dapce::{DapError, Dds, Result, Value, VarRef, Variable};

const DATASET: &str = r#"{
  "name": "fun",
  "variables": [
    { "name": "x", "type": "Int32", "value": 4 },
    { "name": "v", "type": "Array", "element": "Int32",
      "dims": [ { "name": "i", "size": 10 } ],
      "values": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] },
    { "name": "g", "type": "Grid",
      "array": { "name": "t", "type": "Array", "element": "Float64",
                 "dims": [ { "name": "lat", "size": 3 }, { "name": "lon", "size": 4 } ],
                 "values": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11] },
      "maps": [
        { "name": "lat", "type": "Array", "element": "Float64", "dims": [ { "name": "lat", "size": 3 } ],
          "values": [-10, 0, 10] },
        { "name": "lon", "type": "Array", "element": "Float64", "dims": [ { "name": "lon", "size": 4 } ],
          "values": [100, 110, 120, 130] } ] },
    { "name": "names", "type": "Grid",
      "array": { "name": "n", "type": "Array", "element": "Int16", "dims": [2], "values": [1, 2] },
      "maps": [ { "name": "label", "type": "Array", "element": "String", "dims": [2], "values": ["a", "b"] } ] },
    { "name": "cast", "type": "Sequence",
      "fields": [ { "name": "depth", "type": "Int32" } ],
      "rows": [ [5], [10], [15], [20], [25] ] }
  ]
}"#;

fn setup() -> Dds {
    dataset::load(DATASET).unwrap()
}

fn function_value(dds: &mut Dds, ce: &str) -> Option<Value> {
    dds.parse_constraint(ce).unwrap();
    assert!(dds.functional_expression(), "{ce}");
    let result = dds.eval_function("fun").unwrap()?;
    dds.variable(&result).and_then(Variable::value).cloned()
}

fn grid_dims(dds: &Dds, name: &str) -> Vec<IndexTriple> {
    let grid = dds.var(name).unwrap().as_grid().unwrap();
    grid.array_var().as_array().unwrap().dims().iter().map(|d| d.constraint()).collect()
}

#[test]
fn version_names_the_evaluator() {
    let mut dds = setup();
    let Some(Value::Str(text)) = function_value(&mut dds, "version()") else {
        panic!("version() should produce a string");
    };
    assert!(text.starts_with("dapce/"));
}

#[test]
fn function_results_are_read_and_projected() {
    let mut dds = setup();
    dds.parse_constraint("version()").unwrap();
    let result = dds.eval_function("fun").unwrap().unwrap();
    let variable = dds.variable(&result).unwrap();
    assert!(variable.read_p());
    assert!(variable.send_p());
}

#[test]
fn length_counts_what_is_selected() {
    let mut dds = setup();
    assert_eq!(function_value(&mut dds, "length(v)"), Some(Value::UInt32(10)));
    assert_eq!(function_value(&mut dds, "v[0:3:9],length(v)"), Some(Value::UInt32(4)));
    assert_eq!(function_value(&mut dds, "cast[1:3],length(cast)"), Some(Value::UInt32(3)));
    assert_eq!(function_value(&mut dds, "length(x)"), Some(Value::UInt32(1)));
}

#[test]
fn value_functions_as_operands() {
    let mut dds = setup();
    dds.parse_constraint("&length(v)>5").unwrap();
    assert!(dds.eval_selection("fun").unwrap());
    dds.parse_constraint("&x<length(v)").unwrap();
    assert!(dds.eval_selection("fun").unwrap());
    dds.parse_constraint("&length(v,v)>1").unwrap();
    let err = dds.eval_selection("fun").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedExpression);
}

#[test]
fn grid_selects_by_map_values() {
    let mut dds = setup();
    dds.parse_constraint("grid(g,\"lat>=0\")").unwrap();
    assert!(dds.var("g").unwrap().send_p());
    assert_eq!(grid_dims(&dds, "g"), vec![IndexTriple::new(1, 1, 2), IndexTriple::whole(4)]);
    let lat = dds.var("g.lat").unwrap().as_array().unwrap();
    assert_eq!(lat.dims()[0].constraint(), IndexTriple::new(1, 1, 2));

    dds.parse_constraint("grid(g,\"-5<lat<5\",\"lon>=115\")").unwrap();
    assert_eq!(grid_dims(&dds, "g"), vec![IndexTriple::new(1, 1, 1), IndexTriple::new(2, 1, 3)]);
    assert_eq!(dds.print_values("fun").unwrap(), "Grid g = { { { 6, 7 } }, { 0 }, { 120, 130 } };\n");
}

#[test]
fn grid_rejects_bad_requests() {
    let mut dds = setup();
    for ce in [
        "grid(g,\"lat>50\")",
        "grid(x,\"lat>0\")",
        "grid(g,\"depth<3\")",
        "grid(g,5)",
        "grid(g,\"lat\")",
        "grid(names,\"label>1\")",
        "grid()",
    ] {
        let err = dds.parse_constraint(ce).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedExpression, "{ce}");
    }
}

fn even(args: &[VarRef], dds: &mut Dds, _dataset: &str) -> Result<bool> {
    let [arg] = args else {
        return Err(DapError::malformed("even() takes one argument"));
    };
    match dds.variable(arg).and_then(Variable::value) {
        Some(Value::Int32(v)) => Ok(v % 2 == 0),
        _ => Err(DapError::malformed("even() needs an Int32")),
    }
}

fn declined(_args: &[VarRef], _dds: &mut Dds, _dataset: &str) -> Result<Option<VarRef>> {
    Ok(None)
}

fn add_flag(_args: &[VarRef], dds: &mut Dds, _dataset: &str) -> Result<()> {
    dds.add_var_nocopy(Variable::with_value("flag", Value::Byte(1)));
    dds.mark("flag", true);
    Ok(())
}

#[test]
fn registered_boolean_functions_select() {
    let mut dds = setup();
    dds.add_function("even", Function::Boolean(even));
    dds.parse_constraint("&even(x)").unwrap();
    assert!(dds.boolean_expression());
    assert!(dds.eval_selection("fun").unwrap());
    dds.parse_constraint("&even(x)&x>10").unwrap();
    assert!(!dds.eval_selection("fun").unwrap());

    let err = dds.parse_constraint("even(x)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedExpression);
}

#[test]
fn functions_in_the_wrong_place_or_missing() {
    let mut dds = setup();
    for ce in ["&version()", "&nothing(x)", "nothing()", "&x>nothing()"] {
        let err = dds.parse_constraint(ce).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedExpression, "{ce}");
    }
}

#[test]
fn declining_functions() {
    let mut dds = setup();
    dds.add_function("declined", Function::Value(declined));
    dds.parse_constraint("declined()").unwrap();
    assert_eq!(dds.eval_function("fun").unwrap(), None);

    dds.parse_constraint("&declined()>1").unwrap();
    let err = dds.eval_selection("fun").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn projection_functions_can_add_variables() {
    let mut dds = setup();
    dds.add_function("flagged", Function::Projection(add_flag));
    dds.parse_constraint("x,flagged()").unwrap();
    assert!(dds.clauses().is_empty());
    assert!(dds.var("flag").unwrap().send_p());
    assert_eq!(dds.print_values("fun").unwrap(), "Int32 x = 4;\nByte flag = 1;\n");
}
