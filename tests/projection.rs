use dapce::dataset;
use dapce::error::ErrorKind;
use dapce::projection::IndexTriple;
use dapce::Dds;

const DATASET: &str = r#"{
  "name": "proj",
  "variables": [
    { "name": "v", "type": "Array", "element": "Int32",
      "dims": [ { "name": "i", "size": 10 } ],
      "values": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] },
    { "name": "m", "type": "Array", "element": "Float32",
      "dims": [ { "name": "y", "size": 2 }, 3 ],
      "values": [0.5, 1.5, 2.5, 3.5, 4.5, 5.5] },
    { "name": "g", "type": "Grid",
      "array": { "name": "t", "type": "Array", "element": "Float64",
                 "dims": [ { "name": "lat", "size": 3 }, { "name": "lon", "size": 4 } ],
                 "values": [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11] },
      "maps": [
        { "name": "lat", "type": "Array", "element": "Float64", "dims": [ { "name": "lat", "size": 3 } ],
          "values": [-10, 0, 10] },
        { "name": "lon", "type": "Array", "element": "Float64", "dims": [ { "name": "lon", "size": 4 } ],
          "values": [100, 110, 120, 130] } ] },
    { "name": "cast", "type": "Sequence",
      "fields": [ { "name": "depth", "type": "Int32" }, { "name": "site", "type": "String" } ],
      "rows": [ [5, "A1"], [10, "B2"], [15, "A3"], [20, "B4"], [25, "A5"] ] }
  ]
}"#;

fn setup() -> Dds {
    dataset::load(DATASET).unwrap()
}

fn constraint_of(dds: &Dds, name: &str, dim: usize) -> IndexTriple {
    dds.var(name).unwrap().as_array().unwrap().dims()[dim].constraint()
}

#[test]
fn bracket_forms_expand_to_triples() {
    let mut dds = setup();
    dds.parse_constraint("v[2:1:5]").unwrap();
    assert_eq!(constraint_of(&dds, "v", 0), IndexTriple::new(2, 1, 5));
    dds.parse_constraint("v[7]").unwrap();
    assert_eq!(constraint_of(&dds, "v", 0), IndexTriple::new(7, 1, 7));
    dds.parse_constraint("v[3:8]").unwrap();
    assert_eq!(constraint_of(&dds, "v", 0), IndexTriple::new(3, 1, 8));
    dds.parse_constraint("v[0:3:9]").unwrap();
    assert_eq!(dds.var("v").unwrap().as_array().unwrap().constrained_len(), 4);
}

#[test]
fn out_of_range_indices_are_malformed() {
    let mut dds = setup();
    let err = dds.parse_constraint("v[20]").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedExpression);
    assert!(err.to_string().contains('v'));
    for ce in ["v[5:2]", "v[0:0:4]", "v[-1]", "v[1:2:3:4]"] {
        let err = dds.parse_constraint(ce).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedExpression, "{ce}");
    }
}

#[test]
fn index_groups_must_match_the_rank() {
    let mut dds = setup();
    let err = dds.parse_constraint("m[0]").unwrap_err();
    assert!(err.to_string().contains("Too few indices in constraint for m"));
    let err = dds.parse_constraint("v[1][2]").unwrap_err();
    assert!(err.to_string().contains("Too many indices in constraint for v"));
    dds.parse_constraint("m[1][0:2:2]").unwrap();
    assert_eq!(constraint_of(&dds, "m", 1), IndexTriple::new(0, 2, 2));
}

#[test]
fn failed_projection_leaves_constraints_untouched() {
    let mut dds = setup();
    // second group is out of range, first must not have been applied
    assert!(dds.parse_constraint("m[1][7]").is_err());
    assert_eq!(constraint_of(&dds, "m", 0), IndexTriple::whole(2));
}

#[test]
fn last_bracket_wins_and_reparse_resets() {
    let mut dds = setup();
    dds.parse_constraint("v[1:2],v[3:4]").unwrap();
    assert_eq!(constraint_of(&dds, "v", 0), IndexTriple::new(3, 1, 4));
    dds.parse_constraint("m").unwrap();
    assert_eq!(constraint_of(&dds, "v", 0), IndexTriple::whole(10));
    assert!(!dds.var("v").unwrap().send_p());
}

#[test]
fn grid_brackets_constrain_array_and_maps() {
    let mut dds = setup();
    dds.parse_constraint("g[1:2][0:2:2]").unwrap();
    let grid = dds.var("g").unwrap().as_grid().unwrap();
    let array = grid.array_var().as_array().unwrap();
    assert_eq!(array.dims()[0].constraint(), IndexTriple::new(1, 1, 2));
    assert_eq!(array.dims()[1].constraint(), IndexTriple::new(0, 2, 2));
    assert!(grid.maps().iter().all(|m| m.send_p()));
    assert_eq!(grid.maps()[1].as_array().unwrap().dims()[0].constraint(), IndexTriple::new(0, 2, 2));
    assert_eq!(
        dds.print_declarations(true),
        "Dataset {\n    Grid {\n      ARRAY:\n        Float64 t[lat = 2][lon = 2];\n      MAPS:\n        \
         Float64 lat[lat = 2];\n        Float64 lon[lon = 2];\n    } g;\n} proj;\n"
    );
}

#[test]
fn grid_map_projected_alone() {
    let mut dds = setup();
    dds.parse_constraint("g.lon").unwrap();
    assert!(dds.var("g").unwrap().send_p());
    assert!(dds.var("g.lon").unwrap().send_p());
    assert!(!dds.var("g.t").unwrap().send_p());
    // no longer a whole grid
    assert!(dds.print_declarations(true).contains("Structure {\n        Float64 lon[lon = 4];\n    } g;"));
}

#[test]
fn sequence_brackets_set_the_row_range() {
    let mut dds = setup();
    dds.parse_constraint("cast[1:3]").unwrap();
    let sequence = dds.var("cast").unwrap().as_sequence().unwrap();
    assert_eq!(sequence.row_range(), Some(IndexTriple::new(1, 1, 3)));
    assert!(dds.parse_constraint("cast[1][2]").is_err());
}

#[test]
fn rows_are_selected_inside_the_row_range() {
    let mut dds = setup();
    dds.parse_constraint("cast[1:3]&depth>10").unwrap();
    let rows = dds.select_rows("cast", "proj").unwrap();
    assert_eq!(rows.iter().collect::<Vec<_>>(), vec![2, 3]);

    dds.parse_constraint("cast&cast.site=~\"A\"").unwrap();
    let rows = dds.select_rows("cast", "proj").unwrap();
    assert_eq!(rows.iter().collect::<Vec<_>>(), vec![0, 2, 4]);

    dds.parse_constraint("cast[0:2:4]&cast.site=~\"A\"&depth!=15").unwrap();
    let rows = dds.select_rows("cast", "proj").unwrap();
    assert_eq!(rows.iter().collect::<Vec<_>>(), vec![0, 4]);
}

#[test]
fn row_selection_needs_a_sequence() {
    let mut dds = setup();
    dds.parse_constraint("").unwrap();
    assert!(dds.select_rows("v", "proj").is_err());
    assert!(dds.select_rows("nothing", "proj").is_err());
}

#[test]
fn brackets_on_scalars_are_rejected() {
    let json = r#"{"name":"s","variables":[{"name":"x","type":"Int32","value":1}]}"#;
    let mut dds = dataset::load(json).unwrap();
    let err = dds.parse_constraint("x[0]").unwrap_err();
    assert!(err.to_string().contains("not valid for its type (Int32)"));
}

#[test]
fn row_passes_do_not_grow_the_constant_pool() {
    let mut dds = setup();
    dds.parse_constraint("cast&depth>length(v)").unwrap();
    let before = dds.constants().len();
    for _ in 0..3 {
        let rows = dds.select_rows("cast", "proj").unwrap();
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
    assert_eq!(dds.constants().len(), before);
}

#[test]
fn fields_forget_the_last_row_after_selection() {
    let mut dds = setup();
    dds.parse_constraint("cast&depth>5").unwrap();
    dds.select_rows("cast", "proj").unwrap();
    assert_eq!(dds.var("cast.depth").unwrap().value(), None);
}
