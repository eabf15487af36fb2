//! DDS declaration text and value text.

use roaring::RoaringTreemap;

use crate::datatype::Value;
use crate::variable::{Array, VarKind, Variable};

const INDENT: usize = 4;

/// `Dataset { ... } name;` for `vars`. With `constrained`, only projected
/// variables are listed and array dimensions show their constrained sizes.
pub fn declarations(name: &str, vars: &[Variable], constrained: bool) -> String {
    let mut out = String::from("Dataset {\n");
    for var in vars {
        write_decl(&mut out, var, INDENT, constrained);
    }
    push_line(&mut out, 0, &format!("}} {name};"));
    out
}

fn push_line(out: &mut String, indent: usize, text: &str) {
    out.extend(std::iter::repeat_n(' ', indent));
    out.push_str(text);
    out.push('\n');
}

fn write_decl(out: &mut String, var: &Variable, indent: usize, constrained: bool) {
    if constrained && !var.send_p() {
        return;
    }
    match var.kind() {
        VarKind::Atomic { tag, .. } => push_line(out, indent, &format!("{tag} {};", var.name())),
        VarKind::Array(array) => push_line(
            out,
            indent,
            &format!("{} {}{};", array.element(), var.name(), shape(array, constrained)),
        ),
        VarKind::Structure(fields) => write_members(out, "Structure", var.name(), fields, indent, constrained),
        VarKind::Sequence(sequence) => {
            write_members(out, "Sequence", var.name(), sequence.fields(), indent, constrained)
        }
        VarKind::Grid(grid) => {
            let whole = !constrained || (grid.array_var().send_p() && grid.maps().iter().all(Variable::send_p));
            if whole {
                push_line(out, indent, "Grid {");
                push_line(out, indent + 2, "ARRAY:");
                write_decl(out, grid.array_var(), indent + INDENT, constrained);
                push_line(out, indent + 2, "MAPS:");
                for map in grid.maps() {
                    write_decl(out, map, indent + INDENT, constrained);
                }
                push_line(out, indent, &format!("}} {};", var.name()));
            } else {
                // a partially projected grid is no longer a grid
                write_members(out, "Structure", var.name(), var.children(), indent, constrained);
            }
        }
    }
}

fn write_members(out: &mut String, keyword: &str, name: &str, members: &[Variable], indent: usize, constrained: bool) {
    push_line(out, indent, &format!("{keyword} {{"));
    for member in members {
        write_decl(out, member, indent + INDENT, constrained);
    }
    push_line(out, indent, &format!("}} {name};"));
}

fn shape(array: &Array, constrained: bool) -> String {
    array
        .dims()
        .iter()
        .map(|dim| {
            let size = if constrained { dim.constrained_size() } else { dim.size() };
            match dim.name() {
                Some(name) => format!("[{name} = {size}]"),
                None => format!("[{size}]"),
            }
        })
        .collect()
}

/// Appends `decl = value;` for `var`. For a sequence, `rows` picks the rows
/// to print; without it every row in range is printed.
pub fn write_value(out: &mut String, var: &Variable, rows: Option<&RoaringTreemap>) {
    push_line(out, 0, &format!("{} = {};", heading(var), value_text(var, rows)));
}

fn heading(var: &Variable) -> String {
    match var.kind() {
        VarKind::Array(array) => format!("{} {}{}", array.element(), var.name(), shape(array, true)),
        _ => format!("{} {}", var.type_tag(), var.name()),
    }
}

/// The value of `var` alone, in brace notation for anything non-scalar.
pub fn value_text(var: &Variable, rows: Option<&RoaringTreemap>) -> String {
    match var.kind() {
        VarKind::Atomic { value, .. } => value.as_ref().map(ToString::to_string).unwrap_or_default(),
        VarKind::Array(array) => {
            let sizes: Vec<usize> = array.dims().iter().map(|d| d.constrained_size()).collect();
            nested(&array.constrained_values(), &sizes)
        }
        VarKind::Structure(fields) => braces(fields.iter().filter(|f| f.send_p()).map(|f| value_text(f, None))),
        VarKind::Grid(grid) => braces(
            std::iter::once(grid.array_var())
                .chain(grid.maps())
                .filter(|part| part.send_p())
                .map(|part| value_text(part, None)),
        ),
        VarKind::Sequence(sequence) => {
            let fields: Vec<usize> = (0..sequence.fields().len())
                .filter(|i| sequence.fields()[*i].send_p())
                .collect();
            let selected = sequence
                .rows_in_range()
                .into_iter()
                .filter(|r| rows.is_none_or(|rows| rows.contains(*r as u64)));
            braces(selected.filter_map(|r| sequence.rows().get(r)).map(|row| {
                braces(fields.iter().filter_map(|i| row.get(*i)).map(ToString::to_string))
            }))
        }
    }
}

fn braces(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    if items.is_empty() { "{}".to_string() } else { format!("{{ {} }}", items.join(", ")) }
}

fn nested(values: &[&Value], sizes: &[usize]) -> String {
    match sizes.split_first() {
        Some((_, rest)) if !rest.is_empty() => {
            let chunk = rest.iter().product::<usize>().max(1);
            braces(values.chunks(chunk).map(|c| nested(c, rest)))
        }
        _ => braces(values.iter().map(ToString::to_string)),
    }
}
