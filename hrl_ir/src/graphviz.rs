//! Graphviz CFG emission
//!
//! One `digraph` per program with a nested cluster per subroutine. Each
//! vertex renders as an HTML table: the block label in the first row,
//! one instruction per following row. The entry vertex is a diamond.

use crate::dump::{format_instruction, VariableFormat};
use crate::{Program, Subroutine};
use std::fmt::Write;

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Node identifiers must be plain; subroutine names like `<global>` are
/// mangled down to alphanumerics.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn write_subroutine(out: &mut String, index: usize, subroutine: &Subroutine) {
    let id = sanitize(subroutine.name());
    writeln!(out, "    subgraph cluster_{} {{", index).expect("writing to a string");
    writeln!(out, "        label=\"{}\";", escape_html(subroutine.name()))
        .expect("writing to a string");
    writeln!(out, "        fontname=\"Courier\";").expect("writing to a string");

    let entry = subroutine.entry_vertex().unwrap_or(0);
    for (vertex, block) in subroutine.blocks.iter().enumerate() {
        let shape = if vertex == entry { "diamond" } else { "rect" };
        let mut rows = format!(
            "<TR><TD ALIGN='LEFT'><B>{}:</B></TD></TR>",
            escape_html(block.label())
        );
        for instruction in &block.instructions {
            let text = format_instruction(instruction, VariableFormat::Virtual);
            write!(
                rows,
                "<TR><TD ALIGN='LEFT'>{}</TD></TR>",
                escape_html(text.trim_end())
            )
            .expect("writing to a string");
        }
        writeln!(
            out,
            "        {}_{} [shape={}, fontname=\"Courier\", label=<<TABLE BORDER='0' CELLBORDER='0'>{}</TABLE>>];",
            id, vertex, shape, rows
        )
        .expect("writing to a string");
    }

    if let Some(cfg) = &subroutine.cfg {
        for vertex in 0..cfg.graph.vertex_count() {
            for &succ in cfg.graph.successors(vertex) {
                writeln!(out, "        {}_{} -> {}_{};", id, vertex, id, succ)
                    .expect("writing to a string");
            }
        }
    }

    writeln!(out, "    }}").expect("writing to a string");
}

/// Render the whole program as one Graphviz document.
pub fn generate_graphviz(program: &Program) -> String {
    let mut out = String::from("digraph program {\n");
    for (index, subroutine) in program.subroutines.iter().enumerate() {
        write_subroutine(&mut out, index, subroutine);
    }
    out.push_str("}\n");
    out
}
