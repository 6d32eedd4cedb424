//! Human and JSON renderings of a stack.

use anyhow::Result;
use serde_json::{Value, json};
use waypoint_types::Entry;

use crate::opts::GlobalOpts;

pub fn print_json(opts: &GlobalOpts, data: Value) -> Result<()> {
    let root = json!({ "data": data });
    if opts.pretty {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        println!("{}", serde_json::to_string(&root)?);
    }
    Ok(())
}

pub fn wants_json(opts: &GlobalOpts) -> bool {
    opts.json || opts.pretty
}

/// One line per entry, the current one marked with `>`.
pub fn print_stack(entries: &[Entry], current: usize) {
    for (index, entry) in entries.iter().enumerate() {
        let marker = if index == current { '>' } else { ' ' };
        let mut line = format!("{marker} {index:>3} {}", location(entry));
        if !entry.state.is_empty() {
            line.push_str(&format!("  {}", entry.state.0));
        }
        println!("{line}");
    }
}

fn location(entry: &Entry) -> String {
    let segments = &entry.segments;
    let mut out = format!("{}{}", segments.basename, segments.path);
    if !segments.query.is_empty() {
        let query: Vec<String> = segments.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        out.push('?');
        out.push_str(&query.join("&"));
    }
    if !segments.hash.is_empty() {
        out.push('#');
        out.push_str(&segments.hash);
    }
    out
}
