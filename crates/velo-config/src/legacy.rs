//! Legacy flat-dialect front-end
//!
//! Older projects describe builds in an INI-like dialect:
//!
//! ```text
//! [project]
//! name = "demo"
//!
//! [target.app]
//! type = "binary"
//! sources = ["src/*.velo"]
//! ```
//!
//! The front-end converts that dialect into the same arena-backed document
//! the braced grammar produces, so extraction and interpolation run on one
//! representation. `[project]` populates project metadata, `[variables]`
//! populates the global scope, `[target.NAME]` opens a target named NAME.

use crate::ast::{Arena, Node, NodeId, StringValue};
use crate::diagnostic::Diagnostic;
use crate::parser::Document;

/// Whether source text is written in the legacy flat dialect
pub fn looks_like_legacy(source: &str) -> bool {
    for line in source.lines() {
        let line = line.trim_start();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with(';')
            || line.starts_with("//")
        {
            continue;
        }
        return line.starts_with('[');
    }
    false
}

enum Section {
    None,
    Project,
    Variables,
    Target(usize),
}

/// Parse legacy flat-dialect text into a document
pub fn parse_legacy(source: &str, file: &str) -> (Document, Vec<Diagnostic>) {
    let mut arena = Arena::new();
    let mut diagnostics = Vec::new();

    let mut project: Vec<(String, NodeId)> = Vec::new();
    let mut variables: Vec<(String, NodeId)> = Vec::new();
    let mut targets: Vec<Vec<(String, NodeId)>> = Vec::new();
    let mut section = Section::None;

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = (index + 1) as u32;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let Some(end) = rest.find(']') else {
                diagnostics.push(Diagnostic::error(
                    "invalid section header (missing ']')",
                    file,
                    line_no,
                    1,
                ));
                continue;
            };
            let header = &rest[..end];
            section = match header {
                "project" => Section::Project,
                "variables" => Section::Variables,
                _ => match header.strip_prefix("target.") {
                    Some(name) if !name.is_empty() => {
                        let name_node = arena.alloc(
                            Node::Str(StringValue::Literal(name.to_string())),
                            line_no,
                            1,
                        );
                        targets.push(vec![("name".to_string(), name_node)]);
                        Section::Target(targets.len() - 1)
                    }
                    _ => {
                        diagnostics.push(Diagnostic::warning(
                            format!("ignoring unknown section '[{header}]'"),
                            file,
                            line_no,
                            1,
                        ));
                        Section::None
                    }
                },
            };
            continue;
        }

        let Some(eq) = line.find('=') else {
            diagnostics.push(Diagnostic::error(
                "expected 'key = value'",
                file,
                line_no,
                1,
            ));
            continue;
        };

        let key = line[..eq].trim().to_string();
        let value_text = line[eq + 1..].trim();
        if key.is_empty() {
            diagnostics.push(Diagnostic::error("missing key before '='", file, line_no, 1));
            continue;
        }

        let value = parse_value(&mut arena, value_text, line_no);
        match section {
            Section::Project => project.push((key, value)),
            Section::Variables => variables.push((key, value)),
            Section::Target(index) => targets[index].push((key, value)),
            Section::None => {
                diagnostics.push(Diagnostic::warning(
                    format!("ignoring '{key}' outside any section"),
                    file,
                    line_no,
                    1,
                ));
            }
        }
    }

    let project_node = arena.alloc(Node::Object(project), 1, 1);
    let variables_node = arena.alloc(Node::Object(variables), 1, 1);
    let target_nodes: Vec<NodeId> = targets
        .into_iter()
        .map(|members| arena.alloc(Node::Object(members), 1, 1))
        .collect();
    let targets_node = arena.alloc(Node::Array(target_nodes), 1, 1);
    let root = arena.alloc(
        Node::Object(vec![
            ("project".to_string(), project_node),
            ("variables".to_string(), variables_node),
            ("targets".to_string(), targets_node),
        ]),
        1,
        1,
    );

    (
        Document {
            arena,
            root: Some(root),
        },
        diagnostics,
    )
}

/// Parse a flat-dialect value: quoted string, array of quoted strings,
/// boolean, integer, or bare word
fn parse_value(arena: &mut Arena, text: &str, line: u32) -> NodeId {
    if text.starts_with('[') && text.ends_with(']') {
        let inner = &text[1..text.len() - 1];
        let elements: Vec<NodeId> = quoted_items(inner)
            .into_iter()
            .map(|item| arena.alloc(Node::Str(StringValue::Literal(item)), line, 1))
            .collect();
        return arena.alloc(Node::Array(elements), line, 1);
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        let inner = text[1..text.len() - 1].to_string();
        return arena.alloc(Node::Str(StringValue::Literal(inner)), line, 1);
    }

    match text {
        "true" => arena.alloc(Node::Bool(true), line, 1),
        "false" => arena.alloc(Node::Bool(false), line, 1),
        _ => {
            if let Ok(number) = text.parse::<i64>() {
                arena.alloc(Node::Int(number), line, 1)
            } else {
                arena.alloc(Node::Str(StringValue::Literal(text.to_string())), line, 1)
            }
        }
    }
}

/// Extract the contents of double-quoted items from a comma-separated list
fn quoted_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('"') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('"') else {
            break;
        };
        items.push(after[..close].to_string());
        rest = &after[close + 1..];
    }
    items
}
