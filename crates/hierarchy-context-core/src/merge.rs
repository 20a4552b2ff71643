//! Merge engine: folds a root-first [`Chain`] into one [`EffectiveContext`].
//!
//! The merge is a pure left fold. Each [`ContextFile`] is applied on top of
//! the accumulated state in chain order, so later (deeper) nodes override or
//! extend what their ancestors contributed.
//!
//! # Settings
//!
//! | Node value | Effect |
//! |------------|--------|
//! | `{"@additive": [...]}` | Concatenated onto the accumulated list |
//! | anything else | Replaces the accumulated value (last wins) |
//! | key absent | Accumulated value inherited untouched |
//!
//! # Sections
//!
//! A section body whose first non-blank line is exactly `@override` discards
//! everything ancestors contributed to that section. Any other body is
//! appended after a blank line and its node recorded in `sources`.
//!
//! # Inheritance directives
//!
//! A node's front-matter `inherit` block adjusts how it inherits:
//!
//! ```yaml
//! inherit:
//!   mode: selective          # section (default) | selective | full
//!   exclude_sections: [Tools]
//!   override_settings: [tags]
//! ```
//!
//! `inherit` is consumed here and never appears in the effective settings.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{
    Chain, ContextFile, EffectiveContext, EffectiveSection, ADDITIVE_KEY, OVERRIDE_MARKER,
};

/// Front-matter key holding a node's inheritance directives.
pub const INHERIT_KEY: &str = "inherit";

/// How a node inherits from the chain above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InheritMode {
    /// Per-section merge; exclusion lists apply.
    #[default]
    Section,
    /// Like `Section`, and inherited sections the node does not define are
    /// dropped.
    Selective,
    /// Inherit everything; exclusion lists are ignored.
    Full,
}

/// Parsed `inherit` block of one context file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritDirectives {
    pub mode: InheritMode,
    pub exclude_sections: Vec<String>,
    pub override_settings: Vec<String>,
}

impl InheritDirectives {
    /// Read directives from a node's settings. Malformed entries are ignored
    /// with a warning.
    pub fn from_settings(node_id: &str, settings: &BTreeMap<String, Value>) -> Self {
        let Some(block) = settings.get(INHERIT_KEY) else {
            return Self::default();
        };
        let Some(block) = block.as_object() else {
            tracing::warn!(node = node_id, "ignoring non-mapping `inherit` block");
            return Self::default();
        };

        let mode = match block.get("mode").and_then(Value::as_str) {
            None | Some("section") => InheritMode::Section,
            Some("selective") => InheritMode::Selective,
            Some("full") => InheritMode::Full,
            Some(other) => {
                tracing::warn!(
                    node = node_id,
                    mode = other,
                    "unknown inherit.mode, falling back to section"
                );
                InheritMode::Section
            }
        };

        Self {
            mode,
            exclude_sections: string_list(block.get("exclude_sections")),
            override_settings: string_list(block.get("override_settings")),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Fold a chain into its effective context.
///
/// Pure: the same chain always yields a byte-identical result.
pub fn merge(chain: &Chain) -> EffectiveContext {
    chain.iter().fold(EffectiveContext::default(), apply_node)
}

/// Apply one context file on top of an accumulated context.
pub fn apply_node(mut acc: EffectiveContext, node: &ContextFile) -> EffectiveContext {
    let directives = InheritDirectives::from_settings(&node.node_id, &node.settings);

    if directives.mode != InheritMode::Full {
        for key in &directives.override_settings {
            acc.settings.remove(key);
        }
        for name in &directives.exclude_sections {
            acc.sections.remove(name);
        }
        if directives.mode == InheritMode::Selective {
            acc.sections.retain(|name, _| node.sections.contains_key(name));
        }
    }

    for (key, value) in &node.settings {
        if key == INHERIT_KEY {
            continue;
        }
        merge_setting(&mut acc.settings, key, value);
    }

    for (name, body) in &node.sections {
        merge_section(&mut acc.sections, name, body, &node.node_id);
    }

    acc
}

/// Returns the list carried by an `{"@additive": [...]}` value.
pub fn additive_items(value: &Value) -> Option<&Vec<Value>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(ADDITIVE_KEY)?.as_array()
}

fn merge_setting(settings: &mut BTreeMap<String, Value>, key: &str, value: &Value) {
    let Some(items) = additive_items(value) else {
        settings.insert(key.to_string(), value.clone());
        return;
    };

    let mut merged = match settings.remove(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(existing)) => existing,
        Some(scalar) => vec![scalar],
    };
    merged.extend(items.iter().cloned());
    settings.insert(key.to_string(), Value::Array(merged));
}

/// Splits off a leading `@override` marker line.
///
/// Returns the body without the marker when the first non-blank line is
/// exactly the marker.
pub fn strip_override_marker(body: &str) -> Option<&str> {
    let mut rest = body;
    loop {
        let (line, tail) = match rest.find('\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        let line = line.trim();
        if line.is_empty() {
            if tail.is_empty() {
                return None;
            }
            rest = tail;
            continue;
        }
        return if line == OVERRIDE_MARKER {
            Some(tail)
        } else {
            None
        };
    }
}

fn merge_section(
    sections: &mut BTreeMap<String, EffectiveSection>,
    name: &str,
    body: &str,
    node_id: &str,
) {
    if let Some(replacement) = strip_override_marker(body) {
        sections.insert(
            name.to_string(),
            EffectiveSection {
                content: trim_blank_lines(replacement).to_string(),
                sources: vec![node_id.to_string()],
                is_override: true,
            },
        );
        return;
    }

    let body = trim_blank_lines(body);
    let entry = sections.entry(name.to_string()).or_default();
    if !body.is_empty() {
        if !entry.content.is_empty() {
            entry.content.push_str("\n\n");
        }
        entry.content.push_str(body);
    }
    entry.sources.push(node_id.to_string());
}

/// Trim leading and trailing blank lines, keeping indentation of the first
/// content line.
fn trim_blank_lines(text: &str) -> &str {
    let text = text.trim_end();
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            start += line.len();
        } else {
            break;
        }
    }
    &text[start..]
}
