//! Context file loading: YAML front-matter plus `##` Markdown sections.
//!
//! ```text
//! ---
//! type: project
//! tags: [erp]
//! ---
//! # Title (ignored)
//!
//! ## Tools
//! - SAP GUI
//!
//! ## Voice
//! @override
//! Plain and direct.
//! ```
//!
//! Front-matter keys become the node's settings verbatim. Each `##` heading
//! opens a section that runs until the next `##` heading; headings inside
//! fenced code blocks are ignored. Text before the first `##` heading is not
//! part of any section.
//!
//! Loading never fails: unreadable files degrade to an empty record and bad
//! front-matter to `{"type": "unknown"}`, each with a warning.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use hierarchy_context_core::models::ContextFile;

/// Settings substituted for a node whose front-matter cannot be used.
pub const UNKNOWN_TYPE: &str = "unknown";

const DELIMITER: &str = "---";

/// A context file split into its two parts.
#[derive(Debug)]
pub struct ParsedDocument<'a> {
    /// `None` when the file has no front-matter block.
    pub front_matter: Option<Result<BTreeMap<String, Value>>>,
    pub body: &'a str,
}

/// Split `text` into front-matter and body.
///
/// An opening `---` without a closing delimiter yields a front-matter error
/// and the whole text as body.
pub fn split_document(text: &str) -> ParsedDocument<'_> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some(first_line_end) = text.find('\n') else {
        return ParsedDocument {
            front_matter: None,
            body: text,
        };
    };
    if text[..first_line_end].trim_end() != DELIMITER {
        return ParsedDocument {
            front_matter: None,
            body: text,
        };
    }

    let rest = &text[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == DELIMITER || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return ParsedDocument {
                front_matter: Some(parse_front_matter(yaml)),
                body,
            };
        }
        offset += line.len();
    }

    ParsedDocument {
        front_matter: Some(Err(anyhow!("front-matter block is not terminated"))),
        body: text,
    }
}

/// Parse a YAML front-matter block into settings.
pub fn parse_front_matter(yaml: &str) -> Result<BTreeMap<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: Value = serde_yaml::from_str(yaml).context("invalid YAML front-matter")?;
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => bail!("front-matter must be a mapping, got {}", type_name(&other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Split a Markdown body into `##` sections.
///
/// Repeated headings within one file are joined with a blank line.
pub fn parse_sections(body: &str) -> BTreeMap<String, String> {
    let mut sections: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<(String, String)> = None;
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(heading) = line.strip_prefix("## ") {
                flush(&mut sections, current.take());
                current = Some((heading.trim().to_string(), String::new()));
                continue;
            }
        }

        if let Some((_, buf)) = current.as_mut() {
            buf.push_str(line);
            buf.push('\n');
        }
    }
    flush(&mut sections, current);
    sections
}

fn flush(sections: &mut BTreeMap<String, String>, section: Option<(String, String)>) {
    let Some((name, body)) = section else { return };
    if name.is_empty() {
        return;
    }
    let body = body.trim_end().to_string();
    match sections.get_mut(&name) {
        Some(existing) => {
            if !body.trim().is_empty() {
                if !existing.is_empty() {
                    existing.push_str("\n\n");
                }
                existing.push_str(&body);
            }
        }
        None => {
            sections.insert(name, body);
        }
    }
}

/// Build a [`ContextFile`] from file text, degrading bad front-matter.
pub fn parse_context(node_id: &str, source: &str, text: &str) -> ContextFile {
    let doc = split_document(text);

    let mut settings = match doc.front_matter {
        Some(Ok(settings)) => settings,
        Some(Err(e)) => {
            tracing::warn!(
                node = node_id,
                file = source,
                error = %format!("{:#}", e),
                "malformed front-matter, substituting type: unknown"
            );
            unknown_settings()
        }
        None => BTreeMap::new(),
    };

    if !settings.contains_key("type") {
        tracing::warn!(
            node = node_id,
            file = source,
            "front-matter has no `type`, substituting type: unknown"
        );
        settings.insert("type".to_string(), Value::String(UNKNOWN_TYPE.to_string()));
    }

    ContextFile {
        node_id: node_id.to_string(),
        settings,
        sections: parse_sections(doc.body),
    }
}

/// Read and parse one context file.
///
/// A read failure degrades to an empty [`ContextFile`] with a warning.
pub fn load_context_file(path: &Path, node_id: &str) -> ContextFile {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_context(node_id, &path.display().to_string(), &text),
        Err(e) => {
            tracing::warn!(
                node = node_id,
                file = %path.display(),
                error = %e,
                "failed to read context file, using empty context"
            );
            ContextFile::empty(node_id)
        }
    }
}

fn unknown_settings() -> BTreeMap<String, Value> {
    let mut settings = BTreeMap::new();
    settings.insert("type".to_string(), Value::String(UNKNOWN_TYPE.to_string()));
    settings
}
