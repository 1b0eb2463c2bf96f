//! Node file format
//!
//! ```text
//! [tag:alpha]
//! [tag:beta]
//! -----
//! <raw content, may be empty>
//! ```
//!
//! Header and delimiter are omitted when a node has no tags, unless the content
//! itself would read back as a header. Then a bare leading delimiter is written.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Separator line between the tag header and the content
pub const DELIMITER: &str = "-----";

/// A persisted node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub tags: Vec<String>,
    pub content: String,
}

impl Node {
    pub fn new(id: impl Into<String>, tags: Vec<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            tags,
            content: content.into(),
        }
    }
}

/// Tags and content as stored in one node file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeBody {
    pub tags: Vec<String>,
    pub content: String,
}

fn tag_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[tag:(.+)\]$").expect("tag line pattern is valid"))
}

/// Check that a tag survives a round trip through a header line
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::InvalidTag("tag must not be empty".to_string()));
    }
    if tag.contains('\n') || tag.contains('\r') {
        return Err(Error::InvalidTag(format!(
            "tag '{}' must not contain line breaks",
            tag.escape_debug()
        )));
    }
    Ok(())
}

/// Serialize tags and content into file text.
///
/// Tags keep their input order. With no tags the content is returned verbatim,
/// or behind an empty header if it contains a delimiter line.
pub fn encode(tags: &[String], content: &str) -> Result<String> {
    if tags.is_empty() {
        if split_header(content).is_none() {
            return Ok(content.to_string());
        }
        return Ok(format!("{}\n{}", DELIMITER, content));
    }

    let mut out = String::with_capacity(content.len() + tags.len() * 16 + DELIMITER.len() + 1);
    for tag in tags {
        validate_tag(tag)?;
        out.push_str("[tag:");
        out.push_str(tag);
        out.push_str("]\n");
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(content);
    Ok(out)
}

/// Parse file text into tags and content.
///
/// The first line that is exactly `-----` ends the header. Header lines that are
/// not `[tag:<name>]` are dropped. Without a delimiter the whole text is content.
pub fn decode(raw: &str) -> NodeBody {
    let Some((header, content)) = split_header(raw) else {
        return NodeBody {
            tags: Vec::new(),
            content: raw.to_string(),
        };
    };

    let tags = header
        .lines()
        .filter_map(|line| tag_line_pattern().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    NodeBody {
        tags,
        content: content.to_string(),
    }
}

fn split_header(raw: &str) -> Option<(&str, &str)> {
    let leading = format!("{}\n", DELIMITER);
    if let Some(rest) = raw.strip_prefix(leading.as_str()) {
        return Some(("", rest));
    }

    let inner = format!("\n{}\n", DELIMITER);
    raw.find(inner.as_str())
        .map(|pos| (&raw[..pos], &raw[pos + inner.len()..]))
}
