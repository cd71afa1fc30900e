// ABOUTME: Front matter parsing for presentation documents
// ABOUTME: Splits a YAML header from the slide content and converts it to JSON

use crate::errors::{DeckError, Result};
use serde_json::{Map, Value};

/// A presentation document split into its front matter and its content.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// Front matter as a JSON object (`{}` when there is none).
    pub config: Value,
    pub content: String,
}

/// Parse a document with an optional `---` delimited YAML header.
///
/// The header must start on the first line (after an optional BOM) and is
/// closed by the next line holding only `---`. Without a header the whole
/// text is the content.
pub fn parse_document(url: &str, text: &str) -> Result<ParsedDocument> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some((header, content)) = split_front_matter(text) else {
        return Ok(ParsedDocument {
            config: Value::Object(Map::new()),
            content: text.to_string(),
        });
    };

    let config: Value = serde_yaml::from_str(header).map_err(|source| DeckError::FrontMatter {
        url: url.to_string(),
        source,
    })?;
    let config = match config {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(DeckError::Configuration(format!(
                "Front matter of {} must be a mapping, found {}",
                url, other
            )))
        }
    };

    Ok(ParsedDocument {
        config,
        content: content.to_string(),
    })
}

/// Return `(header, content)` when `text` opens with a front matter block.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let first_line_end = text.find('\n').unwrap_or(text.len());
    if text[..first_line_end].trim_end() != "---" {
        return None;
    }

    let header_start = (first_line_end + 1).min(text.len());
    let mut offset = header_start;
    for line in text[header_start..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            let content_start = offset + line.len();
            return Some((&text[header_start..offset], &text[content_start..]));
        }
        offset += line.len();
    }
    None
}
