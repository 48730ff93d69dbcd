//! SWIFT MT block and field parser.
//!
//! An MT message is a sequence of blocks `{n:<content>}` with
//! `n ∈ {1,2,3,4,5}`. Block 4 is the text block: `:tag:value` fields, one
//! tag per line with free continuation lines, terminated by `-}`. Block 3
//! (the user header) nests tagged sub-blocks such as `{108:REF}`.
//!
//! The parser preserves field order and repeated tags, and keeps the raw
//! content of every non-text block so untouched blocks render back
//! byte-for-byte.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parse errors for MT messages.
#[derive(Debug, Clone, Error)]
pub enum SwiftParseError {
    #[error("Empty message")]
    EmptyMessage,

    #[error("No blocks found in message")]
    NoBlocks,

    #[error("Unterminated block {0}")]
    UnterminatedBlock(char),

    #[error("Invalid block identifier '{0}'")]
    InvalidBlockId(char),
}

/// A `:tag:value` field from the text block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwiftField {
    /// Field tag (e.g., "20", "32A", "50K")
    pub tag: String,
    /// Field value; multiline values keep their line breaks
    pub value: String,
}

impl SwiftField {
    /// Create a field.
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// One block of an MT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwiftBlock {
    /// Blocks 1, 2, 3 and 5: raw content, rendered back verbatim.
    Raw { id: char, content: String },
    /// Block 4: the ordered text fields.
    Text { fields: Vec<SwiftField> },
}

impl SwiftBlock {
    /// Block identifier ('1'..'5').
    pub fn id(&self) -> char {
        match self {
            Self::Raw { id, .. } => *id,
            Self::Text { .. } => '4',
        }
    }
}

/// A parsed MT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwiftMessage {
    blocks: Vec<SwiftBlock>,
}

impl SwiftMessage {
    /// Parse a raw MT message into blocks.
    pub fn parse(raw: &str) -> Result<Self, SwiftParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SwiftParseError::EmptyMessage);
        }

        let mut blocks = Vec::new();
        let bytes: Vec<char> = trimmed.chars().collect();
        let mut pos = 0;

        while pos < bytes.len() {
            // Skip anything between blocks (line endings from transport)
            if bytes[pos] != '{' {
                pos += 1;
                continue;
            }
            if pos + 2 >= bytes.len() || bytes[pos + 2] != ':' {
                pos += 1;
                continue;
            }

            let id = bytes[pos + 1];
            if !('1'..='5').contains(&id) {
                return Err(SwiftParseError::InvalidBlockId(id));
            }

            let content_start = pos + 3;
            let end = if id == '4' {
                find_text_block_end(&bytes, content_start)
            } else {
                find_nested_block_end(&bytes, content_start)
            }
            .ok_or(SwiftParseError::UnterminatedBlock(id))?;

            let content: String = bytes[content_start..end].iter().collect();
            if id == '4' {
                blocks.push(SwiftBlock::Text {
                    fields: parse_text_fields(&content),
                });
                // Skip past "-}" terminator
                pos = end + 2;
            } else {
                blocks.push(SwiftBlock::Raw { id, content });
                pos = end + 1;
            }
        }

        if blocks.is_empty() {
            return Err(SwiftParseError::NoBlocks);
        }
        Ok(Self { blocks })
    }

    /// Three-digit message type from block 2 (e.g. "103"), if present.
    pub fn message_type(&self) -> Option<String> {
        let content = self.block('2')?;
        // {2:I103RECEIVERBIC...} or {2:O103...}
        let chars: Vec<char> = content.chars().collect();
        if chars.len() >= 4
            && (chars[0] == 'I' || chars[0] == 'O')
            && chars[1..4].iter().all(|c| c.is_ascii_digit())
        {
            return Some(chars[1..4].iter().collect());
        }
        // Some gateways deliver a bare numeric header
        if chars.len() >= 3 && chars[..3].iter().all(|c| c.is_ascii_digit()) {
            return Some(chars[..3].iter().collect());
        }
        None
    }

    /// Raw content of a non-text block.
    pub fn block(&self, id: char) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            SwiftBlock::Raw {
                id: block_id,
                content,
            } if *block_id == id => Some(content.as_str()),
            _ => None,
        })
    }

    /// All text-block fields, in message order.
    pub fn fields(&self) -> &[SwiftField] {
        self.blocks
            .iter()
            .find_map(|b| match b {
                SwiftBlock::Text { fields } => Some(fields.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// First field with the given tag.
    pub fn field(&self, tag: &str) -> Option<&SwiftField> {
        self.fields().iter().find(|f| f.tag == tag)
    }

    /// Every field with the given tag, preserving order.
    pub fn fields_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a SwiftField> {
        self.fields().iter().filter(move |f| f.tag == tag)
    }

    /// Replace the whole text block with `fields`.
    pub fn set_fields(&mut self, fields: Vec<SwiftField>) {
        for block in &mut self.blocks {
            if let SwiftBlock::Text { fields: existing } = block {
                *existing = fields;
                return;
            }
        }
        self.blocks.push(SwiftBlock::Text { fields });
    }

    /// Rewrite the message-type digits in block 2 (e.g. "103" -> "202").
    pub fn set_message_type(&mut self, new_type: &str) {
        for block in &mut self.blocks {
            if let SwiftBlock::Raw { id: '2', content } = block {
                let chars: Vec<char> = content.chars().collect();
                if chars.len() >= 4
                    && (chars[0] == 'I' || chars[0] == 'O')
                    && chars[1..4].iter().all(|c| c.is_ascii_digit())
                {
                    let mut rebuilt = String::new();
                    rebuilt.push(chars[0]);
                    rebuilt.push_str(new_type);
                    rebuilt.extend(&chars[4..]);
                    *content = rebuilt;
                } else if chars.len() >= 3 && chars[..3].iter().all(|c| c.is_ascii_digit()) {
                    let mut rebuilt = String::from(new_type);
                    rebuilt.extend(&chars[3..]);
                    *content = rebuilt;
                }
                return;
            }
        }
    }

    /// Insert or replace a tagged sub-block in the user header (block 3),
    /// creating the block when the message has none.
    pub fn set_user_header_field(&mut self, tag: &str, value: &str) {
        let entry = format!("{{{tag}:{value}}}");
        for block in &mut self.blocks {
            if let SwiftBlock::Raw { id: '3', content } = block {
                let open = format!("{{{tag}:");
                if let Some(start) = content.find(&open) {
                    if let Some(rel_end) = content[start..].find('}') {
                        content.replace_range(start..start + rel_end + 1, &entry);
                        return;
                    }
                }
                content.push_str(&entry);
                return;
            }
        }
        // No block 3: insert one after block 2 (or block 1), before the text
        let insert_at = self
            .blocks
            .iter()
            .position(|b| b.id() >= '4')
            .unwrap_or(self.blocks.len());
        self.blocks.insert(
            insert_at,
            SwiftBlock::Raw {
                id: '3',
                content: entry,
            },
        );
    }

    /// Reassemble the message. Raw blocks render verbatim; the text block
    /// renders one field per line between `{4:` and `-}`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                SwiftBlock::Raw { id, content } => {
                    out.push('{');
                    out.push(*id);
                    out.push(':');
                    out.push_str(content);
                    out.push('}');
                }
                SwiftBlock::Text { fields } => {
                    out.push_str("{4:\n");
                    for field in fields {
                        out.push(':');
                        out.push_str(&field.tag);
                        out.push(':');
                        out.push_str(&field.value);
                        out.push('\n');
                    }
                    out.push_str("-}");
                }
            }
        }
        out
    }
}

/// Find the end of a nested `{...}` block, starting after `{n:`.
fn find_nested_block_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in chars[start..].iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Some(start + offset);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Find the `-}` terminator of the text block.
fn find_text_block_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 1 < chars.len() {
        if chars[i] == '-' && chars[i + 1] == '}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Parse `:tag:value` fields with continuation lines.
fn parse_text_fields(content: &str) -> Vec<SwiftField> {
    let mut fields: Vec<SwiftField> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if let Some((tag, value)) = split_field_line(line) {
            fields.push(SwiftField::new(tag, value));
        } else if let Some(last) = fields.last_mut() {
            // Continuation of a multiline value
            last.value.push('\n');
            last.value.push_str(line.trim_end());
        }
        // Leading garbage before the first tag is dropped
    }

    for field in &mut fields {
        field.value = field.value.trim_end().to_string();
    }
    fields
}

/// Split `:20:REF123` into ("20", "REF123"). Tags are 2 digits plus an
/// optional letter option.
fn split_field_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(':')?;
    let colon = rest.find(':')?;
    let tag = &rest[..colon];
    if tag.is_empty() || tag.len() > 3 {
        return None;
    }
    let mut chars = tag.chars();
    let first_two_numeric = chars.next().is_some_and(|c| c.is_ascii_digit())
        && chars.next().is_some_and(|c| c.is_ascii_digit());
    if !first_two_numeric {
        return None;
    }
    if let Some(option) = tag.chars().nth(2) {
        if !option.is_ascii_alphabetic() {
            return None;
        }
    }
    Some((tag, &rest[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MT103_SAMPLE: &str = "{1:F01BANKBEBBAXXX0000000000}{2:I103BANKDEFFXXXXN}{3:{121:97ed4827-7b6f-4491-a06f-2f5f8a5c8d3f}}{4:\n:20:REF123456789\n:23B:CRED\n:32A:231215EUR1000,50\n:50K:/12345678\nJOHN DOE\n123 MAIN STREET\n:59:/98765432\nJANE DOE\n:71A:SHA\n-}";

    #[test]
    fn test_parse_blocks() {
        let msg = SwiftMessage::parse(MT103_SAMPLE).unwrap();
        assert_eq!(msg.message_type(), Some("103".to_string()));
        assert_eq!(msg.block('1'), Some("F01BANKBEBBAXXX0000000000"));
        assert_eq!(
            msg.block('3'),
            Some("{121:97ed4827-7b6f-4491-a06f-2f5f8a5c8d3f}")
        );
    }

    #[test]
    fn test_field_lookup_preserves_order() {
        let msg = SwiftMessage::parse(MT103_SAMPLE).unwrap();
        let tags: Vec<&str> = msg.fields().iter().map(|f| f.tag.as_str()).collect();
        assert_eq!(tags, vec!["20", "23B", "32A", "50K", "59", "71A"]);
        assert_eq!(msg.field("20").unwrap().value, "REF123456789");
    }

    #[test]
    fn test_multiline_field_value() {
        let msg = SwiftMessage::parse(MT103_SAMPLE).unwrap();
        let ordering = msg.field("50K").unwrap();
        assert_eq!(ordering.value, "/12345678\nJOHN DOE\n123 MAIN STREET");
    }

    #[test]
    fn test_repeated_tags() {
        let raw = "{2:I940BANKDEFFXXXXN}{4:\n:20:STMT1\n:61:2510131013D100,NTRF\n:86:FIRST\n:61:2510141014C50,NTRF\n:86:SECOND\n-}";
        let msg = SwiftMessage::parse(raw).unwrap();
        let entries: Vec<&str> = msg
            .fields_with_tag("61")
            .map(|f| f.value.as_str())
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("2510131013"));
    }

    #[test]
    fn test_render_roundtrips_raw_blocks() {
        let msg = SwiftMessage::parse(MT103_SAMPLE).unwrap();
        let rendered = msg.render();
        assert!(rendered.starts_with("{1:F01BANKBEBBAXXX0000000000}{2:I103BANKDEFFXXXXN}"));
        assert!(rendered.contains("{121:97ed4827-7b6f-4491-a06f-2f5f8a5c8d3f}"));
        // Re-parse equals original structure
        let reparsed = SwiftMessage::parse(&rendered).unwrap();
        assert_eq!(reparsed, msg);
    }

    #[test]
    fn test_set_message_type() {
        let mut msg = SwiftMessage::parse(MT103_SAMPLE).unwrap();
        msg.set_message_type("202");
        assert_eq!(msg.message_type(), Some("202".to_string()));
        assert!(msg.block('2').unwrap().starts_with("I202BANKDEFF"));
    }

    #[test]
    fn test_set_user_header_field_replaces_existing() {
        let mut msg = SwiftMessage::parse(MT103_SAMPLE).unwrap();
        msg.set_user_header_field("121", "new-uetr");
        assert_eq!(msg.block('3'), Some("{121:new-uetr}"));
    }

    #[test]
    fn test_set_user_header_field_creates_block() {
        let raw = "{1:F01BANKBEBBAXXX0000000000}{2:I103BANKDEFFXXXXN}{4:\n:20:X\n-}";
        let mut msg = SwiftMessage::parse(raw).unwrap();
        msg.set_user_header_field("108", "MARKER");
        assert_eq!(msg.block('3'), Some("{108:MARKER}"));
        // Block 3 renders before the text block
        let rendered = msg.render();
        assert!(rendered.find("{3:").unwrap() < rendered.find("{4:").unwrap());
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(matches!(
            SwiftMessage::parse(""),
            Err(SwiftParseError::EmptyMessage)
        ));
        assert!(SwiftMessage::parse("no blocks here at all").is_err());
        assert!(matches!(
            SwiftMessage::parse("{4:\n:20:X\n"),
            Err(SwiftParseError::UnterminatedBlock('4'))
        ));
    }

    #[test]
    fn test_tag_validation() {
        assert_eq!(split_field_line(":20:REF"), Some(("20", "REF")));
        assert_eq!(split_field_line(":32A:231215EUR1"), Some(("32A", "231215EUR1")));
        assert_eq!(split_field_line("plain text"), None);
        assert_eq!(split_field_line(":X:val"), None);
        assert_eq!(split_field_line("://continuation"), None);
    }
}
