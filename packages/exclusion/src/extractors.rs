//! Identifier extraction strategies.
//!
//! One trait, four implementations, registered as a list and selected by
//! extractor type plus a `supports` capability predicate. Every extractor
//! is total over arbitrary input: malformed configs and payloads produce
//! an empty list.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::ExtractorType;

/// Extraction capability behind every strategy.
pub trait IdentifierExtractor: Send + Sync {
    /// The strategy this extractor implements.
    fn extractor_type(&self) -> ExtractorType;

    /// Capability predicate: can this extractor handle messages with the
    /// given type hint? The default accepts everything.
    fn supports(&self, _message_type: Option<&str>) -> bool {
        true
    }

    /// Extract identifiers from `content` as directed by `config`.
    fn extract(&self, content: &str, config: &str) -> Vec<String>;
}

/// The standard extractor set, in registration order.
pub fn default_extractors() -> Vec<Arc<dyn IdentifierExtractor>> {
    vec![
        Arc::new(PatternExtractor::new()),
        Arc::new(StructuredPathExtractor),
        Arc::new(DelimitedExtractor),
        Arc::new(FixedPositionExtractor),
    ]
}

// ============================================================================
// PATTERN
// ============================================================================

/// Regex extraction: `config = "<regex>|<groupIndex>"`.
///
/// Group 0 returns each whole match; a positive index returns that capture
/// group per match. Compiled patterns are cached by config string.
pub struct PatternExtractor {
    cache: RwLock<HashMap<String, Option<Regex>>>,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn compiled(&self, pattern: &str) -> Option<Regex> {
        if let Some(entry) = self.cache.read().get(pattern) {
            return entry.clone();
        }
        let compiled = Regex::new(pattern).ok();
        if compiled.is_none() {
            tracing::debug!(pattern, "Invalid exclusion regex; extractor yields nothing");
        }
        let mut cache = self.cache.write();
        if cache.len() >= 256 {
            cache.clear();
        }
        cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierExtractor for PatternExtractor {
    fn extractor_type(&self) -> ExtractorType {
        ExtractorType::Pattern
    }

    fn extract(&self, content: &str, config: &str) -> Vec<String> {
        // The group index follows the last pipe; the regex itself may
        // contain pipes.
        let (pattern, group) = match config.rsplit_once('|') {
            Some((pattern, index)) => match index.trim().parse::<usize>() {
                Ok(index) => (pattern, index),
                Err(_) => return Vec::new(),
            },
            None => (config, 0),
        };

        let Some(regex) = self.compiled(pattern) else {
            return Vec::new();
        };

        regex
            .captures_iter(content)
            .filter_map(|caps| caps.get(group).map(|m| m.as_str().to_string()))
            .collect()
    }
}

// ============================================================================
// STRUCTURED_PATH
// ============================================================================

/// JSON path extraction: `config = "a.b.c"`.
///
/// Walks object keys by dotted segment. A primitive terminal value is
/// stringified; a terminal array yields each primitive element.
pub struct StructuredPathExtractor;

impl StructuredPathExtractor {
    fn primitive_to_string(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl IdentifierExtractor for StructuredPathExtractor {
    fn extractor_type(&self) -> ExtractorType {
        ExtractorType::StructuredPath
    }

    fn extract(&self, content: &str, config: &str) -> Vec<String> {
        let Ok(document) = serde_json::from_str::<serde_json::Value>(content) else {
            return Vec::new();
        };

        let mut current = &document;
        for segment in config.split('.') {
            if segment.is_empty() {
                return Vec::new();
            }
            match current.get(segment) {
                Some(next) => current = next,
                None => return Vec::new(),
            }
        }

        match current {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(Self::primitive_to_string)
                .collect(),
            other => Self::primitive_to_string(other).into_iter().collect(),
        }
    }
}

// ============================================================================
// DELIMITED
// ============================================================================

/// Segment/field extraction: `config = "<delimiter>|<segmentName>|<fieldIndex>"`.
///
/// Content splits into newline segments; a segment's first token names it.
/// An empty segment name matches every segment. `\t` means a literal tab;
/// an empty delimiter means the default `|`.
pub struct DelimitedExtractor;

impl IdentifierExtractor for DelimitedExtractor {
    fn extractor_type(&self) -> ExtractorType {
        ExtractorType::Delimited
    }

    fn extract(&self, content: &str, config: &str) -> Vec<String> {
        let parts: Vec<&str> = config.splitn(3, '|').collect();
        if parts.len() != 3 {
            return Vec::new();
        }
        let delimiter = match parts[0] {
            "" => "|",
            "\\t" | "\t" => "\t",
            other => other,
        };
        let segment_name = parts[1];
        let Ok(field_index) = parts[2].trim().parse::<usize>() else {
            return Vec::new();
        };

        let mut ids = Vec::new();
        for segment in content.lines() {
            let segment = segment.trim_end_matches('\r');
            if segment.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = segment.split(delimiter).collect();
            let name = tokens.first().copied().unwrap_or_default();
            if !segment_name.is_empty() && name != segment_name {
                continue;
            }
            if let Some(value) = tokens.get(field_index) {
                let value = value.trim();
                if !value.is_empty() {
                    ids.push(value.to_string());
                }
            }
        }
        ids
    }
}

// ============================================================================
// FIXED_POSITION
// ============================================================================

/// Substring extraction: `config = "<offset>|<length>"`, character based.
pub struct FixedPositionExtractor;

impl IdentifierExtractor for FixedPositionExtractor {
    fn extractor_type(&self) -> ExtractorType {
        ExtractorType::FixedPosition
    }

    fn extract(&self, content: &str, config: &str) -> Vec<String> {
        let Some((offset, length)) = config.split_once('|') else {
            return Vec::new();
        };
        let (Ok(offset), Ok(length)) = (offset.trim().parse::<usize>(), length.trim().parse::<usize>())
        else {
            return Vec::new();
        };
        if length == 0 {
            return Vec::new();
        }

        let chars: Vec<char> = content.chars().collect();
        let Some(end) = offset.checked_add(length) else {
            return Vec::new();
        };
        if end > chars.len() {
            return Vec::new();
        }

        let slice: String = chars[offset..end].iter().collect();
        let trimmed = slice.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    }
}
