//! Exclusion rule model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Extraction strategy named by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractorType {
    Pattern,
    StructuredPath,
    Delimited,
    FixedPosition,
}

impl ExtractorType {
    /// Strategy name as it appears in rule payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pattern => "PATTERN",
            Self::StructuredPath => "STRUCTURED_PATH",
            Self::Delimited => "DELIMITED",
            Self::FixedPosition => "FIXED_POSITION",
        }
    }
}

/// A single exclusion rule.
///
/// `excluded_identifiers` is a comma-separated list; entries containing `*`
/// match with glob semantics, all others match exactly (case-sensitive).
/// Higher `priority` rules are evaluated first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRule {
    #[serde(default = "Uuid::new_v4")]
    pub rule_id: Uuid,
    pub name: String,
    /// Restrict the rule to one message-type hint; `None` applies to all.
    #[serde(default)]
    pub message_type: Option<String>,
    pub extractor_type: ExtractorType,
    pub extractor_config: String,
    pub excluded_identifiers: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_active() -> bool {
    true
}

impl ExclusionRule {
    /// Whether this rule applies to a message carrying `message_type`.
    pub fn applies_to(&self, message_type: Option<&str>) -> bool {
        match &self.message_type {
            None => true,
            Some(required) => message_type == Some(required.as_str()),
        }
    }
}

/// Outcome of an exclusion evaluation, for the diagnostic endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionCheck {
    pub excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_id: Option<String>,
}

impl ExclusionCheck {
    /// A negative result.
    pub fn pass() -> Self {
        Self {
            excluded: false,
            matched_rule_id: None,
            matched_id: None,
        }
    }

    /// A positive result naming the rule and identifier that fired.
    pub fn matched(rule_id: Option<Uuid>, id: impl Into<String>) -> Self {
        Self {
            excluded: true,
            matched_rule_id: rule_id,
            matched_id: Some(id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_serde_names() {
        let json = r#"{
            "name": "uetr-block",
            "extractorType": "PATTERN",
            "extractorConfig": ":121:([0-9a-f-]+)|1",
            "excludedIdentifiers": "abc,def*",
            "priority": 10
        }"#;
        let rule: ExclusionRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.extractor_type, ExtractorType::Pattern);
        assert!(rule.active);
        assert_eq!(rule.priority, 10);
        assert!(rule.message_type.is_none());

        let out = serde_json::to_value(&rule).unwrap();
        assert_eq!(out["extractorType"], "PATTERN");
        assert!(out["ruleId"].is_string());
    }

    #[test]
    fn test_applies_to() {
        let mut rule: ExclusionRule = serde_json::from_str(
            r#"{"name":"r","extractorType":"DELIMITED","extractorConfig":"|MSH|9","excludedIdentifiers":"X"}"#,
        )
        .unwrap();
        assert!(rule.applies_to(None));
        assert!(rule.applies_to(Some("HL7")));

        rule.message_type = Some("HL7".to_string());
        assert!(rule.applies_to(Some("HL7")));
        assert!(!rule.applies_to(Some("SWIFT")));
        assert!(!rule.applies_to(None));
    }
}
