//! Typed transformations over parsed MT messages.
//!
//! Each transformation is a pure function from parsed input to parsed
//! output. The function is total: parse and validation failures come back
//! as statuses, never as panics.

use serde::{Deserialize, Serialize};

use crate::swift_mt::{SwiftField, SwiftMessage, SwiftParseError};

/// Marker inserted by [`TransformationType::EnrichFields`] into block 3.
pub const ENRICHMENT_MARKER: &str = "MERIDIAN-ENRICHED";

/// Outcome classification for a transformation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationStatus {
    Success,
    PartialSuccess,
    Failed,
    ParseError,
    ValidationError,
    Timeout,
    Retry,
    DeadLetter,
}

impl TransformationStatus {
    /// Statuses that the retry service may act on.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }
}

/// The closed set of supported transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationType {
    // MT-to-MT
    Mt103ToMt202,
    Mt202ToMt103,
    Mt940ToMt950,
    // MT-to-MX (declared; structural engine does not implement them)
    Mt103ToPain001,
    Mt202ToPacs008,
    Mt940ToCamt053,
    // MX-to-MT reverses (declared)
    Pain001ToMt103,
    Pacs008ToMt202,
    Camt053ToMt940,
    // In-place
    EnrichFields,
    NormalizeFormat,
    Custom,
}

impl TransformationType {
    /// Expected input message type, where one is fixed.
    pub fn input_message_type(&self) -> Option<&'static str> {
        match self {
            Self::Mt103ToMt202 | Self::Mt103ToPain001 => Some("MT103"),
            Self::Mt202ToMt103 | Self::Mt202ToPacs008 => Some("MT202"),
            Self::Mt940ToMt950 | Self::Mt940ToCamt053 => Some("MT940"),
            _ => None,
        }
    }

    /// Output message type, where one is fixed.
    pub fn output_message_type(&self) -> Option<&'static str> {
        match self {
            Self::Mt103ToMt202 | Self::Pacs008ToMt202 => Some("MT202"),
            Self::Mt202ToMt103 | Self::Pain001ToMt103 => Some("MT103"),
            Self::Mt940ToMt950 => Some("MT950"),
            Self::Camt053ToMt940 => Some("MT940"),
            Self::Mt103ToPain001 => Some("pain.001"),
            Self::Mt202ToPacs008 => Some("pacs.008"),
            Self::Mt940ToCamt053 => Some("camt.053"),
            _ => None,
        }
    }

    /// Whether the structural engine implements this transformation.
    pub fn is_implemented(&self) -> bool {
        matches!(
            self,
            Self::Mt103ToMt202
                | Self::Mt202ToMt103
                | Self::Mt940ToMt950
                | Self::EnrichFields
                | Self::NormalizeFormat
        )
    }
}

/// Result of a transformation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationResult {
    pub status: TransformationStatus,
    pub output_message: Option<String>,
    pub output_message_type: Option<String>,
    pub error_message: Option<String>,
    pub error_stack_trace: Option<String>,
    pub warnings: Vec<String>,
    pub confidence_score: Option<f64>,
}

impl TransformationResult {
    fn success(output: String, output_type: &str, warnings: Vec<String>, confidence: f64) -> Self {
        Self {
            status: TransformationStatus::Success,
            output_message: Some(output),
            output_message_type: Some(output_type.to_string()),
            error_message: None,
            error_stack_trace: None,
            warnings,
            confidence_score: Some(confidence),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TransformationStatus::Failed,
            output_message: None,
            output_message_type: None,
            error_message: Some(message.into()),
            error_stack_trace: None,
            warnings: Vec::new(),
            confidence_score: None,
        }
    }

    fn parse_error(err: &SwiftParseError) -> Self {
        Self {
            status: TransformationStatus::ParseError,
            output_message: None,
            output_message_type: None,
            error_message: Some(err.to_string()),
            error_stack_trace: None,
            warnings: Vec::new(),
            confidence_score: None,
        }
    }

    fn validation_error(message: impl Into<String>) -> Self {
        Self {
            status: TransformationStatus::ValidationError,
            output_message: None,
            output_message_type: None,
            error_message: Some(message.into()),
            error_stack_trace: None,
            warnings: Vec::new(),
            confidence_score: None,
        }
    }
}

/// Apply `transformation_type` to `content`. Total: all failures surface
/// as a status, never a panic.
pub fn transform(content: &str, transformation_type: TransformationType) -> TransformationResult {
    if !transformation_type.is_implemented() {
        return TransformationResult::failed("transformation not yet implemented");
    }

    let message = match SwiftMessage::parse(content) {
        Ok(m) => m,
        Err(e) => return TransformationResult::parse_error(&e),
    };

    if let Some(expected) = transformation_type.input_message_type() {
        let expected_digits = &expected[2..];
        match message.message_type() {
            Some(actual) if actual == expected_digits => {}
            Some(actual) => {
                return TransformationResult::validation_error(format!(
                    "expected {expected} input, found MT{actual}"
                ))
            }
            None => {
                return TransformationResult::validation_error(format!(
                    "expected {expected} input, message type missing"
                ))
            }
        }
    }

    match transformation_type {
        TransformationType::Mt103ToMt202 => mt103_to_mt202(message),
        TransformationType::Mt202ToMt103 => mt202_to_mt103(message),
        TransformationType::Mt940ToMt950 => mt940_to_mt950(message),
        TransformationType::EnrichFields => enrich_fields(message),
        TransformationType::NormalizeFormat => normalize_format(message),
        // is_implemented() keeps the rest out of this arm
        _ => TransformationResult::failed("transformation not yet implemented"),
    }
}

/// Tags that must be present before a customer/institution transfer can be
/// transformed.
fn require_fields(message: &SwiftMessage, tags: &[&str]) -> Result<(), String> {
    for tag in tags {
        if message.field(tag).is_none() {
            return Err(format!("required field :{tag}: missing"));
        }
    }
    Ok(())
}

/// MT103 (customer credit transfer) to MT202 (institution transfer).
///
/// `:50K:` maps to `:52A:` (ordering institution), `:59:` to `:58A:`
/// (beneficiary institution); `:20:`, `:32A:` and `:71A:` copy through.
/// An existing `:52A:` wins over the mapped `:50K:`.
fn mt103_to_mt202(message: SwiftMessage) -> TransformationResult {
    if let Err(e) = require_fields(&message, &["20", "32A"]) {
        return TransformationResult::validation_error(e);
    }

    let mut warnings = Vec::new();
    let mut output_fields = Vec::new();

    let reference = message.field("20").map(|f| f.value.clone()).unwrap_or_default();
    output_fields.push(SwiftField::new("20", reference.clone()));

    // MT202 carries a related reference; the transaction reference stands
    // in when the input has none to relate.
    match message.field("21") {
        Some(related) => output_fields.push(SwiftField::new("21", related.value.clone())),
        None => output_fields.push(SwiftField::new("21", reference)),
    }

    if let Some(value_date) = message.field("32A") {
        output_fields.push(SwiftField::new("32A", value_date.value.clone()));
    }

    match message.field("52A") {
        Some(existing) => {
            output_fields.push(SwiftField::new("52A", existing.value.clone()));
            if message.field("50K").is_some() {
                warnings.push("input :52A: preserved; :50K: dropped".to_string());
            }
        }
        None => {
            if let Some(ordering) = message.field("50K").or_else(|| message.field("50A")) {
                output_fields.push(SwiftField::new("52A", ordering.value.clone()));
            }
        }
    }

    if let Some(beneficiary) = message.field("59").or_else(|| message.field("59A")) {
        output_fields.push(SwiftField::new("58A", beneficiary.value.clone()));
    }

    if let Some(charges) = message.field("71A") {
        output_fields.push(SwiftField::new("71A", charges.value.clone()));
    }

    let mut output = message;
    output.set_message_type("202");
    output.set_fields(output_fields);

    let confidence = if warnings.is_empty() { 1.0 } else { 0.9 };
    TransformationResult::success(output.render(), "MT202", warnings, confidence)
}

/// MT202 back to MT103. The institution-to-customer direction loses
/// party detail, so the result always carries a warning.
fn mt202_to_mt103(message: SwiftMessage) -> TransformationResult {
    if let Err(e) = require_fields(&message, &["20", "32A"]) {
        return TransformationResult::validation_error(e);
    }

    let mut output_fields = Vec::new();
    for tag in ["20", "21", "32A"] {
        if let Some(field) = message.field(tag) {
            output_fields.push(SwiftField::new(tag, field.value.clone()));
        }
    }
    if let Some(ordering) = message.field("52A") {
        output_fields.push(SwiftField::new("50K", ordering.value.clone()));
    }
    if let Some(beneficiary) = message.field("58A") {
        output_fields.push(SwiftField::new("59", beneficiary.value.clone()));
    }
    if let Some(charges) = message.field("71A") {
        output_fields.push(SwiftField::new("71A", charges.value.clone()));
    }

    let mut output = message;
    output.set_message_type("103");
    output.set_fields(output_fields);

    TransformationResult::success(
        output.render(),
        "MT103",
        vec!["institution→customer mapping is lossy".to_string()],
        0.7,
    )
}

/// MT940 statement to the MT950 subset: information-to-account-owner
/// lines (`:86:`) do not exist in MT950 and are dropped.
fn mt940_to_mt950(message: SwiftMessage) -> TransformationResult {
    if let Err(e) = require_fields(&message, &["20", "25"]) {
        return TransformationResult::validation_error(e);
    }

    let dropped = message.fields_with_tag("86").count();
    let output_fields: Vec<SwiftField> = message
        .fields()
        .iter()
        .filter(|f| f.tag != "86")
        .cloned()
        .collect();

    let mut warnings = Vec::new();
    if dropped > 0 {
        warnings.push(format!("{dropped} :86: statement line(s) dropped"));
    }

    let mut output = message;
    output.set_message_type("950");
    output.set_fields(output_fields);

    TransformationResult::success(output.render(), "MT950", warnings, 1.0)
}

/// Stamp the user header with a synthetic `{108:...}` marker.
fn enrich_fields(message: SwiftMessage) -> TransformationResult {
    let output_type = message
        .message_type()
        .map(|t| format!("MT{t}"))
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let mut output = message;
    output.set_user_header_field("108", ENRICHMENT_MARKER);

    TransformationResult::success(output.render(), &output_type, Vec::new(), 1.0)
}

/// Canonicalise whitespace and line endings in the text block. Tags and
/// their values' semantic content stay untouched; the parser already
/// normalises line endings and trailing whitespace, so a render of the
/// parsed message is the canonical form.
fn normalize_format(message: SwiftMessage) -> TransformationResult {
    let output_type = message
        .message_type()
        .map(|t| format!("MT{t}"))
        .unwrap_or_else(|| "UNKNOWN".to_string());

    TransformationResult::success(message.render(), &output_type, Vec::new(), 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MT103: &str = "{1:F01BANKBEBBAXXX0000000000}{2:I103BANKDEFFXXXXN}{4:\n:20:FT123\n:23B:CRED\n:32A:251013USD100000,00\n:50K:/1234567890\nACME\n:59:/DE89370400440532013000\nGLOBAL\n:71A:OUR\n-}";

    #[test]
    fn test_mt103_to_mt202_mapping() {
        let result = transform(MT103, TransformationType::Mt103ToMt202);
        assert_eq!(result.status, TransformationStatus::Success);
        assert_eq!(result.output_message_type.as_deref(), Some("MT202"));

        let output = result.output_message.unwrap();
        assert!(output.contains("{2:I202BANKDEFFXXXXN}"));
        assert!(output.contains(":20:FT123"));
        assert!(output.contains(":32A:251013USD100000,00"));
        assert!(output.contains(":52A:/1234567890\nACME"));
        assert!(output.contains(":58A:/DE89370400440532013000\nGLOBAL"));
        assert!(output.contains(":71A:OUR"));
        assert!(!output.contains(":50K:"));
        assert!(!output.contains(":59:"));
    }

    #[test]
    fn test_mt103_to_mt202_preserves_existing_52a() {
        let raw = "{2:I103BANKDEFFXXXXN}{4:\n:20:FT1\n:32A:251013USD1,00\n:50K:ACME\n:52A:ORDERBANK\n-}";
        let result = transform(raw, TransformationType::Mt103ToMt202);
        assert_eq!(result.status, TransformationStatus::Success);
        let output = result.output_message.unwrap();
        assert!(output.contains(":52A:ORDERBANK"));
        assert!(!output.contains("ACME"));
        assert!(result.warnings.iter().any(|w| w.contains(":50K:")));
    }

    #[test]
    fn test_mt103_missing_required_field() {
        let raw = "{2:I103BANKDEFFXXXXN}{4:\n:20:FT1\n:50K:ACME\n-}";
        let result = transform(raw, TransformationType::Mt103ToMt202);
        assert_eq!(result.status, TransformationStatus::ValidationError);
        assert!(result.error_message.unwrap().contains(":32A:"));
        assert!(result.output_message.is_none());
    }

    #[test]
    fn test_wrong_input_type_is_validation_error() {
        let result = transform(MT103, TransformationType::Mt202ToMt103);
        assert_eq!(result.status, TransformationStatus::ValidationError);
    }

    #[test]
    fn test_mt202_to_mt103_round_warns_lossy() {
        let forward = transform(MT103, TransformationType::Mt103ToMt202);
        let backward = transform(
            forward.output_message.as_deref().unwrap(),
            TransformationType::Mt202ToMt103,
        );
        assert_eq!(backward.status, TransformationStatus::Success);
        assert!(backward
            .warnings
            .iter()
            .any(|w| w.contains("lossy")));
        let output = backward.output_message.unwrap();
        assert!(output.contains(":50K:/1234567890"));
        assert!(output.contains(":59:/DE89370400440532013000"));
    }

    #[test]
    fn test_mt940_to_mt950_drops_86() {
        let raw = "{2:I940BANKDEFFXXXXN}{4:\n:20:STMT1\n:25:12345678\n:28C:1/1\n:60F:C251013USD1000,\n:61:2510131013D100,NTRF\n:86:UTILITY PAYMENT\n:62F:C251013USD900,\n-}";
        let result = transform(raw, TransformationType::Mt940ToMt950);
        assert_eq!(result.status, TransformationStatus::Success);
        let output = result.output_message.unwrap();
        assert!(output.contains("{2:I950BANKDEFFXXXXN}"));
        assert!(!output.contains(":86:"));
        assert!(output.contains(":61:"));
        assert!(result.warnings.iter().any(|w| w.contains(":86:")));
    }

    #[test]
    fn test_enrich_inserts_user_header() {
        let result = transform(MT103, TransformationType::EnrichFields);
        assert_eq!(result.status, TransformationStatus::Success);
        let output = result.output_message.unwrap();
        assert!(output.contains(&format!("{{108:{ENRICHMENT_MARKER}}}")));
        // Original text fields survive
        assert!(output.contains(":50K:/1234567890"));
    }

    #[test]
    fn test_normalize_format_canonicalises() {
        let messy = "{2:I103BANKDEFFXXXXN}{4:\r\n:20:FT1   \r\n:32A:251013USD1,00\r\n\r\n:71A:OUR\r\n-}";
        let result = transform(messy, TransformationType::NormalizeFormat);
        assert_eq!(result.status, TransformationStatus::Success);
        let output = result.output_message.unwrap();
        assert!(output.contains(":20:FT1\n"));
        assert!(!output.contains('\r'));
    }

    #[test]
    fn test_mx_targets_fail_cleanly() {
        for ttype in [
            TransformationType::Mt103ToPain001,
            TransformationType::Mt202ToPacs008,
            TransformationType::Mt940ToCamt053,
            TransformationType::Pain001ToMt103,
            TransformationType::Custom,
        ] {
            let result = transform(MT103, ttype);
            assert_eq!(result.status, TransformationStatus::Failed);
            assert_eq!(
                result.error_message.as_deref(),
                Some("transformation not yet implemented")
            );
        }
    }

    #[test]
    fn test_garbage_input_is_parse_error() {
        let result = transform("not a swift message", TransformationType::Mt103ToMt202);
        assert_eq!(result.status, TransformationStatus::ParseError);
    }

    #[test]
    fn test_type_serde_names() {
        let json = serde_json::to_string(&TransformationType::Mt103ToMt202).unwrap();
        assert_eq!(json, "\"MT103_TO_MT202\"");
        let parsed: TransformationType = serde_json::from_str("\"ENRICH_FIELDS\"").unwrap();
        assert_eq!(parsed, TransformationType::EnrichFields);

        let status = serde_json::to_string(&TransformationStatus::DeadLetter).unwrap();
        assert_eq!(status, "\"DEAD_LETTER\"");
    }
}
