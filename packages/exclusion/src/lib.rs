//! Meridian-Exclusion: rule-driven message filtering
//!
//! Messages can be held back from the broker when an identifier extracted
//! from their payload matches an exclusion rule. Extraction strategies are
//! pluggable:
//! - `PATTERN`: regex with capture-group selection (SWIFT UETR, FIX tags)
//! - `STRUCTURED_PATH`: dotted path into a JSON document
//! - `DELIMITED`: segment/field addressing (HL7, CSV, TSV)
//! - `FIXED_POSITION`: offset/length substring
//!
//! Extractors are total: malformed configuration or content yields an
//! empty identifier list, never an error.

pub mod engine;
pub mod extractors;
pub mod types;

// Re-exports
pub use engine::{EngineStatistics, ExclusionEngine};
pub use extractors::{
    default_extractors, DelimitedExtractor, FixedPositionExtractor, IdentifierExtractor,
    PatternExtractor, StructuredPathExtractor,
};
pub use types::{ExclusionCheck, ExclusionRule, ExtractorType};
