//! Meridian-Parsers: SWIFT MT message family
//!
//! A structural (not validating) parser for MT messages, sufficient for the
//! transformations the bridge performs:
//! - MT103: Single Customer Credit Transfer
//! - MT202: General Financial Institution Transfer
//! - MT940/MT950: Customer/Statement Messages
//!
//! Messages are sequences of `{n:...}` blocks; block 4 carries the
//! `:tag:value` text fields. Blocks a transformation does not touch
//! round-trip verbatim.

pub mod swift_mt;
pub mod transform;

// Re-exports
pub use swift_mt::{SwiftField, SwiftMessage, SwiftParseError};
pub use transform::{
    transform, TransformationResult, TransformationStatus, TransformationType,
};
