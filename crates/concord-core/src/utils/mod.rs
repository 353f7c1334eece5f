//! Small helpers shared by the pipeline stages.
//!
//! ## Canonical JSON (`canonical_json`)
//! - Compact serialization with object keys sorted at every depth
//! - Used as the consensus bucket key and quoted in disagreement diagnostics

pub mod canonical_json;

pub use canonical_json::canonical_string;
