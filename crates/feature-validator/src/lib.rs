//! Feature Validation
//!
//! Decides whether an engineered feature set is fit for downstream use.
//! Data-quality problems are reported, never raised.

mod issue;
mod validator;

pub use issue::{IssueKind, ValidationIssue, ValidationReport};
pub use validator::{FeatureValidator, ValidationConfig};
