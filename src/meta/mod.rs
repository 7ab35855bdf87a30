//! Problem metadata: schema and the transformations applied around
//! export and import.

mod schema;
mod transform;

pub use schema::{
    AiChecker, ExecutionMode, Pipeline, ProblemConfig, ProblemMeta, ScoringScript,
    ScoringScriptConfig, TestCaseInfo, REQUIRED_FIELDS,
};
pub use transform::{DERIVED_ASSET_KEYS, HASH_EXCLUDED_FIELDS, REDACTED_PATHS};
