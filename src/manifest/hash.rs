//! Component and content-identity hashes

use std::collections::BTreeMap;

use noj_canon::{canonicalize, prefixed_digest, CanonError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::component::ComponentId;
use crate::meta::ProblemMeta;

/// One physical file of a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

/// `sha256:` over canonical `{id, files}` with files sorted by path
pub fn component_hash(id: ComponentId, files: &[FileRecord]) -> Result<String, CanonError> {
    let mut sorted: Vec<&FileRecord> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    let payload = json!({
        "id": id.as_str(),
        "files": sorted,
    });
    Ok(prefixed_digest(&canonicalize(&payload)?))
}

/// `core.meta` hash, over the metadata with volatile fields removed
pub fn meta_hash(meta: &ProblemMeta) -> Result<String, CanonError> {
    Ok(prefixed_digest(&canonicalize(&meta.hash_view())?))
}

/// `sha256:` over canonical `{components: [{id, hash}]}` sorted by id
pub fn problem_content_hash(hashes: &BTreeMap<ComponentId, String>) -> Result<String, CanonError> {
    let mut components: Vec<(&str, &str)> = hashes
        .iter()
        .map(|(id, hash)| (id.as_str(), hash.as_str()))
        .collect();
    components.sort_by(|a, b| a.0.cmp(b.0));
    let components: Vec<_> = components
        .into_iter()
        .map(|(id, hash)| json!({"id": id, "hash": hash}))
        .collect();
    Ok(prefixed_digest(&canonicalize(&json!({ "components": components }))?))
}
