//! Store wire models.
//!
//! PUT and search receive the namespace in the JSON body (list or string
//! form); GET and DELETE receive the slash-joined string form as a query
//! parameter. All four paths normalize through the same helper.

use serde::Deserialize;

/// Body of `PUT /store/items`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorePutRequest {
    /// String or list form; normalized at the storage boundary.
    #[serde(default)]
    pub namespace: Option<serde_json::Value>,
    pub key: String,
    pub value: serde_json::Value,
}

/// Query of `GET /store/items`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreGetQuery {
    #[serde(default)]
    pub namespace: Option<String>,
    pub key: String,
}

/// Query of `DELETE /store/items`.
pub type StoreDeleteQuery = StoreGetQuery;

/// Body of `POST /store/items/search`. The field is `namespace` (not
/// `namespace_prefix`) and is interpreted as an element-wise prefix.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSearchRequest {
    #[serde(default)]
    pub namespace: Option<serde_json::Value>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
