//! Service discovery schema.

use serde::{Deserialize, Serialize};

/// One service endpoint advertised by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Api {
    /// Service name, e.g. `metadata` or `blob`.
    pub api: String,
    /// Service version, e.g. `v1`.
    pub version: String,
    /// Base URL requests for this service are issued against.
    #[serde(rename = "baseURL")]
    pub base_url: String,
}

/// The list returned by the lookup service.
pub type Apis = Vec<Api>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from_json;

    #[test]
    fn test_parse_apis() {
        let body = r#"[
            {"api": "metadata", "version": "v1",
             "baseURL": "https://metadata.example.com/metadata/v1/catalogs/c",
             "parameters": {}},
            {"api": "blob", "version": "v1", "baseURL": "https://blob.example.com/blobstore/v1/catalogs/c"}
        ]"#;
        let apis: Apis = from_json("lookup", body.as_bytes()).unwrap();
        assert_eq!(apis.len(), 2);
        assert_eq!(apis[0].api, "metadata");
        assert!(apis[1].base_url.starts_with("https://blob."));
    }
}
