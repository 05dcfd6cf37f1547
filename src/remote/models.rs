// ABOUTME: GraphQL request/response envelopes for the changedAssets query
// ABOUTME: These are serialized to JSON for API communication

use serde::{Deserialize, Serialize};

use crate::changes::ChangeBatch;

pub const CHANGED_ASSETS_QUERY: &str = "query CHANGED_ASSETS($since: Int) {
    changedAssets(since: $since) {
        lastModified
        changes {
            assetId
            lastModified
            type
        }
    }
}";

#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest<'a, V> {
    pub query: &'a str,
    pub variables: V,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedAssetsVariables {
    // Always serialized; `null` asks for the baseline
    pub since: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedAssetsData {
    pub changed_assets: Option<ChangeBatch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeType;

    #[test]
    fn test_request_serialization() {
        let request = GraphQlRequest {
            query: CHANGED_ASSETS_QUERY,
            variables: ChangedAssetsVariables { since: None },
        };
        let parsed: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert!(parsed["query"]
            .as_str()
            .unwrap()
            .contains("changedAssets(since: $since)"));
        assert_eq!(parsed["variables"], serde_json::json!({"since": null}));

        let request = GraphQlRequest {
            query: CHANGED_ASSETS_QUERY,
            variables: ChangedAssetsVariables { since: Some(100) },
        };
        let parsed: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(parsed["variables"]["since"], 100);
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{
            "data": {
                "changedAssets": {
                    "lastModified": 100,
                    "changes": [
                        {"assetId": "a1", "lastModified": 100, "type": "ASSET_UPDATED"}
                    ]
                }
            }
        }"#;
        let response: GraphQlResponse<ChangedAssetsData> = serde_json::from_str(body).unwrap();
        assert!(response.errors.is_empty());
        let batch = response.data.unwrap().changed_assets.unwrap();
        assert_eq!(batch.last_modified, Some(100));
        assert_eq!(batch.changes[0].change_type, ChangeType::Updated);
    }

    #[test]
    fn test_error_response_deserialization() {
        let body = r#"{"data": null, "errors": [{"message": "Access denied", "path": ["changedAssets"]}]}"#;
        let response: GraphQlResponse<ChangedAssetsData> = serde_json::from_str(body).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].message, "Access denied");
    }
}
