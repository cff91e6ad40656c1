//! JSON bodies for the deploy API.

use serde::{Deserialize, Serialize};

/// Request body for `POST /deploy`.
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub url: String,
}

/// Response for a successful deployment.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub site_url: String,
}

/// Caller-facing error; details stay in the server log.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub msg: String,
}

impl ErrorResponse {
    pub fn deployment_failed() -> Self {
        Self {
            msg: "Deployment failed".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_uses_camel_case() {
        let body = serde_json::to_value(DeployResponse {
            site_url: "https://abc12345.example.com/".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "siteUrl": "https://abc12345.example.com/" }));
    }

    #[test]
    fn failure_body_is_generic() {
        let body = serde_json::to_value(ErrorResponse::deployment_failed()).unwrap();
        assert_eq!(body, serde_json::json!({ "msg": "Deployment failed" }));
    }
}
