//! JSON-RPC request handlers.

mod reconcile;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use glossa_core::{GlossaError, TrainingCredentials};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> glossa_core::Result<String> {
    get_str_param(params, snake, camel)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| GlossaError::InvalidParams {
            message: format!("Missing required parameter: {}", snake),
        })
}

/// Extract optional training credentials `{url, api_key}`.
///
/// Returns `None` when absent so the server's defaults apply.
pub(crate) fn get_credentials_param(
    params: &Value,
) -> glossa_core::Result<Option<TrainingCredentials>> {
    let Some(creds) = params.get("credentials").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let url = require_str_param(creds, "url", "url").map_err(|_| GlossaError::InvalidParams {
        message: "credentials.url is required".to_string(),
    })?;
    let api_key = get_str_param(creds, "api_key", "apiKey").unwrap_or_default();
    Ok(Some(TrainingCredentials::new(url, api_key)))
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    match dispatch_method(&state, method, &params).await {
        Some(Ok(value)) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Some(Err(e)) => {
            error!("RPC error for {}: {}", method, e);
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
        None => {
            warn!("Method not found: {}", method);
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(
                    id,
                    -32601,
                    format!("Method not found: {}", method),
                )),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call. Returns `None` for unknown methods.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> Option<glossa_core::Result<Value>> {
    let result = match method {
        "reconcile_status" => reconcile::reconcile_status(state, params).await,
        "reconcile_tenant" => reconcile::reconcile_tenant(state, params).await,
        "reconcile_model" => reconcile::reconcile_model(state, params).await,
        "reconcile_model_until_settled" => {
            reconcile::reconcile_model_until_settled(state, params).await
        }
        _ => return None,
    };
    Some(result)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_accept_both_cases() {
        let snake = json!({"tenant_id": "t1"});
        let camel = json!({"tenantId": "t2"});
        assert_eq!(get_str_param(&snake, "tenant_id", "tenantId"), Some("t1"));
        assert_eq!(get_str_param(&camel, "tenant_id", "tenantId"), Some("t2"));
        assert!(require_str_param(&json!({}), "tenant_id", "tenantId").is_err());
        assert!(require_str_param(&json!({"tenant_id": ""}), "tenant_id", "tenantId").is_err());
    }

    #[test]
    fn test_credentials_param() {
        assert_eq!(get_credentials_param(&json!({})).unwrap(), None);
        let creds = get_credentials_param(&json!({
            "credentials": {"url": "https://lt.example.com", "apiKey": "k"}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(creds.url, "https://lt.example.com");
        assert_eq!(creds.api_key, "k");
        assert!(get_credentials_param(&json!({"credentials": {"api_key": "k"}})).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = JsonRpcResponse::error(Some(json!(1)), -32602, "bad".into());
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["error"]["code"], -32602);
        assert!(value.get("result").is_none());
    }
}
