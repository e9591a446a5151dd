//! Reconciliation handlers.

use super::{get_credentials_param, require_str_param};
use crate::server::AppState;
use serde_json::Value;

pub async fn reconcile_status(state: &AppState, params: &Value) -> glossa_core::Result<Value> {
    let tenant_id = require_str_param(params, "tenant_id", "tenantId")?;
    let credentials = get_credentials_param(params)?;
    let report = state
        .api
        .status_report(&tenant_id, credentials.as_ref())
        .await?;
    Ok(serde_json::to_value(report)?)
}

pub async fn reconcile_tenant(state: &AppState, params: &Value) -> glossa_core::Result<Value> {
    let tenant_id = require_str_param(params, "tenant_id", "tenantId")?;
    let credentials = get_credentials_param(params)?;
    let result = state
        .api
        .reconcile_tenant(&tenant_id, credentials.as_ref())
        .await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn reconcile_model(state: &AppState, params: &Value) -> glossa_core::Result<Value> {
    let tenant_id = require_str_param(params, "tenant_id", "tenantId")?;
    let model_id = require_str_param(params, "model_id", "modelId")?;
    let credentials = get_credentials_param(params)?;
    let result = state
        .api
        .reconcile_model(&tenant_id, &model_id, credentials.as_ref())
        .await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn reconcile_model_until_settled(
    state: &AppState,
    params: &Value,
) -> glossa_core::Result<Value> {
    let tenant_id = require_str_param(params, "tenant_id", "tenantId")?;
    let model_id = require_str_param(params, "model_id", "modelId")?;
    let credentials = get_credentials_param(params)?;
    let result = state
        .api
        .reconcile_model_until_settled(&tenant_id, &model_id, credentials.as_ref())
        .await?;
    Ok(serde_json::to_value(result)?)
}
