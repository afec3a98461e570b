//! Resource management handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use reaper_types::{parse_ttl, ExpirableResource, ResourceKey};
use serde::{Deserialize, Serialize};

/// List resources query params
#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    pub namespace: Option<String>,
}

/// List resources
pub async fn list_resources(
    State(state): State<AppState>,
    Query(query): Query<ListResourcesQuery>,
) -> ApiResult<Json<Vec<ExpirableResource>>> {
    let mut resources = state.storage.list_resources().await?;
    if let Some(namespace) = query.namespace {
        resources.retain(|r| r.key.namespace == namespace);
    }

    Ok(Json(resources))
}

/// Create or replace a resource
pub async fn upsert_resource(
    State(state): State<AppState>,
    Json(resource): Json<ExpirableResource>,
) -> ApiResult<Json<ExpirableResource>> {
    if resource.key.namespace.is_empty() || resource.key.name.is_empty() {
        return Err(ApiError::BadRequest(
            "resource namespace and name are required".to_string(),
        ));
    }

    state.storage.upsert_resource(resource.clone()).await?;
    tracing::info!(key = %resource.key, "Upserted resource");

    Ok(Json(resource))
}

/// Get a specific resource
pub async fn get_resource(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<ExpirableResource>> {
    let key = ResourceKey::new(namespace, name);
    let resource = state
        .storage
        .get_resource(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Resource {} not found", key)))?;

    Ok(Json(resource))
}

/// Delete resource response
#[derive(Debug, Serialize)]
pub struct DeleteResourceResponse {
    pub deleted: bool,
}

/// Delete a resource
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<DeleteResourceResponse>> {
    let key = ResourceKey::new(namespace, name);
    let deleted = state.storage.delete_resource(&key).await?;

    if deleted {
        tracing::info!(key = %key, "Deleted resource");
    }

    Ok(Json(DeleteResourceResponse { deleted }))
}

/// Set TTL request
#[derive(Debug, Deserialize)]
pub struct SetTtlRequest {
    /// New TTL; `None` removes the annotation
    pub ttl: Option<String>,
}

/// Set or clear the TTL annotation of a resource
pub async fn set_ttl(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(request): Json<SetTtlRequest>,
) -> ApiResult<Json<ExpirableResource>> {
    let key = ResourceKey::new(namespace, name);
    let mut resource = state
        .storage
        .get_resource(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Resource {} not found", key)))?;

    match request.ttl {
        Some(ttl) => {
            parse_ttl(&ttl).map_err(|e| ApiError::BadRequest(e.to_string()))?;
            resource.annotations.insert(state.ttl_annotation.clone(), ttl);
        }
        None => {
            resource.annotations.remove(&state.ttl_annotation);
        }
    }

    state.storage.upsert_resource(resource.clone()).await?;
    Ok(Json(resource))
}
