use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::filters::FilterConfig;
use crate::error::CrudError;
use crate::logic::Crud;
use crate::model::{ColumnType, Filters, JoinSpec, Page, QueryRequest, Record, Schema};
use crate::store::traits::RowStore;

/// Shared state of one resource's routes
pub struct ResourceState<S> {
    pub store: Arc<S>,
    pub crud: Crud,
    pub create_schema: Arc<dyn Schema>,
    pub update_schema: Arc<dyn Schema>,
    pub read_schema: Option<Arc<dyn Schema>>,
    pub joins: Option<Vec<JoinSpec>>,
    pub nest_joins: bool,
    pub filter_config: FilterConfig,
}

pub type AppState<S> = Arc<ResourceState<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(err: CrudError) -> ApiError {
    let status = match &err {
        CrudError::Config(_) | CrudError::MultipleResults(_) => StatusCode::BAD_REQUEST,
        CrudError::DataValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CrudError::NotFound(_) => StatusCode::NOT_FOUND,
        CrudError::Duplicate(_) => StatusCode::CONFLICT,
        CrudError::Storage(e) => {
            log::error!("storage failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorResponse::new(&err.to_string())))
}

#[derive(Debug, Deserialize)]
pub struct MultiQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PaginatedQuery {
    pub page: Option<i64>,
    #[serde(rename = "itemsPerPage")]
    pub items_per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse {
    pub data: Vec<Record>,
    pub total_count: u64,
    pub has_more: bool,
    pub page: i64,
    pub items_per_page: i64,
}

fn parse_key(data_type: ColumnType, name: &str, raw: &str) -> Result<Value, ApiError> {
    data_type.parse_raw(raw).ok_or_else(|| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(&format!(
                "Invalid value '{}' for '{}'",
                raw, name
            ))),
        )
    })
}

/// Primary-key filters from the path segments of a single-row route
fn key_filters(crud: &Crud, params: &HashMap<String, String>) -> Result<Filters, ApiError> {
    let entity = crud.entity();
    let mut filters = Filters::new();
    for key in entity.primary_key() {
        let column = entity.require_column(key).map_err(api_error)?;
        let raw = params.get(key).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(&format!("Missing path parameter '{}'", key))),
            )
        })?;
        filters.insert(key.clone(), parse_key(column.data_type, key, raw)?);
    }
    Ok(filters)
}

/// Validates `body` with `schema`, keeping only the fields the caller sent
fn validated_body(schema: &dyn Schema, body: Value) -> Result<Record, ApiError> {
    let Value::Object(body) = body else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new("Request body must be a JSON object")),
        ));
    };
    let validated = schema
        .validate(&body)
        .map_err(|e| api_error(e.into()))?;
    Ok(validated
        .into_iter()
        .filter(|(key, _)| body.contains_key(key))
        .collect())
}

fn read_request<S>(state: &ResourceState<S>) -> QueryRequest {
    let mut request = QueryRequest::new();
    if let Some(schema) = &state.read_schema {
        request = request.schema(Arc::clone(schema));
    }
    if let Some(joins) = &state.joins {
        request = request.joins(joins.clone());
        if state.nest_joins {
            request = request.nest();
        }
    }
    request
}

/// Filters taken from the configured query parameters, else their defaults
fn query_filters<S>(
    state: &ResourceState<S>,
    params: &HashMap<String, String>,
) -> Result<Filters, ApiError> {
    let mut filters = Filters::new();
    if state.filter_config.is_empty() {
        return Ok(filters);
    }
    let entity = state.crud.entity();
    for (key, field) in state.filter_config.keys() {
        let value = match params.get(key) {
            Some(raw) => {
                let column = entity.require_column(&field).map_err(api_error)?;
                parse_key(column.data_type, key, raw)?
            }
            None => match state.filter_config.default_for(key) {
                Some(default) if !default.is_null() => default.clone(),
                _ => continue,
            },
        };
        filters.insert(key, value);
    }
    Ok(filters)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn create_item<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Record>, ApiError> {
    let item = validated_body(state.create_schema.as_ref(), body)?;

    for column in state.crud.entity().unique_columns() {
        let Some(value) = item.get(&column.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let filters = Filters::new().with(column.name.clone(), value.clone());
        let taken = state
            .crud
            .exists(state.store.as_ref(), &filters)
            .await
            .map_err(api_error)?;
        if taken {
            return Err(api_error(CrudError::Duplicate(format!(
                "Value {} is already registered",
                display_value(value)
            ))));
        }
    }

    let created = state
        .crud
        .create(state.store.as_ref(), item)
        .await
        .map_err(api_error)?;
    Ok(Json(created))
}

pub async fn read_item<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Json<Record>, ApiError> {
    let filters = key_filters(&state.crud, &params)?;
    let request = read_request(state.as_ref()).filters(filters);

    let item = if state.joins.is_some() {
        state.crud.get_joined(state.store.as_ref(), request).await
    } else {
        state.crud.get(state.store.as_ref(), request).await
    }
    .map_err(api_error)?;

    match item {
        Some(item) => Ok(Json(item)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Item not found")),
        )),
    }
}

async fn read_page<S: RowStore + 'static>(
    state: &ResourceState<S>,
    filters: Filters,
    offset: i64,
    limit: i64,
) -> Result<Page, ApiError> {
    let request = read_request(state)
        .filters(filters)
        .offset(offset)
        .limit(limit);
    let page = if state.joins.is_some() {
        state
            .crud
            .get_multi_joined(state.store.as_ref(), request)
            .await
    } else {
        state.crud.get_multi(state.store.as_ref(), request).await
    };
    page.map_err(api_error)
}

pub async fn read_items<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<MultiQuery>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page>, ApiError> {
    let filters = query_filters(state.as_ref(), &params)?;
    let page = read_page(
        state.as_ref(),
        filters,
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(100),
    )
    .await?;
    Ok(Json(page))
}

pub async fn read_paginated<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<PaginatedQuery>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse>, ApiError> {
    let page = query.page.unwrap_or(1);
    let items_per_page = query.items_per_page.unwrap_or(10);
    if page < 1 || items_per_page < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "page must be at least 1 and itemsPerPage non-negative",
            )),
        ));
    }

    let (Some(offset), Some(end)) = (
        (page - 1).checked_mul(items_per_page),
        page.checked_mul(items_per_page),
    ) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("page and itemsPerPage are out of range")),
        ));
    };
    let filters = query_filters(state.as_ref(), &params)?;
    let result = read_page(state.as_ref(), filters, offset, items_per_page).await?;
    let has_more = (end as u64) < result.total_count;

    Ok(Json(PaginatedResponse {
        data: result.data,
        total_count: result.total_count,
        has_more,
        page,
        items_per_page,
    }))
}

pub async fn update_item<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    Path(params): Path<HashMap<String, String>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<MessageResponse>, ApiError> {
    let filters = key_filters(&state.crud, &params)?;
    let values = validated_body(state.update_schema.as_ref(), body)?;

    state
        .crud
        .update(state.store.as_ref(), values, &filters, false)
        .await
        .map_err(api_error)?;
    Ok(MessageResponse::new("Item updated successfully"))
}

pub async fn delete_item<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let filters = key_filters(&state.crud, &params)?;
    state
        .crud
        .delete(state.store.as_ref(), &filters, false)
        .await
        .map_err(api_error)?;
    Ok(MessageResponse::new("Item deleted successfully"))
}

pub async fn db_delete_item<S: RowStore + 'static>(
    State(state): State<AppState<S>>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let filters = key_filters(&state.crud, &params)?;
    state
        .crud
        .db_delete(state.store.as_ref(), &filters, false)
        .await
        .map_err(api_error)?;
    Ok(MessageResponse::new(
        "Item permanently deleted from the database",
    ))
}
