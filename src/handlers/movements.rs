use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::entities::inventory_movement::{MovementStatus, MovementType};
use crate::errors::ServiceError;
use crate::handlers::{actor_id, AppState};
use crate::services::movements::{
    CreateMovementInput, MovementDetail, MovementQuery, MovementSummary, NewMovementItem,
    UpdateMovementInput,
};

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct MovementItemRequest {
    pub product_id: Uuid,
    /// Non-zero; may be negative only on ADJUST movements
    pub quantity: i32,
    #[validate(length(min = 1, max = 16))]
    pub unit_of_measure: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMovementRequest {
    pub movement_type: MovementType,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<MovementItemRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateMovementRequest {
    pub movement_type: Option<MovementType>,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementFilters {
    pub status: Option<MovementStatus>,
    pub movement_type: Option<MovementType>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_of_measure: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementResponse {
    pub id: Uuid,
    pub movement_type: String,
    pub status: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<MovementItemResponse>,
}

impl From<MovementDetail> for MovementResponse {
    fn from(detail: MovementDetail) -> Self {
        let movement = detail.movement;
        Self {
            id: movement.id,
            movement_type: movement.movement_type,
            status: movement.status,
            reference: movement.reference,
            notes: movement.notes,
            created_by: movement.created_by,
            posted_at: movement.posted_at,
            created_at: movement.created_at,
            updated_at: movement.updated_at,
            items: detail
                .items
                .into_iter()
                .map(|entry| MovementItemResponse {
                    id: entry.item.id,
                    product_id: entry.item.product_id,
                    sku: entry.product.sku,
                    product_name: entry.product.name,
                    quantity: entry.item.quantity,
                    unit_of_measure: entry.item.unit_of_measure,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementListEntry {
    pub id: Uuid,
    pub movement_type: String,
    pub status: String,
    pub reference: Option<String>,
    pub created_by: Uuid,
    pub item_count: u64,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<MovementSummary> for MovementListEntry {
    fn from(summary: MovementSummary) -> Self {
        let movement = summary.movement;
        Self {
            id: movement.id,
            movement_type: movement.movement_type,
            status: movement.status,
            reference: movement.reference,
            created_by: movement.created_by,
            item_count: summary.item_count,
            posted_at: movement.posted_at,
            created_at: movement.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementListResponse {
    pub data: Vec<MovementListEntry>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Create the movements router
pub fn movements_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_movements).post(create_movement))
        .route(
            "/:id",
            get(get_movement)
                .put(update_movement)
                .delete(delete_movement),
        )
        .route("/:id/items", post(add_item))
        .route("/items/:item_id", delete(remove_item))
        .route("/:id/post", post(post_movement))
        .route("/:id/cancel", post(cancel_movement))
}

/// List movements with optional status/type filters
#[utoipa::path(
    get,
    path = "/api/v1/movements",
    params(MovementFilters),
    responses(
        (status = 200, description = "Movement list returned", body = MovementListResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(filters): Query<MovementFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = filters.page.unwrap_or(1).max(1);
    let limit = filters.limit.unwrap_or(10).clamp(1, 100);

    let (summaries, total) = state
        .services
        .movements
        .list(MovementQuery {
            status: filters.status,
            movement_type: filters.movement_type,
            page,
            limit,
        })
        .await?;

    let response = MovementListResponse {
        data: summaries.into_iter().map(Into::into).collect(),
        total,
        page,
        limit,
        total_pages: total.div_ceil(limit),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Create a new DRAFT movement
#[utoipa::path(
    post,
    path = "/api/v1/movements",
    request_body = CreateMovementRequest,
    responses(
        (status = 201, description = "Movement created", body = MovementResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referenced product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit of measure mismatch", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn create_movement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;
    let actor = actor_id(&headers)?;

    let detail = state
        .services
        .movements
        .create(
            CreateMovementInput {
                movement_type: payload.movement_type,
                reference: payload.reference,
                notes: payload.notes,
                items: payload
                    .items
                    .into_iter()
                    .map(|item| NewMovementItem {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        unit_of_measure: item.unit_of_measure,
                    })
                    .collect(),
            },
            actor,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(MovementResponse::from(detail))))
}

/// Fetch one movement with its items
#[utoipa::path(
    get,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement ID")),
    responses(
        (status = 200, description = "Movement returned", body = MovementResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn get_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.movements.find_by_id(id).await?;

    Ok((StatusCode::OK, Json(MovementResponse::from(detail))))
}

/// Patch header fields of a DRAFT movement
#[utoipa::path(
    put,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement ID")),
    request_body = UpdateMovementRequest,
    responses(
        (status = 200, description = "Movement updated", body = MovementResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Movement is not in DRAFT status", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn update_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let detail = state
        .services
        .movements
        .update(
            id,
            UpdateMovementInput {
                movement_type: payload.movement_type,
                reference: payload.reference,
                notes: payload.notes,
            },
        )
        .await?;

    Ok((StatusCode::OK, Json(MovementResponse::from(detail))))
}

/// Delete a DRAFT movement and its items
#[utoipa::path(
    delete,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement ID")),
    responses(
        (status = 204, description = "Movement deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Movement is not in DRAFT status", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn delete_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.movements.delete(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Attach an item to a DRAFT movement
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/items",
    params(("id" = Uuid, Path, description = "Movement ID")),
    request_body = MovementItemRequest,
    responses(
        (status = 201, description = "Item added", body = MovementResponse),
        (status = 404, description = "Movement or product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit mismatch or movement not DRAFT", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MovementItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let detail = state
        .services
        .movements
        .add_item(
            id,
            NewMovementItem {
                product_id: payload.product_id,
                quantity: payload.quantity,
                unit_of_measure: payload.unit_of_measure,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(MovementResponse::from(detail))))
}

/// Remove an item from its DRAFT movement
#[utoipa::path(
    delete,
    path = "/api/v1/movements/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Movement item ID")),
    responses(
        (status = 204, description = "Item removed"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Movement is not in DRAFT status", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.movements.remove_item(item_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Post a DRAFT movement, atomically applying its stock deltas
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/post",
    params(("id" = Uuid, Path, description = "Movement ID")),
    responses(
        (status = 200, description = "Movement posted", body = MovementResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not DRAFT, empty, or stock underflow", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn post_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.movements.post(id).await?;

    Ok((StatusCode::OK, Json(MovementResponse::from(detail))))
}

/// Cancel a DRAFT movement (no stock effect)
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/cancel",
    params(("id" = Uuid, Path, description = "Movement ID")),
    responses(
        (status = 200, description = "Movement cancelled", body = MovementResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Movement is not in DRAFT status", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn cancel_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.movements.cancel(id).await?;

    Ok((StatusCode::OK, Json(MovementResponse::from(detail))))
}
