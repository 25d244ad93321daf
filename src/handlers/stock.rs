use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::stock_batch::{self, Entity as StockBatch};
use crate::errors::ServiceError;
use crate::{ApiResponse, AppState, PagedMeta};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StockFilters {
    pub location_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    /// Include batches with zero quantity-on-hand.
    #[serde(default)]
    pub include_empty: bool,
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stock))
        .route("/:id", get(get_batch))
}

/// List stock batches, expiry ascending, scoped to the caller's locations.
pub async fn list_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<StockFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(location_id) = filters.location_id {
        if !user.can_access_location(location_id) {
            return Err(ServiceError::Forbidden(format!(
                "No access to location {}",
                location_id
            )));
        }
    } else if !user.has_role("admin") && user.accessible_locations().is_empty() {
        return Ok(Json(ApiResponse::paged(
            Vec::<stock_batch::Model>::new(),
            PagedMeta {
                page: filters.page,
                limit: filters.limit,
                total: 0,
            },
        )));
    }

    let mut query = StockBatch::find();
    if let Some(location_id) = filters.location_id {
        query = query.filter(stock_batch::Column::LocationId.eq(location_id));
    } else if !user.has_role("admin") {
        query = query
            .filter(stock_batch::Column::LocationId.is_in(user.accessible_locations().to_vec()));
    }
    if let Some(product_id) = filters.product_id {
        query = query.filter(stock_batch::Column::ProductId.eq(product_id));
    }
    if !filters.include_empty {
        query = query.filter(stock_batch::Column::QuantityOnHand.gt(0));
    }

    let limit = filters.limit.clamp(1, 200);
    let page = filters.page.max(1);
    let paginator = query
        .order_by_asc(stock_batch::Column::ExpiryDate)
        .order_by_asc(stock_batch::Column::CreatedAt)
        .paginate(state.db.as_ref(), limit);

    let total = paginator
        .num_items()
        .await
        .map_err(ServiceError::db_error)?;
    let items = paginator
        .fetch_page(page - 1)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(Json(ApiResponse::paged(
        items,
        PagedMeta {
            page,
            limit,
            total,
        },
    )))
}

/// Fetch a single batch by id.
pub async fn get_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let batch = StockBatch::find_by_id(id)
        .one(state.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", id)))?;

    if !user.can_access_location(batch.location_id) {
        return Err(ServiceError::Forbidden(format!(
            "No access to location {}",
            batch.location_id
        )));
    }

    Ok(Json(ApiResponse::success(batch)))
}
