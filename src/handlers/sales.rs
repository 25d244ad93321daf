use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::sale_record::{self, Entity as SaleRecord};
use crate::errors::ServiceError;
use crate::services::sales::CreateSaleRequest;
use crate::{ApiResponse, AppState, PagedMeta};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_sale).get(list_sales))
}

/// Execute a point-of-sale deduction and write the sale ledger row.
pub async fn create_sale(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateSaleRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.sale_service.create_sale(request, &user).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaleFilters {
    pub location_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
}

/// List sales ledger rows, newest first, scoped to the caller's locations.
pub async fn list_sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<SaleFilters>,
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
            Vec::<sale_record::Model>::new(),
            PagedMeta {
                page: filters.page,
                limit: filters.limit,
                total: 0,
            },
        )));
    }

    let mut query = SaleRecord::find();
    if let Some(location_id) = filters.location_id {
        query = query.filter(sale_record::Column::LocationId.eq(location_id));
    } else if !user.has_role("admin") {
        query = query
            .filter(sale_record::Column::LocationId.is_in(user.accessible_locations().to_vec()));
    }
    if let Some(product_id) = filters.product_id {
        query = query.filter(sale_record::Column::ProductId.eq(product_id));
    }

    let limit = filters.limit.clamp(1, 200);
    let page = filters.page.max(1);
    let paginator = query
        .order_by_desc(sale_record::Column::SaleDate)
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
