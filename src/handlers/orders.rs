use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ServiceError,
    services::{
        order_status::{PaymentStatus, ShipmentStatus, StatusChange, TransitionSource},
        orders::{OrderDetails, OrderItemResponse, OrderResponse},
    },
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

// GET /api/v1/orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number"),
        ("limit" = Option<u64>, Query, description = "Page size"),
        ("customer_id" = Option<i64>, Query, description = "Restrict to one customer")
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderResponse>>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderResponse>> {
    let limit = query.limit.clamp(1, 100);
    let (items, total) = state
        .services
        .orders
        .list_orders(query.customer_id, query.page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit,
        total_pages: total.div_ceil(limit),
    })))
}

// GET /api/v1/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<OrderDetails> {
    let details = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

// GET /api/v1/orders/by-code/:code
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-code/{code}",
    params(("code" = String, Path, description = "Order code")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<OrderDetails> {
    let details = state.services.orders.get_order_by_code(&code).await?;
    Ok(Json(ApiResponse::success(details)))
}

// GET /api/v1/orders/:id/items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/items",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Line items retrieved", body = ApiResponse<Vec<OrderItemResponse>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_items(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<OrderItemResponse>> {
    let items = state.services.orders.get_order_items(id).await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Statuses arrive as strings so that an unknown member maps to a 400 with
/// the offending value, not a generic body-rejection.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub payment_status: Option<String>,
    pub shipment_status: Option<String>,
    #[validate(length(max = 100))]
    pub carrier: Option<String>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    #[validate(length(max = 2000))]
    pub internal_notes: Option<String>,
}

impl UpdateOrderStatusRequest {
    fn into_change(self) -> Result<StatusChange, ServiceError> {
        let payment_status = self
            .payment_status
            .map(|raw| {
                PaymentStatus::from_str(&raw).map_err(|_| {
                    ServiceError::InvalidStatus(format!("Unknown payment status: {raw}"))
                })
            })
            .transpose()?;
        let shipment_status = self
            .shipment_status
            .map(|raw| {
                ShipmentStatus::from_str(&raw).map_err(|_| {
                    ServiceError::InvalidStatus(format!("Unknown shipment status: {raw}"))
                })
            })
            .transpose()?;
        Ok(StatusChange {
            payment_status,
            shipment_status,
            carrier: self.carrier,
            tracking_number: self.tracking_number,
            internal_notes: self.internal_notes,
        })
    }
}

// PATCH /api/v1/orders/:id/status
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    params(("id" = i64, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status or illegal transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Lost a concurrent update race", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    request.validate()?;
    let change = request.into_change()?;

    let updated = state
        .services
        .order_status
        .apply_transition(id, change, TransitionSource::Admin)
        .await?;
    Ok(Json(ApiResponse::success(OrderResponse::from(updated))))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[validate(range(min = 1))]
    pub customer_id: i64,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

// POST /api/v1/orders/:id/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = i64, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is past the cancellable stage", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order for this customer", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<CancelOrderRequest>,
) -> ApiResult<OrderResponse> {
    request.validate()?;

    let updated = state
        .services
        .order_status
        .cancel_by_customer(id, request.customer_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(OrderResponse::from(updated))))
}
