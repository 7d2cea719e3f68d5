use std::str::FromStr;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ServiceError,
    services::{
        checkout::{FulfillmentMethod, PlaceOrderInput},
        orders::{OrderDetails, OrderItemResponse, OrderResponse},
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(range(min = 1))]
    pub customer_id: i64,
    /// `standard`, `express` or `pickup`
    pub fulfillment_method: String,
    /// Required unless `fulfillment_method` is `pickup`
    pub address_id: Option<i64>,
    #[validate(range(min = 1))]
    pub payment_method_id: i64,
    #[validate(length(max = 2000))]
    pub customer_notes: Option<String>,
}

// POST /api/v1/checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderDetails>),
        (status = 400, description = "Empty cart or invalid references", body = crate::errors::ErrorResponse),
        (status = 503, description = "Order code contention, retry later", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetails>>), ServiceError> {
    request.validate()?;
    let fulfillment_method =
        FulfillmentMethod::from_str(&request.fulfillment_method).map_err(|_| {
            ServiceError::ValidationError(format!(
                "Unknown fulfillment method: {}",
                request.fulfillment_method
            ))
        })?;

    let placed = state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: request.customer_id,
            fulfillment_method,
            address_id: request.address_id,
            payment_method_id: request.payment_method_id,
            customer_notes: request.customer_notes,
        })
        .await?;

    let details = OrderDetails {
        order: OrderResponse::from(placed.order),
        items: placed
            .items
            .into_iter()
            .map(OrderItemResponse::from)
            .collect(),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}
