use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Order Lifecycle API

Order placement and lifecycle management for the storefront.

## Features

- **Checkout**: Atomic cart-to-order conversion with server-side pricing
- **Order Codes**: Human-readable `PREFIX-YYYYMMDD-NNNN` codes, unique per order
- **Status Tracking**: Validated payment and shipment state machines
- **Payment Webhooks**: Signed, idempotent gateway callbacks

## Error Handling

Errors use a consistent envelope with appropriate HTTP status codes:

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Cart is empty",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100).
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart-to-order conversion"),
        (name = "Orders", description = "Order reads and status management"),
        (name = "Payments", description = "Payment gateway callbacks")
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_code,
        crate::handlers::orders::get_order_items,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::handlers::checkout::CheckoutRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::services::checkout::FulfillmentMethod,
            crate::services::order_status::PaymentStatus,
            crate::services::order_status::ShipmentStatus,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderDetails,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_core_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("/api/v1/payments/webhook"));
    }
}
