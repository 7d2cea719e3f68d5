use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    },
    errors::ServiceError,
};

/// Serialized order header returned by every order-reading endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: i64,
    pub order_code: String,
    pub customer_id: i64,
    pub fulfillment_method: String,
    pub address_id: Option<i64>,
    pub payment_method_id: i64,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub payment_status: String,
    pub shipment_status: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub customer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<OrderModel> for OrderResponse {
    fn from(m: OrderModel) -> Self {
        Self {
            id: m.id,
            order_code: m.order_code,
            customer_id: m.customer_id,
            fulfillment_method: m.fulfillment_method,
            address_id: m.address_id,
            payment_method_id: m.payment_method_id,
            subtotal_cents: m.subtotal_cents,
            shipping_cents: m.shipping_cents,
            tax_cents: m.tax_cents,
            discount_cents: m.discount_cents,
            total_cents: m.total_cents,
            payment_status: m.payment_status,
            shipment_status: m.shipment_status,
            carrier: m.carrier,
            tracking_number: m.tracking_number,
            customer_notes: m.customer_notes,
            created_at: m.created_at,
            updated_at: m.updated_at,
            paid_at: m.paid_at,
            shipped_at: m.shipped_at,
            delivered_at: m.delivered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(m: OrderItemModel) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            product_name: m.product_name,
            quantity: m.quantity,
            unit_price_cents: m.unit_price_cents,
            total_cents: m.total_cents,
        }
    }
}

/// An order together with its captured line items.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

/// Read-only access to placed orders.
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DatabaseConnection>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i64) -> Result<OrderDetails, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.with_items(order).await
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_code(&self, code: &str) -> Result<OrderDetails, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderCode.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", code)))?;
        self.with_items(order).await
    }

    /// Newest-first page of orders, optionally scoped to one customer.
    /// `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Option<i64>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(customer_id) = customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders.into_iter().map(OrderResponse::from).collect(), total))
    }

    #[instrument(skip(self))]
    pub async fn get_order_items(
        &self,
        order_id: i64,
    ) -> Result<Vec<OrderItemResponse>, ServiceError> {
        // 404 for a missing order, not an empty list
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(items.into_iter().map(OrderItemResponse::from).collect())
    }

    async fn with_items(&self, order: OrderModel) -> Result<OrderDetails, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(OrderDetails {
            order: OrderResponse::from(order),
            items: items.into_iter().map(OrderItemResponse::from).collect(),
        })
    }
}
