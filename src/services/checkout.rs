use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    entities::{order, order_item},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{CartService, CartSnapshot},
        order_codes,
        order_status::{PaymentStatus, ShipmentStatus},
    },
};

/// How the order leaves the store. In-store pickup needs no address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentMethod {
    Standard,
    Express,
    Pickup,
}

impl FulfillmentMethod {
    pub fn requires_delivery(&self) -> bool {
        !matches!(self, FulfillmentMethod::Pickup)
    }
}

/// Validated checkout input, assembled by the handler.
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub customer_id: i64,
    pub fulfillment_method: FulfillmentMethod,
    pub address_id: Option<i64>,
    pub payment_method_id: i64,
    pub customer_notes: Option<String>,
}

/// A committed checkout: the order header plus its captured line items.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Converts a cart into an order in a single atomic unit of work: generate
/// code, insert header, insert line items, purge the cart, commit. A failure
/// anywhere rolls the whole unit back.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    carts: CartService,
    event_sender: EventSender,
    order_code_prefix: String,
    retry_attempts: u32,
    express_shipping_cents: i64,
    tax_rate_bps: u32,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: CartService,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            carts,
            event_sender,
            order_code_prefix: config.order_code_prefix.clone(),
            retry_attempts: config.order_code_retry_attempts,
            express_shipping_cents: config.express_shipping_cents,
            tax_rate_bps: config.tax_rate_bps,
        }
    }

    fn shipping_cents(&self, method: FulfillmentMethod) -> i64 {
        match method {
            FulfillmentMethod::Standard | FulfillmentMethod::Pickup => 0,
            FulfillmentMethod::Express => self.express_shipping_cents,
        }
    }

    fn tax_cents(&self, subtotal_cents: i64) -> i64 {
        subtotal_cents * i64::from(self.tax_rate_bps) / 10_000
    }

    /// Places an order for the customer's current cart. Reference validation
    /// happens before any transaction is opened; the insert itself is
    /// retried a bounded number of times when two same-day checkouts race on
    /// the next order code (unique-index conflict), then surfaced as a
    /// transient error.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<PlacedOrder, ServiceError> {
        let address_id = if input.fulfillment_method.requires_delivery() {
            let address_id = input.address_id.ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Fulfillment method '{}' requires a shipping address",
                    input.fulfillment_method
                ))
            })?;
            let address = self
                .carts
                .resolve_address(address_id, input.customer_id)
                .await?;
            Some(address.id)
        } else {
            None
        };
        let payment_method = self
            .carts
            .resolve_payment_method(input.payment_method_id)
            .await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_place(&input, address_id, payment_method.id).await {
                Ok(placed) => {
                    self.event_sender
                        .send_or_log(Event::OrderCreated {
                            order_id: placed.order.id,
                            order_code: placed.order.order_code.clone(),
                            customer_id: placed.order.customer_id,
                            total_cents: placed.order.total_cents,
                        })
                        .await;
                    return Ok(placed);
                }
                Err(err) if is_order_code_conflict(&err) => {
                    if attempt >= self.retry_attempts {
                        warn!(
                            attempts = attempt,
                            "order code conflicts exhausted retry budget"
                        );
                        return Err(ServiceError::ServiceUnavailable(
                            "Could not assign an order code, please retry".to_string(),
                        ));
                    }
                    warn!(attempt, "order code conflict, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One attempt at the atomic checkout unit. The cart snapshot is read
    /// inside the same transaction that purges it, and the purge count is
    /// checked against the snapshot before commit, so two checkouts racing
    /// on one cart cannot both convert it: the loser either observes an
    /// empty cart or aborts when its purge comes up short.
    async fn try_place(
        &self,
        input: &PlaceOrderInput,
        address_id: Option<i64>,
        payment_method_id: i64,
    ) -> Result<PlacedOrder, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let snapshot = self.carts.cart_snapshot(&txn, input.customer_id).await?;
        let code =
            order_codes::next_order_code(&txn, &self.order_code_prefix, now.date_naive()).await?;

        let subtotal = snapshot.subtotal_cents();
        let shipping = self.shipping_cents(input.fulfillment_method);
        let tax = self.tax_cents(subtotal);
        let discount = 0i64;
        let total = subtotal + shipping + tax - discount;

        let order_active = order::ActiveModel {
            order_code: Set(code.clone()),
            customer_id: Set(input.customer_id),
            address_id: Set(address_id),
            payment_method_id: Set(payment_method_id),
            fulfillment_method: Set(input.fulfillment_method.to_string()),
            subtotal_cents: Set(subtotal),
            shipping_cents: Set(shipping),
            tax_cents: Set(tax),
            discount_cents: Set(discount),
            total_cents: Set(total),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            shipment_status: Set(ShipmentStatus::Preparing.to_string()),
            customer_notes: Set(input.customer_notes.clone()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
            ..Default::default()
        };
        let order_model = order_active.insert(&txn).await?;

        let items = self
            .insert_line_items(&txn, order_model.id, &snapshot)
            .await?;

        let purged = self.carts.clear_cart(&txn, input.customer_id).await?;
        verify_cart_purged(&snapshot, purged)?;
        txn.commit().await?;

        info!(
            order_id = order_model.id,
            order_code = %order_model.order_code,
            total_cents = order_model.total_cents,
            line_items = items.len(),
            "checkout committed"
        );
        Ok(PlacedOrder {
            order: order_model,
            items,
        })
    }

    async fn insert_line_items(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        order_id: i64,
        snapshot: &CartSnapshot,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        let now = Utc::now();
        let mut items = Vec::with_capacity(snapshot.lines.len());
        for line in &snapshot.lines {
            let item = order_item::ActiveModel {
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                unit_price_cents: Set(line.unit_price_cents),
                total_cents: Set(line.total_cents()),
                created_at: Set(now),
                ..Default::default()
            };
            items.push(item.insert(txn).await?);
        }
        Ok(items)
    }
}

/// The purge must delete exactly the rows the snapshot converted. On a
/// read-committed backend a concurrent checkout can commit between our
/// snapshot read and our purge without tripping the order-code index (it may
/// land on a later sequence), so a short purge is the only remaining signal
/// that the cart was already spent. A long purge means rows were added
/// mid-checkout and would be silently dropped. Either way the transaction
/// aborts instead of committing a mismatched order.
fn verify_cart_purged(snapshot: &CartSnapshot, purged_rows: u64) -> Result<(), ServiceError> {
    if purged_rows == snapshot.lines.len() as u64 {
        return Ok(());
    }
    Err(ServiceError::Conflict(format!(
        "Cart for customer {} changed during checkout ({} lines snapshotted, {} purged), retry the request",
        snapshot.customer_id,
        snapshot.lines.len(),
        purged_rows
    )))
}

fn is_order_code_conflict(err: &ServiceError) -> bool {
    match err {
        ServiceError::DatabaseError(db_err) => {
            matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfillment_methods_parse_and_display() {
        use std::str::FromStr;
        assert_eq!(FulfillmentMethod::Standard.to_string(), "standard");
        assert_eq!(
            FulfillmentMethod::from_str("pickup").unwrap(),
            FulfillmentMethod::Pickup
        );
        assert!(FulfillmentMethod::from_str("drone").is_err());
    }

    #[test]
    fn only_pickup_skips_delivery() {
        assert!(FulfillmentMethod::Standard.requires_delivery());
        assert!(FulfillmentMethod::Express.requires_delivery());
        assert!(!FulfillmentMethod::Pickup.requires_delivery());
    }

    #[test]
    fn cart_purge_count_must_match_the_snapshot() {
        use crate::services::carts::CartLine;

        let snapshot = CartSnapshot {
            customer_id: 7,
            lines: vec![
                CartLine {
                    product_id: 1,
                    product_name: "A".into(),
                    quantity: 1,
                    unit_price_cents: 100,
                },
                CartLine {
                    product_id: 2,
                    product_name: "B".into(),
                    quantity: 3,
                    unit_price_cents: 250,
                },
            ],
        };

        assert!(verify_cart_purged(&snapshot, 2).is_ok());
        // Short purge: another checkout spent the cart first.
        assert!(matches!(
            verify_cart_purged(&snapshot, 0),
            Err(ServiceError::Conflict(_))
        ));
        // Long purge: rows were added after the snapshot was taken.
        assert!(matches!(
            verify_cart_purged(&snapshot, 3),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn conflict_detection_matches_unique_violations_only() {
        assert!(!is_order_code_conflict(&ServiceError::ValidationError(
            "x".into()
        )));
        assert!(!is_order_code_conflict(&ServiceError::DatabaseError(
            sea_orm::DbErr::Custom("boom".into())
        )));
    }
}
