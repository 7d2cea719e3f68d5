use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Payment status of an order. Terminal states: `refunded`, `failed`,
/// `cancelled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Refunded,
    Failed,
    Cancelled,
}

/// Shipment status of an order. Terminal states: `delivered`, `returned`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShipmentStatus {
    Preparing,
    Packed,
    Shipped,
    InTransit,
    Delivered,
    Returned,
}

/// Who asked for a transition. Entry points differ only in authentication
/// and idempotency handling; the adjacency rules below apply to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionSource {
    Admin,
    GatewayCallback,
    Customer,
}

/// Sole source of truth for legal payment-status transitions.
pub fn is_valid_payment_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Processing, Paid)
            | (Processing, Failed)
            | (Processing, Cancelled)
            | (Paid, Refunded)
    )
}

/// Sole source of truth for legal shipment-status transitions.
pub fn is_valid_shipment_transition(from: ShipmentStatus, to: ShipmentStatus) -> bool {
    use ShipmentStatus::*;
    matches!(
        (from, to),
        (Preparing, Packed)
            | (Preparing, Returned)
            | (Packed, Shipped)
            | (Packed, Returned)
            | (Shipped, InTransit)
            | (InTransit, Delivered)
    )
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, ServiceError> {
    PaymentStatus::from_str(raw)
        .map_err(|_| ServiceError::InvalidStatus(format!("Unknown payment status: {raw}")))
}

fn parse_shipment_status(raw: &str) -> Result<ShipmentStatus, ServiceError> {
    ShipmentStatus::from_str(raw)
        .map_err(|_| ServiceError::InvalidStatus(format!("Unknown shipment status: {raw}")))
}

/// A requested mutation of an order's lifecycle fields. Every field is
/// optional; an entirely empty change is rejected before any read.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub payment_status: Option<PaymentStatus>,
    pub shipment_status: Option<ShipmentStatus>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub internal_notes: Option<String>,
}

impl StatusChange {
    pub fn payment(status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payment_status.is_none()
            && self.shipment_status.is_none()
            && self.carrier.is_none()
            && self.tracking_number.is_none()
            && self.internal_notes.is_none()
    }
}

/// Applies validated transitions to persisted orders. Both the admin API and
/// the payment-gateway callback path go through [`Self::apply_in_txn`]; they
/// differ only in what happens before it is called.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Validates and applies a status change in its own transaction.
    #[instrument(skip(self, change), fields(order_id = order_id, source = %source))]
    pub async fn apply_transition(
        &self,
        order_id: i64,
        change: StatusChange,
        source: TransitionSource,
    ) -> Result<OrderModel, ServiceError> {
        if change.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Nothing to update: provide at least one status or tracking field".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let updated = self.apply_in_txn(&txn, &order, &change, source).await?;
        txn.commit().await?;

        self.emit_status_events(&order, &updated, source).await;
        Ok(updated)
    }

    /// Cancels an order on behalf of its owner. Allowed only while payment
    /// is still `pending` or `processing`; a paid order can only be refunded
    /// through the admin `paid -> refunded` transition.
    #[instrument(skip(self, reason), fields(order_id = order_id, customer_id = customer_id))]
    pub async fn cancel_by_customer(
        &self,
        order_id: i64,
        customer_id: i64,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let current = parse_payment_status(&order.payment_status)?;
        if !matches!(
            current,
            PaymentStatus::Pending | PaymentStatus::Processing
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} cannot be cancelled while payment status is '{}'",
                order.order_code, order.payment_status
            )));
        }

        let change = StatusChange {
            payment_status: Some(PaymentStatus::Cancelled),
            internal_notes: reason.map(|r| format!("cancelled by customer: {r}")),
            ..Default::default()
        };
        let updated = self
            .apply_in_txn(&txn, &order, &change, TransitionSource::Customer)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id: updated.id,
                customer_id,
            })
            .await;
        self.emit_status_events(&order, &updated, TransitionSource::Customer)
            .await;
        Ok(updated)
    }

    /// The shared read-validate-write sequence. Rejects before any mutation
    /// when a requested status is not a legal successor of the order's
    /// current value. The UPDATE carries a version predicate so that two
    /// near-simultaneous transitions cannot both commit against the same
    /// prior state; the loser surfaces a conflict instead of overwriting.
    pub(crate) async fn apply_in_txn(
        &self,
        txn: &DatabaseTransaction,
        order: &OrderModel,
        change: &StatusChange,
        source: TransitionSource,
    ) -> Result<OrderModel, ServiceError> {
        let now = Utc::now();

        let mut update = OrderEntity::update_many()
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Version.eq(order.version));

        if let Some(target) = change.payment_status {
            let current = parse_payment_status(&order.payment_status)?;
            if !is_valid_payment_transition(current, target) {
                return Err(ServiceError::InvalidTransition(format!(
                    "Cannot transition payment status from '{}' to '{}'",
                    current, target
                )));
            }
            update = update.col_expr(
                order::Column::PaymentStatus,
                Expr::value(target.to_string()),
            );
            if target == PaymentStatus::Paid {
                update = update.col_expr(order::Column::PaidAt, Expr::value(Some(now)));
            }
        }

        if let Some(target) = change.shipment_status {
            let current = parse_shipment_status(&order.shipment_status)?;
            if !is_valid_shipment_transition(current, target) {
                return Err(ServiceError::InvalidTransition(format!(
                    "Cannot transition shipment status from '{}' to '{}'",
                    current, target
                )));
            }
            update = update.col_expr(
                order::Column::ShipmentStatus,
                Expr::value(target.to_string()),
            );
            if target == ShipmentStatus::Shipped {
                update = update.col_expr(order::Column::ShippedAt, Expr::value(Some(now)));
            }
            if target == ShipmentStatus::Delivered {
                update = update.col_expr(order::Column::DeliveredAt, Expr::value(Some(now)));
            }
        }

        if let Some(carrier) = &change.carrier {
            update = update.col_expr(order::Column::Carrier, Expr::value(Some(carrier.clone())));
        }
        if let Some(tracking) = &change.tracking_number {
            update = update.col_expr(
                order::Column::TrackingNumber,
                Expr::value(Some(tracking.clone())),
            );
        }
        if let Some(notes) = &change.internal_notes {
            update = update.col_expr(
                order::Column::InternalNotes,
                Expr::value(Some(notes.clone())),
            );
        }

        update = update
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .col_expr(order::Column::Version, Expr::value(order.version + 1));

        let result = update.exec(txn).await?;
        if result.rows_affected == 0 {
            warn!(
                order_id = order.id,
                source = %source,
                "status update lost a version race"
            );
            return Err(ServiceError::ConcurrentModification(order.id));
        }

        let updated = OrderEntity::find_by_id(order.id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("Order {} vanished mid-update", order.id))
            })?;

        info!(
            order_id = order.id,
            order_code = %order.order_code,
            payment_status = %updated.payment_status,
            shipment_status = %updated.shipment_status,
            source = %source,
            "order status updated"
        );
        Ok(updated)
    }

    async fn emit_status_events(&self, before: &OrderModel, after: &OrderModel, source: TransitionSource) {
        if before.payment_status != after.payment_status {
            self.event_sender
                .send_or_log(Event::OrderPaymentStatusChanged {
                    order_id: after.id,
                    old_status: before.payment_status.clone(),
                    new_status: after.payment_status.clone(),
                    source: source.to_string(),
                })
                .await;
        }
        if before.shipment_status != after.shipment_status {
            self.event_sender
                .send_or_log(Event::OrderShipmentStatusChanged {
                    order_id: after.id,
                    old_status: before.shipment_status.clone(),
                    new_status: after.shipment_status.clone(),
                    source: source.to_string(),
                })
                .await;
        }
    }
}

/// Enumerates every illegal pair for property-style checks in tests.
pub fn illegal_payment_pairs() -> Vec<(PaymentStatus, PaymentStatus)> {
    PaymentStatus::iter()
        .flat_map(|from| PaymentStatus::iter().map(move |to| (from, to)))
        .filter(|(from, to)| !is_valid_payment_transition(*from, *to))
        .collect()
}
