use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use strum::Display;
use tracing::{info, instrument, warn};

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel},
        payment_event,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::order_status::{OrderStatusService, PaymentStatus, StatusChange, TransitionSource},
};

/// Gateway callback envelope. Anything beyond these fields is kept only in
/// the raw payload column.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayData {
    pub order_code: String,
}

/// How a verified gateway event was resolved. Every variant except
/// `Duplicate` leaves a ledger row; all of them answer 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WebhookOutcome {
    /// Transition applied to the order.
    Applied,
    /// Order already in the target state; nothing to do.
    AlreadyApplied,
    /// Same external event id seen before; ledger untouched.
    Duplicate,
    /// The state machine refused the transition (out-of-order delivery).
    RejectedTransition,
    /// No order matches the referenced code.
    OrderNotFound,
    /// Event type this service does not act on.
    Ignored,
}

fn target_status(event_type: &str) -> Option<PaymentStatus> {
    match event_type {
        "payment_intent.succeeded" => Some(PaymentStatus::Paid),
        "payment_intent.payment_failed" => Some(PaymentStatus::Failed),
        "payment_intent.canceled" => Some(PaymentStatus::Cancelled),
        _ => None,
    }
}

/// Applies signature-verified gateway callbacks to orders, exactly once per
/// external event id. The ledger row and the order update commit in the same
/// transaction, so a crash between them cannot record an event it did not
/// apply.
#[derive(Clone)]
pub struct PaymentWebhookService {
    db: Arc<DatabaseConnection>,
    status: OrderStatusService,
    event_sender: EventSender,
}

impl PaymentWebhookService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        status: OrderStatusService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            status,
            event_sender,
        }
    }

    #[instrument(skip(self, envelope, raw_payload), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    pub async fn process(
        &self,
        envelope: GatewayEnvelope,
        raw_payload: &str,
    ) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let seen = payment_event::Entity::find()
            .filter(payment_event::Column::ExternalEventId.eq(&envelope.id))
            .one(&txn)
            .await?;
        if seen.is_some() {
            info!(event_id = %envelope.id, "redelivered gateway event, ignoring");
            return Ok(WebhookOutcome::Duplicate);
        }

        let Some(target) = target_status(&envelope.event_type) else {
            let outcome = WebhookOutcome::Ignored;
            if !self
                .record(&txn, &envelope, None, outcome, raw_payload)
                .await?
            {
                return Ok(WebhookOutcome::Duplicate);
            }
            txn.commit().await?;
            self.emit_received(&envelope, outcome).await;
            return Ok(outcome);
        };

        let order = OrderEntity::find()
            .filter(order::Column::OrderCode.eq(&envelope.data.order_code))
            .one(&txn)
            .await?;
        let Some(order) = order else {
            warn!(
                order_code = %envelope.data.order_code,
                "gateway event references unknown order"
            );
            let outcome = WebhookOutcome::OrderNotFound;
            if !self
                .record(&txn, &envelope, None, outcome, raw_payload)
                .await?
            {
                return Ok(WebhookOutcome::Duplicate);
            }
            txn.commit().await?;
            self.emit_received(&envelope, outcome).await;
            return Ok(outcome);
        };

        if PaymentStatus::from_str(&order.payment_status) == Ok(target) {
            let outcome = WebhookOutcome::AlreadyApplied;
            if !self
                .record(&txn, &envelope, Some(order.id), outcome, raw_payload)
                .await?
            {
                return Ok(WebhookOutcome::Duplicate);
            }
            txn.commit().await?;
            self.emit_received(&envelope, outcome).await;
            return Ok(outcome);
        }

        let change = StatusChange::payment(target);
        match self
            .status
            .apply_in_txn(&txn, &order, &change, TransitionSource::GatewayCallback)
            .await
        {
            Ok(updated) => {
                let outcome = WebhookOutcome::Applied;
                // Losing the race here also rolls the status update back;
                // the winning delivery owns the transition.
                if !self
                    .record(&txn, &envelope, Some(order.id), outcome, raw_payload)
                    .await?
                {
                    return Ok(WebhookOutcome::Duplicate);
                }
                txn.commit().await?;
                self.emit_applied(&order, &updated).await;
                self.emit_received(&envelope, outcome).await;
                Ok(outcome)
            }
            // Rejection happens before any write, so the transaction is
            // still clean for the ledger insert.
            Err(ServiceError::InvalidTransition(reason)) => {
                warn!(
                    order_code = %order.order_code,
                    reason = %reason,
                    "out-of-order gateway event rejected by state machine"
                );
                let outcome = WebhookOutcome::RejectedTransition;
                if !self
                    .record(&txn, &envelope, Some(order.id), outcome, raw_payload)
                    .await?
                {
                    return Ok(WebhookOutcome::Duplicate);
                }
                txn.commit().await?;
                self.emit_received(&envelope, outcome).await;
                Ok(outcome)
            }
            Err(other) => Err(other),
        }
    }

    /// Writes the idempotency ledger row. Returns `false` when a concurrent
    /// delivery of the same event id won the insert race; the caller then
    /// answers that delivery as a duplicate and lets its transaction roll
    /// back, since the winner already holds the event.
    async fn record(
        &self,
        txn: &DatabaseTransaction,
        envelope: &GatewayEnvelope,
        order_id: Option<i64>,
        outcome: WebhookOutcome,
        raw_payload: &str,
    ) -> Result<bool, ServiceError> {
        let row = payment_event::ActiveModel {
            external_event_id: Set(envelope.id.clone()),
            event_type: Set(envelope.event_type.clone()),
            order_id: Set(order_id),
            outcome: Set(outcome.to_string()),
            payload: Set(raw_payload.to_string()),
            received_at: Set(Utc::now()),
            ..Default::default()
        };
        match row.insert(txn).await {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(event_id = %envelope.id, "lost ledger race to a concurrent delivery");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn emit_applied(&self, before: &OrderModel, after: &OrderModel) {
        self.event_sender
            .send_or_log(Event::OrderPaymentStatusChanged {
                order_id: after.id,
                old_status: before.payment_status.clone(),
                new_status: after.payment_status.clone(),
                source: TransitionSource::GatewayCallback.to_string(),
            })
            .await;
    }

    async fn emit_received(&self, envelope: &GatewayEnvelope, outcome: WebhookOutcome) {
        self.event_sender
            .send_or_log(Event::PaymentEventReceived {
                external_event_id: envelope.id.clone(),
                event_type: envelope.event_type.clone(),
                outcome: outcome.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_event_types_map_to_terminal_intents() {
        assert_eq!(
            target_status("payment_intent.succeeded"),
            Some(PaymentStatus::Paid)
        );
        assert_eq!(
            target_status("payment_intent.payment_failed"),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            target_status("payment_intent.canceled"),
            Some(PaymentStatus::Cancelled)
        );
        assert_eq!(target_status("charge.dispute.created"), None);
    }

    #[test]
    fn envelope_parses_gateway_shape() {
        let raw = r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"order_code":"ORD-20260830-0001"},"created":123}"#;
        let envelope: GatewayEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.id, "evt_1");
        assert_eq!(envelope.event_type, "payment_intent.succeeded");
        assert_eq!(envelope.data.order_code, "ORD-20260830-0001");
    }

    #[tokio::test]
    async fn losing_the_ledger_race_reads_as_a_duplicate() {
        use sea_orm_migration::MigratorTrait;

        let db = Arc::new(
            sea_orm::Database::connect("sqlite::memory:")
                .await
                .unwrap(),
        );
        crate::migrator::Migrator::up(db.as_ref(), None).await.unwrap();
        let (sender, _receiver) = crate::events::channel(4);
        let service = PaymentWebhookService::new(
            db.clone(),
            OrderStatusService::new(db.clone(), sender.clone()),
            sender,
        );

        let envelope: GatewayEnvelope = serde_json::from_str(
            r#"{"id":"evt_race","type":"payment_intent.succeeded","data":{"order_code":"ORD-20260830-0001"}}"#,
        )
        .unwrap();

        let txn = db.begin().await.unwrap();
        let first = service
            .record(&txn, &envelope, None, WebhookOutcome::OrderNotFound, "{}")
            .await
            .unwrap();
        let second = service
            .record(&txn, &envelope, None, WebhookOutcome::OrderNotFound, "{}")
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn outcomes_serialize_snake_case() {
        assert_eq!(WebhookOutcome::Applied.to_string(), "applied");
        assert_eq!(
            WebhookOutcome::RejectedTransition.to_string(),
            "rejected_transition"
        );
        assert_eq!(WebhookOutcome::OrderNotFound.to_string(), "order_not_found");
    }
}
