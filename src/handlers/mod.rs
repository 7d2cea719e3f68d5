use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        carts::CartService, checkout::CheckoutService, order_status::OrderStatusService,
        orders::OrderQueryService, payment_webhooks::PaymentWebhookService,
    },
};

pub mod checkout;
pub mod orders;
pub mod payment_webhooks;

/// The service layer as seen by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderQueryService,
    pub order_status: OrderStatusService,
    pub payment_webhooks: PaymentWebhookService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let carts = CartService::new(db.clone());
        let order_status = OrderStatusService::new(db.clone(), event_sender.clone());
        Self {
            checkout: CheckoutService::new(
                db.clone(),
                carts.clone(),
                event_sender.clone(),
                config,
            ),
            orders: OrderQueryService::new(db.clone()),
            payment_webhooks: PaymentWebhookService::new(
                db,
                order_status.clone(),
                event_sender,
            ),
            carts,
            order_status,
        }
    }
}
