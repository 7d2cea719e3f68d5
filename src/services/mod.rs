pub mod carts;
pub mod checkout;
pub mod order_codes;
pub mod order_status;
pub mod orders;
pub mod payment_webhooks;
