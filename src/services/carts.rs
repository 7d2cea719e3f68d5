use std::sync::Arc;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use tracing::instrument;

use crate::{
    entities::{
        cart_item::{self, Entity as CartItemEntity},
        customer_address::{self, Entity as AddressEntity, Model as AddressModel},
        payment_method::{self, Entity as PaymentMethodEntity, Model as PaymentMethodModel},
        product::Entity as ProductEntity,
    },
    errors::ServiceError,
};

/// One line of a checkout snapshot, with the product price resolved at
/// snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl CartLine {
    pub fn total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// Immutable snapshot of a user's cart taken at the moment checkout begins.
/// Guaranteed non-empty; every line resolved against the live catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CartSnapshot {
    pub customer_id: i64,
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Server-side subtotal; client-supplied totals are never trusted.
    pub fn subtotal_cents(&self) -> i64 {
        self.lines.iter().map(CartLine::total_cents).sum()
    }
}

/// Reads cart contents and resolves the collaborator references the checkout
/// needs (prices, addresses, payment methods).
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Builds the checkout snapshot from the live cart rows. Generic over
    /// the connection so the checkout writer can read it inside its own
    /// transaction and reconcile the purge count against it; a racing
    /// checkout then observes the already-cleared cart or aborts instead of
    /// double-spending it.
    #[instrument(skip(self, conn), fields(customer_id = customer_id))]
    pub async fn cart_snapshot<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: i64,
    ) -> Result<CartSnapshot, ServiceError> {
        let rows = CartItemEntity::find()
            .filter(cart_item::Column::CustomerId.eq(customer_id))
            .order_by_asc(cart_item::Column::Id)
            .find_also_related(ProductEntity)
            .all(conn)
            .await?;

        if rows.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let mut lines = Vec::with_capacity(rows.len());
        for (item, maybe_product) in rows {
            let product = maybe_product.filter(|p| p.active).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Product {} is no longer available",
                    item.product_id
                ))
            })?;
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Invalid quantity {} for product {}",
                    item.quantity, product.sku
                )));
            }
            lines.push(CartLine {
                product_id: product.id,
                product_name: product.name,
                quantity: item.quantity,
                unit_price_cents: product.price_cents,
            });
        }

        Ok(CartSnapshot { customer_id, lines })
    }

    /// Deletes the consumed cart rows. Called inside the checkout
    /// transaction, so the cart is cleared if and only if the order commits.
    pub async fn clear_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: i64,
    ) -> Result<u64, ServiceError> {
        let result = CartItemEntity::delete_many()
            .filter(cart_item::Column::CustomerId.eq(customer_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Looks up a shipping address, scoped to the owning customer.
    pub async fn resolve_address(
        &self,
        address_id: i64,
        customer_id: i64,
    ) -> Result<AddressModel, ServiceError> {
        AddressEntity::find_by_id(address_id)
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Address {} does not exist for this customer",
                    address_id
                ))
            })
    }

    pub async fn resolve_payment_method(
        &self,
        payment_method_id: i64,
    ) -> Result<PaymentMethodModel, ServiceError> {
        PaymentMethodEntity::find_by_id(payment_method_id)
            .filter(payment_method::Column::Active.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Payment method {} does not exist or is inactive",
                    payment_method_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_subtotal_sums_line_totals() {
        let snapshot = CartSnapshot {
            customer_id: 1,
            lines: vec![
                CartLine {
                    product_id: 1,
                    product_name: "A".into(),
                    quantity: 2,
                    unit_price_cents: 1000,
                },
                CartLine {
                    product_id: 2,
                    product_name: "B".into(),
                    quantity: 1,
                    unit_price_cents: 500,
                },
            ],
        };
        assert_eq!(snapshot.subtotal_cents(), 2500);
    }
}
