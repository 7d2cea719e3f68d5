use chrono::NaiveDate;
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::debug;

use crate::{
    entities::order::{self, Entity as OrderEntity},
    errors::ServiceError,
};

const CODE_DATE_FORMAT: &str = "%Y%m%d";

/// Formats `<PREFIX>-<YYYYMMDD>-<NNNN>`. The sequence widens past 9999.
pub fn format_order_code(prefix: &str, date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:04}", prefix, date.format(CODE_DATE_FORMAT), sequence)
}

/// Parses the trailing sequence of an order code.
pub fn parse_sequence(code: &str) -> Option<u32> {
    code.rsplit('-').next()?.parse().ok()
}

/// Computes the next order code for the given day by reading the greatest
/// existing code with today's prefix.
///
/// This lookup-then-increment is not safe on its own: two checkouts racing
/// on the same day can compute the same sequence number. Safety comes from
/// the unique index on `orders.order_code` together with the checkout
/// writer's bounded retry on conflict, so this must always be called inside
/// the transaction that inserts the order.
pub async fn next_order_code<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    date: NaiveDate,
) -> Result<String, ServiceError> {
    let day_prefix = format!("{}-{}-", prefix, date.format(CODE_DATE_FORMAT));

    // Longest code first: once the sequence outgrows the 4-digit pad,
    // "...-10000" sorts lexicographically below "...-9999" but is the
    // larger sequence.
    let latest = OrderEntity::find()
        .filter(order::Column::OrderCode.starts_with(day_prefix.as_str()))
        .order_by_desc(SimpleExpr::FunctionCall(Func::char_length(Expr::col(
            order::Column::OrderCode,
        ))))
        .order_by_desc(order::Column::OrderCode)
        .one(conn)
        .await?;

    // First order of a new day starts the sequence at 0001. Cancelled orders
    // keep their codes, so the sequence never reuses one.
    let next = latest
        .as_ref()
        .and_then(|o| parse_sequence(&o.order_code))
        .map_or(1, |seq| seq + 1);

    let code = format_order_code(prefix, date, next);
    debug!(code = %code, "generated candidate order code");
    Ok(code)
}
