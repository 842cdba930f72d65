//! Transactional stock reservation and restocking.
//!
//! Both entry points run against the caller's open transaction so that
//! concurrent reservations for the same product serialize on the row and a
//! failure anywhere aborts every decrement made so far.

use crate::entities::product;
use crate::errors::ServiceError;
use crate::services::pricing;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// A checkout line item as supplied by the client. `unit_price` is only a
/// cross-check; the catalog price always wins or the request fails.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[serde(default)]
    pub selected_texture: Option<String>,
    #[serde(default)]
    pub selected_colour: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

/// A line item after reservation: authoritative price plus name/image
/// snapshots for the order record.
#[derive(Debug, Clone)]
pub struct ReservedItem {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub area: Decimal,
    pub selected_texture: Option<String>,
    pub selected_colour: Option<String>,
    pub line_total: Decimal,
}

/// Reserves stock for every line item inside the caller's transaction.
///
/// Per item: load the product, resolve the authoritative price, cross-check
/// any client-supplied price, require sufficient stock, then decrement
/// stock and bump the sold counter. The first failure propagates and the
/// caller's transaction aborts, so there are never partial decrements.
pub async fn reserve_items<C: ConnectionTrait>(
    conn: &C,
    items: &[LineItemInput],
) -> Result<Vec<ReservedItem>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "at least one line item is required".to_string(),
        ));
    }

    let mut reserved = Vec::with_capacity(items.len());

    for item in items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be positive for product {}",
                item.product_id
            )));
        }

        let product = product::Entity::find_by_id(item.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "{} is no longer available",
                product.name
            )));
        }

        let unit_price = pricing::resolve_unit_price(&product, item.selected_texture.as_deref())?;
        pricing::check_client_price(&product.name, unit_price, item.unit_price)?;

        if product.stock < item.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for {}: {} remaining",
                product.name, product.stock
            )));
        }

        let line_total = pricing::line_total(unit_price, item.quantity, item.area);
        let area = pricing::billable_area(item.area);

        let name = product.name.clone();
        let image = product.image.clone();

        let mut update: product::ActiveModel = product.clone().into();
        update.stock = Set(product.stock - item.quantity);
        update.sold = Set(product.sold + i64::from(item.quantity));
        update.updated_at = Set(Some(Utc::now()));
        update.update(conn).await?;

        debug!(
            product_id = %item.product_id,
            quantity = item.quantity,
            remaining = product.stock - item.quantity,
            "stock reserved"
        );

        reserved.push(ReservedItem {
            product_id: item.product_id,
            name,
            image,
            unit_price,
            quantity: item.quantity,
            area,
            selected_texture: item.selected_texture.clone(),
            selected_colour: item.selected_colour.clone(),
            line_total,
        });
    }

    Ok(reserved)
}

/// Returns reserved quantities to stock, the inverse of [`reserve_items`].
/// Runs inside the caller's (compensation) transaction. The sold counter is
/// cumulative and is not wound back.
pub async fn restock_items<C: ConnectionTrait>(
    conn: &C,
    items: &[crate::entities::order_item::Model],
) -> Result<(), ServiceError> {
    for item in items {
        let Some(product) = product::Entity::find_by_id(item.product_id).one(conn).await? else {
            warn!(
                product_id = %item.product_id,
                "restock skipped: product no longer exists"
            );
            continue;
        };

        let mut update: product::ActiveModel = product.clone().into();
        update.stock = Set(product.stock + item.quantity);
        update.updated_at = Set(Some(Utc::now()));
        update.update(conn).await?;

        debug!(
            product_id = %item.product_id,
            quantity = item.quantity,
            "stock restored"
        );
    }

    Ok(())
}
