//! Pricing resolution for catalog products and their texture variants.
//!
//! The same resolver runs at payment-intent creation and again inside the
//! materialization transaction, so the two totals can only diverge if the
//! catalog changed in between - which the amount assertion then catches.

use crate::entities::product;
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Line items are billed for at least this many square units, so a
/// near-zero area can never price a line near zero.
pub const MIN_BILLABLE_AREA: Decimal = dec!(1);

/// Resolves the authoritative unit price for a product and optional texture
/// selection. A named texture must exist in the product's variant price
/// list; without a selection the base price applies.
pub fn resolve_unit_price(
    product: &product::Model,
    selected_texture: Option<&str>,
) -> Result<Decimal, ServiceError> {
    match selected_texture {
        None => Ok(product.price),
        Some(name) => product
            .texture_variants()
            .into_iter()
            .find(|variant| variant.name == name)
            .map(|variant| variant.price)
            .ok_or_else(|| {
                ServiceError::VariantNotFound(format!(
                    "texture '{}' is not offered for {}",
                    name, product.name
                ))
            }),
    }
}

/// Rejects client-supplied prices that differ from the resolved price.
pub fn check_client_price(
    product_name: &str,
    resolved: Decimal,
    client_supplied: Option<Decimal>,
) -> Result<(), ServiceError> {
    if let Some(client) = client_supplied {
        if client != resolved {
            return Err(ServiceError::PriceMismatch(format!(
                "client price {} for {} does not match catalog price {}",
                client, product_name, resolved
            )));
        }
    }
    Ok(())
}

/// Billable area for a line item: the requested area, floored at
/// [`MIN_BILLABLE_AREA`]. Missing areas bill as the floor.
pub fn billable_area(area: Option<Decimal>) -> Decimal {
    match area {
        Some(a) if a > MIN_BILLABLE_AREA => a,
        _ => MIN_BILLABLE_AREA,
    }
}

/// Line total: `unit_price x quantity x billable area`.
pub fn line_total(unit_price: Decimal, quantity: i32, area: Option<Decimal>) -> Decimal {
    unit_price * Decimal::from(quantity) * billable_area(area)
}
