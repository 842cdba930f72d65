use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog product. Stock and the cumulative sold counter are the only
/// columns this service mutates; everything else is owned by the catalog
/// CRUD surface.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    /// Base unit price, used when no texture variant is selected
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub stock: i32,
    pub sold: i64,
    /// Texture variant price list: `[{ "name": ..., "price": ... }]`
    #[sea_orm(column_type = "Json", nullable)]
    pub textures: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub colours: Option<Json>,
    #[sea_orm(nullable)]
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// One entry of the texture variant price list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextureVariant {
    pub name: String,
    pub price: Decimal,
}

impl Model {
    /// Parses the texture price list; a missing column means no variants.
    pub fn texture_variants(&self) -> Vec<TextureVariant> {
        self.textures
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}
