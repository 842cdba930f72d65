#![allow(dead_code)]

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use wallcraft_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{address, cart, order::PaymentMethod, payment_intent, product},
    events::{self, EventSender},
    gateway::GatewayClient,
    services::inventory::LineItemInput,
    services::notifications::NoopDispatcher,
    services::orders::AddressRef,
    services::payments::IntentMetadata,
    AppState,
};

pub const GATEWAY_KEY_SECRET: &str = "test_gateway_key_secret_0123456789";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret_0123456789";

/// In-memory SQLite state with a dead gateway endpoint; reconciliation
/// tests seed intents directly and never reach the gateway.
pub async fn test_state() -> AppState {
    test_state_with_gateway("http://127.0.0.1:1").await
}

pub async fn test_state_with_gateway(api_base: &str) -> AppState {
    let cfg = AppConfig::new(
        "sqlite::memory:".into(),
        "redis://127.0.0.1:6379".into(),
        "rzp_test_key".into(),
        GATEWAY_KEY_SECRET.into(),
        WEBHOOK_SECRET.into(),
        "127.0.0.1".into(),
        18080,
        "test".into(),
    );

    // A single connection keeps every session on the same in-memory
    // database; sqlx would otherwise open one blank database per pool slot.
    let db_cfg = DbConfig {
        url: cfg.database_url.clone(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&db_cfg)
        .await
        .expect("db connect");
    db::init_schema(&pool).await.expect("schema init");
    let db_arc = Arc::new(pool);

    let (tx, rx) = mpsc::channel(64);
    let sender = EventSender::new(tx);
    tokio::spawn(events::process_events(rx));

    let gateway = Arc::new(
        GatewayClient::new(
            api_base.to_string(),
            cfg.gateway_key_id.clone(),
            cfg.gateway_key_secret.clone(),
            Duration::from_secs(2),
        )
        .expect("gateway client"),
    );

    AppState::build(db_arc, cfg, gateway, Arc::new(NoopDispatcher), sender)
}

pub async fn seed_product(
    db: &DatabaseConnection,
    name: &str,
    price: Decimal,
    stock: i32,
) -> product::Model {
    seed_product_with_textures(db, name, price, stock, None).await
}

pub async fn seed_product_with_textures(
    db: &DatabaseConnection,
    name: &str,
    price: Decimal,
    stock: i32,
    textures: Option<serde_json::Value>,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        sold: Set(0),
        textures: Set(textures),
        colours: Set(None),
        image: Set(Some(format!("https://cdn.wallcraft.shop/{}.webp", name))),
        is_active: Set(true),
        created_at: Set(chrono::Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed product")
}

pub async fn seed_address(db: &DatabaseConnection, user_id: Uuid) -> address::Model {
    address::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        first_name: Set("Asha".into()),
        last_name: Set("Rao".into()),
        email: Set(Some("asha@example.com".into())),
        phone: Set("9876543210".into()),
        street: Set("12 MG Road".into()),
        city: Set("Bengaluru".into()),
        state: Set("Karnataka".into()),
        postal_code: Set("560001".into()),
        country: Set("India".into()),
        is_default: Set(true),
        created_at: Set(chrono::Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed address")
}

pub async fn seed_cart(db: &DatabaseConnection, user_id: Uuid) -> cart::Model {
    cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        items: Set(serde_json::json!([])),
        total_price: Set(Decimal::ZERO),
        updated_at: Set(chrono::Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed cart")
}

/// Inserts a `created` payment intent the way checkout would, with the
/// reconstruction metadata the webhook path depends on.
pub async fn seed_intent(
    db: &DatabaseConnection,
    user_id: Uuid,
    gateway_order_id: &str,
    amount_minor: i64,
    items: Vec<LineItemInput>,
    address: AddressRef,
    clear_cart: bool,
) -> payment_intent::Model {
    let metadata = IntentMetadata {
        user_id,
        address,
        items,
        payment_method: PaymentMethod::Online,
        clear_cart,
    };

    payment_intent::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        gateway_order_id: Set(gateway_order_id.to_string()),
        gateway_payment_id: Set(None),
        amount_minor: Set(amount_minor),
        currency: Set("INR".into()),
        status: Set("created".into()),
        method: Set(Some("online".into())),
        verified_via: Set(None),
        error_code: Set(None),
        error_description: Set(None),
        metadata: Set(serde_json::to_value(&metadata).unwrap()),
        created_at: Set(chrono::Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed intent")
}

pub fn line_item(product_id: Uuid, quantity: i32) -> LineItemInput {
    LineItemInput {
        product_id,
        quantity,
        area: None,
        selected_texture: None,
        selected_colour: None,
        unit_price: None,
    }
}

pub async fn product_stock(db: &DatabaseConnection, product_id: Uuid) -> i32 {
    product::Entity::find_by_id(product_id)
        .one(db)
        .await
        .expect("query product")
        .expect("product exists")
        .stock
}
