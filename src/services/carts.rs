use crate::entities::cart;
use crate::errors::ServiceError;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

/// Empties the user's cart inside the caller's transaction, so a cart only
/// disappears if the order it paid for actually commits.
pub async fn clear_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, ServiceError> {
    let result = cart::Entity::delete_many()
        .filter(cart::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    debug!(%user_id, rows = result.rows_affected, "cart cleared");
    Ok(result.rows_affected)
}
