use sqlx::SqliteConnection;

use crate::{
    db_types::{Collective, Member, NewCollective, User},
    traits::ReconciliationError,
};

pub async fn insert_collective(
    collective: NewCollective,
    conn: &mut SqliteConnection,
) -> Result<Collective, ReconciliationError> {
    let collective = sqlx::query_as(
        r#"
            INSERT INTO collectives (slug, name, currency, host_collective_id, host_fee_percent, is_host, is_platform)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(collective.slug)
    .bind(collective.name)
    .bind(collective.currency)
    .bind(collective.host_collective_id)
    .bind(collective.host_fee_percent)
    .bind(collective.is_host)
    .bind(collective.is_platform)
    .fetch_one(conn)
    .await?;
    Ok(collective)
}

pub async fn fetch_collective(id: i64, conn: &mut SqliteConnection) -> Result<Option<Collective>, ReconciliationError> {
    let collective = sqlx::query_as("SELECT * FROM collectives WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(collective)
}

/// Resolves the host holding funds for the collective. A self-hosted collective is its own host.
pub async fn fetch_host_of(
    collective: &Collective,
    conn: &mut SqliteConnection,
) -> Result<Option<Collective>, ReconciliationError> {
    match collective.host_collective_id {
        None => Ok(None),
        Some(id) if id == collective.id => Ok(Some(collective.clone())),
        Some(id) => fetch_collective(id, conn).await,
    }
}

/// The platform operator account that receives tips.
pub async fn fetch_platform_collective(conn: &mut SqliteConnection) -> Result<Option<Collective>, ReconciliationError> {
    let collective = sqlx::query_as("SELECT * FROM collectives WHERE is_platform = 1 AND deleted_at IS NULL LIMIT 1")
        .fetch_optional(conn)
        .await?;
    Ok(collective)
}

pub async fn insert_user(collective_id: i64, conn: &mut SqliteConnection) -> Result<User, ReconciliationError> {
    let user = sqlx::query_as("INSERT INTO users (collective_id) VALUES ($1) RETURNING *")
        .bind(collective_id)
        .fetch_one(conn)
        .await?;
    Ok(user)
}

pub async fn fetch_user(id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, ReconciliationError> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(user)
}

/// Flips the fraud-containment flag. Conditional, so replayed events and concurrent webhooks
/// settle on the same state without extra writes.
pub async fn set_user_restricted(
    user_id: i64,
    restricted: bool,
    conn: &mut SqliteConnection,
) -> Result<bool, ReconciliationError> {
    let result = sqlx::query(
        "UPDATE users SET is_restricted = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND is_restricted != $1",
    )
    .bind(restricted)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Records the contributor as a backer of the collective. Idempotent: the unique constraint
/// swallows replays.
pub async fn upsert_member(
    collective_id: i64,
    member_collective_id: i64,
    role: &str,
    conn: &mut SqliteConnection,
) -> Result<(), ReconciliationError> {
    sqlx::query(
        r#"INSERT INTO members (collective_id, member_collective_id, role) VALUES ($1, $2, $3)
           ON CONFLICT (collective_id, member_collective_id, role) DO NOTHING"#,
    )
    .bind(collective_id)
    .bind(member_collective_id)
    .bind(role)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_members(collective_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Member>, ReconciliationError> {
    let members = sqlx::query_as("SELECT * FROM members WHERE collective_id = $1 ORDER BY id")
        .bind(collective_id)
        .fetch_all(conn)
        .await?;
    Ok(members)
}
