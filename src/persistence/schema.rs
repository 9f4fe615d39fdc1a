use scylla::client::session::Session;

// ============================================================================
// Schema - keyspace and tables
// ============================================================================

pub const ORDER_EVENTS_TABLE: &str = "order_events";
pub const WALLET_EVENTS_TABLE: &str = "wallet_events";

const EVENT_TABLES: [&str; 2] = [ORDER_EVENTS_TABLE, WALLET_EVENTS_TABLE];

const TABLES: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS products (
        product_id uuid PRIMARY KEY,
        name text,
        price text
    )",
    "CREATE TABLE IF NOT EXISTS product_stock (
        product_id uuid PRIMARY KEY,
        stock counter
    )",
    "CREATE TABLE IF NOT EXISTS coupons (
        code text PRIMARY KEY,
        definition text
    )",
    "CREATE TABLE IF NOT EXISTS coupon_usage (
        code text,
        user_id uuid,
        used counter,
        PRIMARY KEY (code, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS reconciliation_queue (
        id uuid PRIMARY KEY,
        order_id uuid,
        user_id uuid,
        request_id uuid,
        kind text,
        amount text,
        detail text,
        created_at timestamp
    )",
];

/// Create the keyspace (if missing), switch the session to it and create
/// every table the service uses.
pub async fn ensure_schema(session: &Session, keyspace: &str) -> anyhow::Result<()> {
    if !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("Invalid keyspace name: {keyspace}");
    }

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
            ),
            &[],
        )
        .await?;

    session.use_keyspace(keyspace, false).await?;

    for table in EVENT_TABLES {
        session
            .query_unpaged(
                format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        aggregate_id uuid,
                        sequence_number bigint,
                        event_id uuid,
                        event_type text,
                        event_version int,
                        event_data text,
                        causation_id uuid,
                        correlation_id uuid,
                        user_id uuid,
                        timestamp timestamp,
                        PRIMARY KEY (aggregate_id, sequence_number)
                    ) WITH CLUSTERING ORDER BY (sequence_number ASC)"
                ),
                &[],
            )
            .await?;
    }

    for ddl in TABLES {
        session.query_unpaged(ddl, &[]).await?;
    }

    tracing::info!(keyspace = keyspace, "✅ Schema ready");
    Ok(())
}
