//! Database schema management for `meshlink-telemetry`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when the Postgres backend is selected.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Tables:
/// - `raw_log` – verbatim inbound transport messages (audit, never purged per group)
/// - `device_reception_data` – append-only raw link observations
/// - `average_reception_rates` – derived per-link means, unique per (node, neighbor, group)
/// - `test_group_mapping` – external test id to display label
/// - `profile_results` – profile samples, unique per (device, method, group)
///
/// Safe to call on every startup; no-op if objects already exist.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_log (
            id          BIGSERIAL PRIMARY KEY,
            topic       TEXT        NOT NULL,
            payload     TEXT        NOT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_reception_data (
            id                 BIGSERIAL PRIMARY KEY,
            sender_device_id   TEXT             NOT NULL,
            receiver_device_id TEXT             NOT NULL,
            reception_rate     DOUBLE PRECISION NOT NULL,
            observed_at        TIMESTAMPTZ      NOT NULL,
            test_group         TEXT             NOT NULL,
            rssi               INTEGER,
            created_at         TIMESTAMPTZ      NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS average_reception_rates (
            id                     BIGSERIAL PRIMARY KEY,
            node_id                TEXT             NOT NULL,
            neighbor_id            TEXT             NOT NULL,
            test_group             TEXT             NOT NULL,
            average_reception_rate DOUBLE PRECISION NOT NULL,
            average_rssi           DOUBLE PRECISION,
            UNIQUE (node_id, neighbor_id, test_group)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_group_mapping (
            id           BIGSERIAL PRIMARY KEY,
            app_test_id  TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL UNIQUE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_results (
            id            BIGSERIAL PRIMARY KEY,
            device_id     TEXT             NOT NULL,
            test_method   TEXT             NOT NULL,
            test_group_id TEXT             NOT NULL,
            avg_tx        DOUBLE PRECISION NOT NULL,
            avg_rx        DOUBLE PRECISION NOT NULL,
            captured_txs  INTEGER[]        NOT NULL,
            captured_rxs  INTEGER[]        NOT NULL,
            recorded_at   TIMESTAMPTZ      NOT NULL,
            UNIQUE (device_id, test_method, test_group_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Indexes for purge and per-device lookups
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_device_reception_data_test_group
            ON device_reception_data (test_group);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_average_reception_rates_test_group
            ON average_reception_rates (test_group);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
