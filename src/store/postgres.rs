//! PostgreSQL [`Store`] backend.
//!
//! Tables are created by [`crate::schema::create_schema`] on startup. All
//! statements are runtime-checked `sqlx::query` calls with bound parameters.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{Store, StoreResult};
use crate::models::{
    AverageLinkRate, ProfileSample, PurgeSummary, RawLogEntry, RawObservation, TestGroupMapping,
};

// ---

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Full recompute of every link average, insert-or-replace by key.
const RECOMPUTE_AVERAGES: &str = r#"
    INSERT INTO average_reception_rates (
        node_id, neighbor_id, test_group, average_reception_rate, average_rssi
    )
    SELECT
        sender_device_id,
        receiver_device_id,
        test_group,
        AVG(reception_rate),
        AVG(rssi)::DOUBLE PRECISION
    FROM device_reception_data
    GROUP BY sender_device_id, receiver_device_id, test_group
    ON CONFLICT (node_id, neighbor_id, test_group) DO UPDATE SET
        average_reception_rate = EXCLUDED.average_reception_rate,
        average_rssi = EXCLUDED.average_rssi
"#;

const PROFILE_COLUMNS: &str = "device_id, test_method, test_group_id, avg_tx, avg_rx, \
                               captured_txs, captured_rxs, recorded_at";

#[async_trait]
impl Store for PgStore {
    // ---
    async fn append_raw_log(&self, topic: &str, payload: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO raw_log (topic, payload) VALUES ($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn raw_logs(&self) -> StoreResult<Vec<RawLogEntry>> {
        let rows = sqlx::query_as::<_, RawLogEntry>(
            "SELECT id, topic, payload, received_at FROM raw_log ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn append_observations(&self, rows: &[RawObservation]) -> StoreResult<u64> {
        // ---
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for row in rows {
            written += sqlx::query(
                r#"
                INSERT INTO device_reception_data (
                    sender_device_id, receiver_device_id, reception_rate,
                    observed_at, test_group, rssi
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&row.sender_device_id)
            .bind(&row.receiver_device_id)
            .bind(row.reception_rate)
            .bind(row.observed_at)
            .bind(&row.test_group)
            .bind(row.rssi)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        sqlx::query(RECOMPUTE_AVERAGES).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn raw_observations(&self) -> StoreResult<Vec<RawObservation>> {
        let rows = sqlx::query_as::<_, RawObservation>(
            r#"
            SELECT sender_device_id, receiver_device_id, reception_rate,
                   observed_at, test_group, rssi
            FROM device_reception_data
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recompute_averages(&self) -> StoreResult<u64> {
        let result = sqlx::query(RECOMPUTE_AVERAGES).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn average_rates(&self) -> StoreResult<Vec<AverageLinkRate>> {
        let rows = sqlx::query_as::<_, AverageLinkRate>(
            r#"
            SELECT node_id, neighbor_id, test_group, average_reception_rate, average_rssi
            FROM average_reception_rates
            ORDER BY test_group, node_id, neighbor_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_group_label(&self, app_test_id: &str) -> StoreResult<Option<String>> {
        let label = sqlx::query_scalar::<_, String>(
            "SELECT display_name FROM test_group_mapping WHERE app_test_id = $1",
        )
        .bind(app_test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(label)
    }

    async fn count_group_mappings(&self) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM test_group_mapping")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn group_label_taken(&self, display_name: &str) -> StoreResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM test_group_mapping WHERE display_name = $1)",
        )
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn try_insert_group(&self, app_test_id: &str, display_name: &str) -> StoreResult<bool> {
        // ---
        // Both columns are UNIQUE; a lost race on either one inserts nothing.
        let result = sqlx::query(
            r#"
            INSERT INTO test_group_mapping (app_test_id, display_name)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(app_test_id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn group_mappings(&self) -> StoreResult<Vec<TestGroupMapping>> {
        let rows = sqlx::query_as::<_, TestGroupMapping>(
            "SELECT app_test_id, display_name FROM test_group_mapping ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn purge_group(&self, display_name: &str) -> StoreResult<PurgeSummary> {
        // ---
        let mut tx = self.pool.begin().await?;

        let observations = sqlx::query("DELETE FROM device_reception_data WHERE test_group = $1")
            .bind(display_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let averages = sqlx::query("DELETE FROM average_reception_rates WHERE test_group = $1")
            .bind(display_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mappings = sqlx::query("DELETE FROM test_group_mapping WHERE display_name = $1")
            .bind(display_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // raw_log has no test group link and is never purged here.
        tx.commit().await?;

        Ok(PurgeSummary {
            observations,
            averages,
            mappings,
        })
    }

    async fn clear_all(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            TRUNCATE raw_log, device_reception_data, average_reception_rates,
                     test_group_mapping, profile_results
            RESTART IDENTITY
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_profile(&self, sample: &ProfileSample) -> StoreResult<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO profile_results (
                device_id, test_method, test_group_id, avg_tx, avg_rx,
                captured_txs, captured_rxs, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (device_id, test_method, test_group_id) DO UPDATE SET
                avg_tx = EXCLUDED.avg_tx,
                avg_rx = EXCLUDED.avg_rx,
                captured_txs = EXCLUDED.captured_txs,
                captured_rxs = EXCLUDED.captured_rxs,
                recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(&sample.device_id)
        .bind(&sample.test_method)
        .bind(&sample.test_group_id)
        .bind(sample.avg_tx)
        .bind(sample.avg_rx)
        .bind(&sample.captured_txs)
        .bind(&sample.captured_rxs)
        .bind(sample.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn profile_samples(&self) -> StoreResult<Vec<ProfileSample>> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profile_results \
             ORDER BY device_id, test_method, test_group_id"
        );
        let rows = sqlx::query_as::<_, ProfileSample>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn profiles_for_device(&self, device_id: &str) -> StoreResult<Vec<ProfileSample>> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profile_results WHERE device_id = $1 \
             ORDER BY test_method, test_group_id"
        );
        let rows = sqlx::query_as::<_, ProfileSample>(&sql)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_device_profiles(&self, device_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM profile_results WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_profile_group(&self, device_id: &str, test_group_id: &str) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM profile_results WHERE device_id = $1 AND test_group_id = $2")
                .bind(device_id)
                .bind(test_group_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
