//! PgStore against a live database.
//!
//! Runs only when `DATABASE_URL` points at a scratch PostgreSQL database; the
//! tables are truncated between steps. Without it the test returns early.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;

use meshlink_telemetry::models::ProfileSample;
use meshlink_telemetry::{decoder, schema, GroupResolver, LinkAggregator, PgStore, Store};

fn ts(sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, sec).unwrap()
}

fn sample(device: &str, group: &str, txs: Vec<i32>) -> ProfileSample {
    ProfileSample {
        device_id: device.into(),
        test_method: "scan".into(),
        test_group_id: group.into(),
        avg_tx: -60.0,
        avg_rx: -61.5,
        captured_txs: txs,
        captured_rxs: vec![-61, -62],
        recorded_at: ts(0),
    }
}

async fn connect() -> Result<Option<Arc<PgStore>>> {
    // ---
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL store tests");
        return Ok(None);
    };
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    schema::create_schema(&pool).await?;
    Ok(Some(Arc::new(PgStore::new(pool))))
}

// One test function: every step truncates the shared tables.
#[tokio::test]
async fn pg_store_honors_store_contract() -> Result<()> {
    // ---
    let Some(store) = connect().await? else {
        return Ok(());
    };

    recompute_is_idempotent(store.clone()).await?;
    profile_upsert_replaces(store.clone()).await?;
    purge_keeps_raw_log(store.clone()).await?;
    concurrent_resolve_assigns_one_label(store.clone()).await?;
    clear_all_restarts_identities(store.clone()).await?;

    store.clear_all().await?;
    Ok(())
}

async fn recompute_is_idempotent(store: Arc<PgStore>) -> Result<()> {
    // ---
    store.clear_all().await?;
    let agg = LinkAggregator::new(store.clone());

    let a = decoder::decode("140014010601020304000000000000", ts(0))?;
    let b = decoder::decode("140014010601040300000000000000", ts(5))?;
    assert_eq!(agg.append_observation(&a, "Test #1", Some(-60)).await?, 2);
    assert_eq!(agg.append_observation(&b, "Test #1", Some(-50)).await?, 2);

    let first = store.average_rates().await?;
    agg.recompute_averages().await?;
    let second = store.average_rates().await?;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    let link = first.iter().find(|r| r.neighbor_id == "1").unwrap();
    assert!((link.average_reception_rate - 0.5).abs() < 1e-12);
    assert_eq!(link.average_rssi, Some(-55.0));
    Ok(())
}

async fn profile_upsert_replaces(store: Arc<PgStore>) -> Result<()> {
    // ---
    store.clear_all().await?;

    store.upsert_profile(&sample("dev-1", "g1", vec![-60, -61])).await?;
    store.upsert_profile(&sample("dev-1", "g1", vec![-70, -71, -72])).await?;
    store.upsert_profile(&sample("dev-1", "g2", vec![])).await?;

    let rows = store.profiles_for_device("dev-1").await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].captured_txs, vec![-70, -71, -72]);
    assert_eq!(rows[0].captured_rxs, vec![-61, -62]);
    assert_eq!(rows[0].recorded_at, ts(0));
    assert!(rows[1].captured_txs.is_empty());

    assert_eq!(store.delete_profile_group("dev-1", "g2").await?, 1);
    assert_eq!(store.delete_device_profiles("dev-1").await?, 1);
    assert!(store.profile_samples().await?.is_empty());
    Ok(())
}

async fn purge_keeps_raw_log(store: Arc<PgStore>) -> Result<()> {
    // ---
    store.clear_all().await?;
    let agg = LinkAggregator::new(store.clone());
    store.append_raw_log("log/scanner/upload", "payload").await?;

    let r = decoder::decode("140014010601020304000000000000", ts(0))?;
    agg.ingest_reading("grpA", &r, None).await?;
    agg.ingest_reading("grpB", &r, None).await?;

    let summary = agg.purge_group("Test #1").await?;
    assert_eq!(summary.observations, 2);
    assert_eq!(summary.averages, 2);
    assert_eq!(summary.mappings, 1);

    assert!(store.raw_observations().await?.iter().all(|o| o.test_group == "Test #2"));
    assert!(store.average_rates().await?.iter().all(|a| a.test_group == "Test #2"));
    assert_eq!(store.raw_logs().await?.len(), 1);
    Ok(())
}

async fn concurrent_resolve_assigns_one_label(store: Arc<PgStore>) -> Result<()> {
    // ---
    store.clear_all().await?;
    let resolver = GroupResolver::new(store.clone());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let r = resolver.clone();
            let id = if i % 2 == 0 { "shared" } else { "other" };
            tokio::spawn(async move { (id, r.resolve(id).await) })
        })
        .collect();

    let mut shared = Vec::new();
    let mut other = Vec::new();
    for t in tasks {
        let (id, label) = t.await?;
        let label = label?;
        if id == "shared" {
            shared.push(label);
        } else {
            other.push(label);
        }
    }

    assert!(shared.iter().all(|l| l == &shared[0]));
    assert!(other.iter().all(|l| l == &other[0]));
    assert_ne!(shared[0], other[0]);
    assert_eq!(store.count_group_mappings().await?, 2);
    Ok(())
}

async fn clear_all_restarts_identities(store: Arc<PgStore>) -> Result<()> {
    // ---
    store.append_raw_log("t", "first").await?;
    store.clear_all().await?;
    store.append_raw_log("t", "second").await?;

    let logs = store.raw_logs().await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, 1);
    assert!(store.group_mappings().await?.is_empty());
    Ok(())
}
