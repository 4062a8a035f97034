use std::path::Path;
use tempfile::TempDir;

use loglens::config::Config;
use loglens::sqlite_store::SqliteStore;
use loglens_core::models::{LogRecord, TimeFilter};
use loglens_core::store::VectorStore;

fn test_config(root: &Path, collection: &str) -> Config {
    let src = format!(
        r#"[log]
path = "{root}/system.log"

[db]
path = "{root}/data/loglens.sqlite"
collection = "{collection}"
"#,
        root = root.display(),
        collection = collection
    );
    toml::from_str(&src).unwrap()
}

fn record(id: &str, text: &str, timestamp: f64, vector: [f32; 2]) -> LogRecord {
    LogRecord {
        id: id.to_string(),
        text: text.to_string(),
        timestamp,
        vector: vector.to_vec(),
    }
}

#[tokio::test]
async fn test_upsert_same_id_keeps_one_record() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(tmp.path(), "system_logs"))
        .await
        .unwrap();

    let r = record("abc", "host INFO: ok", 100.0, [1.0, 0.0]);
    for _ in 0..3 {
        store.upsert(std::slice::from_ref(&r)).await.unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 1);

    // A later upsert overwrites in place.
    store
        .upsert(&[record("abc", "host INFO: ok", 200.0, [0.0, 1.0])])
        .await
        .unwrap();
    let hits = store.query(&[0.0, 1.0], 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].timestamp, 200.0);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    store.close().await;
}

#[tokio::test]
async fn test_query_ranks_and_filters_by_time() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&test_config(tmp.path(), "system_logs"))
        .await
        .unwrap();

    store
        .upsert(&[
            record("old", "old disk error", 1_000.0, [1.0, 0.0]),
            record("new", "new disk warning", 5_000.0, [0.8, 0.6]),
            record("other", "user login", 5_000.0, [0.0, 1.0]),
        ])
        .await
        .unwrap();

    let hits = store.query(&[1.0, 0.0], 2, None).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["old", "new"]);

    let since = TimeFilter::since(5_000.0);
    let hits = store.query(&[1.0, 0.0], 5, Some(&since)).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "other"]);
    store.close().await;
}

#[tokio::test]
async fn test_collections_are_isolated_and_persist() {
    let tmp = TempDir::new().unwrap();
    {
        let a = SqliteStore::open(&test_config(tmp.path(), "a")).await.unwrap();
        let b = SqliteStore::open(&test_config(tmp.path(), "b")).await.unwrap();
        a.upsert(&[record("x", "only in a", 1.0, [1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.query(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
        a.close().await;
        b.close().await;
    }

    // Reopen: records survive and migrations are re-runnable.
    let a = SqliteStore::open(&test_config(tmp.path(), "a")).await.unwrap();
    assert_eq!(a.count().await.unwrap(), 1);
    a.close().await;
}
