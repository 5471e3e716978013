// Integration tests require a real database
// Run with: PGHOST=... PGUSER=... PGPASSWORD=... PGDATABASE=... \
//   cargo test -p poolward-core --test live_postgres -- --ignored

use poolward_core::{AppConfig, ConnectionManager, DatabaseConfig, ManagerUpdate};
use std::num::NonZeroU32;
use std::sync::Arc;

fn live_config() -> DatabaseConfig {
    let mut config = AppConfig::default();
    config
        .apply_env_overrides(|key| std::env::var(key).ok())
        .expect("PG* variables");
    config.database
}

#[tokio::test]
#[ignore = "requires database"]
async fn lease_runs_queries_with_session_label() {
    let manager = ConnectionManager::new(live_config()).application_name("svc-A");

    let mut lease = manager.acquire().await.expect("acquire failed");
    let name: String = sqlx::query_scalar("SELECT current_setting('application_name')")
        .fetch_one(&mut **lease)
        .await
        .expect("query failed");

    assert_eq!(name, "svc-A");
    drop(lease);
    manager.shutdown().await;
    assert!(!manager.is_ready());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires database"]
async fn concurrent_leases_share_one_pool() {
    let config = live_config().with_pool_size(NonZeroU32::new(5).unwrap());
    let manager = Arc::new(ConnectionManager::new(config));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let mut lease = manager.acquire().await.expect("acquire failed");
                let value: i32 = sqlx::query_scalar("SELECT $1::int")
                    .bind(i)
                    .fetch_one(&mut **lease)
                    .await
                    .expect("concurrent query failed");
                value
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.expect("task panicked"), i as i32);
    }
    assert_eq!(manager.status().generation, 1);
    assert!(manager.status().open_connections <= 5);
}

#[tokio::test]
#[ignore = "requires database"]
async fn update_swaps_to_a_larger_pool() {
    let config = live_config().with_pool_size(NonZeroU32::new(2).unwrap());
    let manager = ConnectionManager::new(config.clone());
    drop(manager.acquire().await.expect("acquire failed"));

    manager
        .update(ManagerUpdate::new().config(config.with_pool_size(NonZeroU32::new(4).unwrap())))
        .await
        .expect("update failed");

    let mut leases = Vec::new();
    for _ in 0..4 {
        leases.push(manager.acquire().await.expect("acquire failed"));
    }
    assert!(leases.iter().all(|lease| lease.generation() == 2));
}

#[tokio::test]
#[ignore = "requires database"]
async fn wrong_password_is_a_health_check_failure() {
    let config = DatabaseConfig {
        password: "definitely-not-the-password".to_string(),
        ..live_config()
    };
    let manager = ConnectionManager::new(config);

    let err = manager.acquire().await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(!manager.is_ready());
}
