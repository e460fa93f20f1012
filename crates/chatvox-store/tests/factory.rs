//! Factory wiring against a temporary data directory.

use chatvox_core::{CostLedger, EngineId, UserPermission};
use chatvox_store::StoreFactory;
use chrono::Utc;

#[tokio::test]
async fn open_dir_persists_every_store() {
    let root = tempfile::tempdir().unwrap();

    let stores = StoreFactory::open_dir(root.path()).await.unwrap();
    let mut alice = UserPermission::new("u1", "alice");
    alice.assigned_voice = Some("en-US-1".into());
    stores.permissions.upsert(alice.clone()).await.unwrap();

    let mut ledger = CostLedger::starting_at(Utc::now());
    ledger.add(&EngineId::new("c"), 10, 0.01);
    stores.ledger.save(&ledger).await.unwrap();

    assert!(root.path().join("permissions.json").exists());
    assert!(root.path().join("cost_ledger.json").exists());
    assert!(root.path().join("cache").join("blobs").is_dir());

    let reopened = StoreFactory::open_dir(root.path()).await.unwrap();
    assert_eq!(reopened.permissions.get("u1").await.unwrap(), Some(alice));
    assert_eq!(reopened.ledger.load().await.unwrap(), Some(ledger));
    assert!(reopened.cache.load_index().await.unwrap().is_empty());
}

#[tokio::test]
async fn in_memory_stores_start_empty() {
    let stores = StoreFactory::in_memory();
    assert!(stores.permissions.list().await.unwrap().is_empty());
    assert!(stores.ledger.load().await.unwrap().is_none());
}
