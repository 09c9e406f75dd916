//! Registry persistence across process restarts.

use anchorage_core::{DeviceId, DeviceKeypair};
use anchorage_store::{DeviceRegistry, RegistryError, SqliteRegistry};

#[tokio::test]
async fn registry_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");

    let device = DeviceId::new("IOT-AB12CD34").unwrap();
    let key = DeviceKeypair::from_seed(&[7u8; 32]).unwrap().public_key();

    {
        let registry = SqliteRegistry::open(&path).unwrap();
        registry.register(&device, &key).await.unwrap();
    }

    let reopened = SqliteRegistry::open(&path).unwrap();
    assert_eq!(reopened.lookup(&device).await.unwrap(), key);
    assert_eq!(reopened.list_devices().await.unwrap(), vec![device]);
}

#[tokio::test]
async fn replaced_key_is_the_one_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");

    let device = DeviceId::new("IOT-00000001").unwrap();
    let first = DeviceKeypair::from_seed(&[1u8; 32]).unwrap().public_key();
    let second = DeviceKeypair::from_seed(&[2u8; 32]).unwrap().public_key();

    {
        let registry = SqliteRegistry::open(&path).unwrap();
        registry.register(&device, &first).await.unwrap();
        registry.register(&device, &second).await.unwrap();
    }

    let reopened = SqliteRegistry::open(&path).unwrap();
    assert_eq!(reopened.lookup(&device).await.unwrap(), second);
}

#[tokio::test]
async fn concurrent_writers_share_one_database() {
    let registry = std::sync::Arc::new(SqliteRegistry::open_memory().unwrap());
    let key = DeviceKeypair::generate().public_key();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let registry = registry.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let device = DeviceId::new(format!("IOT-{i:08}")).unwrap();
                registry.register(&device, &key).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry.list_devices().await.unwrap().len(), 32);
    let missing = DeviceId::new("IOT-FFFFFFFF").unwrap();
    assert!(matches!(
        registry.lookup(&missing).await,
        Err(RegistryError::NotFound(_))
    ));
}
