// tests/profile_store_test.rs

use moniker::profile::{ProfileField, ProfileStore, generate_profile_id, group_key};
use sqlx::sqlite::SqlitePoolOptions;

/// Helper to set up a clean, isolated in-memory store.
async fn setup_store() -> ProfileStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("create in-memory sqlite pool");

    let store = ProfileStore::new(pool);
    store.run_migrations().await.unwrap();
    store
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    let store = setup_store().await;
    let id = generate_profile_id("test-salt", "person-1");

    let created = store
        .ensure_profile_exists(&id, "person-1", Some(("qq", "user123")))
        .await
        .unwrap();
    assert!(created);

    let created_again = store
        .ensure_profile_exists(&id, "person-1", Some(("qq", "user123")))
        .await
        .unwrap();
    assert!(!created_again);

    let record = store.get_profile(&id, None).await.unwrap().unwrap();
    let accounts = record.platform_accounts.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts["qq"], vec!["user123".to_string()]);
}

#[tokio::test]
async fn test_ensure_links_additional_accounts_without_clobbering() {
    let store = setup_store().await;
    let id = generate_profile_id("test-salt", "person-1");

    store
        .ensure_profile_exists(&id, "person-1", Some(("qq", "user123")))
        .await
        .unwrap();
    store
        .increment_sobriquet_count(&id, "qq", "group101", "Old Zhang")
        .await
        .unwrap();

    // A later ensure with a new account must not reset anything.
    store
        .ensure_profile_exists(&id, "person-1", Some(("telegram", "tg-9")))
        .await
        .unwrap();

    let record = store.get_profile(&id, None).await.unwrap().unwrap();
    let accounts = record.platform_accounts.unwrap();
    assert_eq!(accounts["qq"], vec!["user123".to_string()]);
    assert_eq!(accounts["telegram"], vec!["tg-9".to_string()]);

    let by_group = record.sobriquets_by_group.unwrap();
    let entries = &by_group[&group_key("qq", "group101")];
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Old Zhang");
    assert_eq!(entries[0].count, 1);
}

#[tokio::test]
async fn test_counting_is_monotonic_and_exact() {
    let store = setup_store().await;
    let id_a = generate_profile_id("test-salt", "person-a");
    let id_b = generate_profile_id("test-salt", "person-b");

    store.ensure_profile_exists(&id_a, "person-a", None).await.unwrap();
    store.ensure_profile_exists(&id_b, "person-b", None).await.unwrap();

    // Interleave two people's observations in one group.
    for _ in 0..5 {
        store
            .increment_sobriquet_count(&id_a, "qq", "group101", "Old Zhang")
            .await
            .unwrap();
        store
            .increment_sobriquet_count(&id_b, "qq", "group101", "Old Li")
            .await
            .unwrap();
    }
    store
        .increment_sobriquet_count(&id_a, "qq", "group101", "Boss Zhang")
        .await
        .unwrap();

    let key = group_key("qq", "group101");
    let entries_a = store.group_sobriquets(&id_a, &key).await.unwrap();
    assert_eq!(entries_a.len(), 2);
    assert_eq!(entries_a[0].name, "Old Zhang");
    assert_eq!(entries_a[0].count, 5);
    assert_eq!(entries_a[1].name, "Boss Zhang");
    assert_eq!(entries_a[1].count, 1);

    let entries_b = store.group_sobriquets(&id_b, &key).await.unwrap();
    assert_eq!(entries_b, vec![moniker::profile::SobriquetEntry {
        name: "Old Li".to_string(),
        count: 5,
    }]);
}

#[tokio::test]
async fn test_counts_are_scoped_per_group() {
    let store = setup_store().await;
    let id = generate_profile_id("test-salt", "person-1");
    store.ensure_profile_exists(&id, "person-1", None).await.unwrap();

    store
        .increment_sobriquet_count(&id, "qq", "group101", "Old Zhang")
        .await
        .unwrap();
    store
        .increment_sobriquet_count(&id, "qq", "group202", "Old Zhang")
        .await
        .unwrap();
    store
        .increment_sobriquet_count(&id, "qq", "group202", "Old Zhang")
        .await
        .unwrap();

    let g1 = store.group_sobriquets(&id, &group_key("qq", "group101")).await.unwrap();
    let g2 = store.group_sobriquets(&id, &group_key("qq", "group202")).await.unwrap();
    assert_eq!(g1[0].count, 1);
    assert_eq!(g2[0].count, 2);
}

#[tokio::test]
async fn test_increment_without_record_reports_failure_not_error() {
    let store = setup_store().await;
    let id = generate_profile_id("test-salt", "nobody");

    let counted = store
        .increment_sobriquet_count(&id, "qq", "group101", "Old Zhang")
        .await
        .unwrap();
    assert!(!counted);

    // Nothing was created as a side effect.
    assert!(store.get_profile(&id, None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_profile_distinguishes_absent_from_empty() {
    let store = setup_store().await;
    let id = generate_profile_id("test-salt", "person-1");

    assert!(store.get_profile(&id, None).await.unwrap().is_none());

    store.ensure_profile_exists(&id, "person-1", None).await.unwrap();
    let record = store.get_profile(&id, None).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.person_key_ref.as_deref(), Some("person-1"));
    assert!(record.platform_accounts.unwrap().is_empty());
    assert!(record.sobriquets_by_group.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_profile_projection_limits_fields() {
    let store = setup_store().await;
    let id = generate_profile_id("test-salt", "person-1");
    store
        .ensure_profile_exists(&id, "person-1", Some(("qq", "user123")))
        .await
        .unwrap();
    store
        .increment_sobriquet_count(&id, "qq", "group101", "Old Zhang")
        .await
        .unwrap();

    let record = store
        .get_profile(&id, Some(&[ProfileField::Sobriquets]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.id, id);
    assert!(record.platform_accounts.is_none(), "not requested");
    assert!(record.identity.is_none());
    let by_group = record.sobriquets_by_group.expect("requested field present");
    assert_eq!(by_group[&group_key("qq", "group101")][0].name, "Old Zhang");
}

#[tokio::test]
async fn test_group_sobriquets_for_unknown_profile_is_empty() {
    let store = setup_store().await;
    let entries = store
        .group_sobriquets("no-such-profile", &group_key("qq", "group101"))
        .await
        .unwrap();
    assert!(entries.is_empty());
}
