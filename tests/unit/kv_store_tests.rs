use restorepoint::persistence::{
    get_json, keys, set_json, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore,
};
use restorepoint::AppError;

#[test]
fn file_store_round_trips_values() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FileKeyValueStore::open(temp.path().join("state")).unwrap();

    store.set(keys::AUTO_SAVE_ENABLED, "true").unwrap();

    assert_eq!(store.get(keys::AUTO_SAVE_ENABLED).unwrap().as_deref(), Some("true"));
    assert!(temp.path().join("state/auto_save_enabled.json").exists());
}

#[test]
fn file_store_missing_key_is_none() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FileKeyValueStore::open(temp.path()).unwrap();

    assert_eq!(store.get(keys::LAST_AUTO_SAVE).unwrap(), None);
}

#[test]
fn file_store_remove_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FileKeyValueStore::open(temp.path()).unwrap();
    store.set(keys::EMERGENCY_SNAPSHOT, "{}").unwrap();

    store.remove(keys::EMERGENCY_SNAPSHOT).unwrap();
    store.remove(keys::EMERGENCY_SNAPSHOT).unwrap();

    assert_eq!(store.get(keys::EMERGENCY_SNAPSHOT).unwrap(), None);
}

#[test]
fn file_store_overwrites_atomically() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FileKeyValueStore::open(temp.path()).unwrap();

    set_json(&store, keys::AUTO_SAVE_INTERVAL, &5_u32).unwrap();
    set_json(&store, keys::AUTO_SAVE_INTERVAL, &9_u32).unwrap();

    let interval: Option<u32> = get_json(&store, keys::AUTO_SAVE_INTERVAL).unwrap();
    assert_eq!(interval, Some(9));
    let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn keys_that_are_not_file_names_are_rejected() {
    let store = MemoryKeyValueStore::new();

    for key in ["", "../escape", "Upper", "with space"] {
        let result = store.set(key, "x");
        assert!(matches!(result, Err(AppError::Storage(_))), "key {key:?}");
    }
}

#[test]
fn failing_memory_store_rejects_writes_but_serves_reads() {
    let store = MemoryKeyValueStore::new();
    store.set(keys::LAST_AUTO_SAVE, "1").unwrap();
    store.fail_writes(true);

    assert!(matches!(
        store.set(keys::LAST_AUTO_SAVE, "2"),
        Err(AppError::Storage(_))
    ));
    assert!(store.remove(keys::LAST_AUTO_SAVE).is_err());
    assert_eq!(store.get(keys::LAST_AUTO_SAVE).unwrap().as_deref(), Some("1"));

    store.fail_writes(false);
    store.set(keys::LAST_AUTO_SAVE, "3").unwrap();
    assert!(store.contains(keys::LAST_AUTO_SAVE));
}

#[test]
fn invalid_stored_json_is_a_decode_error() {
    let store = MemoryKeyValueStore::new();
    store.set(keys::AUTO_SAVE_ENABLED, "not json").unwrap();

    let result: restorepoint::Result<Option<bool>> = get_json(&store, keys::AUTO_SAVE_ENABLED);

    assert!(matches!(result, Err(AppError::Decode(_))));
}
