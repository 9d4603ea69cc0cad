// Artifact store on a real on-disk database

use restyle::artifacts::{ArtifactStore, SqliteArtifactStore};

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("artifacts.db");

    let saved = {
        let store = SqliteArtifactStore::open(&db_path).unwrap();
        store
            .save("dark theme", "body { background: #111; }")
            .unwrap()
    };

    let store = SqliteArtifactStore::open(&db_path).unwrap();
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, saved.id);
    assert_eq!(listed[0].css, "body { background: #111; }");
}

#[test]
fn test_store_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested/deeper/artifacts.db");
    let store = SqliteArtifactStore::open(&db_path).unwrap();
    store.save("x", "a{}").unwrap();
    assert!(db_path.exists());
}

#[test]
fn test_list_is_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteArtifactStore::open(&dir.path().join("a.db")).unwrap();
    let first = store.save("first", "a{}").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = store.save("second", "b{}").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
}

#[test]
fn test_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteArtifactStore::open(&dir.path().join("a.db")).unwrap();
    let artifact = store.save("temp", "a{}").unwrap();
    assert!(store.delete(&artifact.id).unwrap());
    assert!(store.list().unwrap().is_empty());
    assert!(!store.delete(&artifact.id).unwrap());
}
