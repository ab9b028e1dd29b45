use mathtrainer_engine::engine::snapshot::{ProfileDocument, DOCUMENT_VERSION};
use mathtrainer_engine::engine::types::{Operation, SkillRecord};
use mathtrainer_engine::error::EngineError;
use mathtrainer_engine::store::{ProfileStore, StoreError};

fn sample_document() -> ProfileDocument {
    let mut doc = ProfileDocument::default();
    doc.profile.level = 4;
    doc.profile.xp = 33;
    doc.profile.xp_to_next = 506;
    doc.skill_records.insert(
        Operation::Divide,
        SkillRecord {
            ema_accuracy: 0.75,
            ema_response_time_ms: 2400.0,
            attempt_count: 21,
            recent_mistake_count: 2,
            tier: 2,
        },
    );
    doc
}

#[test]
fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::at_path(dir.path().join("profile.json"));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::at_path(dir.path().join("profile.json"));
    let doc = sample_document();
    store.save(&doc).unwrap();
    let loaded = store.load().unwrap().expect("document saved");
    assert_eq!(loaded, doc);
}

#[test]
fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    let store = ProfileStore::at_path(path.clone());
    store.save(&sample_document()).unwrap();

    let mut updated = sample_document();
    updated.profile.xp = 90;
    store.save(&updated).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.profile.xp, 90);
    // No temp file is left behind after a successful save.
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn corrupt_json_is_reported_not_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, "{not json").unwrap();
    let store = ProfileStore::at_path(path.clone());
    assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    // The broken file is still there for the user to inspect.
    assert!(path.exists());
}

#[test]
fn store_errors_surface_as_persistence_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, "{not json").unwrap();
    let store = ProfileStore::at_path(path);
    let err = store.load().unwrap_err();
    assert!(matches!(EngineError::from(err), EngineError::Persistence(_)));
}

#[test]
fn older_documents_with_missing_fields_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, r#"{"version":1,"profile":{"level":2,"xp":10,"xpToNext":150}}"#)
        .unwrap();
    let store = ProfileStore::at_path(path);
    let doc = store.load().unwrap().expect("lenient load");
    assert_eq!(doc.version, DOCUMENT_VERSION);
    assert_eq!(doc.profile.level, 2);
    assert!(doc.skill_records.is_empty());
    assert!(doc.sessions.is_empty());
}

#[test]
fn save_failure_surfaces_but_store_recovers() {
    let dir = tempfile::tempdir().unwrap();
    // A directory at the target path makes the rename fail.
    let path = dir.path().join("profile.json");
    std::fs::create_dir_all(&path).unwrap();
    let store = ProfileStore::at_path(path.clone());
    assert!(store.save(&sample_document()).is_err());
    assert!(store.save(&sample_document()).is_err());

    std::fs::remove_dir_all(&path).unwrap();
    store.save(&sample_document()).unwrap();
    assert!(store.load().unwrap().is_some());
}
