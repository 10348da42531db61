use psegli::cookies::CookieBundle;
use psegli::persistence::{PersistenceManager, PersistentState};

#[test]
fn default_state_values() {
    let s = PersistentState::default();
    assert!(s.cookie.is_none());
    assert!(s.last_sync.is_none());
    assert_eq!(s.last_sync_records, 0);
}

#[test]
fn cookie_and_sync_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    let path = path.to_string_lossy().to_string();

    let mut mgr = PersistenceManager::new(&path);
    mgr.load().unwrap();
    mgr.record_cookie(&CookieBundle::parse("MM_SID=m; __RequestVerificationToken=t"))
        .unwrap();
    mgr.record_sync(42).unwrap();

    let mut mgr2 = PersistenceManager::new(&path);
    mgr2.load().unwrap();
    let cookie = mgr2.cookie().unwrap();
    assert_eq!(
        cookie.to_header_string(),
        "MM_SID=m; __RequestVerificationToken=t"
    );
    assert_eq!(mgr2.state().last_sync_records, 42);
    assert!(mgr2.state().cookie_updated_at.is_some());
    assert!(mgr2.state().last_sync.is_some());
}

#[test]
fn stored_cookie_without_allowed_names_is_ignored() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), r#"{"cookie":"foo=bar"}"#).unwrap();

    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    mgr.load().unwrap();
    assert!(mgr.cookie().is_none());
}

#[test]
fn corrupt_file_is_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), "not json").unwrap();

    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    assert!(mgr.load().is_err());
}
