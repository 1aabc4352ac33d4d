mod common;

use chrono::Utc;
use reqwest::Url;
use solarizer::error::SolarizerError;
use solarizer::session::{Credential, ResponseCookie, SessionStore};
use std::sync::Arc;

fn url(path: &str) -> Url {
    Url::parse(common::BASE_URL).unwrap().join(path).unwrap()
}

#[test]
fn apply_then_load_on_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authcookie");

    let store = SessionStore::open(&path, common::scope()).unwrap();
    store.apply("CfDJ8abcdef0123456789").unwrap();

    let loaded = SessionStore::load(&path).unwrap();
    assert_eq!(loaded.value, "CfDJ8abcdef0123456789");

    let reopened = SessionStore::open(&path, common::scope()).unwrap();
    assert_eq!(reopened.current().value, "CfDJ8abcdef0123456789");
}

#[test]
fn missing_file_yields_empty_credential() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/dirs/authcookie");

    let store = SessionStore::open(&path, common::scope()).unwrap();
    assert_eq!(store.current(), Credential::default());
    assert!(store.cookie_header(&url("/")).is_none());
    // Parent directories were created up front
    assert!(path.parent().unwrap().is_dir());
}

#[test]
fn unreadable_session_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the file should be cannot be read as one
    let path = dir.path().join("authcookie");
    std::fs::create_dir(&path).unwrap();

    let err = SessionStore::open(&path, common::scope()).unwrap_err();
    assert!(matches!(err, SolarizerError::Io { .. }));
}

#[test]
fn trailing_newline_is_stripped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authcookie");
    std::fs::write(&path, "token-from-editor\r\n").unwrap();

    assert_eq!(SessionStore::load(&path).unwrap().value, "token-from-editor");
}

#[test]
fn remote_rotation_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authcookie");
    let store = SessionStore::open(&path, common::scope()).unwrap();
    store.apply("first").unwrap();

    let expires = Utc::now() + chrono::Duration::days(14);
    let rotated = store.observe(
        &url("/ActualData/GetCompareDataForPvSystem"),
        &[
            ResponseCookie::new("other", "x"),
            ResponseCookie::new(common::COOKIE_NAME, "second").with_expires(expires),
        ],
    );

    assert!(rotated);
    assert_eq!(store.current().value, "second");
    assert_eq!(store.current().expires, Some(expires));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    assert_eq!(
        store.cookie_header(&url("/")).as_deref(),
        Some(".AspNet.Auth=second")
    );
}

#[test]
fn rotation_survives_a_failed_write() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("state");
    let path = sub.join("authcookie");
    let store = SessionStore::open(&path, common::scope()).unwrap();
    store.apply("first").unwrap();

    // The parent directory turns into a plain file, so the write cannot land
    std::fs::remove_dir_all(&sub).unwrap();
    std::fs::write(&sub, "not a directory").unwrap();

    let rotated = store.observe(
        &url("/ActualData/GetCompareDataForPvSystem"),
        &[ResponseCookie::new(common::COOKIE_NAME, "second")],
    );
    assert!(rotated);
    assert_eq!(store.current().value, "second");
    assert_eq!(
        store.cookie_header(&url("/")).as_deref(),
        Some(format!("{}=second", common::COOKIE_NAME).as_str())
    );

    let err = store.apply("third").unwrap_err();
    assert!(matches!(err, SolarizerError::SessionPersistence { .. }));
    assert_eq!(store.current().value, "third");
}

#[test]
fn unchanged_value_is_not_a_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("authcookie"), common::scope()).unwrap();
    store.apply("same").unwrap();

    assert!(!store.observe(&url("/"), &[ResponseCookie::new(common::COOKIE_NAME, "same")]));
    assert!(!store.observe(&url("/"), &[]));
}

#[test]
fn cookies_from_other_hosts_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authcookie");
    let store = SessionStore::open(&path, common::scope()).unwrap();
    store.apply("mine").unwrap();

    let foreign = Url::parse("https://login.fronius.com/").unwrap();
    assert!(!store.observe(&foreign, &[ResponseCookie::new(common::COOKIE_NAME, "theirs")]));
    assert_eq!(store.current().value, "mine");
    assert!(store.cookie_header(&foreign).is_none());
}

#[test]
fn removal_cookie_clears_credential() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authcookie");
    let store = SessionStore::open(&path, common::scope()).unwrap();
    store.apply("valid").unwrap();

    let past = Utc::now() - chrono::Duration::hours(1);
    assert!(store.observe(
        &url("/Account/Logout"),
        &[ResponseCookie::new(common::COOKIE_NAME, "").with_expires(past)],
    ));
    assert!(store.current().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    assert!(store.cookie_header(&url("/")).is_none());
}

#[test]
fn concurrent_writers_leave_last_value_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authcookie");
    let store = Arc::new(SessionStore::open(&path, common::scope()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                for j in 0..25 {
                    let value = format!("w{}-{}", i, j);
                    if i % 2 == 0 {
                        store.apply(&value).unwrap();
                    } else {
                        store.observe(&url("/"), &[ResponseCookie::new(common::COOKIE_NAME, value)]);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Memory and disk agree on whichever write came last
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, store.current().value);
    assert!(on_disk.starts_with('w'));
}

#[cfg(unix)]
#[test]
fn session_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/authcookie");
    let store = SessionStore::open(&path, common::scope()).unwrap();
    store.apply("secret").unwrap();

    let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    let dir_mode = std::fs::metadata(path.parent().unwrap())
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(file_mode, 0o600);
    assert_eq!(dir_mode, 0o700);
}

#[test]
fn summary_never_exposes_full_token() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("authcookie"), common::scope()).unwrap();
    store.apply("0123456789abcdefghij").unwrap();

    let summary = store.summary();
    assert!(summary.present);
    assert_eq!(summary.length, 20);
    assert_eq!(summary.prefix, "0123456789");
}
