use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use roomkey::session::backend::{FileBackend, MemoryBackend};
use roomkey::session::{Role, Session, SessionStore, TokenPair, UserIdentity};
use roomkey::transport::http::HttpTransport;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("roomkey.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Transport pointed at `<server>/api`, the way the booking API is mounted.
#[allow(dead_code)]
pub fn make_transport(server_uri: &str, timeout: Duration) -> Arc<HttpTransport> {
    let base = url::Url::parse(&format!("{}/api", server_uri)).expect("valid url");
    Arc::new(HttpTransport::new(base, timeout).expect("transport"))
}

#[allow(dead_code)]
pub fn sample_user() -> UserIdentity {
    UserIdentity {
        id: "42".to_string(),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        role: Role::Customer,
    }
}

#[allow(dead_code)]
pub fn memory_store(access: &str, refresh: &str) -> Arc<SessionStore> {
    let store = SessionStore::empty(Arc::new(MemoryBackend::new()));
    store
        .save(Session::new(TokenPair::new(access, refresh), sample_user()))
        .expect("save session");
    Arc::new(store)
}

#[allow(dead_code)]
pub fn file_store(dir: &TempDir) -> Arc<SessionStore> {
    let backend = Arc::new(FileBackend::new(dir.path().join("session.json")));
    Arc::new(SessionStore::load(backend).expect("load store"))
}
