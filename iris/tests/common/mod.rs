#![allow(dead_code)]

use std::path::Path;

use iris::credentials::{CredentialStore, ScriptedPrompter};
use iris::session::{AuthOptions, Session};
use iris::transport::{Method, ScriptedTransport};
use iris::versions::{AddressingContext, SnapshotDescriptor};
use serde_json::json;

pub const HOST: &str = "vip1";

pub fn store(dir: &Path) -> CredentialStore<ScriptedPrompter> {
    CredentialStore::with_prompter(dir, ScriptedPrompter::new(Vec::<String>::new()))
}

/// Adds a successful token exchange for [`HOST`] to `transport`.
pub fn with_token(transport: ScriptedTransport) -> ScriptedTransport {
    transport.on_json(
        Method::Post,
        "https://vip1/irisservices/api/v1/public/accessTokens",
        201,
        &json!({"accessToken": "tok", "tokenType": "Bearer"}),
    )
}

/// A session authenticated against [`HOST`] over `transport`.
pub fn connected(transport: ScriptedTransport) -> Session<ScriptedTransport> {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::with_transport(with_token(transport));
    let outcome = session.authenticate(
        &AuthOptions::direct(HOST, "admin", "local").with_password("pw"),
        &store(dir.path()),
    );
    assert!(outcome.is_connected(), "{:?}", outcome);
    session
}

pub fn addressing() -> AddressingContext {
    AddressingContext {
        attempt_num: "1".into(),
        cluster_id: "11".into(),
        cluster_incarnation_id: "22".into(),
        entity_id: "33".into(),
        job_id: "44".into(),
        job_instance_id: "55".into(),
        job_start_time_usecs: "1590000000000000".into(),
        job_uid_object_id: "44".into(),
    }
}

pub fn snapshot(backup_type: Option<i64>) -> SnapshotDescriptor {
    SnapshotDescriptor {
        run_instance_id: 55,
        attempt_num: "1".into(),
        job_start_time_usecs: 1_590_000_000_000_000,
        snapshot_timestamp_usecs: 1_590_000_000_000_000,
        backup_type,
        addressing: addressing(),
    }
}
