use std::fs;
use std::path::Path;

use iris::credentials::{CredentialStore, ScriptedPrompter};
use iris::date::date_to_usecs;
use iris::session::{AuthOptions, Session};
use iris::transport::{Method, ScriptedTransport};
use irisls::cli::{self, ListOptions};
use irisls::run::{self, Outcome};
use serde_json::{json, Value};

fn store(dir: &Path) -> CredentialStore<ScriptedPrompter> {
    CredentialStore::with_prompter(dir, ScriptedPrompter::new(Vec::<String>::new()))
}

fn with_token(transport: ScriptedTransport) -> ScriptedTransport {
    transport.on_json(
        Method::Post,
        "https://vip1/irisservices/api/v1/public/accessTokens",
        201,
        &json!({"accessToken": "tok", "tokenType": "Bearer"}),
    )
}

fn connected(transport: ScriptedTransport) -> Session<ScriptedTransport> {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::with_transport(with_token(transport));
    let outcome = session.authenticate(
        &AuthOptions::direct("vip1", "admin", "local").with_password("pw"),
        &store(dir.path()),
    );
    assert!(outcome.is_connected(), "{:?}", outcome);
    session
}

fn version(run_id: i64, ts: i64) -> Value {
    json!({
        "instanceId": {
            "attemptNum": 1,
            "jobInstanceId": run_id,
            "jobStartTimeUsecs": ts - 1_000_000,
        },
        "snapshotTimestampUsecs": ts,
    })
}

fn vm_document(name: &str, job: &str, versions: Vec<Value>) -> Value {
    json!({
        "vmDocument": {
            "objectName": name,
            "jobName": job,
            "versions": versions,
            "objectId": {
                "jobId": 7,
                "entity": {"id": 9},
                "jobUid": {"clusterId": 1, "clusterIncarnationId": 2, "objectId": 7},
            },
        }
    })
}

// 2020-05-20 and 2020-05-21, newest first as the cluster returns them
const OLDER: i64 = 1_589_976_000_000_000;
const NEWER: i64 = 1_590_062_400_000_000;

fn search_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .on_json(
            Method::Get,
            "/searchvms?",
            200,
            &json!({"vms": [
                vm_document("vm1", "Nightly", vec![version(102, NEWER), version(101, OLDER)]),
                vm_document("other", "Nightly", vec![version(300, NEWER)]),
            ]}),
        )
        .on_json(
            Method::Get,
            "jobInstanceId=102&",
            200,
            &json!({"entries": [
                {"name": "b.txt", "type": "kFile", "fullPath": "/b.txt"},
                {"name": "a.txt", "type": "kFile", "fullPath": "/a.txt"},
            ]}),
        )
        .on_json(
            Method::Get,
            "jobInstanceId=101&",
            200,
            &json!({"entries": [{"name": "old.txt", "type": "kFile", "fullPath": "/old.txt"}]}),
        )
}

fn options(out: &Path, extra: &[&str]) -> ListOptions {
    let out = out.to_str().unwrap();
    let mut argv = vec!["irisls", "-v", "vip1", "-s", "VM1", "-j", "nightly", "-o", out];
    argv.extend_from_slice(extra);
    ListOptions::from_matches(&cli::app().get_matches_from(argv)).unwrap()
}

fn written(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn unknown_object_is_not_found() {
    let out = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new().on_json(Method::Get, "/searchvms?", 200, &json!({}));
    let session = connected(transport);

    let outcome = run::list(&session, &options(out.path(), &[])).unwrap();
    assert_eq!(outcome, Outcome::NotFound("VM1 not found".to_string()));
    assert_eq!(outcome.exit_code(), run::EXIT_NOT_FOUND);
    assert!(written(out.path()).is_empty());
}

#[test]
fn wrong_job_is_not_protected() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());
    let mut opts = options(out.path(), &[]);
    opts.job = "Weekly".to_string();

    let outcome = run::list(&session, &opts).unwrap();
    assert_eq!(outcome, Outcome::NotFound("VM1 not protected by Weekly".to_string()));
    assert!(session.transport().urls().iter().all(|u| !u.contains("directoryList")));
}

#[test]
fn latest_version_is_listed_by_default() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());
    let opts = options(out.path(), &[]);

    assert_eq!(run::list(&session, &opts).unwrap(), Outcome::Done);

    let names = written(out.path());
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("backedUpFiles-VM1-102-"), "{}", names[0]);
    assert!(names[0].ends_with(".txt"));
    let content = fs::read_to_string(out.path().join(&names[0])).unwrap();
    assert_eq!(content, "/a.txt\n/b.txt\n");
}

#[test]
fn run_id_selects_that_version() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());

    assert_eq!(run::list(&session, &options(out.path(), &["-r", "101"])).unwrap(), Outcome::Done);
    let names = written(out.path());
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("backedUpFiles-VM1-101-"));
    assert_eq!(fs::read_to_string(out.path().join(&names[0])).unwrap(), "/old.txt\n");
}

#[test]
fn missing_run_id_is_reported() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());

    let outcome = run::list(&session, &options(out.path(), &["-r", "999"])).unwrap();
    assert_eq!(outcome, Outcome::NotFound("Run ID not found".to_string()));
}

#[test]
fn file_date_after_every_version_finds_nothing() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());

    let outcome = run::list(&session, &options(out.path(), &["-f", "2100-01-01 00:00:00"])).unwrap();
    assert_eq!(outcome, Outcome::NotFound("No backups from the specified date".to_string()));
    assert!(written(out.path()).is_empty());
}

#[test]
fn file_date_picks_the_oldest_version_at_or_after_it() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());

    let outcome = run::list(&session, &options(out.path(), &["-f", "2000-01-01"])).unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(written(out.path())[0].starts_with("backedUpFiles-VM1-101-"));
}

#[test]
fn list_files_writes_one_file_per_version() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());

    assert_eq!(run::list(&session, &options(out.path(), &["-k"])).unwrap(), Outcome::Done);
    let names = written(out.path());
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("backedUpFiles-VM1-101-"));
    assert!(names[1].starts_with("backedUpFiles-VM1-102-"));
}

#[test]
fn show_versions_writes_nothing() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(search_transport());

    assert_eq!(run::list(&session, &options(out.path(), &["-l"])).unwrap(), Outcome::Done);
    assert!(written(out.path()).is_empty());
    assert!(session.transport().urls().iter().all(|u| !u.contains("directoryList")));
}

#[test]
fn separators_in_the_source_name_stay_inside_the_output_dir() {
    let out = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new()
        .on_json(
            Method::Get,
            "/searchvms?",
            200,
            &json!({"vms": [vm_document("lab/vm1", "Nightly", vec![version(102, NEWER)])]}),
        )
        .on_json(
            Method::Get,
            "jobInstanceId=102&",
            200,
            &json!({"entries": [{"name": "a.txt", "type": "kFile", "fullPath": "/a.txt"}]}),
        );
    let session = connected(transport);
    let mut opts = options(out.path(), &[]);
    opts.source = "lab/vm1".to_string();

    assert_eq!(run::list(&session, &opts).unwrap(), Outcome::Done);
    let names = written(out.path());
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("backedUpFiles-lab_vm1-102-"), "{}", names[0]);
    assert!(out.path().join(&names[0]).is_file());
}

fn june_transport() -> ScriptedTransport {
    let at = |date: &str| date_to_usecs(date).unwrap();
    ScriptedTransport::new().on_json(
        Method::Get,
        "/searchvms?",
        200,
        &json!({"vms": [vm_document("vm1", "Nightly", vec![
            version(5, at("2020-07-01 00:00:00")),
            version(4, at("2020-06-30 23:59:59")),
            version(3, at("2020-06-15 12:00:00")),
            version(2, at("2020-06-01 00:00:00")),
            version(1, at("2020-05-31 23:59:59")),
        ])]}),
    )
}

fn listed_runs(session: &Session<ScriptedTransport>) -> Vec<String> {
    session
        .transport()
        .urls()
        .into_iter()
        .filter(|u| u.contains("/vm/directoryList?"))
        .filter_map(|u| {
            u.split('&')
                .find(|p| p.starts_with("jobInstanceId="))
                .map(|p| p["jobInstanceId=".len()..].to_string())
        })
        .collect()
}

#[test]
fn date_range_keeps_versions_on_both_bounds_in_server_order() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(june_transport());
    let opts = options(
        out.path(),
        &["-k", "-t", "2020-06-01 00:00:00", "-e", "2020-06-30 23:59:59"],
    );

    assert_eq!(run::list(&session, &opts).unwrap(), Outcome::Done);
    assert_eq!(listed_runs(&session), vec!["4", "3", "2"]);
    let names = written(out.path());
    assert_eq!(names.len(), 3);
    assert!(names[0].starts_with("backedUpFiles-VM1-2-"));
    assert!(names[1].starts_with("backedUpFiles-VM1-3-"));
    assert!(names[2].starts_with("backedUpFiles-VM1-4-"));
}

#[test]
fn open_ended_range_with_show_versions_lists_no_files() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(june_transport());
    let opts = options(out.path(), &["-l", "-t", "2020-06-15 12:00:00"]);

    assert_eq!(run::list(&session, &opts).unwrap(), Outcome::Done);
    assert!(listed_runs(&session).is_empty());
    assert!(written(out.path()).is_empty());
}

#[test]
fn end_only_range_lists_files_up_to_the_bound() {
    let out = tempfile::tempdir().unwrap();
    let session = connected(june_transport());
    let opts = options(out.path(), &["-e", "2020-06-01 00:00:00"]);

    assert!(opts.lists_versions());
    assert_eq!(run::list(&session, &opts).unwrap(), Outcome::Done);
    // without -k the range only prints the version table
    assert!(written(out.path()).is_empty());

    let opts = options(out.path(), &["-k", "-e", "2020-06-01 00:00:00"]);
    assert_eq!(run::list(&session, &opts).unwrap(), Outcome::Done);
    assert_eq!(listed_runs(&session), vec!["2", "1"]);
}

#[test]
fn execute_reports_failed_login() {
    let config = tempfile::tempdir().unwrap();
    let matches = cli::app().get_matches_from(vec![
        "irisls", "-v", "vip1", "-p", "bad", "-s", "vm1", "-j", "Nightly",
    ]);
    let transport = ScriptedTransport::new().on_json(
        Method::Post,
        "/public/accessTokens",
        401,
        &json!({"errorCode": "KStatusUnauthorized", "message": "bad credentials"}),
    );
    let mut session = Session::with_transport(transport);

    let code = run::execute(&matches, &mut session, &store(config.path())).unwrap();
    assert_eq!(code, run::EXIT_NOT_FOUND);
    assert!(!session.is_connected());
    assert_eq!(session.transport().requests().len(), 1);
}

#[test]
fn execute_lists_latest_version() {
    let config = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let matches = cli::app().get_matches_from(vec![
        "irisls",
        "-v",
        "vip1",
        "-p",
        "pw",
        "-s",
        "vm1",
        "-j",
        "Nightly",
        "-o",
        out.path().to_str().unwrap(),
    ]);
    let mut session = Session::with_transport(with_token(search_transport()));

    let code = run::execute(&matches, &mut session, &store(config.path())).unwrap();
    assert_eq!(code, run::EXIT_OK);
    assert_eq!(written(out.path()).len(), 1);
    // a supplied password is never persisted
    assert!(written(config.path()).is_empty());
}
