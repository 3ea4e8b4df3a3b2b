//! Both commands end-to-end against the mock server.

use std::fs;

use mock_server::{Db, MOCK_TOKEN};
use reqimport_cli::config::Config;
use reqimport_cli::import::{self, ImportArgs, ImportExit};
use reqimport_cli::refresh::{self, RefreshArgs, RefreshExit};
use reqimport_cli::transport::UreqTransport;
use reqimport_core::{ApiError, HttpRequest, HttpResponse, Transport};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

const DOC_SET: &str = "re_Requirement_Document";
const REL_SET: &str = "re_ReqDocBlockReference";

/// Fails the test if any request is attempted.
struct NoNetwork;

impl Transport for NoNetwork {
    fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        panic!("unexpected request: {} {}", req.method.as_str(), req.path);
    }
}

fn start_server(db: Db) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with_db(listener, db).await
        })
        .unwrap();
    });
    format!("http://{addr}")
}

fn config(base: &str) -> Config {
    Config::from_toml_str(&format!(
        r#"
        [server]
        url = "{base}"

        [auth]
        token = "{MOCK_TOKEN}"

        [import]
        document_id = "DOC"
        pause_every = 0
        "#
    ))
    .unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn seed_document(db: &Db) {
    db.blocking_write()
        .insert(DOC_SET, object(json!({"id": "DOC", "name": "Handbook"})));
}

fn seed_link(db: &Db, related_id: &str) {
    db.blocking_write()
        .insert(REL_SET, object(json!({"source_id": "DOC", "related_id": related_id})));
}

fn import_args(dir: &TempDir) -> ImportArgs {
    ImportArgs {
        input: dir.path().join("import_sequence.json"),
        output: dir.path().join("import_results.json"),
        start_index: None,
        config: None,
    }
}

fn refresh_args(dir: &TempDir) -> RefreshArgs {
    RefreshArgs {
        doc_id: None,
        doc_endpoint: None,
        rel_endpoint: None,
        ids_file: None,
        title: "Doc".to_string(),
        subtitle: "Sub".to_string(),
        dry_run: false,
        output: dir.path().join("updated_document_content.xml"),
        config: None,
    }
}

fn block_refs(content: &str) -> Vec<String> {
    content
        .split("ref-id=\"")
        .skip(1)
        .map(|rest| rest.split('"').next().unwrap().to_string())
        .collect()
}

fn write_sequence(args: &ImportArgs, count: usize) {
    let entries: Vec<Value> = (1..=count)
        .map(|i| {
            json!({
                "req_number": format!("R-{i}"),
                "title": format!("Requirement {i}"),
                "text": format!("Shall do thing {i}"),
                "category": if i % 2 == 0 { "Safety" } else { "Functional" },
                "section": "4.1",
            })
        })
        .collect();
    fs::write(&args.input, serde_json::to_string(&entries).unwrap()).unwrap();
}

// --- import-requirements ---

#[test]
fn missing_input_exits_1_without_network() {
    let dir = TempDir::new().unwrap();
    let exit = import::run(&import_args(&dir), &config("http://unused"), NoNetwork, false).unwrap();
    assert_eq!(exit, ImportExit::MissingInput);
    assert_eq!(exit.code(), 1);
}

#[test]
fn import_writes_results_and_links_requirements() {
    let db = Db::default();
    let base = start_server(db.clone());
    let dir = TempDir::new().unwrap();
    let mut args = import_args(&dir);
    args.start_index = Some(1);
    write_sequence(&args, 4);

    let exit = import::run(&args, &config(&base), UreqTransport::default(), false).unwrap();
    assert_eq!(exit, ImportExit::Completed);

    let results: Value = serde_json::from_str(&fs::read_to_string(&args.output).unwrap()).unwrap();
    assert_eq!(results["summary"]["total_attempted"], 3);
    assert_eq!(results["summary"]["successful"], 3);
    assert_eq!(results["summary"]["failed"], 0);
    assert_eq!(results["created"][0]["req_number"], "R-2");

    let store = db.blocking_read();
    assert_eq!(store.items("re_Requirement").len(), 3);
    let links = store.items(REL_SET);
    assert_eq!(links.len(), 3);
    assert!(links.iter().all(|l| l["source_id"] == "DOC" && l["behavior"] == "hard_fixed"));
}

#[test]
fn import_dry_run_stops_after_authentication() {
    let db = Db::default();
    let base = start_server(db.clone());
    let dir = TempDir::new().unwrap();
    let args = import_args(&dir);
    write_sequence(&args, 2);

    let exit = import::run(&args, &config(&base), UreqTransport::default(), true).unwrap();
    assert_eq!(exit, ImportExit::DryRun);
    assert!(!args.output.exists());
    assert!(db.blocking_read().items("re_Requirement").is_empty());
}

#[test]
fn import_without_credentials_is_an_error() {
    let dir = TempDir::new().unwrap();
    let args = import_args(&dir);
    write_sequence(&args, 1);
    let config = Config::from_toml_str("[server]\nurl = \"http://unused\"\n").unwrap();
    assert!(import::run(&args, &config, NoNetwork, false).is_err());
}

// --- refresh-document ---

#[test]
fn refresh_updates_document_with_unique_linked_ids() {
    let db = Db::default();
    let base = start_server(db.clone());
    seed_document(&db);
    for id in ["R1", "R2", "R1", "R3"] {
        seed_link(&db, id);
    }
    let dir = TempDir::new().unwrap();
    let args = refresh_args(&dir);

    let exit = refresh::run(&args, &config(&base), UreqTransport::default()).unwrap();
    assert_eq!(exit, RefreshExit::Updated);

    let written = fs::read_to_string(&args.output).unwrap();
    assert_eq!(block_refs(&written), vec!["R1", "R2", "R3"]);
    let store = db.blocking_read();
    assert_eq!(store.get(DOC_SET, "DOC").unwrap()["content"], written.as_str());
}

#[test]
fn refresh_dry_run_writes_review_copy_only() {
    let db = Db::default();
    let base = start_server(db.clone());
    seed_document(&db);
    seed_link(&db, "R1");
    let dir = TempDir::new().unwrap();
    let mut args = refresh_args(&dir);
    args.dry_run = true;

    let exit = refresh::run(&args, &config(&base), UreqTransport::default()).unwrap();
    assert_eq!(exit, RefreshExit::DryRun);
    assert_eq!(exit.code(), 0);
    assert!(args.output.exists());
    assert!(db.blocking_read().get(DOC_SET, "DOC").unwrap().get("content").is_none());
}

#[test]
fn refresh_with_no_links_exits_1_and_writes_nothing() {
    let db = Db::default();
    let base = start_server(db.clone());
    seed_document(&db);
    let dir = TempDir::new().unwrap();
    let args = refresh_args(&dir);

    let exit = refresh::run(&args, &config(&base), UreqTransport::default()).unwrap();
    assert_eq!(exit.code(), 1);
    assert!(!args.output.exists());
}

#[test]
fn refresh_missing_ids_file_exits_2() {
    let dir = TempDir::new().unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(dir.path().join("ids.json"));

    let exit = refresh::run(&args, &config("http://unused"), NoNetwork).unwrap();
    assert_eq!(exit, RefreshExit::MissingIdsFile);
    assert_eq!(exit.code(), 2);
}

#[test]
fn refresh_ids_file_overrides_links_and_dedupes() {
    let db = Db::default();
    let base = start_server(db.clone());
    seed_document(&db);
    seed_link(&db, "IGNORED");
    let dir = TempDir::new().unwrap();
    let ids_file = dir.path().join("ids.json");
    fs::write(&ids_file, r#"["X", "Y", "X"]"#).unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(ids_file);

    let exit = refresh::run(&args, &config(&base), UreqTransport::default()).unwrap();
    assert_eq!(exit, RefreshExit::Updated);
    assert_eq!(block_refs(&fs::read_to_string(&args.output).unwrap()), vec!["X", "Y"]);
}

#[test]
fn refresh_malformed_ids_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let ids_file = dir.path().join("ids.json");
    fs::write(&ids_file, r#"{"ids": ["X"]}"#).unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(ids_file);

    assert!(refresh::run(&args, &config("http://unused"), NoNetwork).is_err());
}

#[test]
fn refresh_update_failure_exits_3_after_writing_review_copy() {
    let db = Db::default();
    let base = start_server(db.clone());
    seed_link(&db, "R1");
    let dir = TempDir::new().unwrap();
    let args = refresh_args(&dir);

    let exit = refresh::run(&args, &config(&base), UreqTransport::default()).unwrap();
    assert_eq!(exit, RefreshExit::UpdateFailed);
    assert_eq!(exit.code(), 3);
    assert!(args.output.exists());
}

#[test]
fn refresh_missing_ids_file_exits_2_without_credentials() {
    let dir = TempDir::new().unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(dir.path().join("ids.json"));

    let exit = refresh::run(&args, &Config::from_toml_str("").unwrap(), NoNetwork).unwrap();
    assert_eq!(exit.code(), 2);
}

#[test]
fn refresh_dry_run_from_ids_file_needs_no_credentials() {
    let dir = TempDir::new().unwrap();
    let ids_file = dir.path().join("ids.json");
    fs::write(&ids_file, r#"["A", "B"]"#).unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(ids_file);
    args.dry_run = true;

    let exit = refresh::run(&args, &Config::from_toml_str("").unwrap(), NoNetwork).unwrap();
    assert_eq!(exit, RefreshExit::DryRun);
    assert_eq!(block_refs(&fs::read_to_string(&args.output).unwrap()), vec!["A", "B"]);
}

#[test]
fn refresh_treats_padded_ids_as_the_same_id() {
    let dir = TempDir::new().unwrap();
    let ids_file = dir.path().join("ids.json");
    fs::write(&ids_file, r#"["A", " A", "B "]"#).unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(ids_file);
    args.dry_run = true;

    let exit = refresh::run(&args, &config("http://unused"), NoNetwork).unwrap();
    assert_eq!(exit, RefreshExit::DryRun);
    assert_eq!(block_refs(&fs::read_to_string(&args.output).unwrap()), vec!["A", "B"]);
}

#[test]
fn refresh_blank_ids_exit_1_and_leave_document_alone() {
    let dir = TempDir::new().unwrap();
    let ids_file = dir.path().join("ids.json");
    fs::write(&ids_file, r#"["", "  "]"#).unwrap();
    let mut args = refresh_args(&dir);
    args.ids_file = Some(ids_file);

    let exit = refresh::run(&args, &config("http://unused"), NoNetwork).unwrap();
    assert_eq!(exit, RefreshExit::NoIds);
    assert!(!args.output.exists());
}

#[test]
fn import_accepts_numeric_fields() {
    let db = Db::default();
    let base = start_server(db.clone());
    let dir = TempDir::new().unwrap();
    let args = import_args(&dir);
    fs::write(
        &args.input,
        r#"[{"req_number":"R-1","title":"First"},{"req_number":2,"chapter":3,"title":"Second"}]"#,
    )
    .unwrap();

    let exit = import::run(&args, &config(&base), UreqTransport::default(), false).unwrap();
    assert_eq!(exit, ImportExit::Completed);

    let results: Value = serde_json::from_str(&fs::read_to_string(&args.output).unwrap()).unwrap();
    assert_eq!(results["summary"]["successful"], 2);
    assert_eq!(results["created"][1]["req_number"], "2");
}
