use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_rr<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_rr"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute rr binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_rr(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "rr command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

const SEED_JSON: &str = r#"{
  "sectors": [
    { "id": 1, "name": "Banking" },
    { "id": 2, "name": "Insurance" }
  ],
  "issues": [
    { "id": 10, "sector_id": 2, "name": "Claim handling", "code": "CL" }
  ],
  "products": [
    { "id": 20, "sector_id": 2, "name": "Motor policy", "code": "MP" }
  ],
  "outcomes": [
    { "id": 30, "name": "Upheld" }
  ],
  "providers": [
    { "id": 41, "name": "Beta Insurance" }
  ],
  "decisions": [
    {
      "decision_id": 100,
      "case_reference_number": "CASE/100",
      "complaint_id": 1100,
      "sector_id": 2,
      "issue_id": 10,
      "product_id": 20,
      "outcome_id": 30,
      "provider_ids": [41],
      "year_of_decision": 1700000000,
      "published_date": 1700000000,
      "published": true,
      "court_appeal": false,
      "language": "en",
      "complainant": "Individual",
      "file_path": "/decisions/100.pdf",
      "file_id": 5100
    },
    {
      "decision_id": 101,
      "case_reference_number": "CASE/101",
      "complaint_id": 1101,
      "sector_id": 2,
      "issue_id": 10,
      "product_id": 20,
      "outcome_id": 30,
      "provider_ids": [41],
      "year_of_decision": 1700000000,
      "published_date": 1700000000,
      "published": true,
      "court_appeal": true,
      "language": "en",
      "complainant": "Company",
      "file_path": "/decisions/101.pdf",
      "file_id": 5101
    }
  ]
}"#;

// Test IDs: TCLI-001
#[test]
fn db_schema_version_and_migrate_round_trip() {
    let dir = unique_temp_dir("redress-cli-db");
    let db = dir.join("register.sqlite3");

    let before = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&before, "current_version"), 0);
    assert_eq!(before.get("up_to_date"), Some(&Value::Bool(false)));

    let migrated = run_json(["--db", path_str(&db), "db", "migrate"]);
    assert_eq!(migrated.get("after_version").and_then(Value::as_i64), Some(1));

    let after = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&after, "current_version"), 1);
    assert_eq!(after.get("up_to_date"), Some(&Value::Bool(true)));
    assert_eq!(as_str(&after, "contract_version"), "cli.v1");

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-002
#[test]
fn seed_then_query_decisions_from_the_command_line() {
    let dir = unique_temp_dir("redress-cli-decisions");
    let db = dir.join("register.sqlite3");
    let seed_file = dir.join("seed.json");
    fs::write(&seed_file, SEED_JSON)
        .unwrap_or_else(|err| panic!("failed to write seed file: {err}"));

    let summary = run_json(["--db", path_str(&db), "db", "seed", "--file", path_str(&seed_file)]);
    assert_eq!(as_i64(&summary, "decisions"), 2);

    let page = run_json([
        "--db",
        path_str(&db),
        "decisions",
        "query",
        "--sector",
        "2",
        "--limit",
        "1",
        "--page",
        "2",
    ]);
    assert_eq!(as_i64(&page, "page"), 2);
    assert_eq!(as_i64(&page, "pages"), 2);
    let decisions = page
        .get("decisions")
        .and_then(Value::as_object)
        .unwrap_or_else(|| panic!("missing decisions map: {page}"));
    assert_eq!(decisions.keys().collect::<Vec<_>>(), vec!["101"]);
    let projected = decisions
        .get("101")
        .unwrap_or_else(|| panic!("missing decision 101: {page}"));
    assert_eq!(as_str(projected, "court_appeal"), "Appealed");
    assert_eq!(as_str(projected, "provider_names"), "Beta Insurance");

    let issues = run_json(["--db", path_str(&db), "decisions", "issues", "--sector-id", "2"]);
    let issues_list = issues
        .get("payload")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing issues payload: {issues}"));
    assert_eq!(issues_list.len(), 1);

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-003
#[test]
fn complaint_workflow_from_the_command_line() {
    let dir = unique_temp_dir("redress-cli-complaint");
    let db = dir.join("register.sqlite3");

    let complaint = run_json([
        "--db",
        path_str(&db),
        "complaint",
        "init",
        "--user-id",
        "7",
        "--complainant-type-id",
        "2",
    ]);
    let complaint_id = as_i64(&complaint, "id");
    assert_eq!(as_i64(&complaint, "status_id"), 1);
    assert_eq!(as_i64(&complaint, "complaint_section"), 1);

    let updated = run_json([
        "--db",
        path_str(&db),
        "complaint",
        "update-section",
        "--id",
        &complaint_id.to_string(),
        "--section",
        "6",
        "--payload",
        r#"{"first_name":"A"}"#,
    ]);
    assert_eq!(as_i64(&updated, "complaint_section"), 6);

    let receipt = run_json([
        "--db",
        path_str(&db),
        "complaint",
        "submit",
        "--id",
        &complaint_id.to_string(),
    ]);
    let reference = as_str(&receipt, "reference").to_string();
    assert!(reference.starts_with("ASF "));

    let again = run_json([
        "--db",
        path_str(&db),
        "complaint",
        "submit",
        "--id",
        &complaint_id.to_string(),
    ]);
    assert_eq!(as_str(&again, "reference"), reference);
    assert_eq!(again.get("already_submitted"), Some(&Value::Bool(true)));

    let late_edit = run_rr([
        "--db",
        path_str(&db),
        "complaint",
        "update-section",
        "--id",
        &complaint_id.to_string(),
        "--section",
        "2",
        "--payload",
        r#"{"surname":"B"}"#,
    ]);
    assert!(!late_edit.status.success());

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-004
#[test]
fn enquiry_and_director_management_from_the_command_line() {
    let dir = unique_temp_dir("redress-cli-enquiry");
    let db = dir.join("register.sqlite3");

    let next = run_json(["--db", path_str(&db), "enquiry", "next-uid"]);
    let previewed = as_str(&next, "uid").to_string();
    assert!(previewed.starts_with("ENQ_"));

    let created = run_json([
        "--db",
        path_str(&db),
        "enquiry",
        "create",
        "--title-id",
        "1",
        "--name",
        "Maria",
        "--surname",
        "Borg",
        "--contact-number",
        "+356 2133 0000",
        "--email",
        "maria.borg@example.com",
        "--country",
        "MT",
        "--sector",
        "1",
        "--enquiry",
        "Which forms do I need?",
    ]);
    assert_eq!(as_str(&created, "uid"), previewed);

    let complaint = run_json([
        "--db",
        path_str(&db),
        "complaint",
        "init",
        "--complainant-type-id",
        "2",
    ]);
    let complaint_id = as_i64(&complaint, "id").to_string();

    let director = run_json([
        "--db",
        path_str(&db),
        "director",
        "add",
        "--complaint-id",
        &complaint_id,
        "--first-name",
        "Carmen",
        "--last-name",
        "Vella",
    ]);
    assert_eq!(as_i64(&director, "redirect_section"), 5);

    let listed = run_json([
        "--db",
        path_str(&db),
        "director",
        "list",
        "--complaint-id",
        &complaint_id,
    ]);
    let directors = listed
        .get("payload")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing directors payload: {listed}"));
    assert_eq!(directors.len(), 1);

    let removed = run_json([
        "--db",
        path_str(&db),
        "director",
        "remove",
        "--id",
        &as_i64(&director, "director_id").to_string(),
    ]);
    assert_eq!(removed.get("deleted"), Some(&Value::from(as_i64(&director, "director_id"))));

    let _ = fs::remove_dir_all(&dir);
}
