use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use tempfile::TempDir;

fn sqlreflect(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_sqlreflect"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sqlreflect")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn write_yaml_schema(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("schema.yaml");
    fs::write(
        &path,
        r#"Game:
  name: TEXT
Cred:
  username: TEXT
  game: "@Game"
  friends: "[]@Cred"
  name:
    first: TEXT
    last: TEXT
"#,
    )
    .expect("failed to write schema");
    path
}

// ---------------------------------------------------------------------------
// normalize / ddl
// ---------------------------------------------------------------------------

#[test]
fn normalize_prints_descriptors_as_json() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);

    let output = sqlreflect(&["normalize", "--schema", path_str(&schema)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let tables: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let entities: Vec<&str> = tables
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["entity"].as_str().unwrap())
        .collect();
    assert_eq!(entities, vec!["Game", "Cred", "_t0"]);
}

#[test]
fn normalize_supports_yaml_output() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);

    let output = sqlreflect(&["normalize", "--schema", path_str(&schema), "--format", "yaml"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("entity: Cred"));
}

#[test]
fn normalize_merges_files_and_directories() {
    let dir = TempDir::new().unwrap();
    let core = dir.path().join("core.json");
    fs::write(&core, r#"{"Game": {"name": "TEXT"}}"#).unwrap();
    let plugins = dir.path().join("plugins");
    fs::create_dir(&plugins).unwrap();
    fs::write(plugins.join("cred.yaml"), "Cred:\n  game: '@Game'\n").unwrap();

    let output = sqlreflect(&[
        "normalize",
        "--schema",
        path_str(&core),
        "--schema",
        path_str(&plugins),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("\"Game\""));
    assert!(out.contains("\"Cred\""));
}

#[test]
fn normalize_reports_schema_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{"Cred": {"game": "@Nope"}}"#).unwrap();

    let output = sqlreflect(&["normalize", "--schema", path_str(&path)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("error: Failed to normalize schema"));
}

#[test]
fn ddl_prints_create_statements() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);

    let output = sqlreflect(&["ddl", "--schema", path_str(&schema)]);
    assert!(output.status.success());
    let sql = stdout(&output);
    assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"game\""));
    assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"cred_friends\""));
    assert!(sql.contains("ON DELETE CASCADE"));

    let output = sqlreflect(&["ddl", "--schema", path_str(&schema), "--entity", "Game"]);
    assert!(output.status.success());
    assert!(!stdout(&output).contains("\"cred\""));

    let output = sqlreflect(&["ddl", "--schema", path_str(&schema), "--entity", "Nope"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown entity 'Nope'"));
}

// ---------------------------------------------------------------------------
// tables
// ---------------------------------------------------------------------------

#[test]
fn tables_up_status_down() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);
    let db = dir.path().join("store.db");
    let base = ["--schema", path_str(&schema), "--db", path_str(&db)];

    let status = sqlreflect(&[&["tables", "status"][..], &base[..]].concat());
    assert!(status.status.success(), "stderr: {}", stderr(&status));
    assert!(stdout(&status).contains("Tables exist: no"));

    let up = sqlreflect(&[&["tables", "up"][..], &base[..]].concat());
    assert!(up.status.success(), "stderr: {}", stderr(&up));
    assert!(db.exists());

    let status = sqlreflect(&[&["tables", "status", "--json"][..], &base[..]].concat());
    assert!(status.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&status)).unwrap();
    let tables = json["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 4);
    assert!(tables.iter().all(|t| t["exists"] == true && t["rows"] == 0));

    let down = sqlreflect(&[&["tables", "down"][..], &base[..]].concat());
    assert!(down.status.success());
    let status = sqlreflect(&[&["tables", "status"][..], &base[..]].concat());
    assert!(stdout(&status).contains("Tables exist: no"));
}

#[test]
fn tables_up_for_one_entity() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);
    let db = dir.path().join("store.db");
    let base = ["--schema", path_str(&schema), "--db", path_str(&db)];

    let up = sqlreflect(&[&["tables", "up", "--entity", "Game"][..], &base[..]].concat());
    assert!(up.status.success(), "stderr: {}", stderr(&up));

    let status = sqlreflect(&[&["tables", "status", "--json"][..], &base[..]].concat());
    let json: serde_json::Value = serde_json::from_str(&stdout(&status)).unwrap();
    let exists: Vec<(&str, bool)> = json["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| (t["name"].as_str().unwrap(), t["exists"].as_bool().unwrap()))
        .collect();
    assert!(exists.contains(&("game", true)));
    assert!(exists.contains(&("cred", false)));
}

#[test]
fn tables_reads_database_path_from_config() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);
    let db = dir.path().join("configured.db");
    let config = dir.path().join("store.yaml");
    fs::write(
        &config,
        format!("path: {}\njournal_mode: DELETE\n", path_str(&db)),
    )
    .unwrap();

    let up = sqlreflect(&[
        "tables",
        "up",
        "--schema",
        path_str(&schema),
        "--config",
        path_str(&config),
    ]);
    assert!(up.status.success(), "stderr: {}", stderr(&up));
    assert!(db.exists());
}

#[test]
fn tables_requires_a_database() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);

    let output = sqlreflect(&["tables", "up", "--schema", path_str(&schema)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no database given"));
}

#[test]
fn verbose_logs_to_stderr() {
    let dir = TempDir::new().unwrap();
    let schema = write_yaml_schema(&dir);
    let db = dir.path().join("store.db");

    let output = sqlreflect(&[
        "--verbose",
        "tables",
        "up",
        "--schema",
        path_str(&schema),
        "--db",
        path_str(&db),
    ]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("DEBUG"));
    assert!(!stdout(&output).contains("DEBUG"));
}
