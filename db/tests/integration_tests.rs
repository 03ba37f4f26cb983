use std::io::Write;
use std::path::Path;

use sqlreflect_core::FieldKind;
use sqlreflect_db::{LoadError, RawSchema, SchemaLoader, SchemaSource, StoreConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_file(dir: &Path, name: &str, contents: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f.flush().unwrap();
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

#[test]
fn test_json_and_yaml_files_normalize_identically() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "app.json",
        r#"{"Game": {"name": "TEXT"}, "Cred": {"username": "TEXT", "game": "@Game"}}"#,
    );
    write_file(
        dir.path(),
        "app.yaml",
        "Game:\n  name: TEXT\nCred:\n  username: TEXT\n  game: '@Game'\n",
    );

    let from_json = RawSchema::from_file(dir.path().join("app.json")).unwrap().normalize().unwrap();
    let from_yaml = RawSchema::from_file(dir.path().join("app.yaml")).unwrap().normalize().unwrap();
    assert_eq!(from_json, from_yaml);

    let cred = from_json.get("Cred").unwrap();
    assert!(matches!(
        &cred.field("game").unwrap().kind,
        FieldKind::Reference { target, .. } if target == "Game"
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RawSchema::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, LoadError::IoError(_)));
}

#[test]
fn test_malformed_yaml_is_yaml_error() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "bad.yml", "Game: [unclosed\n");
    let err = RawSchema::from_file(dir.path().join("bad.yml")).unwrap_err();
    assert!(matches!(err, LoadError::YamlError(_)));
}

// ---------------------------------------------------------------------------
// Directory loading
// ---------------------------------------------------------------------------

#[test]
fn test_directory_loading_in_file_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "b_games.yaml", "Game:\n  name: TEXT\n");
    write_file(dir.path(), "a_creds.json", r#"{"Cred": {"game": "@Game"}}"#);
    write_file(dir.path(), "notes.txt", "ignored");

    let raw = RawSchema::from_dir(dir.path()).unwrap();
    assert_eq!(raw.entity_names().collect::<Vec<_>>(), vec!["Cred", "Game"]);
    assert_eq!(raw.sources(), &[SchemaSource::Directory(dir.path().to_path_buf())]);

    // Forward references across files resolve after merging.
    let schema = raw.normalize().unwrap();
    assert_eq!(schema.len(), 2);
}

#[test]
fn test_directory_duplicate_entity() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "one.json", r#"{"Game": {}}"#);
    write_file(dir.path(), "two.json", r#"{"Game": {"name": "TEXT"}}"#);

    let err = RawSchema::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::DuplicateEntity(name) if name == "Game"));
}

// ---------------------------------------------------------------------------
// Loader builder
// ---------------------------------------------------------------------------

#[test]
fn test_loader_merges_files_and_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let plugins = dir.path().join("plugins");
    std::fs::create_dir_all(&plugins).unwrap();

    write_file(dir.path(), "core.json", r#"{"User": {"name": "TEXT"}}"#);
    write_file(&plugins, "posts.yaml", "Post:\n  author: '@User'\n  tags: '[]@Tag'\n");
    write_file(&plugins, "tags.yaml", "Tag:\n  label: TEXT\n");

    let raw = SchemaLoader::new()
        .file(dir.path().join("core.json"))
        .path(&plugins)
        .build()
        .unwrap();
    assert_eq!(raw.len(), 3);

    let schema = raw.normalize().unwrap();
    let post = schema.get("Post").unwrap();
    assert!(post.field("tags").unwrap().is_array());
}

#[test]
fn test_loader_reports_duplicate_between_sources() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.json", r#"{"User": {}}"#);
    write_file(dir.path(), "b.yaml", "User: {}\n");

    let err = SchemaLoader::new()
        .file(dir.path().join("a.json"))
        .file(dir.path().join("b.yaml"))
        .build()
        .unwrap_err();
    assert!(matches!(err, LoadError::DuplicateEntity(_)));
}

// ---------------------------------------------------------------------------
// Store configuration
// ---------------------------------------------------------------------------

#[test]
fn test_store_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "store.yaml", "path: data/app.db\njournal_mode: DELETE\n");

    let config = StoreConfig::load(dir.path().join("store.yaml")).unwrap();
    assert_eq!(config.location(), "data/app.db");
    assert_eq!(config.journal_mode, "DELETE");
    assert!(config.foreign_keys);
}
