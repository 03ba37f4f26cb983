//! Schema files, an on-disk store, and the per-thread factory.
//!
//! Loads a schema from YAML and JSON definition files, persists objects to
//! a database file, and reopens it with a fresh factory to show that rows
//! survive while identity does not.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p sqlreflect-demos --example file_store
//! ```

use serde_json::json;
use sqlreflect_db::{SchemaLoader, StoreConfig};
use sqlreflect_sqlite::{Factory, global};

fn main() {
    // === Step 1: Write definition files ===
    let dir = tempfile::tempdir().unwrap();
    let games = dir.path().join("games.json");
    std::fs::write(&games, r#"{"Game": {"name": "TEXT"}}"#).unwrap();
    let creds = dir.path().join("creds.yaml");
    std::fs::write(
        &creds,
        "Cred:\n  username: TEXT\n  game: '@Game'\n  addresses:\n    - street: TEXT\n      city: TEXT\n",
    )
    .unwrap();

    let raw = SchemaLoader::new().file(&games).file(&creds).build().unwrap();
    println!("=== Loaded {} entities ===", raw.len());
    let schema = raw.normalize().unwrap();

    // === Step 2: Persist through the thread factory ===
    let db = dir.path().join("store.db");
    let factory = Factory::new(schema.clone(), StoreConfig::at(&db));
    factory.create_tables().unwrap();
    global::install(factory);

    let cred = global::entity("Cred")
        .unwrap()
        .create(json!({
            "username": "bill",
            "game": {"name": "g1"},
            "addresses": [{"street": "Main", "city": "Springfield"}]
        }))
        .unwrap();
    println!("stored {}", cred.to_json().unwrap());
    let idx = cred.idx();

    // === Step 3: Reopen with a fresh factory ===
    let fresh = Factory::new(schema, StoreConfig::at(&db));
    let reloaded = fresh.entity("Cred").unwrap().get(idx).unwrap().unwrap();
    println!("reloaded {}", reloaded.to_json().unwrap());
    println!("same row: {}", reloaded.to_json().unwrap() == cred.to_json().unwrap());
    println!("same instance: {}", reloaded == cred);

    let address = reloaded.array("addresses").unwrap().get(0).unwrap().unwrap();
    println!("address city: {:?}", address.get("city").unwrap().as_str());

    global::uninstall();
}
