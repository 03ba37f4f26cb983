//! Live object workflow over an in-memory store.
//!
//! Normalizes a nested schema, creates its tables, then walks through
//! construction, lookups, write-through updates, arrays, and cascading
//! deletes.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p sqlreflect-demos --example quickstart
//! ```

use serde_json::json;
use sqlreflect_db::StoreConfig;
use sqlreflect_sqlite::{Factory, Filter, Input, generate_schema_sql};

fn main() {
    // === Step 1: Normalize and create tables ===
    let raw = json!({
        "Game": {"name": "TEXT", "$append": "UNIQUE(\"name\")"},
        "Cred": {
            "username": "VARCHAR(32)",
            "game": "@Game",
            "friends": "[]@Cred",
            "name": {"first": "TEXT", "last": "TEXT"}
        }
    });
    let factory = Factory::from_raw(&raw, StoreConfig::in_memory()).unwrap();

    println!("=== Normalized entities ===");
    for table in factory.schema().tables() {
        let kind = if table.synthetic { " (synthetic)" } else { "" };
        println!("  {} -> table \"{}\"{kind}", table.entity, table.table);
    }
    println!("\n=== DDL ===\n{}", generate_schema_sql(factory.schema()));
    factory.create_tables().unwrap();

    // === Step 2: Construct and look up ===
    let games = factory.entity("Game").unwrap();
    let creds = factory.entity("Cred").unwrap();

    let g1 = games.create(json!({"name": "g1"})).unwrap();
    let bill = creds
        .create(Input::record([
            ("username", Input::from("bill")),
            ("game", Input::from(&g1)),
            ("name", Input::from(json!({"first": "Bill", "last": "Smith"}))),
        ]))
        .unwrap();
    println!("=== Construction ===");
    println!("  g1 -> idx {}", g1.idx());
    println!("  bill -> {}", bill.to_json().unwrap());

    let found = creds.get(Filter::new().eq("username", "bill")).unwrap().unwrap();
    println!("  lookup by username returns the same instance: {}", found == bill);

    // === Step 3: Write-through updates ===
    println!("\n=== Updates ===");
    found.set("username", "william").unwrap();
    println!("  bill.username = {:?}", bill.get("username").unwrap().as_str());

    bill.set("game", json!({"name": "newgame"})).unwrap();
    let game = bill.get_entity("game").unwrap().unwrap();
    println!("  plain value constructed game idx {}", game.idx());

    // === Step 4: Arrays ===
    println!("\n=== Arrays ===");
    let alice = creds.create(json!({"username": "alice"})).unwrap();
    let friends = bill.array("friends").unwrap();
    friends.push(&alice).unwrap();
    friends.set(3, json!({"username": "carol"})).unwrap();
    for (position, friend) in friends.entries().unwrap() {
        println!("  friends[{position}] = {:?}", friend.get("username").unwrap().as_str());
    }
    println!("  len = {}", friends.len().unwrap());

    // === Step 5: Cascading delete ===
    println!("\n=== Delete ===");
    bill.delete().unwrap();
    for table in factory.status().unwrap().tables {
        println!("  {:<14} {} rows", table.name, table.rows);
    }
    println!("  bill is deleted: {}", bill.is_deleted());
    println!("  bill.get -> {}", bill.get("username").unwrap_err());
}
