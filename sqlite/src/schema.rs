//! SQL table generation from normalized descriptors.
//!
//! Generates idempotent `CREATE TABLE IF NOT EXISTS` statements for every
//! object table and association table of a [`Schema`], and the matching
//! `DROP TABLE IF EXISTS` statements. All identifiers are double-quoted.
//!
//! # Table structure
//!
//! - Object tables carry `idx INTEGER PRIMARY KEY AUTOINCREMENT`, one column
//!   per primitive or reference field, one `FOREIGN KEY` per reference field,
//!   then the descriptor's append clauses verbatim.
//! - Association tables `{owner_table}_{field}` carry `position`, `owner_id`
//!   and `referenced_id`, unique per `(position, owner_id)` and removed with
//!   their owner row.
//!
//! Object tables are created first, in schema order, then association
//! tables. Drops run in the reverse order.

use sqlreflect_core::{
    FieldDescriptor, FieldKind, IDX_COLUMN, OWNER_COLUMN, POSITION_COLUMN, REFERENCED_COLUMN,
    Schema, TableDescriptor,
};

/// Double-quotes an identifier, doubling embedded quotes.
///
/// # Examples
///
/// ```
/// use sqlreflect_sqlite::quote_ident;
///
/// assert_eq!(quote_ident("cred"), "\"cred\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generates the `CREATE TABLE` statement for one object table.
///
/// Reference targets are resolved through `schema`; a target missing from
/// the schema falls back to the lowercased target name.
pub fn create_table_sql(schema: &Schema, table: &TableDescriptor) -> String {
    let mut lines = vec![format!(
        "    {} INTEGER PRIMARY KEY AUTOINCREMENT",
        quote_ident(IDX_COLUMN)
    )];

    for field in table.columns() {
        let sql_type = match &field.kind {
            FieldKind::Primitive { sql_type } | FieldKind::Reference { sql_type, .. } => sql_type,
            FieldKind::Array { .. } => continue,
        };
        lines.push(format!("    {} {}", quote_ident(&field.name), sql_type));
    }

    for field in table.columns() {
        if let FieldKind::Reference { target, .. } = &field.kind {
            lines.push(format!(
                "    FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&field.name),
                quote_ident(&target_table(schema, target)),
                quote_ident(IDX_COLUMN)
            ));
        }
    }

    for clause in &table.append {
        lines.push(format!("    {clause}"));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        quote_ident(&table.table),
        lines.join(",\n")
    )
}

/// Generates the `CREATE TABLE` statement for an array field's association
/// table, or `None` if `field` is not an array.
pub fn create_association_sql(owner: &TableDescriptor, field: &FieldDescriptor) -> Option<String> {
    let FieldKind::Array { table, .. } = &field.kind else {
        return None;
    };
    Some(format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    {position} INTEGER NOT NULL,\n    {owner_id} INTEGER NOT NULL,\n    {referenced} INTEGER NOT NULL,\n    UNIQUE({position}, {owner_id}),\n    FOREIGN KEY ({owner_id}) REFERENCES {owner} ({idx}) ON DELETE CASCADE\n);\n",
        table = quote_ident(table),
        position = quote_ident(POSITION_COLUMN),
        owner_id = quote_ident(OWNER_COLUMN),
        referenced = quote_ident(REFERENCED_COLUMN),
        owner = quote_ident(&owner.table),
        idx = quote_ident(IDX_COLUMN),
    ))
}

/// Generates DDL for every table in the schema.
///
/// # Examples
///
/// ```
/// use sqlreflect_core::normalize;
/// use sqlreflect_sqlite::generate_schema_sql;
///
/// let schema = normalize(&serde_json::json!({
///     "Game": {"name": "TEXT"},
///     "Cred": {"game": "@Game", "friends": "[]@Cred"}
/// })).unwrap();
///
/// let sql = generate_schema_sql(&schema);
/// assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"game\""));
/// assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"cred_friends\""));
/// ```
pub fn generate_schema_sql(schema: &Schema) -> String {
    let tables: Vec<&TableDescriptor> = schema.tables().collect();
    statements_for(schema, &tables).concat()
}

/// Generates `DROP TABLE` statements for every table, in reverse creation
/// order.
pub fn generate_drop_sql(schema: &Schema) -> String {
    table_names(schema)
        .iter()
        .rev()
        .map(|name| format!("DROP TABLE IF EXISTS {};\n", quote_ident(name)))
        .collect()
}

/// Generates DDL for one entity, its synthetic descendants, and their
/// association tables. Empty if the entity is unknown.
pub fn generate_entity_sql(schema: &Schema, entity: &str) -> String {
    let tables = schema.with_descendants(entity);
    statements_for(schema, &tables).concat()
}

/// Every table name the schema creates: object tables in schema order,
/// then association tables.
pub fn table_names(schema: &Schema) -> Vec<String> {
    let mut names: Vec<String> = schema.tables().map(|t| t.table.clone()).collect();
    for table in schema.tables() {
        for field in table.arrays() {
            if let FieldKind::Array { table, .. } = &field.kind {
                names.push(table.clone());
            }
        }
    }
    names
}

fn statements_for(schema: &Schema, tables: &[&TableDescriptor]) -> Vec<String> {
    let mut statements: Vec<String> = tables.iter().map(|t| create_table_sql(schema, t)).collect();
    for table in tables {
        statements.extend(table.arrays().filter_map(|f| create_association_sql(table, f)));
    }
    statements
}

fn target_table(schema: &Schema, target: &str) -> String {
    schema
        .get(target)
        .map(|t| t.table.clone())
        .unwrap_or_else(|| sqlreflect_core::table_name(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlreflect_core::normalize;

    fn cred_schema() -> Schema {
        normalize(&json!({
            "Game": {"name": "VARCHAR(64)", "$append": "UNIQUE(\"name\")"},
            "Cred": {
                "username": "TEXT",
                "game": "@Game NOT NULL",
                "friends": "[]@Cred",
                "name": {"first": "TEXT", "last": "TEXT"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_object_table_columns_and_keys() {
        let schema = cred_schema();
        let sql = create_table_sql(&schema, schema.get("Cred").unwrap());

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"cred\" ("));
        assert!(sql.contains("\"idx\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"username\" TEXT"));
        assert!(sql.contains("\"game\" INTEGER NOT NULL"));
        assert!(sql.contains("FOREIGN KEY (\"game\") REFERENCES \"game\" (\"idx\")"));
        // Array fields have no column on the object table.
        assert!(!sql.contains("\"friends\""));
    }

    #[test]
    fn test_append_clauses_are_verbatim() {
        let schema = cred_schema();
        let sql = create_table_sql(&schema, schema.get("Game").unwrap());
        assert!(sql.contains("    UNIQUE(\"name\")\n"));
    }

    #[test]
    fn test_nested_table_cascades_to_parent() {
        let schema = cred_schema();
        let nested = schema.children_of("Cred").next().unwrap();
        let sql = create_table_sql(&schema, nested);

        assert!(sql.contains("\"ridx\" INTEGER NOT NULL"));
        assert!(sql.contains("REFERENCES \"cred\" (\"idx\") ON DELETE CASCADE"));
    }

    #[test]
    fn test_association_table() {
        let schema = cred_schema();
        let cred = schema.get("Cred").unwrap();
        let sql = create_association_sql(cred, cred.field("friends").unwrap()).unwrap();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"cred_friends\""));
        assert!(sql.contains("UNIQUE(\"position\", \"owner_id\")"));
        assert!(sql.contains("FOREIGN KEY (\"owner_id\") REFERENCES \"cred\" (\"idx\") ON DELETE CASCADE"));
        assert!(create_association_sql(cred, cred.field("username").unwrap()).is_none());
    }

    #[test]
    fn test_creation_and_drop_order() {
        let schema = cred_schema();
        let names = table_names(&schema);
        assert_eq!(names.first().map(String::as_str), Some("game"));
        assert_eq!(names.last().map(String::as_str), Some("cred_friends"));

        let drop = generate_drop_sql(&schema);
        assert!(drop.starts_with("DROP TABLE IF EXISTS \"cred_friends\";"));
        assert!(drop.trim_end().ends_with("DROP TABLE IF EXISTS \"game\";"));
    }

    #[test]
    fn test_entity_sql_includes_descendants_only() {
        let schema = cred_schema();
        let sql = generate_entity_sql(&schema, "Cred");
        assert!(sql.contains("\"cred\""));
        assert!(sql.contains("\"_t0\""));
        assert!(sql.contains("\"cred_friends\""));
        assert!(!sql.contains("CREATE TABLE IF NOT EXISTS \"game\""));
        assert!(generate_entity_sql(&schema, "Missing").is_empty());
    }

    #[test]
    fn test_generated_sql_executes() {
        let schema = cred_schema();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&generate_schema_sql(&schema)).unwrap();
        conn.execute_batch(&generate_schema_sql(&schema)).unwrap();
        conn.execute_batch(&generate_drop_sql(&schema)).unwrap();
    }
}
