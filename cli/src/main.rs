use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sqlreflect_core::Schema;
use sqlreflect_db::{SchemaLoader, StoreConfig};
use sqlreflect_sqlite::{Factory, MigrationStatus, generate_entity_sql, generate_schema_sql};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Output format for normalized descriptors.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "sqlreflect")]
#[command(about = "Normalize nested schemas and manage their SQLite tables")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the normalized table descriptors.
    Normalize(NormalizeArgs),
    /// Print the CREATE TABLE statements.
    Ddl(DdlArgs),
    /// Create, drop, or inspect tables in a database.
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
struct SchemaArgs {
    /// Schema definition files and/or directories, merged in order.
    #[arg(long = "schema", required = true)]
    schema: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct NormalizeArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct DdlArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Only this entity and its embedded structures.
    #[arg(long)]
    entity: Option<String>,
}

#[derive(Debug, Args)]
struct TablesArgs {
    #[command(subcommand)]
    operation: TablesOperation,
}

#[derive(Debug, Subcommand)]
enum TablesOperation {
    /// Create every table the schema describes.
    Up(TablesUpArgs),
    /// Drop every table the schema describes.
    Down(StoreArgs),
    /// Show which tables exist and how many rows they hold.
    Status(TablesStatusArgs),
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Database file path (overrides `path` in --config).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Store configuration YAML.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TablesUpArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Only create this entity's tables.
    #[arg(long)]
    entity: Option<String>,
}

#[derive(Debug, Args)]
struct TablesStatusArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Print the status as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Normalize(args) => run_normalize(args),
        Command::Ddl(args) => run_ddl(args),
        Command::Tables(args) => run_tables(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// normalize / ddl
// ---------------------------------------------------------------------------

fn run_normalize(args: NormalizeArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;
    let output = match args.format {
        CliOutputFormat::Json => serde_json::to_string_pretty(&schema)
            .map_err(|e| format!("JSON serialization failed: {e}"))?,
        CliOutputFormat::Yaml => {
            serde_yaml::to_string(&schema).map_err(|e| format!("YAML serialization failed: {e}"))?
        }
    };
    println!("{}", output.trim_end());
    Ok(())
}

fn run_ddl(args: DdlArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;
    let sql = match &args.entity {
        Some(entity) => {
            if !schema.contains(entity) {
                return Err(format!("unknown entity '{entity}'"));
            }
            generate_entity_sql(&schema, entity)
        }
        None => generate_schema_sql(&schema),
    };
    print!("{sql}");
    Ok(())
}

// ---------------------------------------------------------------------------
// tables command
// ---------------------------------------------------------------------------

fn run_tables(args: TablesArgs) -> Result<(), String> {
    match args.operation {
        TablesOperation::Up(a) => run_tables_up(a),
        TablesOperation::Down(a) => run_tables_down(a),
        TablesOperation::Status(a) => run_tables_status(a),
    }
}

fn run_tables_up(args: TablesUpArgs) -> Result<(), String> {
    let factory = open_factory(&args.store)?;
    let location = factory.config().location();
    match &args.entity {
        Some(entity) => {
            factory
                .entity(entity)
                .and_then(|t| t.create_tables())
                .map_err(|e| format!("Creating tables for {entity} failed: {e}"))?;
            println!("Tables for {entity} created in '{location}'.");
        }
        None => {
            factory
                .create_tables()
                .map_err(|e| format!("Creating tables failed: {e}"))?;
            println!(
                "Tables created in '{location}' for {} entities.",
                factory.schema().len()
            );
        }
    }
    Ok(())
}

fn run_tables_down(args: StoreArgs) -> Result<(), String> {
    let factory = open_factory(&args)?;
    factory
        .drop_tables()
        .map_err(|e| format!("Dropping tables failed: {e}"))?;
    println!("Tables dropped from '{}'.", factory.config().location());
    Ok(())
}

fn run_tables_status(args: TablesStatusArgs) -> Result<(), String> {
    let factory = open_factory(&args.store)?;
    let status = factory
        .status()
        .map_err(|e| format!("Failed to get table status: {e}"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{json}");
        return Ok(());
    }
    print!("{}", format_status(&status));
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_schema(args: &SchemaArgs) -> Result<Schema, String> {
    let loader = args
        .schema
        .iter()
        .fold(SchemaLoader::new(), |loader, path| loader.path(path));
    let raw = loader
        .build()
        .map_err(|e| format!("Failed to load schema: {e}"))?;
    debug!(entities = raw.len(), "loaded raw schema");
    raw.normalize()
        .map_err(|e| format!("Failed to normalize schema: {e}"))
}

/// Resolves the store configuration: `--config` first, then `--db`.
fn store_config(args: &StoreArgs) -> Result<StoreConfig, String> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(db) = &args.db {
        config.path = Some(db.clone());
    }
    if config.path.is_none() {
        return Err("no database given; pass --db or set `path` in --config".to_string());
    }
    Ok(config)
}

fn open_factory(args: &StoreArgs) -> Result<Factory, String> {
    let schema = load_schema(&args.schema)?;
    let config = store_config(args)?;
    Ok(Factory::new(schema, config))
}

fn format_status(status: &MigrationStatus) -> String {
    let width = status
        .tables
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(0)
        .max("table".len());

    let mut out = String::from("Table Status:\n");
    out.push_str(&format!(
        "  Tables exist: {}\n",
        if status.tables_exist() { "yes" } else { "no" }
    ));
    out.push_str(&format!("  {:<width$}  {:<7}  rows\n", "table", "exists"));
    for table in &status.tables {
        let rows = if table.exists {
            table.rows.to_string()
        } else {
            "-".to_string()
        };
        out.push_str(&format!(
            "  {:<width$}  {:<7}  {rows}\n",
            table.name,
            if table.exists { "yes" } else { "no" }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlreflect_sqlite::TableStatus;

    fn args(db: Option<&str>, config: Option<PathBuf>) -> StoreArgs {
        StoreArgs {
            schema: SchemaArgs { schema: vec![] },
            db: db.map(PathBuf::from),
            config,
        }
    }

    #[test]
    fn test_store_config_requires_a_path() {
        let err = store_config(&args(None, None)).unwrap_err();
        assert!(err.contains("--db"));
    }

    #[test]
    fn test_db_flag_overrides_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("store.yaml");
        StoreConfig {
            atomic: false,
            ..StoreConfig::at("from-config.db")
        }
        .save(&config_path)
        .unwrap();

        let config = store_config(&args(Some("flag.db"), Some(config_path.clone()))).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("flag.db")));
        assert!(!config.atomic);

        let config = store_config(&args(None, Some(config_path))).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("from-config.db")));
    }

    #[test]
    fn test_format_status_marks_missing_tables() {
        let status = MigrationStatus {
            tables: vec![
                TableStatus {
                    name: "game".into(),
                    exists: true,
                    rows: 2,
                },
                TableStatus {
                    name: "cred_friends".into(),
                    exists: false,
                    rows: 0,
                },
            ],
        };
        let text = format_status(&status);
        assert!(text.contains("Tables exist: no"));
        assert!(text.contains("game          yes      2"));
        assert!(text.contains("cred_friends  no       -"));
    }
}
