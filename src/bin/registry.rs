//! Schema Registry CLI
//!
//! Commands for inspecting and updating a filesystem schema store.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use familiar_schema_store::{RegistryConfig, Schema, SchemaService};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Filesystem-backed schema registry")]
struct Cli {
    /// Path to the schema root (overrides configuration)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every schema and its versions
    List,

    /// List versions of a schema
    Versions {
        /// Schema name
        name: String,
    },

    /// Print a schema document
    Show {
        /// Schema name
        name: String,
        /// Version (defaults to latest)
        #[arg(short, long)]
        version: Option<u32>,
    },

    /// Show metadata for a schema
    Info {
        /// Schema name
        name: String,
    },

    /// Register a schema file as the next version of a name
    Register {
        /// Schema name
        name: String,
        /// Path to the schema document (JSON)
        file: PathBuf,
        /// Description stored with the metadata
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Check a schema file against the latest version without registering it
    Check {
        /// Schema name
        name: String,
        /// Path to the candidate schema document
        file: PathBuf,
    },

    /// Structurally validate schema files
    ValidateFile {
        /// Files to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check that a JSON payload carries every required field
    ValidateData {
        /// Schema name
        name: String,
        /// Path to the JSON payload
        file: PathBuf,
    },

    /// Set the compatibility mode of a schema
    SetCompatibility {
        /// Schema name
        name: String,
        /// One of the modes listed by `modes`
        mode: String,
    },

    /// Set the description of a schema
    Describe {
        /// Schema name
        name: String,
        /// New description
        description: String,
    },

    /// List compatibility modes
    Modes,

    /// List schema IDs assigned in this process
    Ids,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = RegistryConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(root) = cli.registry {
        config.store.root = root;
    }
    let service = SchemaService::from_config(&config)?;

    match cli.command {
        Commands::List => {
            let all = service.get_all_schemas();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("No schemas registered yet.");
            } else {
                println!("{:<32} {:<10} VERSIONS", "NAME", "LATEST");
                for (name, versions) in &all {
                    let list: Vec<String> = versions.keys().map(|v| v.to_string()).collect();
                    let latest = versions.keys().last().copied().unwrap_or_default();
                    println!("{:<32} {:<10} {}", name, latest, list.join(", "));
                }
            }
        }

        Commands::Versions { name } => {
            let versions = service.get_schema_versions(&name);
            if cli.json {
                println!("{}", serde_json::to_string(&versions)?);
            } else if versions.is_empty() {
                bail!("no versions found for schema '{}'", name);
            } else {
                for v in versions {
                    println!("v{}", v);
                }
            }
        }

        Commands::Show { name, version } => {
            let schema = match version {
                Some(v) => service.store().load(&name, Some(v))?,
                None => service.get_schema(&name)?,
            };
            println!("{}", schema.to_pretty_json()?);
        }

        Commands::Info { name } => {
            let metadata = service.store().load_metadata(&name)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("Name:          {}", metadata.name);
                println!("Description:   {}", metadata.description);
                println!("Compatibility: {}", metadata.compatibility);
                println!("Version:       {}", metadata.version);
                println!("Created:       {}", metadata.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!("Updated:       {}", metadata.updated_at.format("%Y-%m-%d %H:%M:%S"));
                if !metadata.tags.is_empty() {
                    println!("Tags:          {}", metadata.tags.join(", "));
                }
            }
        }

        Commands::Register { name, file, description } => {
            let schema = read_schema(&file)?;
            let id = service.register_schema(&name, &schema)?;
            if let Some(description) = description {
                service.metadata().update_description(&name, &description)?;
            }
            let version = service.get_latest_schema_version(&name)?;
            if cli.json {
                println!("{}", serde_json::json!({ "name": name, "id": id, "version": version }));
            } else {
                println!("✅ Registered {} v{} (id {})", name, version, id);
            }
        }

        Commands::Check { name, file } => {
            let schema = read_schema(&file)?;
            let result = service.check_compatibility(&name, &schema)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let marker = if result.is_compatible { "✅" } else { "❌" };
                println!("{} {} ({}): {}", marker, name, result.mode, result.summary);
                for change in &result.changes {
                    let flag = if change.is_breaking { "breaking" } else { "ok" };
                    println!("   └─ [{}] {}", flag, change.description);
                }
            }
            if !result.is_compatible {
                std::process::exit(1);
            }
        }

        Commands::ValidateFile { files } => {
            let mut all_valid = true;
            for file in &files {
                if service.store().validate_file(file) {
                    println!("  ✅ {}", file.display());
                } else {
                    println!("  ❌ {}", file.display());
                    all_valid = false;
                }
            }
            if !all_valid {
                std::process::exit(1);
            }
        }

        Commands::ValidateData { name, file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let data: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            if service.validate_data(&data, &name) {
                println!("✅ payload matches {}", name);
            } else {
                println!("❌ payload does not match {}", name);
                std::process::exit(1);
            }
        }

        Commands::SetCompatibility { name, mode } => {
            let metadata = service.metadata().update_compatibility(&name, &mode)?;
            println!("✅ {} compatibility set to {}", name, metadata.compatibility);
        }

        Commands::Describe { name, description } => {
            service.metadata().update_description(&name, &description)?;
            println!("✅ {} description updated", name);
        }

        Commands::Modes => {
            let modes = service.metadata().compatibility_types();
            if cli.json {
                println!("{}", serde_json::to_string(&modes)?);
            } else {
                for mode in modes {
                    println!("{}", mode);
                }
            }
        }

        Commands::Ids => {
            let ids = service.schema_ids();
            if cli.json {
                let map: serde_json::Map<String, serde_json::Value> = ids
                    .into_iter()
                    .map(|(id, name)| (name, serde_json::Value::from(id)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                println!("{:<6} NAME", "ID");
                for (id, name) in ids {
                    println!("{:<6} {}", id, name);
                }
            }
        }
    }

    Ok(())
}

fn read_schema(path: &Path) -> anyhow::Result<Schema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Schema::parse(&text).with_context(|| format!("{} is not a valid schema", path.display()))
}
