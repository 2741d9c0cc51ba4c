//! Instrumentos CLI - normalize instrument extracts into the canonical CSV
//!
//! # Main Commands
//!
//! ```bash
//! instrumentos run raw_data/a.csv raw_data/b.csv -o script/dados_final.csv
//! instrumentos status --municipio "SAO LUIS"
//! instrumentos serve                 # Start HTTP server (port 3000)
//! instrumentos schema list           # Manage schema mappings
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! instrumentos parse input.csv       # Parse an extract to JSON
//! ```
//!
//! Defaults come from `INSTRUMENTOS_*` environment variables (a `.env` file
//! is loaded if present); flags override them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use instrumentos::{
    detect_delimiter, parse_bytes, run_pipeline, Dataset, Filter, SchemaMapping, SchemaRegistry,
    SchemaSelection, Settings, SourceEncoding, SourceFormat, StatusBoard,
};

#[derive(Parser)]
#[command(name = "instrumentos")]
#[command(about = "Normalize health-planning instrument extracts into a canonical CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ETL pipeline: extract, unify, transform, load
    Run {
        /// Input extracts (default: INSTRUMENTOS_INPUTS)
        inputs: Vec<PathBuf>,

        /// Canonical output file (default: INSTRUMENTOS_OUTPUT)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Schema name, or "auto" (default: INSTRUMENTOS_SCHEMA)
        #[arg(short, long)]
        schema: Option<String>,

        /// Schema mapping JSON file (overrides --schema)
        #[arg(long)]
        schema_file: Option<PathBuf>,

        /// Processing date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Parse an extract and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Detect the encoding instead of requiring UTF-8
        #[arg(long)]
        detect_encoding: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the instrument status board of the canonical file
    Status {
        #[arg(long)]
        municipio: Option<String>,
        #[arg(long)]
        macrorregiao: Option<String>,
        #[arg(long)]
        regiao: Option<String>,
        #[arg(long)]
        fase: Option<String>,
        #[arg(long)]
        ano: Option<String>,
        #[arg(long)]
        instrumento: Option<String>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: INSTRUMENTOS_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage schema mappings
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// List all schemas
    List,

    /// Print a schema as JSON
    Show {
        /// Schema name
        name: String,
    },

    /// Import a schema JSON file
    Import {
        /// Schema JSON file to import
        file: PathBuf,
        /// Name for the schema
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete a user schema
    Delete {
        /// Schema name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let result = match cli.command {
        Commands::Run {
            inputs,
            output,
            schema,
            schema_file,
            date,
        } => cmd_run(&settings, inputs, output, schema, schema_file.as_deref(), date),

        Commands::Parse {
            input,
            delimiter,
            detect_encoding,
            output,
        } => cmd_parse(&input, delimiter, detect_encoding, output.as_deref()),

        Commands::Status {
            municipio,
            macrorregiao,
            regiao,
            fase,
            ano,
            instrumento,
        } => cmd_status(
            &settings,
            Filter {
                municipio,
                macrorregiao,
                regiao,
                fase,
                ano,
                instrumento,
            },
        ),

        Commands::Serve { port } => cmd_serve(&settings, port).await,

        Commands::Schema { action } => cmd_schema(&settings, action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    settings: &Settings,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    schema: Option<String>,
    schema_file: Option<&Path>,
    date: Option<NaiveDate>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = settings.pipeline_options();
    if !inputs.is_empty() {
        options.inputs = inputs;
    }
    if let Some(output) = output {
        options.output = output;
    }
    if let Some(name) = schema {
        options.schema = SchemaSelection::parse(&name);
    }
    if let Some(path) = schema_file {
        let mapping = SchemaMapping::from_json(&fs::read_to_string(path)?)?;
        options.schema = SchemaSelection::Mapping(Box::new(mapping));
    }
    options.processing_date = date;

    let report = run_pipeline(&options)?;

    eprintln!("\n📊 Summary");
    eprintln!("   Schema:  {}", report.schema);
    eprintln!("   Inputs:  {:?} rows", report.input_rows);
    eprintln!("   Output:  {} rows", report.output_rows);
    eprintln!("   Columns: {}", report.columns.join(", "));
    println!("{}", report.output.display());
    Ok(())
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    detect_encoding: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let bytes = fs::read(input)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&String::from_utf8_lossy(&bytes)));
    let format = SourceFormat {
        delimiter,
        encoding: if detect_encoding {
            SourceEncoding::Auto
        } else {
            SourceEncoding::Utf8
        },
        ..SourceFormat::default()
    };

    let result = parse_bytes(&bytes, &format, input)?;
    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.delimiter));
    eprintln!("   Columns: {}", result.table.columns().join(", "));
    eprintln!("✅ Parsed {} records", result.table.len());

    let json = serde_json::to_string_pretty(&result.table.to_json_records())?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_status(settings: &Settings, filter: Filter) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::load(&settings.pipeline_options());
    if let Some(ref error) = dataset.error {
        return Err(error.clone().into());
    }
    if dataset.is_empty() {
        eprintln!("⚠️  Não há dados válidos para exibição.");
        return Ok(());
    }

    let board = StatusBoard::build(&filter.apply(&dataset.table));
    if board.is_empty() {
        eprintln!("⚠️  No rows match this filter.");
        return Ok(());
    }
    println!("{}", board.render_text());
    Ok(())
}

async fn cmd_serve(settings: &Settings, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(settings.port);
    instrumentos::server::start_server(port, settings.pipeline_options()).await
}

fn cmd_schema(settings: &Settings, action: SchemaAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = SchemaRegistry::with_dir(&settings.schema_dir);

    match action {
        SchemaAction::List => {
            let schemas = registry.list();
            eprintln!("📋 Schemas ({}):\n", schemas.len());
            for schema in schemas {
                let kind = if SchemaRegistry::is_builtin(&schema.name) {
                    "built-in"
                } else {
                    "user"
                };
                println!("  📄 {} ({})", schema.name, kind);
                if !schema.description.is_empty() {
                    println!("     {}", schema.description);
                }
                println!("     Sources: {}", schema.source_columns().join(", "));
                println!("     Output:  {}", schema.canonical_columns().join(", "));
                println!();
            }
        }

        SchemaAction::Show { name } => {
            let schema = registry.require(&name)?;
            println!("{}", schema.to_json()?);
        }

        SchemaAction::Import { file, name } => {
            eprintln!("📥 Importing schema from: {}", file.display());
            let name = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Schema saved as: {}", name);
        }

        SchemaAction::Delete { name } => {
            registry.delete(&name)?;
            eprintln!("🗑️  Schema deleted: {}", name);
        }
    }

    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
