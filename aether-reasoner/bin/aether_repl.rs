use aether_reasoner::{
    build_generator, CommandPayload, Provider, ReasonerConfig, ReasoningClient,
    ReasoningPipeline, SchemaSnapshot, SchemaStore, SqlDialect,
};
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn database requests into reviewed SQL", long_about = None)]
struct Args {
    /// Schema file, JSON or the `Table name: col (type), ...` text form
    schema: PathBuf,

    /// Path to a reasoner.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured SQL dialect
    #[arg(long)]
    dialect: Option<SqlDialect>,

    /// Override the configured provider (gemini, ollama, offline)
    #[arg(long)]
    provider: Option<Provider>,

    /// Let destructive statements through when confidence allows
    #[arg(long)]
    allow_destructive: bool,

    /// Override the confidence threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Print decisions as JSON
    #[arg(long)]
    json: bool,
}

fn load_schema(path: &Path) -> anyhow::Result<SchemaSnapshot> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json")
        || contents.trim_start().starts_with('{');
    let snapshot = if is_json {
        SchemaSnapshot::from_json(&contents)?
    } else {
        SchemaSnapshot::parse_text(&contents)?
    };
    Ok(snapshot)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aether_reasoner=info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let args = Args::parse();

    let mut config = ReasonerConfig::load(args.config.as_deref())?;
    if let Some(dialect) = args.dialect {
        config.dialect = dialect;
    }
    if let Some(provider) = args.provider {
        config.llm.provider = provider;
    }
    if let Some(threshold) = args.threshold {
        config.confidence_threshold = threshold;
    }
    config.allow_destructive |= args.allow_destructive;
    config.validate()?;

    let snapshot = load_schema(&args.schema)?;
    tracing::info!(tables = snapshot.table_count(), "schema loaded");

    let store = Arc::new(SchemaStore::with_snapshot(snapshot));
    let generator = build_generator(&config.llm)?;
    let client = ReasoningClient::new(generator, config.retry_policy());
    let pipeline = ReasoningPipeline::new(client, Arc::clone(&store), config.pipeline_settings());
    let policy = config.safety_policy();

    println!(
        "aether-repl: {} via {}. Type a request, or 'tables', 'schema', 'use a,b', 'reload', 'exit'.",
        config.dialect,
        config.llm.model()
    );

    let mut pinned: Option<(Vec<String>, Arc<SchemaSnapshot>)> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"aether> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "exit" | "quit" => break,
            "tables" => {
                let snapshot = current(&store, &pinned)?;
                for (database, table) in snapshot.tables() {
                    println!("{}.{} ({} columns)", database, table.name, table.columns.len());
                }
            }
            "schema" => {
                let snapshot = current(&store, &pinned)?;
                println!("{}", serde_json::to_string_pretty(&*snapshot)?);
            }
            "reload" => match load_schema(&args.schema) {
                Ok(snapshot) => {
                    let version = store.replace(snapshot);
                    println!("schema reloaded (version {})", version);
                    if let Some((names, _)) = pinned.take() {
                        pinned = pin(&store, names);
                    }
                }
                Err(e) => println!("reload failed: {:#}", e),
            },
            "use *" => {
                pinned = None;
                println!("using the full schema");
            }
            _ if line.starts_with("use ") => {
                let names: Vec<String> = line["use ".len()..]
                    .split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect();
                pinned = pin(&store, names);
            }
            request => {
                let mut command = CommandPayload::from_text(request);
                if let Some((_, snapshot)) = &pinned {
                    command = command.with_snapshot(Arc::clone(snapshot));
                }
                match pipeline.reason(&command, &policy).await {
                    Ok(output) if args.json => println!("{}", serde_json::to_string_pretty(&output)?),
                    Ok(output) => println!("{}", output.render()),
                    Err(e) => println!("error: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn current(
    store: &SchemaStore,
    pinned: &Option<(Vec<String>, Arc<SchemaSnapshot>)>,
) -> anyhow::Result<Arc<SchemaSnapshot>> {
    if let Some((_, snapshot)) = pinned {
        return Ok(Arc::clone(snapshot));
    }
    let (_, snapshot) = store.current().context("no schema loaded")?;
    Ok(snapshot)
}

fn pin(store: &SchemaStore, names: Vec<String>) -> Option<(Vec<String>, Arc<SchemaSnapshot>)> {
    let (_, snapshot) = store.current()?;
    match snapshot.subset(&names) {
        Ok(subset) => {
            println!("using tables: {}", names.join(", "));
            Some((names, Arc::new(subset)))
        }
        Err(e) => {
            println!("cannot pin tables: {}", e);
            None
        }
    }
}
