//! Document store command line tool
//!
//! Runs against the in-process vector service, optionally backed by a
//! snapshot directory so collections persist between invocations.
//!
//! Usage:
//!   docstore [OPTIONS] <COMMAND>
//!
//! Commands:
//!   list                      List collections and their row counts
//!   query <FILTER>            Print documents matching a filter expression
//!   demo                      Store sample documents and search them

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Map};

use vector_docstore::core::ClientConfig;
use vector_docstore::logging::{LogLevel, LoggingSystem};
use vector_docstore::vector::{
    Document, DocumentStore, MemoryConnector, MemoryServer, VectorBackend, EMBEDDING_DIM,
};

enum Command {
    List,
    Query(String),
    Demo,
}

/// Command line arguments
struct Args {
    config: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    collection: String,
    limit: Option<usize>,
    verbose: bool,
    command: Command,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut snapshot_dir = None;
        let mut collection = "tenant_demo".to_string();
        let mut limit = None;
        let mut verbose = false;
        let mut command = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--snapshot-dir" | "-s" => {
                    snapshot_dir = args.next().map(PathBuf::from);
                }
                "--collection" | "-n" => {
                    collection = args.next().ok_or("--collection needs a value")?;
                }
                "--limit" | "-l" => {
                    let val = args.next().ok_or("--limit needs a value")?;
                    limit = Some(val.parse().map_err(|_| "Invalid limit value")?);
                }
                "--verbose" | "-v" => {
                    verbose = true;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "list" => command = Some(Command::List),
                "demo" => command = Some(Command::Demo),
                "query" => {
                    let filter = args.next().ok_or("query needs a filter expression")?;
                    command = Some(Command::Query(filter));
                }
                _ => {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }

        let command = command.ok_or("a command is required")?;

        Ok(Self {
            config,
            snapshot_dir,
            collection,
            limit,
            verbose,
            command,
        })
    }
}

fn print_help() {
    println!(
        r#"docstore - per-tenant document collections

USAGE:
    docstore [OPTIONS] <COMMAND>

COMMANDS:
    list                       List collections and their row counts
    query <FILTER>             Print documents matching a filter expression
    demo                       Store sample documents and search them

OPTIONS:
    -c, --config <PATH>        Config file (JSON or TOML)
    -s, --snapshot-dir <DIR>   Persist collections in DIR
    -n, --collection <NAME>    Collection to use (default: tenant_demo)
    -l, --limit <N>            Result limit (default: search.default_limit)
    -v, --verbose              Enable debug logging
    -h, --help                 Print this help message

ENVIRONMENT:
    DOCSTORE_<SECTION>__<KEY>  Override any config value,
                               e.g. DOCSTORE_SEARCH__NPROBE=64
"#
    );
}

/// Deterministic stand-in embedding for the demo documents
fn demo_embedding(seed: usize) -> Vec<f32> {
    (0..EMBEDDING_DIM)
        .map(|i| (((i + 1) * (seed + 3)) % 17) as f32 / 17.0)
        .collect()
}

async fn run(args: Args) -> Result<()> {
    let mut config = ClientConfig::load(args.config.as_deref()).context("loading config")?;
    if args.verbose {
        config.logging.level = LogLevel::Debug;
    }
    if let Some(dir) = args.snapshot_dir {
        config.snapshot_dir = Some(dir);
    }

    let _logging = LoggingSystem::init(config.logging.clone()).context("initializing logging")?;

    let server = match config.snapshot_dir {
        Some(ref dir) => MemoryServer::open(dir)
            .with_context(|| format!("opening snapshot directory {:?}", dir))?,
        None => MemoryServer::new(),
    };
    let connector = MemoryConnector::new(Arc::new(server));

    let store = DocumentStore::connect(config.store_config(), &connector).await;
    if !store.is_connected() {
        bail!("vector service at {} is unreachable", config.connection.address());
    }

    match args.command {
        Command::List => {
            for name in store.list_collections().await? {
                let info = connector.server().describe_collection(&name).await?;
                println!("{}\t{} rows", name, info.num_entities);
            }
        }
        Command::Query(filter) => {
            let collection = store.ensure_loaded(&args.collection).await?;
            let limit = args.limit.unwrap_or_else(|| collection.default_limit());
            for record in collection.query(&filter, limit).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Demo => {
            let collection = store.ensure_loaded(&args.collection).await?;
            let pool = config.pool.build()?;

            let tasks: Vec<_> = (0..8)
                .map(|i| {
                    let collection = collection.clone();
                    let user = format!("user_{}", i % 2);
                    async move {
                        let mut headers = Map::new();
                        headers.insert("h1".to_string(), json!(format!("Section {}", i)));
                        let document = Document::new(format!("sample chunk {}", i))
                            .with_user_id(&user)
                            .with_kb_id("kb_demo")
                            .with_file_id("file_demo")
                            .with_doc_id(&format!("doc_{}", i))
                            .with_headers(headers);
                        collection.store(&document, &demo_embedding(i)).await
                    }
                })
                .collect();

            for result in pool.run_all(tasks).await {
                result??;
            }

            let limit = args.limit.unwrap_or_else(|| collection.default_limit());
            let hits = collection
                .search(Some(demo_embedding(3).as_slice()), Some("user_id == 'user_1'"), limit)
                .await?;
            for hit in hits {
                println!(
                    "{}\t{:.4}\t{}\t{}",
                    hit.id,
                    hit.distance.unwrap_or_default(),
                    hit.doc_id,
                    hit.content
                );
            }

            let summary = store.metrics().summary();
            println!(
                "stored {} rows, search mean {:.3} ms",
                summary.rows_stored.sum, summary.search_ms.mean
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args).await {
        eprintln!("docstore failed: {:#}", e);
        std::process::exit(1);
    }
}
