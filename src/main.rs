use clap::Parser;
use kdam::tqdm;
use tracing_subscriber::EnvFilter;

use ragpipe::{
    cli::{AskArgs, Cli, Command, IngestArgs, StatusArgs},
    config::Settings,
    data_dir::DataDir,
    error::Result,
    pipeline::Pipeline,
    vector_store::VectorStore,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RAGPIPE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let settings = Settings::from_env();

    match cli.command {
        Command::Ingest(args) => cmd_ingest(settings, &data_dir, &args)?,
        Command::Ask(args) => cmd_ask(settings, &data_dir, &args)?,
        Command::Status(args) => cmd_status(&settings, &data_dir, &args)?,
        Command::Reset => cmd_reset(&settings, &data_dir)?,
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn cmd_ingest(
    settings: Settings,
    data_dir: &DataDir,
    args: &IngestArgs,
) -> Result<()> {
    let pipeline = Pipeline::open(settings, data_dir)?;

    let mut stored = 0usize;
    for path in tqdm!(args.paths.iter(), desc = "ingesting") {
        let report = pipeline.ingest_document(path)?;
        stored += report.chunks_stored;
    }

    eprintln!();
    println!(
        "Ingested {} file(s), {stored} chunk(s) stored.",
        args.paths.len()
    );
    Ok(())
}

fn cmd_ask(
    mut settings: Settings,
    data_dir: &DataDir,
    args: &AskArgs,
) -> Result<()> {
    settings.top_k = args.top_k;
    if args.no_rerank {
        settings.enable_rerank = false;
    }

    let pipeline = Pipeline::open(settings, data_dir)?;
    let answer = pipeline.generate_answer(&args.question);
    println!("{answer}");
    Ok(())
}

// Status and reset only touch the collection file, never the models.

fn cmd_status(
    settings: &Settings,
    data_dir: &DataDir,
    args: &StatusArgs,
) -> Result<()> {
    let store =
        VectorStore::open(&data_dir.collection_db(&settings.collection_name)?)?;
    let chunks = store.len()?;
    let dimension = store.dimension()?;

    if args.json {
        println!(
            "{}",
            status_json(
                data_dir.root(),
                &settings.collection_name,
                chunks,
                dimension
            )
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Collection: {}", settings.collection_name);
        println!("Chunks: {chunks}");
        match dimension {
            Some(d) => println!("Dimension: {d}"),
            None => println!("Dimension: (empty collection)"),
        }
    }
    Ok(())
}

fn status_json(
    data_dir: &std::path::Path,
    collection: &str,
    chunks: usize,
    dimension: Option<usize>,
) -> serde_json::Value {
    serde_json::json!({
        "data_dir": data_dir.display().to_string(),
        "collection": collection,
        "chunks": chunks,
        "dimension": dimension,
    })
}

fn cmd_reset(settings: &Settings, data_dir: &DataDir) -> Result<()> {
    let store =
        VectorStore::open(&data_dir.collection_db(&settings.collection_name)?)?;
    store.clear()?;
    println!("Cleared collection '{}'.", settings.collection_name);
    Ok(())
}
