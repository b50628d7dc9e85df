use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "ragpipe",
    about = "A local retrieval-augmented question answering pipeline for your documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and store documents in the vector collection
    Ingest(IngestArgs),
    /// Ask a question against the ingested documents
    Ask(AskArgs),
    /// Show collection status and statistics
    Status(StatusArgs),
    /// Delete every stored chunk and vector
    Reset,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Text or Markdown files to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Number of chunks retrieved from the vector store
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Skip cross-encoder reranking, use vector distance order directly
    #[arg(long)]
    pub no_rerank: bool,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "ragpipe",
            &mut std::io::stdout(),
        );
    }
}
