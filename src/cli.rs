use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docrag::ChunkingConfig;

#[derive(Debug, Parser)]
#[command(
    name = "docrag",
    version,
    about = "Ask questions about a document using retrieval-augmented generation"
)]
pub struct Cli {
    /// Path to a TOML config file (overrides DOCRAG_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer a question about a document
    Ask(AskArgs),
    /// Show how a document would be split into chunks
    Chunks(ChunksArgs),
    /// List supported document formats
    Formats,
    /// Show the resolved configuration
    Config(ConfigArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// Document to ask about
    pub document: PathBuf,

    /// The question
    pub query: String,

    /// Chat model used for the answer
    #[arg(long)]
    pub model: Option<String>,

    /// Embedding model used for chunks and the query
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Number of chunks to retrieve as context
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    #[command(flatten)]
    pub chunking: ChunkingArgs,

    /// Read the system prompt from this file
    #[arg(long)]
    pub system_prompt_file: Option<PathBuf>,

    /// Print the retrieved references after the answer
    #[arg(long)]
    pub show_context: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Chunks --

#[derive(Debug, Parser)]
pub struct ChunksArgs {
    /// Document to split
    pub document: PathBuf,

    #[command(flatten)]
    pub chunking: ChunkingArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, clap::Args)]
pub struct ChunkingArgs {
    /// Maximum chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Overlap between adjacent chunks in characters
    #[arg(long)]
    pub overlap: Option<usize>,
}

impl ChunkingArgs {
    /// Overlay the flags that were given onto `chunking`.
    pub fn apply(&self, chunking: &mut ChunkingConfig) {
        if let Some(size) = self.chunk_size {
            chunking.chunk_size = size;
        }
        if let Some(overlap) = self.overlap {
            chunking.overlap = overlap;
        }
    }
}

// -- Config --

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

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
            "docrag",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_ask_defaults() {
        let cli = Cli::parse_from(["docrag", "ask", "report.pdf", "What changed?"]);
        assert!(cli.config.is_none());
        match cli.command {
            Command::Ask(args) => {
                assert_eq!(args.document, PathBuf::from("report.pdf"));
                assert_eq!(args.query, "What changed?");
                assert!(args.model.is_none());
                assert!(args.top_k.is_none());
                assert!(args.chunking.chunk_size.is_none());
                assert!(!args.show_context);
                assert!(!args.json);
            }
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn parse_ask_overrides() {
        let cli = Cli::parse_from([
            "docrag",
            "-vv",
            "--config",
            "rag.toml",
            "ask",
            "notes.md",
            "Where did the cat sit?",
            "-k",
            "5",
            "--temperature",
            "0.7",
            "--chunk-size",
            "500",
            "--overlap",
            "50",
            "--json",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("rag.toml")));
        match cli.command {
            Command::Ask(args) => {
                assert_eq!(args.top_k, Some(5));
                assert_eq!(args.temperature, Some(0.7));
                assert_eq!(args.chunking.chunk_size, Some(500));
                assert_eq!(args.chunking.overlap, Some(50));
                assert!(args.json);
            }
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn chunking_flags_overlay_config() {
        let cli = Cli::parse_from(["docrag", "chunks", "a.txt", "--overlap", "10"]);
        let Command::Chunks(args) = cli.command else {
            panic!("expected chunks command");
        };
        let mut chunking = ChunkingConfig::default();
        args.chunking.apply(&mut chunking);
        assert_eq!(chunking.chunk_size, docrag::chunking::DEFAULT_CHUNK_SIZE);
        assert_eq!(chunking.overlap, 10);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["docrag", "-q", "-v", "formats"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }
}
