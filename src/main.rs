use std::{path::Path, process::ExitCode};

use clap::Parser;
use docrag::{
    Answer, Config, ExtractorRegistry, OpenAiChatModel, OpenAiEmbedder,
    Pipeline,
    error::{Error, Result},
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{AskArgs, ChunksArgs, Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCRAG_LOG") {
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

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let registry = ExtractorRegistry::default();

    match cli.command {
        Command::Ask(args) => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_ask(config, &registry, &args).await
        }
        Command::Chunks(args) => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_chunks(config, &registry, &args)
        }
        Command::Formats => {
            cmd_formats(&registry);
            Ok(())
        }
        Command::Config(args) => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_config(&config, args.json)
        }
        Command::Completions(args) => {
            args.generate();
            Ok(())
        }
    }
}

fn apply_ask_overrides(config: &mut Config, args: &AskArgs) -> Result<()> {
    if let Some(ref model) = args.model {
        config.generation.model = model.clone();
    }
    if let Some(ref model) = args.embedding_model {
        config.embedding.model = model.clone();
    }
    if let Some(temperature) = args.temperature {
        config.generation.temperature = temperature;
    }
    if let Some(top_k) = args.top_k {
        config.retrieval.top_k = top_k;
    }
    args.chunking.apply(&mut config.chunking);

    if let Some(ref path) = args.system_prompt_file {
        config.generation.system_prompt =
            std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!(
                    "cannot read system prompt {}: {e}",
                    path.display()
                ))
            })?;
    }

    Ok(())
}

#[derive(Serialize)]
struct AskReport<'a> {
    document: &'a Path,
    query: &'a str,
    model: &'a str,
    #[serde(flatten)]
    answer: &'a Answer,
}

async fn cmd_ask(
    mut config: Config,
    registry: &ExtractorRegistry,
    args: &AskArgs,
) -> Result<()> {
    apply_ask_overrides(&mut config, args)?;
    config.validate()?;

    let text = registry.extract(&args.document)?;

    let endpoint = config.endpoint()?;
    info!(
        base_url = %endpoint.base_url,
        api_key = %endpoint.masked_key(),
        chat_model = %config.generation.model,
        embedding_model = %config.embedding.model,
        "resolved endpoint"
    );

    let embedder = OpenAiEmbedder::new(&endpoint, config.embedding.model.as_str())?;
    let chat = OpenAiChatModel::new(&endpoint)?;

    let mut pipeline = Pipeline::new(&embedder, &chat, config.pipeline_options());
    let answer = pipeline
        .run(&text, &args.query, &config.generation.system_prompt)
        .await?;

    if args.json {
        print_json(&AskReport {
            document: &args.document,
            query: &args.query,
            model: &config.generation.model,
            answer: &answer,
        })?;
    } else {
        println!("{}", answer.text.trim_end());
        if args.show_context {
            for (i, reference) in answer.references.iter().enumerate() {
                println!();
                println!(
                    "--- reference {} (chunk {}, score {:.3}) ---",
                    i + 1,
                    reference.position,
                    reference.score
                );
                println!("{}", reference.text.trim_end());
            }
        }
    }

    Ok(())
}

fn cmd_chunks(
    mut config: Config,
    registry: &ExtractorRegistry,
    args: &ChunksArgs,
) -> Result<()> {
    args.chunking.apply(&mut config.chunking);
    config.chunking.validate()?;

    let text = registry.extract(&args.document)?;
    let chunks = config.chunking.split(&text);

    if args.json {
        print_json(&chunks)?;
    } else if chunks.is_empty() {
        println!("Document is empty.");
    } else {
        for chunk in &chunks {
            println!(
                "--- chunk {} (offset {}, {} chars) ---",
                chunk.index,
                chunk.start_offset,
                chunk.text.chars().count()
            );
            println!("{}", chunk.text.trim_end());
        }
        println!("\n{} chunk(s)", chunks.len());
    }

    Ok(())
}

fn cmd_formats(registry: &ExtractorRegistry) {
    for (extension, extractor) in registry.entries() {
        println!("{extension}\t{extractor}");
    }
}

fn cmd_config(config: &Config, json: bool) -> Result<()> {
    let shown = config.redacted();
    if json {
        print_json(&shown)
    } else {
        let rendered = toml::to_string_pretty(&shown)
            .map_err(|e| Error::Config(format!("cannot render config: {e}")))?;
        print!("{rendered}");
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}
