mod cli;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use quarry_core::config::VectorBackend;
use quarry_core::{Config, DefaultEngine};
use quarry_index::funnel::token_savings_percent;
use quarry_index::{AssembledContext, IndexReport};
use quarry_memory::job::JobMemoryManager;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = cli.config_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Index {
            path,
            job_id,
            memory_out,
        } => {
            let engine = DefaultEngine::from_config(&config, job_id)?;
            if config.vector_store.backend == VectorBackend::Memory {
                tracing::warn!("memory backend selected: the index is discarded on exit");
            }
            let report = engine.index_path(&path).await?;
            print_report(&report);
            finish(&engine, memory_out).await?;
        }
        Command::Query {
            text,
            input,
            job_id,
            memory_out,
            json,
        } => {
            let engine = DefaultEngine::from_config(&config, job_id)?;
            let report = engine.index_path(&input).await?;
            print_report(&report);
            let context = engine.query(&text).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&context).context("failed to encode context")?
                );
            } else {
                print_context(&context);
            }
            finish(&engine, memory_out).await?;
        }
        Command::Memory { file, max_tokens } => {
            let manager = JobMemoryManager::load_from_file(&file, config.job_memory.clone())
                .await
                .with_context(|| format!("failed to load job memory from {}", file.display()))?;
            println!("{}", manager.compressed_memory(max_tokens));
        }
    }

    Ok(())
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn finish(engine: &DefaultEngine, memory_out: Option<PathBuf>) -> anyhow::Result<()> {
    let path = memory_out.unwrap_or_else(|| engine.default_memory_path());
    engine.finish(&path).await?;
    println!("Job memory saved to {}", path.display());
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!("Files processed:  {}", report.files_processed);
    println!("Chunks indexed:   {}", report.chunks_indexed);
    println!("Total tokens:     {}", report.statistics.total_tokens);
    println!("Avg tokens/chunk: {}", report.statistics.avg_tokens_per_chunk);
    for failure in &report.failures {
        println!("Skipped {}: {}", failure.path.display(), failure.error);
    }
}

fn print_context(context: &AssembledContext) {
    if context.is_empty() {
        println!("No relevant context found.");
        return;
    }
    println!("Chunks:         {}", context.num_chunks());
    println!("Context tokens: {}", context.total_tokens);
    println!("Sources:        {}", context.sources.join(", "));
    println!("Retrieval time: {:.0} ms", context.retrieval_time_ms);
    println!(
        "Token savings:  {:.1}%",
        token_savings_percent(context.total_tokens)
    );
    println!();
    println!("{}", context.context);
}
