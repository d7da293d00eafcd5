//! CLI entry point: `llm-tournament run <config.yaml>`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use llm_tournament::bracket::BracketRunner;
use llm_tournament::configuration::{TournamentConfig, TournamentFormat};
use llm_tournament::games::BuiltinGameFactory;
use llm_tournament::league::LeagueRunner;
use llm_tournament::logger::init_logger;
use llm_tournament::tournament::{TournamentEngine, DEFAULT_OUTPUT_DIR};

#[derive(Parser)]
#[command(name = "llm-tournament", about = "Structured tournaments between language-model agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a tournament from a YAML config file.
    Run {
        /// Path to the tournament config.
        config: PathBuf,
        /// Output directory (default: output/runs).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pause for confirmation before starting the final match.
        #[arg(long, default_value_t = false)]
        pause_before_final: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            config,
            output,
            pause_before_final,
        } => run(config, output, pause_before_final),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    config_path: PathBuf,
    output: Option<PathBuf>,
    pause_before_final: bool,
) -> anyhow::Result<()> {
    let output_dir = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("could not create {}", output_dir.display()))?;
    init_logger(Some(&output_dir));

    let mut config = TournamentConfig::load(&config_path)
        .with_context(|| format!("could not load {}", config_path.display()))?;
    config.output_dir = Some(output_dir);

    println!(
        "Tournament: {} (seed={}, format={})",
        config.name,
        config.seed,
        match config.format {
            TournamentFormat::Bracket => "bracket",
            TournamentFormat::League => "league",
        }
    );
    println!("Models: {}", config.model_names().join(", "));
    println!(
        "Events: {}",
        config
            .events
            .iter()
            .map(|e| e.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let format = config.format;
    let engine = Arc::new(TournamentEngine::new(config, Arc::new(BuiltinGameFactory))?);

    match format {
        TournamentFormat::Bracket => {
            let mut runner =
                BracketRunner::new(engine.clone())?.with_pause_before_final(pause_before_final);
            runner.run()?;
            runner.print_bracket();
            println!();
            println!("Telemetry: {}", engine.telemetry_dir().display());
            println!("Manifest:  {}", runner.manifest_path().display());
        }
        TournamentFormat::League => {
            let mut runner = LeagueRunner::new(engine.clone())?;
            runner.run()?;
            println!("Telemetry: {}", engine.telemetry_dir().display());
            println!("Manifest:  {}", runner.manifest_path().display());
        }
    }
    Ok(())
}
