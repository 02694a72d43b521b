use clap::CommandFactory;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use kotekan::generator;
use kotekan::generator::GenerateOptions;
use log::LevelFilter;
use std::{env, io, process};

/// Logging is controlled with RUST_LOG; see docs for the env_logger crate.
/// If RUST_LOG is not set, the log level defaults to Info.
/// Set RUST_LOG=kotekan::module::path=level to see messages for a given module.
/// Set RUST_LOG=kotekan to see all messages.
#[derive(Parser)]
#[command(version, about, long_about = None, verbatim_doc_comment)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe notation into a MIDI file. Without --out the MIDI file is
    /// written next to the notation file.
    Generate(GenerateOptions),
    /// Generate shell completion
    Completion {
        /// shell
        shell: Shell,
    },
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut log_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        log_builder.filter_level(LevelFilter::Info);
    }
    log_builder.init();

    match cli.command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Generate(options) => generator::run(options),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(2);
    }
}
