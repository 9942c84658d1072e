//! Runbox CLI
//!
//! Command-line interface for classifying, linting, and running code in
//! the sandbox.

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

use runbox::classify::classify;
use runbox::config::{config_path, load_config, save_config, Config};
use runbox::handoff::HandoffStore;
use runbox::lint::lint;
use runbox::sandbox::{create_engines, LogRecord, PromptInput, RecordKind};
use runbox::session::SandboxSession;
use runbox::VERSION;

#[derive(Parser)]
#[command(
    name = "runbox",
    author = "Runbox Contributors",
    version = VERSION,
    about = "Runbox - sandboxed code execution with AI-assisted fix replay",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a source file or inline code
    Classify {
        /// File to read; use --code for inline text
        file: Option<PathBuf>,
        /// Inline code
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Lint HTML/CSS without executing
    Lint {
        /// File to read; use --code for inline text
        file: Option<PathBuf>,
        /// Inline code
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Execute code in the sandbox and print its output
    Run {
        /// File to read; use --code for inline text
        file: Option<PathBuf>,
        /// Inline code
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runbox=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { file, code } => {
            let source = read_source(file, code)?;
            let classification = classify(&source);
            println!(
                "{} {}",
                style("type:").dim(),
                style(classification.code_type).cyan()
            );
            println!(
                "{} {:?}",
                style("strategy:").dim(),
                classification.strategy
            );
            if classification.features.has_libraries {
                println!(
                    "{} {}",
                    style("libraries:").dim(),
                    classification.features.libraries.join(", ")
                );
            }
            Ok(())
        }

        Commands::Lint { file, code } => {
            let source = read_source(file, code)?;
            let classification = classify(&source);
            let records = lint(&source, classification.code_type);
            if records.is_empty() {
                println!("{}", style("clean").green());
                Ok(())
            } else {
                for record in &records {
                    print_record(record);
                }
                std::process::exit(1);
            }
        }

        Commands::Run { file, code } => {
            let source = read_source(file, code)?;
            let config = load_config()?;
            let engines = create_engines(&config.host, Arc::new(PromptInput))?;
            let handoff = HandoffStore::new(config.handoff.ttl);
            let mut session = SandboxSession::new(config, engines, handoff)?;

            session.set_source(source);
            println!(
                "{} {}",
                style("classified as").dim(),
                style(session.classification().code_type).cyan()
            );

            let success = session.run_to_completion().await?;
            for record in session.log() {
                print_record(record);
            }
            if let Some(doc) = session.document() {
                println!(
                    "{} {} bytes (serve it with runbox-server)",
                    style("document:").dim(),
                    doc.len()
                );
            }

            if success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }

        Commands::InitConfig { force } => {
            let path = config_path();
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            save_config(&Config::default(), &path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

fn read_source(file: Option<PathBuf>, code: Option<String>) -> anyhow::Result<String> {
    match (file, code) {
        (_, Some(code)) => Ok(code),
        (Some(path), None) => Ok(std::fs::read_to_string(path)?),
        (None, None) => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn print_record(record: &LogRecord) {
    let line = match record.kind {
        RecordKind::Error => style(format!("error: {}", record.message)).red(),
        RecordKind::Warning => style(format!("warning: {}", record.message)).yellow(),
        RecordKind::Info => style(record.message.clone()).cyan(),
        RecordKind::Success => style(record.message.clone()).green(),
        RecordKind::Log => style(record.message.clone()),
    };
    println!("{}", line);
    if let Some(ref stack) = record.stack {
        for frame in stack.lines() {
            println!("  {}", style(frame).dim());
        }
    }
}
