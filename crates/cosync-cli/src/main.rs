//! cosync - replay recorded completion streams through a synchronized conversation

mod commands;
mod config;
mod render;
mod utils;

use anyhow::Context;
use clap::Parser;
use cosync_chat::{ChatService, CompletionTask, ServiceOptions};
use cosync_runtime::{Message, Script, ScriptedClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::config::OutputFormat;
use crate::render::Renderer;

/// cosync - conversation state synchronized with a streaming completion service
#[derive(Parser, Debug)]
#[command(name = "cosync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Response script (JSON) to replay as the completion service
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short, long)]
    prompt: Option<String>,

    /// Print store changes as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(verbose: bool, configured: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("cosync=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("warn")))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();
    init_tracing(args.verbose, cfg.log_filter.as_deref());

    let script_path = args
        .script
        .or_else(|| cfg.script.as_ref().map(PathBuf::from))
        .context("no response script given; pass --script or set `script` in the config file")?;
    let text = std::fs::read_to_string(&script_path)
        .with_context(|| format!("failed to read script {}", script_path.display()))?;
    let script = Script::from_json(&text)
        .with_context(|| format!("invalid script {}", script_path.display()))?;
    tracing::debug!(
        responses = script.responses.len(),
        path = %script_path.display(),
        "loaded response script"
    );

    let mut options = ServiceOptions::new();
    if let Some(ref system) = cfg.system_prompt {
        options = options.with_initial_messages([Message::system(system.clone())]);
    }
    let service = ChatService::new(Arc::new(ScriptedClient::new(script)), options);

    let format = if args.json {
        OutputFormat::Json
    } else {
        cfg.output_format()
    };
    let printer = spawn_printer(&service, Renderer::new(format, cfg.show_busy()));

    if let Some(prompt) = args.prompt {
        run_prompt(&service, prompt).await?;
    } else {
        run_interactive(&service).await?;
    }

    // The printer ends once every handle on the store is gone
    drop(service);
    if let Err(e) = printer.await {
        tracing::warn!("Output task failed: {}", e);
    }
    Ok(())
}

/// Print store events as they arrive
fn spawn_printer(service: &ChatService, mut renderer: Renderer) -> JoinHandle<()> {
    let (current, _busy, mut subscription) = service.store().subscribe_with_current();
    renderer.mark_printed(current.len());

    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            for line in renderer.render(&event) {
                println!("{}", line);
            }
        }
    })
}

async fn run_prompt(service: &ChatService, prompt: String) -> anyhow::Result<()> {
    let Some(task) = service.append(Message::user(prompt), true) else {
        return Ok(());
    };

    let completion = task.join().await?;
    if completion.is_cancelled() {
        eprintln!("Completion cancelled.");
    }
    Ok(())
}

/// Report a failed cycle without blocking the input loop
fn report_failure(task: CompletionTask) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = task.join().await {
            eprintln!("Error: {}", e);
        }
    })
}

async fn run_interactive(service: &ChatService) -> anyhow::Result<()> {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("cosync (type /help for commands)");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reports: Vec<JoinHandle<()>> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match commands::parse_command(input) {
            Some(commands::CommandResult::Stop) => {
                if service.has_active_cycle() {
                    service.stop();
                    println!("Stopped.");
                } else {
                    println!("Nothing to stop.");
                }
            }
            Some(commands::CommandResult::Messages) => {
                let messages = service.messages();
                if messages.is_empty() {
                    println!("No messages.");
                }
                for (i, message) in messages.iter().enumerate() {
                    println!("{:>3} {}", i, render::format_message(message));
                }
            }
            Some(commands::CommandResult::Status) => {
                println!(
                    "{} ({} messages)",
                    if service.is_loading() { "busy" } else { "idle" },
                    service.messages().len()
                );
            }
            Some(commands::CommandResult::Message(msg)) => println!("{}", msg),
            Some(commands::CommandResult::Exit) => {
                service.stop();
                break;
            }
            Some(commands::CommandResult::Unknown(cmd)) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
            None => {
                if let Some(task) = service.append(Message::user(input), true) {
                    reports.retain(|r| !r.is_finished());
                    reports.push(report_failure(task));
                }
            }
        }
    }

    // Let a running completion finish when input ends
    service.wait_for_idle().await;
    for report in reports {
        if let Err(e) = report.await {
            tracing::warn!("Failure report task failed: {}", e);
        }
    }
    Ok(())
}
