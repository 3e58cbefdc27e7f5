use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use kbsync::{
   Result,
   cmd::{self, sync::SyncArgs},
};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for kbsync
#[derive(Parser)]
#[command(name = "kbsync")]
#[command(about = "Keep a local knowledge snapshot in sync with the hosted knowledge base")]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Option<Cmd>,

   #[arg(long, help = "Rebuild the snapshot from every verified record")]
   full: bool,

   #[arg(long, help = "Records per remote page (default: 1000)")]
   page_size: Option<usize>,

   #[arg(long, global = true, help = "Config file (default: ~/.kbsync/config.toml)")]
   config: Option<PathBuf>,

   #[arg(long, global = true, help = "Snapshot directory (default: ~/.kbsync/snapshot)")]
   data_dir: Option<PathBuf>,

   #[arg(long, global = true, help = "JSON output")]
   json: bool,
}

#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Show the committed snapshot")]
   Status,
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(
         EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kbsync=info")),
      )
      .with_writer(std::io::stderr)
      .init();

   let cli = Cli::parse();
   let label = if cli.command.is_some() { "status" } else { "sync" };
   if let Err(err) = run(cli).await {
      eprintln!("{} {label} failed during {}: {err}", style("✗").red(), err.phase());
      if err.is_retryable() {
         let hint = "retry is safe; the committed snapshot and watermark are consistent";
         eprintln!("  {}", style(hint).dim());
      } else {
         eprintln!("  {}", style("fix the cause above before retrying").dim());
      }
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Some(Cmd::Status) => cmd::status::execute(cli.config, cli.data_dir, cli.json),
      None => {
         cmd::sync::execute(SyncArgs {
            full:      cli.full,
            config:    cli.config,
            data_dir:  cli.data_dir,
            page_size: cli.page_size,
            json:      cli.json,
         })
         .await
      },
   }
}
