//! ferry-ctl — command-line client for the Ferry daemon.

use anyhow::{Context, Result};

use ferry_core::config::FerryConfig;
use ferry_services::TransferSettings;

mod cmd;

use cmd::files::{cmd_delete, cmd_download, cmd_list, cmd_upload};

fn print_usage() {
    println!("Usage: ferry-ctl [--server <addr>] <command>");
    println!();
    println!("Commands:");
    println!("  upload <path> [name]       Send a local file to the daemon");
    println!("  download <name> [path]     Fetch a stored file");
    println!("  list [--json]              Show stored files");
    println!("  delete <name>              Remove a stored file");
    println!("  help                       Show this message");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = FerryConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        FerryConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --server option
    let mut server = config.network.server.clone();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--server" {
            i += 1;
            server = args.get(i).context("--server requires a value")?.clone();
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    let settings = TransferSettings::from(&config.transfer);

    match remaining.as_slice() {
        ["upload", path]               => cmd_upload(&server, settings, path, None).await,
        ["upload", path, name]         => cmd_upload(&server, settings, path, Some(*name)).await,
        ["download", name]             => cmd_download(&server, settings, name, None).await,
        ["download", name, path]       => cmd_download(&server, settings, name, Some(*path)).await,
        ["list"] | []                  => cmd_list(&server, settings, false).await,
        ["list", "--json"]             => cmd_list(&server, settings, true).await,
        ["delete", name]               => cmd_delete(&server, settings, name).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
