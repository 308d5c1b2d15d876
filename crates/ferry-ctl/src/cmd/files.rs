//! File commands — one connection per invocation.

use std::path::Path;

use anyhow::{Context, Result};

use ferry_services::{Client, TransferSettings};

async fn connect(server: &str, settings: TransferSettings) -> Result<Client<tokio::net::TcpStream>> {
    Client::connect(server, settings)
        .await
        .with_context(|| format!("failed to connect to ferryd at {server} — is it running?"))
}

pub async fn cmd_upload(server: &str, settings: TransferSettings, path: &str, name: Option<&str>) -> Result<()> {
    let local = Path::new(path);
    let remote = match name {
        Some(n) => n.to_string(),
        None => local
            .file_name()
            .and_then(|n| n.to_str())
            .context("cannot derive a remote name from the path; pass one explicitly")?
            .to_string(),
    };

    let mut client = connect(server, settings).await?;
    let report = client
        .upload(local, &remote)
        .await
        .with_context(|| format!("upload of {path} failed"))?;

    println!("Uploaded {} ({} bytes, {} chunks, {} retries)", report.name, report.bytes, report.chunks, report.retries);
    Ok(())
}

pub async fn cmd_download(server: &str, settings: TransferSettings, name: &str, path: Option<&str>) -> Result<()> {
    let local = Path::new(path.unwrap_or(name));

    let mut client = connect(server, settings).await?;
    let report = client
        .download(name, local)
        .await
        .with_context(|| format!("download of {name} failed"))?;

    println!("Downloaded {} → {} ({} bytes)", report.name, local.display(), report.bytes);
    Ok(())
}

pub async fn cmd_list(server: &str, settings: TransferSettings, json: bool) -> Result<()> {
    let mut client = connect(server, settings).await?;
    let entries = client.list().await.context("list failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No files stored.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Stored Files ({})", entries.len());
    println!("═══════════════════════════════════════");
    for e in &entries {
        println!("  {:>12}  {}", e.size, e.name);
    }
    Ok(())
}

pub async fn cmd_delete(server: &str, settings: TransferSettings, name: &str) -> Result<()> {
    let mut client = connect(server, settings).await?;
    client
        .delete(name)
        .await
        .with_context(|| format!("delete of {name} failed"))?;

    println!("Deleted {name}");
    Ok(())
}
