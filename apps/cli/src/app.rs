//! Command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use chunkup_uploader::{
    HttpTransport, UploadCallbacks, UploadOptions, UploadProgress, UploadTransport, Uploader,
    UploadStatus, UploaderConfig,
};

/// Uploads `file`, mapping Ctrl-C to a cancel. Prints the stored path.
pub async fn upload(
    config: UploaderConfig,
    file: PathBuf,
    file_id: Option<String>,
) -> anyhow::Result<()> {
    let uploader = Uploader::with_http(config, logging_callbacks())?;
    tracing::debug!(
        chunk_size = uploader.config().chunk_size,
        concurrency = uploader.config().concurrent_limit,
        "uploader ready"
    );

    let watcher = uploader.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, cancelling upload");
            watcher.cancel_upload();
        }
    });

    let outcome = uploader.upload_file_with(&file, UploadOptions { file_id }).await;
    ctrl_c.abort();
    let file_id = uploader.state().file_id;
    uploader.shutdown().await;

    match outcome {
        Ok(result) => {
            if result.size == 0 {
                tracing::info!(hash = %result.hash, "server already had this file");
            }
            println!("{}", result.path);
            Ok(())
        }
        Err(e) => {
            if let Some(id) = file_id {
                eprintln!(
                    "resume with: chunkup upload {} --file-id {id}",
                    file.display()
                );
            }
            Err(e.into())
        }
    }
}

/// Prints the chunk indices the server holds for `file_id`.
pub async fn list_chunks(config: UploaderConfig, file_id: &str) -> anyhow::Result<()> {
    let transport = HttpTransport::new(&config.server_url, config.request_timeout())?;
    let reply = transport.list_chunks(file_id).await?;
    let indices: Vec<String> = reply.chunks.iter().map(ToString::to_string).collect();
    println!("{} chunk(s): {}", reply.chunks.len(), indices.join(" "));
    Ok(())
}

/// Deletes the server-side chunks of an unfinished upload.
pub async fn discard(config: UploaderConfig, file_id: &str) -> anyhow::Result<()> {
    let uploader = Uploader::with_http(config, UploadCallbacks::default())?;
    let result = uploader.discard(file_id).await;
    uploader.shutdown().await;
    result?;
    println!("discarded {file_id}");
    Ok(())
}

fn logging_callbacks() -> UploadCallbacks {
    UploadCallbacks {
        on_status_change: Some(Arc::new(|status: UploadStatus| {
            tracing::info!(%status, "status changed");
        })),
        on_hash_progress: Some(Arc::new(|pct: f64| {
            tracing::debug!(percent = %format!("{pct:.0}"), "hashing");
        })),
        on_progress: Some(Arc::new(|p: &UploadProgress| {
            tracing::info!(
                percent = %format!("{:.1}", p.percentage),
                chunks = %format!("{}/{}", p.uploaded_chunks, p.total_chunks),
                speed = %format_rate(p.speed),
                eta_secs = p.eta_secs.round() as u64,
                "uploading"
            );
        })),
        ..Default::default()
    }
}

/// Formats a bytes-per-second rate with binary units.
fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_sec.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
