//! Run command: the session engine fed by a stdin JSONL transport.
//!
//! Each stdin line is one JSON envelope from a page-bound reporter.
//! Malformed lines are logged and skipped at the boundary; the engine only
//! ever sees the validated message union. EOF ends every session and writes
//! undelivered payloads to the queue backup for the next run.

use anyhow::{Context, Result};
use tokio::io::AsyncBufReadExt;

use gt_core::message::Envelope;
use gt_engine::backup::QueueBackup;
use gt_engine::dispatch::HttpCollector;
use gt_engine::engine::{Engine, EngineHandle};

use crate::Config;

pub async fn run(config: Config) -> Result<()> {
    let transport = HttpCollector::new().context("failed to build collector client")?;
    let feed = gt_feed::Client::new(config.settings.feed_base.clone())
        .context("failed to build feed client")?;

    let (mut engine, handle) = Engine::new(config.settings, transport, feed);

    let backup = QueueBackup::new(config.queue_backup_path);
    match backup.load() {
        Ok(saved) if !saved.is_empty() => {
            tracing::info!(count = saved.len(), "restored undelivered events from backup");
            engine.restore_queue(saved);
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(error = %err, "could not restore queue backup, starting empty");
        }
    }

    let reader = tokio::spawn(read_stdin(handle));
    let pending = engine.run().await;
    let _ = reader.await;

    backup
        .save(&pending)
        .with_context(|| format!("failed to write {}", backup.path().display()))?;
    if pending.is_empty() {
        tracing::info!("all events delivered");
    } else {
        tracing::warn!(
            pending = pending.len(),
            path = %backup.path().display(),
            "undelivered events saved for next run"
        );
    }
    Ok(())
}

/// Bridges stdin lines onto the engine's command channel, then asks the
/// engine to shut down on EOF.
async fn read_stdin(handle: EngineHandle) {
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Envelope>(line) {
                    Ok(envelope) => {
                        if handle.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping malformed message line");
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "stdin read failed, shutting down");
                break;
            }
        }
    }
    let _ = handle.shutdown().await;
}
