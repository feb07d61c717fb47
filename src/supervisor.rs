//! Restarts the ingestion loop after fatal errors

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ragline_core::MessageStream;
use ragline_pipeline::{IngestionPipeline, StopReason};

/// How the supervisor reacts to a failed run.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorPolicy {
    pub restart_delay: Duration,
    pub halt_on_error: bool,
}

/// Keep a consumer running until shutdown.
///
/// Each restart opens a fresh stream with `connect`, which resumes from the
/// last committed offset. With `halt_on_error` the first failure is returned.
pub async fn supervise<F, Fut, S>(
    pipeline: &IngestionPipeline,
    mut connect: F,
    policy: SupervisorPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ragline_core::Result<S>>,
    S: MessageStream,
{
    let mut restarts: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let failure = match connect().await {
            Ok(mut stream) => {
                let outcome = pipeline.run(&mut stream, shutdown.clone()).await;
                if let Err(e) = stream.close().await {
                    warn!(error = %e, "failed to close message stream");
                }
                match outcome {
                    Ok(summary) => {
                        if summary.stopped_by == StopReason::EndOfStream {
                            info!("message stream ended");
                        }
                        return Ok(());
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        error!(kind = ?failure.kind(), error = %failure, restarts, "ingestion stopped");
        if policy.halt_on_error {
            return Err(failure.into());
        }

        restarts += 1;
        info!(delay_ms = policy.restart_delay.as_millis() as u64, "restarting ingestion");
        tokio::select! {
            _ = tokio::time::sleep(policy.restart_delay) => {}
            _ = shutdown.wait_for(|stop| *stop) => return Ok(()),
        }
    }
}

/// Drive `server` alongside background ingestion.
///
/// `server` must finish once `stop` flips. If ingestion ends with an error the
/// server is stopped too and that error is returned; a clean end leaves the
/// server running.
pub async fn run_alongside<S>(
    server: S,
    ingestion: Option<JoinHandle<Result<()>>>,
    stop: &watch::Sender<bool>,
) -> Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    let Some(mut ingestion) = ingestion else {
        return server.await.context("server shutdown");
    };
    tokio::pin!(server);

    tokio::select! {
        served = &mut server => {
            served.context("server shutdown")?;
            stop.send_replace(true);
            ingestion.await.context("ingestion task panicked")?
        }
        finished = &mut ingestion => {
            let outcome = finished.context("ingestion task panicked").and_then(|r| r);
            if let Err(e) = &outcome {
                error!(error = %e, "ingestion halted, stopping the server");
                stop.send_replace(true);
            }
            server.await.context("server shutdown")?;
            outcome
        }
    }
}
