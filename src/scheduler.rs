use chrono::Utc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{interval, MissedTickBehavior};

use crate::commands::{Commands, Reply};
use crate::error::Error;
use crate::shutdown::ShutdownSignal;

/// Drive crawl and notify cycles and serve command lines from `input` until
/// `signal` fires.
///
/// Everything runs inline on one loop, so a crawl, a notify and a command
/// never overlap and all of them share the service's rate gate and search
/// cache. Both intervals tick immediately on start; ticks missed while
/// something runs are dropped. Replies are written to `output`, one line per
/// reply line, errors prefixed with `error: `. Closing `input` stops command
/// handling but not the cycles.
pub async fn run<R, W>(
    commands: &Commands<'_>,
    crawl_every: Duration,
    notify_every: Duration,
    input: R,
    mut output: W,
    signal: ShutdownSignal,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let service = commands.service();
    let mut crawl = interval(crawl_every);
    crawl.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut notify = interval(notify_every);
    notify.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = input.lines();
    let mut input_open = true;

    tracing::info!(
        crawl_every_secs = crawl_every.as_secs(),
        notify_every_secs = notify_every.as_secs(),
        "Scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = signal.cancelled() => break,
            _ = crawl.tick() => {
                if let Err(e) = service.refresh_feeds(Utc::now()).await {
                    tracing::warn!(error = %e, "Crawl cycle failed");
                }
            }
            _ = notify.tick() => {
                match service.announce(&signal).await {
                    Ok(_) => {}
                    Err(Error::Canceled) => break,
                    Err(e) => tracing::warn!(error = %e, "Notify cycle failed"),
                }
            }
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let reply = commands.execute(&line, &signal).await;
                    if let Err(e) = write_reply(&mut output, &reply).await {
                        tracing::warn!(error = %e, "Failed to write command reply");
                    }
                }
                Ok(None) => {
                    tracing::info!("Command input closed");
                    input_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read command input");
                    input_open = false;
                }
            },
        }
    }

    tracing::info!("Scheduler stopped");
}

async fn write_reply<W: AsyncWrite + Unpin>(output: &mut W, reply: &Reply) -> std::io::Result<()> {
    let prefix = if reply.is_error { "error: " } else { "" };
    output
        .write_all(format!("{prefix}{}\n", reply.text).as_bytes())
        .await?;
    output.flush().await
}
