//! WebSocket driver for recognition sessions.
//!
//! The socket task owns the session and never blocks on analysis: each
//! attempt runs as its own task and reports back through its join
//! handle, with at most one in flight per session.

use axum::extract::ws::{Message, WebSocket};
use futures::future::OptionFuture;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::catalog::Catalog;
use crate::recognizer::messages::{ControlMessage, StatusMessage};
use crate::recognizer::{pcm_from_le_bytes, run_attempt, AttemptResult, Phase, Session, SessionConfig};

pub async fn drive(socket: WebSocket, catalog: Catalog) {
    if let Err(err) = run(socket, catalog, SessionConfig::default()).await {
        debug!(error = %err, "recognition session closed by transport");
    }
}

async fn run(
    socket: WebSocket,
    catalog: Catalog,
    cfg: SessionConfig,
) -> Result<(), axum::Error> {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::new(cfg.clone());
    let mut attempt: Option<JoinHandle<AttemptResult>> = None;
    let mut ticker = interval(cfg.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_rx = Instant::now();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                last_rx = Instant::now();
                let Some(Ok(message)) = incoming else {
                    // client disappeared; tear down silently
                    break;
                };
                if !handle_frame(message, &mut session, &mut sender).await? {
                    break;
                }
            }

            Some(result) = OptionFuture::from(attempt.as_mut()) => {
                attempt = None;
                let outcome = result.unwrap_or_else(|err| {
                    AttemptResult::Skipped(format!("attempt task failed: {err}"))
                });
                if let Some(terminal) = session.complete_attempt(outcome) {
                    send(&mut sender, &terminal).await?;
                    break;
                }
            }

            _ = ticker.tick() => {
                if last_rx.elapsed() >= cfg.idle_timeout {
                    session.fail();
                    send(&mut sender, &StatusMessage::error("no audio received; closing session")).await?;
                    break;
                }
                if session.phase() == Phase::Listening && session.total_secs() > 0.0 {
                    send(&mut sender, &StatusMessage::listening(session.buffered_secs())).await?;
                }
            }
        }

        if attempt.is_none() && session.ready_for_attempt() {
            let samples = session.begin_attempt();
            send(&mut sender, &StatusMessage::Analyzing).await?;

            let catalog = catalog.clone();
            let budget = cfg.attempt_timeout;
            attempt = Some(tokio::spawn(async move {
                match tokio::time::timeout(budget, run_attempt(catalog, samples)).await {
                    Ok(result) => result,
                    Err(_) => AttemptResult::Skipped("analysis attempt timed out".to_string()),
                }
            }));
        }
    }

    // Any in-flight attempt finishes detached; its result is discarded.
    Ok(())
}

/// Process one client frame. Returns `false` when the session is over.
async fn handle_frame(
    message: Message,
    session: &mut Session,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Result<bool, axum::Error> {
    match message {
        Message::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
            Ok(ControlMessage::Config { sample_rate }) => {
                if let Err(err) = session.configure(sample_rate) {
                    session.fail();
                    send(sender, &StatusMessage::error(err.to_string())).await?;
                    return Ok(false);
                }
            }
            // stop cancels the session silently, like a disconnect
            Ok(ControlMessage::Stop) => return Ok(false),
            Err(_) => {}
        },
        Message::Binary(bytes) => {
            let pcm = pcm_from_le_bytes(&bytes);
            if let Err(err) = session.ingest(&pcm) {
                session.fail();
                send(sender, &StatusMessage::error(err.to_string())).await?;
                return Ok(false);
            }
        }
        Message::Close(_) => return Ok(false),
        Message::Ping(_) | Message::Pong(_) => {}
    }
    Ok(true)
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &StatusMessage,
) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "failed to serialize status message");
            return Ok(());
        }
    };
    sender.send(Message::Text(payload)).await
}
