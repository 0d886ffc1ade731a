//! Read and write tasks of a single client.
//!
//! Both tasks `select!` on the client's cancellation token, so a forced
//! close (replacement, slow consumer eviction) interrupts them even while
//! they wait on the socket. Whichever task ends first cancels the token and
//! unregisters; the second unregister is a no-op.

use std::future::Future;
use std::sync::Arc;

use consult_core::{MessageStore, NewMessage, Profile};
use consult_protocol::{decode_inbound, ChatInput, OutboundMessage, ServerFrame};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ClientContext, ClientError, ClientSettings};
use crate::hub::{HubError, OutboundFrame};
use crate::transport::{FrameReader, FrameWriter, TransportError};

/// Why a task stopped, for logging.
#[derive(Debug, Clone, Copy)]
enum Exit {
    Cancelled,
    PeerClosed,
    ReadFailed,
    IdleTimeout,
    QueueClosed,
    WriteFailed,
    WriteTimeout,
    HubGone,
}

pub(crate) async fn read_loop<R: FrameReader>(
    mut reader: R,
    ctx: ClientContext,
    messages: Arc<dyn MessageStore>,
    profile: Profile,
    settings: ClientSettings,
) {
    let exit = loop {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => break Exit::Cancelled,
            result = timeout(settings.idle_timeout, reader.recv()) => result,
        };

        let text = match next {
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => break Exit::PeerClosed,
            Ok(Err(e)) => {
                debug!(connection_id = %ctx.connection_id, error = %e, "Socket read failed");
                break Exit::ReadFailed;
            }
            Err(_) => break Exit::IdleTimeout,
        };

        match handle_frame(&ctx, messages.as_ref(), &profile, &settings, &text).await {
            Ok(()) => {}
            Err(ClientError::Hub(HubError::ChannelClosed)) => break Exit::HubGone,
            Err(e) => {
                warn!(
                    session_id = %ctx.session_id,
                    user_id = %ctx.user_id,
                    connection_id = %ctx.connection_id,
                    error = %e,
                    "Dropping inbound frame"
                );
                let notice = ServerFrame::error(&e.notice());
                if !ctx.hub.send_to(ctx.session_id, ctx.connection_id, notice).await {
                    debug!(connection_id = %ctx.connection_id, "Error notice not queued");
                }
            }
        }
    };

    info!(
        session_id = %ctx.session_id,
        user_id = %ctx.user_id,
        connection_id = %ctx.connection_id,
        exit = ?exit,
        "Read task stopped"
    );

    ctx.cancel.cancel();
    ctx.unregister().await;
}

/// Processes one inbound frame. Persistence strictly precedes broadcast.
async fn handle_frame(
    ctx: &ClientContext,
    messages: &dyn MessageStore,
    profile: &Profile,
    settings: &ClientSettings,
    text: &str,
) -> Result<(), ClientError> {
    let input = decode_inbound(text, settings.max_frame_bytes)?.into_input()?;

    match input {
        ChatInput::Typing => {
            let frame = ServerFrame::typing(ctx.session_id, ctx.user_id);
            ctx.hub
                .broadcast(ctx.session_id, frame, Some(ctx.user_id))
                .await?;
        }
        ChatInput::Message {
            kind,
            body,
            attachment,
        } => {
            let stored = messages
                .save(NewMessage {
                    session_id: ctx.session_id,
                    sender_id: ctx.user_id,
                    kind,
                    body,
                    attachment,
                })
                .await
                .map_err(ClientError::Persistence)?;

            let frame = ServerFrame::message(OutboundMessage::from_stored(&stored, profile));
            let delivered = ctx
                .hub
                .broadcast(ctx.session_id, frame, Some(ctx.user_id))
                .await?;

            debug!(
                session_id = %ctx.session_id,
                message_id = %stored.id,
                kind = %stored.kind,
                delivered,
                "Message relayed"
            );
        }
    }

    Ok(())
}

pub(crate) async fn write_loop<W: FrameWriter>(
    mut writer: W,
    ctx: ClientContext,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    settings: ClientSettings,
) {
    let mut heartbeat = interval_at(
        Instant::now() + settings.heartbeat_interval,
        settings.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => break Exit::Cancelled,

            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break Exit::QueueClosed;
                };
                if let Err(exit) = write_bounded(&ctx, &settings, writer.send(frame.to_string())).await {
                    break exit;
                }
            }

            _ = heartbeat.tick() => {
                if let Err(exit) = write_bounded(&ctx, &settings, writer.ping()).await {
                    break exit;
                }
            }
        }
    };

    if matches!(exit, Exit::WriteTimeout) {
        warn!(
            session_id = %ctx.session_id,
            connection_id = %ctx.connection_id,
            "Socket write timed out"
        );
    }

    if let Ok(Err(e)) = timeout(settings.write_timeout, writer.close()).await {
        debug!(connection_id = %ctx.connection_id, error = %e, "Socket close failed");
    }

    info!(
        session_id = %ctx.session_id,
        user_id = %ctx.user_id,
        connection_id = %ctx.connection_id,
        exit = ?exit,
        "Write task stopped"
    );

    ctx.cancel.cancel();
    ctx.unregister().await;
}

/// Runs one socket write, bounded by the write timeout and the client token.
async fn write_bounded<F>(ctx: &ClientContext, settings: &ClientSettings, write: F) -> Result<(), Exit>
where
    F: Future<Output = Result<(), TransportError>>,
{
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(Exit::Cancelled),
        result = timeout(settings.write_timeout, write) => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(connection_id = %ctx.connection_id, error = %e, "Socket write failed");
                Err(Exit::WriteFailed)
            }
            Err(_) => Err(Exit::WriteTimeout),
        },
    }
}
