//! Connection actor.
//!
//! One reader loop per connection handles inbound events strictly in order.
//! Outbound events (replies, pushes, presence) go through a bounded queue
//! drained by a separate writer task. Pushes from other connections never
//! wait on that queue; when it is full the registry evicts this connection
//! and the loop below closes it.
//!
//! Handshake: the first frame must be `connect {credential}`. On success the
//! server queues `connected {userId}`, registers the connection and only then
//! starts the writer. `connected` is always the first frame the client reads,
//! and by then the user is already online.
//!
//! Frames are read with a hard cap of `MAX_FRAME_LEN` bytes. An oversized or
//! non-UTF-8 line is skipped and answered with `error "malformed frame"`;
//! the connection stays open.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use hl_proto::codec::{decode_frame, encode_frame, MAX_FRAME_LEN};
use hl_proto::{ClientEvent, ServerEvent, UserId};

use crate::error::CoreError;
use crate::service::ChatService;

const MALFORMED: &str = "malformed frame";
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn serve_connection<S>(stream: S, service: Arc<ChatService>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    let user = match handshake(&mut reader, &mut buf, &service).await {
        Ok(user) => user,
        Err(err) => {
            let message = match &err {
                Handshake::Rejected(e) => e.client_message(),
                Handshake::Protocol(msg) => msg.to_string(),
                Handshake::Io(_) => return Err(anyhow!("handshake: {err}")),
            };
            write_frame(&mut writer, &ServerEvent::error(message)).await?;
            bail!("handshake: {err}");
        }
    };

    let (tx, rx) = mpsc::channel(service.config.outbound_buffer);
    tx.send(ServerEvent::Connected {
        user_id: user.clone(),
    })
    .await
    .map_err(|_| anyhow!("connection closed during handshake"))?;

    let handle = service.presence.connection(tx.clone());
    let connection_id = handle.id;
    let evicted = handle.evicted();
    service.presence.register(&user, handle);
    let mut writer_task = tokio::spawn(write_loop(writer, rx));
    info!(user_id = %user, connection = connection_id, "connected");

    let result = event_loop(&mut reader, &mut buf, &user, &tx, &service, &evicted).await;

    service.presence.unregister(&user, connection_id);
    drop(tx);
    if matches!(result, Ok(Ended::Evicted)) {
        warn!(user_id = %user, connection = connection_id, "evicted, closing connection");
        writer_task.abort();
    }
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await {
        Ok(Ok(Err(e))) => debug!(user_id = %user, error = %e, "writer closed with error"),
        Ok(_) => {}
        Err(_) => writer_task.abort(),
    }
    info!(user_id = %user, connection = connection_id, "disconnected");
    result.map(|_| ())
}

#[derive(Debug, thiserror::Error)]
enum Handshake {
    #[error("{0}")]
    Protocol(&'static str),
    #[error("credential rejected: {0}")]
    Rejected(CoreError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

async fn handshake<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    service: &ChatService,
) -> Result<UserId, Handshake>
where
    R: AsyncBufRead + Unpin,
{
    let timeout = Duration::from_secs(service.config.handshake_timeout_secs);
    let frame = tokio::time::timeout(timeout, read_frame(reader, buf))
        .await
        .map_err(|_| Handshake::Protocol("handshake timed out"))??;
    let line = match frame {
        Frame::Line(line) => line,
        Frame::Invalid(_) => return Err(Handshake::Protocol(MALFORMED)),
        Frame::Eof => return Err(Handshake::Io(std::io::ErrorKind::UnexpectedEof.into())),
    };
    let credential = match decode_frame::<ClientEvent>(&line) {
        Ok(ClientEvent::Connect { credential }) => credential,
        Ok(_) => return Err(Handshake::Protocol("connect required")),
        Err(_) => return Err(Handshake::Protocol(MALFORMED)),
    };
    service
        .auth
        .authenticate(&credential)
        .await
        .map_err(Handshake::Rejected)
}

#[derive(Debug)]
enum Frame {
    Line(String),
    /// Skipped: too long or not UTF-8.
    Invalid(&'static str),
    Eof,
}

/// Read one newline-terminated frame, buffering at most `MAX_FRAME_LEN + 1`
/// bytes. The rest of an oversized line is discarded unbuffered.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_FRAME_LEN as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() != Some(&b'\n') && n as u64 == limit {
        skip_line(reader).await?;
        return Ok(Frame::Invalid("frame too large"));
    }
    match std::str::from_utf8(buf) {
        Ok(line) => Ok(Frame::Line(line.to_owned())),
        Err(_) => Ok(Frame::Invalid("invalid utf-8")),
    }
}

async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    Disconnected,
    Evicted,
}

async fn event_loop<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    user: &UserId,
    tx: &mpsc::Sender<ServerEvent>,
    service: &ChatService,
    evicted: &Notify,
) -> Result<Ended>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = read_frame(reader, buf) => frame?,
            _ = evicted.notified() => return Ok(Ended::Evicted),
        };
        let reply = match frame {
            Frame::Eof => return Ok(Ended::Disconnected),
            Frame::Invalid(reason) => {
                debug!(user_id = %user, reason, "malformed frame");
                Some(ServerEvent::error(MALFORMED))
            }
            Frame::Line(line) if line.trim().is_empty() => None,
            Frame::Line(line) => match decode_frame::<ClientEvent>(&line) {
                Ok(event) => {
                    let name = event.name();
                    match dispatch(service, user, event).await {
                        Ok(reply) => reply,
                        Err(err) => {
                            warn!(user_id = %user, event = name, error = %err, "event failed");
                            Some(ServerEvent::error(err.client_message()))
                        }
                    }
                }
                Err(err) => {
                    debug!(user_id = %user, error = %err, "malformed frame");
                    Some(ServerEvent::error(MALFORMED))
                }
            },
        };
        if let Some(reply) = reply {
            tokio::select! {
                sent = tx.send(reply) => {
                    if sent.is_err() {
                        return Ok(Ended::Disconnected);
                    }
                }
                _ = evicted.notified() => return Ok(Ended::Evicted),
            }
        }
    }
}

async fn dispatch(
    service: &ChatService,
    user: &UserId,
    event: ClientEvent,
) -> Result<Option<ServerEvent>, CoreError> {
    match event {
        ClientEvent::Connect { .. } => Err(CoreError::Validation("already connected".into())),
        ClientEvent::MessageSend {
            receiver_id,
            content,
            message_type,
        } => {
            let receipt = service
                .router
                .send(user, &receiver_id, &content, message_type)
                .await?;
            Ok(Some(ServerEvent::MessageSent {
                message_id: receipt.message_id,
                chat_id: receipt.chat_id,
            }))
        }
        ClientEvent::MessageDelivered { message_ids } => {
            service
                .receipts
                .acknowledge_delivered(user, &message_ids)
                .await?;
            Ok(None)
        }
        ClientEvent::MessageRead { message_ids } => {
            service.receipts.mark_read(user, &message_ids).await?;
            Ok(None)
        }
        ClientEvent::MessageDelete { message_id } => {
            service.receipts.delete(message_id, user).await?;
            Ok(Some(ServerEvent::MessageDeleted { message_id }))
        }
        ClientEvent::TypingStart { receiver_id } => {
            service.router.relay_typing(user, &receiver_id, true).await?;
            Ok(None)
        }
        ClientEvent::TypingStop { receiver_id } => {
            service.router.relay_typing(user, &receiver_id, false).await?;
            Ok(None)
        }
        ClientEvent::HistoryFetch {
            chat_id,
            before,
            limit,
        } => {
            let (chat_id, messages) = service.history.fetch(user, &chat_id, before, limit).await?;
            Ok(Some(ServerEvent::History { chat_id, messages }))
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<ServerEvent>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        write_frame(&mut writer, &event).await?;
    }
    writer.shutdown().await.ok();
    Ok(())
}

async fn write_frame<W>(writer: &mut W, event: &ServerEvent) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(event)?;
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
