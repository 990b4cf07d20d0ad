use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, warn};

use crate::dispatch::Dispatcher;
use crate::limits::MAX_LINE_LEN;
use crate::model::{ChatId, MessageId, UserId};
use crate::transport::{Button, OutgoingMessage, Transport, TransportError, Update};

/// One line written back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Message {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keyboard: Vec<Vec<Button>>,
    },
    Delete {
        chat_id: ChatId,
        message_id: MessageId,
    },
    CallbackAnswer {
        callback_id: String,
        text: String,
    },
    /// The inbound line could not be decoded.
    Error {
        message: String,
    },
}

#[derive(Debug)]
pub enum GatewayError {
    Io(io::Error),
    Codec(LinesCodecError),
    Encode(serde_json::Error),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Io(e) => write!(f, "io error: {e}"),
            GatewayError::Codec(e) => write!(f, "line codec error: {e}"),
            GatewayError::Encode(e) => write!(f, "encode error: {e}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<io::Error> for GatewayError {
    fn from(e: io::Error) -> Self {
        GatewayError::Io(e)
    }
}

impl From<LinesCodecError> for GatewayError {
    fn from(e: LinesCodecError) -> Self {
        GatewayError::Codec(e)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Encode(e)
    }
}

/// Transport bound to one client connection. Message ids count up from 1.
pub struct ConnectionTransport {
    tx: mpsc::UnboundedSender<Outbound>,
    next_id: AtomicI64,
}

impl ConnectionTransport {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            tx,
            next_id: AtomicI64::new(1),
        }
    }

    fn push(&self, out: Outbound) -> Result<(), TransportError> {
        self.tx.send(out).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for ConnectionTransport {
    async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<MessageId, TransportError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.push(Outbound::Message {
            chat_id: chat,
            message_id,
            text: message.text,
            keyboard: message.keyboard,
        })?;
        Ok(message_id)
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError> {
        self.push(Outbound::Delete {
            chat_id: chat,
            message_id: message,
        })
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError> {
        self.push(Outbound::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
        })
    }
}

/// Feeds one sender's updates to the dispatcher in arrival order, so a
/// sender whose slot is busy never holds up the rest of the connection.
fn spawn_forwarder(
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
) -> (mpsc::UnboundedSender<Update>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Update>();
    let handle = tokio::spawn(async move {
        let mut last = None;
        while let Some(update) = rx.recv().await {
            match dispatcher.dispatch(update, transport.clone()).await {
                Ok(handle) => last = Some(handle),
                Err(e) => error!("dispatch failed: {e}"),
            }
        }
        // Units for one sender finish in order; the last one implies the rest.
        if let Some(handle) = last {
            let _ = handle.await;
        }
    });
    (tx, handle)
}

/// Serve one newline-delimited JSON client until it disconnects.
///
/// Replies for every accepted update are flushed before this returns.
pub async fn process_connection(
    socket: TcpStream,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), GatewayError> {
    let framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let (mut sink, mut lines) = framed.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            sink.send(serde_json::to_string(&out)?).await?;
        }
        Ok::<(), GatewayError>(())
    });

    let transport: Arc<dyn Transport> = Arc::new(ConnectionTransport::new(out_tx.clone()));
    let mut forwarders: HashMap<UserId, (mpsc::UnboundedSender<Update>, JoinHandle<()>)> =
        HashMap::new();

    let mut read_result = Ok(());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            // The codec stops yielding after any error, so this ends the session.
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("closing connection: line over {MAX_LINE_LEN} bytes");
                let _ = out_tx.send(Outbound::Error {
                    message: format!("line exceeds {MAX_LINE_LEN} bytes"),
                });
                break;
            }
            Err(e) => {
                read_result = Err(e.into());
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let update: Update = match serde_json::from_str(&line) {
            Ok(update) => update,
            Err(e) => {
                debug!("undecodable update: {e}");
                let _ = out_tx.send(Outbound::Error {
                    message: e.to_string(),
                });
                continue;
            }
        };

        let (forward, _) = forwarders
            .entry(update.sender.id)
            .or_insert_with(|| spawn_forwarder(dispatcher.clone(), transport.clone()));
        let _ = forward.send(update);
    }

    // Let accepted work finish, then close the writer by dropping every sender.
    for (_, (forward, handle)) in forwarders {
        drop(forward);
        let _ = handle.await;
    }
    drop(transport);
    drop(out_tx);

    match writer.await {
        Ok(result) => result?,
        Err(e) => error!("writer task failed: {e}"),
    }
    read_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_lines_are_tagged() {
        let line = serde_json::to_string(&Outbound::Delete {
            chat_id: 3,
            message_id: 9,
        })
        .unwrap();
        assert_eq!(line, r#"{"type":"delete","chat_id":3,"message_id":9}"#);

        let line = serde_json::to_string(&Outbound::CallbackAnswer {
            callback_id: "cb".into(),
            text: "ok".into(),
        })
        .unwrap();
        assert_eq!(line, r#"{"type":"callback_answer","callback_id":"cb","text":"ok"}"#);
    }

    #[tokio::test]
    async fn connection_transport_numbers_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = ConnectionTransport::new(tx);

        assert_eq!(transport.send(5, OutgoingMessage::text("a")).await.unwrap(), 1);
        assert_eq!(transport.send(5, OutgoingMessage::text("b")).await.unwrap(), 2);
        transport.delete(5, 1).await.unwrap();

        assert!(matches!(rx.recv().await, Some(Outbound::Message { message_id: 1, .. })));
        assert!(matches!(rx.recv().await, Some(Outbound::Message { message_id: 2, .. })));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Delete { chat_id: 5, message_id: 1 })
        );
    }

    #[tokio::test]
    async fn closed_connection_is_a_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let transport = ConnectionTransport::new(tx);
        assert!(matches!(
            transport.answer_callback("cb", "").await,
            Err(TransportError::Closed)
        ));
    }
}
