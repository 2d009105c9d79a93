//! WebSocket transport
//!
//! Client side of the popsub JSON protocol. Responsibilities:
//! - open the WebSocket and run the login -> auth handshake when credentials
//!   are configured
//! - translate publish/subscribe calls into protocol frames
//! - read `message` frames in a background task, stamp them and push them
//!   into the delivery sink, acknowledging QoS=1 deliveries
//!
//! The protocol has no publish acknowledgment, so a publish is complete once
//! its frame has been flushed to the socket.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use super::message::{ClientMessage, ServerMessage};
use super::{
    ConnectOptions, Connector, Credentials, Delivery, DeliverySink, TopicFilters, Transport,
};
use crate::bench::message::{QoS, now_nanos};
use crate::utils::{TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = Arc<tokio::sync::Mutex<SplitSink<WsStream, WsMessage>>>;
type SharedSink = Arc<Mutex<Option<DeliverySink>>>;

fn encode(frame: &ClientMessage) -> TransportResult<WsMessage> {
    serde_json::to_string(frame)
        .map(WsMessage::text)
        .map_err(|e| TransportError::Publish(e.to_string()))
}

async fn next_server_message(
    ws: &mut WsStream,
    limit: Duration,
) -> TransportResult<ServerMessage> {
    loop {
        let frame = timeout(limit, ws.next())
            .await
            .map_err(|_| TransportError::ConnectTimeout(limit))?
            .ok_or(TransportError::Closed)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if !frame.is_text() {
            continue;
        }
        let text = frame
            .to_text()
            .map_err(|e| TransportError::Auth(e.to_string()))?;
        return serde_json::from_str(text)
            .map_err(|e| TransportError::Auth(format!("unexpected frame: {e}")));
    }
}

/// Runs login -> auth on a fresh connection.
async fn authenticate(
    ws: &mut WsStream,
    credentials: &Credentials,
    limit: Duration,
) -> TransportResult<()> {
    let login = ClientMessage::Login {
        username: credentials.username.clone(),
        password: credentials.password.clone(),
    };
    ws.send(encode(&login)?)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let token = match next_server_message(ws, limit).await? {
        ServerMessage::LoginResponse { token } => token,
        ServerMessage::Error { message } => return Err(TransportError::Auth(message)),
        other => return Err(TransportError::Auth(format!("unexpected reply {other:?}"))),
    };

    ws.send(encode(&ClientMessage::Auth { token })?)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    match next_server_message(ws, limit).await? {
        ServerMessage::Authenticated {} => Ok(()),
        ServerMessage::Error { message } => Err(TransportError::Auth(message)),
        other => Err(TransportError::Auth(format!("unexpected reply {other:?}"))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, options: &ConnectOptions) -> TransportResult<Box<dyn Transport>> {
        let connecting = connect_async(options.endpoint.as_str());
        let (mut ws, _response) = timeout(options.connect_timeout, connecting)
            .await
            .map_err(|_| TransportError::ConnectTimeout(options.connect_timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if let Some(credentials) = &options.credentials {
            authenticate(&mut ws, credentials, options.connect_timeout).await?;
        }

        let (ws_sender, ws_receiver) = ws.split();
        let writer: Writer = Arc::new(tokio::sync::Mutex::new(ws_sender));
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let reader = tokio::spawn(read_loop(
            ws_receiver,
            writer.clone(),
            sink.clone(),
            options.client_id.clone(),
        ));

        Ok(Box::new(WsTransport {
            writer,
            sink,
            reader,
            ack_timeout: options.ack_timeout,
        }))
    }
}

async fn read_loop(
    mut ws_receiver: SplitStream<WsStream>,
    writer: Writer,
    sink: SharedSink,
    client_id: String,
) {
    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "websocket receive failed");
                break;
            }
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Message {
                topic,
                payload,
                message_id,
                qos,
                ..
            }) => {
                let received_at = now_nanos();
                let sink = sink
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                if let Some(sink) = sink {
                    let _ = sink.send(Delivery {
                        topic,
                        payload: payload.into_bytes(),
                        received_at,
                    });
                }
                if qos == 1 {
                    if let Ok(ack) = encode(&ClientMessage::Ack { message_id }) {
                        if let Err(e) = writer.lock().await.send(ack).await {
                            warn!(client_id = %client_id, error = %e, "failed to acknowledge delivery");
                        }
                    }
                }
            }
            Ok(ServerMessage::Error { message }) => {
                warn!(client_id = %client_id, %message, "broker reported an error");
            }
            Ok(_) => {}
            Err(err) => {
                debug!(
                    client_id = %client_id,
                    "ignoring frame: {err} | {}",
                    &text.chars().take(100).collect::<String>()
                );
            }
        }
    }
    debug!(client_id = %client_id, "receive loop closed");
}

pub struct WsTransport {
    writer: Writer,
    sink: SharedSink,
    reader: JoinHandle<()>,
    ack_timeout: Duration,
}

impl WsTransport {
    async fn send(&self, frame: WsMessage) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;
        timeout(self.ack_timeout, writer.send(frame))
            .await
            .map_err(|_| TransportError::AckTimeout(self.ack_timeout))?
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> TransportResult<()> {
        let payload =
            String::from_utf8(payload).map_err(|e| TransportError::Publish(e.to_string()))?;
        let frame = encode(&ClientMessage::Publish {
            topic: topic.to_string(),
            payload,
            message_id: None,
            qos: Some(qos.into()),
        })?;
        self.send(frame).await
    }

    async fn subscribe(
        &mut self,
        filters: &TopicFilters,
        sink: DeliverySink,
    ) -> TransportResult<()> {
        if filters.is_empty() {
            return Err(TransportError::Subscribe("no topic filters".to_string()));
        }
        *self
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);

        for topic in filters.keys() {
            let frame = encode(&ClientMessage::Subscribe {
                topic: topic.clone(),
            })?;
            self.send(frame)
                .await
                .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "websocket close failed");
        }
        self.reader.abort();
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
