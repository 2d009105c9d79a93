use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tungstenite::protocol::Message as WsMessage;

use super::memory::topic_matches;
use super::message::{ClientMessage, ServerMessage};
use super::{
    ConnectOptions, Connector, Credentials, Endpoint, MemoryBroker, MqttConnector, TopicFilters,
    TransportKind, WsConnector,
};
use crate::bench::message::{QoS, decode_timestamp, encode_payload};
use crate::utils::{BenchError, TransportError};

fn options(client_id: &str, endpoint: &str) -> ConnectOptions {
    ConnectOptions {
        client_id: client_id.to_string(),
        endpoint: Endpoint::parse(endpoint).unwrap(),
        credentials: None,
        connect_timeout: Duration::from_secs(2),
        ack_timeout: Duration::from_secs(2),
    }
}

fn filters(topics: &[&str]) -> TopicFilters {
    topics
        .iter()
        .map(|t| (t.to_string(), QoS::AtMostOnce))
        .collect()
}

#[test]
fn test_topic_matching() {
    assert!(topic_matches("sensors/1/temp", "sensors/1/temp"));
    assert!(topic_matches("sensors/1/temp", "sensors/+/temp"));
    assert!(topic_matches("sensors/1/temp", "sensors/#"));
    assert!(topic_matches("sensors", "sensors/#"));
    assert!(topic_matches("anything/at/all", "#"));

    assert!(!topic_matches("sensors/1/temp", "sensors/+"));
    assert!(!topic_matches("sensors/1", "sensors/1/temp"));
    assert!(!topic_matches("1", "2"));
    assert!(!topic_matches("$SYS/uptime", "#"));
    assert!(!topic_matches("$SYS/uptime", "+/uptime"));
    assert!(topic_matches("$SYS/uptime", "$SYS/#"));
}

#[test]
fn test_endpoint_parsing() {
    let bare = Endpoint::parse("10.0.0.5:1884").unwrap();
    assert_eq!(bare.scheme(), "tcp");
    assert_eq!(bare.host(), "10.0.0.5");
    assert_eq!(bare.port(), Some(1884));

    let ws = Endpoint::parse("ws://localhost:8080").unwrap();
    assert_eq!(ws.scheme(), "ws");
    assert_eq!(ws.port(), Some(8080));

    let no_port = Endpoint::parse("tcp://broker").unwrap();
    assert_eq!(no_port.port(), None);
    assert_eq!(no_port.with_default_port(30123).port(), Some(30123));

    let explicit = Endpoint::parse("tcp://broker:1883").unwrap();
    assert_eq!(explicit.with_default_port(30123).port(), Some(1883));

    assert!(matches!(
        Endpoint::parse("tcp://"),
        Err(TransportError::InvalidEndpoint(_))
    ));
    assert!(Endpoint::parse("http://[::1").is_err());
}

#[test]
fn test_credentials_from_parts() {
    assert_eq!(
        Credentials::from_parts(Some("user"), Some("pass")),
        Some(Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        })
    );
    assert_eq!(Credentials::from_parts(Some("user"), None), None);
    assert_eq!(Credentials::from_parts(Some(""), Some("pass")), None);
    assert_eq!(Credentials::from_parts(None, None), None);
}

#[test]
fn test_transport_kind_parsing() {
    assert_eq!("mqtt".parse::<TransportKind>().unwrap(), TransportKind::Mqtt);
    assert_eq!("WS".parse::<TransportKind>().unwrap(), TransportKind::Websocket);
    assert_eq!(
        "websocket".parse::<TransportKind>().unwrap(),
        TransportKind::Websocket
    );
    assert_eq!("memory".parse::<TransportKind>().unwrap(), TransportKind::Memory);
    assert!(matches!(
        "stomp".parse::<TransportKind>(),
        Err(BenchError::UnknownTransport(_))
    ));
}

#[test]
fn test_client_message_serialization() {
    let publish = ClientMessage::Publish {
        topic: "1".to_string(),
        payload: "hello".to_string(),
        message_id: None,
        qos: Some(1),
    };
    let value = serde_json::to_value(&publish).unwrap();
    assert_eq!(
        value,
        json!({ "type": "publish", "topic": "1", "payload": "hello", "message_id": null, "qos": 1 })
    );

    let login = json!({ "type": "login", "username": "admin", "password": "pw" });
    assert_eq!(
        serde_json::from_value::<ClientMessage>(login).unwrap(),
        ClientMessage::Login {
            username: "admin".to_string(),
            password: "pw".to_string(),
        }
    );
}

#[test]
fn test_server_message_deserialization() {
    let raw = json!({
        "type": "message",
        "topic": "1",
        "payload": "123#@#",
        "timestamp": 42,
        "message_id": "abc",
        "qos": 1
    });
    let parsed: ServerMessage = serde_json::from_value(raw).unwrap();
    assert_eq!(
        parsed,
        ServerMessage::Message {
            topic: "1".to_string(),
            payload: "123#@#".to_string(),
            timestamp: 42,
            message_id: "abc".to_string(),
            qos: 1,
        }
    );

    let authenticated: ServerMessage =
        serde_json::from_str(r#"{ "type": "authenticated" }"#).unwrap();
    assert_eq!(authenticated, ServerMessage::Authenticated {});
}

// ---------------------------------------------------------------- memory broker

#[tokio::test]
async fn test_memory_broker_routes_by_filter() {
    let broker = MemoryBroker::new();
    let mut subscriber = broker
        .connect(&options("sub", "memory://local"))
        .await
        .unwrap();
    let (sink, mut rx) = mpsc::unbounded_channel();
    subscriber
        .subscribe(&filters(&["a/+", "b"]), sink)
        .await
        .unwrap();
    assert_eq!(broker.subscriber_count(), 1);

    let mut publisher = broker
        .connect(&options("pub", "memory://local"))
        .await
        .unwrap();
    for topic in ["a/1", "b", "c", "a/1/x"] {
        publisher
            .publish(topic, QoS::AtLeastOnce, topic.as_bytes().to_vec())
            .await
            .unwrap();
    }
    assert_eq!(broker.published(), 4);

    let mut topics = Vec::new();
    while let Ok(delivery) = rx.try_recv() {
        assert!(delivery.received_at > 0);
        topics.push(delivery.topic);
    }
    assert_eq!(topics, vec!["a/1", "b"]);

    subscriber.disconnect().await;
    assert_eq!(broker.subscriber_count(), 0);
}

#[tokio::test]
async fn test_memory_broker_fault_injection() {
    let broker = MemoryBroker::new();
    broker.reject_client("unlucky");
    assert!(matches!(
        broker.connect(&options("unlucky", "memory://local")).await,
        Err(TransportError::Connect(_))
    ));

    let mut publisher = broker
        .connect(&options("pub", "memory://local"))
        .await
        .unwrap();
    broker.set_reject_publishes(true);
    assert!(matches!(
        publisher.publish("1", QoS::AtMostOnce, vec![0]).await,
        Err(TransportError::Publish(_))
    ));
    broker.set_reject_publishes(false);
    assert!(publisher.publish("1", QoS::AtMostOnce, vec![0]).await.is_ok());
    assert_eq!(broker.published(), 1);
}

#[tokio::test]
async fn test_subscribe_without_filters_fails() {
    let broker = MemoryBroker::new();
    let mut transport = broker
        .connect(&options("sub", "memory://local"))
        .await
        .unwrap();
    let (sink, _rx) = mpsc::unbounded_channel();
    assert!(matches!(
        transport.subscribe(&TopicFilters::new(), sink).await,
        Err(TransportError::Subscribe(_))
    ));
}

// ---------------------------------------------------------------- mqtt

#[tokio::test]
async fn test_mqtt_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = MqttConnector
        .connect(&options("pub-1", &format!("tcp://127.0.0.1:{port}")))
        .await;
    assert!(matches!(
        result,
        Err(TransportError::Connect(_)) | Err(TransportError::ConnectTimeout(_))
    ));
}

// ---------------------------------------------------------------- websocket

#[derive(Clone, Copy)]
enum FakeAuth {
    Accept,
    Reject,
}

/// A one-connection stand-in for a popsub broker. It answers login/auth,
/// echoes every publish back as a QoS 1 delivery and stops after the first
/// acknowledgment. Returns every frame the client sent.
async fn fake_broker(auth: FakeAuth) -> (String, JoinHandle<Vec<ClientMessage>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen = Vec::new();

        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
            if !frame.is_text() {
                continue;
            }
            let msg: ClientMessage = serde_json::from_str(frame.to_text().unwrap()).unwrap();
            let reply = match (&msg, auth) {
                (ClientMessage::Login { .. }, FakeAuth::Accept) => Some(ServerMessage::LoginResponse {
                    token: "token".to_string(),
                }),
                (ClientMessage::Login { .. }, FakeAuth::Reject) => Some(ServerMessage::Error {
                    message: "Invalid credentials".to_string(),
                }),
                (ClientMessage::Auth { .. }, _) => Some(ServerMessage::Authenticated {}),
                (ClientMessage::Publish { topic, payload, .. }, _) => Some(ServerMessage::Message {
                    topic: topic.clone(),
                    payload: payload.clone(),
                    timestamp: 0,
                    message_id: "m-1".to_string(),
                    qos: 1,
                }),
                _ => None,
            };
            let done = matches!(msg, ClientMessage::Ack { .. });
            seen.push(msg);
            if let Some(reply) = reply {
                let text = serde_json::to_string(&reply).unwrap();
                ws.send(WsMessage::text(text)).await.unwrap();
            }
            if done {
                break;
            }
        }
        seen
    });

    (format!("ws://{addr}"), handle)
}

#[tokio::test]
async fn test_websocket_round_trip() {
    let (url, server) = fake_broker(FakeAuth::Accept).await;
    let mut opts = options("ws-client", &url);
    opts.credentials = Credentials::from_parts(Some("admin"), Some("password"));

    let mut transport = WsConnector.connect(&opts).await.unwrap();
    let (sink, mut rx) = mpsc::unbounded_channel();
    transport.subscribe(&filters(&["1"]), sink).await.unwrap();

    let payload = encode_payload(1_234_567, 40);
    transport
        .publish("1", QoS::AtLeastOnce, payload)
        .await
        .unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.topic, "1");
    assert_eq!(decode_timestamp(&delivery.payload), Some(1_234_567));

    let seen = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    transport.disconnect().await;

    assert!(matches!(seen[0], ClientMessage::Login { .. }));
    assert!(matches!(seen[1], ClientMessage::Auth { .. }));
    assert_eq!(
        seen[2],
        ClientMessage::Subscribe {
            topic: "1".to_string()
        }
    );
    assert!(matches!(
        &seen[3],
        ClientMessage::Publish { topic, qos: Some(1), .. } if topic == "1"
    ));
    assert_eq!(
        seen[4],
        ClientMessage::Ack {
            message_id: "m-1".to_string()
        }
    );
}

#[tokio::test]
async fn test_websocket_rejected_login() {
    let (url, _server) = fake_broker(FakeAuth::Reject).await;
    let mut opts = options("ws-client", &url);
    opts.credentials = Credentials::from_parts(Some("admin"), Some("wrong"));

    let result = WsConnector.connect(&opts).await;
    assert!(matches!(
        result,
        Err(TransportError::Auth(message)) if message.contains("Invalid credentials")
    ));
}
