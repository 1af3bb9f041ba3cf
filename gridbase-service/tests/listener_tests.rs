//! Queue listener tests over the in-process channel transport.

use gridbase_core::TransportError;
use gridbase_service::{channel, FixedClock, GridService, JwtValidator, QueueListener, Reply, Status};
use gridbase_test_utils::fixtures;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const RETRY: Duration = Duration::from_millis(10);

fn service() -> GridService {
    let tokens = JwtValidator::new(SecretString::new("listener-secret".into()), Duration::from_secs(60))
        .with_clock(Arc::new(FixedClock(1704067200)));
    GridService::new(Arc::new(fixtures::seeded_mock()), Arc::new(tokens))
}

fn decode(body: &[u8]) -> Reply {
    match serde_json::from_slice(body) {
        Ok(reply) => reply,
        Err(e) => panic!("reply is not valid JSON: {}", e),
    }
}

#[tokio::test]
async fn test_retries_until_connected_then_replies() -> Result<(), TransportError> {
    let (transport, mut client) = channel("rabbitmq:5672", 8);
    let (mut listener, stop) = QueueListener::new(
        transport.with_connect_failures(3),
        service(),
        "grid_service_test",
        RETRY,
    );
    let task = tokio::spawn(async move {
        let result = listener.run().await;
        (listener, result)
    });

    let tag = client
        .request(&json!({"command": "heartbeat", "requestUuid": "r-1"}), "replies", "c-1")
        .await?;
    let published = client.next_reply().await;
    let Some(published) = published else {
        panic!("no reply published");
    };
    assert_eq!(published.routing_key, "replies");
    assert_eq!(published.correlation_id.as_deref(), Some("c-1"));

    let reply = decode(&published.body);
    assert_eq!(reply.status, Status::Success);
    assert_eq!(reply.request_uuid.as_deref(), Some("r-1"));
    assert_eq!(reply.correlation_id.as_deref(), Some("c-1"));
    assert_eq!(client.connect_attempts(), 4);

    stop.stop();
    let (listener, result) = match task.await {
        Ok(joined) => joined,
        Err(e) => panic!("listener task failed: {}", e),
    };
    assert_eq!(result, Ok(()));
    assert_eq!(listener.processed(), 1);
    assert_eq!(client.acks(), vec![tag]);
    Ok(())
}

#[tokio::test]
async fn test_stop_interrupts_connect_loop() {
    let (transport, client) = channel("rabbitmq:5672", 8);
    let (mut listener, stop) = QueueListener::new(
        transport.with_connect_failures(usize::MAX),
        service(),
        "grid_service_test",
        RETRY,
    );
    let task = tokio::spawn(async move { listener.run().await });

    tokio::time::sleep(Duration::from_millis(35)).await;
    stop.stop();
    let result = match task.await {
        Ok(result) => result,
        Err(e) => panic!("listener task failed: {}", e),
    };
    assert_eq!(result, Err(TransportError::Interrupted));
    assert!(client.connect_attempts() >= 1);
}

#[tokio::test]
async fn test_every_delivery_acked_replies_only_when_requested() -> Result<(), TransportError> {
    let (transport, mut client) = channel("rabbitmq:5672", 8);
    let (mut listener, _stop) = QueueListener::new(transport, service(), "grid_service_test", RETRY);

    let silent = client
        .send(br#"{"command":"heartbeat"}"#.to_vec(), None, None)
        .await?;
    let broken = client
        .send(b"not json".to_vec(), Some("replies"), Some("c-2"))
        .await?;
    let unknown = client
        .request(&json!({"command": "drop"}), "replies", "c-3")
        .await?;
    client.close();

    // runs until the closed queue is drained
    listener.run().await?;
    assert_eq!(listener.processed(), 3);
    assert_eq!(client.acks(), vec![silent, broken, unknown]);

    let first = client.next_reply().await.map(|p| (p.correlation_id, decode(&p.body)));
    let Some((correlation_id, reply)) = first else {
        panic!("missing reply");
    };
    assert_eq!(correlation_id.as_deref(), Some("c-2"));
    assert_eq!(reply.status, Status::Error);

    let second = client.next_reply().await.map(|p| decode(&p.body));
    assert_eq!(second.map(|r| r.status), Some(Status::Failed));
    Ok(())
}

#[tokio::test]
async fn test_failed_authentication_over_queue() -> Result<(), TransportError> {
    let (transport, mut client) = channel("rabbitmq:5672", 8);
    let (mut listener, _stop) = QueueListener::new(transport, service(), "grid_service_test", RETRY);

    client
        .request(
            &json!({"command": "authentication", "loginId": "nobody", "passwordHash": "x"}),
            "replies",
            "c-1",
        )
        .await?;
    client.close();
    listener.run().await?;

    let reply = client.next_reply().await.map(|p| decode(&p.body));
    assert_eq!(reply.as_ref().map(|r| r.status), Some(Status::Failed));
    assert_eq!(reply.and_then(|r| r.login_id), Some("nobody".to_string()));
    assert_eq!(listener.into_service().engine().cache().grid_count(), 0);
    Ok(())
}
