//! HTTP backend tests against a mock server.

use std::future::poll_fn;
use std::pin::pin;

use alma_http::{HttpBackend, HttpConfigBuilder, HttpEventStream};
use alma_model::{
    BackendError, ChatBackend, ErrorKind, EventStream, MessageRequest,
    OutgoingMessage, RateLimit, Role, StreamEvent,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENT_STREAM: &str = "text/event-stream";

fn backend(server: &MockServer) -> HttpBackend {
    let config = HttpConfigBuilder::with_base_url(format!("{}/api", server.uri()))
        .with_token("test-token")
        .build();
    HttpBackend::new(config)
}

fn request(content: &str) -> MessageRequest {
    MessageRequest {
        chat_id: "chat_1".to_owned(),
        message: OutgoingMessage::user("msg_local", content),
    }
}

async fn collect(stream: HttpEventStream) -> Vec<StreamEvent> {
    let mut stream = pin!(stream);
    let mut events = vec![];
    while let Some(event) = poll_fn(|cx| stream.as_mut().poll_next_event(cx))
        .await
        .unwrap()
    {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_streamed_reply() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: message_id\ndata: \"msg_1\"\n\n",
        "event: message_delta\ndata: \"Hello \"\n\n",
        "event: unknown_thing\ndata: 1\n\n",
        "event: message_delta\ndata: \"world\"\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chats/chat_1/messages"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Accept", EVENT_STREAM))
        .and(body_json(serde_json::json!({
            "id": "msg_local",
            "role": "user",
            "content": "hello"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, EVENT_STREAM))
        .expect(1)
        .mount(&server)
        .await;

    let stream = backend(&server).send_message(&request("hello")).await.unwrap();
    assert_eq!(
        collect(stream).await,
        vec![
            StreamEvent::MessageId("msg_1".to_owned()),
            StreamEvent::MessageDelta("Hello ".to_owned()),
            StreamEvent::MessageDelta("world".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chats/chat_1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-RateLimit-Limit", "5")
                .insert_header("X-RateLimit-Remaining", "0")
                .set_body_json(serde_json::json!({
                    "error": "Too many requests",
                    "message": "Rate limit exceeded. Please try again later.",
                    "detail": "5 per 1 week"
                })),
        )
        .mount(&server)
        .await;

    let err = backend(&server)
        .send_message(&request("hello"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.message(), "Rate limit exceeded. Please try again later.");
    assert_eq!(
        err.rate_limit(),
        Some(&RateLimit {
            limit: Some(5),
            remaining: Some(0),
            detail: Some("5 per 1 week".to_owned()),
        })
    );
}

#[tokio::test]
async fn test_rate_limited_without_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = backend(&server)
        .send_message(&request("hello"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.message(), "rate limit exceeded");
    assert_eq!(err.rate_limit(), Some(&RateLimit::default()));
}

#[tokio::test]
async fn test_chat_id_is_escaped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chats/a%2Fb%3Fc/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("event: message_id\ndata: \"m\"\n\n", EVENT_STREAM),
        )
        .expect(1)
        .mount(&server)
        .await;

    let req = MessageRequest {
        chat_id: "a/b?c".to_owned(),
        message: OutgoingMessage::user("msg_local", "hello"),
    };
    let stream = backend(&server).send_message(&req).await.unwrap();
    assert_eq!(
        collect(stream).await,
        vec![StreamEvent::MessageId("m".to_owned())]
    );
}

#[tokio::test]
async fn test_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = backend(&server)
        .send_message(&request("hello"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert!(err.message().contains("500"));
}

#[tokio::test]
async fn test_unexpected_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"detail": "not a stream"})),
        )
        .mount(&server)
        .await;

    let err = backend(&server)
        .send_message(&request("hello"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn test_connection_refused() {
    let config = HttpConfigBuilder::with_base_url("http://127.0.0.1:9").build();
    let err = HttpBackend::new(config)
        .send_message(&request("hello"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_fetch_chat() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/chat_1"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({
                "id": "chat_1",
                "title": "Erbrecht",
                "messages": [
                    {"id": "m1", "role": "user", "content": "Wer erbt?", "content_blocks": []},
                    {
                        "id": "m2",
                        "role": "assistant",
                        "content": "Die Nachkommen.",
                        "content_blocks": [{"type": "text", "text": "Die Nachkommen."}]
                    }
                ]
            }),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chats/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let chat = backend.fetch_chat("chat_1").await.unwrap().unwrap();
    assert_eq!(chat.title.as_deref(), Some("Erbrecht"));
    assert_eq!(chat.messages.len(), 2);
    assert_eq!(chat.messages[0].role, Role::User);
    assert_eq!(chat.messages[0].text(), "Wer erbt?");
    assert_eq!(chat.messages[1].text(), "Die Nachkommen.");

    assert!(backend.fetch_chat("missing").await.unwrap().is_none());
}
