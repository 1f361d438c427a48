use futures::StreamExt;
use inkflow::*;
use reqwest::Client;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

fn conversation() -> Vec<Message> {
    vec![Message::system("You are an editor."), Message::user("Write something.")]
}

async fn collect(stream: FragmentStream) -> (Vec<String>, Option<ProviderError>) {
    let mut fragments = Vec::new();
    let mut stream = stream;
    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => fragments.push(text),
            Err(err) => return (fragments, Some(err)),
        }
    }
    (fragments, None)
}

// --- OpenAI-compatible vendors ---

#[tokio::test]
async fn test_chat_completions_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "deepseek-chat",
            "stream": true,
        })))
        .respond_with(sse(concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new(ProviderTag::DeepSeek, Client::new(), server.uri());
    let stream = adapter
        .stream("sk-test", "deepseek-chat", &conversation())
        .await
        .unwrap();

    let (fragments, err) = collect(stream).await;
    assert_eq!(fragments, vec!["Hel", "lo"]);
    assert!(err.is_none());
}

#[tokio::test]
async fn test_chat_completions_mid_stream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"rate limited\"}}\n\n",
        )))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new(ProviderTag::Qwen, Client::new(), server.uri());
    let stream = adapter.stream("k", "qwen-plus", &conversation()).await.unwrap();

    let (fragments, err) = collect(stream).await;
    assert_eq!(fragments, vec!["Hello"]);
    let err = err.expect("stream should end with an error");
    assert_eq!(err.provider, ProviderTag::Qwen);
    assert_eq!(err.kind, ProviderErrorKind::Stream);
    assert!(err.message.contains("rate limited"));
}

#[tokio::test]
async fn test_truncated_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"# Half a dra\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ft\"}}]}",
        )))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new(ProviderTag::DeepSeek, Client::new(), server.uri());
    let stream = adapter.stream("k", "deepseek-chat", &conversation()).await.unwrap();

    let (fragments, err) = collect(stream).await;
    assert_eq!(fragments, vec!["# Half a dra", "ft"]);
    let err = err.expect("a body without [DONE] must not complete normally");
    assert_eq!(err.kind, ProviderErrorKind::Stream);
    assert!(err.message.contains("ended before completion"));
}

#[tokio::test]
async fn test_messages_stop_in_unterminated_tail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse(concat!(
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Done\"}}\n\n",
            "data: {\"type\":\"message_stop\"}",
        )))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(Client::new(), server.uri());
    let stream = adapter.stream("k", "claude-test", &conversation()).await.unwrap();

    let (fragments, err) = collect(stream).await;
    assert_eq!(fragments, vec!["Done"]);
    assert!(err.is_none());
}

#[tokio::test]
async fn test_chat_completions_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string(r#"{"error":{"message":"Incorrect API key provided"}}"#),
        )
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new(ProviderTag::OpenAi, Client::new(), server.uri());
    let err = adapter
        .stream("sk-bad", "gpt-4o", &conversation())
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind, ProviderErrorKind::Status(401));
    assert!(err.message.contains("Incorrect API key provided"));
}

#[tokio::test]
async fn test_preconditions_skip_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new(ProviderTag::Glm, Client::new(), server.uri());
    let err = adapter.stream("", "glm-4", &conversation()).await.err().unwrap();
    assert_eq!(err.kind, ProviderErrorKind::MissingApiKey);

    let err = adapter.stream("k", "glm-4", &[]).await.err().unwrap();
    assert_eq!(err.kind, ProviderErrorKind::NoMessages);
}

// --- Anthropic ---

#[tokio::test]
async fn test_messages_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "model": "claude-test",
            "system": "You are an editor.",
            "stream": true,
        })))
        .respond_with(sse(concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"# Ti\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"tle\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(Client::new(), server.uri());
    let stream = adapter
        .stream("sk-ant", "claude-test", &conversation())
        .await
        .unwrap();

    let (fragments, err) = collect(stream).await;
    assert_eq!(fragments, vec!["# Ti", "tle"]);
    assert!(err.is_none());
}

#[tokio::test]
async fn test_messages_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse(concat!(
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Par\"}}\n\n",
            "event: error\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        )))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(Client::new(), server.uri());
    let stream = adapter.stream("k", "claude-test", &conversation()).await.unwrap();

    let (fragments, err) = collect(stream).await;
    assert_eq!(fragments, vec!["Par"]);
    let err = err.expect("stream should end with an error");
    assert_eq!(err.provider, ProviderTag::Anthropic);
    assert!(err.message.contains("Overloaded"));
}

// --- Dispatch through the service ---

#[tokio::test]
async fn test_service_frames_vendor_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"line one\\n\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"line two\"}}]}\n\n",
            "data: [DONE]\n\n",
        )))
        .mount(&server)
        .await;

    let endpoints = ProviderEndpoints::default().with(ProviderTag::MiniMax, server.uri());
    let service = WritingService::new(Dispatcher::with_endpoints(Client::new(), &endpoints));
    let frames: Vec<String> = service
        .generate(GenerateRequest {
            source_content: "notes".into(),
            provider: Some("minimax".into()),
            model_id: "abab6.5s-chat".into(),
            api_key: "k".into(),
            ..Default::default()
        })
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        frames,
        vec![
            "data: \"line one\\n\"\n\n".to_string(),
            "data: \"line two\"\n\n".to_string(),
            "data: [DONE]\n\n".to_string(),
        ]
    );
}
