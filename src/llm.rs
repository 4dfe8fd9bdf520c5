//! Chat-model adapters: live OpenAI-compatible completions and the offline
//! placeholder model.
//!
//! Both implement [`ChatModel`]. Streaming returns an `mpsc` receiver fed by
//! a spawned task; the task stops as soon as the receiver is dropped, so a
//! client hanging up mid-answer stops further upstream reads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rainbow_intel_core::models::{ChatRole, ChatTurn};
use rainbow_intel_core::prompt;
use rainbow_intel_core::{Error, Result};

use crate::config::{Config, LlmConfig, ProviderMode};
use crate::openai::{
    delta_content, transport_error, with_deadline, OpenAiClient, SseEvent, SseLineBuffer,
};

/// Receiving end of a streamed answer. Fragments arrive in emission order.
pub type FragmentReceiver = mpsc::Receiver<Result<String>>;

const STREAM_BUFFER: usize = 32;

/// One grounded model invocation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Grounding prompt with the rendered context.
    pub system: String,
    /// Prior turns followed by the latest user question.
    pub messages: Vec<ChatTurn>,
    /// Number of retrieved messages in `system`.
    pub context_size: usize,
}

impl ChatRequest {
    /// The latest user turn.
    pub fn question(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|t| t.role == ChatRole::User)
            .map(|t| t.content.as_str())
            .unwrap_or("")
    }

    /// Turns forwarded ahead of the latest question.
    pub fn prior_turns(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Start a streamed completion. Errors before the first fragment are
    /// returned directly; later ones arrive on the receiver.
    async fn stream(&self, request: &ChatRequest) -> Result<FragmentReceiver>;
}

// ============ Offline ============

/// Network-free model producing labelled placeholder answers.
pub struct OfflineChat {
    fragment_delay: Duration,
}

impl OfflineChat {
    pub fn new(fragment_delay: Duration) -> Self {
        Self { fragment_delay }
    }

    fn render(request: &ChatRequest) -> String {
        prompt::offline_answer(
            request.question(),
            request.context_size,
            request.prior_turns(),
        )
    }
}

/// Split an answer into word fragments whose concatenation is the input.
pub fn word_fragments(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl ChatModel for OfflineChat {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        Ok(Self::render(request))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentReceiver> {
        let fragments = word_fragments(&Self::render(request));
        let delay = self.fragment_delay;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if i > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(fragment)).await.is_err() {
                    debug!(emitted = i, "offline stream cancelled by consumer");
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// ============ Live ============

/// Chat model backed by `POST {base_url}/chat/completions`.
pub struct OpenAIChat {
    client: OpenAiClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIChat {
    pub fn new(client: OpenAiClient, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn body(&self, request: &ChatRequest, stream: bool) -> Value {
        let system = ChatTurn::system(request.system.as_str());
        let messages: Vec<&ChatTurn> = std::iter::once(&system)
            .chain(request.messages.iter())
            .collect();

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }

    async fn request_completion(&self, request: &ChatRequest) -> Result<String> {
        let resp = self
            .client
            .post_json("/chat/completions", &self.body(request, false))
            .await?;
        let json: Value = resp.json().await.map_err(transport_error)?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::ProviderUnavailable("invalid completion response: missing content".into())
            })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        with_deadline(
            self.client.timeout(),
            "chat completion",
            self.request_completion(request),
        )
        .await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentReceiver> {
        let body = self.body(request, true);
        let resp = with_deadline(
            self.client.timeout(),
            "chat completion",
            self.client.post_json("/chat/completions", &body),
        )
        .await?;

        let idle = self.client.timeout();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut upstream = Box::pin(resp.bytes_stream());
            let mut buffer = SseLineBuffer::new();

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        info!("chat stream cancelled by consumer");
                        return;
                    }
                    next = tokio::time::timeout(idle, upstream.next()) => next,
                };

                let chunk = match next {
                    Err(_) => {
                        let _ = tx
                            .send(Err(Error::ProviderTimeout(format!(
                                "no stream data for {}s",
                                idle.as_secs()
                            ))))
                            .await;
                        return;
                    }
                    Ok(None) => {
                        // EOF without [DONE]: the answer was cut short
                        warn!("chat stream ended before [DONE]");
                        let _ = tx
                            .send(Err(Error::ProviderUnavailable(
                                "stream ended before [DONE]".into(),
                            )))
                            .await;
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(transport_error(e))).await;
                        return;
                    }
                    Ok(Some(Ok(bytes))) => bytes,
                };

                for event in buffer.push(&chunk) {
                    match event {
                        SseEvent::Done => return,
                        SseEvent::Data(data) => match delta_content(&data) {
                            Ok(None) => {}
                            Ok(Some(text)) => {
                                if tx.send(Ok(text)).await.is_err() {
                                    info!("chat stream cancelled by consumer");
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "chat stream aborted");
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        },
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Build the chat model for `mode`.
pub fn create_chat_model(config: &Config, mode: &ProviderMode) -> anyhow::Result<Arc<dyn ChatModel>> {
    match mode {
        ProviderMode::Offline => Ok(Arc::new(OfflineChat::new(Duration::from_millis(
            config.llm.offline_fragment_delay_ms,
        )))),
        ProviderMode::Live { api_key } => {
            let client = OpenAiClient::new(&config.provider, api_key)?;
            Ok(Arc::new(OpenAIChat::new(client, &config.llm)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(turns: Vec<ChatTurn>, context_size: usize) -> ChatRequest {
        ChatRequest {
            system: "sys".into(),
            messages: turns,
            context_size,
        }
    }

    async fn collect(mut rx: FragmentReceiver) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.unwrap());
        }
        out
    }

    #[test]
    fn test_question_is_latest_user_turn() {
        let req = request(
            vec![
                ChatTurn::user("first"),
                ChatTurn::assistant("reply"),
                ChatTurn::user("second"),
            ],
            1,
        );
        assert_eq!(req.question(), "second");
        assert_eq!(req.prior_turns(), 2);
    }

    #[test]
    fn test_word_fragments_concatenate_to_input() {
        let text = "one two  three\n\nfour";
        assert_eq!(word_fragments(text).concat(), text);
        assert!(word_fragments(text).len() > 1);
    }

    #[tokio::test]
    async fn test_offline_stream_matches_complete() {
        let model = OfflineChat::new(Duration::ZERO);
        let req = request(vec![ChatTurn::user("what's the deployment status?")], 2);

        let whole = model.complete(&req).await.unwrap();
        let fragments = collect(model.stream(&req).await.unwrap()).await;

        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), whole);
        assert!(whole.ends_with(prompt::OFFLINE_LABEL));
    }

    #[test]
    fn test_live_body_prepends_system_prompt() {
        let client = OpenAiClient::new(&crate::config::ProviderConfig::default(), "sk-test").unwrap();
        let chat = OpenAIChat::new(client, &LlmConfig::default());
        let body = chat.body(
            &request(vec![ChatTurn::assistant("hi"), ChatTurn::user("q")], 1),
            true,
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][2]["content"], "q");
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "gpt-4o");
    }

    // live adapter against a local server

    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{body::Body, http::header, http::StatusCode, routing::post, Json, Router};
    use futures_util::stream;

    use crate::openai::stub;

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [ { "delta": { "content": text } } ] })
        )
    }

    /// A `/chat/completions` route answering every request with `body` as SSE.
    fn sse_route(body: String) -> Router {
        Router::new().route(
            "/chat/completions",
            post(move || {
                let body = body.clone();
                async move { ([(header::CONTENT_TYPE, "text/event-stream")], body) }
            }),
        )
    }

    async fn live_chat(router: Router) -> OpenAIChat {
        OpenAIChat::new(stub::client_for(router).await, &LlmConfig::default())
    }

    async fn drain(mut rx: FragmentReceiver) -> Vec<Result<String>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    fn question() -> ChatRequest {
        request(vec![ChatTurn::user("what's the deployment status?")], 2)
    }

    #[tokio::test]
    async fn test_live_stream_yields_deltas_until_done() {
        let body = format!(
            "data: {}\n\n{}{}data: [DONE]\n\n",
            json!({ "choices": [ { "delta": { "role": "assistant" } } ] }),
            delta("The deploy"),
            delta("ment is green."),
        );
        let chat = live_chat(sse_route(body)).await;

        let items = drain(chat.stream(&question()).await.unwrap()).await;
        let fragments: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(fragments, vec!["The deploy", "ment is green."]);
    }

    #[tokio::test]
    async fn test_live_stream_cut_short_ends_in_error() {
        let chat = live_chat(sse_route(delta("The deploy"))).await;

        let items = drain(chat.stream(&question()).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "The deploy");
        assert!(matches!(items[1], Err(Error::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_live_stream_error_frame_ends_in_error() {
        let body = format!(
            "{}data: {}\n\n{}data: [DONE]\n\n",
            delta("The "),
            json!({ "error": { "message": "model overloaded" } }),
            delta("never seen"),
        );
        let chat = live_chat(sse_route(body)).await;

        let items = drain(chat.stream(&question()).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(Error::ProviderUnavailable(msg)) => assert!(msg.contains("model overloaded")),
            other => panic!("expected ProviderUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_live_stream_malformed_chunk_ends_in_error() {
        let body = format!("{}data: {{not json\n\ndata: [DONE]\n\n", delta("The "));
        let chat = live_chat(sse_route(body)).await;

        let items = drain(chat.stream(&question()).await.unwrap()).await;
        assert!(matches!(items.last(), Some(Err(Error::ProviderUnavailable(_)))));
    }

    #[tokio::test]
    async fn test_live_complete_returns_message_content() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                Json(json!({ "choices": [ { "message": { "content": "All green." } } ] }))
            }),
        );
        let chat = live_chat(router).await;

        assert_eq!(chat.complete(&question()).await.unwrap(), "All green.");
    }

    #[tokio::test]
    async fn test_live_rate_limit_maps_for_complete_and_stream() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let chat = live_chat(router).await;

        assert!(matches!(
            chat.complete(&question()).await,
            Err(Error::ProviderRateLimited(_))
        ));
        assert!(matches!(
            chat.stream(&question()).await,
            Err(Error::ProviderRateLimited(_))
        ));
    }

    #[tokio::test]
    async fn test_live_complete_slow_server_times_out() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "choices": [ { "message": { "content": "late" } } ] }))
            }),
        );
        let chat = live_chat(router).await;

        assert!(matches!(
            chat.complete(&question()).await,
            Err(Error::ProviderTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_live_stream_stalled_upstream_times_out() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                let chunks = stream::iter(vec![Ok::<_, Infallible>(delta("The "))])
                    .chain(stream::pending());
                (
                    [(header::CONTENT_TYPE, "text/event-stream")],
                    Body::from_stream(chunks),
                )
            }),
        );
        let chat = live_chat(router).await;

        let items = drain(chat.stream(&question()).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "The ");
        assert!(matches!(items[1], Err(Error::ProviderTimeout(_))));
    }

    #[tokio::test]
    async fn test_live_stream_stops_reading_after_consumer_hangs_up() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let router = Router::new().route(
            "/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    // endless answer, one word every 10ms
                    let chunks = stream::unfold(counter, |counter| async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        Some((Ok::<_, Infallible>(delta(&format!("w{} ", n))), counter))
                    });
                    (
                        [(header::CONTENT_TYPE, "text/event-stream")],
                        Body::from_stream(chunks),
                    )
                }
            }),
        );
        let chat = live_chat(router).await;

        let mut rx = chat.stream(&question()).await.unwrap();
        for _ in 0..3 {
            assert!(rx.recv().await.unwrap().is_ok());
        }
        drop(rx);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let settled = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), settled);
        assert!(settled < 60, "upstream kept streaming: {} chunks", settled);
    }
}
