use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::sse::{parse_data_lines, SseBuffer};
use super::{ChatClient, ChatRequest, DeltaStream, LlmError};
use crate::config::LlmConfig;
use crate::sessions::Message;

const STREAM_TIMEOUT: Duration = Duration::from_secs(90);
const COMPLETE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

// Reasoning models also send `reasoning` / `reasoning_content`; only `content` is visible.
#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(STREAM_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
        timeout: Duration,
    ) -> Result<reqwest::Response, LlmError> {
        let payload = ChatPayload {
            model: &self.model,
            messages: &request.messages,
            stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "chat endpoint error");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream, LlmError> {
        let response = self.send(&request, true, STREAM_TIMEOUT).await?;
        Ok(delta_stream(response))
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let response = self.send(&request, false, COMPLETE_TIMEOUT).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("no choices in completion".into()))
    }
}

/// Turns an SSE body into visible text deltas, stopping at `[DONE]`.
fn delta_stream(response: reqwest::Response) -> DeltaStream {
    let mut bytes = response.bytes_stream();

    let stream = async_stream::stream! {
        let mut buffer = SseBuffer::new();
        'read: loop {
            let block = match buffer.next_event_block() {
                Some(block) => block,
                None => match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.push_chunk(&chunk);
                        continue;
                    }
                    Some(Err(e)) => {
                        yield Err(LlmError::Transport(e.to_string()));
                        break 'read;
                    }
                    None => match buffer.finish() {
                        Some(block) => block,
                        None => break 'read,
                    },
                },
            };

            for data in parse_data_lines(&block) {
                if data == "[DONE]" {
                    break 'read;
                }
                match visible_delta(data) {
                    Ok(Some(text)) => {
                        yield Ok(text);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        break 'read;
                    }
                }
            }
        }
        debug!("chat stream finished");
    };

    Box::pin(stream)
}

fn visible_delta(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| LlmError::Malformed(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(&LlmConfig {
            api_key: "test-key".into(),
            base_url: format!("{}/v1/", server.uri()),
            model: "tiny-model".into(),
        })
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![Message::system("S"), Message::user("ciao")],
            temperature: 0.75,
            max_tokens: 4096,
        }
    }

    async fn collect(stream: DeltaStream) -> Vec<Result<String, LlmError>> {
        stream.collect().await
    }

    #[test]
    fn visible_delta_ignores_reasoning() {
        let reasoning = r#"{"choices":[{"delta":{"reasoning_content":"thinking"}}]}"#;
        assert_eq!(visible_delta(reasoning).unwrap(), None);
        let content = r#"{"choices":[{"delta":{"content":"Bon"}}]}"#;
        assert_eq!(visible_delta(content).unwrap().as_deref(), Some("Bon"));
        assert_eq!(visible_delta(r#"{"choices":[]}"#).unwrap(), None);
        assert!(matches!(visible_delta("{oops"), Err(LlmError::Malformed(_))));
    }

    #[tokio::test]
    async fn streams_content_deltas_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning\":\"hmm\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Bon\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"jour\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "tiny-model",
                "stream": true,
                "max_tokens": 4096
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = client_for(&server).stream_chat(request()).await.unwrap();
        let deltas: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(deltas, vec!["Bon", "jour"]);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server).stream_chat(request()).await.err().unwrap();
        assert!(matches!(err, LlmError::Status { status: 503, .. }));
        assert_eq!(err.public_message(), "AI service error");
    }

    #[tokio::test]
    async fn malformed_event_ends_stream_with_error() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {not json}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let items = collect(client_for(&server).stream_chat(request()).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "Hi");
        assert!(matches!(items[1], Err(LlmError::Malformed(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let client = OpenAiClient::new(&LlmConfig {
            api_key: "k".into(),
            base_url: "http://127.0.0.1:9".into(),
            model: "m".into(),
        })
        .unwrap();
        let err = client.stream_chat(request()).await.err().unwrap();
        assert_eq!(err.public_message(), "AI service unavailable");
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": " Hello there " } }]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).complete(request()).await.unwrap();
        assert_eq!(text, " Hello there ");
    }
}
