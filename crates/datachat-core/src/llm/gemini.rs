use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use futures::channel::mpsc;
use reqwest::StatusCode;
use serde::Serialize;

use crate::analysis::plots::{extract_plots, has_executable_code, plots_from_parts};
use crate::constants::{endpoints, models};
use crate::error::ChatError;
use crate::llm::traits::*;
use crate::llm::wire::*;
use crate::models::ChatMessage;

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    system_instruction: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: models::DEFAULT_MODEL.to_string(),
            base_url: endpoints::GEMINI_BASE_URL.to_string(),
            system_instruction: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{method}",
            self.base_url.trim_end_matches('/'),
            endpoints::GEMINI_API_VERSION,
            self.model
        )
    }

    /// Map the chat history to the `generateContent` body.
    pub fn build_request(
        &self,
        messages: &[ChatMessage],
        code_execution: bool,
    ) -> GenerateContentRequest {
        let system_instruction = self.system_instruction.as_ref().map(|text| Content {
            role: "system".to_string(),
            parts: vec![Part::Text { text: text.clone() }],
        });

        let tools = if code_execution {
            vec![Tool {
                code_execution: CodeExecution::default(),
            }]
        } else {
            Vec::new()
        };

        GenerateContentRequest {
            contents: to_contents(messages),
            system_instruction,
            tools,
        }
    }

    async fn post(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &impl Serialize,
    ) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(url)
            .query(query)
            .header(endpoints::API_KEY_HEADER, &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }
        Ok(response)
    }
}

/// One `Content` per message. Earlier plots are not resent; messages with no
/// text and no image are dropped.
pub fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    messages
        .iter()
        .filter_map(|m| {
            let mut parts = Vec::new();
            if !m.content.is_empty() {
                parts.push(Part::Text {
                    text: m.content.clone(),
                });
            }
            if let Some(image) = &m.image {
                parts.push(Part::InlineData {
                    inline_data: Blob {
                        mime_type: image.mime_type.clone(),
                        data: BASE64_STANDARD.encode(&image.data),
                    },
                });
            }
            (!parts.is_empty()).then(|| Content {
                role: m.role.api_role().to_string(),
                parts,
            })
        })
        .collect()
}

fn map_http_error(status: StatusCode, body: &str) -> ChatError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string());

    ChatError::Api(format!("{} ({})", message, status.as_u16()))
}

/// Incremental parser for the `alt=sse` stream.
///
/// Bytes are buffered until a full line is available, so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    text: String,
    plots: Vec<crate::models::Attachment>,
    executed_code: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the text fragments completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, String> {
        self.buffer.extend_from_slice(chunk);
        let mut fragments = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(fragment) = self.handle_line(line.trim())? {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }

    /// Flush a trailing line without newline and produce the final response.
    pub fn finish(mut self) -> Result<(Option<String>, FinalResponse), String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest);
        let fragment = self.handle_line(rest.trim())?;
        Ok((
            fragment,
            FinalResponse {
                text: self.text,
                plots: self.plots,
                executed_code: self.executed_code,
            },
        ))
    }

    fn handle_line(&mut self, line: &str) -> Result<Option<String>, String> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim_start();
        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }

        // every response field is optional, so check for an error body first
        if let Ok(wrapper) = serde_json::from_str::<ErrorWrapper>(data) {
            return Err(wrapper
                .error
                .message
                .unwrap_or_else(|| "unknown streaming error".to_string()));
        }
        let chunk: GenerateContentResponse = serde_json::from_str(data)
            .map_err(|e| format!("Malformed response chunk: {e}"))?;

        if let Some(reason) = chunk.block_reason() {
            return Err(format!("Prompt blocked: {reason}"));
        }

        let parts = chunk.parts();
        self.executed_code |= parts
            .iter()
            .any(|p| matches!(p.kind(), PartKind::ExecutableCode(_)));
        self.plots.extend(plots_from_parts(parts));

        let text = chunk.text();
        if text.is_empty() {
            return Ok(None);
        }
        self.text.push_str(&text);
        Ok(Some(text))
    }
}

#[async_trait::async_trait]
impl ChatBackend for GeminiClient {
    async fn stream_reply(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::UnboundedReceiver<ResponseEvent>, ChatError> {
        let url = self.endpoint("streamGenerateContent");
        let request = self.build_request(messages, false);
        tracing::info!(
            "Generating streamed response ({} messages in history)",
            request.contents.len()
        );

        let response = self.post(&url, &[("alt", "sse")], &request).await?;
        let (tx, rx) = mpsc::unbounded();

        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut parser = SseParser::new();
            let mut chunk_count = 0usize;

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(ResponseEvent::Error(e.to_string()));
                        return;
                    }
                };

                match parser.push(&chunk) {
                    Ok(fragments) => {
                        for fragment in fragments {
                            chunk_count += 1;
                            if tx.unbounded_send(ResponseEvent::Fragment(fragment)).is_err() {
                                // receiver dropped: stop consuming
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.unbounded_send(ResponseEvent::Error(e));
                        return;
                    }
                }
            }

            match parser.finish() {
                Ok((tail, final_response)) => {
                    if let Some(tail) = tail {
                        chunk_count += 1;
                        let _ = tx.unbounded_send(ResponseEvent::Fragment(tail));
                    }
                    tracing::info!("Response generated successfully ({chunk_count} chunks)");
                    let _ = tx.unbounded_send(ResponseEvent::Complete(final_response));
                }
                Err(e) => {
                    let _ = tx.unbounded_send(ResponseEvent::Error(e));
                }
            }
        });

        Ok(rx)
    }

    async fn generate_with_code_execution(
        &self,
        messages: &[ChatMessage],
    ) -> Result<FinalResponse, ChatError> {
        let url = self.endpoint("generateContent");
        let request = self.build_request(messages, true);
        tracing::info!("Generating response with code execution enabled");

        let response = self.post(&url, &[], &request).await?;
        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::Api(format!("Failed to parse response: {e}")))?;

        if let Some(reason) = parsed.block_reason() {
            return Err(ChatError::Api(format!("Prompt blocked: {reason}")));
        }
        if parsed.candidates.is_empty() {
            return Err(ChatError::Api("Gemini returned no candidates".to_string()));
        }

        Ok(FinalResponse {
            text: parsed.text(),
            plots: extract_plots(&parsed),
            executed_code: has_executable_code(&parsed),
        })
    }

    async fn count_tokens(&self, messages: &[ChatMessage]) -> Result<u64, ChatError> {
        let url = self.endpoint("countTokens");
        let request = CountTokensRequest {
            contents: to_contents(messages),
        };
        let response = self.post(&url, &[], &request).await?;
        let counted: CountTokensResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Api(format!("Failed to parse token count: {e}")))?;
        Ok(counted.total_tokens)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
