//! LLM-based OCR using an OpenAI-compatible vision model.
//! Sends the scoresheet image with a fixed instruction and a JSON schema,
//! receives the move list and player metadata as structured JSON.
//! Latency: several seconds for a full scoresheet (network dependent).
//! Requires OPENAI_API_KEY. One attempt per scan, no retry.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::AppError;
use crate::game::ScanResult;
use crate::ocr::{INSTRUCTION, Transcriber, parse_scan_response};

const MAX_TOKENS: u32 = 4096;

// *************** Request/Response Types ***************

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlDetail },
}

#[derive(Serialize)]
struct ImageUrlDetail {
    url: String,
    detail: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: JsonSchema,
}

#[derive(Serialize)]
struct JsonSchema {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// *************** Public API ***************

pub struct OpenAiTranscriber {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiTranscriber {
    /// Fails with [`AppError::MissingCredential`] before any client is built
    /// when no usable API key is configured.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let api_key = config.credential().ok_or(AppError::MissingCredential)?.to_string();

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::TranscriptionFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, image_base64: &str) -> Result<ScanResult, AppError> {
        let request = build_request(&self.model, image_base64);
        tracing::info!("Sending scoresheet to {} ({} KB)", self.model, image_base64.len() / 1024);

        let content = self.call_api(&request).await?;
        tracing::debug!("LLM returned: {}", content);

        let scan = parse_scan_response(&content)?;
        tracing::info!("Transcribed {} moves", scan.moves.len());
        Ok(scan)
    }
}

// *************** Internal Functions ***************

/// Output schema: metadata strings are optional, every move entry needs all three fields.
fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "metadata": {
                "type": "object",
                "properties": {
                    "white": { "type": "string" },
                    "black": { "type": "string" },
                    "event": { "type": "string" },
                    "date": { "type": "string" }
                }
            },
            "moves": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "moveNumber": { "type": "integer" },
                        "white": { "type": "string" },
                        "black": { "type": "string" }
                    },
                    "required": ["moveNumber", "white", "black"]
                }
            }
        },
        "required": ["metadata", "moves"]
    })
}

fn build_request(model: &str, base64_image: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrlDetail {
                        url: format!("data:image/jpeg;base64,{}", base64_image),
                        detail: "high".to_string(), // Handwriting needs the full-resolution tiles
                    },
                },
                ContentPart::Text {
                    text: INSTRUCTION.to_string(),
                },
            ],
        }],
        max_tokens: MAX_TOKENS,
        response_format: ResponseFormat {
            kind: "json_schema".to_string(),
            json_schema: JsonSchema {
                name: "scoresheet".to_string(),
                schema: response_schema(),
                strict: false,
            },
        },
    }
}

impl OpenAiTranscriber {
    async fn call_api(&self, request: &ChatRequest) -> Result<String, AppError> {
        let failed = AppError::TranscriptionFailed;

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| failed(describe_transport_error(&e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("API error {}: {}", status, api_error_message(&body))));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse API response: {}", e)))?;

        let message = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| failed("No response from the model".to_string()))?;

        if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
            return Err(failed(format!("Model declined: {}", refusal)));
        }
        Ok(message.content.unwrap_or_default())
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timed out. Check your connection and try again.".to_string()
    } else if err.is_connect() {
        format!("Could not reach the transcription service: {}", err)
    } else {
        format!("Failed to send request: {}", err)
    }
}

/// Pulls `error.message` out of an API error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

// *************** Tests ***************

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config_with_key(key: Option<&str>) -> Config {
        let mut vars = HashMap::new();
        if let Some(key) = key {
            vars.insert(crate::config::API_KEY_VAR.to_string(), key.to_string());
        }
        Config::from_lookup(|k| vars.get(k).cloned()).unwrap()
    }

    #[test]
    fn test_missing_credential_fails_fast() {
        for key in [None, Some(""), Some("undefined")] {
            let result = OpenAiTranscriber::new(&config_with_key(key));
            assert!(matches!(result, Err(AppError::MissingCredential)), "key {:?}", key);
        }
        assert!(OpenAiTranscriber::new(&config_with_key(Some("sk-test"))).is_ok());
    }

    #[test]
    fn test_request_shape() {
        let request = serde_json::to_value(build_request("gpt-4o", "QUJD")).unwrap();
        assert_eq!(request["model"], "gpt-4o");
        assert_eq!(request["response_format"]["type"], "json_schema");

        let content = &request["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[0]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], INSTRUCTION);
    }

    #[test]
    fn test_schema_requires_all_move_fields() {
        let schema = response_schema();
        let required = &schema["properties"]["moves"]["items"]["required"];
        assert_eq!(required, &json!(["moveNumber", "white", "black"]));
        assert!(schema["properties"]["metadata"].get("required").is_none());
    }

    #[test]
    fn test_api_error_message_extraction() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Incorrect API key provided");
        assert_eq!(api_error_message(" Bad Gateway "), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_reported() {
        let mut config = config_with_key(Some("sk-test"));
        config.api_url = "http://127.0.0.1:9/v1/chat/completions".to_string();
        config.timeout = Duration::from_secs(2);
        let transcriber = OpenAiTranscriber::new(&config).unwrap();
        let err = transcriber.transcribe("QUJD").await.unwrap_err();
        assert!(matches!(err, AppError::TranscriptionFailed(_)));
    }

    /// Serves one canned HTTP response on a local port and returns the endpoint URL.
    async fn serve_once(status: &str, body: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Read the full request before answering.
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}/v1/chat/completions", addr)
    }

    async fn transcribe_against(status: &str, body: &str) -> Result<ScanResult, AppError> {
        let mut config = config_with_key(Some("sk-test"));
        config.api_url = serve_once(status, body).await;
        config.timeout = Duration::from_secs(5);
        OpenAiTranscriber::new(&config).unwrap().transcribe("QUJD").await
    }

    fn failure_message(result: Result<ScanResult, AppError>) -> String {
        match result {
            Err(AppError::TranscriptionFailed(msg)) => msg,
            other => panic!("expected TranscriptionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_successful_response_is_parsed() {
        let content = r#"{\"metadata\":{\"white\":\"Ana\"},\"moves\":[{\"moveNumber\":1,\"white\":\"e4\",\"black\":\"e5\"}]}"#;
        let body = format!(r#"{{"choices":[{{"message":{{"content":"{}"}}}}]}}"#, content);
        let scan = transcribe_against("200 OK", &body).await.unwrap();
        assert_eq!(scan.moves, vec![crate::game::ChessMove::new(1, "e4", "e5")]);
        assert_eq!(scan.metadata.white.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_http_error_carries_api_message() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let msg = failure_message(transcribe_against("401 Unauthorized", body).await);
        assert!(msg.contains("401"), "{}", msg);
        assert!(msg.contains("Incorrect API key provided"), "{}", msg);
    }

    #[tokio::test]
    async fn test_refusal_is_reported() {
        let body = r#"{"choices":[{"message":{"content":null,"refusal":"I can't read this image"}}]}"#;
        let msg = failure_message(transcribe_against("200 OK", body).await);
        assert_eq!(msg, "Model declined: I can't read this image");
    }

    #[tokio::test]
    async fn test_empty_choices_is_reported() {
        let msg = failure_message(transcribe_against("200 OK", r#"{"choices":[]}"#).await);
        assert_eq!(msg, "No response from the model");
    }

    #[tokio::test]
    async fn test_malformed_body_is_reported() {
        let msg = failure_message(transcribe_against("200 OK", "<html>gateway</html>").await);
        assert!(msg.starts_with("Failed to parse API response"), "{}", msg);
    }

    #[tokio::test]
    #[ignore = "requires OPENAI_API_KEY and a scoresheet image"]
    async fn test_real_api_call() {
        // Run with: OPENAI_API_KEY=sk-... cargo test test_real_api_call -- --ignored
        let config = Config::from_env().unwrap();
        let transcriber = OpenAiTranscriber::new(&config).unwrap();
        let image = crate::capture::load_image_file(std::path::Path::new("scoresheet.jpg")).unwrap();
        let result = transcriber.transcribe(&image).await;
        println!("Result: {:?}", result);
        assert!(result.is_ok());
    }
}
