//! HTTP calls to the text-generation providers.
//!
//! Each provider gets one POST per optimize round. There is no retry;
//! any transport or status failure is a [`PlateTuneError::Service`].

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info};

use super::prompts::{build_user_prompt, optimization_response_schema, SYSTEM_PROMPT};
use super::response::parse_response;
use super::types::{OptimizationResponse, Provider, RequestPayload};
use crate::error::{PlateTuneError, Result};
use crate::project::PlateImage;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_TOKENS: u32 = 4096;
const MAX_ERROR_BODY: usize = 1024;

const CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const KIMI_URL: &str = "https://api.moonshot.cn/v1/chat/completions";

/// Send one optimization request and validate the reply.
pub async fn request_optimization(
    payload: &RequestPayload,
    provider: Provider,
    model: &str,
    api_key: &str,
) -> Result<OptimizationResponse> {
    let prompt = build_user_prompt(payload);
    let images = &payload.plate_images;

    info!(
        "Requesting optimization from {} ({}) with {} plate images",
        provider,
        model,
        images.len()
    );

    let text = match provider {
        Provider::Claude => call_claude(api_key, model, &prompt, images).await?,
        Provider::OpenAi => call_openai(api_key, model, &prompt, images).await?,
        Provider::OpenRouter => call_openrouter(api_key, model, &prompt, images).await?,
        Provider::Kimi => call_kimi(api_key, model, &prompt, images).await?,
    };

    parse_response(&text)
}

/// Build a reqwest client with the request timeout applied.
fn build_api_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| PlateTuneError::Service(format!("Failed to build HTTP client: {}", e)))
}

/// Send a prepared request and return the body text of a 2xx response.
async fn send(request: reqwest::RequestBuilder, provider: Provider) -> Result<String> {
    let response = request.send().await.map_err(|e| {
        let msg = if e.is_timeout() {
            format!(
                "LLM API timeout after {}s for provider '{}'",
                REQUEST_TIMEOUT_SECS, provider
            )
        } else {
            format!("LLM API request failed for {}: {}", provider, e)
        };
        error!("{}", msg);
        PlateTuneError::Service(msg)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let msg = format!(
            "LLM API error: {} from {} - {}",
            status,
            provider,
            truncate(&body, MAX_ERROR_BODY)
        );
        error!("{}", msg);
        return Err(PlateTuneError::Service(msg));
    }

    response.text().await.map_err(|e| {
        PlateTuneError::Service(format!(
            "Failed to read API response body from {}: {}",
            provider, e
        ))
    })
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Split a `data:<mime>;base64,<data>` URL.
fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let rest = data_url.strip_prefix("data:")?;
    let (media_type, data) = rest.split_once(";base64,")?;
    Some((media_type, data))
}

/// Anthropic Messages body. Images become base64 source blocks ahead of
/// the text block.
fn claude_body(model: &str, prompt: &str, images: &[PlateImage]) -> Value {
    let mut content: Vec<Value> = images
        .iter()
        .filter_map(|image| split_data_url(&image.data_url))
        .map(|(media_type, data)| {
            serde_json::json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data}
            })
        })
        .collect();
    content.push(serde_json::json!({"type": "text", "text": prompt}));

    serde_json::json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "system": SYSTEM_PROMPT,
        "messages": [
            {"role": "user", "content": content}
        ]
    })
}

/// OpenAI-compatible chat body, shared by openai, openrouter and kimi.
fn chat_body(model: &str, prompt: &str, images: &[PlateImage], response_format: Value) -> Value {
    let user_content = if images.is_empty() {
        Value::String(prompt.to_string())
    } else {
        let mut blocks = vec![serde_json::json!({"type": "text", "text": prompt})];
        blocks.extend(images.iter().map(|image| {
            serde_json::json!({"type": "image_url", "image_url": {"url": image.data_url}})
        }));
        Value::Array(blocks)
    };

    serde_json::json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": user_content}
        ],
        "response_format": response_format
    })
}

fn parse_wrapper(body_text: &str, provider: Provider) -> Result<Value> {
    serde_json::from_str(body_text).map_err(|e| {
        let msg = format!("Failed to parse {} API response wrapper: {}", provider, e);
        error!("{}", msg);
        PlateTuneError::Service(msg)
    })
}

fn chat_content(resp_json: &Value, provider: Provider) -> Result<String> {
    // { "choices": [{"message": {"content": "..."}}] }
    resp_json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            let msg = format!("No content in {} API response", provider);
            error!("{}", msg);
            PlateTuneError::Service(msg)
        })
}

/// Anthropic does not take a strict schema here; the schema is part of
/// the prompt text instead.
async fn call_claude(api_key: &str, model: &str, prompt: &str, images: &[PlateImage]) -> Result<String> {
    let client = build_api_client()?;
    let request = client
        .post(CLAUDE_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&claude_body(model, prompt, images));

    let body_text = send(request, Provider::Claude).await?;
    let resp_json = parse_wrapper(&body_text, Provider::Claude)?;

    // { "content": [{"type": "text", "text": "..."}] }
    resp_json["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
        .map(|s| s.to_string())
        .ok_or_else(|| {
            let msg = "No text content in Claude API response".to_string();
            error!("{}", msg);
            PlateTuneError::Service(msg)
        })
}

async fn call_openai(api_key: &str, model: &str, prompt: &str, images: &[PlateImage]) -> Result<String> {
    let client = build_api_client()?;
    let format = serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "optimization_response",
            "schema": optimization_response_schema()
        }
    });
    let request = client
        .post(OPENAI_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("content-type", "application/json")
        .json(&chat_body(model, prompt, images, format));

    let body_text = send(request, Provider::OpenAi).await?;
    chat_content(&parse_wrapper(&body_text, Provider::OpenAi)?, Provider::OpenAi)
}

/// OpenRouter routes to models with uneven schema support, so only
/// json_object mode is requested.
async fn call_openrouter(api_key: &str, model: &str, prompt: &str, images: &[PlateImage]) -> Result<String> {
    let client = build_api_client()?;
    let request = client
        .post(OPENROUTER_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("content-type", "application/json")
        .json(&chat_body(model, prompt, images, json_object_format()));

    let body_text = send(request, Provider::OpenRouter).await?;
    chat_content(
        &parse_wrapper(&body_text, Provider::OpenRouter)?,
        Provider::OpenRouter,
    )
}

/// Moonshot text models reject image blocks; previews are only sent to
/// vision models.
async fn call_kimi(api_key: &str, model: &str, prompt: &str, images: &[PlateImage]) -> Result<String> {
    let client = build_api_client()?;
    let images: &[PlateImage] = if kimi_accepts_images(model) { images } else { &[] };
    let request = client
        .post(KIMI_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("content-type", "application/json")
        .json(&chat_body(model, prompt, images, json_object_format()));

    let body_text = send(request, Provider::Kimi).await?;
    chat_content(&parse_wrapper(&body_text, Provider::Kimi)?, Provider::Kimi)
}

fn kimi_accepts_images(model: &str) -> bool {
    model.contains("vision")
}

fn json_object_format() -> Value {
    serde_json::json!({"type": "json_object"})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> PlateImage {
        PlateImage {
            plate_index: Some(0),
            name: "plate_1.png".to_string(),
            data_url: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        }
    }

    #[test]
    fn test_split_data_url() {
        assert_eq!(
            split_data_url("data:image/png;base64,AAAA"),
            Some(("image/png", "AAAA"))
        );
        assert_eq!(split_data_url("https://example.com/a.png"), None);
        assert_eq!(split_data_url("data:image/png,AAAA"), None);
    }

    #[test]
    fn test_claude_body_puts_images_first() {
        let body = claude_body("claude-sonnet-4-20250514", "PROMPT", &[image()]);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "iVBORw0KGgo=");
        assert_eq!(content[1]["text"], "PROMPT");
        assert_eq!(body["system"], SYSTEM_PROMPT);
    }

    #[test]
    fn test_chat_body_shapes() {
        let plain = chat_body("gpt-4o", "PROMPT", &[], json_object_format());
        assert_eq!(plain["messages"][1]["content"], "PROMPT");
        assert_eq!(plain["response_format"]["type"], "json_object");

        let with_image = chat_body("gpt-4o", "PROMPT", &[image()], json_object_format());
        let content = &with_image["messages"][1]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn test_chat_content_extraction() {
        let wrapper = serde_json::json!({"choices": [{"message": {"content": "{\"changes\":[]}"}}]});
        assert_eq!(
            chat_content(&wrapper, Provider::OpenAi).unwrap(),
            "{\"changes\":[]}"
        );
        let empty = serde_json::json!({"choices": []});
        assert!(matches!(
            chat_content(&empty, Provider::Kimi),
            Err(PlateTuneError::Service(_))
        ));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let body = "é".repeat(10);
        assert_eq!(truncate(&body, 3), "ééé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_kimi_vision_gate() {
        assert!(!kimi_accepts_images("moonshot-v1-128k"));
        assert!(kimi_accepts_images("moonshot-v1-128k-vision-preview"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_service_error() {
        let client = build_api_client().unwrap();
        let request = client.post("http://127.0.0.1:9/v1/messages").body("{}");
        let err = send(request, Provider::Claude).await.unwrap_err();
        assert!(matches!(err, PlateTuneError::Service(_)));
    }
}
