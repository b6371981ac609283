use super::{ExtractError, Extractor, RetryPolicy, with_inline_fallback, with_retry};
use crate::http::{build_client, duration_from_env};
use crate::prompts::META_CATEGORY_DETECTION_PROMPT;
use crate::schema::{AttributeBag, MetaCategory, MetaCategoryTemplate, SchemaViolation};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub classify_model: String,
    pub inference_timeout: Duration,
    pub fallback_timeout: Duration,
    pub asset_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ExtractConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            classify_model: std::env::var("CLASSIFY_MODEL")
                .unwrap_or_else(|_| "gpt-4.1-mini".into()),
            inference_timeout: duration_from_env("INFERENCE_TIMEOUT_SECS", 90),
            fallback_timeout: duration_from_env("FALLBACK_TIMEOUT_SECS", 180),
            asset_timeout: duration_from_env("ASSET_TIMEOUT_SECS", 15),
            retry: RetryPolicy::default(),
        }
    }
}

/// Structured-extraction client. One instance per run; the session id is
/// attached to every request so provider-side traces group by batch.
pub struct ExtractClient {
    http: Client,
    fetcher: Client,
    config: ExtractConfig,
    session_id: Uuid,
}

impl ExtractClient {
    pub fn new(config: ExtractConfig) -> Self {
        Self {
            http: build_client(config.fallback_timeout),
            fetcher: build_client(config.asset_timeout),
            config,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ExtractConfig::from_env())
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// One structured call outside the extraction schemas, used by the
    /// look-request boundary: returns whatever `T` the caller expects or
    /// fails, no retry/fallback discipline of its own. The whole request
    /// lives in the system prompt; there is no separate user turn.
    pub async fn parse_structured<T: DeserializeOwned>(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<T, ExtractError> {
        let body = structured_body(model, prompt);
        let content = self.chat_content(&body).await?;
        let cleaned = strip_markdown_fence(&content);
        serde_json::from_str(&cleaned)
            .map_err(|err| ExtractError::InvalidResponse(err.to_string()))
    }

    async fn submit_chat(
        &self,
        body: &Value,
        meta: MetaCategory,
    ) -> Result<AttributeBag, ExtractError> {
        let content = self.chat_content(body).await?;
        decode_attribute_payload(meta, &content)
    }

    async fn chat_content(&self, body: &Value) -> Result<String, ExtractError> {
        let payload = self
            .post_json("chat/completions", body, self.config.inference_timeout)
            .await?;
        let envelope: ChatEnvelope = serde_json::from_value(payload)
            .map_err(|err| ExtractError::InvalidResponse(err.to_string()))?;
        envelope
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ExtractError::InvalidResponse("no choices in response".into()))
    }

    /// Secondary synchronous endpoint accepting inline payloads instead of
    /// remote references. Used exactly once per logical call, after the
    /// primary path fails with a fallback-eligible error.
    async fn submit_inline(
        &self,
        data_url: &str,
        description: &str,
        template: &MetaCategoryTemplate,
    ) -> Result<AttributeBag, ExtractError> {
        let body = json!({
            "model": template.model,
            "input": [{
                "role": "user",
                "content": [
                    {"type": "input_text", "text": template.inline_prompt(description)},
                    {"type": "input_image", "image_url": data_url},
                ],
            }],
            "text": {"format": {"type": "json_object"}},
        });
        let payload = self
            .post_json("responses", &body, self.config.fallback_timeout)
            .await?;
        let envelope: ResponsesEnvelope = serde_json::from_value(payload)
            .map_err(|err| ExtractError::InvalidResponse(err.to_string()))?;
        let text = envelope
            .output
            .into_iter()
            .flat_map(|item| item.content)
            .find(|chunk| chunk.r#type == "output_text")
            .map(|chunk| chunk.text)
            .ok_or_else(|| ExtractError::InvalidResponse("no output_text in response".into()))?;
        decode_attribute_payload(template.meta, &text)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, ExtractError> {
        let url = format!("{}/{path}", self.config.base_url.trim_end_matches('/'));
        let mut request = self
            .http
            .post(url)
            .timeout(timeout)
            .header("X-Request-Id", self.session_id.to_string())
            .json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_gateway(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|err| ExtractError::InvalidResponse(err.to_string()))
    }

    /// Fetches the asset ourselves and re-encodes it as a data URL. The
    /// browser-ish headers get past CDNs that cut hotlinked or bot traffic.
    async fn fetch_as_data_url(&self, url: &str) -> Result<String, ExtractError> {
        let referer = url
            .rsplit_once('/')
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| url.to_string());
        let response = self
            .fetcher
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0")
            .header(REFERER, referer)
            .header(ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8")
            .send()
            .await
            .map_err(|err| ExtractError::AssetFetch(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExtractError::AssetFetch(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ExtractError::AssetFetch(err.to_string()))?;
        Ok(format!("data:{mime};base64,{}", BASE64.encode(&bytes)))
    }
}

impl Extractor for ExtractClient {
    async fn extract_from_text(
        &self,
        name: &str,
        template: &'static MetaCategoryTemplate,
        cache_key: Option<&str>,
    ) -> Result<AttributeBag, ExtractError> {
        let body = chat_body(
            template,
            cache_key,
            json!([
                {"role": "system", "content": template.system_prompt()},
                {"role": "user", "content": name},
            ]),
        );
        with_retry(self.config.retry, || self.submit_chat(&body, template.meta)).await
    }

    async fn extract_from_image(
        &self,
        image_url: &str,
        description: &str,
        template: &'static MetaCategoryTemplate,
        cache_key: Option<&str>,
    ) -> Result<AttributeBag, ExtractError> {
        let body = chat_body(
            template,
            cache_key,
            json!([
                {"role": "system", "content": template.system_prompt()},
                {"role": "user", "content": [
                    {"type": "text", "text": format!("Item description: {description}")},
                    {"type": "image_url", "image_url": {"url": image_url}},
                ]},
            ]),
        );
        let primary = with_retry(self.config.retry, || self.submit_chat(&body, template.meta));
        with_inline_fallback(primary, || async {
            let data_url = self.fetch_as_data_url(image_url).await?;
            self.submit_inline(&data_url, description, template).await
        })
        .await
    }

    async fn classify_meta(&self, name: &str) -> Result<MetaCategory, ExtractError> {
        let body = json!({
            "model": self.config.classify_model,
            "messages": [
                {"role": "system", "content": META_CATEGORY_DETECTION_PROMPT},
                {"role": "user", "content": name},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.0,
            "max_completion_tokens": 100,
        });
        with_retry(self.config.retry, || async {
            let content = self.chat_content(&body).await?;
            decode_meta_verdict(&content)
        })
        .await
    }
}

fn structured_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "system", "content": prompt}],
        "response_format": {"type": "json_object"},
        "temperature": 0.0,
        "max_completion_tokens": 1000,
    })
}

fn chat_body(template: &MetaCategoryTemplate, cache_key: Option<&str>, messages: Value) -> Value {
    let mut body = json!({
        "model": template.model,
        "messages": messages,
        "response_format": {"type": "json_object"},
        "temperature": 0.0,
        "max_completion_tokens": template.max_completion_tokens,
    });
    if let Some(key) = cache_key {
        body["prompt_cache_key"] = json!(key);
    }
    body
}

fn decode_attribute_payload(meta: MetaCategory, content: &str) -> Result<AttributeBag, ExtractError> {
    let cleaned = strip_markdown_fence(content);
    let value: Value = serde_json::from_str(&cleaned).map_err(|err| {
        ExtractError::Schema(SchemaViolation {
            meta,
            detail: format!("response is not JSON: {err}"),
        })
    })?;
    Ok(AttributeBag::from_response(meta, value)?)
}

#[derive(Debug, Deserialize)]
struct MetaVerdict {
    category: String,
}

fn decode_meta_verdict(content: &str) -> Result<MetaCategory, ExtractError> {
    let cleaned = strip_markdown_fence(content);
    let verdict: MetaVerdict = serde_json::from_str(&cleaned)
        .map_err(|err| ExtractError::InvalidResponse(err.to_string()))?;
    MetaCategory::from_tag(&verdict.category).ok_or_else(|| {
        ExtractError::InvalidResponse(format!(
            "unrecognized meta-category `{}`",
            verdict.category
        ))
    })
}

fn classify_transport(err: reqwest::Error) -> ExtractError {
    if err.is_connect() || err.is_timeout() {
        ExtractError::Connect(err.to_string())
    } else {
        ExtractError::Protocol(err.to_string())
    }
}

/// Maps gateway error bodies onto the taxonomy. The provider signals an
/// unusable remote reference with `invalid_image_url`, and a remote-side
/// download timeout with a fixed message fragment; both are fallback
/// triggers, everything else propagates as-is.
fn classify_gateway(status: u16, body: &str) -> ExtractError {
    let detail = truncate_detail(body);
    if body.contains("invalid_image_url") {
        ExtractError::InvalidImage(detail)
    } else if body.contains("Timeout while downloading") {
        ExtractError::AssetTimeout(detail)
    } else {
        ExtractError::Gateway { status, detail }
    }
}

fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= 300 {
        trimmed.to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesEnvelope {
    #[serde(default)]
    output: Vec<ResponsesItem>,
}

#[derive(Debug, Deserialize)]
struct ResponsesItem {
    #[serde(default)]
    content: Vec<ResponsesContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    r#type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::template;

    #[test]
    fn fenced_json_is_unwrapped() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fence(fenced), "{\"a\": 1}");
        assert_eq!(strip_markdown_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn gateway_bodies_map_to_fallback_classes() {
        assert!(matches!(
            classify_gateway(400, r#"{"error": {"code": "invalid_image_url"}}"#),
            ExtractError::InvalidImage(_)
        ));
        assert!(matches!(
            classify_gateway(400, "Timeout while downloading https://x/y.jpg"),
            ExtractError::AssetTimeout(_)
        ));
        assert!(matches!(
            classify_gateway(429, "rate limited"),
            ExtractError::Gateway { status: 429, .. }
        ));
    }

    #[test]
    fn chat_body_carries_cache_key_only_when_present() {
        let tpl = template(crate::schema::MetaCategory::Footwear);
        let with_key = chat_body(tpl, Some("cache-1"), json!([]));
        assert_eq!(with_key["prompt_cache_key"], "cache-1");
        assert_eq!(with_key["model"], tpl.model);
        let without = chat_body(tpl, None, json!([]));
        assert!(without.get("prompt_cache_key").is_none());
    }

    #[test]
    fn meta_verdict_resolves_to_a_known_category() {
        let meta = decode_meta_verdict(r#"{"category": "shoes", "confidence": 0.9}"#).unwrap();
        assert_eq!(meta, crate::schema::MetaCategory::Footwear);
        let err = decode_meta_verdict(r#"{"category": "hat", "confidence": 0.4}"#).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidResponse(_)));
    }

    #[test]
    fn structured_call_sends_the_prompt_as_a_single_turn() {
        let body = structured_body("m", "dress me for a gallery opening");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "dress me for a gallery opening");
    }

    #[test]
    fn non_json_payload_is_a_schema_failure() {
        let err =
            decode_attribute_payload(crate::schema::MetaCategory::Bag, "sorry, cannot help")
                .unwrap_err();
        assert!(matches!(err, ExtractError::Schema(_)));
        assert!(!err.is_connectivity());
        assert!(!err.is_fallback_eligible());
    }
}
