//! HTTP step
//!
//! Sends one request and records the full response shape into the context.
//! Non-2xx responses and transport failures are step failures that honor
//! `onError`; the response (when there is one) is still recorded.

use super::{interpolate_value, StepContext, StepHandler, StepOutput};
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::StepDef;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub struct HttpStep;

#[async_trait]
impl StepHandler for HttpStep {
    async fn execute(&self, step: &StepDef, ctx: &StepContext<'_>) -> WorkflowResult<StepOutput> {
        let config = interpolate_value(
            ctx.engine,
            &Value::Object(step.config.clone()),
            &ctx.vars,
        )?;
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::Step {
                step: step.id.clone(),
                message: "HTTP step missing URL".to_string(),
            })?
            .to_string();
        let method_text = config
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::Step {
                step: step.id.clone(),
                message: "HTTP step missing method".to_string(),
            })?;
        let method = reqwest::Method::from_bytes(method_text.to_ascii_uppercase().as_bytes())
            .map_err(|_| WorkflowError::Step {
                step: step.id.clone(),
                message: format!("invalid HTTP method: {}", method_text),
            })?;

        ensure_url_allowed(ctx, &url)?;

        let timeout_ms = config
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(ctx.config.default_timeout_ms);

        let mut request = ctx
            .http
            .request(method.clone(), &url)
            .timeout(Duration::from_millis(timeout_ms));
        match config.get("body") {
            Some(Value::String(text)) => request = request.body(text.clone()),
            Some(body @ (Value::Object(_) | Value::Array(_))) => {
                // Serialized as JSON with a default Content-Type
                request = request.json(body);
            }
            _ => {}
        }
        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(_) => {
                return Ok(StepOutput::failed(
                    json!({ "success": false, "method": method.as_str(), "url": url }),
                    "HTTP request failed",
                ));
            }
        };

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.as_str().to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).to_string()),
            );
        }
        let body_text = response.text().await.unwrap_or_default();
        let response_data = serde_json::from_str::<Value>(&body_text)
            .unwrap_or(Value::String(body_text));

        let success = status.is_success();
        let value = json!({
            "success": success,
            "status": status.as_u16(),
            "statusText": status_text,
            "headers": headers,
            "responseData": response_data,
            "method": method.as_str(),
            "url": url,
        });
        if success {
            Ok(StepOutput::ok(value))
        } else {
            let error = format!("HTTP {}: {}", status.as_u16(), status_text);
            Ok(StepOutput::failed(value, error))
        }
    }
}

fn ensure_url_allowed(ctx: &StepContext<'_>, url: &str) -> WorkflowResult<()> {
    match &ctx.config.http_allow_list {
        None => Ok(()),
        Some(prefixes) if prefixes.iter().any(|p| url.starts_with(p.as_str())) => Ok(()),
        Some(_) => Err(WorkflowError::Step {
            step: String::new(),
            message: format!("HTTP URL not on allow-list: {}", url),
        }),
    }
}
