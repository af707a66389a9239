use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::signer;
use crate::templater::ExpressionTemplater;
use crate::types::ActionWebhookConfig;

/// Retry policy: exponential backoff, retryable statuses, transport errors
/// always retried, other 4xx never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs_f64(1.0),
            max_delay: Duration::from_secs_f64(60.0),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    RetryableHttp,
    NonRetryableHttp,
    Transport,
}

#[derive(Debug, Clone)]
pub struct WebhookResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<Value>,
    pub extracted_variables: HashMap<String, Value>,
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub execution_time: Duration,
}

/// One public operation, `execute`: template → serialize → sign →
/// request-with-retry → extract.
pub struct WebhookExecutor {
    client: Client,
    templater: ExpressionTemplater,
    retry_policy: RetryPolicy,
}

impl WebhookExecutor {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            templater: ExpressionTemplater::new(),
            retry_policy,
        }
    }

    #[instrument(skip(self, node_def, context))]
    pub async fn execute(&self, node_def: &ActionWebhookConfig, context: &Value) -> WebhookResult {
        let started = Instant::now();

        let url = self.templater.render(&node_def.url, context);
        let mut headers = HashMap::new();
        for (k, v) in &node_def.headers {
            headers.insert(k.clone(), self.templater.render(v, context));
        }
        let body_value = self.templater.render_value(&node_def.body, context);
        let body_json = match serde_json::to_string(&body_value) {
            Ok(s) => s,
            Err(e) => {
                return WebhookResult {
                    success: false,
                    status_code: None,
                    response_body: None,
                    extracted_variables: HashMap::new(),
                    error: Some(format!("failed to serialize body: {e}")),
                    error_class: Some(ErrorClass::NonRetryableHttp),
                    execution_time: started.elapsed(),
                };
            }
        };

        if let Some(secret) = &node_def.hmac_secret {
            let signature = signer::sign(node_def.hmac_algorithm, secret, &body_json);
            let header = node_def.hmac_header.clone().unwrap_or_else(|| "X-Signature".to_string());
            headers.insert(header, signature);
        }

        let timeout = Duration::from_millis(node_def.timeout_ms.unwrap_or(30_000));

        let mut attempt = 0u32;
        loop {
            let mut request = self
                .client
                .request(node_def.method.as_reqwest(), &url)
                .timeout(timeout)
                .body(body_json.clone());
            for (k, v) in &headers {
                request = request.header(k, v);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        let content_type = response
                            .headers()
                            .get(reqwest::header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let text = response.text().await.unwrap_or_default();
                        let body: Value = if content_type.starts_with("application/json") {
                            serde_json::from_str(&text).unwrap_or(Value::String(text.clone()))
                        } else {
                            Value::String(text)
                        };
                        let extracted = extract_variables(&node_def.extract, &body);
                        return WebhookResult {
                            success: true,
                            status_code: Some(status),
                            response_body: Some(body),
                            extracted_variables: extracted,
                            error: None,
                            error_class: None,
                            execution_time: started.elapsed(),
                        };
                    }

                    if RETRYABLE_STATUSES.contains(&status) && attempt < self.retry_policy.max_retries {
                        warn!(status, attempt, "webhook returned a retryable status, retrying");
                        tokio::time::sleep(self.retry_policy.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    let class = if RETRYABLE_STATUSES.contains(&status) {
                        ErrorClass::RetryableHttp
                    } else {
                        ErrorClass::NonRetryableHttp
                    };
                    return WebhookResult {
                        success: false,
                        status_code: Some(status),
                        response_body: None,
                        extracted_variables: HashMap::new(),
                        error: Some(format!("request failed with status {status}")),
                        error_class: Some(class),
                        execution_time: started.elapsed(),
                    };
                }
                Err(e) => {
                    let is_timeout = e.is_timeout();
                    if attempt < self.retry_policy.max_retries {
                        warn!(error = %e, attempt, "webhook transport error, retrying");
                        tokio::time::sleep(self.retry_policy.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return WebhookResult {
                        success: false,
                        status_code: None,
                        response_body: None,
                        extracted_variables: HashMap::new(),
                        error: Some(e.to_string()),
                        error_class: Some(if is_timeout { ErrorClass::Timeout } else { ErrorClass::Transport }),
                        execution_time: started.elapsed(),
                    };
                }
            }
        }
    }
}

/// Dotted-path + `[n]` array index traversal; a missing path yields `null`,
/// never an error.
fn extract_variables(extract: &HashMap<String, String>, body: &Value) -> HashMap<String, Value> {
    extract
        .iter()
        .map(|(name, path)| (name.clone(), extract_path(body, path)))
        .collect()
}

fn extract_path(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for segment in path.split('.') {
        if let Some(bracket_pos) = segment.find('[') {
            let (field, rest) = segment.split_at(bracket_pos);
            if !field.is_empty() {
                current = match current.get(field) {
                    Some(v) => v.clone(),
                    None => return Value::Null,
                };
            }
            for index_str in rest.trim_matches(|c| c == '[' || c == ']').split("][") {
                let Ok(idx) = index_str.parse::<usize>() else {
                    return Value::Null;
                };
                current = match current.get(idx) {
                    Some(v) => v.clone(),
                    None => return Value::Null,
                };
            }
        } else {
            current = match current.get(segment) {
                Some(v) => v.clone(),
                None => return Value::Null,
            };
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_post_extracts_response_variables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "id": 42 } })))
            .mount(&server)
            .await;

        let mut extract = HashMap::new();
        extract.insert("record_id".to_string(), "result.id".to_string());

        let config = ActionWebhookConfig {
            url: format!("{}/hook", server.uri()),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            body: json!({}),
            hmac_secret: None,
            hmac_algorithm: crate::types::HmacAlgorithm::Sha256,
            hmac_header: None,
            extract,
            timeout_ms: None,
        };

        let executor = WebhookExecutor::new(RetryPolicy::default());
        let result = executor.execute(&config, &json!({})).await;
        assert!(result.success);
        assert_eq!(result.extracted_variables.get("record_id"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn retryable_status_is_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let config = ActionWebhookConfig {
            url: format!("{}/flaky", server.uri()),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            body: json!(null),
            hmac_secret: None,
            hmac_algorithm: crate::types::HmacAlgorithm::Sha256,
            hmac_header: None,
            extract: HashMap::new(),
            timeout_ms: None,
        };

        let executor = WebhookExecutor::new(RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
        });
        let result = executor.execute(&config, &json!({})).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn non_retryable_4xx_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = ActionWebhookConfig {
            url: format!("{}/bad", server.uri()),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            body: json!(null),
            hmac_secret: None,
            hmac_algorithm: crate::types::HmacAlgorithm::Sha256,
            hmac_header: None,
            extract: HashMap::new(),
            timeout_ms: None,
        };

        let executor = WebhookExecutor::new(RetryPolicy::default());
        let result = executor.execute(&config, &json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_class, Some(ErrorClass::NonRetryableHttp));
    }

    #[test]
    fn extract_path_handles_array_index_and_missing_path() {
        let body = json!({ "items": [{"name": "a"}, {"name": "b"}] });
        assert_eq!(extract_path(&body, "items[1].name"), json!("b"));
        assert_eq!(extract_path(&body, "items[5].name"), Value::Null);
        assert_eq!(extract_path(&body, "missing.path"), Value::Null);
    }
}
