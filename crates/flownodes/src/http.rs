use async_trait::async_trait;
use flowcore::{ActionInvoker, ConfigMap, NodeError, Value};
use tokio_util::sync::CancellationToken;

/// HTTP request action.
///
/// `url` comes from the config or, failing that, from the input. `method`
/// defaults to GET; `headers` is an optional object of string values. For
/// POST, PUT and PATCH the `body` input is sent as JSON, or as text when it
/// is a string.
pub struct HttpAction {
    client: reqwest::Client,
}

impl HttpAction {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(
        &self,
        config: &ConfigMap,
        input: &ConfigMap,
    ) -> Result<reqwest::RequestBuilder, NodeError> {
        let url = config
            .get("url")
            .or_else(|| input.get("url"))
            .ok_or_else(|| NodeError::MissingInput("url".to_string()))?
            .as_str()
            .ok_or_else(|| NodeError::InvalidConfig("url must be a string".to_string()))?;
        let method = config
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        let with_body = |req: reqwest::RequestBuilder| match input.get("body") {
            Some(Value::String(text)) => req.body(text.clone()),
            Some(body) => req.json(&body.to_json()),
            None => req,
        };

        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "DELETE" => self.client.delete(url),
            "POST" => with_body(self.client.post(url)),
            "PUT" => with_body(self.client.put(url)),
            "PATCH" => with_body(self.client.patch(url)),
            other => {
                return Err(NodeError::InvalidConfig(format!(
                    "unsupported method: {}",
                    other
                )))
            }
        };

        let request = match config.get("headers") {
            Some(Value::Object(headers)) => headers.iter().fold(request, |req, (key, value)| {
                match value.as_str() {
                    Some(val) => req.header(key.as_str(), val),
                    None => req,
                }
            }),
            _ => request,
        };

        tracing::debug!(%method, url, "Sending HTTP request");
        Ok(request)
    }
}

impl Default for HttpAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionInvoker for HttpAction {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        config: &ConfigMap,
        input: &ConfigMap,
    ) -> Result<ConfigMap, NodeError> {
        let request = self.build(config, input)?;

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            let headers: ConfigMap = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(v.to_str().unwrap_or(""))))
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;
            Ok::<_, NodeError>((status, headers, body))
        };

        let (status, headers, body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NodeError::Cancelled),
            result = exchange => result?,
        };
        tracing::debug!(status = status.as_u16(), "HTTP response received");

        let fail_on_error = config
            .get("fail_on_status")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if fail_on_error && (status.is_client_error() || status.is_server_error()) {
            return Err(NodeError::ExecutionFailed(format!(
                "HTTP request returned {}",
                status
            )));
        }

        let mut outputs = ConfigMap::new();
        outputs.insert("status".to_string(), Value::from(i64::from(status.as_u16())));
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
            outputs.insert("json".to_string(), Value::from(json));
        }
        outputs.insert("body".to_string(), Value::from(body));
        outputs.insert("headers".to_string(), Value::Object(headers));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn url_is_required() {
        let err = HttpAction::new()
            .invoke(&CancellationToken::new(), &ConfigMap::new(), &ConfigMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, NodeError::MissingInput("url".to_string()));
    }

    #[tokio::test]
    async fn unsupported_method_fails_before_sending() {
        let mut config = ConfigMap::new();
        config.insert("url".to_string(), Value::from("http://localhost:9/unused"));
        config.insert("method".to_string(), Value::from("TRACE"));

        let err = HttpAction::new()
            .invoke(&CancellationToken::new(), &config, &ConfigMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(msg) if msg.contains("TRACE")));
    }

    #[tokio::test]
    async fn cancelled_request_reports_cancellation() {
        let mut input = ConfigMap::new();
        input.insert("url".to_string(), Value::from("http://10.255.255.1/slow"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = HttpAction::new()
            .invoke(&cancel, &ConfigMap::new(), &input)
            .await
            .unwrap_err();
        assert_eq!(err, NodeError::Cancelled);
    }
}
