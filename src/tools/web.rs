//! Web tools.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{HiveError, Result};
use crate::message::ToolOutcome;
use crate::tool::{Tool, ToolContext};

pub struct HttpRequestTool;

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http request"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP GET and return the response body. Arguments: [url]"
    }

    fn category(&self) -> &str {
        "web"
    }

    async fn run(&self, args: Vec<Value>, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let url = args
            .first()
            .and_then(Value::as_str)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
            .ok_or_else(|| HiveError::Protocol("http request: missing or invalid url".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| HiveError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|err| HiveError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| HiveError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;

        if !status.is_success() {
            return Ok(ToolOutcome::Text(format!(
                "Request failed with {status}: {body}"
            )));
        }
        Ok(ToolOutcome::Text(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let result = HttpRequestTool
            .run(vec![json!("file:///etc/passwd")], &ToolContext::default())
            .await;
        assert!(result.is_err());
    }
}
