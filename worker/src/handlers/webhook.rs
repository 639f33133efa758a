use async_trait::async_trait;
use db::dtos::{ActionMessage, ActionPayload, ActionType, HttpMethod};
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

use super::{ActionError, ActionHandler};

/// Sends the trigger data as JSON to the configured endpoint. Any non-2xx
/// response is a failure.
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(timeout: Duration) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    async fn handle_action(&self, action: &ActionMessage) -> Result<(), ActionError> {
        let ActionPayload::Webhook {
            url,
            method: http_method,
            headers,
        } = &action.payload
        else {
            return Err(ActionError::WrongActionType(ActionType::Webhook));
        };

        let mut request = self.client.request(method(*http_method), url);

        for (name, value) in headers {
            request = request.header(name, value);
        }

        // Configured headers go first so a custom Content-Type survives.
        if *http_method != HttpMethod::Get {
            request = request.json(&action.data);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ActionError::WebhookStatus(status.as_u16()));
        }

        debug!("Webhook {http_method:?} {url} answered {status}");

        Ok(())
    }
}
