use async_openai::types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs};
use futures::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use tracing::{debug, error};

use crate::{
    config::GatewayConfig,
    error::{Error, Result},
};

/// The two-message conversation every generation sends.
pub fn conversation(instruction: &str, prompt: String) -> Vec<ChatCompletionRequestMessage> {
    vec![
        ChatCompletionRequestMessage::System(instruction.to_string().into()),
        ChatCompletionRequestMessage::User(prompt.into()),
    ]
}

/// A chat-completion endpoint. Returns the text of the first choice.
pub trait ChatBackend: Send + Sync {
    fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> BoxFuture<'_, Result<String>>;
}

/// OpenAI-compatible gateway reached over HTTPS. One request per call, no
/// retries: a non-2xx answer surfaces as [`Error::Upstream`] with its status.
pub struct GatewayClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    async fn send(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .build()
            .map_err(anyhow::Error::from)?;
        debug!("calling {} with model {}", self.endpoint, self.model);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("AI API error {status}: {body}");
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }
        let envelope: CompletionEnvelope = response.json().await?;
        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(Error::EmptyCompletion)
    }
}

impl ChatBackend for GatewayClient {
    fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> BoxFuture<'_, Result<String>> {
        self.send(messages).boxed()
    }
}
