use crate::circuit_breaker::{create_gateway_circuit_breaker, GatewayCircuitBreaker};
use crate::errors::AppError;
use crate::models::ChatMessage;
use failsafe::futures::CircuitBreaker;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

pub const RATE_LIMITED_MESSAGE: &str = "Limite de requisições excedido. Tente novamente em breve.";
pub const PAYMENT_REQUIRED_MESSAGE: &str = "Créditos insuficientes. Entre em contato com o suporte.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Erro ao processar sua solicitação";

/// Maps a non-2xx gateway status to the error returned to the caller.
pub fn upstream_error(status: StatusCode) -> AppError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(RATE_LIMITED_MESSAGE.to_string()),
        StatusCode::PAYMENT_REQUIRED => {
            AppError::PaymentRequired(PAYMENT_REQUIRED_MESSAGE.to_string())
        }
        _ => AppError::InternalError(GENERIC_FAILURE_MESSAGE.to_string()),
    }
}

/// Client for the hosted LLM gateway (OpenAI-compatible chat completions).
#[derive(Clone)]
pub struct AiGatewayClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    breaker: GatewayCircuitBreaker,
}

impl AiGatewayClient {
    /// Creates a new `AiGatewayClient`.
    ///
    /// # Arguments
    ///
    /// * `url` - Full chat-completions endpoint.
    /// * `api_key` - Bearer key for the gateway.
    /// * `model` - Model identifier sent with every request.
    pub fn new(url: String, api_key: String, model: String) -> Result<Self, AppError> {
        // No total timeout: chat responses stream for as long as the model writes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create AI gateway client: {}", e))
            })?;

        Ok(Self {
            client,
            url,
            api_key,
            model,
            breaker: create_gateway_circuit_breaker(),
        })
    }

    /// Request body: the system prompt first, then the conversation, streaming on.
    pub fn chat_payload(&self, system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(json!({ "role": "system", "content": system_prompt }));
        all.extend(
            messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );

        json!({
            "model": self.model,
            "messages": all,
            "stream": true,
        })
    }

    /// Opens a streaming chat completion.
    ///
    /// Returns the upstream response with its body still unread, so the caller can
    /// relay the event stream.
    ///
    /// # Errors
    ///
    /// * 429 upstream → `RateLimited`, 402 upstream → `PaymentRequired`.
    /// * Any other failure, including an open circuit → `InternalError` with the generic message.
    pub async fn stream_chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<reqwest::Response, AppError> {
        let payload = self.chat_payload(system_prompt, messages);
        tracing::info!(
            "Sending {} messages to AI gateway (model {})",
            messages.len(),
            self.model
        );

        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload);

        let outcome = self
            .breaker
            .call(async move {
                let response = request.send().await.map_err(|e| {
                    AppError::ExternalApiError(format!("AI gateway request failed: {}", e))
                })?;

                if response.status().is_server_error() {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(AppError::ExternalApiError(format!(
                        "AI gateway returned {}: {}",
                        status, error_text
                    )));
                }
                Ok(response)
            })
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("AI gateway circuit open, rejecting chat request");
                return Err(AppError::InternalError(GENERIC_FAILURE_MESSAGE.to_string()));
            }
            Err(failsafe::Error::Inner(e)) => {
                tracing::error!("AI gateway error: {}", e);
                return Err(AppError::InternalError(GENERIC_FAILURE_MESSAGE.to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("AI gateway error: {} {}", status, error_text);
            return Err(upstream_error(status));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;
    use axum::http::StatusCode as HttpStatus;

    fn client() -> AiGatewayClient {
        AiGatewayClient::new(
            "https://example.com/v1/chat/completions".to_string(),
            "key".to_string(),
            "google/gemini-2.5-flash".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_payload_puts_system_prompt_first() {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: "Moro em Belém e gasto 300 kWh".to_string(),
        }];
        let payload = client().chat_payload("prompt", &messages);

        assert_eq!(payload["model"], "google/gemini-2.5-flash");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "prompt");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_upstream_status_mapping() {
        assert_eq!(
            upstream_error(StatusCode::TOO_MANY_REQUESTS).status_code(),
            HttpStatus::TOO_MANY_REQUESTS
        );
        assert_eq!(
            upstream_error(StatusCode::PAYMENT_REQUIRED).status_code(),
            HttpStatus::PAYMENT_REQUIRED
        );
        let other = upstream_error(StatusCode::BAD_REQUEST);
        assert_eq!(other.status_code(), HttpStatus::INTERNAL_SERVER_ERROR);
        assert!(other.to_string().contains(GENERIC_FAILURE_MESSAGE));
    }
}
