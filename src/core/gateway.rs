//! Model gateway: primary model, one fallback on rate limits, classified errors

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::Message;
use crate::providers::{
    CompletionRequest, ModelProvider, ModelReply, ProviderError, ProviderErrorKind, ToolPolicy,
};
use crate::tools::ToolDefinition;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Rate limit / quota issue ({primary}). Fallback also failed: {fallback}")]
    FallbackFailed {
        primary: ProviderError,
        fallback: ProviderError,
    },

    #[error("LLM call failed: {0}")]
    Unavailable(ProviderError),

    #[error("Unexpected LLM error: {0}")]
    Unexpected(ProviderError),
}

pub(super) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct ModelGateway {
    provider: Arc<dyn ModelProvider>,
    primary_model: String,
    fallback_model: String,
    temperature: f32,
}

impl ModelGateway {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Call the primary model. A rate-limit failure gets exactly one retry on
    /// the fallback model with the same arguments; every other failure is
    /// returned as is.
    pub async fn invoke(
        &self,
        messages: Vec<Message>,
        tools: &[ToolDefinition],
        policy: ToolPolicy,
    ) -> Result<ModelReply, GatewayError> {
        let request = CompletionRequest {
            model: self.primary_model.clone(),
            messages,
            tools: tools.to_vec(),
            policy,
            temperature: self.temperature,
        };

        let primary = match self.complete(&request).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        match primary.kind() {
            ProviderErrorKind::RateLimit => {
                warn!(
                    model = %self.primary_model,
                    fallback = %self.fallback_model,
                    error = %primary,
                    "Primary model rate limited, trying fallback model"
                );

                match self.complete(&request.with_model(&self.fallback_model)).await {
                    Ok(reply) => {
                        info!(model = %self.fallback_model, "Fallback model answered");
                        Ok(reply)
                    }
                    Err(fallback) => Err(GatewayError::FallbackFailed { primary, fallback }),
                }
            }
            ProviderErrorKind::Auth | ProviderErrorKind::Connection | ProviderErrorKind::Api => {
                warn!(model = %self.primary_model, error = %primary, "LLM call failed");
                Err(GatewayError::Unavailable(primary))
            }
            ProviderErrorKind::InvalidResponse => {
                warn!(model = %self.primary_model, error = %primary, "Unexpected LLM error");
                Err(GatewayError::Unexpected(primary))
            }
        }
    }

    /// One provider call; a panic inside the provider comes back as an error
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ProviderError> {
        AssertUnwindSafe(self.provider.complete(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ProviderError::Panicked(panic_message(payload))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rate_limited, text, PanickingProvider, ScriptedProvider};

    fn gateway(provider: Arc<ScriptedProvider>) -> ModelGateway {
        ModelGateway::new(provider, "gpt-4o", "gpt-4o-mini").with_temperature(0.2)
    }

    #[tokio::test]
    async fn test_primary_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![text("hello")]));
        let reply = gateway(provider.clone())
            .invoke(vec![Message::user("hi")], &[], ToolPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(reply, ModelReply::FinalText("hello".into()));
        assert_eq!(provider.models(), vec!["gpt-4o"]);
    }

    #[tokio::test]
    async fn test_rate_limit_uses_fallback_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![rate_limited(), text("from fallback")]));
        let reply = gateway(provider.clone())
            .invoke(vec![Message::user("hi")], &[], ToolPolicy::Auto)
            .await
            .unwrap();

        assert_eq!(reply, ModelReply::FinalText("from fallback".into()));
        assert_eq!(provider.models(), vec!["gpt-4o", "gpt-4o-mini"]);

        let requests = provider.requests();
        assert_eq!(requests[0].messages, requests[1].messages);
        assert_eq!(requests[0].policy, requests[1].policy);
    }

    #[tokio::test]
    async fn test_both_models_fail() {
        let provider = Arc::new(ScriptedProvider::new(vec![rate_limited(), rate_limited()]));
        let err = gateway(provider.clone())
            .invoke(vec![Message::user("hi")], &[], ToolPolicy::Auto)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::FallbackFailed { .. }));
        assert!(err.to_string().contains("Fallback also failed"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_skips_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Unauthorized("bad key".into())),
            text("never reached"),
        ]));
        let err = gateway(provider.clone())
            .invoke(vec![Message::user("hi")], &[], ToolPolicy::Auto)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(err.to_string().starts_with("LLM call failed"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_response_is_unexpected() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::InvalidResponse(
            "No choices in response".into(),
        ))]));
        let err = gateway(provider.clone())
            .invoke(vec![Message::user("hi")], &[], ToolPolicy::None)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unexpected(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_panic_is_unexpected() {
        let provider = Arc::new(PanickingProvider::default());
        let err = ModelGateway::new(provider.clone(), "gpt-4o", "gpt-4o-mini")
            .invoke(vec![Message::user("hi")], &[], ToolPolicy::Auto)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unexpected(ProviderError::Panicked(_))));
        assert!(err.to_string().contains("provider exploded"));
        assert_eq!(provider.calls(), 1);
    }
}
