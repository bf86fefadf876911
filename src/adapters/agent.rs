//! HTTP conversational agent adapter
//!
//! Forwards recognized text plus the conversation identifier to the external
//! agent runtime. An escalation/refusal comes back as `AgentError::Escalated`
//! carrying the message the user should hear.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AgentBridge, SessionContext};
use crate::error::AgentError;

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    session_id: &'a str,
    conversation_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    text: String,
    #[serde(default)]
    escalated: bool,
}

pub struct HttpAgentBridge {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpAgentBridge {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl AgentBridge for HttpAgentBridge {
    async fn respond(&self, ctx: &SessionContext, text: &str) -> Result<String, AgentError> {
        debug!(
            session_id = %ctx.session_id,
            chars = text.len(),
            "Forwarding utterance text to agent"
        );

        let body = AgentRequest {
            session_id: &ctx.session_id,
            conversation_id: &ctx.conversation_id,
            text,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Unreachable(format!(
                "agent endpoint returned {status}"
            )));
        }

        let parsed: AgentResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Unreachable(e.to_string()))?;

        if parsed.escalated {
            return Err(AgentError::Escalated(parsed.text));
        }

        Ok(parsed.text)
    }
}
