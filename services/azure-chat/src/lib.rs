//! Azure OpenAI chat completions.
//!
//! A thin proxy client: the caller supplies the conversation history, the
//! client truncates it, forwards one completion request and maps degenerate
//! upstream replies to canned apologies. Nothing is stored.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quotevoice_core::AzureOpenAiConfig;

/// Upstream calls are bounded; the gateway surfaces a timeout as a 500.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_COMPLETION_TOKENS: u32 = 1000;

/// Only the most recent turns of the caller-supplied history are forwarded.
pub const HISTORY_LIMIT: usize = 10;

pub const TOKEN_LIMIT_APOLOGY: &str = "I apologize, but my response was cut off due to token limits. Could you please rephrase your question more concisely, or I can help with a simpler query?";
pub const GENERIC_APOLOGY: &str = "I apologize, but I'm having trouble generating a response. Please try again or rephrase your question.";

/// A single turn of caller-supplied conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `user` or `bot`; anything else is ignored.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Build the upstream message list: system prompt, the last
/// [`HISTORY_LIMIT`] history turns, then the current message.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatTurn],
    message: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: "system",
        content: system_prompt.to_string(),
    }];

    let start = history.len().saturating_sub(HISTORY_LIMIT);
    for turn in &history[start..] {
        let role = match turn.kind.as_str() {
            "user" => "user",
            "bot" => "assistant",
            _ => continue,
        };
        messages.push(ChatMessage {
            role,
            content: turn.text.clone(),
        });
    }

    messages.push(ChatMessage {
        role: "user",
        content: message.to_string(),
    });
    messages
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    max_completion_tokens: u32,
    /// Ignored by non-reasoning deployments.
    reasoning_effort: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    config: AzureOpenAiConfig,
}

impl ChatClient {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Building HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn deployment(&self) -> &str {
        &self.config.deployment
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }

    /// Forward one completion request and extract the reply text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = self.completions_url();
        debug!("Calling Azure OpenAI deployment `{}`", self.config.deployment);

        let request = CompletionRequest {
            messages,
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            reasoning_effort: "low",
        };

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Calling Azure OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Azure OpenAI API error: {status} - {body}");
        }

        let response: CompletionResponse = response
            .json()
            .await
            .context("Decoding Azure OpenAI response")?;
        reply_from_response(response)
    }
}

fn reply_from_response(response: CompletionResponse) -> Result<String> {
    let Some(choice) = response.choices.into_iter().next() else {
        bail!("No choices in Azure OpenAI response");
    };

    let content = choice
        .message
        .content
        .map(|content| content.trim().to_string())
        .unwrap_or_default();
    if !content.is_empty() {
        return Ok(content);
    }

    // Reasoning deployments can spend the whole budget before producing any
    // visible content.
    let finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown");
    warn!("Empty content received, finish reason: {finish_reason}");
    Ok(match finish_reason {
        "length" => TOKEN_LIMIT_APOLOGY.to_string(),
        _ => GENERIC_APOLOGY.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    const PROMPT: &str = "You are a helpful assistant.";

    fn turn(kind: &str, text: &str) -> ChatTurn {
        ChatTurn {
            kind: kind.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn single_user_turn_produces_three_messages() {
        let history = [turn("user", "hi")];
        let messages = build_messages(PROMPT, &history, "price?");
        assert_eq!(
            messages,
            vec![
                ChatMessage {
                    role: "system",
                    content: PROMPT.to_string()
                },
                ChatMessage {
                    role: "user",
                    content: "hi".to_string()
                },
                ChatMessage {
                    role: "user",
                    content: "price?".to_string()
                },
            ]
        );
    }

    #[test]
    fn bot_turns_become_assistant_messages() {
        let history = [turn("user", "hi"), turn("bot", "hello!")];
        let messages = build_messages(PROMPT, &history, "thanks");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[2].content, "hello!");
    }

    #[test]
    fn unknown_turn_kinds_are_dropped() {
        let history = [turn("system", "sneaky"), turn("user", "hi")];
        let messages = build_messages(PROMPT, &history, "ok");
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.content != "sneaky"));
    }

    #[test]
    fn history_is_truncated_to_the_most_recent_turns() {
        let history: Vec<ChatTurn> = (0..15).map(|i| turn("user", &format!("m{i}"))).collect();
        let messages = build_messages(PROMPT, &history, "last");
        // system + 10 history turns + current message
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[1].content, "m5");
        assert_eq!(messages[10].content, "m14");
    }

    #[rstest]
    #[case("length", TOKEN_LIMIT_APOLOGY)]
    #[case("content_filter", GENERIC_APOLOGY)]
    #[case("unknown", GENERIC_APOLOGY)]
    fn empty_content_maps_to_an_apology(#[case] finish_reason: &str, #[case] expected: &str) {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "" }, "finish_reason": finish_reason }]
        }))
        .unwrap();
        assert_eq!(reply_from_response(response).unwrap(), expected);
    }

    #[test]
    fn missing_content_without_finish_reason_is_the_generic_apology() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": {} }]
        }))
        .unwrap();
        assert_eq!(reply_from_response(response).unwrap(), GENERIC_APOLOGY);
    }

    #[test]
    fn replies_are_trimmed() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "  hello \n" }, "finish_reason": "stop" }]
        }))
        .unwrap();
        assert_eq!(reply_from_response(response).unwrap(), "hello");
    }

    #[test]
    fn no_choices_is_an_error() {
        let response: CompletionResponse =
            serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(reply_from_response(response).is_err());
    }
}
