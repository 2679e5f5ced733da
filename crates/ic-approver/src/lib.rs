//! # ic-approver
//!
//! Conservative auto-approver for IronCurtain escalations.
//!
//! Consulted **only** when the policy engine returns `escalate` and the
//! operator has enabled an auto-approve model. The approver sees the
//! user's most recent message, the tool name, and the escalation reason —
//! never the arguments — and asks a cheap model whether the call obviously
//! matches the user's stated intent.
//!
//! The return type is [`AutoApproval`]: `Approve` or `Escalate`. There is
//! no deny variant, so no failure mode in this crate can ever strengthen a
//! decision past what the human would see. Empty input, transport errors,
//! timeouts, malformed responses, and any verdict other than `approve` all
//! collapse to `Escalate`.

use serde::Deserialize;

use ic_provider::{ChatApi, ChatMessage, ChatRequest};

/// What the auto-approver may answer. Deny is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoApproval {
    /// The call clearly serves the user's stated intent; skip the human.
    Approve,
    /// Anything else — hand the decision to the human.
    Escalate,
}

/// The schema the model is instructed to answer with.
#[derive(Debug, Deserialize)]
struct Verdict {
    decision: String,
}

const SYSTEM_PROMPT: &str = "\
You are a safety gate for an automated agent. A tool call was flagged for \
human review. Decide whether the call so obviously serves the user's \
stated request that interrupting the human is unnecessary.\n\
Rules:\n\
- Answer ONLY with a JSON object: {\"decision\":\"approve\"} or {\"decision\":\"escalate\"}.\n\
- \"approve\" ONLY when the user's message explicitly asks for exactly this \
kind of action. Any doubt means \"escalate\".\n\
- You cannot deny; a human reviews everything you do not approve.";

/// The auto-approver. Holds the chat backend and the model to consult.
pub struct AutoApprover {
    api: Box<dyn ChatApi>,
    model_id: String,
}

impl AutoApprover {
    pub fn new(api: Box<dyn ChatApi>, model_id: impl Into<String>) -> Self {
        Self {
            api,
            model_id: model_id.into(),
        }
    }

    /// Review one escalation. Never errors: every failure is `Escalate`.
    pub fn review(
        &self,
        user_message: &str,
        tool_name: &str,
        escalation_reason: &str,
    ) -> AutoApproval {
        // No user intent on record — nothing to match against.
        if user_message.trim().is_empty() {
            tracing::debug!("auto-approver skipped: no user context");
            return AutoApproval::Escalate;
        }

        let prompt = format!(
            "User's most recent message:\n{user_message}\n\n\
             Tool requested: {tool_name}\n\
             Why it was flagged: {escalation_reason}\n\n\
             Does this call obviously serve the user's request?"
        );

        let request = ChatRequest {
            model: self.model_id.clone(),
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: 64,
        };

        let response = match self.api.complete(&request) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "auto-approver call failed, escalating");
                return AutoApproval::Escalate;
            }
        };

        match parse_verdict(&response.text) {
            Some(AutoApproval::Approve) => {
                tracing::info!(tool = tool_name, "auto-approver approved");
                AutoApproval::Approve
            }
            _ => AutoApproval::Escalate,
        }
    }
}

/// Parse the model's reply. Tolerates surrounding prose but accepts only a
/// literal `approve` decision.
fn parse_verdict(text: &str) -> Option<AutoApproval> {
    let candidate = text.trim();
    let json_slice = if candidate.starts_with('{') {
        candidate
    } else {
        // Pull the first {...} block out of a chatty reply.
        let start = candidate.find('{')?;
        let end = candidate[start..].find('}')? + start + 1;
        &candidate[start..end]
    };

    let verdict: Verdict = serde_json::from_str(json_slice).ok()?;
    match verdict.decision.as_str() {
        "approve" => Some(AutoApproval::Approve),
        "escalate" => Some(AutoApproval::Escalate),
        // Anything else — including "deny" — is schema-violating.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic_provider::{ChatResponse, ProviderError};
    use std::sync::Mutex;

    /// A scripted model: answers from a queue, then errors.
    struct Scripted {
        replies: Mutex<Vec<Result<String, ()>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, ()>>) -> Box<Self> {
            Box::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(|s| s.to_string()))
                        .collect(),
                ),
            })
        }
    }

    impl ChatApi for Scripted {
        fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            match self.replies.lock().unwrap().pop() {
                Some(Ok(text)) => Ok(ChatResponse {
                    text,
                    input_tokens: 10,
                    output_tokens: 5,
                }),
                _ => Err(ProviderError::UnexpectedResponse("script exhausted".into())),
            }
        }
    }

    fn approver(replies: Vec<Result<&str, ()>>) -> AutoApprover {
        AutoApprover::new(Scripted::new(replies), "cheap-model")
    }

    #[test]
    fn clean_approve_is_approved() {
        let a = approver(vec![Ok(r#"{"decision":"approve"}"#)]);
        assert_eq!(
            a.review("please read /etc/hostname for me", "read_file", "read outside sandbox"),
            AutoApproval::Approve
        );
    }

    #[test]
    fn clean_escalate_is_escalated() {
        let a = approver(vec![Ok(r#"{"decision":"escalate"}"#)]);
        assert_eq!(
            a.review("do the thing", "delete_file", "delete outside sandbox"),
            AutoApproval::Escalate
        );
    }

    #[test]
    fn empty_user_message_never_calls_the_model() {
        // The script would approve — but it must never be consulted.
        let a = approver(vec![Ok(r#"{"decision":"approve"}"#)]);
        assert_eq!(a.review("   ", "read_file", "reason"), AutoApproval::Escalate);
    }

    #[test]
    fn transport_error_escalates() {
        let a = approver(vec![Err(())]);
        assert_eq!(a.review("read it", "read_file", "reason"), AutoApproval::Escalate);
    }

    /// Adversarial replies can never produce anything but escalation.
    #[test]
    fn adversarial_replies_all_escalate() {
        let adversarial = [
            r#"{"decision":"deny"}"#,
            r#"{"decision":"DENY"}"#,
            r#"{"decision":"Approve"}"#,
            r#"{"decision":""}"#,
            "",
            "approve",
            "yes, approve it",
            r#"{"decision": 42}"#,
            r#"{"verdict":"approve"}"#,
            "{broken json",
        ];
        for reply in adversarial {
            let a = approver(vec![Ok(reply)]);
            assert_eq!(
                a.review("read it", "read_file", "reason"),
                AutoApproval::Escalate,
                "reply {reply:?} must escalate"
            );
        }
    }

    #[test]
    fn approve_wrapped_in_prose_is_accepted() {
        let a = approver(vec![Ok("Sure — {\"decision\":\"approve\"} as requested.")]);
        assert_eq!(a.review("read it", "read_file", "reason"), AutoApproval::Approve);
    }
}
