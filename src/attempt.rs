//! A single checkout attempt, from mount to a final result.
//!
//! ```text
//! Idle → Mounted → Validating → MethodCreated → Confirming → Finalized(success | error)
//!                      └──────────────┴──────────────┴──────→ Finalized(error)
//! ```
//!
//! Every change goes through [`AttemptState::transition`]. Anything not drawn
//! above is an [`IllegalTransition`], so confirming before a payment method
//! exists cannot slip through as a silent no-op.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The block checkout's `emitResponse.noticeContexts`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NoticeContexts {
    #[serde(rename = "PAYMENTS", default = "default_payments_context")]
    pub payments: String,
    #[serde(rename = "EXPRESS_PAYMENTS", default = "default_express_context")]
    pub express_payments: String,
}

fn default_payments_context() -> String {
    "wc/checkout/payments".to_string()
}

fn default_express_context() -> String {
    "wc/checkout/express-payments".to_string()
}

impl Default for NoticeContexts {
    fn default() -> Self {
        NoticeContexts {
            payments: default_payments_context(),
            express_payments: default_express_context(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EmitResponse {
    #[serde(rename = "noticeContexts", default)]
    pub notice_contexts: NoticeContexts,
}

/// Outcome of one confirmation attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfirmationResult {
    Success {
        #[serde(rename = "redirectUrl", skip_serializing_if = "Option::is_none")]
        redirect_url: Option<String>,
    },
    Error {
        message: String,
        #[serde(rename = "messageContext")]
        message_context: String,
    },
}

impl ConfirmationResult {
    pub fn success(redirect_url: impl Into<String>) -> Self {
        ConfirmationResult::Success {
            redirect_url: Some(redirect_url.into()),
        }
    }

    /// An error shown next to the payment section.
    pub fn payments_error(message: impl Into<String>, emit_response: &EmitResponse) -> Self {
        ConfirmationResult::Error {
            message: message.into(),
            message_context: emit_response.notice_contexts.payments.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConfirmationResult::Success { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum AttemptState {
    #[default]
    Idle,
    Mounted,
    Validating,
    MethodCreated { payment_method: String },
    Confirming,
    Finalized(ConfirmationResult),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttemptEvent {
    /// The hosted element is attached to the page.
    ElementMounted,
    /// The host fired its pre-submit hook.
    SubmitRequested,
    /// Validation passed and the SDK created a payment method.
    MethodCreated { payment_method: String },
    /// Validation failed, the element was incomplete, or an earlier error is pending.
    Rejected(ConfirmationResult),
    /// The backend processed the order and returned a confirmation directive.
    OrderProcessed,
    /// The backend reported the order as failed.
    OrderFailed(ConfirmationResult),
    /// The SDK confirm call resolved.
    Confirmed(ConfirmationResult),
    /// The shopper starts over after a finished attempt.
    Restart,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("illegal checkout transition: {event:?} while {from:?}")]
pub struct IllegalTransition {
    pub from: AttemptState,
    pub event: AttemptEvent,
}

impl AttemptState {
    pub fn transition(self, event: AttemptEvent) -> Result<AttemptState, IllegalTransition> {
        use AttemptEvent as E;
        use AttemptState as S;

        match (self, event) {
            (S::Idle, E::ElementMounted) => Ok(S::Mounted),
            (S::Mounted, E::SubmitRequested) => Ok(S::Validating),
            (S::Validating, E::MethodCreated { payment_method }) => {
                Ok(S::MethodCreated { payment_method })
            }
            (S::Validating, E::Rejected(result)) if !result.is_success() => {
                Ok(S::Finalized(result))
            }
            (S::MethodCreated { .. }, E::OrderProcessed) => Ok(S::Confirming),
            (S::MethodCreated { .. }, E::OrderFailed(result)) if !result.is_success() => {
                Ok(S::Finalized(result))
            }
            (S::Confirming, E::Confirmed(result)) => Ok(S::Finalized(result)),
            // A host-side validation error can stop checkout after the method
            // was created; the next submit starts over.
            (S::Finalized(_) | S::MethodCreated { .. }, E::Restart) => Ok(S::Mounted),
            (from, event) => Err(IllegalTransition { from, event }),
        }
    }

    /// Apply `event` in place. On an illegal transition the state is left
    /// untouched and the error returned.
    pub fn advance(&mut self, event: AttemptEvent) -> Result<(), IllegalTransition> {
        let next = self.clone().transition(event)?;
        *self = next;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, AttemptState::Finalized(_))
    }

    pub fn result(&self) -> Option<&ConfirmationResult> {
        match self {
            AttemptState::Finalized(result) => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error() -> ConfirmationResult {
        ConfirmationResult::payments_error("nope", &EmitResponse::default())
    }

    #[test]
    fn happy_path_reaches_success() {
        let mut state = AttemptState::Idle;
        for event in [
            AttemptEvent::ElementMounted,
            AttemptEvent::SubmitRequested,
            AttemptEvent::MethodCreated {
                payment_method: "pm_1".into(),
            },
            AttemptEvent::OrderProcessed,
            AttemptEvent::Confirmed(ConfirmationResult::success("https://shop.example/ok")),
        ] {
            state.advance(event).unwrap();
        }
        assert_eq!(
            state.result(),
            Some(&ConfirmationResult::success("https://shop.example/ok"))
        );
    }

    #[test]
    fn validation_failure_finalizes_with_error() {
        let state = AttemptState::Validating
            .transition(AttemptEvent::Rejected(error()))
            .unwrap();
        assert!(state.is_finalized());
    }

    #[test]
    fn confirming_before_a_method_exists_is_rejected() {
        let err = AttemptState::Validating
            .transition(AttemptEvent::OrderProcessed)
            .unwrap_err();
        assert_eq!(err.from, AttemptState::Validating);

        let mut state = AttemptState::Mounted;
        assert!(state
            .advance(AttemptEvent::Confirmed(ConfirmationResult::success("x")))
            .is_err());
        assert_eq!(state, AttemptState::Mounted);
    }

    #[test]
    fn finalized_is_terminal_until_restart() {
        let done = AttemptState::Finalized(error());
        assert!(done.clone().transition(AttemptEvent::SubmitRequested).is_err());
        assert!(done
            .clone()
            .transition(AttemptEvent::Confirmed(ConfirmationResult::success("x")))
            .is_err());
        assert_eq!(
            done.transition(AttemptEvent::Restart).unwrap(),
            AttemptState::Mounted
        );
    }

    #[test]
    fn abandoned_methods_can_restart() {
        let created = AttemptState::MethodCreated {
            payment_method: "pm_1".into(),
        };
        assert_eq!(
            created.transition(AttemptEvent::Restart).unwrap(),
            AttemptState::Mounted
        );
        assert!(AttemptState::Confirming
            .transition(AttemptEvent::Restart)
            .is_err());
    }

    #[test]
    fn rejection_must_carry_an_error() {
        assert!(AttemptState::Validating
            .transition(AttemptEvent::Rejected(ConfirmationResult::success("x")))
            .is_err());
    }

    #[test]
    fn results_serialize_to_exactly_one_shape() {
        let ok = serde_json::to_value(ConfirmationResult::success("https://shop.example/42")).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({ "type": "success", "redirectUrl": "https://shop.example/42" })
        );

        let err = serde_json::to_value(error()).unwrap();
        assert_eq!(
            err,
            serde_json::json!({
                "type": "error",
                "message": "nope",
                "messageContext": "wc/checkout/payments"
            })
        );
    }

    #[test]
    fn notice_contexts_come_from_the_host() {
        let emit: EmitResponse = serde_json::from_str(
            r#"{ "noticeContexts": { "PAYMENTS": "ctx/pay", "EXPRESS_PAYMENTS": "ctx/express" } }"#,
        )
        .unwrap();
        assert_eq!(emit.notice_contexts.payments, "ctx/pay");
    }
}
