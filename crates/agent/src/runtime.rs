use std::sync::Arc;

use tracing::{debug, info, warn};

use promissory_core::domain::conversation::{ConversationMessage, MessageRole};
use promissory_core::domain::fulfillment::FulfillmentOutcome;
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::domain::signal::PromiseSignal;
use promissory_core::ports::ConversationLog;

use crate::detect::{PromiseSignalDetector, UserRequestSignalDetector};
use crate::fulfillment::FulfillmentOrchestrator;

/// One conversational turn as seen by the engine.
#[derive(Clone, Copy, Debug)]
pub struct Turn<'a> {
    pub tenant_id: &'a TenantId,
    pub lead_id: &'a LeadId,
    pub text: &'a str,
    /// Contact address, when the lead already gave one.
    pub destination: Option<&'a str>,
    pub name: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnReport {
    pub signal: Option<PromiseSignal>,
    /// Outcome for `signal`, when it cleared the action threshold.
    pub outcome: Option<FulfillmentOutcome>,
    /// Outcomes of queued promises delivered because the turn carried a
    /// contact address.
    pub replayed: Vec<FulfillmentOutcome>,
}

/// Wires detection to fulfillment for a single turn.
///
/// The turn is appended to the conversation log after detection, so the
/// detectors see it once as the turn text and the prior history as context.
/// A turn that carries a contact address also replays the lead's pending
/// queue, after the turn's own signal has been fulfilled.
pub struct FulfillmentRuntime {
    promise_detector: PromiseSignalDetector,
    request_detector: UserRequestSignalDetector,
    orchestrator: Arc<FulfillmentOrchestrator>,
    conversations: Arc<dyn ConversationLog>,
    min_action_confidence: f64,
}

impl FulfillmentRuntime {
    pub fn new(
        promise_detector: PromiseSignalDetector,
        request_detector: UserRequestSignalDetector,
        orchestrator: Arc<FulfillmentOrchestrator>,
        conversations: Arc<dyn ConversationLog>,
    ) -> Self {
        let min_action_confidence = promise_detector.config().min_action_confidence;
        Self {
            promise_detector,
            request_detector,
            orchestrator,
            conversations,
            min_action_confidence,
        }
    }

    pub fn orchestrator(&self) -> &FulfillmentOrchestrator {
        &self.orchestrator
    }

    pub async fn on_assistant_reply(&self, turn: Turn<'_>) -> TurnReport {
        let history = self.history(turn).await;
        let context =
            history.iter().map(|message| message.text.as_str()).collect::<Vec<_>>().join("\n");
        let signal = self.promise_detector.detect_assistant_promise(turn.text, Some(&context));
        self.log_turn(turn, MessageRole::Assistant).await;
        self.act(turn, signal).await
    }

    pub async fn on_user_message(&self, turn: Turn<'_>) -> TurnReport {
        let signal = self.request_detector.detect_user_request(turn.text).map(PromiseSignal::from);
        self.log_turn(turn, MessageRole::User).await;
        self.act(turn, signal).await
    }

    async fn act(&self, turn: Turn<'_>, signal: Option<PromiseSignal>) -> TurnReport {
        let outcome = match &signal {
            Some(signal) if signal.confidence >= self.min_action_confidence => Some(
                self.orchestrator
                    .fulfill(turn.tenant_id, turn.lead_id, signal, turn.destination, turn.name)
                    .await,
            ),
            Some(signal) => {
                debug!(
                    event_name = "runtime.signal.below_threshold",
                    tenant_id = %turn.tenant_id,
                    lead_id = %turn.lead_id,
                    asset_type = signal.asset_type.as_str(),
                    confidence = signal.confidence,
                    threshold = self.min_action_confidence,
                    "signal ignored"
                );
                None
            }
            None => None,
        };

        let replayed = match turn.destination.map(str::trim).filter(|value| !value.is_empty()) {
            Some(destination) => {
                self.orchestrator
                    .fulfill_pending(turn.tenant_id, turn.lead_id, destination, turn.name)
                    .await
            }
            None => Vec::new(),
        };
        if !replayed.is_empty() {
            info!(
                event_name = "runtime.pending.replayed",
                tenant_id = %turn.tenant_id,
                lead_id = %turn.lead_id,
                replayed = replayed.len(),
                "queued promises replayed on contact address"
            );
        }

        TurnReport { signal, outcome, replayed }
    }

    async fn history(&self, turn: Turn<'_>) -> Vec<ConversationMessage> {
        match self.conversations.messages(turn.tenant_id, turn.lead_id).await {
            Ok(messages) => messages,
            Err(store_error) => {
                warn!(
                    event_name = "runtime.history.unavailable",
                    tenant_id = %turn.tenant_id,
                    lead_id = %turn.lead_id,
                    error = %store_error,
                    "conversation history unavailable; detecting on the turn alone"
                );
                Vec::new()
            }
        }
    }

    async fn log_turn(&self, turn: Turn<'_>, role: MessageRole) {
        let message = ConversationMessage::new(role, turn.text);
        if let Err(store_error) =
            self.conversations.append(turn.tenant_id, turn.lead_id, message).await
        {
            warn!(
                event_name = "runtime.history.append_failed",
                tenant_id = %turn.tenant_id,
                lead_id = %turn.lead_id,
                error = %store_error,
                "turn could not be appended to the conversation log"
            );
        }
    }
}
