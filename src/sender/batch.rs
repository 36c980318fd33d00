use dimse::{
    select_context, Association, Connector, DestinationEndpoint, NegotiatedContext,
    PresentationContextProposal, ScuTimeouts, StoreOutcome, BASELINE_TRANSFER_SYNTAX,
};
use tracing::{debug, warn};

use crate::sender::natural::InstanceKey;
use crate::sender::scan::{ClassFormatGrouping, PendingSet};
use crate::sender::state::RunState;

/// Presentation context IDs are odd numbers in 1..=255
const MAX_PRESENTATION_CONTEXTS: usize = 128;

/// How one pass over the pending set ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every pending instance was attempted
    Completed,
    /// Cancellation was requested before or during the pass
    Cancelled,
    /// The association could not be established
    ConnectFailed,
    /// The peer accepted no presentation contexts
    NegotiationFailed,
    /// The peer aborted the association mid-pass
    PeerAborted,
}

impl BatchOutcome {
    /// The pass ended without attempting all pending instances for a reason
    /// other than cancellation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BatchOutcome::ConnectFailed | BatchOutcome::NegotiationFailed | BatchOutcome::PeerAborted
        )
    }
}

/// Two contexts per SOP class: the observed transfer syntaxes (baseline
/// excluded, omitted when nothing else was seen) and the baseline alone.
pub fn build_proposals(grouping: &ClassFormatGrouping) -> Vec<PresentationContextProposal> {
    let mut proposals = Vec::new();

    for (sop_class_uid, formats) in grouping.iter() {
        let native: Vec<String> = formats
            .iter()
            .filter(|ts| ts.as_str() != BASELINE_TRANSFER_SYNTAX)
            .cloned()
            .collect();

        let mut class_contexts = Vec::with_capacity(2);
        if !native.is_empty() {
            class_contexts.push(native);
        }
        class_contexts.push(vec![BASELINE_TRANSFER_SYNTAX.to_string()]);

        for transfer_syntaxes in class_contexts {
            if proposals.len() == MAX_PRESENTATION_CONTEXTS {
                warn!(
                    "More than {} presentation contexts needed, dropping the rest (from {})",
                    MAX_PRESENTATION_CONTEXTS, sop_class_uid
                );
                return proposals;
            }
            proposals.push(PresentationContextProposal {
                id: (proposals.len() * 2 + 1) as u8,
                abstract_syntax: sop_class_uid.clone(),
                transfer_syntaxes,
            });
        }
    }

    proposals
}

/// Pushes the pending instances of one study over a single association
pub struct BatchTransmitter<'a> {
    pub connector: &'a dyn Connector,
    pub endpoint: &'a DestinationEndpoint,
    pub timeouts: &'a ScuTimeouts,
    pub state: &'a RunState,
}

impl BatchTransmitter<'_> {
    /// Attempt every pending instance once, in key order.
    ///
    /// Acknowledged instances are removed from `pending`; everything else
    /// stays for the next pass.
    pub async fn send_batch(
        &self,
        grouping: &ClassFormatGrouping,
        pending: &mut PendingSet,
    ) -> BatchOutcome {
        if self.state.is_canceled() {
            return BatchOutcome::Cancelled;
        }

        let proposals = build_proposals(grouping);

        let mut association = match self.connector.connect(self.endpoint, self.timeouts).await {
            Ok(association) => association,
            Err(e) => {
                warn!("Could not connect to {}: {}", self.endpoint, e);
                return BatchOutcome::ConnectFailed;
            }
        };

        let outcome = match association.negotiate(&proposals).await {
            Ok(accepted) if !accepted.is_empty() => {
                debug!(
                    "{} of {} presentation contexts accepted by {}",
                    accepted.len(),
                    proposals.len(),
                    self.endpoint
                );
                self.push_instances(association.as_mut(), &accepted, pending)
                    .await
            }
            Ok(_) => {
                warn!("{} accepted no presentation contexts", self.endpoint);
                BatchOutcome::NegotiationFailed
            }
            Err(e) => {
                warn!("Association negotiation with {} failed: {}", self.endpoint, e);
                BatchOutcome::NegotiationFailed
            }
        };

        if let Err(e) = association.release().await {
            debug!("Association release failed: {}", e);
        }
        outcome
    }

    async fn push_instances(
        &self,
        association: &mut dyn Association,
        accepted: &[NegotiatedContext],
        pending: &mut PendingSet,
    ) -> BatchOutcome {
        let keys: Vec<InstanceKey> = pending.keys().cloned().collect();

        for key in keys {
            if self.state.is_canceled() {
                return BatchOutcome::Cancelled;
            }

            let Some(instance) = pending.get(&key) else {
                continue;
            };
            let Some(context) =
                select_context(accepted, &instance.sop_class_uid, &instance.transfer_syntax)
            else {
                debug!(
                    "No accepted context for {} ({}), leaving it pending",
                    key, instance.sop_class_uid
                );
                continue;
            };

            let outcome = association.store(context, instance).await;
            match outcome {
                StoreOutcome::Acknowledged => {
                    pending.remove(&key);
                }
                StoreOutcome::PeerAborted => {
                    warn!("{} aborted the association while storing {}", self.endpoint, key);
                    return BatchOutcome::PeerAborted;
                }
                StoreOutcome::Failed(reason) => {
                    debug!("C-STORE of {} failed: {}", key, reason);
                }
            }
        }

        BatchOutcome::Completed
    }
}
