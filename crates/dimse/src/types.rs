//! Common types for storage SCU operations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One DICOM file queued for C-STORE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFile {
    /// SOP Instance UID
    pub sop_instance_uid: String,

    /// SOP Class UID
    pub sop_class_uid: String,

    /// Transfer syntax UID the file is encoded in
    pub transfer_syntax: String,

    /// Location of the Part 10 file
    pub path: PathBuf,
}

/// A presentation context proposed in the A-ASSOCIATE-RQ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationContextProposal {
    /// Presentation context ID (odd, 1..=255)
    pub id: u8,

    /// Abstract syntax (SOP Class UID)
    pub abstract_syntax: String,

    /// Transfer syntaxes offered, in order of preference
    pub transfer_syntaxes: Vec<String>,
}

/// A presentation context accepted by the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedContext {
    /// Presentation context ID
    pub id: u8,

    /// Abstract syntax (SOP Class UID)
    pub abstract_syntax: String,

    /// The single transfer syntax the peer accepted
    pub transfer_syntax: String,
}

/// Result of a single C-STORE exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The peer acknowledged the instance
    Acknowledged,
    /// The instance was not stored; the association is still usable
    Failed(String),
    /// The peer aborted the association
    PeerAborted,
}

impl StoreOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, StoreOutcome::Acknowledged)
    }
}

/// Pick the accepted context to send an instance through.
///
/// An exact (SOP class, transfer syntax) match wins. Otherwise any context
/// accepted for the SOP class is used and the association implementation is
/// expected to convert the dataset to the negotiated transfer syntax.
pub fn select_context<'a>(
    accepted: &'a [NegotiatedContext],
    sop_class_uid: &str,
    transfer_syntax: &str,
) -> Option<&'a NegotiatedContext> {
    accepted
        .iter()
        .find(|pc| pc.abstract_syntax == sop_class_uid && pc.transfer_syntax == transfer_syntax)
        .or_else(|| accepted.iter().find(|pc| pc.abstract_syntax == sop_class_uid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: u8, class: &str, ts: &str) -> NegotiatedContext {
        NegotiatedContext {
            id,
            abstract_syntax: class.to_string(),
            transfer_syntax: ts.to_string(),
        }
    }

    #[test]
    fn test_select_context_prefers_exact_match() {
        let accepted = vec![
            ctx(1, "1.2.840.10008.5.1.4.1.1.2", "1.2.840.10008.1.2.1"),
            ctx(3, "1.2.840.10008.5.1.4.1.1.2", "1.2.840.10008.1.2.4.70"),
        ];

        let pc = select_context(&accepted, "1.2.840.10008.5.1.4.1.1.2", "1.2.840.10008.1.2.4.70")
            .expect("context");
        assert_eq!(pc.id, 3);
    }

    #[test]
    fn test_select_context_falls_back_to_class() {
        let accepted = vec![ctx(1, "1.2.840.10008.5.1.4.1.1.2", "1.2.840.10008.1.2.1")];

        let pc = select_context(&accepted, "1.2.840.10008.5.1.4.1.1.2", "1.2.840.10008.1.2.4.90")
            .expect("fallback context");
        assert_eq!(pc.id, 1);

        assert!(select_context(&accepted, "1.2.840.10008.5.1.4.1.1.4", "1.2.840.10008.1.2.1").is_none());
    }
}
