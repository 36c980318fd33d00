//! DIMSE (DICOM Message Service Element) storage SCU
//!
//! This crate provides the outbound side of DICOM networking needed to push
//! studies to a remote Storage SCP: association setup, presentation context
//! negotiation, C-STORE and C-ECHO.
//!
//! # Features
//! - Transport abstraction (`Connector` / `Association`) so callers can drive
//!   any association implementation
//! - DCMTK-backed implementation (feature = "dcmtk_cli", enabled by default)
//! - Destination and timeout configuration shared with the sender

pub mod config;
pub mod error;
pub mod scu;
pub mod types;

// Re-export commonly used types
pub use config::{DestinationEndpoint, ScuTimeouts};
pub use error::{DimseError, Result};
pub use scu::{Association, Connector, DcmtkConnector, ScuBuilder};
pub use types::{
    select_context, InstanceFile, NegotiatedContext, PresentationContextProposal, StoreOutcome,
};

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;

/// Transfer syntax every Storage SCP is expected to accept.
///
/// Proposed on its own context for every SOP class so that at least one
/// context survives negotiation when the peer rejects the file's native
/// encoding.
pub const BASELINE_TRANSFER_SYNTAX: &str = dicom_dictionary_std::uids::EXPLICIT_VR_LITTLE_ENDIAN;
