//! Service Class User (SCU) implementation for outbound storage

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::{DestinationEndpoint, ScuTimeouts};
use crate::types::{InstanceFile, NegotiatedContext, PresentationContextProposal, StoreOutcome};
use crate::{DimseError, Result};

/// Opens associations to a remote Storage SCP
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish the network connection for a new association
    async fn connect(
        &self,
        endpoint: &DestinationEndpoint,
        timeouts: &ScuTimeouts,
    ) -> Result<Box<dyn Association>>;

    /// Verify the peer with a C-ECHO over a minimal association
    async fn echo(&self, endpoint: &DestinationEndpoint, timeouts: &ScuTimeouts) -> Result<bool>;
}

/// One association with a remote Storage SCP
#[async_trait]
pub trait Association: Send {
    /// Negotiate presentation contexts, returning the accepted ones
    async fn negotiate(
        &mut self,
        proposals: &[PresentationContextProposal],
    ) -> Result<Vec<NegotiatedContext>>;

    /// Send one instance through an accepted presentation context
    async fn store(&mut self, context: &NegotiatedContext, instance: &InstanceFile)
        -> StoreOutcome;

    /// Release the association
    async fn release(&mut self) -> Result<()>;
}

/// Connector backed by the DCMTK command line tools (`storescu`, `echoscu`)
#[derive(Debug, Clone)]
pub struct DcmtkConnector {
    storescu: PathBuf,
    echoscu: PathBuf,
}

impl DcmtkConnector {
    /// Create a connector using `storescu` and `echoscu` from `PATH`
    pub fn new() -> Self {
        Self {
            storescu: PathBuf::from("storescu"),
            echoscu: PathBuf::from("echoscu"),
        }
    }

    pub fn builder() -> ScuBuilder {
        ScuBuilder::new()
    }
}

impl Default for DcmtkConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for DcmtkConnector {
    async fn connect(
        &self,
        endpoint: &DestinationEndpoint,
        timeouts: &ScuTimeouts,
    ) -> Result<Box<dyn Association>> {
        endpoint.validate()?;

        #[cfg(feature = "dcmtk_cli")]
        {
            debug!("Connecting to {}", endpoint);
            let addr = (endpoint.host.as_str(), endpoint.port);
            match tokio::time::timeout(timeouts.connect_timeout(), tokio::net::TcpStream::connect(addr)).await {
                Ok(Ok(_probe)) => {}
                Ok(Err(e)) => return Err(DimseError::Network(e)),
                Err(_) => {
                    return Err(DimseError::Timeout(format!(
                        "connecting to {}:{}",
                        endpoint.host, endpoint.port
                    )))
                }
            }

            return Ok(Box::new(DcmtkAssociation {
                storescu: self.storescu.clone(),
                endpoint: endpoint.clone(),
                timeouts: timeouts.clone(),
                accepted: Vec::new(),
                proposed: HashMap::new(),
                released: false,
            }));
        }

        #[cfg(not(feature = "dcmtk_cli"))]
        {
            let _ = timeouts;
            return Err(DimseError::NotSupported(
                "Associations require feature 'dcmtk_cli' or a native UL implementation".into(),
            ));
        }
    }

    async fn echo(&self, endpoint: &DestinationEndpoint, timeouts: &ScuTimeouts) -> Result<bool> {
        info!("Sending C-ECHO to {}", endpoint);

        // Validate the remote node configuration
        endpoint.validate()?;

        #[cfg(feature = "dcmtk_cli")]
        {
            use tokio::process::Command;
            let mut cmd = Command::new(&self.echoscu);
            cmd.args(association_args(endpoint, timeouts))
                .arg(&endpoint.host)
                .arg(endpoint.port.to_string())
                .kill_on_drop(true);
            debug!("Running: {:?}", cmd);
            let output = cmd.output().await.map_err(|e| {
                DimseError::operation_failed(format!("Failed to spawn echoscu: {}", e))
            })?;
            if output.status.success() {
                info!("C-ECHO completed successfully");
                return Ok(true);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "C-ECHO failed: status={:?}, stderr={}",
                output.status.code(),
                stderr.trim()
            );
            return Ok(false);
        }

        #[cfg(not(feature = "dcmtk_cli"))]
        {
            let _ = timeouts;
            return Err(DimseError::NotSupported(
                "C-ECHO requires feature 'dcmtk_cli' or a native UL implementation".into(),
            ));
        }
    }
}

/// Association driven through `storescu`, one invocation per instance.
///
/// DCMTK negotiates per invocation, so the contexts accepted here are the
/// ones we proposed; the peer's real answer shows up in each store outcome.
#[cfg_attr(not(feature = "dcmtk_cli"), allow(dead_code))]
struct DcmtkAssociation {
    storescu: PathBuf,
    endpoint: DestinationEndpoint,
    timeouts: ScuTimeouts,
    accepted: Vec<NegotiatedContext>,
    /// Context id -> every transfer syntax offered on it
    proposed: HashMap<u8, Vec<String>>,
    released: bool,
}

#[async_trait]
impl Association for DcmtkAssociation {
    async fn negotiate(
        &mut self,
        proposals: &[PresentationContextProposal],
    ) -> Result<Vec<NegotiatedContext>> {
        if proposals.is_empty() {
            return Err(DimseError::rejected("no presentation contexts proposed"));
        }

        // one transfer syntax per accepted context, as the peer would answer
        self.accepted = proposals
            .iter()
            .filter_map(|p| {
                p.transfer_syntaxes.first().map(|ts| NegotiatedContext {
                    id: p.id,
                    abstract_syntax: p.abstract_syntax.clone(),
                    transfer_syntax: ts.clone(),
                })
            })
            .collect();
        self.proposed = proposals
            .iter()
            .map(|p| (p.id, p.transfer_syntaxes.clone()))
            .collect();

        debug!(
            "Negotiated {} presentation contexts with {}",
            self.accepted.len(),
            self.endpoint
        );
        Ok(self.accepted.clone())
    }

    async fn store(
        &mut self,
        context: &NegotiatedContext,
        instance: &InstanceFile,
    ) -> StoreOutcome {
        if self.released {
            return StoreOutcome::PeerAborted;
        }

        let mut cmd = tokio::process::Command::new(&self.storescu);
        cmd.args(association_args(&self.endpoint, &self.timeouts));
        if self.keeps_file_encoding(context, instance) {
            // propose only the file's own encoding
            cmd.arg("-R");
        } else {
            cmd.arg("-xe");
        }
        cmd.arg(&self.endpoint.host)
            .arg(self.endpoint.port.to_string())
            .arg(&instance.path)
            .kill_on_drop(true);

        debug!(
            "C-STORE {} via context {} ({})",
            instance.sop_instance_uid, context.id, context.transfer_syntax
        );

        match cmd.output().await {
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let stdout = String::from_utf8_lossy(&out.stdout);
                classify_storescu_output(out.status.success(), &stdout, &stderr)
            }
            Err(e) => {
                error!("Failed to spawn storescu: {}", e);
                StoreOutcome::Failed(format!("Failed to spawn storescu: {}", e))
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        self.released = true;
        self.accepted.clear();
        self.proposed.clear();
        Ok(())
    }
}

impl DcmtkAssociation {
    /// `storescu` renegotiates per call, so any syntax offered on the
    /// context can be requested, not only the one reported as accepted.
    fn keeps_file_encoding(&self, context: &NegotiatedContext, instance: &InstanceFile) -> bool {
        context.transfer_syntax == instance.transfer_syntax
            || self
                .proposed
                .get(&context.id)
                .is_some_and(|syntaxes| syntaxes.contains(&instance.transfer_syntax))
    }
}

/// Map a finished `storescu` run onto a store outcome
pub fn classify_storescu_output(success: bool, stdout: &str, stderr: &str) -> StoreOutcome {
    let combined = format!("{}\n{}", stdout, stderr).to_lowercase();

    const ASSOCIATION_LOST: [&str; 4] = [
        "peer aborted",
        "association request failed",
        "association rejected",
        "connection refused",
    ];
    if ASSOCIATION_LOST.iter().any(|m| combined.contains(m)) {
        return StoreOutcome::PeerAborted;
    }

    if success && !combined.contains("store failed") {
        return StoreOutcome::Acknowledged;
    }

    let reason = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("storescu failed")
        .to_string();
    StoreOutcome::Failed(reason)
}

fn association_args(endpoint: &DestinationEndpoint, timeouts: &ScuTimeouts) -> Vec<String> {
    vec![
        "-aet".into(),
        endpoint.calling_aet.clone(),
        "-aec".into(),
        endpoint.called_aet.clone(),
        "-to".into(),
        whole_seconds(timeouts.connect_timeout_ms).to_string(),
        "-ta".into(),
        whole_seconds(timeouts.acse_timeout_ms).to_string(),
        "-td".into(),
        whole_seconds(timeouts.dimse_timeout_ms).to_string(),
    ]
}

fn whole_seconds(ms: u64) -> u64 {
    ms.div_ceil(1000).max(1)
}

/// Builder for creating connectors with custom tool locations
pub struct ScuBuilder {
    storescu: PathBuf,
    echoscu: PathBuf,
}

impl ScuBuilder {
    /// Start building a new connector
    pub fn new() -> Self {
        Self {
            storescu: PathBuf::from("storescu"),
            echoscu: PathBuf::from("echoscu"),
        }
    }

    /// Directory holding the DCMTK binaries
    pub fn dcmtk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.storescu = dir.join("storescu");
        self.echoscu = dir.join("echoscu");
        self
    }

    /// Build the connector
    pub fn build(self) -> DcmtkConnector {
        DcmtkConnector {
            storescu: self.storescu,
            echoscu: self.echoscu,
        }
    }
}

impl Default for ScuBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_tool_paths() {
        let connector = ScuBuilder::new().dcmtk_dir("/opt/dcmtk/bin").build();
        assert_eq!(connector.storescu, PathBuf::from("/opt/dcmtk/bin/storescu"));
        assert_eq!(connector.echoscu, PathBuf::from("/opt/dcmtk/bin/echoscu"));
    }

    #[test]
    fn test_association_args_round_timeouts_up() {
        let endpoint = DestinationEndpoint::new("PACS", "localhost", 104, "SENDER");
        let timeouts = ScuTimeouts {
            connect_timeout_ms: 1500,
            acse_timeout_ms: 30_000,
            dimse_timeout_ms: 1,
        };
        let args = association_args(&endpoint, &timeouts);
        assert_eq!(
            args,
            vec!["-aet", "SENDER", "-aec", "PACS", "-to", "2", "-ta", "30", "-td", "1"]
        );
    }

    #[test]
    fn test_classify_storescu_output() {
        assert_eq!(classify_storescu_output(true, "", ""), StoreOutcome::Acknowledged);
        assert_eq!(
            classify_storescu_output(false, "", "F: Association Request Failed: 0006:031b"),
            StoreOutcome::PeerAborted
        );
        assert_eq!(
            classify_storescu_output(false, "", "E: Peer aborted Association (or never connected)"),
            StoreOutcome::PeerAborted
        );
        assert_eq!(
            classify_storescu_output(false, "", "E: Store Failed, file: x.dcm\nE: 0006:0208"),
            StoreOutcome::Failed("E: Store Failed, file: x.dcm".into())
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_destination() {
        let connector = DcmtkConnector::new();
        let endpoint = DestinationEndpoint::new("", "localhost", 104, "SENDER");
        let result = connector.connect(&endpoint, &ScuTimeouts::default()).await;
        assert!(matches!(result, Err(DimseError::InvalidAeTitle(_))));
    }

    #[cfg(feature = "dcmtk_cli")]
    #[tokio::test]
    async fn test_connect_refused_is_network_error() {
        // Bind and drop to find a port nobody is listening on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephem port");
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = DcmtkConnector::new();
        let endpoint = DestinationEndpoint::new("PACS", "127.0.0.1", port, "SENDER");
        let result = connector.connect(&endpoint, &ScuTimeouts::default()).await;
        let err = result.err().expect("connect should fail");
        assert!(err.is_recoverable());
    }

    #[cfg(feature = "dcmtk_cli")]
    #[tokio::test]
    async fn test_negotiate_accepts_first_syntax_of_each_proposal() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().unwrap().port();

        let connector = DcmtkConnector::new();
        let endpoint = DestinationEndpoint::new("PACS", "127.0.0.1", port, "SENDER");
        let mut assoc = connector
            .connect(&endpoint, &ScuTimeouts::default())
            .await
            .expect("connect");

        let proposals = vec![
            PresentationContextProposal {
                id: 1,
                abstract_syntax: "1.2.840.10008.5.1.4.1.1.2".into(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2.4.70".into()],
            },
            PresentationContextProposal {
                id: 3,
                abstract_syntax: "1.2.840.10008.5.1.4.1.1.2".into(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2.1".into()],
            },
        ];
        let accepted = assoc.negotiate(&proposals).await.expect("negotiate");
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[1].id, 3);
        assert_eq!(accepted[1].transfer_syntax, "1.2.840.10008.1.2.1");

        assoc.release().await.expect("release");
    }

    #[tokio::test]
    async fn test_second_native_syntax_keeps_file_encoding() {
        const CT: &str = "1.2.840.10008.5.1.4.1.1.2";
        const JPEG: &str = "1.2.840.10008.1.2.4.70";
        const J2K: &str = "1.2.840.10008.1.2.4.90";

        let mut assoc = DcmtkAssociation {
            storescu: PathBuf::from("storescu"),
            endpoint: DestinationEndpoint::new("PACS", "127.0.0.1", 104, "SENDER"),
            timeouts: ScuTimeouts::default(),
            accepted: Vec::new(),
            proposed: HashMap::new(),
            released: false,
        };
        let accepted = assoc
            .negotiate(&[
                PresentationContextProposal {
                    id: 1,
                    abstract_syntax: CT.into(),
                    transfer_syntaxes: vec![JPEG.into(), J2K.into()],
                },
                PresentationContextProposal {
                    id: 3,
                    abstract_syntax: CT.into(),
                    transfer_syntaxes: vec!["1.2.840.10008.1.2.1".into()],
                },
            ])
            .await
            .unwrap();
        assert_eq!(accepted[0].transfer_syntax, JPEG);

        let file = |ts: &str| InstanceFile {
            sop_instance_uid: "1.2.3.4".into(),
            sop_class_uid: CT.into(),
            transfer_syntax: ts.into(),
            path: PathBuf::from("/tmp/x.dcm"),
        };
        assert!(assoc.keeps_file_encoding(&accepted[0], &file(JPEG)));
        assert!(assoc.keeps_file_encoding(&accepted[0], &file(J2K)));
        // the baseline context converts
        assert!(!assoc.keeps_file_encoding(&accepted[1], &file(J2K)));

        assoc.release().await.unwrap();
        assert!(!assoc.keeps_file_encoding(&accepted[0], &file(J2K)));
    }
}
