//! Scripted transport used by the sender's unit tests

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dimse::{
    Association, Connector, DestinationEndpoint, DimseError, InstanceFile, NegotiatedContext,
    PresentationContextProposal, ScuTimeouts, StoreOutcome,
};
use tokio::time::Instant;

use crate::sender::natural::InstanceKey;
use crate::sender::scan::{ClassFormatGrouping, PendingSet};
use crate::sender::state::RunState;

#[derive(Default)]
pub(crate) struct FakeScript {
    pub unreachable_until: Option<Instant>,
    pub refuse_connections: bool,
    pub fail_negotiation: bool,
    pub rejected_syntaxes: Vec<String>,
    pub outcomes: HashMap<String, VecDeque<StoreOutcome>>,
    pub cancel_after_store: Option<(String, Arc<RunState>)>,
    pub echo_ok: bool,
}

#[derive(Default)]
pub(crate) struct FakeLog {
    pub connects: usize,
    pub releases: usize,
    pub echoes: usize,
    pub proposals: Vec<Vec<PresentationContextProposal>>,
    pub attempted: Vec<String>,
    pub stored: Vec<(String, u8)>,
}

impl FakeLog {
    pub fn stored_uids(&self) -> Vec<String> {
        self.stored.iter().map(|(uid, _)| uid.clone()).collect()
    }

    pub fn transport_calls(&self) -> usize {
        self.connects + self.echoes
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    script: Arc<Mutex<FakeScript>>,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, FakeScript> {
        self.script.lock().unwrap()
    }

    pub fn log(&self) -> MutexGuard<'_, FakeLog> {
        self.log.lock().unwrap()
    }

    /// Queue an outcome for the next store of `uid`; unscripted stores succeed
    pub fn script_outcome(&self, uid: &str, outcome: StoreOutcome) {
        self.script()
            .outcomes
            .entry(uid.to_string())
            .or_default()
            .push_back(outcome);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _endpoint: &DestinationEndpoint,
        _timeouts: &ScuTimeouts,
    ) -> dimse::Result<Box<dyn Association>> {
        self.log().connects += 1;
        let script = self.script();
        let unreachable = script.refuse_connections
            || script
                .unreachable_until
                .is_some_and(|until| Instant::now() < until);
        if unreachable {
            return Err(DimseError::Network(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(Box::new(FakeAssociation {
            script: self.script.clone(),
            log: self.log.clone(),
        }))
    }

    async fn echo(&self, _endpoint: &DestinationEndpoint, _timeouts: &ScuTimeouts) -> dimse::Result<bool> {
        self.log().echoes += 1;
        Ok(self.script().echo_ok)
    }
}

struct FakeAssociation {
    script: Arc<Mutex<FakeScript>>,
    log: Arc<Mutex<FakeLog>>,
}

#[async_trait]
impl Association for FakeAssociation {
    async fn negotiate(
        &mut self,
        proposals: &[PresentationContextProposal],
    ) -> dimse::Result<Vec<NegotiatedContext>> {
        self.log.lock().unwrap().proposals.push(proposals.to_vec());
        let script = self.script.lock().unwrap();
        if script.fail_negotiation {
            return Err(DimseError::rejected("rejected by test peer"));
        }
        Ok(proposals
            .iter()
            .filter_map(|p| {
                p.transfer_syntaxes
                    .iter()
                    .find(|ts| !script.rejected_syntaxes.contains(ts))
                    .map(|ts| NegotiatedContext {
                        id: p.id,
                        abstract_syntax: p.abstract_syntax.clone(),
                        transfer_syntax: ts.clone(),
                    })
            })
            .collect())
    }

    async fn store(&mut self, context: &NegotiatedContext, instance: &InstanceFile) -> StoreOutcome {
        let uid = instance.sop_instance_uid.clone();
        let (outcome, cancel) = {
            let mut script = self.script.lock().unwrap();
            let outcome = script
                .outcomes
                .get_mut(&uid)
                .and_then(|q| q.pop_front())
                .unwrap_or(StoreOutcome::Acknowledged);
            let cancel = script
                .cancel_after_store
                .as_ref()
                .filter(|(target, _)| *target == uid)
                .map(|(_, state)| state.clone());
            (outcome, cancel)
        };

        {
            let mut log = self.log.lock().unwrap();
            log.attempted.push(uid.clone());
            if outcome.is_acknowledged() {
                log.stored.push((uid, context.id));
            }
        }
        if let Some(state) = cancel {
            state.cancel();
        }
        outcome
    }

    async fn release(&mut self) -> dimse::Result<()> {
        self.log.lock().unwrap().releases += 1;
        Ok(())
    }
}

/// Build a pending set and grouping from `(uid, class, transfer syntax)` triples
pub(crate) fn pending_of(items: &[(&str, &str, &str)]) -> (PendingSet, ClassFormatGrouping) {
    let mut pending = PendingSet::new();
    let mut grouping = ClassFormatGrouping::new();
    for (uid, class, ts) in items {
        grouping.insert(class, ts);
        pending.insert(
            InstanceKey::from(*uid),
            InstanceFile {
                sop_instance_uid: uid.to_string(),
                sop_class_uid: class.to_string(),
                transfer_syntax: ts.to_string(),
                path: PathBuf::from(format!("/studies/{}.dcm", uid)),
            },
        );
    }
    (pending, grouping)
}

pub(crate) fn test_endpoint() -> DestinationEndpoint {
    DestinationEndpoint::new("ARCHIVE", "127.0.0.1", 11112, "SENDER")
}
