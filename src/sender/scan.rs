use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use dimse::InstanceFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::sender::natural::InstanceKey;
use crate::sender::parser::InstanceParser;
use crate::sender::state::RunState;

/// Instances of one study not yet acknowledged, in send order
pub type PendingSet = BTreeMap<InstanceKey, InstanceFile>;

/// SOP class UID -> transfer syntaxes observed for that class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFormatGrouping(BTreeMap<String, BTreeSet<String>>);

impl ClassFormatGrouping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sop_class_uid: &str, transfer_syntax: &str) {
        self.0
            .entry(sop_class_uid.to_string())
            .or_default()
            .insert(transfer_syntax.to_string());
    }

    pub fn formats(&self, sop_class_uid: &str) -> Option<&BTreeSet<String>> {
        self.0.get(sop_class_uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything learned from walking a study directory
#[derive(Debug, Default)]
pub struct StudyScan {
    pub pending: PendingSet,
    pub grouping: ClassFormatGrouping,
    /// Study Instance UID of the last parsed instance carrying one
    pub study_uid: Option<String>,
    /// The walk stopped early because cancellation was requested
    pub cancelled: bool,
}

/// Walk `root` depth-first and collect every parseable instance.
///
/// Unreadable entries and files the parser rejects are skipped. Cancellation
/// is checked before each directory entry; whatever was collected up to that
/// point is returned.
pub fn scan_study(root: &Path, parser: &dyn InstanceParser, state: &RunState) -> StudyScan {
    let mut scan = StudyScan::default();

    if !root.is_dir() {
        warn!("Study directory {} does not exist", root.display());
        return scan;
    }

    // links are followed; walkdir reports loops as errors, which are skipped
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        if state.is_canceled() {
            scan.cancelled = true;
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(parsed) = parser.parse_item(entry.path()) else {
            continue;
        };

        scan.grouping
            .insert(&parsed.sop_class_uid, &parsed.transfer_syntax);
        if parsed.study_instance_uid.is_some() {
            scan.study_uid = parsed.study_instance_uid.clone();
        }
        scan.pending.insert(
            InstanceKey::new(parsed.sop_instance_uid.clone()),
            InstanceFile {
                sop_instance_uid: parsed.sop_instance_uid,
                sop_class_uid: parsed.sop_class_uid,
                transfer_syntax: parsed.transfer_syntax,
                path: entry.into_path(),
            },
        );
    }

    debug!(
        "Scanned {}: {} instances in {} SOP classes",
        root.display(),
        scan.pending.len(),
        scan.grouping.len()
    );
    scan
}
