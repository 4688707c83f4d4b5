//! Finding the snapshots ("versions") of a protected object.

use log::{debug, warn};
use serde_derive::Deserialize;
use serde_json::Value;

use crate::session::Session;
use crate::transport::Transport;
use crate::walker::escape;

/// Entity types included in every object search.
pub const SEARCH_ENTITY_TYPES: [&str; 16] = [
    "kAcropolis",
    "kAWS",
    "kAWSNative",
    "kAWSSnapshotManager",
    "kAzure",
    "kAzureNative",
    "kFlashBlade",
    "kGCP",
    "kGenericNas",
    "kHyperV",
    "kHyperVVSS",
    "kIsilon",
    "kKVM",
    "kNetapp",
    "kPhysical",
    "kVMware",
];

/// Backup types whose file tree is partitioned per volume.
pub const VOLUME_BACKUP_TYPES: [i64; 2] = [1, 6];

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceId {
    #[serde(rename = "attemptNum", default)]
    pub attempt_num: Value,
    #[serde(rename = "jobInstanceId")]
    pub job_instance_id: i64,
    #[serde(rename = "jobStartTimeUsecs")]
    pub job_start_time_usecs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    #[serde(rename = "instanceId")]
    pub instance_id: InstanceId,
    #[serde(rename = "snapshotTimestampUsecs")]
    pub snapshot_timestamp_usecs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityRef {
    pub id: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobUid {
    #[serde(rename = "clusterId")]
    pub cluster_id: Value,
    #[serde(rename = "clusterIncarnationId")]
    pub cluster_incarnation_id: Value,
    #[serde(rename = "objectId")]
    pub object_id: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectId {
    #[serde(rename = "jobId")]
    pub job_id: Value,
    pub entity: EntityRef,
    #[serde(rename = "jobUid")]
    pub job_uid: JobUid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmDocument {
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "jobName")]
    pub job_name: String,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(rename = "objectId")]
    pub object_id: ObjectId,
    #[serde(rename = "backupType", default)]
    pub backup_type: Option<i64>,
}

impl VmDocument {
    fn newest_snapshot_usecs(&self) -> i64 {
        self.versions
            .first()
            .map_or(i64::MIN, |v| v.snapshot_timestamp_usecs)
    }

    /// One descriptor per version, in server order (newest first).
    pub fn snapshots(&self) -> Vec<SnapshotDescriptor> {
        self.versions
            .iter()
            .map(|version| SnapshotDescriptor {
                run_instance_id: version.instance_id.job_instance_id,
                attempt_num: render(&version.instance_id.attempt_num),
                job_start_time_usecs: version.instance_id.job_start_time_usecs,
                snapshot_timestamp_usecs: version.snapshot_timestamp_usecs,
                backup_type: self.backup_type,
                addressing: AddressingContext::new(self, version),
            })
            .collect()
    }
}

/// Identifiers scoping a listing request to one snapshot. Values are copied from the search
/// result as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressingContext {
    pub attempt_num: String,
    pub cluster_id: String,
    pub cluster_incarnation_id: String,
    pub entity_id: String,
    pub job_id: String,
    pub job_instance_id: String,
    pub job_start_time_usecs: String,
    pub job_uid_object_id: String,
}

impl AddressingContext {
    pub fn new(doc: &VmDocument, version: &Version) -> AddressingContext {
        let object = &doc.object_id;
        AddressingContext {
            attempt_num: render(&version.instance_id.attempt_num),
            cluster_id: render(&object.job_uid.cluster_id),
            cluster_incarnation_id: render(&object.job_uid.cluster_incarnation_id),
            entity_id: render(&object.entity.id),
            job_id: render(&object.job_id),
            job_instance_id: version.instance_id.job_instance_id.to_string(),
            job_start_time_usecs: version.instance_id.job_start_time_usecs.to_string(),
            job_uid_object_id: render(&object.job_uid.object_id),
        }
    }

    pub fn query(&self) -> String {
        format!(
            "attemptNum={}&clusterId={}&clusterIncarnationId={}&entityId={}&jobId={}&jobInstanceId={}&jobStartTimeUsecs={}&jobUidObjectId={}",
            self.attempt_num,
            self.cluster_id,
            self.cluster_incarnation_id,
            self.entity_id,
            self.job_id,
            self.job_instance_id,
            self.job_start_time_usecs,
            self.job_uid_object_id
        )
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDescriptor {
    pub run_instance_id: i64,
    pub attempt_num: String,
    pub job_start_time_usecs: i64,
    pub snapshot_timestamp_usecs: i64,
    pub backup_type: Option<i64>,
    pub addressing: AddressingContext,
}

impl SnapshotDescriptor {
    pub fn is_volume_based(&self) -> bool {
        self.backup_type
            .map_or(false, |t| VOLUME_BACKUP_TYPES.contains(&t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    NotFound(String),
    NotProtected { source: String, job: String },
    RunNotFound(i64),
    NoBackupsFromDate,
    NoVersions,
}

impl std::fmt::Display for SelectError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            SelectError::NotFound(ref source) => write!(f, "{source} not found"),
            SelectError::NotProtected { ref source, ref job } => {
                write!(f, "{source} not protected by {job}")
            }
            SelectError::RunNotFound(_) => write!(f, "Run ID not found"),
            SelectError::NoBackupsFromDate => write!(f, "No backups from the specified date"),
            SelectError::NoVersions => write!(f, "No backups found"),
        }
    }
}

impl std::error::Error for SelectError {}

pub fn search_path(source: &str) -> String {
    let types: Vec<String> = SEARCH_ENTITY_TYPES
        .iter()
        .map(|t| format!("entityTypes={t}"))
        .collect();
    format!("/searchvms?{}&vmName={}", types.join("&"), escape(source))
}

/// Every object document the cluster returns for `source`. No `vms` key means not found.
pub fn search<T: Transport>(
    session: &Session<T>,
    source: &str,
) -> std::result::Result<Vec<VmDocument>, SelectError> {
    let response = session.get(&search_path(source));
    let hits = match response.get("vms").and_then(Value::as_array) {
        Some(hits) => hits,
        None => return Err(SelectError::NotFound(source.to_string())),
    };

    let docs: Vec<VmDocument> = hits
        .iter()
        .filter_map(|hit| hit.get("vmDocument"))
        .filter_map(|doc| match serde_json::from_value::<VmDocument>(doc.clone()) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!("skipping unreadable search result: {}", err);
                None
            }
        })
        .collect();
    debug!("search for {} returned {} documents", source, docs.len());
    Ok(docs)
}

/// Narrows search results to `source` protected by `job`, preferring the document with
/// the most recent snapshot. Names compare case-insensitively.
pub fn select_document(
    docs: Vec<VmDocument>,
    source: &str,
    job: &str,
) -> std::result::Result<VmDocument, SelectError> {
    let source_lower = source.to_lowercase();
    let named: Vec<VmDocument> = docs
        .into_iter()
        .filter(|d| d.object_name.to_lowercase() == source_lower)
        .collect();
    if named.is_empty() {
        return Err(SelectError::NotFound(source.to_string()));
    }

    let job_lower = job.to_lowercase();
    let mut protected: Vec<VmDocument> = named
        .into_iter()
        .filter(|d| d.job_name.to_lowercase() == job_lower)
        .collect();
    if protected.is_empty() {
        return Err(SelectError::NotProtected {
            source: source.to_string(),
            job: job.to_string(),
        });
    }

    protected.sort_by(|a, b| b.newest_snapshot_usecs().cmp(&a.newest_snapshot_usecs()));
    Ok(protected.swap_remove(0))
}

/// Snapshots within `[start, end]` (either bound optional), order preserved.
pub fn filter_by_range(
    snapshots: &[SnapshotDescriptor],
    start: Option<i64>,
    end: Option<i64>,
) -> Vec<SnapshotDescriptor> {
    snapshots
        .iter()
        .filter(|s| start.map_or(true, |start| start <= s.snapshot_timestamp_usecs))
        .filter(|s| end.map_or(true, |end| end >= s.snapshot_timestamp_usecs))
        .cloned()
        .collect()
}

pub fn find_run(
    snapshots: &[SnapshotDescriptor],
    run_id: i64,
) -> std::result::Result<&SnapshotDescriptor, SelectError> {
    snapshots
        .iter()
        .find(|s| s.run_instance_id == run_id)
        .ok_or(SelectError::RunNotFound(run_id))
}

/// The oldest snapshot taken at or after `usecs`, given newest-first input.
pub fn find_at_or_after(
    snapshots: &[SnapshotDescriptor],
    usecs: i64,
) -> std::result::Result<&SnapshotDescriptor, SelectError> {
    snapshots
        .iter()
        .filter(|s| usecs <= s.snapshot_timestamp_usecs)
        .last()
        .ok_or(SelectError::NoBackupsFromDate)
}

pub fn latest(snapshots: &[SnapshotDescriptor]) -> std::result::Result<&SnapshotDescriptor, SelectError> {
    snapshots.first().ok_or(SelectError::NoVersions)
}
