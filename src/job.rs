use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier. Producers content-address their jobs, so two
/// records with the same id are expected to be byte-equal; the broker
/// checks that on admission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a random id, for producers that do not content-address.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The closed set of proof kinds this broker schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofClass {
    PublicVm,
    TubeProof,
    PrivateKernelEmpty,
    PrivateBaseRollup,
    PublicBaseRollup,
    MergeRollup,
    RootRollup,
    BlockMergeRollup,
    BlockRootRollup,
    EmptyBlockRootRollup,
    BaseParity,
    RootParity,
}

/// Dispatch preference, most preferred first. Classes closer to a block's
/// root proof come first so in-flight blocks finish before new ones start.
const DISPATCH_ORDER: [ProofClass; 12] = [
    ProofClass::BlockRootRollup,
    ProofClass::BlockMergeRollup,
    ProofClass::RootRollup,
    ProofClass::MergeRollup,
    ProofClass::PublicBaseRollup,
    ProofClass::PrivateBaseRollup,
    ProofClass::PublicVm,
    ProofClass::TubeProof,
    ProofClass::RootParity,
    ProofClass::BaseParity,
    ProofClass::EmptyBlockRootRollup,
    ProofClass::PrivateKernelEmpty,
];

impl ProofClass {
    /// Every class, usable as the default allow-list for `acquire`.
    pub const ALL: [ProofClass; 12] = [
        ProofClass::PublicVm,
        ProofClass::TubeProof,
        ProofClass::PrivateKernelEmpty,
        ProofClass::PrivateBaseRollup,
        ProofClass::PublicBaseRollup,
        ProofClass::MergeRollup,
        ProofClass::RootRollup,
        ProofClass::BlockMergeRollup,
        ProofClass::BlockRootRollup,
        ProofClass::EmptyBlockRootRollup,
        ProofClass::BaseParity,
        ProofClass::RootParity,
    ];

    /// Position in the dispatch preference order; lower is served first.
    /// A class missing from the order sorts after all ranked classes so a
    /// newly added kind cannot starve the known ones.
    pub fn dispatch_rank(self) -> usize {
        DISPATCH_ORDER
            .iter()
            .position(|c| *c == self)
            .unwrap_or(DISPATCH_ORDER.len())
    }
}

impl std::fmt::Display for ProofClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProofClass::PublicVm => "public-vm",
            ProofClass::TubeProof => "tube-proof",
            ProofClass::PrivateKernelEmpty => "private-kernel-empty",
            ProofClass::PrivateBaseRollup => "private-base-rollup",
            ProofClass::PublicBaseRollup => "public-base-rollup",
            ProofClass::MergeRollup => "merge-rollup",
            ProofClass::RootRollup => "root-rollup",
            ProofClass::BlockMergeRollup => "block-merge-rollup",
            ProofClass::BlockRootRollup => "block-root-rollup",
            ProofClass::EmptyBlockRootRollup => "empty-block-root-rollup",
            ProofClass::BaseParity => "base-parity",
            ProofClass::RootParity => "root-parity",
        };
        f.write_str(name)
    }
}

/// An immutable unit of proof work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingJob {
    pub id: JobId,
    pub class: ProofClass,
    /// Block number the proof belongs to. Within a class, lower epochs are
    /// dispatched first.
    pub epoch: u64,
    /// Producer-supplied proof input, opaque to the broker.
    pub payload: Vec<u8>,
}

impl ProvingJob {
    pub fn new(id: JobId, class: ProofClass, epoch: u64, payload: Vec<u8>) -> Self {
        Self {
            id,
            class,
            epoch,
            payload,
        }
    }
}

/// Terminal outcome of a job. Once recorded it is never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success { value: Vec<u8> },
    Failure { reason: String },
}

/// Answer to a `status` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    NotFound,
    Queued,
    InProgress,
    Resolved { value: Vec<u8> },
    Rejected { reason: String },
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::NotFound => write!(f, "not-found"),
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::InProgress => write!(f, "in-progress"),
            JobStatus::Resolved { .. } => write!(f, "resolved"),
            JobStatus::Rejected { .. } => write!(f, "rejected"),
        }
    }
}
