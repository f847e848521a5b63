use serde::Deserialize;
use std::fmt;

// ============================================================================
// Node endpoint
// ============================================================================

/// Field carrying the last processed index in `/transaction/lastIndex`.
pub const LAST_INDEX_FIELD: &str = "lastIndex";

/// Path appended to a node base URL to read its last processed index.
pub const LAST_INDEX_PATH: &str = "/transaction/lastIndex";

/// Path appended to the registry URL to list connected nodes.
pub const REGISTRY_NODES_PATH: &str = "/nodes";

/// Which of the two nodes an index reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSide {
    Local,
    Reference,
}

impl fmt::Display for NodeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeSide::Local => write!(f, "local"),
            NodeSide::Reference => write!(f, "reference"),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// How the node identifier is searched for in the registry listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Plain case-sensitive containment.
    #[default]
    Substring,
    /// Identifier must not be embedded in a longer hostname label.
    Token,
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::Token => write!(f, "token"),
            MatchPolicy::Substring => write!(f, "substring"),
        }
    }
}

/// Result of one registry query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryStatus {
    /// Registry answered 2xx; `present` tells whether this node is listed.
    Listed { status: u16, present: bool },
    /// Registry answered with a non-success status.
    Unavailable { status: u16 },
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncVerdict {
    pub local: u64,
    pub reference: u64,
    /// `reference - local`; negative when the local node is ahead.
    pub diff: i64,
    pub tolerance: u64,
    pub synced: bool,
}

// ============================================================================
// Restart
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Unregistered,
    Lag { diff: i64, tolerance: u64 },
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Unregistered => write!(f, "node not listed by registry"),
            RestartReason::Lag { diff, tolerance } => {
                write!(f, "lagging {} behind reference (tolerance {})", diff, tolerance)
            }
        }
    }
}

/// What happened when the restart action was invoked. The node itself is
/// only re-checked on the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartInvocation {
    Spawned { pid: Option<u32> },
    DryRun,
    Failed(String),
}

impl fmt::Display for RestartInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartInvocation::Spawned { pid: Some(pid) } => write!(f, "spawned (pid {})", pid),
            RestartInvocation::Spawned { pid: None } => write!(f, "spawned"),
            RestartInvocation::DryRun => write!(f, "dry run"),
            RestartInvocation::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// Terminal classification of one watchdog cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Registry listing did not contain this node; restart issued.
    NodeNotRegistered { restart: RestartInvocation },
    /// Registry returned a non-success status, or could not be reached.
    RegistryUnreachable { status: Option<u16> },
    /// One or both indices could not be read.
    IndicesUnavailable,
    Synced(SyncVerdict),
    /// Lag exceeded tolerance; restart issued.
    UnsyncedRestarted {
        verdict: SyncVerdict,
        restart: RestartInvocation,
    },
}

impl CycleOutcome {
    pub fn restart_reason(&self) -> Option<RestartReason> {
        match self {
            CycleOutcome::NodeNotRegistered { .. } => Some(RestartReason::Unregistered),
            CycleOutcome::UnsyncedRestarted { verdict, .. } => Some(RestartReason::Lag {
                diff: verdict.diff,
                tolerance: verdict.tolerance,
            }),
            _ => None,
        }
    }

    pub fn restart_invocation(&self) -> Option<&RestartInvocation> {
        match self {
            CycleOutcome::NodeNotRegistered { restart }
            | CycleOutcome::UnsyncedRestarted { restart, .. } => Some(restart),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::NodeNotRegistered { .. } => "NodeNotRegistered",
            CycleOutcome::RegistryUnreachable { .. } => "RegistryUnreachable",
            CycleOutcome::IndicesUnavailable => "IndicesUnavailable",
            CycleOutcome::Synced(_) => "Synced",
            CycleOutcome::UnsyncedRestarted { .. } => "UnsyncedRestarted",
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NodeNotRegistered { restart } => {
                write!(f, "{} (restart {})", self.label(), restart)
            }
            CycleOutcome::RegistryUnreachable { status: Some(status) } => {
                write!(f, "{} (status {})", self.label(), status)
            }
            CycleOutcome::RegistryUnreachable { status: None } => {
                write!(f, "{} (no response)", self.label())
            }
            CycleOutcome::IndicesUnavailable => write!(f, "{}", self.label()),
            CycleOutcome::Synced(v) => write!(
                f,
                "{} (local={}, reference={}, diff={}, tolerance={})",
                self.label(),
                v.local,
                v.reference,
                v.diff,
                v.tolerance
            ),
            CycleOutcome::UnsyncedRestarted { verdict, restart } => write!(
                f,
                "{} (local={}, reference={}, diff={}, tolerance={}, restart {})",
                self.label(),
                verdict.local,
                verdict.reference,
                verdict.diff,
                verdict.tolerance,
                restart
            ),
        }
    }
}
