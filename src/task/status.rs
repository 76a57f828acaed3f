use std::fmt;

/// Lifecycle state of a task on the bridge, with its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    TransactionSent,
    BlockchainConfirmed,
    ParamsUploaded,
    PendingResult,
    Aborted,
    Success,
}

impl TaskStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::TransactionSent),
            2 => Some(Self::BlockchainConfirmed),
            3 => Some(Self::ParamsUploaded),
            4 => Some(Self::PendingResult),
            5 => Some(Self::Aborted),
            6 => Some(Self::Success),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::TransactionSent => 1,
            Self::BlockchainConfirmed => 2,
            Self::ParamsUploaded => 3,
            Self::PendingResult => 4,
            Self::Aborted => 5,
            Self::Success => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::TransactionSent => "transaction_sent",
            Self::BlockchainConfirmed => "blockchain_confirmed",
            Self::ParamsUploaded => "params_uploaded",
            Self::PendingResult => "pending_result",
            Self::Aborted => "aborted",
            Self::Success => "success",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Aborted)
    }

    /// Position on the happy path. `Aborted` sits outside it and has no rank.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::TransactionSent => Some(1),
            Self::BlockchainConfirmed => Some(2),
            Self::ParamsUploaded => Some(3),
            Self::PendingResult => Some(4),
            Self::Success => Some(5),
            Self::Aborted => None,
        }
    }

    /// Whether `next` is a legal forward move from `self`.
    ///
    /// Skipping intermediate states is allowed since a poll can miss them.
    /// Terminal states have no outgoing transitions.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(cur), Some(nxt)) => nxt > cur,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status read as reported by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub code: i64,
    pub abort_reason: Option<String>,
}

impl StatusReport {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            code: status.code(),
            abort_reason: None,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            code: TaskStatus::Aborted.code(),
            abort_reason: Some(reason.into()),
        }
    }
}

/// What a single status read did to the tracked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Advanced { from: TaskStatus, to: TaskStatus },
    Unchanged(TaskStatus),
    /// The bridge reported a status behind the one already seen. Ignored.
    Regressed {
        current: TaskStatus,
        reported: TaskStatus,
    },
    Unrecognized(i64),
}

/// Client-side view of a task's progress. Only moves forward.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    current: TaskStatus,
    abort_reason: Option<String>,
}

/// Used when the bridge aborts a task without saying why.
pub const UNKNOWN_ABORT_REASON: &str = "no reason reported";

impl Default for TaskProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskProgress {
    pub fn new() -> Self {
        Self {
            current: TaskStatus::Pending,
            abort_reason: None,
        }
    }

    pub fn current(&self) -> TaskStatus {
        self.current
    }

    /// Set iff the current status is `Aborted`.
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn observe(&mut self, report: &StatusReport) -> Observation {
        let Some(reported) = TaskStatus::from_code(report.code) else {
            return Observation::Unrecognized(report.code);
        };

        if reported == self.current {
            return Observation::Unchanged(reported);
        }

        if !self.current.can_advance_to(reported) {
            return Observation::Regressed {
                current: self.current,
                reported,
            };
        }

        let from = self.current;
        self.current = reported;
        if reported == TaskStatus::Aborted {
            let reason = report
                .abort_reason
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(UNKNOWN_ABORT_REASON);
            self.abort_reason = Some(reason.to_string());
        }
        Observation::Advanced { from, to: reported }
    }
}
