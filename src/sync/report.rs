//! Reconciliation results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::action::{ActionId, ActionKind};

/// An action dropped by the conflict policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub action_id: ActionId,
    pub kind: ActionKind,
    pub reason: String,
}

/// What happens to an action after a failed apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDisposition {
    /// Back to Pending; the next drain tries again.
    WillRetry,
    /// Attempt budget exhausted; parked as Failed.
    GaveUp,
    /// Permanently refused by the remote; parked as Failed.
    Rejected,
}

/// An action that could not be applied in this drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub action_id: ActionId,
    pub kind: ActionKind,
    pub error: String,
    pub attempts: u32,
    pub disposition: FailureDisposition,
}

/// Severity of an operator notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A short message for the operator, e.g. rendered as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Summary of one drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied_count: usize,
    pub conflicted_count: usize,
    pub failed_count: usize,
    pub conflicts: Vec<Conflict>,
    pub failures: Vec<ActionFailure>,
    /// Ids applied in this drain, in apply order
    pub applied: Vec<ActionId>,
    /// Pending and Applying actions left when the drain ended
    pub remaining: usize,
    /// Set when a storage error cut the drain short
    pub aborted: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Default for SyncReport {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            applied_count: 0,
            conflicted_count: 0,
            failed_count: 0,
            conflicts: Vec::new(),
            failures: Vec::new(),
            applied: Vec::new(),
            remaining: 0,
            aborted: None,
            started_at: now,
            finished_at: now,
        }
    }
}

/// Fate of a single action within a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<'a> {
    Applied,
    Conflicted(&'a str),
    Failed(&'a ActionFailure),
    NotReached,
}

impl SyncReport {
    pub(crate) fn record_applied(&mut self, id: ActionId) {
        self.applied_count += 1;
        self.applied.push(id);
    }

    pub(crate) fn record_conflict(&mut self, id: ActionId, kind: ActionKind, reason: String) {
        self.conflicted_count += 1;
        self.conflicts.push(Conflict {
            action_id: id,
            kind,
            reason,
        });
    }

    pub(crate) fn record_failure(&mut self, failure: ActionFailure) {
        self.failed_count += 1;
        self.failures.push(failure);
    }

    pub(crate) fn abort(&mut self, reason: String) {
        self.aborted = Some(reason);
    }

    /// Whether anything happened at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.applied_count == 0
            && self.conflicted_count == 0
            && self.failed_count == 0
            && self.aborted.is_none()
    }

    /// Whether the drain should be retried later.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.aborted.is_some()
            || self
                .failures
                .iter()
                .any(|f| f.disposition == FailureDisposition::WillRetry)
    }

    /// How a given action fared in this drain.
    #[must_use]
    pub fn outcome_of(&self, id: &ActionId) -> ActionOutcome<'_> {
        if self.applied.contains(id) {
            return ActionOutcome::Applied;
        }
        if let Some(conflict) = self.conflicts.iter().find(|c| &c.action_id == id) {
            return ActionOutcome::Conflicted(&conflict.reason);
        }
        if let Some(failure) = self.failures.iter().find(|f| &f.action_id == id) {
            return ActionOutcome::Failed(failure);
        }
        ActionOutcome::NotReached
    }

    /// Operator messages describing the drain.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();

        if self.is_empty() {
            notices.push(Notice::new(NoticeLevel::Info, "Nothing to sync"));
            return notices;
        }

        if self.applied_count > 0 {
            if self.remaining == 0 && self.failed_count == 0 && self.aborted.is_none() {
                notices.push(Notice::new(
                    NoticeLevel::Success,
                    format!("All queued actions synced ({} applied)", self.applied_count),
                ));
            } else {
                notices.push(Notice::new(
                    NoticeLevel::Success,
                    format!("{} queued {} synced", self.applied_count, plural(self.applied_count)),
                ));
            }
        }

        if self.conflicted_count > 0 {
            let reasons: Vec<&str> = self.conflicts.iter().map(|c| c.reason.as_str()).collect();
            notices.push(Notice::new(
                NoticeLevel::Warning,
                format!(
                    "{} {} skipped: {}",
                    self.conflicted_count,
                    if self.conflicted_count == 1 { "conflict" } else { "conflicts" },
                    reasons.join("; ")
                ),
            ));
        }

        let parked: Vec<&ActionFailure> = self
            .failures
            .iter()
            .filter(|f| f.disposition != FailureDisposition::WillRetry)
            .collect();
        if !parked.is_empty() {
            let errors: Vec<&str> = parked.iter().map(|f| f.error.as_str()).collect();
            notices.push(Notice::new(
                NoticeLevel::Error,
                format!(
                    "{} {} parked for attention: {}",
                    parked.len(),
                    plural(parked.len()),
                    errors.join("; ")
                ),
            ));
        }

        if let Some(reason) = &self.aborted {
            notices.push(Notice::new(
                NoticeLevel::Error,
                format!("Sync will retry later: {reason}"),
            ));
        } else if let Some(failure) = self
            .failures
            .iter()
            .find(|f| f.disposition == FailureDisposition::WillRetry)
        {
            notices.push(Notice::new(
                NoticeLevel::Warning,
                format!(
                    "Sync will retry later: {} ({} still queued)",
                    failure.error, self.remaining
                ),
            ));
        }

        notices
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} conflicted, {} failed, {} remaining",
            self.applied_count, self.conflicted_count, self.failed_count, self.remaining
        )
    }
}

const fn plural(n: usize) -> &'static str {
    if n == 1 {
        "action"
    } else {
        "actions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(disposition: FailureDisposition) -> ActionFailure {
        ActionFailure {
            action_id: ActionId::generate(),
            kind: ActionKind::Sale,
            error: "Remote inventory unavailable: offline".to_string(),
            attempts: 1,
            disposition,
        }
    }

    #[test]
    fn test_empty_report() {
        let report = SyncReport::default();
        assert!(report.is_empty());
        assert!(!report.should_retry());
        assert_eq!(report.notices()[0].message, "Nothing to sync");
    }

    #[test]
    fn test_all_synced_notice() {
        let mut report = SyncReport::default();
        report.record_applied(ActionId::generate());
        report.record_applied(ActionId::generate());

        let notices = report.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Success);
        assert_eq!(notices[0].message, "All queued actions synced (2 applied)");
    }

    #[test]
    fn test_conflict_notice_lists_reasons() {
        let mut report = SyncReport::default();
        report.record_conflict(
            ActionId::generate(),
            ActionKind::Sale,
            "Sale for Milk skipped: insufficient stock".to_string(),
        );
        report.record_conflict(
            ActionId::generate(),
            ActionKind::Sale,
            "Sale for Bread skipped: product no longer exists".to_string(),
        );

        let notices = report.notices();
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(
            notices[0].message,
            "2 conflicts skipped: Sale for Milk skipped: insufficient stock; \
             Sale for Bread skipped: product no longer exists"
        );
    }

    #[test]
    fn test_transient_failure_retries_later() {
        let mut report = SyncReport::default();
        report.record_applied(ActionId::generate());
        report.record_failure(failure(FailureDisposition::WillRetry));
        report.remaining = 3;

        assert!(report.should_retry());
        let messages: Vec<String> = report.notices().into_iter().map(|n| n.message).collect();
        assert_eq!(messages[0], "1 queued action synced");
        assert!(messages[1].starts_with("Sync will retry later"));
        assert!(messages[1].ends_with("(3 still queued)"));
    }

    #[test]
    fn test_parked_failures_need_attention() {
        let mut report = SyncReport::default();
        report.record_failure(failure(FailureDisposition::Rejected));

        assert!(!report.should_retry());
        let notices = report.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("1 action parked for attention"));
    }

    #[test]
    fn test_outcome_of() {
        let mut report = SyncReport::default();
        let applied = ActionId::generate();
        let conflicted = ActionId::generate();
        report.record_applied(applied);
        report.record_conflict(conflicted, ActionKind::Sale, "no stock".to_string());

        assert_eq!(report.outcome_of(&applied), ActionOutcome::Applied);
        assert_eq!(
            report.outcome_of(&conflicted),
            ActionOutcome::Conflicted("no stock")
        );
        assert_eq!(
            report.outcome_of(&ActionId::generate()),
            ActionOutcome::NotReached
        );
    }
}
