use chrono::Utc;
use colored::Colorize;

use crate::sync::{ActionState, ActionSummary, NoticeLevel, QueueStats, Submission, SyncReport};

/// Format queued actions as a pretty table
pub fn format_summaries_pretty(summaries: &[ActionSummary]) -> String {
    if summaries.is_empty() {
        return "Offline queue (0 actions)\n  No actions waiting to sync".to_string();
    }

    let mut output = format!("Offline queue ({} actions)\n", summaries.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for summary in summaries {
        let icon = match summary.state {
            ActionState::Pending => "…".white(),
            ActionState::Applying => "▶".cyan(),
            ActionState::Applied => "✓".green(),
            ActionState::Conflicted => "○".yellow(),
            ActionState::Failed => "✗".red(),
        };

        let mut line = format!(
            "{} {}  {}",
            icon,
            summary.description.bold(),
            summary.enqueued_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
        if summary.attempts > 0 {
            line.push_str(&format!("  {}", format!("{} attempts", summary.attempts).yellow()));
        }
        output.push_str(&line);
        output.push('\n');
        output.push_str(&format!("    {}\n", summary.id.to_string().dimmed()));

        if let Some(error) = &summary.last_error {
            output.push_str(&format!("    {}\n", error.red()));
        }
    }

    output
}

/// Format a sync report as operator notices plus counts
pub fn format_report_pretty(report: &SyncReport) -> String {
    let mut lines = Vec::new();

    for notice in report.notices() {
        let line = match notice.level {
            NoticeLevel::Success => format!("{} {}", "✓".green(), notice.message.green()),
            NoticeLevel::Info => format!("{} {}", "·".dimmed(), notice.message),
            NoticeLevel::Warning => format!("{} {}", "○".yellow(), notice.message.yellow()),
            NoticeLevel::Error => format!("{} {}", "✗".red(), notice.message.red()),
        };
        lines.push(line);
    }

    if !report.is_empty() {
        lines.push(report.summary().dimmed().to_string());
    }

    lines.join("\n")
}

/// Format queue statistics
pub fn format_stats_pretty(stats: &QueueStats, reconciling: bool) -> String {
    let mut lines = Vec::new();

    lines.push("Offline Queue Status".bold().to_string());
    lines.push("─".repeat(40));
    lines.push(format!(
        "  Pending:    {} {}",
        stats.pending,
        if stats.pending > 0 {
            "actions waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    if stats.applying > 0 {
        lines.push(format!(
            "  Applying:   {} {}",
            stats.applying,
            "interrupted, resumed on next sync".dimmed()
        ));
    }
    lines.push(format!(
        "  Failed:     {} {}",
        stats.failed,
        if stats.failed > 0 {
            "actions need attention".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest_enqueued_at {
        lines.push(format!("  Oldest:     {}", format_age(oldest).dimmed()));
    }
    if reconciling {
        lines.push(format!("  {}", "Sync in progress".cyan()));
    }

    if stats.pending + stats.applying > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'stockflow queue sync' to sync now"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format the result of submitting a sale or restock
pub fn format_submission_pretty(submission: &Submission, description: &str) -> String {
    match submission {
        Submission::Applied { .. } => format!("{} {}", "✓".green(), description),
        Submission::Queued { action_id } => format!(
            "{} {}\n  {}\n  {}",
            "…".yellow(),
            description,
            "You are offline. The action has been queued and will sync when online.".yellow(),
            action_id.to_string().dimmed()
        ),
        Submission::Conflicted { reason, .. } => format!("{} {}", "○".yellow(), reason.yellow()),
    }
}

fn format_age(time: chrono::DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(time);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ActionId, ActionKind};

    fn summary(state: ActionState, last_error: Option<&str>) -> ActionSummary {
        ActionSummary {
            id: ActionId::generate(),
            kind: ActionKind::Restock,
            enqueued_at: Utc::now(),
            state,
            attempts: 2,
            description: "Restock of 4 x Milk by u1".to_string(),
            last_error: last_error.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_queue() {
        let output = format_summaries_pretty(&[]);
        assert!(output.contains("0 actions"));
    }

    #[test]
    fn test_summaries_show_errors() {
        colored::control::set_override(false);
        let output = format_summaries_pretty(&[
            summary(ActionState::Pending, None),
            summary(ActionState::Failed, Some("Product p1 not found")),
        ]);

        assert!(output.contains("Offline queue (2 actions)"));
        assert!(output.contains("Restock of 4 x Milk by u1"));
        assert!(output.contains("2 attempts"));
        assert!(output.contains("Product p1 not found"));
    }

    #[test]
    fn test_report_pretty() {
        colored::control::set_override(false);
        let output = format_report_pretty(&SyncReport::default());
        assert!(output.contains("Nothing to sync"));
    }

    #[test]
    fn test_stats_pretty() {
        colored::control::set_override(false);
        let stats = QueueStats {
            pending: 3,
            oldest_enqueued_at: Some(Utc::now()),
            ..QueueStats::default()
        };
        let output = format_stats_pretty(&stats, true);

        assert!(output.contains("Pending:    3"));
        assert!(output.contains("just now"));
        assert!(output.contains("Sync in progress"));
        assert!(output.contains("stockflow queue sync"));
    }

    #[test]
    fn test_queued_submission_mentions_offline() {
        colored::control::set_override(false);
        let output = format_submission_pretty(
            &Submission::Queued {
                action_id: ActionId::generate(),
            },
            "Sale of 1 item",
        );
        assert!(output.contains("You are offline"));
    }
}
