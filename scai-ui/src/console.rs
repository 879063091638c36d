//! Text rendering and command parsing for the operator console

use crate::events::{RunOutcome, SessionUpdate};
use crate::session::{Session, ViewMode};
use crate::stages::{StageList, StageStatus};
use scai_common::api::{BaselineMetrics, PolicyPreset};
use std::fmt::Write;

/// Operator command read from stdin
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a new run; None re-runs the last policy
    Rerun(Option<String>),
    View(ViewMode),
    Status,
    Presets,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "commands: rerun [policy text] | view before|after | status | presets | help | quit";

/// Parse one input line; None for blank lines
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "rerun" | "run" => Command::Rerun(Some(rest.to_string()).filter(|p| !p.is_empty())),
        "view" => match rest.to_ascii_lowercase().as_str() {
            "before" => Command::View(ViewMode::Before),
            "after" => Command::View(ViewMode::After),
            _ => Command::Unknown(line.to_string()),
        },
        "status" => Command::Status,
        "presets" => Command::Presets,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

/// Pick the policy text from `--policy` or `--preset`
pub fn select_policy(
    policy: Option<&str>,
    preset_id: Option<&str>,
    presets: &[PolicyPreset],
) -> Result<String, String> {
    if let Some(policy) = policy.map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(policy.to_string());
    }
    match preset_id {
        Some(id) => presets
            .iter()
            .find(|preset| preset.id == id)
            .map(|preset| preset.description.clone())
            .ok_or_else(|| format!("unknown preset '{}'", id)),
        None => Err("no policy given (use --policy or --preset)".to_string()),
    }
}

fn status_marker(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "[ ]",
        StageStatus::Running => "[>]",
        StageStatus::Completed => "[x]",
        StageStatus::Error => "[!]",
    }
}

/// One line per stage
pub fn format_stages(stages: &StageList) -> String {
    let mut out = String::new();
    for stage in stages.iter() {
        let _ = write!(out, "  {} {:<18}", status_marker(stage.status), stage.name.display_name());
        if let Some(message) = &stage.message {
            let _ = write!(out, " {}", message);
        }
        out.push('\n');
    }
    out
}

/// Console line for a session update; None for updates not worth printing
pub fn format_update(update: &SessionUpdate) -> Option<String> {
    let line = match update {
        SessionUpdate::RunStarted { run_id, policy, .. } => {
            format!("run {} started: {}", run_id, policy)
        }
        SessionUpdate::StageChanged {
            stage,
            status,
            message,
        } => match message {
            Some(message) if status.is_terminal() => format!(
                "{} {}: {}",
                status_marker(*status),
                stage.display_name(),
                message
            ),
            _ => format!("{} {}", status_marker(*status), stage.display_name()),
        },
        SessionUpdate::ImpactScoresUpdated { metric_count } => {
            format!("impact scores updated ({} metrics)", metric_count)
        }
        SessionUpdate::ModifiedLayerReady { feature_count } => {
            format!("modified network received ({} changed roads)", feature_count)
        }
        SessionUpdate::Diagnostic { message } => format!("note: {}", message),
        SessionUpdate::RunFinished { outcome, .. } => match outcome {
            RunOutcome::Completed => "run completed".to_string(),
            RunOutcome::Failed(reason) => format!("run failed: {}", reason),
            RunOutcome::TransportLost(reason) => format!("run interrupted: {}", reason),
        },
        SessionUpdate::ViewChanged { .. } => return None,
    };
    Some(line)
}

pub fn format_baseline(metrics: &BaselineMetrics) -> String {
    format!(
        "baseline: {} roads, {} junctions, avg congestion {:.0}%, severe {:.1}%, avg trip {:.1} min, CO2 {:.0} kg/day",
        metrics.total_edges,
        metrics.total_nodes,
        metrics.avg_congestion_ratio * 100.0,
        metrics.severe_congestion_pct,
        metrics.avg_travel_time_min,
        metrics.daily_co2_kg,
    )
}

pub fn format_presets(presets: &[PolicyPreset]) -> String {
    let mut out = String::new();
    for preset in presets {
        let _ = writeln!(out, "  {:<24} {} {}", preset.id, preset.icon, preset.title);
    }
    out
}

/// Final report: impact table, citizen satisfaction, recommendation, notes
pub fn format_report(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== Report: {} ==", session.policy_text());

    match session.impact_scores() {
        Some(scores) if !scores.is_empty() => {
            let _ = writeln!(
                out,
                "  {:<26} {:>14} {:>14} {:>9}",
                "metric", "before", "after", "change"
            );
            for (key, metric) in scores.ordered() {
                let label = if metric.label.is_empty() { key } else { metric.label.as_str() };
                let _ = writeln!(
                    out,
                    "  {:<26} {:>14.2} {:>14.2} {:>+8.1}% {} {}",
                    label,
                    metric.before,
                    metric.after,
                    metric.delta_pct,
                    metric.unit,
                    metric.severity.marker()
                );
            }
            if let Some(satisfaction) = &scores.citizen_satisfaction {
                let _ = writeln!(
                    out,
                    "  citizen satisfaction {:.1} {} ({})",
                    satisfaction.score,
                    satisfaction.unit,
                    satisfaction.severity.as_str()
                );
                for group in &satisfaction.by_group {
                    let _ = write!(
                        out,
                        "    {:<28} {:>+5.1} {}",
                        group.group, group.impact_score, group.sentiment
                    );
                    if let Some(concern) = group.key_concern.as_deref().filter(|c| !c.is_empty()) {
                        let _ = write!(out, " - {}", concern);
                    }
                    out.push('\n');
                }
            }
        }
        _ => out.push_str("  no impact scores\n"),
    }

    out.push('\n');
    match session.recommendation_text() {
        Some(text) if !text.trim().is_empty() => {
            out.push_str(text.trim_end());
            out.push('\n');
        }
        _ => out.push_str("no recommendation available\n"),
    }

    if !session.diagnostics().is_empty() {
        out.push('\n');
        for note in session.diagnostics() {
            let _ = writeln!(out, "note: {}", note);
        }
    }
    out
}
