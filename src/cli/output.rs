//! Output formatting for CLI commands.

#![allow(clippy::format_push_string)]

use std::fmt::Write;
use std::time::Duration;

use serde::Serialize;

use crate::agent::{ProgressEvent, WorkflowOutcome};
use crate::core::{ToolCategory, excerpt};
use crate::storage::{Insight, StoredMessage, UserContext};

/// Characters of message content shown per history line.
const HISTORY_EXCERPT: usize = 120;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// One compact JSON document per line.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Serializes `value` in this format's JSON flavour.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let rendered = match self {
            Self::Ndjson => serde_json::to_string(value),
            Self::Json | Self::Text => serde_json::to_string_pretty(value),
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
    }
}

/// Report followed by a one-line run summary.
#[must_use]
pub fn format_outcome(outcome: &WorkflowOutcome, verbose: bool) -> String {
    let mut output = outcome.report.trim_end().to_string();
    let meta = &outcome.metadata;
    let buckets: Vec<String> = ToolCategory::ALL
        .iter()
        .map(|c| format!("{c} {}", outcome.buckets.get(c).copied().unwrap_or(0)))
        .collect();

    output.push_str(&format!(
        "\n\n---\nPath: {} | Iterations: {}/{} | Sub-queries: {} ok, {} failed | Evidence: {} | Time: {:.1}s",
        outcome.classification.kind.as_str(),
        outcome.iterations,
        outcome.ceiling,
        meta.successful,
        meta.failed,
        buckets.join(", "),
        Duration::from_millis(outcome.elapsed_ms).as_secs_f64(),
    ));
    if verbose {
        for sub_query in &outcome.plan {
            let _ = write!(output, "\nSub-query [{}]: {}", sub_query.category, sub_query.text);
        }
        for err in &meta.errors {
            let _ = write!(output, "\nTool error: {err}");
        }
        if let Some(verdict) = &outcome.verdict {
            let _ = write!(
                output,
                "\nVerdict: {} ({:?}) {}",
                if verdict.sufficient { "sufficient" } else { "insufficient" },
                verdict.source,
                verdict.feedback
            );
        }
    }
    output.push('\n');
    output
}

/// One progress event as a text line, or `None` for the terminal
/// `completed` event whose response is printed separately.
#[must_use]
pub fn format_event_line(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::Processing { step, message, .. } => Some(format!("[{step}] {message}")),
        ProgressEvent::Error { message } => Some(format!("[error] {message}")),
        ProgressEvent::Completed { .. } => None,
    }
}

/// Conversation history.
#[must_use]
pub fn format_history(messages: &[StoredMessage], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if messages.is_empty() {
                return "No messages.\n".to_string();
            }
            let mut output = String::new();
            for stored in messages {
                let _ = writeln!(
                    output,
                    "{} [{}] {}: {}",
                    stored.created_at.format("%Y-%m-%d %H:%M"),
                    stored.message.session_id,
                    stored.message.role.as_str(),
                    excerpt(&stored.message.content, HISTORY_EXCERPT)
                );
            }
            output
        }
        OutputFormat::Json => format.to_json(messages),
        OutputFormat::Ndjson => lines(messages, format),
    }
}

/// Stored insights.
#[must_use]
pub fn format_insights(insights: &[Insight], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if insights.is_empty() {
                return "No insights.\n".to_string();
            }
            let mut output = String::new();
            for insight in insights {
                let score = insight
                    .score
                    .map(|s| format!(" (score {s:.2})"))
                    .unwrap_or_default();
                let _ = writeln!(
                    output,
                    "#{} {} [{}]{score}\n    {}\n    tags: {}",
                    insight.id,
                    insight.title,
                    insight.insight_type,
                    insight.summary,
                    insight.tags.join(", ")
                );
            }
            output
        }
        OutputFormat::Json => format.to_json(insights),
        OutputFormat::Ndjson => lines(insights, format),
    }
}

/// One insight with its full content.
#[must_use]
pub fn format_insight(insight: &Insight, format: OutputFormat) -> String {
    if format != OutputFormat::Text {
        return format.to_json(insight);
    }
    format!(
        "#{} {} [{}]\nQuery: {}\nCreated: {}\nTags: {}\n\n{}\n",
        insight.id,
        insight.title,
        insight.insight_type,
        insight.query,
        insight.created_at.format("%Y-%m-%d %H:%M"),
        insight.tags.join(", "),
        insight.content.trim_end()
    )
}

/// Profile, holdings, interests, and the derived summary.
#[must_use]
pub fn format_user_context(context: &UserContext, format: OutputFormat) -> String {
    if format != OutputFormat::Text {
        return format.to_json(context);
    }

    let mut output = format!("User: {}\n", context.user_id);
    match &context.profile {
        Some(profile) => {
            let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
            let _ = writeln!(output, "Risk tolerance:   {}", field(&profile.risk_tolerance));
            let _ = writeln!(output, "Investment goal:  {}", field(&profile.investment_goal));
            let _ = writeln!(output, "Experience level: {}", field(&profile.experience_level));
            let _ = writeln!(
                output,
                "Preferred sectors: {}",
                profile.preferred_sectors.join(", ")
            );
        }
        None => output.push_str("No profile set.\n"),
    }
    if !context.holdings.is_empty() {
        output.push_str("Holdings:\n");
        for holding in &context.holdings {
            let price = holding
                .avg_price
                .map(|p| format!(" @ {p}"))
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "  {} ({}) x {}{price}",
                holding.name, holding.symbol, holding.quantity
            );
        }
    }
    if !context.interests.is_empty() {
        let _ = writeln!(output, "Interests: {}", context.interests.join(", "));
    }
    let _ = writeln!(output, "Summary: {}", context.summary);
    output
}

fn lines<T: Serialize>(items: &[T], format: OutputFormat) -> String {
    items
        .iter()
        .map(|item| format.to_json(item) + "\n")
        .collect()
}
