//! Rendering and saving research results.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde_json::{Value, json};

use sleuth_agent::ResearchResult;
use sleuth_config::OutputFormat;

/// Version tag written into JSON exports.
pub const EXPORT_VERSION: &str = "1.0";

/// Longest query prefix used in file names.
const MAX_NAME_QUERY_CHARS: usize = 50;

/// File format for a saved result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Pretty-printed JSON
    Json,
    /// Markdown report
    Markdown,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
        }
    }
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json,
            OutputFormat::Markdown => Self::Markdown,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON
// ─────────────────────────────────────────────────────────────────────────────

/// Structured view of a result. Raw findings are left out unless asked for.
pub fn to_json(result: &ResearchResult, include_raw: bool) -> Value {
    let mut value = json!({
        "query": result.query,
        "summary": result.summary,
        "sources": result.sources,
        "iterations": result.iterations,
        "completed": result.completed,
        "usage": {
            "model": result.usage.model,
            "input_tokens": result.usage.input_tokens,
            "output_tokens": result.usage.output_tokens,
            "total_tokens": result.total_tokens(),
            "cost_usd": result.cost(),
        },
        "timestamp": result.finished_at.to_rfc3339(),
    });
    if include_raw {
        value["raw_findings"] = json!(result.raw_findings);
    }
    value
}

/// JSON export with metadata, pretty-printed.
pub fn render_json(
    result: &ResearchResult,
    include_raw: bool,
    exported_at: DateTime<Utc>,
) -> Result<String> {
    let mut value = to_json(result, include_raw);
    value["export_metadata"] = json!({
        "exported_at": exported_at.to_rfc3339(),
        "format": ExportFormat::Json.name(),
        "version": EXPORT_VERSION,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Markdown
// ─────────────────────────────────────────────────────────────────────────────

/// Markdown report: status, stats table, summary and numbered sources.
pub fn render_markdown(result: &ResearchResult, include_raw: bool) -> String {
    let mut out = String::new();
    let status = if result.completed { "Complete" } else { "Partial" };

    let _ = writeln!(out, "# Research: {}\n", result.query);
    let _ = writeln!(out, "**Status:** {status}  ");
    let _ = writeln!(
        out,
        "**Date:** {}\n",
        result.finished_at.format("%Y-%m-%d %H:%M UTC")
    );

    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|--------|-------|");
    let _ = writeln!(out, "| Iterations | {} |", result.iterations);
    let _ = writeln!(out, "| Sources | {} |", result.sources.len());
    let _ = writeln!(out, "| Tokens | {} |", result.total_tokens());
    let _ = writeln!(out, "| Cost | ${:.4} |\n", result.cost());

    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "{}\n", result.summary.trim());

    let _ = writeln!(out, "## Sources\n");
    if result.sources.is_empty() {
        let _ = writeln!(out, "_No pages were fetched._");
    }
    for (i, source) in result.sources.iter().enumerate() {
        let title = if source.title.is_empty() {
            source.url.as_str()
        } else {
            source.title.as_str()
        };
        let _ = writeln!(out, "{}. [{}]({})", i + 1, title, source.url);
    }

    if include_raw && !result.raw_findings.is_empty() {
        let _ = writeln!(out, "\n## Raw Findings");
        for (i, finding) in result.raw_findings.iter().enumerate() {
            let _ = writeln!(out, "\n### Finding {}\n\n```text\n{}\n```", i + 1, finding);
        }
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Saving
// ─────────────────────────────────────────────────────────────────────────────

/// Query prefix usable in a file name: alphanumerics kept, everything else `_`.
pub fn safe_query(query: &str) -> String {
    query
        .chars()
        .take(MAX_NAME_QUERY_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// `research_<safe query>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn file_name(query: &str, format: ExportFormat, at: DateTime<Local>) -> String {
    format!(
        "research_{}_{}.{}",
        safe_query(query),
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Write the result into `dir`, creating it if needed.
pub fn save(
    result: &ResearchResult,
    dir: &Path,
    format: ExportFormat,
    include_raw: bool,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;

    let contents = match format {
        ExportFormat::Json => render_json(result, include_raw, Utc::now())?,
        ExportFormat::Markdown => render_markdown(result, include_raw),
    };

    let path = dir.join(file_name(&result.query, format, Local::now()));
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    tracing::info!(path = %path.display(), format = format.name(), "Saved research result");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sleuth_agent::{SourceRecord, UsageLedger};

    fn sample(completed: bool) -> ResearchResult {
        let mut usage = UsageLedger::new("claude-sonnet-4-20250514");
        usage.accumulate(1000, 200);
        ResearchResult {
            query: "What is Rust's ownership model?".to_string(),
            summary: "Ownership ties each value to one owner.".to_string(),
            sources: vec![
                SourceRecord::new("https://doc.rust-lang.org/book/ch04-01", "What is Ownership?"),
                SourceRecord::new("https://example.com/untitled", ""),
            ],
            raw_findings: vec!["first page".to_string(), "second page".to_string()],
            iterations: 3,
            usage,
            completed,
            finished_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_safe_query() {
        assert_eq!(safe_query("rust async/await?"), "rust_async_await_");
        let long = "a".repeat(80);
        assert_eq!(safe_query(&long).chars().count(), 50);
    }

    #[test]
    fn test_file_name() {
        let at = Local.with_ymd_and_hms(2026, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(
            file_name("tides", ExportFormat::Json, at),
            "research_tides_20260301_090507.json"
        );
        assert_eq!(
            file_name("tides", ExportFormat::Markdown, at),
            "research_tides_20260301_090507.md"
        );
    }

    #[test]
    fn test_json_shape() {
        let result = sample(true);
        let value = to_json(&result, false);

        assert_eq!(value["query"], "What is Rust's ownership model?");
        assert_eq!(value["iterations"], 3);
        assert_eq!(value["completed"], true);
        assert_eq!(value["sources"][0]["title"], "What is Ownership?");
        assert_eq!(value["usage"]["input_tokens"], 1000);
        assert_eq!(value["usage"]["total_tokens"], 1200);
        assert!(value["usage"]["cost_usd"].as_f64().unwrap() > 0.0);
        assert!(value.get("raw_findings").is_none());

        let with_raw = to_json(&result, true);
        assert_eq!(with_raw["raw_findings"][1], "second page");
    }

    #[test]
    fn test_render_json_metadata() {
        let rendered = render_json(&sample(true), false, Utc::now()).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["export_metadata"]["format"], "json");
        assert_eq!(value["export_metadata"]["version"], EXPORT_VERSION);
        assert!(rendered.contains("\n  \"query\""));
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&sample(false), false);
        assert!(md.starts_with("# Research: What is Rust's ownership model?"));
        assert!(md.contains("**Status:** Partial"));
        assert!(md.contains("| Iterations | 3 |"));
        assert!(md.contains("| Tokens | 1200 |"));
        assert!(md.contains("1. [What is Ownership?](https://doc.rust-lang.org/book/ch04-01)"));
        assert!(md.contains("2. [https://example.com/untitled](https://example.com/untitled)"));
        assert!(!md.contains("Raw Findings"));

        let complete = render_markdown(&sample(true), true);
        assert!(complete.contains("**Status:** Complete"));
        assert!(complete.contains("### Finding 2"));
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");

        let path = save(&sample(true), &out, ExportFormat::Markdown, false).unwrap();
        assert!(path.starts_with(&out));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("research_What_is_Rust_s_ownership_model__"));
        assert!(name.ends_with(".md"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("## Summary"));
    }
}
