//! Best-effort parsing of Stage 3 audit reports for display.
//!
//! The run keeps the report verbatim; this summary only feeds the CLI. Any
//! section the model omitted is simply absent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*|__)?\s*(SCORE|CRITICAL\s+ISSUES|WARNINGS|RECOMMENDATIONS)\b\s*(?:\*\*|__)?\s*:?\s*(?:\*\*|__)?\s*(.*)$",
    )
    .unwrap()
});

static SCORE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3})(?:\s*(?:/|out\s+of)\s*(\d{1,3}))?\b").unwrap());

static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+(.*)$").unwrap());

static NONE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:none|n/a|no (?:critical )?(?:issues|warnings)(?: found)?)\.?\s*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditScore {
    pub value: u32,
    pub out_of: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Score,
    Critical,
    Warnings,
    Recommendations,
}

impl Section {
    fn from_heading(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if upper.starts_with("SCORE") {
            Self::Score
        } else if upper.starts_with("CRITICAL") {
            Self::Critical
        } else if upper.starts_with("WARNINGS") {
            Self::Warnings
        } else {
            Self::Recommendations
        }
    }
}

/// Sections of an audit report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub score: Option<AuditScore>,
    pub critical_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    /// Number of the four section headings found.
    pub sections_found: usize,
}

impl AuditSummary {
    /// Parse a report. Never fails; unrecognised text is ignored.
    #[must_use]
    pub fn parse(report: &str) -> Self {
        let mut summary = Self::default();
        let mut bodies: Vec<(Section, Vec<&str>)> = Vec::new();

        for line in report.lines() {
            if let Some(caps) = SECTION_HEADING.captures(line) {
                let section = Section::from_heading(&caps[1]);
                let rest = caps.get(2).map_or("", |m| m.as_str()).trim();
                let mut body = Vec::new();
                if !rest.is_empty() {
                    body.push(rest);
                }
                bodies.push((section, body));
            } else if let Some((_, body)) = bodies.last_mut() {
                body.push(line);
            }
        }

        let mut seen = Vec::new();
        for (section, body) in bodies {
            if seen.contains(&section) {
                continue;
            }
            seen.push(section);
            match section {
                Section::Score => summary.score = parse_score(&body),
                Section::Critical => summary.critical_issues = items(&body),
                Section::Warnings => summary.warnings = items(&body),
                Section::Recommendations => summary.recommendations = items(&body),
            }
        }
        summary.sections_found = seen.len();
        summary
    }

    /// All four sections were present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sections_found == 4
    }
}

fn parse_score(body: &[&str]) -> Option<AuditScore> {
    body.iter().find_map(|line| {
        let caps = SCORE_VALUE.captures(line)?;
        let value = caps[1].parse().ok()?;
        let out_of = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(100);
        (value <= out_of).then_some(AuditScore { value, out_of })
    })
}

/// Bullet items, or the non-blank lines when the body has no bullets.
fn items(body: &[&str]) -> Vec<String> {
    let lines: Vec<&str> = body
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.chars().all(|c| c == '-' || c == '*' || c == '='))
        .collect();

    if lines.len() == 1 && NONE_MARKER.is_match(lines[0]) {
        return Vec::new();
    }

    let bullets: Vec<String> = lines
        .iter()
        .filter_map(|l| BULLET.captures(l).map(|c| c[1].trim().to_string()))
        .filter(|item| !item.is_empty())
        .collect();

    if bullets.is_empty() {
        lines.into_iter().map(str::to_string).collect()
    } else {
        bullets
    }
}
