use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use super::AiClient;
use crate::comments::{ReviewComment, Severity};

const REVIEW_SYSTEM: &str = "You are a professional code reviewer.";
const REVIEW_MAX_TOKENS: u32 = 2000;

pub const UNPARSEABLE_SUMMARY: &str =
    "Review output could not be parsed; please review the changes manually.";

const CODE_REVIEW_PROMPT: &str = r#"Review the following code changes and point out potential problems.

## What to look at
1. **Quality**: code smells, excessive complexity, duplication, poor naming
2. **Security**: latent bugs, null dereferences, resource leaks, vulnerabilities
3. **Types**: type errors, mismatches, inference problems
4. **Conventions**: project coding conventions and common practice

## Diff
{diff}

## Output
For every problem give the file, the line, a category (quality, security, type, convention),
a severity (info, warning, error), a description and a suggested fix.

Reply with JSON only, in exactly this shape:
```json
{
  "summary": "two or three sentences summarising the main findings",
  "issues": [
    {
      "file": "path/to/file",
      "line": 42,
      "message": "what is wrong",
      "category": "quality",
      "severity": "warning",
      "suggestion": "how to fix it"
    }
  ],
  "score": 85
}
```"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeIssue {
    pub file: String,
    pub line: u32,
    pub message: String,
    pub category: String,
    pub severity: Severity,
    pub suggestion: Option<String>,
}

impl CodeIssue {
    pub fn to_comment(&self) -> ReviewComment {
        let mut body = format!("**[{}]** {}", self.category, self.message);
        if let Some(suggestion) = self.suggestion.as_deref().filter(|s| !s.trim().is_empty()) {
            body.push_str("\n\nSuggestion: ");
            body.push_str(suggestion);
        }
        ReviewComment {
            path: self.file.clone(),
            line: self.line,
            body,
            severity: self.severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub summary: String,
    pub issues: Vec<CodeIssue>,
    /// 0-100
    pub score: u8,
}

impl ReviewReport {
    /// Neutral result used whenever the review cannot be produced.
    pub fn unavailable(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            issues: Vec::new(),
            score: 100,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn comments(&self) -> Vec<ReviewComment> {
        self.issues.iter().map(CodeIssue::to_comment).collect()
    }

    /// Markdown summary posted as a general comment on the pull request.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("## AI Code Review\n\n");
        out.push_str(&format!("**Score:** {}/100\n\n", self.score));
        out.push_str(&self.summary);
        out.push('\n');

        if self.issues.is_empty() {
            out.push_str("\nNo issues found.\n");
            return out;
        }

        for (severity, heading) in [
            (Severity::Error, "Errors"),
            (Severity::Warning, "Warnings"),
            (Severity::Info, "Info"),
        ] {
            let issues: Vec<&CodeIssue> = self.issues.iter().filter(|i| i.severity == severity).collect();
            if issues.is_empty() {
                continue;
            }
            out.push_str(&format!("\n### {} ({})\n\n", heading, issues.len()));
            for issue in issues {
                out.push_str(&format!(
                    "- `{}:{}` **[{}]** {}\n",
                    issue.file, issue.line, issue.category, issue.message
                ));
                if let Some(suggestion) = issue.suggestion.as_deref().filter(|s| !s.trim().is_empty()) {
                    out.push_str(&format!("  - Suggestion: {}\n", suggestion));
                }
            }
        }
        out
    }
}

/// 100 minus 15 per error, 5 per warning and 1 per info, floored at 0.
pub fn deduction_score(issues: &[CodeIssue]) -> u8 {
    let penalty: u32 = issues
        .iter()
        .map(|i| match i.severity {
            Severity::Error => 15,
            Severity::Warning => 5,
            Severity::Info => 1,
        })
        .sum();
    100u32.saturating_sub(penalty) as u8
}

fn fenced_json() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid fence pattern"))
}

fn candidate_objects(content: &str, strict: bool) -> Vec<&str> {
    let mut candidates = Vec::new();
    if let Some(caps) = fenced_json().captures(content) {
        if let Some(m) = caps.get(1) {
            candidates.push(m.as_str());
        }
    }
    candidates.push(content.trim());
    if !strict {
        if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
            if start < end {
                candidates.push(&content[start..=end]);
            }
        }
    }
    candidates
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn line_field(v: &Value) -> u32 {
    match v.get("line") {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn issue_from(v: &Value) -> CodeIssue {
    CodeIssue {
        file: string_field(v, "file").unwrap_or_default(),
        line: line_field(v),
        message: string_field(v, "message").unwrap_or_default(),
        category: string_field(v, "category").unwrap_or_else(|| "quality".to_string()),
        severity: string_field(v, "severity")
            .map(|s| Severity::from_label(&s))
            .unwrap_or_default(),
        suggestion: string_field(v, "suggestion"),
    }
}

/// Parse model output into a report. Strict mode only accepts a JSON body,
/// bare or in a fenced block; lenient mode also digs the outermost `{...}`
/// out of surrounding prose. `None` when nothing parses.
pub fn parse_review(content: &str, strict: bool) -> Option<ReviewReport> {
    let data = candidate_objects(content, strict)
        .into_iter()
        .find_map(|c| serde_json::from_str::<Value>(c).ok().filter(Value::is_object))?;

    let issues: Vec<CodeIssue> = data
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|v| v.is_object()).map(issue_from).collect())
        .unwrap_or_default();

    let score = match data.get("score").and_then(Value::as_f64) {
        Some(s) => s.clamp(0.0, 100.0).round() as u8,
        None => deduction_score(&issues),
    };

    Some(ReviewReport {
        summary: string_field(&data, "summary").unwrap_or_else(|| "Review complete.".to_string()),
        issues,
        score,
    })
}

/// Reviews diffs through an `AiClient`. Never fails: any backend or parse
/// problem yields a neutral report.
pub struct CodeReviewer<'a> {
    client: &'a AiClient,
    strict: bool,
}

impl<'a> CodeReviewer<'a> {
    pub fn new(client: &'a AiClient, strict: bool) -> Self {
        Self { client, strict }
    }

    pub fn review_diff(&self, diff: &str) -> ReviewReport {
        if diff.trim().is_empty() {
            return ReviewReport::unavailable("No changes to review.");
        }
        let prompt = CODE_REVIEW_PROMPT.replace("{diff}", &self.client.sanitize(diff));
        let content = match self.client.complete(REVIEW_SYSTEM, &prompt, REVIEW_MAX_TOKENS) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "AI review failed");
                return ReviewReport::unavailable(&format!("Review failed: {}", e));
            }
        };
        match parse_review(&content, self.strict) {
            Some(report) => {
                tracing::info!(score = report.score, issues = report.issues.len(), "AI review complete");
                report
            }
            None => {
                tracing::warn!(strict = self.strict, "could not parse AI review output");
                ReviewReport::unavailable(UNPARSEABLE_SUMMARY)
            }
        }
    }
}
