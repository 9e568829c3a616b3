//! Posting review comments on pull requests.

mod gitee;
mod github;

pub use gitee::GiteeComments;
pub use github::GitHubComments;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// Ordered by posting priority: errors first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    #[default]
    Info,
}

impl Severity {
    /// Lenient parse for model output; anything unrecognised is `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "error" | "critical" | "high" => Severity::Error,
            "warning" | "warn" | "medium" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One comment produced by a review run. An empty `path` or a zero `line`
/// makes it a general comment on the request instead of an inline one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub path: String,
    pub line: u32,
    pub body: String,
    pub severity: Severity,
}

impl ReviewComment {
    pub fn location(&self) -> Option<(&str, u32)> {
        if self.path.is_empty() || self.line == 0 {
            None
        } else {
            Some((&self.path, self.line))
        }
    }
}

/// Post `comments` most severe first through `post`. Failures are logged and
/// left out of the returned ids; the rest of the batch still goes out.
pub fn post_in_severity_order<F>(comments: &[ReviewComment], mut post: F) -> Vec<String>
where
    F: FnMut(&ReviewComment) -> Result<String, ProviderError>,
{
    let mut ordered: Vec<&ReviewComment> = comments.iter().collect();
    ordered.sort_by_key(|c| c.severity);

    let mut ids = Vec::with_capacity(ordered.len());
    for comment in ordered {
        match post(comment) {
            Ok(id) => ids.push(id),
            Err(e) => {
                tracing::warn!(path = %comment.path, line = comment.line, error = %e, "failed to post review comment, skipping");
            }
        }
    }
    ids
}

/// Comment ids come back as numbers from some hosts and strings from others.
pub(crate) fn comment_id(created: &Value) -> Result<String, ProviderError> {
    match created.get("id") {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(ProviderError::CommentPublishFailed(
            "response did not include a comment id".to_string(),
        )),
    }
}

/// The supported comment hosts, selected by `comment_provider`.
#[derive(Debug)]
pub enum ReviewCommentProvider {
    GitHub(GitHubComments),
    Gitee(GiteeComments),
}

impl ReviewCommentProvider {
    pub fn from_key(
        key: &str,
        token: &str,
        repo_url: &str,
        api_base: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let key = key.to_ascii_lowercase();
        if !matches!(key.as_str(), "github" | "gitee") {
            return Err(ProviderError::Unsupported(key));
        }
        if token.trim().is_empty() {
            return Err(ProviderError::MissingCredential(key));
        }
        match key.as_str() {
            "github" => Ok(ReviewCommentProvider::GitHub(GitHubComments::new(token, repo_url, api_base)?)),
            "gitee" => Ok(ReviewCommentProvider::Gitee(GiteeComments::new(token, repo_url, api_base)?)),
            other => Err(ProviderError::Unsupported(other.to_string())),
        }
    }

    fn head_sha(&self, pr_number: u64) -> Result<String, ProviderError> {
        match self {
            ReviewCommentProvider::GitHub(p) => p.head_sha(pr_number),
            ReviewCommentProvider::Gitee(p) => p.head_sha(pr_number),
        }
    }

    fn post_general(&self, pr_number: u64, body: &str) -> Result<String, ProviderError> {
        match self {
            ReviewCommentProvider::GitHub(p) => p.post_general(pr_number, body),
            ReviewCommentProvider::Gitee(p) => p.post_general(pr_number, body),
        }
    }

    fn post_inline(&self, pr_number: u64, head_sha: &str, body: &str, path: &str, line: u32) -> Result<String, ProviderError> {
        match self {
            ReviewCommentProvider::GitHub(p) => p.post_inline(pr_number, head_sha, body, path, line),
            ReviewCommentProvider::Gitee(p) => p.post_inline(pr_number, head_sha, body, path, line),
        }
    }

    /// Post one comment; `location` makes it inline. Returns the comment id.
    pub fn create_comment(
        &self,
        pr_number: u64,
        body: &str,
        location: Option<(&str, u32)>,
    ) -> Result<String, ProviderError> {
        match location {
            Some((path, line)) => {
                let sha = self.head_sha(pr_number)?;
                self.post_inline(pr_number, &sha, body, path, line)
            }
            None => self.post_general(pr_number, body),
        }
    }

    /// Post every comment, errors first. Never fails as a whole; the returned
    /// ids cover only the comments that were accepted.
    pub fn create_batch(&self, pr_number: u64, comments: &[ReviewComment]) -> Vec<String> {
        let mut head_sha: Option<String> = None;
        let ids = post_in_severity_order(comments, |comment| match comment.location() {
            None => self.post_general(pr_number, &comment.body),
            Some((path, line)) => {
                let sha = match &head_sha {
                    Some(sha) => sha.clone(),
                    None => {
                        let sha = self.head_sha(pr_number)?;
                        head_sha = Some(sha.clone());
                        sha
                    }
                };
                self.post_inline(pr_number, &sha, &comment.body, path, line)
            }
        });
        tracing::info!(pr_number, posted = ids.len(), total = comments.len(), "review comments posted");
        ids
    }

    /// `Ok(false)` when the comment no longer exists.
    pub fn delete_comment(&self, comment_id: &str) -> Result<bool, ProviderError> {
        match self {
            ReviewCommentProvider::GitHub(p) => p.delete_comment(comment_id),
            ReviewCommentProvider::Gitee(p) => p.delete_comment(comment_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(path: &str, severity: Severity) -> ReviewComment {
        ReviewComment {
            path: path.to_string(),
            line: 1,
            body: format!("{} issue", severity),
            severity,
        }
    }

    #[test]
    fn severity_orders_errors_first() {
        let mut all = vec![Severity::Info, Severity::Error, Severity::Warning];
        all.sort();
        assert_eq!(all, vec![Severity::Error, Severity::Warning, Severity::Info]);
    }

    #[test]
    fn from_label_defaults_to_info() {
        assert_eq!(Severity::from_label("ERROR"), Severity::Error);
        assert_eq!(Severity::from_label("warning"), Severity::Warning);
        assert_eq!(Severity::from_label("nit"), Severity::Info);
    }

    #[test]
    fn batch_posts_in_severity_order() {
        let comments = vec![
            comment("a.rs", Severity::Info),
            comment("b.rs", Severity::Error),
            comment("c.rs", Severity::Warning),
        ];
        let mut seen = Vec::new();
        let ids = post_in_severity_order(&comments, |c| {
            seen.push(c.path.clone());
            Ok(c.path.clone())
        });
        assert_eq!(seen, vec!["b.rs", "c.rs", "a.rs"]);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn batch_skips_failures() {
        let comments: Vec<_> = (0..5)
            .map(|i| comment(&format!("f{}.rs", i), Severity::Warning))
            .collect();
        let ids = post_in_severity_order(&comments, |c| {
            if c.path == "f1.rs" || c.path == "f3.rs" {
                Err(ProviderError::CommentPublishFailed("rejected".to_string()))
            } else {
                Ok(c.path.clone())
            }
        });
        assert_eq!(ids, vec!["f0.rs", "f2.rs", "f4.rs"]);
    }

    #[test]
    fn location_requires_path_and_line() {
        let mut c = comment("a.rs", Severity::Info);
        assert_eq!(c.location(), Some(("a.rs", 1)));
        c.line = 0;
        assert_eq!(c.location(), None);
    }
}
