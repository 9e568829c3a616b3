//! Pull/merge request operations against a hosted git provider.

mod github;
mod gitlab;

pub use github::GitHubHosting;
pub use gitlab::GitLabHosting;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Read-through view of a pull/merge request; never cached locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
}

/// `https://host/owner/.../repo` split into its parts. GitLab allows nested
/// groups, so `namespace` may contain slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    pub scheme: String,
    pub host: String,
    pub namespace: String,
    pub name: String,
}

impl RepoUrl {
    pub fn parse(url: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::InvalidRepositoryUrl(url.to_string());
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let (namespace, name) = path.rsplit_once('/').ok_or_else(invalid)?;
        if host.is_empty() || namespace.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// `namespace/name`
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// The supported hosting styles, selected by `git_provider`.
#[derive(Debug)]
pub enum HostingProvider {
    GitHub(GitHubHosting),
    GitLab(GitLabHosting),
}

impl HostingProvider {
    /// Build the provider for `key`. `api_base` overrides the public API
    /// endpoint (self-hosted instances).
    pub fn from_key(
        key: &str,
        token: &str,
        repo_url: &str,
        api_base: Option<&str>,
    ) -> Result<Self, ProviderError> {
        match key.to_ascii_lowercase().as_str() {
            "github" => Ok(HostingProvider::GitHub(GitHubHosting::new(token, repo_url, api_base)?)),
            "gitlab" => Ok(HostingProvider::GitLab(GitLabHosting::new(token, repo_url, api_base)?)),
            other => Err(ProviderError::Unsupported(other.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            HostingProvider::GitHub(_) => "github",
            HostingProvider::GitLab(_) => "gitlab",
        }
    }

    pub fn create_pull_request(
        &self,
        title: &str,
        source_branch: &str,
        target_branch: &str,
        description: &str,
    ) -> Result<PullRequestInfo, ProviderError> {
        tracing::info!(provider = self.key(), source_branch, target_branch, "creating pull request");
        match self {
            HostingProvider::GitHub(p) => p.create_pull_request(title, source_branch, target_branch, description),
            HostingProvider::GitLab(p) => p.create_pull_request(title, source_branch, target_branch, description),
        }
    }

    /// `Ok(None)` when the request does not exist.
    pub fn get_pull_request(&self, number: u64) -> Result<Option<PullRequestInfo>, ProviderError> {
        match self {
            HostingProvider::GitHub(p) => p.get_pull_request(number),
            HostingProvider::GitLab(p) => p.get_pull_request(number),
        }
    }

    pub fn merge_pull_request(&self, number: u64, commit_message: Option<&str>) -> Result<(), ProviderError> {
        tracing::info!(provider = self.key(), number, "merging pull request");
        match self {
            HostingProvider::GitHub(p) => p.merge_pull_request(number, commit_message),
            HostingProvider::GitLab(p) => p.merge_pull_request(number, commit_message),
        }
    }

    pub fn default_branch(&self) -> Result<String, ProviderError> {
        match self {
            HostingProvider::GitHub(p) => p.default_branch(),
            HostingProvider::GitLab(p) => p.default_branch(),
        }
    }

    /// False for a missing request instead of an error.
    pub fn is_mergeable(&self, number: u64) -> Result<bool, ProviderError> {
        let result = match self {
            HostingProvider::GitHub(p) => p.is_mergeable(number),
            HostingProvider::GitLab(p) => p.is_mergeable(number),
        };
        match result {
            Err(ProviderError::NotFound(_)) => Ok(false),
            other => other,
        }
    }

    /// The open request whose source is `branch`, if any.
    pub fn find_open_pull_request(&self, branch: &str) -> Result<Option<PullRequestInfo>, ProviderError> {
        match self {
            HostingProvider::GitHub(p) => p.find_open_pull_request(branch),
            HostingProvider::GitLab(p) => p.find_open_pull_request(branch),
        }
    }
}

/// Manual compare URL for `key`'s hosting style. GitLab gets the merge
/// request form; everything else gets the GitHub compare page.
pub fn compare_url(key: &str, remote_url: &str, main_branch: &str, branch: &str) -> String {
    let remote = remote_url.trim_end_matches('/');
    if key.eq_ignore_ascii_case("gitlab") {
        format!(
            "{}/-/merge_requests/new?merge_request[source_branch]={}&merge_request[target_branch]={}",
            remote, branch, main_branch
        )
    } else {
        format!("{}/compare/{}...{}?expand=1", remote, main_branch, branch)
    }
}
