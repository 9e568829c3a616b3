use std::cell::OnceCell;

use serde::Deserialize;
use serde_json::json;

use super::{PullRequestInfo, RepoUrl};
use crate::error::{HttpError, ProviderError};
use crate::http::{self, JsonClient};

const PUBLIC_API: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
struct Repository {
    full_name: String,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Pull {
    number: u64,
    title: String,
    html_url: String,
    state: String,
    head: BranchRef,
    base: BranchRef,
    #[serde(default)]
    mergeable: Option<bool>,
}

impl From<Pull> for PullRequestInfo {
    fn from(p: Pull) -> Self {
        Self {
            number: p.number,
            title: p.title,
            url: p.html_url,
            state: p.state,
            source_branch: p.head.name,
            target_branch: p.base.name,
        }
    }
}

/// GitHub REST v3. The repository is looked up on first use and kept for the
/// lifetime of the provider.
#[derive(Debug)]
pub struct GitHubHosting {
    client: JsonClient,
    repo_url: RepoUrl,
    repo: OnceCell<Repository>,
}

impl GitHubHosting {
    pub fn new(token: &str, repo_url: &str, api_base: Option<&str>) -> Result<Self, ProviderError> {
        if token.trim().is_empty() {
            return Err(ProviderError::MissingCredential("github".to_string()));
        }
        let repo_url = RepoUrl::parse(repo_url)?;
        let base = match api_base {
            Some(base) => base.to_string(),
            None if repo_url.host == "github.com" => PUBLIC_API.to_string(),
            // GitHub Enterprise
            None => format!("{}://{}/api/v3", repo_url.scheme, repo_url.host),
        };
        let client = JsonClient::new(&base)
            .with_header("Authorization", &format!("Bearer {}", token))
            .with_header("Accept", "application/vnd.github+json")
            .with_header("X-GitHub-Api-Version", "2022-11-28");
        Ok(Self {
            client,
            repo_url,
            repo: OnceCell::new(),
        })
    }

    fn repo(&self) -> Result<&Repository, ProviderError> {
        if let Some(repo) = self.repo.get() {
            return Ok(repo);
        }
        let path = format!("/repos/{}", self.repo_url.full_path());
        let repo: Repository = self.client.get(&path)?;
        tracing::debug!(repo = %repo.full_name, "resolved github repository");
        Ok(self.repo.get_or_init(|| repo))
    }

    fn pulls_path(&self) -> Result<String, ProviderError> {
        Ok(format!("/repos/{}/pulls", self.repo()?.full_name))
    }

    fn fetch_pull(&self, number: u64) -> Result<Pull, ProviderError> {
        let path = format!("{}/{}", self.pulls_path()?, number);
        Ok(self.client.get(&path)?)
    }

    pub fn create_pull_request(
        &self,
        title: &str,
        source_branch: &str,
        target_branch: &str,
        description: &str,
    ) -> Result<PullRequestInfo, ProviderError> {
        let body = json!({
            "title": title,
            "body": description,
            "head": source_branch,
            "base": target_branch,
        });
        let pull: Pull = self
            .client
            .post(&self.pulls_path()?, &body)
            .map_err(|e| match e {
                HttpError::Transport(msg) => ProviderError::Unreachable(msg),
                other => ProviderError::PrCreationFailed(http::error_message(&other)),
            })?;
        Ok(pull.into())
    }

    pub fn get_pull_request(&self, number: u64) -> Result<Option<PullRequestInfo>, ProviderError> {
        match self.fetch_pull(number) {
            Ok(pull) => Ok(Some(pull.into())),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn merge_pull_request(&self, number: u64, commit_message: Option<&str>) -> Result<(), ProviderError> {
        let message = match commit_message {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => {
                let pull = self.fetch_pull(number)?;
                format!("Merge pull request #{}: {}", number, pull.title)
            }
        };
        let path = format!("{}/{}/merge", self.pulls_path()?, number);
        self.client
            .put::<serde_json::Value>(&path, &json!({ "commit_message": message }))
            .map_err(|e| match e {
                HttpError::Transport(msg) => ProviderError::Unreachable(msg),
                other => ProviderError::RequestFailed(format!(
                    "failed to merge PR #{}: {}",
                    number,
                    http::error_message(&other)
                )),
            })?;
        Ok(())
    }

    pub fn default_branch(&self) -> Result<String, ProviderError> {
        Ok(self.repo()?.default_branch.clone())
    }

    pub fn is_mergeable(&self, number: u64) -> Result<bool, ProviderError> {
        let pull = self.fetch_pull(number)?;
        Ok(pull.mergeable.unwrap_or(false) && pull.state == "open")
    }

    pub fn find_open_pull_request(&self, branch: &str) -> Result<Option<PullRequestInfo>, ProviderError> {
        let head = format!("{}:{}", self.repo_url.namespace, branch);
        let pulls: Vec<Pull> = self
            .client
            .get_with_query(&self.pulls_path()?, &[("state", "open"), ("head", &head)])?;
        Ok(pulls.into_iter().next().map(PullRequestInfo::from))
    }
}
