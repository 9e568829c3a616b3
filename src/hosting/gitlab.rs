use std::cell::OnceCell;

use serde::Deserialize;
use serde_json::json;

use super::{PullRequestInfo, RepoUrl};
use crate::error::{HttpError, ProviderError};
use crate::http::{self, JsonClient};

#[derive(Debug, Clone, Deserialize)]
struct Project {
    id: u64,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    title: String,
    web_url: String,
    state: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    merge_status: Option<String>,
}

impl From<MergeRequest> for PullRequestInfo {
    fn from(mr: MergeRequest) -> Self {
        Self {
            number: mr.iid,
            title: mr.title,
            url: mr.web_url,
            state: mr.state,
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
        }
    }
}

/// Project paths go into the URL as one segment.
fn encode_project_path(path: &str) -> String {
    path.replace('/', "%2F")
}

/// GitLab REST v4 merge requests, addressed by project id once resolved.
#[derive(Debug)]
pub struct GitLabHosting {
    client: JsonClient,
    repo_url: RepoUrl,
    project: OnceCell<Project>,
}

impl GitLabHosting {
    pub fn new(token: &str, repo_url: &str, api_base: Option<&str>) -> Result<Self, ProviderError> {
        if token.trim().is_empty() {
            return Err(ProviderError::MissingCredential("gitlab".to_string()));
        }
        let repo_url = RepoUrl::parse(repo_url)?;
        let base = match api_base {
            Some(base) => base.to_string(),
            None => format!("{}://{}/api/v4", repo_url.scheme, repo_url.host),
        };
        let client = JsonClient::new(&base).with_header("PRIVATE-TOKEN", token);
        Ok(Self {
            client,
            repo_url,
            project: OnceCell::new(),
        })
    }

    fn project(&self) -> Result<&Project, ProviderError> {
        if let Some(project) = self.project.get() {
            return Ok(project);
        }
        let path = format!("/projects/{}", encode_project_path(&self.repo_url.full_path()));
        let project: Project = self.client.get(&path)?;
        tracing::debug!(project_id = project.id, "resolved gitlab project");
        Ok(self.project.get_or_init(|| project))
    }

    fn merge_requests_path(&self) -> Result<String, ProviderError> {
        Ok(format!("/projects/{}/merge_requests", self.project()?.id))
    }

    fn fetch_merge_request(&self, iid: u64) -> Result<MergeRequest, ProviderError> {
        let path = format!("{}/{}", self.merge_requests_path()?, iid);
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
            "source_branch": source_branch,
            "target_branch": target_branch,
            "title": title,
            "description": description,
        });
        let mr: MergeRequest = self
            .client
            .post(&self.merge_requests_path()?, &body)
            .map_err(|e| match e {
                HttpError::Transport(msg) => ProviderError::Unreachable(msg),
                other => ProviderError::PrCreationFailed(http::error_message(&other)),
            })?;
        Ok(mr.into())
    }

    pub fn get_pull_request(&self, iid: u64) -> Result<Option<PullRequestInfo>, ProviderError> {
        match self.fetch_merge_request(iid) {
            Ok(mr) => Ok(Some(mr.into())),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn merge_pull_request(&self, iid: u64, commit_message: Option<&str>) -> Result<(), ProviderError> {
        let mut body = json!({});
        if let Some(message) = commit_message.filter(|m| !m.trim().is_empty()) {
            body["merge_commit_message"] = json!(message);
        }
        let path = format!("{}/{}/merge", self.merge_requests_path()?, iid);
        self.client
            .put::<serde_json::Value>(&path, &body)
            .map_err(|e| match e {
                HttpError::Transport(msg) => ProviderError::Unreachable(msg),
                other => ProviderError::RequestFailed(format!(
                    "failed to merge MR !{}: {}",
                    iid,
                    http::error_message(&other)
                )),
            })?;
        Ok(())
    }

    pub fn default_branch(&self) -> Result<String, ProviderError> {
        Ok(self
            .project()?
            .default_branch
            .clone()
            .unwrap_or_else(|| "main".to_string()))
    }

    pub fn is_mergeable(&self, iid: u64) -> Result<bool, ProviderError> {
        let mr = self.fetch_merge_request(iid)?;
        let status_ok = matches!(
            mr.merge_status.as_deref(),
            Some("can_be_merged") | Some("unchecked")
        );
        Ok(mr.state == "opened" && status_ok)
    }

    pub fn find_open_pull_request(&self, branch: &str) -> Result<Option<PullRequestInfo>, ProviderError> {
        let mrs: Vec<MergeRequest> = self.client.get_with_query(
            &self.merge_requests_path()?,
            &[("state", "opened"), ("source_branch", branch)],
        )?;
        Ok(mrs.into_iter().next().map(PullRequestInfo::from))
    }
}
