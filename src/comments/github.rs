use serde::Deserialize;
use serde_json::{json, Value};

use super::comment_id;
use crate::error::{HttpError, ProviderError};
use crate::hosting::RepoUrl;
use crate::http::{self, JsonClient};

const PUBLIC_API: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct Head {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Pull {
    head: Head,
}

fn publish_error(e: HttpError) -> ProviderError {
    match e {
        HttpError::Transport(msg) => ProviderError::Unreachable(msg),
        other => ProviderError::CommentPublishFailed(http::error_message(&other)),
    }
}

/// Summary comments go on the issue thread, inline comments on the diff.
#[derive(Debug)]
pub struct GitHubComments {
    client: JsonClient,
    repo_path: String,
}

impl GitHubComments {
    pub fn new(token: &str, repo_url: &str, api_base: Option<&str>) -> Result<Self, ProviderError> {
        let url = RepoUrl::parse(repo_url)?;
        let base = match api_base {
            Some(base) => base.to_string(),
            None if url.host == "github.com" => PUBLIC_API.to_string(),
            None => format!("{}://{}/api/v3", url.scheme, url.host),
        };
        let client = JsonClient::new(&base)
            .with_header("Authorization", &format!("Bearer {}", token))
            .with_header("Accept", "application/vnd.github+json")
            .with_header("X-GitHub-Api-Version", "2022-11-28");
        Ok(Self {
            client,
            repo_path: format!("/repos/{}", url.full_path()),
        })
    }

    pub(super) fn head_sha(&self, pr_number: u64) -> Result<String, ProviderError> {
        let pull: Pull = self
            .client
            .get(&format!("{}/pulls/{}", self.repo_path, pr_number))?;
        Ok(pull.head.sha)
    }

    pub(super) fn post_general(&self, pr_number: u64, body: &str) -> Result<String, ProviderError> {
        let created: Value = self
            .client
            .post(
                &format!("{}/issues/{}/comments", self.repo_path, pr_number),
                &json!({ "body": body }),
            )
            .map_err(publish_error)?;
        comment_id(&created)
    }

    pub(super) fn post_inline(
        &self,
        pr_number: u64,
        head_sha: &str,
        body: &str,
        path: &str,
        line: u32,
    ) -> Result<String, ProviderError> {
        let created: Value = self
            .client
            .post(
                &format!("{}/pulls/{}/comments", self.repo_path, pr_number),
                &json!({
                    "body": body,
                    "commit_id": head_sha,
                    "path": path,
                    "line": line,
                    "side": "RIGHT",
                }),
            )
            .map_err(publish_error)?;
        comment_id(&created)
    }

    /// Review and issue comments share one id space; try both endpoints.
    pub(super) fn delete_comment(&self, comment_id: &str) -> Result<bool, ProviderError> {
        for kind in ["issues", "pulls"] {
            let path = format!("{}/{}/comments/{}", self.repo_path, kind, comment_id);
            match self.client.delete(&path) {
                Ok(()) => return Ok(true),
                Err(HttpError::Status { code: 404, .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }
}
