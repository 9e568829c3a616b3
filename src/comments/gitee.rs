use serde::Deserialize;
use serde_json::{json, Value};

use super::comment_id;
use crate::error::{HttpError, ProviderError};
use crate::hosting::RepoUrl;
use crate::http::{self, JsonClient};

const PUBLIC_API: &str = "https://gitee.com/api/v5";

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

/// Gitee API v5. Authenticates with `Authorization: token <token>`.
#[derive(Debug)]
pub struct GiteeComments {
    client: JsonClient,
    repo_path: String,
}

impl GiteeComments {
    pub fn new(token: &str, repo_url: &str, api_base: Option<&str>) -> Result<Self, ProviderError> {
        let url = RepoUrl::parse(repo_url)?;
        let client = JsonClient::new(api_base.unwrap_or(PUBLIC_API))
            .with_header("Authorization", &format!("token {}", token));
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
        // Gitee expects the line number as a string.
        let created: Value = self
            .client
            .post(
                &format!("{}/pulls/{}/comments", self.repo_path, pr_number),
                &json!({
                    "body": body,
                    "path": path,
                    "line": line.to_string(),
                    "commit_id": head_sha,
                }),
            )
            .map_err(publish_error)?;
        comment_id(&created)
    }

    pub(super) fn delete_comment(&self, comment_id: &str) -> Result<bool, ProviderError> {
        match self
            .client
            .delete(&format!("{}/comments/{}", self.repo_path, comment_id))
        {
            Ok(()) => Ok(true),
            Err(HttpError::Status { code: 404, .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
