mod helpers;

use cortex::error::ProviderError;
use cortex::hosting::HostingProvider;
use helpers::json_mock;
use mockito::{Matcher, Server};
use serde_json::json;

const GH_REPO: &str = r#"{"full_name":"acme/widgets","default_branch":"trunk"}"#;
const NOT_FOUND: &str = r#"{"message":"Not Found"}"#;

fn gh_pull(number: u64, state: &str, mergeable: Option<bool>) -> String {
    json!({
        "number": number,
        "title": "[Task #7] Fix null check",
        "html_url": format!("https://github.com/acme/widgets/pull/{}", number),
        "state": state,
        "head": {"ref": "bug/task-7-a1b2c3d4", "sha": "abc123"},
        "base": {"ref": "main"},
        "mergeable": mergeable,
    })
    .to_string()
}

fn github(server: &Server) -> HostingProvider {
    HostingProvider::from_key("github", "ghp_token", "https://github.com/acme/widgets", Some(&server.url())).unwrap()
}

#[test]
fn github_create_pull_request() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/repos/acme/widgets", 200, GH_REPO);
    let create = server
        .mock("POST", "/repos/acme/widgets/pulls")
        .match_header("authorization", "Bearer ghp_token")
        .match_header("accept", "application/vnd.github+json")
        .match_body(Matcher::Json(json!({
            "title": "[Task #7] Fix null check",
            "body": "Task #7",
            "head": "bug/task-7-a1b2c3d4",
            "base": "main",
        })))
        .with_status(201)
        .with_body(gh_pull(12, "open", None))
        .create();
    let provider = github(&server);

    let pr = provider
        .create_pull_request("[Task #7] Fix null check", "bug/task-7-a1b2c3d4", "main", "Task #7")
        .unwrap();
    assert_eq!(pr.number, 12);
    assert_eq!(pr.source_branch, "bug/task-7-a1b2c3d4");
    assert_eq!(pr.target_branch, "main");
    assert_eq!(pr.url, "https://github.com/acme/widgets/pull/12");
    create.assert();
}

#[test]
fn github_repository_is_resolved_once() {
    let mut server = Server::new();
    let repo = server
        .mock("GET", "/repos/acme/widgets")
        .expect(1)
        .with_status(200)
        .with_body(GH_REPO)
        .create();
    json_mock(&mut server, "GET", "/repos/acme/widgets/pulls/12", 200, &gh_pull(12, "open", Some(true)));
    let provider = github(&server);

    assert_eq!(provider.default_branch().unwrap(), "trunk");
    assert!(provider.get_pull_request(12).unwrap().is_some());
    assert!(provider.is_mergeable(12).unwrap());
    repo.assert();
}

#[test]
fn github_rejection_is_pr_creation_failed() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/repos/acme/widgets", 200, GH_REPO);
    json_mock(
        &mut server,
        "POST",
        "/repos/acme/widgets/pulls",
        422,
        r#"{"message":"A pull request already exists for acme:bug/task-7-a1b2c3d4."}"#,
    );
    let provider = github(&server);

    let err = provider
        .create_pull_request("t", "bug/task-7-a1b2c3d4", "main", "")
        .unwrap_err();
    match err {
        ProviderError::PrCreationFailed(msg) => assert!(msg.contains("already exists")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn github_mergeability() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/repos/acme/widgets", 200, GH_REPO);
    json_mock(&mut server, "GET", "/repos/acme/widgets/pulls/1", 200, &gh_pull(1, "open", Some(false)));
    json_mock(&mut server, "GET", "/repos/acme/widgets/pulls/2", 200, &gh_pull(2, "closed", Some(true)));
    json_mock(&mut server, "GET", "/repos/acme/widgets/pulls/99", 404, NOT_FOUND);
    let provider = github(&server);

    assert!(!provider.is_mergeable(1).unwrap());
    assert!(!provider.is_mergeable(2).unwrap());
    // Unknown request: false, not an error.
    assert!(!provider.is_mergeable(99).unwrap());
    assert!(provider.get_pull_request(99).unwrap().is_none());
}

#[test]
fn github_find_open_pull_request_by_branch() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/repos/acme/widgets", 200, GH_REPO);
    let list = server
        .mock("GET", "/repos/acme/widgets/pulls")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "open".into()),
            Matcher::UrlEncoded("head".into(), "acme:bug/task-7-a1b2c3d4".into()),
        ]))
        .with_status(200)
        .with_body(format!("[{}]", gh_pull(12, "open", None)))
        .create();
    let provider = github(&server);

    let pr = provider.find_open_pull_request("bug/task-7-a1b2c3d4").unwrap().unwrap();
    assert_eq!(pr.number, 12);
    list.assert();
}

#[test]
fn github_merge_pull_request() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/repos/acme/widgets", 200, GH_REPO);
    json_mock(&mut server, "GET", "/repos/acme/widgets/pulls/12", 200, &gh_pull(12, "open", Some(true)));
    let merge = server
        .mock("PUT", "/repos/acme/widgets/pulls/12/merge")
        .match_body(Matcher::Json(json!({
            "commit_message": "Merge pull request #12: [Task #7] Fix null check"
        })))
        .with_status(200)
        .with_body(r#"{"merged":true}"#)
        .create();
    let provider = github(&server);

    provider.merge_pull_request(12, None).unwrap();
    merge.assert();
}

const GL_PROJECT: &str = r#"{"id":77,"default_branch":"main","path_with_namespace":"team/widgets"}"#;

fn gl_mr(iid: u64, state: &str, merge_status: &str) -> String {
    json!({
        "iid": iid,
        "title": "[Task #7] Fix null check",
        "web_url": format!("https://gitlab.com/team/widgets/-/merge_requests/{}", iid),
        "state": state,
        "source_branch": "bug/task-7-a1b2c3d4",
        "target_branch": "main",
        "merge_status": merge_status,
    })
    .to_string()
}

fn gitlab(server: &Server) -> HostingProvider {
    HostingProvider::from_key("gitlab", "glpat-token", "https://gitlab.com/team/widgets", Some(&server.url())).unwrap()
}

#[test]
fn gitlab_create_merge_request() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/projects/team%2Fwidgets", 200, GL_PROJECT);
    let create = server
        .mock("POST", "/projects/77/merge_requests")
        .match_header("private-token", "glpat-token")
        .match_body(Matcher::PartialJson(json!({
            "source_branch": "bug/task-7-a1b2c3d4",
            "target_branch": "main",
            "description": "desc",
        })))
        .with_status(201)
        .with_body(gl_mr(5, "opened", "checking"))
        .create();
    let provider = gitlab(&server);

    let mr = provider
        .create_pull_request("[Task #7] Fix null check", "bug/task-7-a1b2c3d4", "main", "desc")
        .unwrap();
    assert_eq!(mr.number, 5);
    assert_eq!(mr.source_branch, "bug/task-7-a1b2c3d4");
    create.assert();
}

#[test]
fn gitlab_mergeability() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/projects/team%2Fwidgets", 200, GL_PROJECT);
    json_mock(&mut server, "GET", "/projects/77/merge_requests/1", 200, &gl_mr(1, "opened", "can_be_merged"));
    json_mock(&mut server, "GET", "/projects/77/merge_requests/2", 200, &gl_mr(2, "opened", "unchecked"));
    json_mock(&mut server, "GET", "/projects/77/merge_requests/3", 200, &gl_mr(3, "opened", "cannot_be_merged"));
    json_mock(&mut server, "GET", "/projects/77/merge_requests/4", 200, &gl_mr(4, "merged", "can_be_merged"));
    json_mock(&mut server, "GET", "/projects/77/merge_requests/404", 404, r#"{"message":"404 Not found"}"#);
    let provider = gitlab(&server);

    assert!(provider.is_mergeable(1).unwrap());
    assert!(provider.is_mergeable(2).unwrap());
    assert!(!provider.is_mergeable(3).unwrap());
    assert!(!provider.is_mergeable(4).unwrap());
    assert!(!provider.is_mergeable(404).unwrap());
    assert_eq!(provider.default_branch().unwrap(), "main");
}

#[test]
fn gitlab_find_open_merge_request_by_branch() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/projects/team%2Fwidgets", 200, GL_PROJECT);
    server
        .mock("GET", "/projects/77/merge_requests")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "opened".into()),
            Matcher::UrlEncoded("source_branch".into(), "bug/task-7-a1b2c3d4".into()),
        ]))
        .with_status(200)
        .with_body("[]")
        .create();
    let provider = gitlab(&server);

    assert!(provider.find_open_pull_request("bug/task-7-a1b2c3d4").unwrap().is_none());
}

#[test]
fn gitlab_rejection_is_pr_creation_failed() {
    let mut server = Server::new();
    json_mock(&mut server, "GET", "/projects/team%2Fwidgets", 200, GL_PROJECT);
    json_mock(
        &mut server,
        "POST",
        "/projects/77/merge_requests",
        409,
        r#"{"message":["Another open merge request already exists for this source branch"]}"#,
    );
    let provider = gitlab(&server);

    let err = provider.create_pull_request("t", "b", "main", "").unwrap_err();
    assert!(matches!(err, ProviderError::PrCreationFailed(msg) if msg.contains("already exists")));
}

#[test]
fn provider_requires_token_and_valid_url() {
    assert!(matches!(
        HostingProvider::from_key("github", "", "https://github.com/acme/widgets", None),
        Err(ProviderError::MissingCredential(_))
    ));
    assert!(matches!(
        HostingProvider::from_key("gitlab", "t", "not a url", None),
        Err(ProviderError::InvalidRepositoryUrl(_))
    ));
}
