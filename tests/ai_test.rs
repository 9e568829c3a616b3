mod helpers;

use cortex::ai::review::UNPARSEABLE_SUMMARY;
use cortex::ai::{AiClient, CodeReviewer};
use cortex::comments::Severity;
use cortex::error::AiError;
use helpers::{chat_reply, json_mock, local_ai, test_settings};
use mockito::{Matcher, Server};
use serde_json::json;

const DIFF: &str = "\
diff --git a/src/client.rs b/src/client.rs
+    let api_key = \"sk-live1234567890abcdefXYZ\";
+    let token = ghp_abcdefghijklmnop1234;
+    if user.is_none() { return; }
";

#[test]
fn commit_message_from_chat_completions() {
    let mut server = Server::new();
    let chat = server
        .mock("POST", "/chat/completions")
        // Local backends run without a key.
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({"model": "llama3", "max_tokens": 500})))
        .with_status(200)
        .with_body(chat_reply("```\nfix: guard against missing user\n```"))
        .create();
    let client = local_ai(&server);

    let message = client.generate_commit_message(DIFF, "Fix null check").unwrap();
    assert_eq!(message, "fix: guard against missing user");
    chat.assert();
}

#[test]
fn prompts_never_carry_secrets() {
    let mut server = Server::new();
    // Only a prompt with both secrets replaced in place is answered.
    let chat = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"api_key = \\"sk-\[FILTERED\]\\""#.to_string()),
            Matcher::Regex(r"token = (ghp_)?\[FILTERED\]".to_string()),
            Matcher::Regex(r"user\.is_none\(\)".to_string()),
        ]))
        .expect(2)
        .with_status(200)
        .with_body(chat_reply("fix: null check"))
        .create();
    let client = local_ai(&server);

    client.generate_commit_message(DIFF, "Fix null check").unwrap();
    client
        .generate_pr_description(DIFF, 7, "Fix null check", "bug", "Crash on logout")
        .unwrap();
    chat.assert();
}

#[test]
fn pr_description_prompt_mentions_task() {
    let mut server = Server::new();
    let chat = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r"Task #7".to_string()),
            Matcher::Regex(r"Crash on logout".to_string()),
        ]))
        .with_status(200)
        .with_body(chat_reply("  Adds a null check.\n\nTask #7  "))
        .create();
    let client = local_ai(&server);

    let description = client
        .generate_pr_description(DIFF, 7, "Fix null check", "bug", "Crash on logout")
        .unwrap();
    assert_eq!(description, "Adds a null check.\n\nTask #7");
    chat.assert();
}

#[test]
fn anthropic_messages_backend() {
    let mut server = Server::new();
    let messages = server
        .mock("POST", "/messages")
        .match_header("x-api-key", "anthropic-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "system": "You are a helpful commit message generator.",
            "model": "claude-sonnet-4-20250514",
        })))
        .with_status(200)
        .with_body(r#"{"content":[{"type":"text","text":"feat: add login page"}]}"#)
        .create();
    let mut settings = test_settings();
    settings.ai_provider = Some("anthropic".to_string());
    settings.ai_api_key = Some("anthropic-key".to_string());
    settings.ai_base_url = Some(server.url());
    let client = AiClient::from_settings(&settings).unwrap();

    assert_eq!(
        client.generate_commit_message("+login", "Login page").unwrap(),
        "feat: add login page"
    );
    messages.assert();
}

#[test]
fn template_placeholders_in_task_fields_are_not_expanded() {
    let mut server = Server::new();
    let chat = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r"Title: Fix \{diff\} rendering".to_string()))
        .with_status(200)
        .with_body(chat_reply("Fixes rendering."))
        .create();
    let client = local_ai(&server);

    client
        .generate_pr_description("+x", 3, "Fix {diff} rendering", "bug", "see {task_id}")
        .unwrap();
    chat.assert();
}

#[test]
fn empty_reply_is_an_error() {
    let mut server = Server::new();
    json_mock(&mut server, "POST", "/chat/completions", 200, &chat_reply("   "));
    let client = local_ai(&server);
    assert!(matches!(
        client.generate_commit_message(DIFF, "t"),
        Err(AiError::EmptyResponse)
    ));
}

#[test]
fn review_parses_fenced_json() {
    let mut server = Server::new();
    let content = "Here is the review:\n```json\n{\"summary\":\"One risky unwrap.\",\"issues\":[\
        {\"file\":\"src/client.rs\",\"line\":3,\"message\":\"possible panic\",\"category\":\"security\",\
        \"severity\":\"error\",\"suggestion\":\"return an error\"},\
        {\"file\":\"src/client.rs\",\"line\":\"4\",\"message\":\"early return hides state\",\
        \"category\":\"quality\",\"severity\":\"warning\"}],\"score\":72}\n```";
    let chat = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({"max_tokens": 2000})))
        .with_status(200)
        .with_body(chat_reply(content))
        .create();
    let client = local_ai(&server);

    let report = CodeReviewer::new(&client, true).review_diff(DIFF);
    assert_eq!(report.summary, "One risky unwrap.");
    assert_eq!(report.score, 72);
    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.issues[1].line, 4);
    assert_eq!(report.count(Severity::Error), 1);

    let comments = report.comments();
    assert_eq!(comments[0].location(), Some(("src/client.rs", 3)));
    assert!(comments[0].body.contains("Suggestion: return an error"));

    let markdown = report.to_markdown();
    assert!(markdown.contains("**Score:** 72/100"));
    chat.assert();
}

#[test]
fn review_score_is_computed_when_missing() {
    let mut server = Server::new();
    let content = r#"{"summary":"s","issues":[{"file":"a.rs","line":1,"message":"m","category":"quality","severity":"warning"},{"file":"a.rs","line":2,"message":"m","category":"quality","severity":"info"}]}"#;
    json_mock(&mut server, "POST", "/chat/completions", 200, &chat_reply(content));
    let client = local_ai(&server);

    let report = CodeReviewer::new(&client, false).review_diff(DIFF);
    assert_eq!(report.score, 94);
}

#[test]
fn review_strictness_controls_prose_extraction() {
    let mut server = Server::new();
    let content = r#"Overall fine. {"summary":"Looks good.","issues":[],"score":98} Thanks!"#;
    json_mock(&mut server, "POST", "/chat/completions", 200, &chat_reply(content));
    let client = local_ai(&server);

    let lenient = CodeReviewer::new(&client, false).review_diff(DIFF);
    assert_eq!(lenient.summary, "Looks good.");
    assert_eq!(lenient.score, 98);

    let strict = CodeReviewer::new(&client, true).review_diff(DIFF);
    assert_eq!(strict.summary, UNPARSEABLE_SUMMARY);
    assert_eq!(strict.score, 100);
    assert!(strict.issues.is_empty());
}

#[test]
fn review_degrades_on_backend_failure() {
    let mut server = Server::new();
    json_mock(&mut server, "POST", "/chat/completions", 500, r#"{"error":"model overloaded"}"#);
    let client = local_ai(&server);

    let report = CodeReviewer::new(&client, false).review_diff(DIFF);
    assert!(report.summary.starts_with("Review failed:"));
    assert_eq!(report.score, 100);
    assert!(report.issues.is_empty());
}

#[test]
fn review_of_empty_diff_skips_backend() {
    let mut server = Server::new();
    let chat = server.mock("POST", "/chat/completions").expect(0).create();
    let client = local_ai(&server);

    let report = CodeReviewer::new(&client, false).review_diff("  \n");
    assert_eq!(report.summary, "No changes to review.");
    chat.assert();
}
