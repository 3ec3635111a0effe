use base64::Engine as _;
use board_client::CliArgs;
use clap::Parser as _;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use tempfile::tempdir;

fn token(claims: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.sig",
        engine.encode(br#"{"alg":"HS256"}"#),
        engine.encode(claims.to_string())
    )
}

fn args(server: &MockServer, credential: &std::path::Path, rest: &[&str]) -> CliArgs {
    let mut argv = vec![
        "board".to_string(),
        "--base-url".to_string(),
        server.base_url(),
        "--credential-file".to_string(),
        credential.display().to_string(),
        "--progress".to_string(),
        "never".to_string(),
    ];
    argv.extend(rest.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).unwrap()
}

async fn mock_post_42(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/posts/42");
            then.status(200).json_body(json!({
                "id": 42, "title": "Weekend <plans>", "content": "line one\nline two",
                "image_url": "/uploads/p.png", "user_id": "alice", "nickname": "Alice",
                "created_at": "2025-03-02 09:30:00"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/comments/42");
            then.status(200).json_body(json!([
                { "id": 1, "post_id": 42, "content": "root", "user_id": 7,
                  "nickname": "Bob", "created_at": "2025-03-02T00:31:00", "parent_id": null },
                { "id": 2, "post_id": 42, "content": "answer", "user_id": 5,
                  "nickname": "Alice", "created_at": "2025-03-02T00:32:00", "parent_id": 1 }
            ]));
        })
        .await;
}

#[tokio::test]
async fn login_then_whoami_across_runs() {
    let server = MockServer::start_async().await;
    let access = token(json!({ "id": 5, "sub": "alice", "nickname": "Alice" }));
    let body = access.clone();
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/auth/login");
            then.status(200).json_body(json!({ "access_token": body }));
        })
        .await;

    let tmp = tempdir().unwrap();
    let cred = tmp.path().join("cfg").join("credential");

    let out = board_client::execute(args(
        &server,
        &cred,
        &["login", "--login", "alice", "--password", "pw"],
    ))
    .await
    .unwrap();
    assert!(out.contains("alice"));
    assert_eq!(std::fs::read_to_string(&cred).unwrap().trim(), access);

    let out = board_client::execute(args(&server, &cred, &["whoami"]))
        .await
        .unwrap();
    assert!(out.contains("Alice"));

    board_client::execute(args(&server, &cred, &["logout"]))
        .await
        .unwrap();
    let out = board_client::execute(args(&server, &cred, &["whoami"]))
        .await
        .unwrap();
    assert!(!out.contains("Alice"));
}

#[tokio::test]
async fn show_renders_replies_under_their_parent() {
    let server = MockServer::start_async().await;
    mock_post_42(&server).await;

    let tmp = tempdir().unwrap();
    let cred = tmp.path().join("credential");
    let out = board_client::execute(args(&server, &cred, &["posts", "show", "42"]))
        .await
        .unwrap();

    assert!(out.contains("Weekend <plans>"));
    assert!(out.contains("2025-03-02 09:30"));
    let root = out.find("root").unwrap();
    let answer = out.find("answer").unwrap();
    assert!(root < answer);
    assert!(out.contains("↳"));
}

#[tokio::test]
async fn export_writes_standalone_html() {
    let server = MockServer::start_async().await;
    mock_post_42(&server).await;

    let tmp = tempdir().unwrap();
    let cred = tmp.path().join("credential");
    let out_file = tmp.path().join("site").join("post.html");
    let out = board_client::execute(args(
        &server,
        &cred,
        &[
            "posts",
            "export",
            "42",
            "--out",
            out_file.to_str().unwrap(),
        ],
    ))
    .await
    .unwrap();
    assert!(out.contains("post.html"));

    let html = std::fs::read_to_string(&out_file).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("Weekend &lt;plans&gt;"));
    assert!(html.contains(&format!("{}uploads/p.png", server.url("/"))));
    assert!(html.contains("id=\"comment_2\""));
    assert!(html.contains("2025-03-02 09:31"));
}

#[tokio::test]
async fn comment_commands_need_a_login() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/comments/");
            then.status(200);
        })
        .await;

    let tmp = tempdir().unwrap();
    let cred = tmp.path().join("credential");
    let err = board_client::execute(args(
        &server,
        &cred,
        &["comments", "add", "42", "--content", "hi"],
    ))
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("not signed in"));
    assert_eq!(create.hits_async().await, 0);
}
