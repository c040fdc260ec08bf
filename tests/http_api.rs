//! REST API tests driven through the router with `tower::ServiceExt::oneshot`.
#![cfg(feature = "http")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use kbase::http::router;
use kbase::{KnowledgeBase, NewEntry, Scope, UploadRequest};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> (Router, Arc<KnowledgeBase>) {
    let kb = Arc::new(KnowledgeBase::in_memory().unwrap());
    (router(Arc::clone(&kb)), kb)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_create_list_and_context_for_thread() {
    let (app, _) = app();

    let (status, created) = send(
        &app,
        json_request(
            "POST",
            "/knowledge-base/threads/t1",
            &json!({"account_id": "acct", "name": "Plan", "content": "Ship on Friday."}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Plan");
    assert_eq!(created["content_tokens"], 3);

    let (status, listing) = send(&app, get("/knowledge-base/threads/t1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total_count"], 1);
    assert_eq!(listing["total_tokens"], 3);

    let (status, context) = send(&app, get("/knowledge-base/threads/t1/context?max_tokens=100")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(context["context"].as_str().unwrap().contains("## Plan"));
    assert_eq!(context["max_tokens"], 100);

    let (status, combined) = send(
        &app,
        get("/knowledge-base/context?account_id=acct&thread_id=t1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(combined["context"], context["context"]);
}

#[tokio::test]
async fn test_empty_scope_context_is_null() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/knowledge-base/agents/bot/context")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["context"].is_null());
}

#[tokio::test]
async fn test_global_routes_require_account() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/knowledge-base/global")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("account_id"));
}

#[tokio::test]
async fn test_invalid_input_maps_to_400() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/knowledge-base/global",
            &json!({"account_id": "acct", "name": "Empty", "content": "   "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/knowledge-base/global",
            &json!({"account_id": "acct", "name": "X", "content": "y", "usage_context": "sometimes"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request("POST", "/knowledge-base/global", &json!({"account_id": "acct"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_entry_routes_and_not_found() {
    let (app, kb) = app();
    let entry = kb
        .entries()
        .create(NewEntry::new(Scope::global("acct"), "Policy", "Refunds in 30 days."))
        .unwrap();
    let uri = format!("/knowledge-base/entries/{}", entry.id);

    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Policy");

    let (status, body) = send(
        &app,
        json_request("PUT", &uri, &json!({"usage_context": "on_request", "is_active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usage_context"], "on_request");
    assert_eq!(body["is_active"], false);

    let delete = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_duplicate_names_are_renamed_not_rejected() {
    let (app, _) = app();
    let body = json!({"account_id": "acct", "name": "FAQ", "content": "answers"});

    let (first, _) = send(&app, json_request("POST", "/knowledge-base/agents/bot", &body)).await;
    let (second, renamed) = send(&app, json_request("POST", "/knowledge-base/agents/bot", &body)).await;
    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CREATED);
    assert!(renamed["name"].as_str().unwrap().starts_with("FAQ ("));
}

#[tokio::test]
async fn test_supported_formats() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/knowledge-base/documents/supported-formats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_formats"], 6);
    assert_eq!(body["supported_formats"][0]["mime_type"], "application/pdf");
}

#[tokio::test]
async fn test_query_route() {
    let (app, kb) = app();
    kb.entries()
        .create(NewEntry::new(Scope::global("acct"), "Returns", "Returns accepted within 30 days."))
        .unwrap();

    let (status, body) = send(
        &app,
        json_request("POST", "/knowledge-base/query", &json!({"query": "returns", "account_id": "acct"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["relevant"], true);
    assert_eq!(body["chunks_found"], 1);

    let (status, _) = send(
        &app,
        json_request("POST", "/knowledge-base/query", &json!({"query": " ", "account_id": "acct"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_is_accepted_and_processed_in_background() {
    let (app, _) = app();
    let boundary = "kbase-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"account_id\"\r\n\r\n\
         acct\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"kb_type\"\r\n\r\n\
         thread\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"thread_id\"\r\n\r\n\
         t1\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         Remember the milk.\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/knowledge-base/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, accepted) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "pending");
    assert_eq!(accepted["filename"], "notes.txt");
    let job_uri = format!(
        "/knowledge-base/documents/status/{}",
        accepted["job_id"].as_str().unwrap()
    );

    let mut job = Value::Null;
    for _ in 0..100 {
        let (status, body) = send(&app, get(&job_uri)).await;
        assert_eq!(status, StatusCode::OK);
        job = body;
        if job["status"] == "completed" || job["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(job["status"], "completed");
    assert!(job["entry_id"].is_string());

    let (_, listing) = send(&app, get("/knowledge-base/threads/t1")).await;
    assert_eq!(listing["entries"][0]["content"], "Remember the milk.");
    assert_eq!(listing["entries"][0]["source_type"], "file_upload");
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let (app, _) = app();
    let (status, _) = send(&app, get("/knowledge-base/documents/status/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn upload_text(kb: &KnowledgeBase, scope: Scope, filename: &str, text: &str) {
    kb.uploads()
        .upload(&UploadRequest::new(scope, filename), text.as_bytes())
        .unwrap();
}

#[tokio::test]
async fn test_processing_jobs_routes() {
    let (app, kb) = app();
    upload_text(&kb, Scope::global("acct"), "a.txt", "first file");
    upload_text(&kb, Scope::global("acct"), "b.txt", "second file");
    upload_text(&kb, Scope::thread("acct", "t1"), "c.txt", "third file");

    let (status, jobs) = send(&app, get("/knowledge-base/global/processing-jobs?account_id=acct")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 2);
    assert_eq!(jobs[0]["filename"], "b.txt");
    assert_eq!(jobs[0]["status"], "completed");

    let (_, jobs) = send(
        &app,
        get("/knowledge-base/global/processing-jobs?account_id=acct&limit=1"),
    )
    .await;
    assert_eq!(jobs.as_array().unwrap().len(), 1);

    let (_, jobs) = send(&app, get("/knowledge-base/threads/t1/processing-jobs")).await;
    assert_eq!(jobs[0]["filename"], "c.txt");

    let (_, jobs) = send(&app, get("/knowledge-base/agents/bot/processing-jobs")).await;
    assert_eq!(jobs, json!([]));

    let (status, _) = send(&app, get("/knowledge-base/global/processing-jobs")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_document_route() {
    let (app, kb) = app();
    upload_text(&kb, Scope::agent("acct", "bot"), "guide.md", "Use short answers.");
    upload_text(&kb, Scope::agent("acct", "bot"), "guide.md", "Use long answers.");

    let delete = |uri: &str| {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(
        &app,
        delete("/knowledge-base/documents/guide.md?kb_type=agent&account_id=acct&agent_id=bot"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "guide.md");
    assert_eq!(body["entries_deleted"], 2);
    assert_eq!(body["jobs_deleted"], 2);

    let (_, listing) = send(&app, get("/knowledge-base/agents/bot")).await;
    assert_eq!(listing["total_count"], 0);

    let (status, body) = send(
        &app,
        delete("/knowledge-base/documents/guide.md?kb_type=agent&account_id=acct&agent_id=bot"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries_deleted"], 0);

    let (status, _) = send(&app, delete("/knowledge-base/documents/guide.md?kb_type=agent&account_id=acct")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_document_chunks_route() {
    let (app, kb) = app();
    upload_text(&kb, Scope::global("acct"), "policy.txt", "Refunds are issued within thirty days.");
    kb.entries()
        .create(NewEntry::new(Scope::global("acct"), "Typed", "Refunds typed by hand."))
        .unwrap();

    let (status, body) = send(&app, get("/knowledge-base/documents/chunks?account_id=acct")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["kb_type"], "global");
    assert_eq!(body["scope_id"], "acct");
    assert!(body["query"].is_null());
    assert_eq!(body["chunks"][0]["filename"], "policy.txt");
    assert_eq!(body["chunks"][0]["chunk_index"], 0);

    let (_, body) = send(
        &app,
        get("/knowledge-base/documents/chunks?account_id=acct&query=warranty"),
    )
    .await;
    assert_eq!(body["total_count"], 0);
    assert_eq!(body["query"], "warranty");

    let (status, _) = send(
        &app,
        get("/knowledge-base/documents/chunks?account_id=acct&kb_type=team"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_logs_route() {
    let (app, kb) = app();
    kb.entries()
        .create(NewEntry::new(Scope::global("acct"), "Returns", "Returns accepted within 30 days."))
        .unwrap();

    for query in ["returns", "shipping"] {
        let (status, _) = send(
            &app,
            json_request("POST", "/knowledge-base/query", &json!({"query": query, "account_id": "acct"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (status, logs) = send(&app, get("/knowledge-base/query/logs?account_id=acct")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs.as_array().unwrap().len(), 2);
    assert_eq!(logs[0]["query"], "shipping");
    assert_eq!(logs[0]["relevant"], false);
    assert_eq!(logs[1]["relevant"], true);

    let (_, logs) = send(&app, get("/knowledge-base/query/logs?account_id=acct&limit=1")).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, get("/knowledge-base/query/logs")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
