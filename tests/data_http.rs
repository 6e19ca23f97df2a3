mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app;
use common::fixtures::{row, three_line_order, upload_body, with};
use common::http::{assert_json_error, assert_status_ok_json, request, response_json};

#[tokio::test]
async fn upload_returns_batch_summary() {
    let test_app = spawn_test_app().await;
    let body = upload_body(three_line_order("O1", "2024-03-10T12:00:00+08:00"));

    let resp = request(&test_app.app, Method::POST, "/api/data/upload", Some(body), &[]).await;
    let (status, _, json) = response_json(resp).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["batch"]["rowCount"], 3);
    assert_eq!(json["data"]["batch"]["orderCount"], 1);
    assert_eq!(json["data"]["batch"]["sourceName"], "测试报表.xlsx");
    assert!(json["data"]["dataVersion"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn upload_counts_coerced_cells() {
    let test_app = spawn_test_app().await;
    let dirty = with(
        with(
            row("O1", "l1", "2024-03-10T12:00:00+08:00"),
            "delivery_fee",
            json!("4.5"),
        ),
        "platform_fee",
        json!(null),
    );
    let body = upload_body(vec![dirty]);

    let resp = request(&test_app.app, Method::POST, "/api/data/upload", Some(body), &[]).await;
    let (status, _, json) = response_json(resp).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["batch"]["coercedCells"], 2);
}

#[tokio::test]
async fn upload_missing_required_column_is_rejected() {
    let test_app = spawn_test_app().await;
    let mut bad = row("O1", "l1", "2024-03-10T12:00:00+08:00");
    bad.as_object_mut().unwrap().remove("channel");
    let body = upload_body(vec![bad]);

    let resp = request(&test_app.app, Method::POST, "/api/data/upload", Some(body), &[]).await;
    let (status, _, json) = response_json(resp).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&json, "DATA_SHAPE_ERROR");
    assert!(json["message"].as_str().unwrap().contains("channel"));
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let test_app = spawn_test_app().await;
    let body = upload_body(vec![]);

    let resp = request(&test_app.app, Method::POST, "/api/data/upload", Some(body), &[]).await;
    let (status, _, json) = response_json(resp).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&json, "EMPTY_UPLOAD");
}

#[tokio::test]
async fn batches_are_listed_and_deletable() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/data/upload",
        Some(upload_body(three_line_order("O1", "2024-03-10T12:00:00+08:00"))),
        &[],
    )
    .await;
    let (_, _, created) = response_json(resp).await;
    let batch_id = created["data"]["batch"]["id"].as_str().unwrap().to_string();

    let resp = request(&test_app.app, Method::GET, "/api/data/batches", None, &[]).await;
    let (status, _, json) = response_json(resp).await;
    assert_status_ok_json(status, &json);
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["data"][0]["id"], batch_id.as_str());

    let resp = request(
        &test_app.app,
        Method::DELETE,
        &format!("/api/data/batches/{batch_id}"),
        None,
        &[],
    )
    .await;
    let (status, _, json) = response_json(resp).await;
    assert_status_ok_json(status, &json);
    assert_eq!(json["data"]["removedRows"], 3);

    let resp = request(&test_app.app, Method::GET, "/api/data/version", None, &[]).await;
    let (_, _, json) = response_json(resp).await;
    assert_eq!(json["data"]["lineCount"], 0);
}

#[tokio::test]
async fn deleting_unknown_batch_is_404() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::DELETE,
        "/api/data/batches/nope",
        None,
        &[],
    )
    .await;
    let (status, _, json) = response_json(resp).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&json, "NOT_FOUND");
}

/// 批次中途有非法行时整单拒绝：行数、版本号、诊断结果都不许变
#[tokio::test]
async fn rejected_upload_persists_nothing() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/data/upload",
        Some(upload_body(vec![row("O1", "l1", "2024-03-10T12:00:00+08:00")])),
        &[],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = request(&test_app.app, Method::GET, "/api/data/version", None, &[]).await;
    let (_, _, before) = response_json(resp).await;

    let rows = vec![
        row("O2", "l1", "2024-03-10T13:00:00+08:00"),
        row("bad:id", "l1", "2024-03-10T13:00:00+08:00"),
    ];
    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/data/upload",
        Some(upload_body(rows)),
        &[],
    )
    .await;
    let (status, _, json) = response_json(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&json, "VALIDATION_ERROR");

    let resp = request(&test_app.app, Method::GET, "/api/data/version", None, &[]).await;
    let (_, _, after) = response_json(resp).await;
    assert_eq!(after["data"]["lineCount"], before["data"]["lineCount"]);
    assert_eq!(after["data"]["dataVersion"], before["data"]["dataVersion"]);

    let resp = request(&test_app.app, Method::GET, "/api/diagnostics/overview", None, &[]).await;
    let (_, _, overview) = response_json(resp).await;
    assert_eq!(overview["data"]["orderCount"], 1);
}

#[tokio::test]
async fn upload_bumps_data_version() {
    let test_app = spawn_test_app().await;

    let resp = request(&test_app.app, Method::GET, "/api/data/version", None, &[]).await;
    let (_, _, before) = response_json(resp).await;
    let v0 = before["data"]["dataVersion"].as_u64().unwrap();

    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/data/upload",
        Some(upload_body(vec![row("O1", "l1", "2024-03-10T12:00:00+08:00")])),
        &[],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = request(&test_app.app, Method::GET, "/api/data/version", None, &[]).await;
    let (_, _, after) = response_json(resp).await;
    assert_eq!(after["data"]["dataVersion"].as_u64().unwrap(), v0 + 1);
}

#[tokio::test]
async fn error_responses_carry_trace_id() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::DELETE,
        "/api/data/batches/nope",
        None,
        &[("x-request-id", "trace-me-123".to_string())],
    )
    .await;
    let (_, headers, json) = response_json(resp).await;

    assert_eq!(headers.get("x-request-id").unwrap(), "trace-me-123");
    assert_eq!(json["traceId"], "trace-me-123");
}
