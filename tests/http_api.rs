use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use theatre_sched::auth::TokenTable;
use theatre_sched::engine::Engine;
use theatre_sched::http::{create_router, AppState};

fn test_wal_path(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("theatre_sched_test_http_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn app(name: &str, tokens: &str) -> Router {
    let engine = Arc::new(Engine::new(test_wal_path(name)).unwrap());
    create_router(AppState::new(engine, TokenTable::parse(tokens).unwrap()), 64)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header("Authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed(app: &Router, token: Option<&str>) {
    for (id, name) in [(1, "Main OT"), (2, "Cardiac OT")] {
        let (status, _) = send(
            app,
            Method::POST,
            "/api/theatre",
            token,
            Some(json!({"theatre_id": id, "name": name, "capacity": 6})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

fn surgery(id: u64, theatre_id: u32, date: &str, start: &str, end: &str) -> Value {
    json!({
        "surgery_id": id,
        "theatre_id": theatre_id,
        "surgery_date": date,
        "start_time": start,
        "end_time": end,
        "surgery_type": "Appendectomy"
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = app("health.wal", "admin:root");
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn availability_flow() {
    let app = app("availability_flow.wal", "");
    seed(&app, None).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/surgeries",
        None,
        Some(surgery(100, 1, "2024-06-01", "09:00", "11:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "SCHEDULED");
    assert_eq!(body["data"]["start_time"], "09:00");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/theatre/1/availability?surgery_date=2024-06-01&start_time=10:00&end_time=12:00",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"available": false}));

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/theatre/1/availability?surgery_date=2024-06-01&start_time=11:00&end_time=12:00",
        None,
        None,
    )
    .await;
    assert_eq!(body, json!({"available": true}));

    for path in ["/api/schedule/available-theatres", "/api/surgeries/AvailableTheatres"] {
        let uri = format!("{path}?surgery_date=2024-06-01&start_time=09:30&end_time=10:30");
        let (status, body) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"theatres": [{"theatre_id": 2, "name": "Cardiac OT"}]}));
    }
}

#[tokio::test]
async fn invalid_requests_are_400() {
    let app = app("invalid_requests.wal", "");
    seed(&app, None).await;

    // Inverted window
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/theatre/1/availability?surgery_date=2024-06-01&start_time=12:00&end_time=10:00",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_WINDOW");

    // Missing parameter
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/schedule/available-theatres?surgery_date=2024-06-01&start_time=09:00",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    // Non-numeric id
    let (status, _) = send(&app, Method::GET, "/api/theatre/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed body
    let (status, _) = send(&app, Method::POST, "/api/theatre", None, Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Times are whole minutes in two-digit 24-hour form
    for (date, start, end) in [
        ("2024-06-01", "10:00", "10:00:60"),
        ("2024-06-01", "09:00:30", "10:00:30"),
        ("2024-06-01", "9:5", "10:00"),
        ("2024-6-1", "09:00", "10:00"),
    ] {
        let (status, body) = send(&app, Method::POST, "/api/surgeries", None, Some(surgery(9, 1, date, start, end))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{date} {start}-{end}");
        assert_eq!(body["code"], "INVALID_WINDOW");
    }
    let (status, _) = send(&app, Method::GET, "/api/surgeries/9", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_theatre_is_404() {
    let app = app("unknown_theatre.wal", "");
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/theatre/42/availability?surgery_date=2024-06-01&start_time=09:00&end_time=10:00",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "THEATRE_NOT_FOUND");
}

#[tokio::test]
async fn conflicting_booking_is_409() {
    let app = app("conflict_409.wal", "");
    seed(&app, None).await;
    send(&app, Method::POST, "/api/surgeries", None, Some(surgery(1, 1, "2024-06-01", "09:00", "11:00"))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/surgeries",
        None,
        Some(surgery(2, 1, "2024-06-01", "10:30", "11:30")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SCHEDULE_CONFLICT");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/surgeries",
        None,
        Some(surgery(1, 2, "2024-06-01", "09:00", "11:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SURGERY_EXISTS");
}

#[tokio::test]
async fn surgery_lifecycle() {
    let app = app("lifecycle.wal", "");
    seed(&app, None).await;
    send(&app, Method::POST, "/api/surgeries", None, Some(surgery(5, 1, "2030-01-10", "09:00", "10:00"))).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/surgeries/5/schedule",
        None,
        Some(json!({"theatre_id": 2, "surgery_date": "2030-01-10", "start_time": "13:00", "end_time": "14:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["theatre_id"], 2);
    assert_eq!(body["data"]["start_time"], "13:00");

    let (_, body) = send(&app, Method::GET, "/api/theatre/2/schedule", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::GET, "/api/surgeries/upcoming?after=2030-01-09", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/surgeries/5/status",
        None,
        Some(json!({"status": "CANCELLED"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/surgeries/5/status",
        None,
        Some(json!({"status": "IN_PROGRESS"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (_, body) = send(&app, Method::GET, "/api/surgeries/upcoming?after=2030-01-09", None, None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::DELETE, "/api/surgeries/5", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/surgeries/5", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn free_slots_endpoint() {
    let app = app("free_slots.wal", "");
    seed(&app, None).await;
    send(&app, Method::POST, "/api/surgeries", None, Some(surgery(1, 1, "2024-06-01", "10:00", "11:00"))).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/theatre/1/free-slots?surgery_date=2024-06-01&from=08:00&to=12:00&min_minutes=30",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            {"start_time": "08:00", "end_time": "10:00"},
            {"start_time": "11:00", "end_time": "12:00"}
        ])
    );
}

#[tokio::test]
async fn theatre_crud() {
    let app = app("theatre_crud.wal", "");
    seed(&app, None).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/theatre/2",
        None,
        Some(json!({"name": "Neuro OT", "capacity": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Neuro OT");

    let (_, body) = send(&app, Method::GET, "/api/theatre", None, None).await;
    let ids: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["theatre_id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/theatre",
        None,
        Some(json!({"theatre_id": 1, "name": "Dup", "capacity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "THEATRE_EXISTS");
}

#[tokio::test]
async fn role_gating() {
    let app = app("role_gating.wal", "admin:root,surgeon:doc,staff:nurse");
    seed(&app, Some("root")).await;

    // No token / unknown token
    let (status, _) = send(&app, Method::GET, "/api/theatre", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Method::GET, "/api/theatre", Some("guess"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Staff can read but not book
    let (status, _) = send(&app, Method::GET, "/api/theatre", Some("nurse"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/surgeries",
        Some("nurse"),
        Some(surgery(1, 1, "2024-06-01", "09:00", "10:00")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    // Scheme is case-insensitive
    let mut req = Request::builder()
        .method(Method::GET)
        .uri("/api/theatre")
        .header("Authorization", "bearer nurse")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);
    req = Request::builder()
        .method(Method::GET)
        .uri("/api/theatre")
        .header("Authorization", "Basic nurse")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    // Surgeon can book but not manage theatres
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/surgeries",
        Some("doc"),
        Some(surgery(1, 1, "2024-06-01", "09:00", "10:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/theatre",
        Some("doc"),
        Some(json!({"theatre_id": 3, "name": "OT-3", "capacity": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn surgeries_by_surgeon_and_patient() {
    let app = app("by_surgeon_patient.wal", "");
    seed(&app, None).await;

    for (id, theatre, start, end, surgeon, patient) in [
        (1, 1, "09:00", "10:00", 7, 100),
        (2, 2, "09:00", "10:00", 8, 100),
        (3, 1, "10:00", "11:00", 7, 200),
    ] {
        let mut body = surgery(id, theatre, "2024-06-01", start, end);
        body["surgeon_id"] = json!(surgeon);
        body["patient_id"] = json!(patient);
        let (status, created) = send(&app, Method::POST, "/api/surgeries", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["surgeon_id"], surgeon);
    }

    let ids = |body: &Value| -> Vec<u64> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["surgery_id"].as_u64().unwrap())
            .collect()
    };

    let (status, body) = send(&app, Method::GET, "/api/surgeries/by-surgeon/7", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![1, 3]);

    let (status, body) = send(&app, Method::GET, "/api/surgeries/by-patient/100", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![1, 2]);

    let (status, body) = send(&app, Method::GET, "/api/surgeries/by-surgeon/99", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&body).is_empty());

    let (status, _) = send(&app, Method::GET, "/api/surgeries/by-patient/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_http_bookings_one_wins() {
    let app = app("concurrent_http.wal", "");
    seed(&app, None).await;

    let mut handles = Vec::new();
    for id in 0..16u64 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            send(
                &app,
                Method::POST,
                "/api/surgeries",
                None,
                Some(surgery(id, 1, "2024-06-01", "09:00", "10:00")),
            )
            .await
            .0
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 15);
}
