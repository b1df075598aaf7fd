#![forbid(unsafe_code)]
use garde::{api, Engine, EngineConfig};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;

async fn start() -> String {
    let engine = Engine::new(&EngineConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(api::serve(engine, listener, std::future::pending::<()>()));
    base
}

async fn seed(client: &reqwest::Client, base: &str) {
    for (id, name) in [("milan", "Milan"), ("rome", "Rome")] {
        let res = client
            .post(format!("{base}/api/bureaus"))
            .json(&json!({ "id": id, "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    let res = client
        .post(format!("{base}/api/employees"))
        .json(&json!({
            "id": "E1",
            "full_name": "Elena Conti",
            "bureau_id": "milan",
            "role": "senior",
            "weekly_hour_cap": 40
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

async fn post_shift(client: &reqwest::Client, base: &str, start: &str, end: &str) -> Value {
    let res = client
        .post(format!("{base}/api/shifts"))
        .json(&json!({
            "employee_id": "E1",
            "bureau_id": "milan",
            "date": "2025-11-03",
            "start_time": start,
            "end_time": end
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

/// La réévaluation est asynchrone : on interroge jusqu'à convergence.
async fn wait_for_conflict(client: &reqwest::Client, base: &str, kind: &str) -> Value {
    for _ in 0..100 {
        let body: Value = client
            .get(format!("{base}/api/conflicts"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let found = body["conflicts"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["type"] == kind && c["status"] == "unresolved")
            .cloned();
        if let Some(conflict) = found {
            return conflict;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no {kind} conflict appeared");
}

#[tokio::test]
async fn conflict_lifecycle_over_http() {
    let base = start().await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let a = post_shift(&client, &base, "08:00", "16:00").await;
    assert_eq!(a["start_time"], "08:00");
    post_shift(&client, &base, "12:00", "20:00").await;

    let conflict = wait_for_conflict(&client, &base, "Double Booking").await;
    assert_eq!(conflict["severity"], "high");
    assert_eq!(conflict["employee_name"], "Elena Conti");
    let url = format!("{base}/api/conflicts/{}", conflict["id"].as_str().unwrap());

    let res = client
        .patch(&url)
        .json(&json!({ "action": "acknowledge" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let acked: Value = res.json().await.unwrap();
    assert_eq!(acked["status"], "acknowledged");

    let res = client.patch(&url).json(&json!({ "action": "bogus" })).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(client.delete(&url).send().await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(client.delete(&url).send().await.unwrap().status(), StatusCode::NO_CONTENT);

    let res = client
        .patch(&url)
        .json(&json!({ "action": "resolve" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("dismissed"));

    let dismissed: Value = client
        .get(format!("{base}/api/conflicts?status=dismissed"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dismissed["conflicts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn errors_carry_json_bodies() {
    let base = start().await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let res = client
        .post(format!("{base}/api/shifts"))
        .json(&json!({
            "bureau_id": "paris",
            "date": "2025-11-03",
            "start_time": "08:00",
            "end_time": "16:00"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("paris"));

    let res = client
        .get(format!("{base}/api/conflicts/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{base}/api/conflicts?severity=urgent"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(format!("{base}/api/shifts/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shifts_employees_and_stats() {
    let base = start().await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let created = post_shift(&client, &base, "22:00", "06:00").await;
    let id = created["id"].as_str().unwrap();

    let res = client
        .patch(format!("{base}/api/shifts/{id}"))
        .json(&json!({ "date": "2025-11-04", "start_time": "20:00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let moved: Value = res.json().await.unwrap();
    assert_eq!(moved["date"], "2025-11-04");
    assert_eq!(moved["start_time"], "20:00");
    assert_eq!(moved["end_time"], "06:00");

    let listed: Value = client
        .get(format!("{base}/api/shifts?employee_id=E1&start_date=2025-11-04"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["shifts"].as_array().unwrap().len(), 1);

    let employees: Value = client
        .get(format!("{base}/api/employees?bureau=milan&search=elena"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(employees["employees"][0]["id"], "E1");

    let one: Value = client
        .get(format!("{base}/api/employees/E1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one["employee"]["full_name"], "Elena Conti");

    let stats: Value = client
        .get(format!("{base}/api/dashboard/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["stats"]["totalEmployees"], 1);
    assert_eq!(stats["stats"]["activeEmployees"], 1);
    assert!(stats["stats"]["coverageRate"].is_number());
}

#[tokio::test]
async fn put_employee_replaces_by_path_id() {
    let base = start().await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;
    let url = format!("{base}/api/employees/E1");

    let replaced: Value = client
        .put(&url)
        .json(&json!({
            "full_name": "Elena Conti",
            "bureau_id": "rome",
            "role": "lead",
            "weekly_hour_cap": 36,
            "active": false
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replaced["employee"]["id"], "E1");
    assert_eq!(replaced["employee"]["bureau_id"], "rome");
    assert_eq!(replaced["employee"]["active"], false);

    let fetched: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(fetched["employee"]["role"], "lead");
    assert_eq!(fetched["employee"]["weekly_hour_cap"], 36);

    let res = client
        .put(&url)
        .json(&json!({
            "id": "E2",
            "full_name": "Luca Ferri",
            "bureau_id": "rome",
            "role": "senior",
            "weekly_hour_cap": 40
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("path id"));
}

#[tokio::test]
async fn upcoming_rejects_non_numeric_days() {
    let base = start().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{base}/api/shifts/upcoming?days=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("days"));

    let res = client
        .get(format!("{base}/api/shifts/upcoming?days=3"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["shifts"].as_array().unwrap().is_empty());
}
