//! Job inspection/hard-delete endpoints over the real HTTP router.

mod common;

use common::{spawn, spawn_idle};
use reqwest::{Method, StatusCode};

#[tokio::test]
async fn get_job_returns_the_job_created_by_a_provision_request() {
    let app = spawn_idle().await;

    let res = app
        .authed(Method::POST, "/api/provision")
        .json(&serde_json::json!({ "site_id": "jobsite" }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let res = app.authed(Method::GET, &format!("/api/jobs/{job_id}")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(job["site_id"], "jobsite");
    assert_eq!(job["job_type"], "PROVISION");
}

#[tokio::test]
async fn get_job_404s_for_an_unknown_id() {
    let app = spawn().await;
    let res = app.authed(Method::GET, "/api/jobs/does-not-exist").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hard_delete_job_refuses_a_pending_job() {
    let app = spawn_idle().await;

    let res = app
        .authed(Method::POST, "/api/provision")
        .json(&serde_json::json!({ "site_id": "busyjob" }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let res = app.authed(Method::DELETE, &format!("/api/jobs/{job_id}")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
