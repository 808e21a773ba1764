//! Multipart static-site provisioning over the real HTTP router.

mod common;

use common::{spawn, wait_for_status};
use reqwest::{multipart, Method, StatusCode};
use wpfleet_core::models::SiteStatus;

#[tokio::test]
async fn static_provision_accepts_a_multipart_zip_and_reaches_active() {
    let app = spawn().await;

    let form = multipart::Form::new()
        .text("site", "staticsite")
        .part("zip", multipart::Part::bytes(b"fake zip bytes".to_vec()).file_name("site.zip"));

    let res = app
        .authed(Method::POST, "/api/static/provision")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["site"]["status"], "PROVISIONING");

    let site = wait_for_status(&app, "staticsite", &[SiteStatus::Active, SiteStatus::Failed], 40).await;
    assert_eq!(site.status, SiteStatus::Active);
    assert!(app.edge.snippet_exists("staticsite").await.unwrap());
}

#[tokio::test]
async fn static_provision_rejects_an_invalid_site_name() {
    let app = spawn().await;

    let form = multipart::Form::new()
        .text("site", "Not Valid")
        .part("zip", multipart::Part::bytes(b"fake zip bytes".to_vec()).file_name("site.zip"));

    let res = app
        .authed(Method::POST, "/api/static/provision")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn static_provision_requires_both_fields() {
    let app = spawn().await;

    let form = multipart::Form::new().text("site", "onlysite");
    let res = app
        .authed(Method::POST, "/api/static/provision")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
