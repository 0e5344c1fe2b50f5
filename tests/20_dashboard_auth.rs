mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::TestServer;

#[tokio::test]
async fn register_and_login_issues_bearer_token() -> Result<()> {
    let server = TestServer::start().await?;

    let (user_id, token) = server
        .dashboard_session("0772207616", "Grace", "fieldworker")
        .await?;
    assert_eq!(user_id, 1);

    let res = server.get_auth("/dashboard/me", &token).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await?;
    assert_eq!(me["phone"], "+256772207616");
    assert_eq!(me["role"], "fieldworker");
    assert_eq!(me["is_verified"], true);
    Ok(())
}

#[tokio::test]
async fn login_response_shape() -> Result<()> {
    let server = TestServer::start().await?;
    server.dashboard_session("0772207616", "Grace", "manager").await?;

    server
        .post_json("/dashboard/send-login-otp", json!({ "phone": "0772207616" }))
        .await?;
    let code = server.last_code("0772207616")?;
    let res = server
        .post_json("/dashboard/login", json!({ "phone": "0772207616", "otp": code }))
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["role"], "manager");
    assert!(body["access_token"].as_str().is_some_and(|t| t.split('.').count() == 3));
    Ok(())
}

#[tokio::test]
async fn register_requires_verified_otp() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .post_json(
            "/dashboard/register",
            json!({ "phone": "0772207616", "name": "Grace", "role": "superadmin" }),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn duplicate_dashboard_phone_is_conflict() -> Result<()> {
    let server = TestServer::start().await?;
    server.dashboard_session("0772207616", "Grace", "manager").await?;

    let res = server
        .post_json("/dashboard/send-registration-otp", json!({ "phone": "772207616" }))
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn unknown_role_is_rejected() -> Result<()> {
    let server = TestServer::start().await?;

    server
        .post_json("/dashboard/send-registration-otp", json!({ "phone": "0772207616" }))
        .await?;
    let code = server.last_code("0772207616")?;
    server
        .post_json(
            "/dashboard/verify-registration-otp",
            json!({ "phone": "0772207616", "otp": code }),
        )
        .await?;

    let res = server
        .post_json(
            "/dashboard/register",
            json!({ "phone": "0772207616", "name": "Grace", "role": "owner" }),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["field_errors"]["role"].is_string());
    Ok(())
}

#[tokio::test]
async fn login_otp_for_unknown_user_is_not_found() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .post_json("/dashboard/send-login-otp", json!({ "phone": "0772207616" }))
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(server.sms.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn login_with_wrong_code_fails() -> Result<()> {
    let server = TestServer::start().await?;
    server.dashboard_session("0772207616", "Grace", "manager").await?;

    server
        .post_json("/dashboard/send-login-otp", json!({ "phone": "0772207616" }))
        .await?;
    let code = server.last_code("0772207616")?;
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let res = server
        .post_json("/dashboard/login", json!({ "phone": "0772207616", "otp": wrong }))
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn login_code_cannot_be_replayed() -> Result<()> {
    let server = TestServer::start().await?;
    server.dashboard_session("0772207616", "Grace", "manager").await?;

    server
        .post_json("/dashboard/send-login-otp", json!({ "phone": "0772207616" }))
        .await?;
    let code = server.last_code("0772207616")?;

    let first = server
        .post_json("/dashboard/login", json!({ "phone": "0772207616", "otp": code }))
        .await?;
    assert_eq!(first.status(), StatusCode::OK);

    let replay = server
        .post_json("/dashboard/login", json!({ "phone": "0772207616", "otp": code }))
        .await?;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_bearer_token() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.client.get(server.url("/registrations")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok()),
        Some("Bearer")
    );

    let res = server.get_auth("/registrations", "not.a.token").await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
