#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

use attendance_api::config::AppConfig;
use attendance_api::database::Stores;
use attendance_api::otp::InMemoryOtpStore;
use attendance_api::phone::{PhoneKey, PhoneNormalizer};
use attendance_api::sms::MemorySmsGateway;
use attendance_api::storage::MemoryStorage;
use attendance_api::{build_router, AppState};

/// The real router on a free port, backed by in-memory collaborators
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
    pub sms: Arc<MemorySmsGateway>,
    pub storage: Arc<MemoryStorage>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let sms = Arc::new(MemorySmsGateway::new());
        let storage = Arc::new(MemoryStorage::new());
        let state = AppState::new(
            AppConfig::development(),
            Arc::new(InMemoryOtpStore::new()),
            sms.clone(),
            Stores::in_memory(),
            storage.clone(),
        )?;

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, build_router(state)).await;
        });

        let server = Self {
            port,
            base_url,
            client: reqwest::Client::new(),
            sms,
            storage,
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<reqwest::Response> {
        Ok(self.client.post(self.url(path)).json(&body).send().await?)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).bearer_auth(token).send().await?)
    }

    /// The last passcode texted to `raw_phone`
    pub fn last_code(&self, raw_phone: &str) -> Result<String> {
        let message = self
            .sms
            .last_message_to(&phone_key(raw_phone))
            .context("no SMS sent to phone")?;
        message
            .split_whitespace()
            .last()
            .map(str::to_string)
            .context("empty SMS body")
    }

    /// Register a dashboard user through the OTP flow and log in; returns (user_id, token)
    pub async fn dashboard_session(&self, raw_phone: &str, name: &str, role: &str) -> Result<(i64, String)> {
        let res = self
            .post_json("/dashboard/send-registration-otp", json!({ "phone": raw_phone }))
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "send-registration-otp: {}", res.status());

        let code = self.last_code(raw_phone)?;
        let res = self
            .post_json(
                "/dashboard/verify-registration-otp",
                json!({ "phone": raw_phone, "otp": code }),
            )
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "verify-registration-otp: {}", res.status());

        let res = self
            .post_json(
                "/dashboard/register",
                json!({ "phone": raw_phone, "name": name, "role": role }),
            )
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "register: {}", res.status());

        self.login(raw_phone).await
    }

    pub async fn login(&self, raw_phone: &str) -> Result<(i64, String)> {
        let res = self
            .post_json("/dashboard/send-login-otp", json!({ "phone": raw_phone }))
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "send-login-otp: {}", res.status());

        let code = self.last_code(raw_phone)?;
        let res = self
            .post_json("/dashboard/login", json!({ "phone": raw_phone, "otp": code }))
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login: {}", res.status());

        let body: Value = res.json().await?;
        let user_id = body["user_id"].as_i64().context("user_id missing")?;
        let token = body["access_token"].as_str().context("access_token missing")?;
        Ok((user_id, token.to_string()))
    }

    pub async fn register_field_user(&self, raw_phone: &str, name: &str, school: &str, district: &str) -> Result<i64> {
        let res = self
            .post_json(
                "/register",
                json!({
                    "phone": raw_phone,
                    "name": name,
                    "school": school,
                    "district": district,
                    "language": "Luganda",
                }),
            )
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "register: {}", res.status());
        let body: Value = res.json().await?;
        body["id"].as_i64().context("id missing")
    }
}

pub fn phone_key(raw: &str) -> PhoneKey {
    PhoneNormalizer::default()
        .normalize(raw)
        .expect("test phone must normalise")
}
