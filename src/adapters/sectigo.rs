//! Commercial CA batch API client
//!
//! Thin typed client for the vendor's enrollment batch API. Auth is
//! password-based: a bearer token is fetched on first use, cached, and
//! refreshed once when a call answers 401. Every failure maps onto the
//! port's transient/protocol/authentication split so the certificate
//! manager can retry without inspecting HTTP details.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::SectigoConfig;
use crate::ports::ca::{BatchDetail, BatchInfo, CaError, CertificateAuthority, ProcessingInfo};

/// HTTP client for the commercial CA's batch API
pub struct SectigoClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    profile_default: String,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBatchRequest<'a> {
    profile_name: &'a str,
    batch_requests: Vec<&'a HashMap<String, String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    batch_id: i64,
    #[serde(default)]
    authority_id: i64,
    #[serde(default)]
    order_number: i64,
    #[serde(default)]
    creation_date: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchDetailResponse {
    batch_id: i64,
    #[serde(default)]
    batch_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    reject_reason: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct ProcessingInfoResponse {
    #[serde(default)]
    active: i64,
    #[serde(default)]
    success: i64,
    #[serde(default)]
    failed: i64,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: i64,
}

impl SectigoClient {
    /// Build a client from the CA configuration; `timeout` bounds every call
    pub fn new(config: &SectigoConfig, timeout: Duration) -> Result<Self, CaError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            profile_default: config.profile.clone(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self) -> Result<String, CaError> {
        let response = self
            .http
            .post(self.url("/auth/pwd"))
            .json(&AuthRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| CaError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaError::Authentication(format!(
                "authentication failed: {}",
                response.status()
            )));
        }

        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| CaError::Protocol(e.to_string()))?;
        let mut token = self.token.write().await;
        *token = Some(auth.access_token.clone());
        Ok(auth.access_token)
    }

    async fn bearer(&self) -> Result<String, CaError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    /// Issue an authorized request, re-authenticating once on 401
    async fn authorized(
        &self,
        build: impl Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CaError> {
        let mut token = self.bearer().await?;
        for attempt in 0..2 {
            let response = build(&self.http, &self.base_url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| CaError::Transport(e.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                token = self.login().await?;
                continue;
            }
            if !response.status().is_success() {
                return Err(CaError::Transport(format!(
                    "ca answered {}",
                    response.status()
                )));
            }
            return Ok(response);
        }
        Err(CaError::Authentication("token refresh failed".into()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: String) -> Result<T, CaError> {
        let response = self
            .authorized(move |http, base| http.get(format!("{base}{path}")))
            .await?;
        response
            .json()
            .await
            .map_err(|e| CaError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl CertificateAuthority for SectigoClient {
    async fn user_available_balance(&self) -> Result<i64, CaError> {
        let balance: BalanceResponse = self
            .get_json("/api/v1/users/available_balance".to_string())
            .await?;
        Ok(balance.balance)
    }

    async fn create_batch(
        &self,
        profile: &str,
        params: &HashMap<String, String>,
    ) -> Result<BatchInfo, CaError> {
        let profile = if profile.is_empty() {
            self.profile_default.as_str()
        } else {
            profile
        };
        let body = CreateBatchRequest {
            profile_name: profile,
            batch_requests: vec![params],
        };
        let body = serde_json::to_value(&body).map_err(|e| CaError::Protocol(e.to_string()))?;
        let response = self
            .authorized(move |http, base| {
                http.put(format!("{base}/api/v1/batches/createbatch"))
                    .json(&body)
            })
            .await?;
        let batch: BatchResponse = response
            .json()
            .await
            .map_err(|e| CaError::Protocol(e.to_string()))?;
        Ok(BatchInfo {
            batch_id: batch.batch_id,
            authority_id: batch.authority_id,
            order_number: batch.order_number,
            creation_date: batch.creation_date,
            status: batch.status,
        })
    }

    async fn batch_detail(&self, batch_id: i64) -> Result<BatchDetail, CaError> {
        let detail: BatchDetailResponse =
            self.get_json(format!("/api/v1/batches/{batch_id}")).await?;
        Ok(BatchDetail {
            batch_id: detail.batch_id,
            batch_name: detail.batch_name,
            status: detail.status,
            reject_reason: detail.reject_reason,
        })
    }

    async fn batch_status(&self, batch_id: i64) -> Result<String, CaError> {
        let status: StatusResponse = self
            .get_json(format!("/api/v1/batches/{batch_id}/status"))
            .await?;
        Ok(status.status)
    }

    async fn batch_processing_info(&self, batch_id: i64) -> Result<ProcessingInfo, CaError> {
        let info: ProcessingInfoResponse = self
            .get_json(format!("/api/v1/batches/{batch_id}/processing_info"))
            .await?;
        Ok(ProcessingInfo {
            active: info.active,
            success: info.success,
            failed: info.failed,
        })
    }

    async fn download(&self, batch_id: i64) -> Result<Vec<u8>, CaError> {
        let response = self
            .authorized(move |http, base| {
                http.get(format!("{base}/api/v1/batches/{batch_id}/download"))
            })
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
