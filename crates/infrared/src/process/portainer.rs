//! Backend as a container behind a Portainer instance: same Engine API,
//! reached through Portainer's endpoint proxy with a JWT that is refreshed
//! whenever a call comes back 401.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::docker::DockerApi;
use super::OPERATION_TIMEOUT;
use crate::error::ProcessError;

pub struct PortainerProcess {
    api: DockerApi,
    auth_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct JwtResponse {
    jwt: String,
}

impl PortainerProcess {
    pub fn new(
        container_name: &str,
        address: &str,
        endpoint_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ProcessError> {
        let base_url = format!("http://{address}/api/endpoints/{endpoint_id}/docker");
        let container_name = format!("/{}", container_name.trim_start_matches('/'));

        Ok(Self {
            api: DockerApi::new(base_url, container_name)?,
            auth_url: format!("http://{address}/api/auth"),
            username: username.to_owned(),
            password: password.to_owned(),
            http: reqwest::Client::builder()
                .timeout(OPERATION_TIMEOUT)
                .build()?,
            token: RwLock::new(None),
        })
    }

    async fn authenticate(&self) -> Result<String, ProcessError> {
        let resp = self
            .http
            .post(&self.auth_url)
            .json(&Credentials {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ProcessError::UnexpectedStatus(resp.status()));
        }

        let JwtResponse { jwt } = resp.json().await?;
        *self.token.write().await = Some(jwt.clone());

        Ok(jwt)
    }

    async fn current_token(&self) -> Result<String, ProcessError> {
        match self.token.read().await.clone() {
            Some(token) => Ok(token),
            None => self.authenticate().await,
        }
    }
}

#[async_trait::async_trait]
impl super::Process for PortainerProcess {
    async fn start(&self) -> Result<(), ProcessError> {
        let token = self.current_token().await?;
        match self.api.start(Some(&token)).await {
            Err(ProcessError::Unauthorized) => {
                let fresh = self.authenticate().await?;
                self.api.start(Some(&fresh)).await
            }
            other => other,
        }
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        let token = self.current_token().await?;
        match self.api.stop(Some(&token)).await {
            Err(ProcessError::Unauthorized) => {
                let fresh = self.authenticate().await?;
                self.api.stop(Some(&fresh)).await
            }
            other => other,
        }
    }

    async fn is_running(&self) -> Result<bool, ProcessError> {
        let token = self.current_token().await?;
        match self.api.is_running(Some(&token)).await {
            Err(ProcessError::Unauthorized) => {
                let fresh = self.authenticate().await?;
                self.api.is_running(Some(&fresh)).await
            }
            other => other,
        }
    }
}
