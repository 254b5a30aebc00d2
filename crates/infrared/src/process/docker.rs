//! Backend as a container managed through the Docker Engine HTTP API.

use reqwest::StatusCode;
use serde::Deserialize;

use super::OPERATION_TIMEOUT;
use crate::error::ProcessError;

const DEFAULT_DOCKER_HOST: &str = "tcp://127.0.0.1:2375";

/// The raw Engine API surface, shared with the Portainer variant which
/// injects a bearer token in front of it.
pub(crate) struct DockerApi {
    http: reqwest::Client,
    base_url: String,
    container_name: String,
}

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names")]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerInspect {
    #[serde(rename = "State")]
    state: ContainerState,
}

#[derive(Debug, Deserialize)]
struct ContainerState {
    #[serde(rename = "Running")]
    running: bool,
}

impl DockerApi {
    pub(crate) fn new(base_url: String, container_name: String) -> Result<Self, ProcessError> {
        let http = reqwest::Client::builder()
            .timeout(OPERATION_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            container_name,
        })
    }

    fn check(status: StatusCode) -> Result<(), ProcessError> {
        match status {
            s if s.is_success() => Ok(()),
            // 304: the container is already in the requested state.
            StatusCode::NOT_MODIFIED => Ok(()),
            StatusCode::UNAUTHORIZED => Err(ProcessError::Unauthorized),
            s => Err(ProcessError::UnexpectedStatus(s)),
        }
    }

    async fn resolve_container_id(&self, bearer: Option<&str>) -> Result<String, ProcessError> {
        let mut req = self
            .http
            .get(format!("{}/containers/json?all=true", self.base_url));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        Self::check(resp.status())?;

        let containers: Vec<ContainerSummary> = resp.json().await?;

        containers
            .into_iter()
            .find(|c| c.names.iter().any(|n| n == &self.container_name))
            .map(|c| c.id)
            .ok_or_else(|| ProcessError::ContainerNotFound(self.container_name.clone()))
    }

    pub(crate) async fn start(&self, bearer: Option<&str>) -> Result<(), ProcessError> {
        let id = self.resolve_container_id(bearer).await?;

        let mut req = self
            .http
            .post(format!("{}/containers/{id}/start", self.base_url));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        Self::check(req.send().await?.status())
    }

    pub(crate) async fn stop(&self, bearer: Option<&str>) -> Result<(), ProcessError> {
        let id = self.resolve_container_id(bearer).await?;

        let mut req = self
            .http
            .post(format!("{}/containers/{id}/stop", self.base_url));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        Self::check(req.send().await?.status())
    }

    pub(crate) async fn is_running(&self, bearer: Option<&str>) -> Result<bool, ProcessError> {
        let id = self.resolve_container_id(bearer).await?;

        let mut req = self
            .http
            .get(format!("{}/containers/{id}/json", self.base_url));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        Self::check(resp.status())?;

        let inspect: ContainerInspect = resp.json().await?;
        Ok(inspect.state.running)
    }
}

/// A container on a directly reachable Docker daemon.
pub struct DockerProcess {
    api: DockerApi,
}

impl DockerProcess {
    pub fn new(address: &str, container_name: &str) -> Result<Self, ProcessError> {
        let address = if address.is_empty() {
            std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_DOCKER_HOST.to_owned())
        } else {
            address.to_owned()
        };

        // The engine speaks HTTP over its TCP socket.
        let base_url = address.replacen("tcp://", "http://", 1);

        // The engine prefixes container names with a slash.
        let container_name = format!("/{}", container_name.trim_start_matches('/'));

        Ok(Self {
            api: DockerApi::new(base_url, container_name)?,
        })
    }
}

#[async_trait::async_trait]
impl super::Process for DockerProcess {
    async fn start(&self) -> Result<(), ProcessError> {
        self.api.start(None).await
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        self.api.stop(None).await
    }

    async fn is_running(&self) -> Result<bool, ProcessError> {
        self.api.is_running(None).await
    }
}
