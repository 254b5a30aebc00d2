//! Lifecycle control over the backend behind a virtual host: a local
//! command, a Docker container, or a container behind a Portainer endpoint.
//! The worker treats every variant as the same opaque capability.

mod docker;
mod portainer;
mod system;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use docker::DockerProcess;
pub use portainer::PortainerProcess;
pub use system::SystemProcess;

use crate::error::{ProcessError, ProxyError};

/// Every operation against a process backend is bounded by this.
pub(crate) const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// An arbitrary process that can be started or stopped.
#[async_trait]
pub trait Process: Send + Sync {
    async fn start(&self) -> Result<(), ProcessError>;
    async fn stop(&self) -> Result<(), ProcessError>;
    async fn is_running(&self) -> Result<bool, ProcessError>;
}

/// Selection is declarative, by presence of config fields: a local command
/// wins over Portainer, which wins over a plain Docker daemon.
pub fn new(cfg: &ProcessConfig) -> Result<Arc<dyn Process>, ProxyError> {
    if cfg.has_system_config() {
        return Ok(Arc::new(SystemProcess::new(
            &cfg.system.directory,
            &cfg.system.start_command,
            &cfg.system.stop_command,
        )?));
    }

    if cfg.has_portainer_config() {
        return Ok(Arc::new(PortainerProcess::new(
            &cfg.docker.container_name,
            &cfg.docker.address,
            &cfg.docker.portainer.endpoint_id,
            &cfg.docker.portainer.username,
            &cfg.docker.portainer.password,
        )?));
    }

    Ok(Arc::new(DockerProcess::new(
        &cfg.docker.address,
        &cfg.docker.container_name,
    )?))
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessConfig {
    pub system: SystemConfig,
    pub docker: DockerConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemConfig {
    pub directory: String,
    pub start_command: String,
    pub stop_command: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DockerConfig {
    pub address: String,
    pub container_name: String,
    pub portainer: PortainerConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortainerConfig {
    pub endpoint_id: String,
    pub username: String,
    pub password: String,
}

impl ProcessConfig {
    fn has_system_config(&self) -> bool {
        !self.system.start_command.is_empty()
    }

    fn has_portainer_config(&self) -> bool {
        !self.docker.address.is_empty()
            && !self.docker.portainer.endpoint_id.is_empty()
            && !self.docker.portainer.username.is_empty()
            && !self.docker.portainer.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_config_wins_over_docker() {
        let mut cfg = ProcessConfig::default();
        cfg.system.start_command = "./start.sh".to_owned();
        cfg.docker.container_name = "mc".to_owned();

        assert!(cfg.has_system_config());
    }

    #[test]
    fn portainer_requires_all_fields() {
        let mut cfg = ProcessConfig::default();
        cfg.docker.address = "portainer.example:9000".to_owned();
        cfg.docker.portainer.endpoint_id = "1".to_owned();
        cfg.docker.portainer.username = "admin".to_owned();

        assert!(!cfg.has_portainer_config());

        cfg.docker.portainer.password = "hunter2".to_owned();
        assert!(cfg.has_portainer_config());
    }
}
