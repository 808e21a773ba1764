//! `ContainerOps` — the capability the provisioner, static provisioner,
//! and destroyer use to manage per-site Docker containers and the shared
//! volume. All mutating operations are idempotent w.r.t. "already in the
//! desired state".

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::{HostConfig, Mount, MountTypeEnum, RestartPolicy, RestartPolicyNameEnum};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use wpfleet_core::{Error, Result};

/// Whether a named container exists and, if so, whether it's running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited,
    Missing,
}

/// Resource and placement parameters for a container this controller owns.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub volume_name: String,
    pub volume_target: String,
    pub volume_read_only: bool,
    pub network: String,
    pub memory_mb: i64,
    pub cpus: f64,
    pub pids_limit: i64,
}

#[async_trait]
pub trait ContainerOps: Send + Sync {
    async fn inspect_status(&self, name: &str) -> Result<ContainerStatus>;
    async fn create_app(&self, spec: &ContainerSpec) -> Result<()>;
    async fn create_sidecar(&self, spec: &ContainerSpec) -> Result<()>;
    async fn start(&self, name: &str) -> Result<()>;
    async fn stop(&self, name: &str, timeout_secs: i64) -> Result<()>;
    async fn remove(&self, name: &str, force: bool) -> Result<()>;
    async fn copy_tar(&self, container: &str, dest_dir: &str, tar_bytes: Vec<u8>) -> Result<()>;
    async fn exec(&self, container: &str, argv: &[String]) -> Result<(i64, String)>;
    async fn volume_create(&self, name: &str) -> Result<()>;
    async fn volume_remove(&self, name: &str, force: bool) -> Result<()>;
}

pub struct BollardContainers {
    client: Docker,
}

impl BollardContainers {
    pub fn new(docker_host: Option<&str>) -> anyhow::Result<Self> {
        let client = if let Some(host) = docker_host {
            Docker::connect_with_socket(host, 120, bollard::API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_local_defaults()?
        };
        Ok(Self { client })
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        if image.contains("-local:") {
            info!(image, "skipping pull for local image");
            return Ok(());
        }

        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| Error::adapter("container", e))?;
        }
        Ok(())
    }

    fn is_not_found(err: &bollard::errors::Error) -> bool {
        matches!(err, bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404)
    }

    fn build_config(spec: &ContainerSpec) -> ContainerConfig<String> {
        let mut labels = HashMap::new();
        labels.insert("wpfleet.managed".to_string(), "true".to_string());

        let env_vec: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mount = Mount {
            target: Some(spec.volume_target.clone()),
            source: Some(spec.volume_name.clone()),
            typ: Some(MountTypeEnum::VOLUME),
            read_only: Some(spec.volume_read_only),
            ..Default::default()
        };

        let host_config = HostConfig {
            memory: Some(spec.memory_mb * 1024 * 1024),
            cpu_period: Some(100_000),
            cpu_quota: Some((spec.cpus * 100_000.0) as i64),
            pids_limit: Some(spec.pids_limit),
            mounts: Some(vec![mount]),
            network_mode: Some(spec.network.clone()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        ContainerConfig {
            image: Some(spec.image.clone()),
            env: Some(env_vec),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        match self.inspect_status(&spec.name).await? {
            ContainerStatus::Missing => {}
            _ => {
                // Already in the desired state: make sure it's started and return.
                return self.start(&spec.name).await;
            }
        }

        self.pull_image(&spec.image).await?;

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };
        self.client
            .create_container(Some(options), Self::build_config(spec))
            .await
            .map_err(|e| Error::adapter("container", e))?;

        self.start(&spec.name).await
    }
}

#[async_trait]
impl ContainerOps for BollardContainers {
    async fn inspect_status(&self, name: &str) -> Result<ContainerStatus> {
        match self.client.inspect_container(name, None).await {
            Ok(info) => {
                let running = info
                    .state
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                Ok(if running {
                    ContainerStatus::Running
                } else {
                    ContainerStatus::Exited
                })
            }
            Err(e) if Self::is_not_found(&e) => Ok(ContainerStatus::Missing),
            Err(e) => Err(Error::adapter("container", e)),
        }
    }

    async fn create_app(&self, spec: &ContainerSpec) -> Result<()> {
        info!(container = %spec.name, "creating application container");
        self.create_container(spec).await
    }

    async fn create_sidecar(&self, spec: &ContainerSpec) -> Result<()> {
        info!(container = %spec.name, "creating sidecar container");
        self.create_container(spec).await
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self
            .client
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304 Not Modified: already running.
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(Error::adapter("container", e)),
        }
    }

    async fn stop(&self, name: &str, timeout_secs: i64) -> Result<()> {
        let options = StopContainerOptions { t: timeout_secs };
        match self.client.stop_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if Self::is_not_found(&e) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(Error::adapter("container", e)),
        }
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match self.client.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if Self::is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::adapter("container", e)),
        }
    }

    async fn copy_tar(&self, container: &str, dest_dir: &str, tar_bytes: Vec<u8>) -> Result<()> {
        let options = bollard::container::UploadToContainerOptions {
            path: dest_dir,
            ..Default::default()
        };
        self.client
            .upload_to_container(container, Some(options), tar_bytes.into())
            .await
            .map_err(|e| Error::adapter("container", e))
    }

    async fn exec(&self, container: &str, argv: &[String]) -> Result<(i64, String)> {
        let options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .client
            .create_exec(container, options)
            .await
            .map_err(|e| Error::adapter("container", e))?;

        let mut output = String::new();
        if let StartExecResults::Attached { mut output: stream, .. } = self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::adapter("container", e))?
        {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| Error::adapter("container", e))?;
                output.push_str(&chunk.to_string());
            }
        }

        let inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::adapter("container", e))?;

        let exit_code = inspect.exit_code.unwrap_or(0);
        if exit_code != 0 {
            debug!(container, exit_code, %output, "exec returned non-zero");
        }
        Ok((exit_code, output))
    }

    async fn volume_create(&self, name: &str) -> Result<()> {
        let options = CreateVolumeOptions {
            name,
            ..Default::default()
        };
        match self.client.create_volume(options).await {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::adapter("container", e)),
        }
    }

    async fn volume_remove(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveVolumeOptions { force };
        match self.client.remove_volume(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if Self::is_not_found(&e) => Ok(()),
            Err(e) => {
                warn!(volume = name, error = %e, "failed to remove volume");
                Err(Error::adapter("container", e))
            }
        }
    }
}

/// In-memory fake used by orchestrator unit tests.
#[derive(Default)]
pub struct FakeContainers {
    pub containers: Mutex<HashMap<String, ContainerStatus>>,
    pub volumes: Mutex<std::collections::HashSet<String>>,
    pub copies: Mutex<Vec<(String, String)>>,
    pub execs: Mutex<Vec<(String, Vec<String>)>>,
    pub fail_step: Mutex<Option<String>>,
}

impl FakeContainers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call whose step name matches `step` return an
    /// adapter error, for exercising rollback paths.
    pub fn fail_on(&self, step: &str) {
        *self.fail_step.lock().unwrap() = Some(step.to_string());
    }

    fn maybe_fail(&self, step: &str) -> Result<()> {
        let mut guard = self.fail_step.lock().unwrap();
        if guard.as_deref() == Some(step) {
            *guard = None;
            return Err(Error::adapter("container", format!("forced failure at {step}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerOps for FakeContainers {
    async fn inspect_status(&self, name: &str) -> Result<ContainerStatus> {
        Ok(*self.containers.lock().unwrap().get(name).unwrap_or(&ContainerStatus::Missing))
    }

    async fn create_app(&self, spec: &ContainerSpec) -> Result<()> {
        self.maybe_fail("create_app")?;
        self.containers.lock().unwrap().insert(spec.name.clone(), ContainerStatus::Running);
        Ok(())
    }

    async fn create_sidecar(&self, spec: &ContainerSpec) -> Result<()> {
        self.maybe_fail("create_sidecar")?;
        self.containers.lock().unwrap().insert(spec.name.clone(), ContainerStatus::Running);
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.containers.lock().unwrap().insert(name.to_string(), ContainerStatus::Running);
        Ok(())
    }

    async fn stop(&self, name: &str, _timeout_secs: i64) -> Result<()> {
        self.containers.lock().unwrap().insert(name.to_string(), ContainerStatus::Exited);
        Ok(())
    }

    async fn remove(&self, name: &str, _force: bool) -> Result<()> {
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn copy_tar(&self, container: &str, dest_dir: &str, _tar_bytes: Vec<u8>) -> Result<()> {
        self.maybe_fail("copy_tar")?;
        self.copies.lock().unwrap().push((container.to_string(), dest_dir.to_string()));
        Ok(())
    }

    async fn exec(&self, container: &str, argv: &[String]) -> Result<(i64, String)> {
        self.maybe_fail("exec")?;
        self.execs.lock().unwrap().push((container.to_string(), argv.to_vec()));
        Ok((0, String::new()))
    }

    async fn volume_create(&self, name: &str) -> Result<()> {
        self.maybe_fail("volume_create")?;
        self.volumes.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn volume_remove(&self, name: &str, _force: bool) -> Result<()> {
        self.volumes.lock().unwrap().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_containers_round_trip_app_lifecycle() {
        let fake = FakeContainers::new();
        let spec = ContainerSpec {
            name: "php_mysite".to_string(),
            image: "wordpress:php8.2-fpm".to_string(),
            env: HashMap::new(),
            volume_name: "wp_mysite".to_string(),
            volume_target: "/var/www/html".to_string(),
            volume_read_only: false,
            network: "wpfleet".to_string(),
            memory_mb: 512,
            cpus: 1.0,
            pids_limit: 100,
        };

        assert_eq!(fake.inspect_status("php_mysite").await.unwrap(), ContainerStatus::Missing);
        fake.create_app(&spec).await.unwrap();
        assert_eq!(fake.inspect_status("php_mysite").await.unwrap(), ContainerStatus::Running);
        fake.remove("php_mysite", true).await.unwrap();
        assert_eq!(fake.inspect_status("php_mysite").await.unwrap(), ContainerStatus::Missing);
    }

    #[tokio::test]
    async fn fake_containers_can_simulate_a_failing_step() {
        let fake = FakeContainers::new();
        fake.fail_on("volume_create");
        let err = fake.volume_create("wp_mysite").await.unwrap_err();
        assert!(matches!(err, Error::Adapter { .. }));
        // The fault is consumed: the next call succeeds.
        fake.volume_create("wp_mysite").await.unwrap();
    }
}
