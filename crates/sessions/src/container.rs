use async_trait::async_trait;
use sa_domain::error::Result;

/// Abstraction over the container runtime backing a `SessionWorker`. Kept
/// narrow — start/stop/presence — because the Lifecycle Manager only ever
/// needs to know whether a container exists and to bracket sync calls
/// around start/stop (§4.8).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn start(&self, session_id: &str, workspace_s3_prefix: &str) -> Result<String>;
    async fn stop(&self, container_id: &str) -> Result<()>;
    async fn exists(&self, container_id: &str) -> Result<bool>;
}

/// In-memory stub runtime for tests and for environments without a real
/// container backend wired in. Every container "exists" until stopped.
#[derive(Default)]
pub struct StubContainerRuntime {
    stopped: parking_lot::Mutex<std::collections::HashSet<String>>,
}

#[async_trait]
impl ContainerRuntime for StubContainerRuntime {
    async fn start(&self, session_id: &str, _workspace_s3_prefix: &str) -> Result<String> {
        Ok(format!("container-{session_id}"))
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        self.stopped.lock().insert(container_id.to_string());
        Ok(())
    }

    async fn exists(&self, container_id: &str) -> Result<bool> {
        Ok(!self.stopped.lock().contains(container_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_runtime_tracks_stopped_containers() {
        let rt = StubContainerRuntime::default();
        let id = rt.start("s1", "prefix").await.unwrap();
        assert!(rt.exists(&id).await.unwrap());
        rt.stop(&id).await.unwrap();
        assert!(!rt.exists(&id).await.unwrap());
    }
}
