//! Test utilities for end-to-end node tests

use async_trait::async_trait;
use cloudcontrol_c2_router::{
    ExecuteError, LivenessProbe, PingStatus, PowerController, ProbeError,
};
use cloudcontrol_core::{Config, NodePaths, NodeSettings};
use cloudcontrol_identity::{
    load_local_keypair, load_trusted_keys, write_public_key, LocalKeypair,
};
use cloudcontrol_node::{cli, router, serve, NodeResult, NodeState};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// Power controller that records instead of switching anything off
#[derive(Default)]
pub struct RecordingPower {
    calls: Mutex<Vec<Duration>>,
    fail_with: Option<ExecuteError>,
}

impl RecordingPower {
    /// Controller whose every power-off fails with `error`
    pub fn failing(error: ExecuteError) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PowerController for RecordingPower {
    async fn power_off(&self, delay: Duration) -> Result<(), ExecuteError> {
        self.calls.lock().unwrap().push(delay);
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Liveness probe that reports every host online without running `ping`
pub struct StaticProbe;

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn probe(&self, _host: &str) -> Result<PingStatus, ProbeError> {
        Ok(PingStatus::Online)
    }
}

/// A node directory on disk, created the way `--create-config` does it
pub struct NodeDir {
    _dir: TempDir,
    pub paths: NodePaths,
    pub keypair: LocalKeypair,
    pub name: String,
}

impl NodeDir {
    pub fn create(name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::new(dir.path());
        let keypair = cli::create_config(&paths).unwrap();
        Self {
            _dir: dir,
            paths,
            keypair,
            name: name.to_string(),
        }
    }

    /// Put `other`'s public key into this node's `authorized_keys/`.
    pub fn trust(&self, other: &NodeDir) {
        let path = self
            .paths
            .authorized_keys_dir()
            .join(format!("{}.pub", other.name));
        write_public_key(&path, other.keypair.public_key()).unwrap();
    }

    /// Append a peer through the same path `--add-remote` takes.
    pub fn add_remote(&self, host: &str) {
        Config::add_remote(&self.paths, host).unwrap();
    }

    /// Change the first remote entry matching `host`.
    pub fn set_remote_async(&self, host: &str, async_poweroff: bool, delay_msec: u64) {
        let mut config = Config::load(&self.paths).unwrap();
        for remote in config.web_admin.remotes.iter_mut() {
            if remote.host == host {
                remote.async_poweroff = async_poweroff;
                remote.poweroff_delay_msec = delay_msec;
            }
        }
        config.write(&self.paths).unwrap();
    }
}

/// Bind an ephemeral loopback port.
pub async fn ephemeral_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A loopback address with nothing listening on it.
pub async fn dead_address() -> SocketAddr {
    let (listener, addr) = ephemeral_listener().await;
    drop(listener);
    addr
}

pub fn test_settings() -> NodeSettings {
    NodeSettings {
        client_timeout: Duration::from_secs(2),
        shutdown_grace: Duration::from_secs(1),
        ..NodeSettings::default()
    }
}

/// A node serving on a real socket
pub struct RunningNode {
    pub addr: SocketAddr,
    pub power: Arc<RecordingPower>,
    pub state: Arc<NodeState>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<NodeResult<()>>,
}

impl RunningNode {
    /// `host:port` as it would appear in a peer's config
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger graceful shutdown and wait for the server task.
    pub async fn stop(mut self) -> NodeResult<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap()
    }
}

/// Load `dir` from disk exactly as the binary would and serve it on `listener`.
pub async fn start_node(dir: &NodeDir, listener: TcpListener, power: RecordingPower) -> RunningNode {
    let addr = listener.local_addr().unwrap();
    let config = Config::load(&dir.paths).unwrap();
    let keypair = load_local_keypair(&dir.paths).unwrap();
    let trusted = load_trusted_keys(&dir.paths.authorized_keys_dir()).unwrap();
    let power = Arc::new(power);

    let (state, failures) = NodeState::builder(config, Arc::new(keypair), Arc::new(trusted))
        .settings(test_settings())
        .liveness_probe(Arc::new(StaticProbe))
        .power_controller(power.clone())
        .build()
        .unwrap();
    cloudcontrol_c2_router::spawn_failure_sink(failures);

    let state = Arc::new(state);
    let app = router(state.clone());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(
        listener,
        app,
        async move {
            let _ = stop_rx.await;
        },
        test_settings().shutdown_grace,
    ));

    RunningNode {
        addr,
        power,
        state,
        stop: Some(stop_tx),
        handle,
    }
}
