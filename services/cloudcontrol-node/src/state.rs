use crate::error::NodeResult;
use cloudcontrol_c2_router::{
    CommandClient, ExecuteError, FreshnessWindow, HttpTransport, InboundAuthenticator,
    LivenessProbe, Orchestrator, PeerTransport, PingProbe, PowerController, PowerExecutor,
    SystemPowerController,
};
use cloudcontrol_core::{Config, NodeSettings};
use cloudcontrol_identity::{LocalKeypair, TrustedKeySet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a request handler needs. Read-only while serving.
pub struct NodeState {
    pub config: Config,
    pub settings: NodeSettings,
    pub authenticator: InboundAuthenticator,
    pub executor: PowerExecutor,
    pub orchestrator: Orchestrator,
    pub webadmin_enabled: bool,
}

impl NodeState {
    pub fn builder(
        config: Config,
        keypair: Arc<LocalKeypair>,
        trusted_keys: Arc<TrustedKeySet>,
    ) -> NodeStateBuilder {
        NodeStateBuilder {
            config,
            keypair,
            trusted_keys,
            settings: NodeSettings::default(),
            transport: None,
            probe: None,
            power: None,
            webadmin_enabled: false,
        }
    }
}

/// Assembles [`NodeState`]; unset collaborators default to the system ones.
pub struct NodeStateBuilder {
    config: Config,
    keypair: Arc<LocalKeypair>,
    trusted_keys: Arc<TrustedKeySet>,
    settings: NodeSettings,
    transport: Option<Arc<dyn PeerTransport>>,
    probe: Option<Arc<dyn LivenessProbe>>,
    power: Option<Arc<dyn PowerController>>,
    webadmin_enabled: bool,
}

impl NodeStateBuilder {
    pub fn settings(mut self, settings: NodeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn liveness_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn power_controller(mut self, power: Arc<dyn PowerController>) -> Self {
        self.power = Some(power);
        self
    }

    pub fn webadmin(mut self, enabled: bool) -> Self {
        self.webadmin_enabled = enabled;
        self
    }

    /// Build the state plus the receiver for detached power-off failures.
    pub fn build(self) -> NodeResult<(NodeState, mpsc::UnboundedReceiver<ExecuteError>)> {
        let transport: Arc<dyn PeerTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                self.settings.port,
                self.settings.client_timeout,
            )?),
        };
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(PingProbe::new()) as Arc<dyn LivenessProbe>);
        let power = self
            .power
            .unwrap_or_else(|| Arc::new(SystemPowerController::new()) as Arc<dyn PowerController>);

        let (executor, failures) = PowerExecutor::new(power);
        let client = CommandClient::new(self.keypair, transport);
        let orchestrator = Orchestrator::new(
            self.config.peers().to_vec(),
            client,
            probe,
            executor.clone(),
        );
        let authenticator = InboundAuthenticator::new(
            self.trusted_keys,
            FreshnessWindow::new(self.settings.freshness_window),
        );

        let state = NodeState {
            config: self.config,
            settings: self.settings,
            authenticator,
            executor,
            orchestrator,
            webadmin_enabled: self.webadmin_enabled,
        };
        Ok((state, failures))
    }
}
