//! One television, fully wired.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::client::{DeviceState, DeviceStateClient};
use crate::config::DeviceConfig;
use crate::controls::{controls_for, Control};
use crate::error::Result;
use crate::events::{
    EventFilter, FilteredSubscriber, StateEvent, StateEventBus, StateProperty, StateValue,
};
use crate::poller::{PollerConfig, StatePoller};
use crate::reconciler::{ReconciledState, ReconcilerConfig, StateReconciler, VolumeRequest};
use crate::rpc::{HttpRpcTransport, RpcTransport};
use crate::sequencer::{CommandSequencer, DispatchSession, SequenceReport};
use crate::transport::{CommandTransport, IrccTransport};
use crate::wake::{MagicPacketWaker, WakeSignal};

/// Caller-facing handle for one Bravia set.
pub struct BraviaTv {
    config: DeviceConfig,
    sequencer: Arc<CommandSequencer>,
    client: Arc<DeviceStateClient>,
    reconciler: StateReconciler,
    events: StateEventBus,
    controls: Vec<Control>,
}

impl BraviaTv {
    /// Build with the HTTP transports and the UDP waker.
    pub fn connect(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let ircc = Arc::new(IrccTransport::new(&config));
        let rpc = Arc::new(HttpRpcTransport::new(&config));
        info!(device = %config.name, url = %config.base_url(), "connecting");
        Self::with_parts(config, ircc, rpc, Arc::new(MagicPacketWaker::new()))
    }

    /// Build with caller-supplied collaborators.
    pub fn with_parts(
        config: DeviceConfig,
        commands: Arc<dyn CommandTransport>,
        rpc: Arc<dyn RpcTransport>,
        waker: Arc<dyn WakeSignal>,
    ) -> Result<Self> {
        config.validate()?;

        let sequencer = Arc::new(CommandSequencer::new(commands, config.timing.clone()));
        let client = Arc::new(DeviceStateClient::new(rpc, sequencer.clone()));
        let events = StateEventBus::default();
        let reconciler = StateReconciler::new(
            ReconcilerConfig::from_device(&config),
            client.clone(),
            waker,
            events.clone(),
        );
        let controls = controls_for(&config);

        Ok(Self {
            config,
            sequencer,
            client,
            reconciler,
            events,
            controls,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn sequencer(&self) -> &Arc<CommandSequencer> {
        &self.sequencer
    }

    pub fn reconciler(&self) -> &StateReconciler {
        &self.reconciler
    }

    pub fn events(&self) -> &StateEventBus {
        &self.events
    }

    pub fn session(&self) -> DispatchSession {
        self.sequencer.session()
    }

    pub fn device_state(&self) -> DeviceState {
        self.client.state()
    }

    pub fn reconciled_state(&self) -> ReconciledState {
        self.reconciler.state()
    }

    pub async fn send_action(&self, name: &str) -> Result<()> {
        self.sequencer.send_action(name).await
    }

    pub async fn send_sequence<S: AsRef<str>>(&self, names: &[S]) -> Result<SequenceReport> {
        self.sequencer.send_sequence(names).await
    }

    pub async fn open_app_sequence<S: AsRef<str>>(
        &self,
        navigation: &[S],
        app_label: &str,
    ) -> Result<SequenceReport> {
        let report = self.sequencer.open_app_sequence(navigation, app_label).await?;
        self.events
            .publish(StateEvent::new(
                self.config.name.clone(),
                StateProperty::OpenApp,
                StateValue::Text(app_label.to_string()),
            ))
            .await;
        Ok(report)
    }

    /// Slider semantics: negative values are relative to the last level.
    pub async fn set_volume(&self, level: i32) -> Result<u16> {
        self.reconciler
            .set_volume(VolumeRequest::from_level(level))
            .await
    }

    pub async fn get_volume(&self) -> Result<u16> {
        self.reconciler.get_volume().await
    }

    pub async fn set_channel(&self, channel: i64) -> Result<u32> {
        self.reconciler.set_channel(channel).await
    }

    pub async fn get_channel(&self) -> Result<u32> {
        self.reconciler.get_channel().await
    }

    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.reconciler.set_power(on).await
    }

    pub async fn get_power(&self) -> Result<bool> {
        self.reconciler.get_power().await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<bool> {
        self.reconciler.set_mute(muted).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredSubscriber {
        self.events.subscribe_filtered(filter)
    }

    /// A poller over every control, not yet started.
    pub fn poller(&self) -> StatePoller {
        StatePoller::new(
            self.reconciler.clone(),
            self.controls.clone(),
            PollerConfig {
                interval_secs: self.config.poll_interval_secs,
            },
        )
    }
}
