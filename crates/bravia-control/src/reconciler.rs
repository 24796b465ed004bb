//! State reconciler.
//!
//! Translates percentage-style requests into device commands and decides the
//! settled value callers get to see.
//!
//! Volume requests are debounced: each request replaces the pending one and
//! restarts the timer, so a burst collapses into one device write. Every
//! caller in the burst receives the settled value of that single write. After
//! the write the speaker volume is re-queried; a mismatch is taken to mean an
//! external audio system owns the volume, in which case the request is
//! replayed as discrete `VolumeUp`/`VolumeDown` keys and the settled value
//! is 0.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::DeviceStateClient;
use crate::config::DeviceConfig;
use crate::controls::{Control, ControlKind, SwitchAction};
use crate::error::{ControlError, Result};
use crate::events::{StateEvent, StateEventBus, StateProperty, StateValue};
use crate::sequencer::CommandSequencer;
use crate::wake::WakeSignal;

/// A volume request in slider semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeRequest {
    Absolute(u16),
    Relative(i32),
}

impl VolumeRequest {
    /// Negative slider values are deltas, the rest are absolute levels.
    pub fn from_level(level: i32) -> Self {
        if level < 0 {
            VolumeRequest::Relative(level)
        } else {
            VolumeRequest::Absolute(u16::try_from(level).unwrap_or(u16::MAX))
        }
    }

    /// Absolute target against `base`, clamped to `[0, max]`.
    pub fn target(&self, base: u16, max: u16) -> u16 {
        match *self {
            VolumeRequest::Absolute(level) => level.min(max),
            VolumeRequest::Relative(delta) => {
                let target = (i64::from(base) + i64::from(delta)).clamp(0, i64::from(max));
                target as u16
            }
        }
    }

    /// Signed key presses used when an external audio system owns volume.
    /// The external level is unknown, so the raw request is the step count.
    pub fn steps(&self) -> i32 {
        match *self {
            VolumeRequest::Absolute(level) => i32::from(level),
            VolumeRequest::Relative(delta) => delta,
        }
    }
}

/// Key presses that move an external audio system by `steps`.
pub fn volume_steps(steps: i32) -> Vec<&'static str> {
    // Zero sends nothing; a bare VolumeDown would move an unknown level.
    let key = if steps >= 0 { "VolumeUp" } else { "VolumeDown" };
    vec![key; steps.unsigned_abs() as usize]
}

/// Limits and identity used by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub name: String,
    pub max_volume: u16,
    pub max_channel: u32,
    pub mac_address: Option<String>,
    pub debounce: Duration,
}

impl ReconcilerConfig {
    pub fn from_device(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            max_volume: config.max_volume,
            max_channel: config.max_channel,
            mac_address: config.mac_address.clone(),
            debounce: config.timing.debounce(),
        }
    }
}

/// Debounced volume change waiting for its timer.
#[derive(Debug)]
struct PendingMutation {
    request: VolumeRequest,
    generation: u64,
    timer: JoinHandle<()>,
    waiters: Vec<oneshot::Sender<Result<u16>>>,
}

/// Reconciled values callers see.
#[derive(Debug, Default)]
struct ReconcilerSession {
    /// Last confirmed speaker volume, the base for relative requests
    previous_volume: u16,
    /// `previous_volume` came from the set rather than the default
    base_known: bool,
    volume_status: u16,
    channel_status: u32,
    muted: bool,
    volume_in_progress: bool,
    switch_states: HashMap<String, bool>,
    generation: u64,
    pending_volume: Option<PendingMutation>,
}

/// Snapshot of the reconciled values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledState {
    pub previous_volume: u16,
    pub volume: u16,
    pub channel: u32,
    pub muted: bool,
    pub volume_pending: bool,
}

struct ReconcilerInner {
    config: ReconcilerConfig,
    client: Arc<DeviceStateClient>,
    sequencer: Arc<CommandSequencer>,
    waker: Arc<dyn WakeSignal>,
    events: StateEventBus,
    session: Mutex<ReconcilerSession>,
    /// Serializes volume writes so one settles before the next starts.
    volume_write: tokio::sync::Mutex<()>,
}

/// Coordinates mutations with the sequencer and state client.
#[derive(Clone)]
pub struct StateReconciler {
    inner: Arc<ReconcilerInner>,
}

impl StateReconciler {
    pub fn new(
        config: ReconcilerConfig,
        client: Arc<DeviceStateClient>,
        waker: Arc<dyn WakeSignal>,
        events: StateEventBus,
    ) -> Self {
        let sequencer = client.sequencer().clone();
        Self {
            inner: Arc::new(ReconcilerInner {
                config,
                client,
                sequencer,
                waker,
                events,
                session: Mutex::new(ReconcilerSession::default()),
                volume_write: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<DeviceStateClient> {
        &self.inner.client
    }

    pub fn events(&self) -> &StateEventBus {
        &self.inner.events
    }

    pub fn state(&self) -> ReconciledState {
        let session = self.inner.session();
        ReconciledState {
            previous_volume: session.previous_volume,
            volume: session.volume_status,
            channel: session.channel_status,
            muted: session.muted,
            volume_pending: session.pending_volume.is_some() || session.volume_in_progress,
        }
    }

    /// Fail with `DeviceNotOn` unless the set is known or found to be on.
    async fn ensure_on(&self) -> Result<()> {
        if self.inner.client.state().power == Some(true) {
            return Ok(());
        }
        if self.inner.client.get_power().await? {
            Ok(())
        } else {
            Err(ControlError::DeviceNotOn)
        }
    }

    /// Request a volume change and wait for its settled value.
    pub async fn set_volume(&self, request: VolumeRequest) -> Result<u16> {
        if let Err(e) = self.ensure_on().await {
            self.inner.session().volume_status = 0;
            return Err(e);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut session = self.inner.session();
            let mut waiters = Vec::new();
            if let Some(superseded) = session.pending_volume.take() {
                superseded.timer.abort();
                debug!(request = ?superseded.request, "volume request superseded");
                waiters = superseded.waiters;
            }
            waiters.push(tx);

            session.generation += 1;
            let generation = session.generation;
            let inner = Arc::clone(&self.inner);
            let debounce = inner.config.debounce;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                inner.fire_volume(generation).await;
            });

            session.pending_volume = Some(PendingMutation {
                request,
                generation,
                timer,
                waiters,
            });
        }

        rx.await
            .map_err(|_| ControlError::Cancelled("volume request dropped".to_string()))?
    }

    /// Query the speaker volume and publish it, unless a change is pending.
    pub async fn get_volume(&self) -> Result<u16> {
        let status = self.inner.client.get_volume_and_mute().await?;
        let Some(speaker) = status.speaker().cloned() else {
            return Ok(self.inner.session().volume_status);
        };

        {
            let mut session = self.inner.session();
            session.muted = speaker.muted;
            if session.pending_volume.is_some() || session.volume_in_progress {
                // The reply may predate the pending write.
                return Ok(session.volume_status);
            }
            session.previous_volume = speaker.volume;
            session.base_known = true;
            session.volume_status = speaker.volume;
        }

        self.inner
            .publish(StateProperty::Volume, StateValue::Level(i64::from(speaker.volume)))
            .await;
        self.inner
            .publish(StateProperty::Mute, StateValue::Bool(speaker.muted))
            .await;
        Ok(speaker.volume)
    }

    /// Toggle mute if the requested state differs from the known one.
    ///
    /// Ignored while a volume change is pending, since the toggle key would
    /// land in the middle of the volume keys.
    pub async fn set_mute(&self, muted: bool) -> Result<bool> {
        self.ensure_on().await?;

        {
            let session = self.inner.session();
            if session.pending_volume.is_some() || session.volume_in_progress {
                return Ok(session.muted);
            }
            if session.muted == muted {
                return Ok(muted);
            }
        }

        self.inner.sequencer.send_action("Mute").await?;
        self.inner.session().muted = muted;
        self.inner.publish(StateProperty::Mute, StateValue::Bool(muted)).await;
        Ok(muted)
    }

    pub fn is_muted(&self) -> bool {
        self.inner.session().muted
    }

    /// Key in a channel; the clamped target is reported without a query.
    pub async fn set_channel(&self, target: i64) -> Result<u32> {
        if let Err(e) = self.ensure_on().await {
            self.inner.session().channel_status = 0;
            return Err(e);
        }

        let channel = target.clamp(0, i64::from(self.inner.config.max_channel)) as u32;
        self.inner.client.set_channel(channel).await?;

        self.inner.session().channel_status = channel;
        self.inner
            .publish(StateProperty::Channel, StateValue::Level(i64::from(channel)))
            .await;
        Ok(channel)
    }

    /// Current channel, or 0 when not watching a broadcast source.
    pub async fn get_channel(&self) -> Result<u32> {
        let channel = match self.inner.client.get_channel().await {
            Ok(channel) => channel.unwrap_or(0),
            Err(e) => {
                let mut session = self.inner.session();
                session.channel_status = 0;
                return Err(e);
            }
        };

        self.inner.session().channel_status = channel;
        self.inner
            .publish(StateProperty::Channel, StateValue::Level(i64::from(channel)))
            .await;
        Ok(channel)
    }

    /// Turn the set on or off.
    ///
    /// Power-on with a configured MAC address uses wake-on-LAN, since the
    /// control API does not answer while the set is off.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        match (&self.inner.config.mac_address, on) {
            (Some(mac), true) => {
                self.inner
                    .waker
                    .wake(mac)
                    .await
                    .map_err(|e| ControlError::PowerChangeFailed(e.to_string()))?;
                self.inner.client.record_power(true);
            }
            _ => {
                self.inner
                    .client
                    .set_power(on)
                    .await
                    .map_err(|e| ControlError::PowerChangeFailed(e.to_string()))?;
            }
        }

        info!(device = %self.inner.config.name, on, "power changed");
        self.inner.publish(StateProperty::Power, StateValue::Bool(on)).await;
        Ok(())
    }

    pub async fn get_power(&self) -> Result<bool> {
        let on = self.inner.client.get_power().await?;
        self.inner.publish(StateProperty::Power, StateValue::Bool(on)).await;
        Ok(on)
    }

    /// Toggle a switch control.
    pub async fn set_switch(&self, control: &Control, on: bool) -> Result<bool> {
        let action = match &control.kind {
            ControlKind::Switch(action) => action,
            ControlKind::Power => {
                self.set_power(on).await?;
                return Ok(on);
            }
            _ => {
                return Err(ControlError::InvalidConfig(format!(
                    "{} is not a switch",
                    control.name
                )))
            }
        };

        if let Err(e) = self.ensure_on().await {
            self.inner.session().switch_states.insert(control.name.clone(), false);
            return Err(e);
        }

        match action {
            SwitchAction::Commands { on: on_keys, off: off_keys } => {
                let keys = if on { on_keys } else { off_keys };
                self.send_keys(keys).await?;
            }
            SwitchAction::Content { on_uri, off_uri } => {
                let uri = if on { on_uri } else { off_uri };
                self.inner.client.set_play_content(uri).await?;
            }
            SwitchAction::Passive => {}
        }

        self.inner
            .session()
            .switch_states
            .insert(control.name.clone(), on);
        self.inner
            .publish_for(&control.name, StateProperty::Switch, StateValue::Bool(on))
            .await;
        Ok(on)
    }

    /// Switch state: on when the playing HDMI input's title names the control.
    pub async fn get_switch(&self, control: &Control) -> Result<bool> {
        let powered = self.inner.client.get_power().await?;

        let state = if !powered {
            false
        } else {
            let matched = match self.inner.client.get_current_source().await {
                Ok(content) if content.is_hdmi() => {
                    let title = format!(
                        "{} {}",
                        self.inner.config.name,
                        content.title.unwrap_or_default()
                    );
                    title.to_lowercase().contains(&control.name.to_lowercase())
                }
                Ok(_) => false,
                Err(e) => {
                    debug!(control = %control.name, error = %e, "no playing content");
                    false
                }
            };
            let session = self.inner.session();
            matched
                || session
                    .switch_states
                    .get(&control.name)
                    .copied()
                    .unwrap_or(false)
        };

        self.inner
            .session()
            .switch_states
            .insert(control.name.clone(), state);
        self.inner
            .publish_for(&control.name, StateProperty::Switch, StateValue::Bool(state))
            .await;
        Ok(state)
    }

    async fn send_keys(&self, keys: &[String]) -> Result<()> {
        match keys {
            [] => Ok(()),
            [single] => self.inner.sequencer.send_action(single).await,
            many => self.inner.sequencer.send_sequence(many).await.map(|_| ()),
        }
    }
}

impl ReconcilerInner {
    fn session(&self) -> MutexGuard<'_, ReconcilerSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn publish(&self, property: StateProperty, value: StateValue) {
        self.publish_for(&self.config.name, property, value).await;
    }

    async fn publish_for(&self, control: &str, property: StateProperty, value: StateValue) {
        self.events
            .publish(StateEvent::new(control, property, value))
            .await;
    }

    /// Timer body: commit the pending mutation if it is still current.
    async fn fire_volume(&self, generation: u64) {
        let pending = {
            let mut session = self.session();
            let current = session
                .pending_volume
                .as_ref()
                .is_some_and(|p| p.generation == generation);
            if !current {
                return;
            }
            session.volume_in_progress = true;
            session.pending_volume.take()
        };
        let Some(pending) = pending else {
            return;
        };

        let result = {
            let _write = self.volume_write.lock().await;
            self.apply_volume(pending.request).await
        };

        {
            let mut session = self.session();
            if session.pending_volume.is_none() {
                session.volume_in_progress = false;
            }
        }

        if let Ok(settled) = &result {
            self.publish(StateProperty::Volume, StateValue::Level(i64::from(*settled)))
                .await;
        }

        for waiter in pending.waiters {
            let _ = waiter.send(result.clone());
        }
    }

    /// Base for a relative request, read from the set if none is confirmed yet.
    async fn volume_base(&self, request: VolumeRequest) -> Result<u16> {
        {
            let session = self.session();
            if session.base_known || matches!(request, VolumeRequest::Absolute(_)) {
                return Ok(session.previous_volume);
            }
        }

        let status = self.client.get_volume_and_mute().await?;
        let mut session = self.session();
        if let Some(speaker) = status.speaker() {
            session.previous_volume = speaker.volume;
            session.base_known = true;
            session.muted = speaker.muted;
        }
        Ok(session.previous_volume)
    }

    /// Write, verify, and fall back to discrete keys on a mismatch.
    async fn apply_volume(&self, request: VolumeRequest) -> Result<u16> {
        let base = self.volume_base(request).await?;
        let target = request.target(base, self.config.max_volume);
        debug!(?request, base, target, "setting volume");

        self.client.set_volume(target).await?;
        let status = self.client.get_volume_and_mute().await?;
        let speaker = status.speaker().cloned();

        if let Some(speaker) = speaker.as_ref().filter(|s| s.volume == target) {
            self.client.record_volume(target);
            let mut session = self.session();
            session.previous_volume = target;
            session.base_known = true;
            session.volume_status = target;
            session.muted = speaker.muted;
            return Ok(target);
        }

        let steps = request.steps();
        warn!(
            expected = target,
            reported = ?speaker.map(|s| s.volume),
            steps,
            "speaker volume did not follow; sending volume keys to external audio"
        );
        let keys = volume_steps(steps);
        if !keys.is_empty() {
            self.sequencer.send_sequence(&keys).await?;
        }

        self.session().volume_status = 0;
        Ok(0)
    }
}
