//! Command sequencer.
//!
//! Turns action names into IRCC codes and sends them strictly one at a time.
//! Every send is followed by the current inter-command delay before the next
//! one may start, and multi-step sequences hold exclusive access to the
//! transport from their first action to the end of their last delay.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::action::ActionResolver;
use crate::config::TimingConfig;
use crate::error::{AppPhase, ControlError, Result};
use crate::transport::CommandTransport;

/// Actions that bring the set back to its home screen.
pub const SETTLE_SEQUENCE: [&str; 2] = ["exit", "home"];
/// Action that opens the highlighted item.
pub const CONFIRM_SEQUENCE: [&str; 1] = ["confirm"];

/// Per-device dispatch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSession {
    /// A command is outstanding on the transport
    pub in_flight: bool,
    /// A multi-step sequence is running, delays included
    pub sequence_active: bool,
    /// Spacing applied after each command
    pub inter_command_delay: Duration,
    /// Last app or input opened through the app macro
    pub current_open_app: Option<String>,
}

/// Dispatch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub commands_sent: u64,
    pub commands_failed: u64,
    pub sequences_completed: u64,
    pub last_error: Option<String>,
}

/// A sequence that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub actions: Vec<String>,
    pub elapsed: Duration,
}

struct SequencerState {
    session: DispatchSession,
    stats: DispatchStats,
}

/// Serialized, paced dispatcher for one television.
pub struct CommandSequencer {
    resolver: Arc<ActionResolver>,
    transport: Arc<dyn CommandTransport>,
    timing: TimingConfig,
    /// Held for the whole of every single action, sequence and macro.
    gate: tokio::sync::Mutex<()>,
    state: Mutex<SequencerState>,
}

impl CommandSequencer {
    pub fn new(transport: Arc<dyn CommandTransport>, timing: TimingConfig) -> Self {
        Self::with_resolver(Arc::new(ActionResolver::global().clone()), transport, timing)
    }

    pub fn with_resolver(
        resolver: Arc<ActionResolver>,
        transport: Arc<dyn CommandTransport>,
        timing: TimingConfig,
    ) -> Self {
        let session = DispatchSession {
            in_flight: false,
            sequence_active: false,
            inter_command_delay: timing.default_delay(),
            current_open_app: None,
        };

        Self {
            resolver,
            transport,
            timing,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(SequencerState {
                session,
                stats: DispatchStats::default(),
            }),
        }
    }

    pub fn resolver(&self) -> &ActionResolver {
        &self.resolver
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    fn state(&self) -> MutexGuard<'_, SequencerState> {
        // Never held across an await; a poisoned lock still holds valid flags.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the dispatch session.
    pub fn session(&self) -> DispatchSession {
        self.state().session.clone()
    }

    pub fn stats(&self) -> DispatchStats {
        self.state().stats.clone()
    }

    pub fn current_delay(&self) -> Duration {
        self.state().session.inter_command_delay
    }

    pub fn current_open_app(&self) -> Option<String> {
        self.state().session.current_open_app.clone()
    }

    pub fn is_sequence_active(&self) -> bool {
        self.state().session.sequence_active
    }

    /// Whether some action, sequence or macro currently owns the transport.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Send one action and wait for its acknowledgment plus the current delay.
    pub async fn send_action(&self, name: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.dispatch(name).await
    }

    /// Send actions one at a time, in order, aborting on the first failure.
    pub async fn send_sequence<S: AsRef<str>>(&self, names: &[S]) -> Result<SequenceReport> {
        let _gate = self.gate.lock().await;
        let _active = SequenceGuard::enter(self);
        let report = self.run_sequence(names).await?;
        info!("Sequence '{}' finished", report.actions.join(" "));
        Ok(report)
    }

    /// Return home, navigate, confirm; record `app_label` on success.
    ///
    /// The settle phase runs with the paused delay so the home screen has
    /// rendered before navigation starts. Any failure aborts the macro and
    /// leaves the recorded app unchanged.
    pub async fn open_app_sequence<S: AsRef<str>>(
        &self,
        navigation: &[S],
        app_label: &str,
    ) -> Result<SequenceReport> {
        let _gate = self.gate.lock().await;
        let _active = SequenceGuard::enter(self);
        let started = Instant::now();

        self.set_delay(self.timing.paused_delay());
        let settle = self.run_sequence(&SETTLE_SEQUENCE).await;
        self.set_delay(self.timing.default_delay());
        let mut actions = settle.map_err(|e| Self::phase_error(AppPhase::Settle, e))?.actions;

        let navigate = self
            .run_sequence(navigation)
            .await
            .map_err(|e| Self::phase_error(AppPhase::Navigate, e))?;
        actions.extend(navigate.actions);

        let confirm = self
            .run_sequence(&CONFIRM_SEQUENCE)
            .await
            .map_err(|e| Self::phase_error(AppPhase::Confirm, e))?;
        actions.extend(confirm.actions);

        self.state().session.current_open_app = Some(app_label.to_string());
        info!(app = %app_label, "{} was opened", app_label);

        Ok(SequenceReport {
            actions,
            elapsed: started.elapsed(),
        })
    }

    fn phase_error(phase: AppPhase, source: ControlError) -> ControlError {
        warn!(%phase, error = %source, "open app sequence aborted");
        ControlError::OpenAppFailed {
            phase,
            source: Box::new(source),
        }
    }

    fn set_delay(&self, delay: Duration) {
        self.state().session.inter_command_delay = delay;
    }

    /// Caller must hold the gate.
    async fn run_sequence<S: AsRef<str>>(&self, names: &[S]) -> Result<SequenceReport> {
        let started = Instant::now();
        let mut actions = Vec::with_capacity(names.len());

        for (step, name) in names.iter().enumerate() {
            let name = name.as_ref();
            self.dispatch(name)
                .await
                .map_err(|e| ControlError::SequenceFailed {
                    step,
                    action: name.to_string(),
                    source: Box::new(e),
                })?;
            actions.push(name.to_string());
        }

        self.state().stats.sequences_completed += 1;
        Ok(SequenceReport {
            actions,
            elapsed: started.elapsed(),
        })
    }

    /// Caller must hold the gate.
    async fn dispatch(&self, name: &str) -> Result<()> {
        let code = self.resolver.resolve(name)?.clone();

        let delay = {
            let mut state = self.state();
            state.session.in_flight = true;
            state.session.inter_command_delay
        };

        let result = self.transport.send(&code).await;

        {
            let mut state = self.state();
            state.session.in_flight = false;
            match &result {
                Ok(()) => state.stats.commands_sent += 1,
                Err(e) => {
                    state.stats.commands_failed += 1;
                    state.stats.last_error = Some(e.to_string());
                }
            }
        }

        // Spacing applies after failed sends too.
        tokio::time::sleep(delay).await;

        match result {
            Ok(()) => {
                debug!(action = %name, delay_ms = delay.as_millis() as u64, "IRCC code sent");
                Ok(())
            }
            Err(e) => {
                warn!(action = %name, error = %e, "IRCC code failed");
                Err(e.into())
            }
        }
    }
}

/// Marks a sequence active and restores the session when it ends or is
/// dropped mid-way.
struct SequenceGuard<'a> {
    sequencer: &'a CommandSequencer,
}

impl<'a> SequenceGuard<'a> {
    fn enter(sequencer: &'a CommandSequencer) -> Self {
        sequencer.state().session.sequence_active = true;
        Self { sequencer }
    }
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        let default_delay = self.sequencer.timing.default_delay();
        let mut state = self.sequencer.state();
        state.session.sequence_active = false;
        state.session.in_flight = false;
        state.session.inter_command_delay = default_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CommandCode;
    use crate::error::TransportError;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, Instant)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl CommandTransport for RecordingTransport {
        async fn send(&self, code: &CommandCode) -> std::result::Result<(), TransportError> {
            if self.fail_on.as_deref() == Some(code.as_str()) {
                return Err(TransportError::Connection("refused".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((code.as_str().to_string(), Instant::now()));
            Ok(())
        }
    }

    fn code(name: &str) -> String {
        ActionResolver::global().resolve(name).unwrap().as_str().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_action_waits_for_delay() {
        let transport = Arc::new(RecordingTransport::default());
        let sequencer = CommandSequencer::new(transport.clone(), TimingConfig::default());

        let started = Instant::now();
        sequencer.send_action("Mute").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(350));
        assert_eq!(transport.sent.lock().unwrap()[0].0, code("Mute"));
        assert_eq!(sequencer.stats().commands_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_action_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let sequencer = CommandSequencer::new(transport.clone(), TimingConfig::default());

        let err = sequencer.send_action("Teleport").await.unwrap_err();
        assert!(matches!(err, ControlError::UnknownAction(_)));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_reports_failing_step() {
        let transport = Arc::new(RecordingTransport {
            fail_on: Some(code("Left")),
            ..Default::default()
        });
        let sequencer = CommandSequencer::new(transport.clone(), TimingConfig::default());

        let err = sequencer
            .send_sequence(&["Up", "Left", "Down"])
            .await
            .unwrap_err();

        match err {
            ControlError::SequenceFailed { step, action, .. } => {
                assert_eq!(step, 1);
                assert_eq!(action, "Left");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert!(!sequencer.is_sequence_active());
        assert_eq!(sequencer.stats().commands_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_delay_resets_after_macro() {
        let transport = Arc::new(RecordingTransport::default());
        let sequencer = CommandSequencer::new(transport, TimingConfig::default());

        sequencer.open_app_sequence(&["Down"], "Netflix").await.unwrap();

        assert_eq!(sequencer.current_delay(), Duration::from_millis(350));
        assert_eq!(sequencer.current_open_app().as_deref(), Some("Netflix"));
        assert!(!sequencer.is_busy());
    }
}
