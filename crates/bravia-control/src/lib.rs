//! Remote control for Sony Bravia televisions.
//!
//! Provides:
//! - Action name to IRCC code resolution
//! - A paced, serialized command sequencer with an open-app macro
//! - A JSON-RPC state client for power, volume, channel and content
//! - A reconciler that debounces volume and settles reported values
//! - Wake-on-LAN, state polling and a state event bus

pub mod action;
pub mod client;
pub mod config;
pub mod controls;
pub mod device;
pub mod error;
pub mod events;
pub mod poller;
pub mod reconciler;
pub mod rpc;
pub mod sequencer;
pub mod transport;
pub mod wake;

// Re-exports
pub use action::{channel_digits, parse_sequence, ActionResolver, CommandCode};

pub use client::{DeviceState, DeviceStateClient, PlayingContent, VolumeInfo, VolumeStatus};

pub use config::{ButtonConfig, DeviceConfig, TimingConfig};

pub use controls::{controls_for, Control, ControlKind, SwitchAction};

pub use device::BraviaTv;

pub use error::{AppPhase, ControlError, Result, TransportError};

pub use events::{EventFilter, StateEvent, StateEventBus, StateProperty, StateValue};

pub use poller::{PollReport, PollerConfig, StatePoller};

pub use reconciler::{ReconciledState, ReconcilerConfig, StateReconciler, VolumeRequest};

pub use rpc::{HttpRpcTransport, RpcReply, RpcRequest, RpcTransport, Service};

pub use sequencer::{CommandSequencer, DispatchSession, DispatchStats, SequenceReport};

pub use transport::{CommandTransport, IrccTransport};

pub use wake::{MagicPacketWaker, WakeSignal};
