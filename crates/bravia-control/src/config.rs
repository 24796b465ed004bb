//! Device and timing configuration.
//!
//! ```toml
//! name = "Living Room TV"
//! host = "192.168.1.50"
//! psk = "0000"
//! mac_address = "AA:BB:CC:DD:EE:FF"
//! poll_interval_secs = 30
//!
//! [[buttons]]
//! name = "Volume"
//! button_type = "V"
//!
//! [[buttons]]
//! name = "Netflix"
//! button_type = "S"
//! on_command = "Netflix"
//! off_command = "Home"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Short spacing between remote codes.
pub const DEFAULT_DELAY_MS: u64 = 350;
/// Spacing for settle-sensitive codes such as `Home`.
pub const PAUSED_DELAY_MS: u64 = 3000;
/// Quiet window that coalesces volume requests.
pub const DEBOUNCE_MS: u64 = 1000;

/// Connection and behaviour settings for one television.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name, also used to match HDMI input titles
    #[serde(default = "default_name")]
    pub name: String,
    /// Host name or IP address
    pub host: String,
    /// HTTP port of the control API
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pre-shared key sent as `X-Auth-PSK`
    #[serde(default = "default_psk")]
    pub psk: String,
    /// Hardware address for wake-on-LAN
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Upper bound for volume targets
    #[serde(default = "default_max_volume")]
    pub max_volume: u16,
    /// Upper bound for channel targets
    #[serde(default = "default_max_channel")]
    pub max_channel: u32,
    /// Whether the poller should run
    #[serde(default = "default_polling")]
    pub polling: bool,
    /// Polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Command pacing and debounce settings
    #[serde(default)]
    pub timing: TimingConfig,
    /// Extra controls exposed besides the power switch
    #[serde(default)]
    pub buttons: Vec<ButtonConfig>,
}

fn default_name() -> String {
    "Sony TV".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_psk() -> String {
    "0000".to_string()
}

fn default_max_volume() -> u16 {
    100
}

fn default_max_channel() -> u32 {
    999
}

fn default_polling() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    5000
}

impl DeviceConfig {
    /// Create a configuration for a host with all defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            host: host.into(),
            port: default_port(),
            psk: default_psk(),
            mac_address: None,
            max_volume: default_max_volume(),
            max_channel: default_max_channel(),
            polling: default_polling(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            timing: TimingConfig::default(),
            buttons: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_psk(mut self, psk: impl Into<String>) -> Self {
        self.psk = psk.into();
        self
    }

    pub fn with_mac_address(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_button(mut self, button: ButtonConfig) -> Self {
        self.buttons.push(button);
        self
    }

    /// Base URL of the control API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reject settings the controller cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ControlError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.max_volume == 0 {
            return Err(ControlError::InvalidConfig("max_volume must be positive".to_string()));
        }
        if self.max_channel == 0 {
            return Err(ControlError::InvalidConfig("max_channel must be positive".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ControlError::InvalidConfig(
                "poll_interval_secs must be positive".to_string(),
            ));
        }
        for button in &self.buttons {
            if button.name.trim().is_empty() {
                return Err(ControlError::InvalidConfig("button name must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Inter-command pacing.
///
/// The delays are lower bounds on spacing: the set drops codes that arrive
/// closer together than this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_delay")]
    pub default_delay_ms: u64,
    #[serde(default = "paused_delay")]
    pub paused_delay_ms: u64,
    #[serde(default = "debounce")]
    pub debounce_ms: u64,
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}

fn paused_delay() -> u64 {
    PAUSED_DELAY_MS
}

fn debounce() -> u64 {
    DEBOUNCE_MS
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: DEFAULT_DELAY_MS,
            paused_delay_ms: PAUSED_DELAY_MS,
            debounce_ms: DEBOUNCE_MS,
        }
    }
}

impl TimingConfig {
    pub fn with_default_delay(mut self, ms: u64) -> Self {
        self.default_delay_ms = ms;
        self
    }

    pub fn with_paused_delay(mut self, ms: u64) -> Self {
        self.paused_delay_ms = ms;
        self
    }

    pub fn with_debounce(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn paused_delay(&self) -> Duration {
        Duration::from_millis(self.paused_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// An additional control (volume slider, channel slider or switch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// Name appended to the device name
    pub name: String,
    /// `V` volume, `C` channel, `S`/`O` switch
    #[serde(default = "default_button_type")]
    pub button_type: String,
    /// Space-delimited actions sent when switched on
    #[serde(default)]
    pub on_command: Option<String>,
    /// Actions sent when switched off; defaults to `on_command`
    #[serde(default)]
    pub off_command: Option<String>,
    /// Content URI played when switched on
    #[serde(default)]
    pub on_uri: Option<String>,
    /// Content URI played when switched off; defaults to `on_uri`
    #[serde(default)]
    pub off_uri: Option<String>,
}

fn default_button_type() -> String {
    "S".to_string()
}

impl ButtonConfig {
    pub fn new(name: impl Into<String>, button_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            button_type: button_type.into(),
            on_command: None,
            off_command: None,
            on_uri: None,
            off_uri: None,
        }
    }

    pub fn with_commands(mut self, on: impl Into<String>, off: Option<String>) -> Self {
        self.on_command = Some(on.into());
        self.off_command = off;
        self
    }

    pub fn with_uris(mut self, on: impl Into<String>, off: Option<String>) -> Self {
        self.on_uri = Some(on.into());
        self.off_uri = off;
        self
    }
}
