//! Logical controls exposed for one television.
//!
//! The set itself is always a power switch. Each configured button adds a
//! volume slider, a channel slider or a switch that plays a key sequence or
//! a content URI.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::action::parse_sequence;
use crate::config::{ButtonConfig, DeviceConfig};

/// What a switch does when toggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchAction {
    /// Send remote keys
    Commands { on: Vec<String>, off: Vec<String> },
    /// Play a content URI
    Content { on_uri: String, off_uri: String },
    /// Only reflects the input state
    Passive,
}

impl SwitchAction {
    fn from_button(button: &ButtonConfig) -> Self {
        if let Some(on_uri) = &button.on_uri {
            let off_uri = button.off_uri.clone().unwrap_or_else(|| on_uri.clone());
            return SwitchAction::Content {
                on_uri: on_uri.clone(),
                off_uri,
            };
        }

        if let Some(on) = &button.on_command {
            let off = button.off_command.as_deref().unwrap_or(on);
            return SwitchAction::Commands {
                on: parse_sequence(on),
                off: parse_sequence(off),
            };
        }

        SwitchAction::Passive
    }
}

/// Kind of control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Power,
    Volume,
    Channel,
    Switch(SwitchAction),
}

impl ControlKind {
    /// `V` wins over `C`, which wins over `S`/`O`.
    pub fn from_button(button: &ButtonConfig) -> Option<Self> {
        let ty = button.button_type.as_str();
        if ty.contains('V') {
            Some(ControlKind::Volume)
        } else if ty.contains('C') {
            Some(ControlKind::Channel)
        } else if ty.contains('S') || ty.contains('O') {
            Some(ControlKind::Switch(SwitchAction::from_button(button)))
        } else {
            None
        }
    }
}

/// A named control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// Device name, plus the button name for buttons
    pub name: String,
    pub kind: ControlKind,
}

impl Control {
    pub fn power(device_name: &str) -> Self {
        Self {
            name: device_name.to_string(),
            kind: ControlKind::Power,
        }
    }

    pub fn from_button(device_name: &str, button: &ButtonConfig) -> Option<Self> {
        let kind = ControlKind::from_button(button)?;
        Some(Self {
            name: format!("{} {}", device_name, button.name),
            kind,
        })
    }
}

/// The power control followed by one control per usable button.
pub fn controls_for(config: &DeviceConfig) -> Vec<Control> {
    let mut controls = vec![Control::power(&config.name)];
    for button in &config.buttons {
        match Control::from_button(&config.name, button) {
            Some(control) => controls.push(control),
            None => warn!(
                button = %button.name,
                button_type = %button.button_type,
                "ignoring button with unknown type"
            ),
        }
    }
    controls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_precedence() {
        let kind = |ty: &str| ControlKind::from_button(&ButtonConfig::new("x", ty));
        assert_eq!(kind("V"), Some(ControlKind::Volume));
        assert_eq!(kind("CV"), Some(ControlKind::Volume));
        assert_eq!(kind("C"), Some(ControlKind::Channel));
        assert_eq!(kind("O"), Some(ControlKind::Switch(SwitchAction::Passive)));
        assert_eq!(kind("X"), None);
    }

    #[test]
    fn test_switch_off_defaults_to_on() {
        let button = ButtonConfig::new("Netflix", "S").with_commands("Home Netflix", None);
        let control = Control::from_button("TV", &button).unwrap();
        assert_eq!(control.name, "TV Netflix");
        assert_eq!(
            control.kind,
            ControlKind::Switch(SwitchAction::Commands {
                on: vec!["Home".to_string(), "Netflix".to_string()],
                off: vec!["Home".to_string(), "Netflix".to_string()],
            })
        );

        let button = ButtonConfig::new("HDMI 2", "S").with_uris("extInput:hdmi?port=2", None);
        match ControlKind::from_button(&button) {
            Some(ControlKind::Switch(SwitchAction::Content { on_uri, off_uri })) => {
                assert_eq!(on_uri, off_uri)
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_controls_for_skips_unknown() {
        let config = DeviceConfig::new("tv.local")
            .with_name("Den")
            .with_button(ButtonConfig::new("Volume", "V"))
            .with_button(ButtonConfig::new("Mystery", "Q"));

        let controls = controls_for(&config);
        assert_eq!(controls.len(), 2);
        assert_eq!(controls[0], Control::power("Den"));
        assert_eq!(controls[1].name, "Den Volume");
    }
}
