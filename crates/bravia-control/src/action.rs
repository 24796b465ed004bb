//! Remote-control action names and their IRCC codes.
//!
//! The code table is plain data: it is built once on first use and never
//! mutated. Aliases are applied as a single substitution before lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Opaque device command code (base64 IRCC payload).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandCode(String);

impl CommandCode {
    /// Wrap a raw code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Alternate names, resolved once before lookup.
const ALIASES: &[(&str, &str)] = &[
    ("Enter", "Confirm"),
    ("enter", "Confirm"),
    ("confirm", "Confirm"),
    ("exit", "Exit"),
    ("home", "Home"),
    ("up", "Up"),
    ("down", "Down"),
    ("left", "Left"),
    ("right", "Right"),
    ("back", "Return"),
];

const CODES: &[(&str, &str)] = &[
    ("PowerOn", "AAAAAQAAAAEAAAAuAw=="),
    ("Num1", "AAAAAQAAAAEAAAAAAw=="),
    ("Num2", "AAAAAQAAAAEAAAABAw=="),
    ("Num3", "AAAAAQAAAAEAAAACAw=="),
    ("Num4", "AAAAAQAAAAEAAAADAw=="),
    ("Num5", "AAAAAQAAAAEAAAAEAw=="),
    ("Num6", "AAAAAQAAAAEAAAAFAw=="),
    ("Num7", "AAAAAQAAAAEAAAAGAw=="),
    ("Num8", "AAAAAQAAAAEAAAAHAw=="),
    ("Num9", "AAAAAQAAAAEAAAAIAw=="),
    ("Num0", "AAAAAQAAAAEAAAAJAw=="),
    ("Num11", "AAAAAQAAAAEAAAAKAw=="),
    ("Num12", "AAAAAQAAAAEAAAALAw=="),
    ("GGuide", "AAAAAQAAAAEAAAAOAw=="),
    ("ChannelUp", "AAAAAQAAAAEAAAAQAw=="),
    ("ChannelDown", "AAAAAQAAAAEAAAARAw=="),
    ("VolumeUp", "AAAAAQAAAAEAAAASAw=="),
    ("VolumeDown", "AAAAAQAAAAEAAAATAw=="),
    ("Mute", "AAAAAQAAAAEAAAAUAw=="),
    ("TvPower", "AAAAAQAAAAEAAAAVAw=="),
    ("Audio", "AAAAAQAAAAEAAAAXAw=="),
    ("MediaAudioTrack", "AAAAAQAAAAEAAAAXAw=="),
    ("Tv", "AAAAAQAAAAEAAAAkAw=="),
    ("Input", "AAAAAQAAAAEAAAAlAw=="),
    ("TvInput", "AAAAAQAAAAEAAAAlAw=="),
    ("TvAntennaCable", "AAAAAQAAAAEAAAAqAw=="),
    ("WakeUp", "AAAAAQAAAAEAAAAuAw=="),
    ("PowerOff", "AAAAAQAAAAEAAAAvAw=="),
    ("Sleep", "AAAAAQAAAAEAAAAvAw=="),
    ("Right", "AAAAAQAAAAEAAAAzAw=="),
    ("Left", "AAAAAQAAAAEAAAA0Aw=="),
    ("SleepTimer", "AAAAAQAAAAEAAAA2Aw=="),
    ("Analog2", "AAAAAQAAAAEAAAA4Aw=="),
    ("TvAnalog", "AAAAAQAAAAEAAAA4Aw=="),
    ("Display", "AAAAAQAAAAEAAAA6Aw=="),
    ("Jump", "AAAAAQAAAAEAAAA7Aw=="),
    ("PicOff", "AAAAAQAAAAEAAAA+Aw=="),
    ("PictureOff", "AAAAAQAAAAEAAAA+Aw=="),
    ("Teletext", "AAAAAQAAAAEAAAA/Aw=="),
    ("Video1", "AAAAAQAAAAEAAABAAw=="),
    ("Video2", "AAAAAQAAAAEAAABBAw=="),
    ("AnalogRgb1", "AAAAAQAAAAEAAABDAw=="),
    ("Home", "AAAAAQAAAAEAAABgAw=="),
    ("Exit", "AAAAAQAAAAEAAABjAw=="),
    ("PictureMode", "AAAAAQAAAAEAAABkAw=="),
    ("Confirm", "AAAAAQAAAAEAAABlAw=="),
    ("Up", "AAAAAQAAAAEAAAB0Aw=="),
    ("Down", "AAAAAQAAAAEAAAB1Aw=="),
    ("ClosedCaption", "AAAAAgAAAKQAAAAQAw=="),
    ("Component1", "AAAAAgAAAKQAAAA2Aw=="),
    ("Component2", "AAAAAgAAAKQAAAA3Aw=="),
    ("Wide", "AAAAAgAAAKQAAAA9Aw=="),
    ("EPG", "AAAAAgAAAKQAAABbAw=="),
    ("PAP", "AAAAAgAAAKQAAAB3Aw=="),
    ("TenKey", "AAAAAgAAAJcAAAAMAw=="),
    ("BSCS", "AAAAAgAAAJcAAAAQAw=="),
    ("Ddata", "AAAAAgAAAJcAAAAVAw=="),
    ("Stop", "AAAAAgAAAJcAAAAYAw=="),
    ("Pause", "AAAAAgAAAJcAAAAZAw=="),
    ("Play", "AAAAAgAAAJcAAAAaAw=="),
    ("Rewind", "AAAAAgAAAJcAAAAbAw=="),
    ("Forward", "AAAAAgAAAJcAAAAcAw=="),
    ("DOT", "AAAAAgAAAJcAAAAdAw=="),
    ("Rec", "AAAAAgAAAJcAAAAgAw=="),
    ("Return", "AAAAAgAAAJcAAAAjAw=="),
    ("Blue", "AAAAAgAAAJcAAAAkAw=="),
    ("Red", "AAAAAgAAAJcAAAAlAw=="),
    ("Green", "AAAAAgAAAJcAAAAmAw=="),
    ("Yellow", "AAAAAgAAAJcAAAAnAw=="),
    ("SubTitle", "AAAAAgAAAJcAAAAoAw=="),
    ("CS", "AAAAAgAAAJcAAAArAw=="),
    ("BS", "AAAAAgAAAJcAAAAsAw=="),
    ("Digital", "AAAAAgAAAJcAAAAyAw=="),
    ("Options", "AAAAAgAAAJcAAAA2Aw=="),
    ("Media", "AAAAAgAAAJcAAAA4Aw=="),
    ("Prev", "AAAAAgAAAJcAAAA8Aw=="),
    ("Next", "AAAAAgAAAJcAAAA9Aw=="),
    ("DpadCenter", "AAAAAgAAAJcAAABKAw=="),
    ("CursorUp", "AAAAAgAAAJcAAABPAw=="),
    ("CursorDown", "AAAAAgAAAJcAAABQAw=="),
    ("CursorLeft", "AAAAAgAAAJcAAABNAw=="),
    ("CursorRight", "AAAAAgAAAJcAAABOAw=="),
    ("ShopRemoteControlForcedDynamic", "AAAAAgAAAJcAAABqAw=="),
    ("FlashPlus", "AAAAAgAAAJcAAAB4Aw=="),
    ("FlashMinus", "AAAAAgAAAJcAAAB5Aw=="),
    ("AudioQualityMode", "AAAAAgAAAJcAAAB7Aw=="),
    ("DemoMode", "AAAAAgAAAJcAAAB8Aw=="),
    ("Analog", "AAAAAgAAAHcAAAANAw=="),
    ("Mode3D", "AAAAAgAAAHcAAABNAw=="),
    ("DigitalToggle", "AAAAAgAAAHcAAABSAw=="),
    ("DemoSurround", "AAAAAgAAAHcAAAB7Aw=="),
    ("*AD", "AAAAAgAAABoAAAA7Aw=="),
    ("AudioMixUp", "AAAAAgAAABoAAAA8Aw=="),
    ("AudioMixDown", "AAAAAgAAABoAAAA9Aw=="),
    ("PhotoFrame", "AAAAAgAAABoAAABVAw=="),
    ("Tv_Radio", "AAAAAgAAABoAAABXAw=="),
    ("SyncMenu", "AAAAAgAAABoAAABYAw=="),
    ("Hdmi1", "AAAAAgAAABoAAABaAw=="),
    ("Hdmi2", "AAAAAgAAABoAAABbAw=="),
    ("Hdmi3", "AAAAAgAAABoAAABcAw=="),
    ("Hdmi4", "AAAAAgAAABoAAABdAw=="),
    ("TopMenu", "AAAAAgAAABoAAABgAw=="),
    ("PopUpMenu", "AAAAAgAAABoAAABhAw=="),
    ("OneTouchTimeRec", "AAAAAgAAABoAAABkAw=="),
    ("OneTouchView", "AAAAAgAAABoAAABlAw=="),
    ("DUX", "AAAAAgAAABoAAABzAw=="),
    ("FootballMode", "AAAAAgAAABoAAAB2Aw=="),
    ("iManual", "AAAAAgAAABoAAAB7Aw=="),
    ("Netflix", "AAAAAgAAABoAAAB8Aw=="),
    ("Assists", "AAAAAgAAAMQAAAA7Aw=="),
    ("ActionMenu", "AAAAAgAAAMQAAABLAw=="),
    ("Help", "AAAAAgAAAMQAAABNAw=="),
    ("TvSatellite", "AAAAAgAAAMQAAABOAw=="),
    ("WirelessSubwoofer", "AAAAAgAAAMQAAAB+Aw=="),
];

/// Resolves action names to command codes.
#[derive(Debug, Clone)]
pub struct ActionResolver {
    aliases: HashMap<&'static str, &'static str>,
    codes: HashMap<&'static str, CommandCode>,
}

impl ActionResolver {
    /// Shared resolver over the built-in tables.
    pub fn global() -> &'static ActionResolver {
        static RESOLVER: OnceLock<ActionResolver> = OnceLock::new();
        RESOLVER.get_or_init(|| ActionResolver::from_tables(ALIASES, CODES))
    }

    /// Build a resolver from explicit tables.
    pub fn from_tables(aliases: &[(&'static str, &'static str)], codes: &[(&'static str, &'static str)]) -> Self {
        Self {
            aliases: aliases.iter().copied().collect(),
            codes: codes
                .iter()
                .map(|(name, code)| (*name, CommandCode::new(*code)))
                .collect(),
        }
    }

    /// Apply the alias table once.
    pub fn canonical<'a>(&self, name: &'a str) -> &'a str {
        match self.aliases.get(name) {
            Some(target) => target,
            None => name,
        }
    }

    /// Look up the code for an action, after alias substitution.
    pub fn resolve(&self, name: &str) -> Result<&CommandCode> {
        self.codes
            .get(self.canonical(name))
            .ok_or_else(|| ControlError::UnknownAction(name.to_string()))
    }

    /// Whether `resolve` would succeed.
    pub fn is_valid(&self, name: &str) -> bool {
        self.codes.contains_key(self.canonical(name))
    }

    /// Canonical action names, sorted.
    pub fn action_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.codes.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Split a space-delimited action string (`"Down Down Enter"`).
pub fn parse_sequence(sequence: &str) -> Vec<String> {
    sequence.split_whitespace().map(str::to_string).collect()
}

/// Digit keys for a channel number, most significant first.
pub fn channel_digits(channel: u32) -> Vec<String> {
    channel
        .to_string()
        .chars()
        .map(|digit| format!("Num{}", digit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_action() {
        let resolver = ActionResolver::global();
        assert_eq!(resolver.resolve("Mute").unwrap().as_str(), "AAAAAQAAAAEAAAAUAw==");
        assert_eq!(resolver.resolve("Netflix").unwrap().as_str(), "AAAAAgAAABoAAAB8Aw==");
    }

    #[test]
    fn test_alias_resolves_to_confirm() {
        let resolver = ActionResolver::global();
        let confirm = resolver.resolve("Confirm").unwrap().clone();
        assert_eq!(resolver.resolve("Enter").unwrap(), &confirm);
        assert_eq!(resolver.resolve("enter").unwrap(), &confirm);
        assert_eq!(resolver.resolve("exit").unwrap(), resolver.resolve("Exit").unwrap());
    }

    #[test]
    fn test_alias_is_not_chained() {
        let resolver = ActionResolver::from_tables(&[("a", "b"), ("b", "c")], &[("c", "CODE")]);
        assert!(resolver.is_valid("b"));
        assert!(!resolver.is_valid("a"));
    }

    #[test]
    fn test_unknown_action() {
        let resolver = ActionResolver::global();
        assert!(!resolver.is_valid("mute"));
        assert!(!resolver.is_valid(""));
        assert!(matches!(
            resolver.resolve("DoABarrelRoll"),
            Err(ControlError::UnknownAction(name)) if name == "DoABarrelRoll"
        ));
    }

    #[test]
    fn test_every_listed_name_is_valid() {
        let resolver = ActionResolver::global();
        let names = resolver.action_names();
        assert_eq!(names.len(), CODES.len());
        assert!(names.iter().all(|name| resolver.is_valid(name)));
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("Down  Down Enter "), vec!["Down", "Down", "Enter"]);
        assert!(parse_sequence("   ").is_empty());
    }

    #[test]
    fn test_channel_digits() {
        assert_eq!(channel_digits(7), vec!["Num7"]);
        assert_eq!(channel_digits(23), vec!["Num2", "Num3"]);
        assert_eq!(channel_digits(0), vec!["Num0"]);
    }
}
