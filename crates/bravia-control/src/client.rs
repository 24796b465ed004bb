//! Device state client.
//!
//! Typed queries and mutations against the control API. The client owns the
//! last known [`DeviceState`] and updates it only from confirmed replies.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::action::channel_digits;
use crate::error::{ControlError, Result, TransportError};
use crate::rpc::{RpcReply, RpcRequest, RpcTransport, Service};
use crate::sequencer::{CommandSequencer, SequenceReport};

/// Audio target that reflects the set's own speakers.
pub const SPEAKER_TARGET: &str = "speaker";

/// Last known device state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: Option<bool>,
    pub volume: Option<u16>,
    pub muted: Option<bool>,
    pub channel: Option<u32>,
    pub source: Option<String>,
}

/// Volume of one audio output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub target: String,
    pub volume: u16,
    pub muted: bool,
    pub max_volume: Option<u16>,
}

/// Volume of every audio output the set reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub targets: Vec<VolumeInfo>,
}

impl VolumeStatus {
    pub fn speaker(&self) -> Option<&VolumeInfo> {
        self.targets.iter().find(|t| t.target == SPEAKER_TARGET)
    }
}

/// Currently playing content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingContent {
    pub source: String,
    pub uri: Option<String>,
    pub title: Option<String>,
    pub disp_num: Option<String>,
}

impl PlayingContent {
    pub fn is_tv(&self) -> bool {
        self.source.contains("tv")
    }

    pub fn is_hdmi(&self) -> bool {
        self.source.contains("hdmi")
    }

    /// Channel number when tuned to a broadcast source.
    pub fn channel(&self) -> Option<u32> {
        if !self.is_tv() {
            return None;
        }
        self.disp_num.as_deref()?.trim().parse().ok()
    }
}

/// Stateful control API client.
pub struct DeviceStateClient {
    rpc: Arc<dyn RpcTransport>,
    sequencer: Arc<CommandSequencer>,
    state: Mutex<DeviceState>,
}

impl DeviceStateClient {
    pub fn new(rpc: Arc<dyn RpcTransport>, sequencer: Arc<CommandSequencer>) -> Self {
        Self {
            rpc,
            sequencer,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn sequencer(&self) -> &Arc<CommandSequencer> {
        &self.sequencer
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the last known state.
    pub fn state(&self) -> DeviceState {
        self.lock().clone()
    }

    pub(crate) fn record_power(&self, on: bool) {
        self.lock().power = Some(on);
    }

    pub(crate) fn record_volume(&self, volume: u16) {
        self.lock().volume = Some(volume);
    }

    pub(crate) fn record_channel(&self, channel: u32) {
        self.lock().channel = Some(channel);
    }

    async fn call(&self, service: Service, request: RpcRequest) -> Result<Vec<Value>> {
        let method = request.method.clone();
        let reply = self
            .rpc
            .call(service, request)
            .await
            .map_err(|e| ControlError::DeviceUnreachable(e.to_string()))?;

        match reply {
            RpcReply::Result(items) => Ok(items),
            RpcReply::Error { code, message } => {
                debug!(method = %method, code, message = %message, "device rejected request");
                Err(ControlError::DeviceError { code, message })
            }
        }
    }

    pub async fn get_power(&self) -> Result<bool> {
        let result = self
            .call(Service::System, RpcRequest::new("getPowerStatus"))
            .await;

        let items = match result {
            Ok(items) => items,
            Err(e) => {
                self.lock().power = Some(false);
                return Err(e);
            }
        };

        let status = items
            .first()
            .and_then(|item| item.get("status"))
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("getPowerStatus", "missing status"))?;

        let on = status == "active";
        self.record_power(on);
        Ok(on)
    }

    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.call(
            Service::System,
            RpcRequest::new("setPowerStatus").with_param(json!({ "status": on })),
        )
        .await?;
        self.record_power(on);
        Ok(())
    }

    pub async fn get_volume_and_mute(&self) -> Result<VolumeStatus> {
        let items = self
            .call(Service::Audio, RpcRequest::new("getVolumeInformation"))
            .await?;

        let entries = match items.first() {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => return Err(malformed("getVolumeInformation", "missing target list")),
        };

        let targets = entries.iter().filter_map(parse_volume_info).collect();
        let status = VolumeStatus { targets };

        if let Some(speaker) = status.speaker() {
            let mut state = self.lock();
            state.volume = Some(speaker.volume);
            state.muted = Some(speaker.muted);
        }
        Ok(status)
    }

    /// Set the speaker volume; the caller re-queries to learn what happened.
    pub async fn set_volume(&self, target: u16) -> Result<()> {
        self.call(
            Service::Audio,
            RpcRequest::new("setAudioVolume").with_param(json!({
                "target": SPEAKER_TARGET,
                "volume": target.to_string(),
            })),
        )
        .await?;
        Ok(())
    }

    pub async fn get_current_source(&self) -> Result<PlayingContent> {
        let items = self
            .call(Service::AvContent, RpcRequest::new("getPlayingContentInfo"))
            .await?;

        let content = items
            .first()
            .map(parse_playing_content)
            .ok_or_else(|| malformed("getPlayingContentInfo", "empty result"))?;

        let mut state = self.lock();
        state.source = Some(content.source.clone());
        if let Some(channel) = content.channel() {
            state.channel = Some(channel);
        }
        Ok(content)
    }

    /// Channel when tuned to a broadcast source.
    pub async fn get_channel(&self) -> Result<Option<u32>> {
        Ok(self.get_current_source().await?.channel())
    }

    /// Key in a channel number digit by digit.
    pub async fn set_channel(&self, target: u32) -> Result<SequenceReport> {
        let report = self.sequencer.send_sequence(&channel_digits(target)).await?;
        self.record_channel(target);
        Ok(report)
    }

    pub async fn set_play_content(&self, uri: &str) -> Result<()> {
        self.call(
            Service::AvContent,
            RpcRequest::new("setPlayContent").with_param(json!({ "uri": uri })),
        )
        .await?;
        Ok(())
    }
}

fn malformed(method: &str, detail: &str) -> ControlError {
    TransportError::Protocol(format!("{}: {}", method, detail)).into()
}

fn parse_volume_info(entry: &Value) -> Option<VolumeInfo> {
    let target = entry.get("target")?.as_str()?.to_string();
    let volume = as_level(entry.get("volume")?)?;
    let muted = entry.get("mute").and_then(Value::as_bool).unwrap_or(false);
    let max_volume = entry.get("maxVolume").and_then(as_level);

    Some(VolumeInfo {
        target,
        volume,
        muted,
        max_volume,
    })
}

/// Levels arrive as numbers or numeric strings depending on firmware.
fn as_level(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_playing_content(item: &Value) -> PlayingContent {
    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

    PlayingContent {
        source: text("source").unwrap_or_default(),
        uri: text("uri"),
        title: text("title"),
        disp_num: text("dispNum"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume_info() {
        let info = parse_volume_info(&json!({
            "target": "speaker", "volume": 12, "mute": true, "maxVolume": 100, "minVolume": 0
        }))
        .unwrap();
        assert_eq!(info.volume, 12);
        assert!(info.muted);
        assert_eq!(info.max_volume, Some(100));

        let info = parse_volume_info(&json!({"target": "headphone", "volume": "7"})).unwrap();
        assert_eq!(info.volume, 7);
        assert!(!info.muted);

        assert!(parse_volume_info(&json!({"volume": 3})).is_none());
    }

    #[test]
    fn test_playing_content_channel() {
        let tv = parse_playing_content(&json!({
            "source": "tv:dvbt", "dispNum": "023", "title": "News", "uri": "tv:dvbt?trip=1"
        }));
        assert_eq!(tv.channel(), Some(23));

        let hdmi = parse_playing_content(&json!({
            "source": "extInput:hdmi", "title": "HDMI 2/ARC", "uri": "extInput:hdmi?port=2"
        }));
        assert!(hdmi.is_hdmi());
        assert_eq!(hdmi.channel(), None);
    }

    #[test]
    fn test_volume_status_speaker() {
        let status = VolumeStatus {
            targets: vec![
                VolumeInfo {
                    target: "headphone".to_string(),
                    volume: 5,
                    muted: false,
                    max_volume: None,
                },
                VolumeInfo {
                    target: "speaker".to_string(),
                    volume: 20,
                    muted: false,
                    max_volume: None,
                },
            ],
        };
        assert_eq!(status.speaker().map(|s| s.volume), Some(20));
    }
}
