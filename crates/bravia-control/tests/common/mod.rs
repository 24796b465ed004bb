//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use bravia_control::{
    ActionResolver, BraviaTv, CommandCode, CommandTransport, ControlError, DeviceConfig,
    RpcReply, RpcRequest, RpcTransport, Service, TransportError, WakeSignal,
};

/// IRCC code for an action name.
pub fn code(name: &str) -> String {
    ActionResolver::global()
        .resolve(name)
        .unwrap()
        .as_str()
        .to_string()
}

/// Records every code with the (virtual) time it was sent.
#[derive(Default)]
pub struct FakeCommands {
    pub sent: Mutex<Vec<(String, Instant)>>,
    pub fail_on: Mutex<Option<String>>,
    pub latency: Option<Duration>,
}

impl FakeCommands {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, action: &str) {
        *self.fail_on.lock().unwrap() = Some(code(action));
    }

    pub fn codes(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandTransport for FakeCommands {
    async fn send(&self, code: &CommandCode) -> Result<(), TransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_on.lock().unwrap().as_deref() == Some(code.as_str()) {
            return Err(TransportError::Connection("connection reset".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((code.as_str().to_string(), Instant::now()));
        Ok(())
    }
}

/// Scriptable stand-in for the control API.
pub struct FakeRpc {
    pub calls: Mutex<Vec<RpcRequest>>,
    pub power: AtomicBool,
    pub speaker_volume: Mutex<u16>,
    /// Volume writes are accepted but the speaker level never moves
    pub external_audio: AtomicBool,
    pub content: Mutex<Value>,
    pub unreachable: AtomicBool,
    pub volume_writes: AtomicUsize,
}

impl Default for FakeRpc {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            power: AtomicBool::new(true),
            speaker_volume: Mutex::new(20),
            external_audio: AtomicBool::new(false),
            content: Mutex::new(json!({
                "source": "tv:dvbt",
                "dispNum": "005",
                "title": "News",
                "uri": "tv:dvbt?trip=1.2.3"
            })),
            unreachable: AtomicBool::new(false),
            volume_writes: AtomicUsize::new(0),
        }
    }
}

impl FakeRpc {
    pub fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.method.clone())
            .collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RpcRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    pub fn set_content(&self, content: Value) {
        *self.content.lock().unwrap() = content;
    }
}

#[async_trait]
impl RpcTransport for FakeRpc {
    async fn call(&self, _service: Service, request: RpcRequest) -> Result<RpcReply, TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("no route to host".to_string()));
        }
        self.calls.lock().unwrap().push(request.clone());
        let param = request.params.first().cloned().unwrap_or(Value::Null);

        let reply = match request.method.as_str() {
            "getPowerStatus" => {
                let status = if self.power.load(Ordering::SeqCst) { "active" } else { "standby" };
                RpcReply::Result(vec![json!({ "status": status })])
            }
            "setPowerStatus" => {
                let on = param.get("status").and_then(Value::as_bool).unwrap_or(false);
                self.power.store(on, Ordering::SeqCst);
                RpcReply::Result(vec![])
            }
            "getVolumeInformation" => {
                let volume = *self.speaker_volume.lock().unwrap();
                RpcReply::Result(vec![json!([
                    { "target": "speaker", "volume": volume, "mute": false, "maxVolume": 100 },
                    { "target": "headphone", "volume": 3, "mute": false, "maxVolume": 100 }
                ])])
            }
            "setAudioVolume" => {
                self.volume_writes.fetch_add(1, Ordering::SeqCst);
                if !self.external_audio.load(Ordering::SeqCst) {
                    let volume = param
                        .get("volume")
                        .and_then(Value::as_str)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    *self.speaker_volume.lock().unwrap() = volume;
                }
                RpcReply::Result(vec![json!(0)])
            }
            "getPlayingContentInfo" => RpcReply::Result(vec![self.content.lock().unwrap().clone()]),
            "setPlayContent" => RpcReply::Result(vec![]),
            _ => RpcReply::Error {
                code: 12,
                message: "No Such Method".to_string(),
            },
        };
        Ok(reply)
    }
}

/// Records wake requests.
#[derive(Default)]
pub struct FakeWaker {
    pub woken: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl WakeSignal for FakeWaker {
    async fn wake(&self, mac_address: &str) -> Result<(), ControlError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::WakeFailed("network down".to_string()));
        }
        self.woken.lock().unwrap().push(mac_address.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub tv: BraviaTv,
    pub commands: Arc<FakeCommands>,
    pub rpc: Arc<FakeRpc>,
    pub waker: Arc<FakeWaker>,
}

pub fn harness(config: DeviceConfig) -> Harness {
    let commands = Arc::new(FakeCommands::default());
    let rpc = Arc::new(FakeRpc::default());
    let waker = Arc::new(FakeWaker::default());
    let tv = BraviaTv::with_parts(config, commands.clone(), rpc.clone(), waker.clone()).unwrap();
    Harness {
        tv,
        commands,
        rpc,
        waker,
    }
}

pub fn test_config() -> DeviceConfig {
    DeviceConfig::new("tv.test").with_name("Den")
}
