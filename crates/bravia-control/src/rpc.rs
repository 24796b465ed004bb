//! JSON-RPC transport for the stateful control endpoints.
//!
//! Requests are `{"method", "params": [..], "id": 1, "version"}` posted to a
//! service path; replies carry either `result` or `error: [code, message]`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DeviceConfig;
use crate::error::TransportError;

/// Control API service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    System,
    Audio,
    AvContent,
}

impl Service {
    pub fn path(&self) -> &'static str {
        match self {
            Service::System => "/sony/system",
            Service::Audio => "/sony/audio",
            Service::AvContent => "/sony/avContent",
        }
    }
}

/// One JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub id: u32,
    pub version: String,
}

impl RpcRequest {
    /// A call with no parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
            id: 1,
            version: "1.0".to_string(),
        }
    }

    /// A call with a single parameter object.
    pub fn with_param(mut self, param: Value) -> Self {
        self.params = vec![param];
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    Result(Vec<Value>),
    Error { code: i64, message: String },
}

impl RpcReply {
    /// Decode a reply body.
    pub fn from_json(json: &Value) -> Result<Self, TransportError> {
        if let Some(error) = json.get("error") {
            let code = error.get(0).and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Ok(RpcReply::Error { code, message });
        }

        match json.get("result") {
            Some(Value::Array(items)) => Ok(RpcReply::Result(items.clone())),
            Some(other) => Ok(RpcReply::Result(vec![other.clone()])),
            None => Err(TransportError::Protocol(
                "reply has neither result nor error".to_string(),
            )),
        }
    }
}

/// Performs JSON-RPC calls against the device.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, service: Service, request: RpcRequest) -> Result<RpcReply, TransportError>;
}

/// reqwest-backed RPC transport.
#[derive(Debug, Clone)]
pub struct HttpRpcTransport {
    client: Client,
    base_url: String,
    psk: String,
    timeout: Duration,
}

impl HttpRpcTransport {
    pub fn new(config: &DeviceConfig) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url(),
            psk: config.psk.clone(),
            timeout: config.request_timeout(),
        }
    }

    fn url(&self, service: Service) -> String {
        format!("{}{}", self.base_url, service.path())
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(&self, service: Service, request: RpcRequest) -> Result<RpcReply, TransportError> {
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = self
            .client
            .post(self.url(service))
            .timeout(self.timeout)
            .header("X-Auth-PSK", &self.psk)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?;

        let status = response.status();
        let json: Value = match response.json().await {
            Ok(json) => json,
            Err(_) if !status.is_success() => return Err(TransportError::Status(status.as_u16())),
            Err(e) => return Err(TransportError::Protocol(format!("JSON parse error: {}", e))),
        };

        // The set reports structured errors with non-2xx statuses too.
        match RpcReply::from_json(&json) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(TransportError::Status(status.as_u16())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = RpcRequest::new("setAudioVolume")
            .with_param(json!({"target": "speaker", "volume": "15"}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "method": "setAudioVolume",
                "params": [{"target": "speaker", "volume": "15"}],
                "id": 1,
                "version": "1.0"
            })
        );
    }

    #[test]
    fn test_reply_result() {
        let reply = RpcReply::from_json(&json!({"result": [{"status": "active"}], "id": 1})).unwrap();
        assert_eq!(reply, RpcReply::Result(vec![json!({"status": "active"})]));
    }

    #[test]
    fn test_reply_error() {
        let reply = RpcReply::from_json(&json!({"error": [40005, "Display Is Turned off"], "id": 1}))
            .unwrap();
        assert_eq!(
            reply,
            RpcReply::Error {
                code: 40005,
                message: "Display Is Turned off".to_string()
            }
        );
    }

    #[test]
    fn test_reply_malformed() {
        assert!(matches!(
            RpcReply::from_json(&json!({"id": 1})),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn test_service_paths() {
        assert_eq!(Service::System.path(), "/sony/system");
        assert_eq!(Service::Audio.path(), "/sony/audio");
        assert_eq!(Service::AvContent.path(), "/sony/avContent");
    }
}
