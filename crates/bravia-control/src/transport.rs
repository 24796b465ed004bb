//! Command transport: delivers one IRCC code to the television.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::action::CommandCode;
use crate::config::DeviceConfig;
use crate::error::TransportError;

/// Path of the IRCC endpoint.
pub const IRCC_PATH: &str = "/sony/IRCC";

const SOAP_ACTION: &str = "\"urn:schemas-sony-com:service:IRCC:1#X_SendIRCC\"";

/// Sends a single remote code and returns once the device has answered.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send(&self, code: &CommandCode) -> Result<(), TransportError>;
}

/// SOAP envelope carrying one IRCC code.
pub fn ircc_body(code: &CommandCode) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:X_SendIRCC xmlns:u=\"urn:schemas-sony-com:service:IRCC:1\">\
         <IRCCCode>{}</IRCCCode></u:X_SendIRCC></s:Body></s:Envelope>",
        code
    )
}

/// HTTP transport for the IRCC endpoint.
#[derive(Debug, Clone)]
pub struct IrccTransport {
    client: Client,
    url: String,
    psk: String,
    timeout: Duration,
}

impl IrccTransport {
    pub fn new(config: &DeviceConfig) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: format!("{}{}", config.base_url(), IRCC_PATH),
            psk: config.psk.clone(),
            timeout: config.request_timeout(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CommandTransport for IrccTransport {
    async fn send(&self, code: &CommandCode) -> Result<(), TransportError> {
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPACTION", SOAP_ACTION)
            .header("X-Auth-PSK", &self.psk)
            .body(ircc_body(code))
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?;

        let status = response.status();
        // Completion is the end of the body, not the status line.
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), body = %body, "IRCC request rejected");
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(())
    }
}
