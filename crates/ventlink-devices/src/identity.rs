//! Static identity of a controller.

use crate::client::VariableClient;
use crate::error::CoordinatorError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use ventlink_core::catalog;
use ventlink_core::{Value, VariableDescriptor};

static AIR_FLOW_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Identity registers read once when a controller is set up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub mac: String,
    pub serial_number: String,
    /// Article description, e.g. `KWL EC 300 W R`.
    pub model: String,
    pub firmware_version: String,
    /// Nominal air flow in m³/h, taken from the model.
    pub maximum_air_flow: f64,
}

impl DeviceIdentity {
    /// Build an identity, deriving the maximum air flow from the model.
    pub fn new(
        mac: impl Into<String>,
        serial_number: impl Into<String>,
        model: impl Into<String>,
        firmware_version: impl Into<String>,
    ) -> Result<Self, CoordinatorError> {
        let model = model.into();
        let maximum_air_flow =
            parse_maximum_air_flow(&model).ok_or_else(|| CoordinatorError::InvalidModel(model.clone()))?;

        Ok(Self {
            mac: mac.into(),
            serial_number: serial_number.into(),
            model,
            firmware_version: firmware_version.into(),
            maximum_air_flow,
        })
    }

    /// Read MAC, serial number, model and firmware version from the device.
    pub async fn read(client: &VariableClient) -> Result<Self, CoordinatorError> {
        let mac = read_text(client, &catalog::MAC_ADDRESS, "MAC address").await?;
        let serial_number = read_text(client, &catalog::SERIAL_NUMBER, "serial number").await?;
        let model = read_text(client, &catalog::ARTICLE_DESCRIPTION, "article description").await?;
        let firmware_version = read_text(client, &catalog::SOFTWARE_VERSION, "software version").await?;

        Self::new(mac, serial_number, model, firmware_version)
    }
}

/// First run of digits in the model string, e.g. 300 for `KWL EC 300 W R`.
pub fn parse_maximum_air_flow(model: &str) -> Option<f64> {
    AIR_FLOW_PATTERN
        .find(model)
        .and_then(|m| m.as_str().parse().ok())
}

async fn read_text(
    client: &VariableClient,
    variable: &VariableDescriptor,
    what: &'static str,
) -> Result<String, CoordinatorError> {
    match client.get(variable).await {
        Some(Value::Text(text)) => Ok(text.trim().to_string()),
        Some(other) => Ok(other.to_string()),
        None => Err(CoordinatorError::IdentityUnavailable(what)),
    }
}
