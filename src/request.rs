//! `GetSystemUpdate` request envelope

use crate::config::DEFAULT_DEVICE_ID;
use crate::error::Result;
use crate::types::Region;

/// Namespace of the NetUpdate SOAP service
pub const NUS_NAMESPACE: &str = "urn:nus.wsapi.broadon.com";

/// SOAP 1.1 envelope namespace
pub const SOAP_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Value of the `SOAPAction` header
pub const SOAP_ACTION: &str = "urn:nus.wsapi.broadon.com/GetSystemUpdate";

/// Value of the `Content-Type` header
pub const SOAP_CONTENT_TYPE: &str = "application/xml";

/// Protocol version sent in `Version`
pub const PROTOCOL_VERSION: &str = "1.0";

/// Message id sent in `MessageId`
pub const MESSAGE_ID: &str = "0";

/// Validate a region code typed by the user
///
/// Matching is exact and case-sensitive.
pub fn validate_region(input: &str) -> Result<Region> {
    input.parse()
}

/// Immutable description of one `GetSystemUpdate` call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    version: &'static str,
    message_id: &'static str,
    device_id: String,
    region: Region,
}

impl UpdateRequest {
    /// Request for `region` with the default device id
    pub fn new(region: Region) -> Self {
        Self::with_device_id(region, DEFAULT_DEVICE_ID)
    }

    /// Request for `region` with a specific device id
    ///
    /// The device id is inserted verbatim; callers pass a validated decimal string.
    pub fn with_device_id(region: Region, device_id: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_id: MESSAGE_ID,
            device_id: device_id.into(),
            region,
        }
    }

    /// Region being queried
    pub fn region(&self) -> Region {
        self.region
    }

    /// Device id embedded in the envelope
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Serialize to the SOAP envelope posted to the service
    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{envelope_ns}"
  xmlns:xsd="http://www.w3.org/2001/XMLSchema"
  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soapenv:Body>
    <GetSystemUpdateRequest xmlns="{nus_ns}">
      <Version>{version}</Version>
      <MessageId>{message_id}</MessageId>
      <DeviceId>{device_id}</DeviceId>
      <RegionId>{region}</RegionId>
    </GetSystemUpdateRequest>
  </soapenv:Body>
</soapenv:Envelope>"#,
            envelope_ns = SOAP_ENVELOPE_NAMESPACE,
            nus_ns = NUS_NAMESPACE,
            version = self.version,
            message_id = self.message_id,
            device_id = self.device_id,
            region = self.region.code(),
        )
    }
}
