//! Format request payload.

use serde::Serialize;

use super::constants::FORMAT_JSON;

/// Switches the connector from its binary default to line-delimited JSON.
///
/// The connector never acknowledges this message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequest {
    /// Also stream [`RawData`](super::RawData) samples at the device sample rate.
    pub enable_raw_output: bool,
    pub format: &'static str,
}

impl FormatRequest {
    pub fn json(enable_raw_output: bool) -> Self {
        Self {
            enable_raw_output,
            format: FORMAT_JSON,
        }
    }

    /// Encode as the single ASCII line the connector expects (no trailing newline).
    pub fn to_wire(&self) -> String {
        format!(
            "{{\"enableRawOutput\": {}, \"format\": \"{}\"}}",
            self.enable_raw_output, self.format
        )
    }
}
