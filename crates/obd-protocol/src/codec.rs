//! ELM327 Response Decoding
//!
//! Turns the hex-ASCII text returned by the adapter into physical values and
//! applies the fallback policy to anything that cannot be decoded.

use crate::error::{ObdError, Result};
use crate::fallback::{FallbackGenerator, FallbackPolicy, FallbackReason};
use crate::pid::{Pid, PidRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Marker strings the adapter uses instead of data (whitespace removed)
const ERROR_MARKERS: [&str; 6] = [
    "NODATA",
    "ERROR",
    "?",
    "UNABLETOCONNECT",
    "STOPPED",
    "BUSINIT",
];

/// Status text the adapter prints while auto-detecting the protocol
const SEARCHING_PREFIX: &str = "SEARCHING...";

/// Upper bound for an adapter supply voltage that is still believable
const MAX_PLAUSIBLE_VOLTAGE: f64 = 30.0;

/// Strip whitespace and the prompt, upper-case
pub fn normalize(raw: &str) -> String {
    let text: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '>')
        .collect::<String>()
        .to_ascii_uppercase();
    match text.strip_prefix(SEARCHING_PREFIX) {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Whether the adapter answered with an error marker instead of data
pub fn is_error_response(raw: &str) -> bool {
    let text = normalize(raw);
    ERROR_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Whether the adapter answered `NO DATA`
pub fn is_no_data(raw: &str) -> bool {
    normalize(raw).contains("NODATA")
}

/// Decode hex pairs into bytes
fn hex_bytes(text: &str) -> std::result::Result<Vec<u8>, FallbackReason> {
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FallbackReason::Malformed(format!("not hex: {}", text)));
    }
    if text.len() % 2 != 0 {
        return Err(FallbackReason::Malformed(format!(
            "odd number of hex digits: {}",
            text
        )));
    }
    text.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| FallbackReason::Malformed(format!("not hex: {}", text)))
        })
        .collect()
}

/// Data bytes following the positive-response header.
///
/// An echoed request in front of the header is tolerated; any other prefix
/// means the response belongs to a different request.
fn payload(text: &str, request: &str, header: &str) -> std::result::Result<Vec<u8>, FallbackReason> {
    let text = text.strip_prefix(request).unwrap_or(text);
    let data = text.strip_prefix(header).ok_or_else(|| {
        FallbackReason::Malformed(format!("expected {} response, got {}", header, text))
    })?;
    hex_bytes(data)
}

/// Decode a response for one of the polled channels
pub fn decode(pid: Pid, raw: &str) -> Result<f64> {
    decode_reading(pid, raw).map_err(|reason| ObdError::InvalidResponse(reason.to_string()))
}

/// Decode, reporting why a response is unusable
fn decode_reading(pid: Pid, raw: &str) -> std::result::Result<f64, FallbackReason> {
    if is_no_data(raw) {
        return Err(FallbackReason::NoData);
    }
    if is_error_response(raw) {
        return Err(FallbackReason::AdapterError(normalize(raw)));
    }
    let text = normalize(raw);

    let value = match pid.code() {
        None => parse_voltage(&text)?,
        Some(code) => {
            let request = PidRequest::Standard(code);
            let bytes = payload(&text, &request.command(), &request.response_header())?;
            if bytes.len() < pid.data_bytes() {
                return Err(FallbackReason::Malformed(format!(
                    "{} needs {} data bytes, got {}",
                    pid.command(),
                    pid.data_bytes(),
                    bytes.len()
                )));
            }
            apply_formula(pid, &bytes)
        }
    };

    if !value.is_finite() || value < 0.0 {
        return Err(FallbackReason::OutOfRange(value));
    }
    Ok(value)
}

/// Decode a Mode 22 response into its raw data bytes
pub fn decode_enhanced(did: u16, raw: &str) -> Result<Vec<u8>> {
    if is_error_response(raw) {
        return Err(ObdError::InvalidResponse(normalize(raw)));
    }
    let text = normalize(raw);
    let request = PidRequest::Enhanced(did);
    payload(&text, &request.command(), &request.response_header())
        .map_err(|reason| ObdError::InvalidResponse(reason.to_string()))
}

fn apply_formula(pid: Pid, bytes: &[u8]) -> f64 {
    let a = bytes[0] as f64;
    let b = bytes.get(1).copied().unwrap_or(0) as f64;
    match pid {
        // ((A*256)+B)/4
        Pid::Rpm => ((a * 256.0) + b) / 4.0,
        // A (km/h)
        Pid::Speed => a,
        // A - 40 (°C)
        Pid::CoolantTemp | Pid::IntakeAirTemp => a - 40.0,
        // A * 100 / 255 (%)
        Pid::ThrottlePosition | Pid::EngineLoad => a * 100.0 / 255.0,
        // A (kPa)
        Pid::IntakeManifoldPressure => a,
        // ((A*256)+B) * 0.079 (kPa gauge)
        Pid::FuelRailPressure => ((a * 256.0) + b) * 0.079,
        Pid::BatteryVoltage => f64::NAN,
    }
}

fn parse_voltage(text: &str) -> std::result::Result<f64, FallbackReason> {
    let number = text.trim_end_matches('V');
    let value: f64 = number
        .parse()
        .map_err(|_| FallbackReason::Malformed(format!("not a voltage: {}", text)))?;
    if value > MAX_PLAUSIBLE_VOLTAGE {
        return Err(FallbackReason::OutOfRange(value));
    }
    Ok(value)
}

/// Either a genuine read or a substituted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sample {
    Live(f64),
    Fallback { value: f64, reason: FallbackReason },
}

impl Sample {
    pub fn value(&self) -> f64 {
        match self {
            Sample::Live(value) => *value,
            Sample::Fallback { value, .. } => *value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Sample::Fallback { .. })
    }
}

/// One decoded channel value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub pid: Pid,
    pub sample: Sample,
    /// Capture time (Unix ms)
    pub timestamp_ms: u64,
}

impl Reading {
    pub fn value(&self) -> f64 {
        self.sample.value()
    }
}

/// Decoder with the fallback-on-invalid-data policy applied
pub struct Codec {
    fallback: FallbackGenerator,
}

impl Codec {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self {
            fallback: FallbackGenerator::new(policy),
        }
    }

    pub fn with_generator(fallback: FallbackGenerator) -> Self {
        Self { fallback }
    }

    /// Decode the outcome of one command into a reading, never failing
    pub fn read(
        &mut self,
        pid: Pid,
        response: std::result::Result<String, ObdError>,
        timestamp_ms: u64,
    ) -> Reading {
        let sample = match response {
            Ok(raw) => match decode_reading(pid, &raw) {
                Ok(value) => {
                    debug!("{} = {} {}", pid, value, pid.unit());
                    self.fallback.observe(pid, value);
                    Sample::Live(value)
                }
                Err(reason) => self.substitute(pid, reason),
            },
            Err(err) => self.substitute(pid, FallbackReason::from_error(&err)),
        };
        Reading {
            pid,
            sample,
            timestamp_ms,
        }
    }

    fn substitute(&mut self, pid: Pid, reason: FallbackReason) -> Sample {
        let value = self.fallback.substitute(pid);
        warn!(
            "{} ({}) unusable, substituting {}: {}",
            pid.label(),
            pid.command(),
            value,
            reason
        );
        metrics::counter!("obd_fallback_total", "pid" => pid.name()).increment(1);
        Sample::Fallback { value, reason }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(FallbackPolicy::default())
    }
}
