//! Validity filter for raw advertisements.
//!
//! Decides whether a sighting is a usable positioning signal. Pure: no state,
//! no logging. Callers log rejections at whatever level suits them.

use thiserror::Error;

use crate::models::Sighting;

use super::config::FilterConfig;

/// Why a sighting was not used for positioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Error)]
pub enum RejectReason {
    #[error("no signal strength reported")]
    MissingRssi,
    #[error("expected service marker not advertised")]
    MissingServiceMarker,
    #[error("no service or manufacturer data")]
    MissingPayload,
    #[error("payload is not valid UTF-8")]
    UndecodablePayload,
    #[error("payload is empty")]
    EmptyPayload,
    #[error("beacon carries the unconfigured placeholder")]
    PlaceholderPayload,
    #[error("signal below the configured floor")]
    WeakSignal,
}

impl RejectReason {
    pub const ALL: [RejectReason; 7] = [
        RejectReason::MissingRssi,
        RejectReason::MissingServiceMarker,
        RejectReason::MissingPayload,
        RejectReason::UndecodablePayload,
        RejectReason::EmptyPayload,
        RejectReason::PlaceholderPayload,
        RejectReason::WeakSignal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingRssi => "missing_rssi",
            RejectReason::MissingServiceMarker => "missing_service_marker",
            RejectReason::MissingPayload => "missing_payload",
            RejectReason::UndecodablePayload => "undecodable_payload",
            RejectReason::EmptyPayload => "empty_payload",
            RejectReason::PlaceholderPayload => "placeholder_payload",
            RejectReason::WeakSignal => "weak_signal",
        }
    }
}

/// Outcome of classifying one sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Usable; carries the decoded room tag.
    Accepted(String),
    Rejected(RejectReason),
}

impl Classification {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Classification::Accepted(_))
    }
}

pub fn classify(sighting: &Sighting, config: &FilterConfig) -> Classification {
    match check(sighting, config) {
        Ok(payload) => Classification::Accepted(payload),
        Err(reason) => Classification::Rejected(reason),
    }
}

fn check(sighting: &Sighting, config: &FilterConfig) -> Result<String, RejectReason> {
    let rssi = sighting.rssi.ok_or(RejectReason::MissingRssi)?;

    let marker = config.service_marker.as_str();
    let service_payload = sighting.service_data_for(marker);
    if !sighting.declares_service(marker) && service_payload.is_none() {
        return Err(RejectReason::MissingServiceMarker);
    }

    let raw = service_payload
        .or(sighting.manufacturer_data.as_deref())
        .ok_or(RejectReason::MissingPayload)?;

    let text = decode_payload(raw)?;
    if text.is_empty() {
        return Err(RejectReason::EmptyPayload);
    }
    if text.eq_ignore_ascii_case(&config.placeholder_payload) {
        return Err(RejectReason::PlaceholderPayload);
    }

    if rssi < config.min_rssi {
        return Err(RejectReason::WeakSignal);
    }

    Ok(text.to_string())
}

/// Beacons pad their tag with NULs to a fixed frame length.
fn decode_payload(raw: &[u8]) -> Result<&str, RejectReason> {
    let text = std::str::from_utf8(raw).map_err(|_| RejectReason::UndecodablePayload)?;
    Ok(text.trim_end_matches('\0').trim())
}
