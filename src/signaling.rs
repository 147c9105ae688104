//! Manual signaling surface.
//!
//! Descriptions travel between peers as text the operator copies by hand.
//! This module turns descriptions into that text and back, and defines
//! where emitted text goes.

use crate::config::DescriptionEncoding;
use crate::error::{Error, Result};
use crate::peer::types::{SdpType, SessionDescription};
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};
use std::sync::Mutex;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Where serialized local descriptions are published for copying.
pub trait SignalingSink: Send + Sync {
    fn publish(&self, text: &str);

    /// Forget any previously published text.
    fn clear(&self);
}

/// In-memory slot holding the last published description.
#[derive(Debug, Default)]
pub struct SignalSlot {
    text: Mutex<Option<String>>,
    published: Mutex<usize>,
}

impl SignalSlot {
    pub fn text(&self) -> Option<String> {
        match self.text.lock() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// How many descriptions were published since creation
    pub fn published(&self) -> usize {
        match self.published.lock() {
            Ok(count) => *count,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl SignalingSink for SignalSlot {
    fn publish(&self, text: &str) {
        let mut slot = match self.text.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(text.to_owned());

        let mut count = match self.published.lock() {
            Ok(count) => count,
            Err(poisoned) => poisoned.into_inner(),
        };
        *count += 1;
    }

    fn clear(&self) {
        let mut slot = match self.text.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }
}

/// Serialize a description for manual exchange.
pub fn encode_description(
    desc: &SessionDescription,
    encoding: DescriptionEncoding,
) -> Result<String> {
    let json = serde_json::to_string(desc)
        .map_err(|e| Error::InvalidDescription(format!("serialize: {e}")))?;

    match encoding {
        DescriptionEncoding::Json => Ok(json),
        DescriptionEncoding::Compact => {
            let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
            gz.write_all(json.as_bytes())?;
            let compressed = gz.finish()?;
            Ok(general_purpose::STANDARD.encode(compressed))
        }
    }
}

/// Parse pasted description text, in either encoding.
///
/// The SDP payload itself is parsed too, so a syntactically broken
/// description is rejected before it reaches the transport.
pub fn decode_description(text: &str) -> Result<SessionDescription> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidDescription("empty description".into()));
    }

    let json = if text.starts_with('{') {
        text.to_owned()
    } else {
        let compressed = general_purpose::STANDARD
            .decode(text.split_whitespace().collect::<String>())
            .map_err(|e| Error::InvalidDescription(format!("not JSON or base64: {e}")))?;
        let mut json = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut json)
            .map_err(|e| Error::InvalidDescription(format!("bad compressed payload: {e}")))?;
        json
    };

    let desc: SessionDescription = serde_json::from_str(&json)
        .map_err(|e| Error::InvalidDescription(format!("bad description json: {e}")))?;
    validate_sdp(&desc)?;
    Ok(desc)
}

fn validate_sdp(desc: &SessionDescription) -> Result<()> {
    if desc.sdp.trim().is_empty() {
        return Err(Error::InvalidDescription("empty sdp".into()));
    }

    let parsed = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
    };
    parsed
        .map(|_| ())
        .map_err(|e| Error::InvalidDescription(format!("unparseable sdp: {e}")))
}
