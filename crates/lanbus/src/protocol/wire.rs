// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragment and envelope record definitions.
//!
//! Both records are self-delimited JSON. Decoding tolerates unknown keys so
//! newer peers can extend the records without breaking older receivers.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// One UDP datagram's worth of a larger logical message.
///
/// All fragments of a message share `id` and `total`; `seq` is 1-based.
/// `data` travels base64-encoded so the receiver recovers the exact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Message-wide identifier, unique within the reassembly window.
    pub id: String,
    /// Position within the message, `1..=total`.
    pub seq: u32,
    /// Declared fragment count for the whole message.
    pub total: u32,
    /// Opaque payload slice.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Fragment {
    /// Reject records that cannot belong to any well-formed message.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` wrapping a description when `id` is
    /// empty, `total < 1`, or `seq` falls outside `1..=total`.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(invalid("fragment is missing a message id"));
        }
        if self.total < 1 {
            return Err(invalid("fragment total must be at least 1"));
        }
        if self.seq < 1 || self.seq > self.total {
            return Err(invalid("fragment seq outside 1..=total"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Error {
    Error::Serialization(serde::de::Error::custom(msg))
}

/// Typed message carried inside the reassembled bytes.
///
/// The dispatcher parses only `{type, payload}` and keeps `payload` raw; the
/// registered handler re-parses it. Decode twice, never once.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Handler selector.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Opaque payload, re-parsed by the handler.
    pub payload: Box<RawValue>,
}

impl Envelope {
    /// Wrap a serializable payload under a type tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the payload cannot be encoded.
    pub fn new<T: Serialize + ?Sized>(msg_type: &str, payload: &T) -> Result<Self> {
        let raw = RawValue::from_string(serde_json::to_string(payload)?)?;
        Ok(Self {
            msg_type: msg_type.to_owned(),
            payload: raw,
        })
    }
}

/// Serde adapter carrying `Vec<u8>` as a base64 string, matching the wire
/// encoding the rest of the fleet produces for byte slices.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
