// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bytes ↔ typed payload.
//!
//! The default body format is JSON; the declared content type travels in the
//! envelope. A null payload packs to empty bytes, and empty bytes unpack to
//! `None`. Unpacking non-empty bytes without a target type is a programming
//! error, never a transport one.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RpcError;

/// Content type declared for JSON-packed bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Pack an optional payload into body bytes. `None` packs to empty bytes.
pub fn pack<T: Serialize>(payload: Option<&T>) -> Result<Vec<u8>, RpcError> {
    match payload {
        Some(value) => Ok(serde_json::to_vec(value)?),
        None => Ok(Vec::new()),
    }
}

/// Unpack body bytes into a typed payload. Fails on empty bytes.
pub fn unpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    if bytes.is_empty() {
        return Err(RpcError::Codec("empty body for non-null payload".into()));
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Unpack body bytes into an optional payload. Empty bytes yield `None`.
pub fn unpack_optional<T: DeserializeOwned>(bytes: &[u8]) -> Result<Option<T>, RpcError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(bytes)?))
}

/// Assert that a body is empty when no payload type was declared.
///
/// Non-empty bytes without a target type cannot be interpreted; the caller
/// registered the wrong signature.
pub fn expect_empty(bytes: &[u8]) -> Result<(), RpcError> {
    if bytes.is_empty() {
        Ok(())
    } else {
        Err(RpcError::Programming(
            "non-empty body but no payload type declared".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: i64,
        text: String,
    }

    #[test]
    fn pack_unpack_is_identity() {
        let payload = Payload {
            id: 7,
            text: "семь".into(),
        };
        let bytes = pack(Some(&payload)).unwrap();
        let back: Payload = unpack(&bytes).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn null_payload_packs_to_empty_bytes() {
        let bytes = pack::<Payload>(None).unwrap();
        assert!(bytes.is_empty());
        let back: Option<Payload> = unpack_optional(&bytes).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn unpack_empty_bytes_fails() {
        let result: Result<Payload, _> = unpack(&[]);
        assert!(matches!(result, Err(RpcError::Codec(_))));
    }

    #[test]
    fn nonempty_body_without_type_is_programming_error() {
        let result = expect_empty(b"{\"id\":1}");
        assert!(matches!(result, Err(RpcError::Programming(_))));
        assert!(expect_empty(b"").is_ok());
    }

    #[test]
    fn malformed_bytes_fail_with_codec_error() {
        let result: Result<Payload, _> = unpack(b"not json");
        assert!(matches!(result, Err(RpcError::Codec(_))));
    }
}
