//! Text codec for status messages
//!
//! Every status message travels as a single UTF-8 datagram:
//! ```text
//! <distance_cm>,<rfid_code>      e.g. "24.5,1"
//! ```
//!
//! Payloads with fewer than two fields (the rendezvous literals, the sender
//! greeting) decode to the reset message rather than an error.

use bytes::Bytes;
use thiserror::Error;

use crate::{RfidStatus, StatusMessage};

/// Errors that can occur while decoding a status payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Empty payload")]
    Empty,

    #[error("Payload is not valid UTF-8")]
    Utf8,

    #[error("Invalid distance field: {0:?}")]
    InvalidDistance(String),

    #[error("Non-finite distance: {0}")]
    NonFiniteDistance(f64),

    #[error("Invalid RFID status field: {0:?}")]
    InvalidRfidCode(String),
}

/// Encode a status message into its wire form
pub fn encode(message: &StatusMessage) -> Bytes {
    Bytes::from(format!(
        "{},{}",
        message.distance_cm,
        message.rfid_status.code()
    ))
}

/// Decode a status payload
pub fn decode(payload: &[u8]) -> Result<StatusMessage, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Utf8)?;
    let fields: Vec<&str> = text.split(',').collect();

    if fields.len() < 2 {
        return Ok(StatusMessage::reset());
    }

    let distance_field = fields[0].trim();
    let distance_cm: f64 = distance_field
        .parse()
        .map_err(|_| DecodeError::InvalidDistance(distance_field.into()))?;
    if !distance_cm.is_finite() {
        return Err(DecodeError::NonFiniteDistance(distance_cm));
    }

    let code_field = fields[1].trim();
    let code: f64 = code_field
        .parse()
        .map_err(|_| DecodeError::InvalidRfidCode(code_field.into()))?;

    Ok(StatusMessage::new(distance_cm, RfidStatus::from_code(code)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    #[test]
    fn test_encode_format() {
        let encoded = encode(&StatusMessage::new(24.5, RfidStatus::Authorized));
        assert_eq!(&encoded[..], b"24.5,1");

        let encoded = encode(&StatusMessage::new(-1.0, RfidStatus::Unauthorized));
        assert_eq!(&encoded[..], b"-1,-1");
    }

    #[test]
    fn test_decode_authorized() {
        let msg = decode(b"12.3,1").expect("decode failed");
        assert!((msg.distance_cm - 12.3).abs() < f64::EPSILON);
        assert_eq!(msg.rfid_status, RfidStatus::Authorized);
    }

    #[test]
    fn test_decode_float_code() {
        let msg = decode(b"40.0,-1.0").expect("decode failed");
        assert_eq!(msg.rfid_status, RfidStatus::Unauthorized);
    }

    #[test]
    fn test_single_field_is_reset() {
        assert_eq!(decode(b"bogus"), Ok(StatusMessage::reset()));
        assert_eq!(decode(protocol::DISCOVERY_PAYLOAD), Ok(StatusMessage::reset()));
        assert_eq!(decode(protocol::GREETING_PAYLOAD), Ok(StatusMessage::reset()));
    }

    #[test]
    fn test_extra_fields_ignored() {
        let msg = decode(b"5,0,garbage").expect("decode failed");
        assert_eq!(msg, StatusMessage::new(5.0, RfidStatus::Absent));
    }

    #[test]
    fn test_whitespace_tolerated() {
        let msg = decode(b" 7.5 , 1\n").expect("decode failed");
        assert_eq!(msg, StatusMessage::new(7.5, RfidStatus::Authorized));
    }

    #[test]
    fn test_non_numeric_fields_rejected() {
        assert!(matches!(
            decode(b"near,1"),
            Err(DecodeError::InvalidDistance(_))
        ));
        assert!(matches!(
            decode(b"12,yes"),
            Err(DecodeError::InvalidRfidCode(_))
        ));
        assert!(matches!(
            decode(b"NaN,0"),
            Err(DecodeError::NonFiniteDistance(_))
        ));
    }

    #[test]
    fn test_decode_keeps_double_precision() {
        let msg = decode(b"30.0000001,0").expect("decode failed");
        assert!(msg.distance_cm > 30.0);

        // Near-miss codes are neither authorized nor unauthorized
        let msg = decode(b"10,1.00000001").expect("decode failed");
        assert_eq!(msg.rfid_status, RfidStatus::Absent);
        let msg = decode(b"10,-0.99999999").expect("decode failed");
        assert_eq!(msg.rfid_status, RfidStatus::Absent);
    }

    #[test]
    fn test_bad_bytes_rejected() {
        assert_eq!(decode(b""), Err(DecodeError::Empty));
        assert_eq!(decode(&[0xff, 0xfe, b',', b'1']), Err(DecodeError::Utf8));
    }

    #[test]
    fn test_roundtrip_preserves_distance() {
        for distance in [0.1_f64, 12.3, 29.999, 30.0, 187.25, -1.0] {
            for status in [
                RfidStatus::Unauthorized,
                RfidStatus::Absent,
                RfidStatus::Authorized,
            ] {
                let original = StatusMessage::new(distance, status);
                let decoded = decode(&encode(&original)).expect("decode failed");
                assert_eq!(decoded, original);
            }
        }
    }
}
