//! Wire framing for the OPAQUE registration and login messages.
//!
//! `ecliptix_crypto::opaque` already produces each message as a flat,
//! fixed-length byte blob (see its `*_LENGTH` constants); this module
//! only adds the transport envelope — a phone number identifying the
//! account and base64 framing for JSON transport. The byte lengths here
//! belong to the 3DH+HKDF transcript variant this crate implements, not
//! the alternate native-library-delegated layout (see DESIGN.md).

use serde::{Deserialize, Serialize};

use ecliptix_crypto::opaque::{
    KE1_LENGTH, KE2_LENGTH, KE3_LENGTH, REGISTRATION_RECORD_LENGTH, REGISTRATION_REQUEST_LENGTH,
    REGISTRATION_RESPONSE_LENGTH,
};
use ecliptix_crypto::error::{EcliptixError, Result};

fn check_len(label: &'static str, bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(EcliptixError::InvalidInput(format!(
            "{label} must be {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub phone_number: String,
    #[serde(with = "crate::codec::base64_vec")]
    pub blinded_element: Vec<u8>,
}

impl RegistrationRequest {
    pub fn new(phone_number: impl Into<String>, blinded_element: Vec<u8>) -> Result<Self> {
        check_len("registration request", &blinded_element, REGISTRATION_REQUEST_LENGTH)?;
        Ok(Self { phone_number: phone_number.into(), blinded_element })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(with = "crate::codec::base64_vec")]
    pub evaluated_element_and_server_public: Vec<u8>,
}

impl RegistrationResponse {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        check_len("registration response", &bytes, REGISTRATION_RESPONSE_LENGTH)?;
        Ok(Self { evaluated_element_and_server_public: bytes })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub phone_number: String,
    #[serde(with = "crate::codec::base64_vec")]
    pub record: Vec<u8>,
}

impl RegistrationRecord {
    pub fn new(phone_number: impl Into<String>, record: Vec<u8>) -> Result<Self> {
        check_len("registration record", &record, REGISTRATION_RECORD_LENGTH)?;
        Ok(Self { phone_number: phone_number.into(), record })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ke1Message {
    pub phone_number: String,
    #[serde(with = "crate::codec::base64_vec")]
    pub ke1: Vec<u8>,
}

impl Ke1Message {
    pub fn new(phone_number: impl Into<String>, ke1: Vec<u8>) -> Result<Self> {
        check_len("KE1", &ke1, KE1_LENGTH)?;
        Ok(Self { phone_number: phone_number.into(), ke1 })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ke2Message {
    #[serde(with = "crate::codec::base64_vec")]
    pub ke2: Vec<u8>,
}

impl Ke2Message {
    pub fn new(ke2: Vec<u8>) -> Result<Self> {
        check_len("KE2", &ke2, KE2_LENGTH)?;
        Ok(Self { ke2 })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ke3Message {
    #[serde(with = "crate::codec::base64_vec")]
    pub client_mac: Vec<u8>,
}

impl Ke3Message {
    pub fn new(client_mac: Vec<u8>) -> Result<Self> {
        check_len("KE3", &client_mac, KE3_LENGTH)?;
        Ok(Self { client_mac })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_request_rejects_wrong_length() {
        assert!(RegistrationRequest::new("+15555550100", vec![0u8; REGISTRATION_REQUEST_LENGTH - 1]).is_err());
    }

    #[test]
    fn ke2_message_round_trips_through_json() {
        let msg = Ke2Message::new(vec![7u8; KE2_LENGTH]).unwrap();
        let json = serde_json::to_string(&msg).unwrap();
        let back: Ke2Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ke2, msg.ke2);
    }
}
