//! OPAQUE asymmetric password-authenticated key exchange over NIST P-256.
//!
//! This implements the fully-specified 3DH + HKDF transcript variant (not
//! the native-library-delegated variant with 176B/208B records — see
//! `DESIGN.md` for why). All points are SEC1-compressed P-256 (33 bytes);
//! all lengths below are this crate's own, derived from that choice.

use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use elliptic_curve::{Field, PrimeField};
use p256::{
    ecdh::diffie_hellman, AffinePoint, EncodedPoint, NonZeroScalar, ProjectivePoint, PublicKey,
    Scalar, SecretKey,
};
use rand_core::OsRng;

use crate::config::Config;
use crate::error::{EcliptixError, Result};
use crate::primitives::{self, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crate::secure_buffer::SecureBuffer;

pub const COMPRESSED_POINT_LEN: usize = 33;
pub const CLIENT_STATIC_SECRET_LEN: usize = 32;
pub const ENVELOPE_LEN: usize = AEAD_NONCE_LEN + CLIENT_STATIC_SECRET_LEN + AEAD_TAG_LEN;
pub const MAC_LEN: usize = 32;

pub const REGISTRATION_REQUEST_LENGTH: usize = COMPRESSED_POINT_LEN;
pub const REGISTRATION_RESPONSE_LENGTH: usize = COMPRESSED_POINT_LEN * 2;
pub const REGISTRATION_RECORD_LENGTH: usize = COMPRESSED_POINT_LEN + ENVELOPE_LEN;
pub const KE1_LENGTH: usize = COMPRESSED_POINT_LEN * 2;
pub const KE2_LENGTH: usize = COMPRESSED_POINT_LEN * 2 + ENVELOPE_LEN + MAC_LEN;
pub const KE3_LENGTH: usize = MAC_LEN;
pub const TRANSCRIPT_HASH_LEN: usize = 32;
pub const SESSION_KEY_LENGTH: usize = 32;

const HASH_TO_CURVE_MAX_ATTEMPTS: u16 = 255;
const OPAQUE_SALT_INFO: &[u8] = b"OpaqueSalt";
const CREDENTIAL_KEY_INFO: &[u8] = b"CredentialKey";
const AKE_SALT: &[u8] = b"OPAQUE-AKE";
const SESSION_KEY_INFO: &[u8] = b"SessionKey";
const CLIENT_MAC_INFO: &[u8] = b"ClientMAC";
const SERVER_MAC_INFO: &[u8] = b"ServerMAC";
const EXPORT_KEY_INFO: &[u8] = b"ExportKey";
const TRANSCRIPT_DOMAIN: &[u8] = b"OPAQUE_v1";

/// Hash `password || counter` onto the P-256 curve via try-and-increment.
/// P-256 has cofactor 1, so any point that decodes successfully is
/// automatically in the (whole, prime-order) group; no separate
/// `[n]P = O` check is needed beyond successful decoding.
fn hash_to_curve(password: &[u8]) -> Result<ProjectivePoint> {
    for counter in 0u16..HASH_TO_CURVE_MAX_ATTEMPTS {
        let mut preimage = Vec::with_capacity(password.len() + 2);
        preimage.extend_from_slice(password);
        preimage.extend_from_slice(&counter.to_be_bytes());
        let x = primitives::sha256(&preimage);

        let mut candidate = [0u8; COMPRESSED_POINT_LEN];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&x);

        let encoded = match EncodedPoint::from_bytes(candidate) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let affine = AffinePoint::from_encoded_point(&encoded);
        if bool::from(affine.is_some()) {
            return Ok(ProjectivePoint::from(affine.unwrap()));
        }
    }
    Err(EcliptixError::HashToPointExhausted)
}

fn encode_compressed(point: &ProjectivePoint) -> [u8; COMPRESSED_POINT_LEN] {
    let encoded = point.to_affine().to_encoded_point(true);
    let mut out = [0u8; COMPRESSED_POINT_LEN];
    out.copy_from_slice(encoded.as_bytes());
    out
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|_| EcliptixError::InvalidPeerKey("malformed P-256 point encoding".into()))?;
    let affine = AffinePoint::from_encoded_point(&encoded);
    if bool::from(affine.is_some()) {
        Ok(ProjectivePoint::from(affine.unwrap()))
    } else {
        Err(EcliptixError::InvalidPeerKey("point not on curve".into()))
    }
}

fn decode_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|_| EcliptixError::InvalidPeerKey("malformed P-256 public key encoding".into()))?;
    Option::from(PublicKey::from_encoded_point(&encoded))
        .ok_or_else(|| EcliptixError::InvalidPeerKey("public key not on curve".into()))
}

fn scalar_buffer(scalar: &Scalar) -> SecureBuffer {
    SecureBuffer::from_vec(scalar.to_repr().to_vec())
}

fn buffer_scalar(buf: &SecureBuffer) -> Result<Scalar> {
    let mut repr = [0u8; 32];
    buf.read(&mut repr)?;
    Option::from(Scalar::from_repr(repr.into()))
        .ok_or_else(|| EcliptixError::CryptoError("invalid P-256 scalar encoding".into()))
}

/// Oblivious unblinding: `r^-1 * response`, compressed-encoded.
fn unblind(response_point: &ProjectivePoint, r: &Scalar) -> Result<[u8; COMPRESSED_POINT_LEN]> {
    let r_inv: Option<Scalar> = r.invert().into();
    let r_inv = r_inv.ok_or_else(|| EcliptixError::BlindingFailed("blinding scalar has no inverse".into()))?;
    Ok(encode_compressed(&(*response_point * r_inv)))
}

fn derive_credential_material(oprf_key: &[u8], password: &[u8], pbkdf2_iterations: u32) -> Result<([u8; 32], [u8; 32])> {
    let salt = primitives::hkdf_extract_then_expand(None, oprf_key, OPAQUE_SALT_INFO, 16)?;
    // Stretching is always performed, win or lose, for timing parity with
    // the credential-key path; the spec's derivation chain does not fold
    // `stretch` into `credential_key`, so it is computed and discarded.
    let mut stretch = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, &salt, pbkdf2_iterations, &mut stretch);

    let credential_key_vec = primitives::hkdf_extract_then_expand(None, oprf_key, CREDENTIAL_KEY_INFO, 32)?;
    let mut credential_key = [0u8; 32];
    credential_key.copy_from_slice(&credential_key_vec);
    Ok((credential_key, stretch))
}

/// State held between `create_registration_request` and
/// `finalize_registration`.
pub struct RegistrationState {
    r: SecureBuffer,
    password: SecureBuffer,
}

/// State held between `generate_ke1` and `generate_ke3`/`derive_session_key`.
pub struct LoginClientState {
    r: SecureBuffer,
    password: SecureBuffer,
    esk_c: SecureBuffer,
    ke1_bytes: Vec<u8>,
    session_key: Option<SecureBuffer>,
    export_key: Option<SecureBuffer>,
}

pub struct OpaqueClient {
    pbkdf2_iterations: u32,
}

impl OpaqueClient {
    pub fn new(config: &Config) -> Self {
        Self { pbkdf2_iterations: config.pbkdf2_iterations }
    }

    pub fn create_registration_request(&self, password: &[u8]) -> Result<(Vec<u8>, RegistrationState)> {
        let p = hash_to_curve(password)?;
        let r = NonZeroScalar::random(&mut OsRng);
        let blinded = p * *r.as_ref();
        let request = encode_compressed(&blinded).to_vec();

        let state = RegistrationState {
            r: scalar_buffer(r.as_ref()),
            password: SecureBuffer::from_vec(password.to_vec()),
        };
        Ok((request, state))
    }

    pub fn finalize_registration(&self, server_response: &[u8], state: RegistrationState) -> Result<Vec<u8>> {
        if server_response.len() != REGISTRATION_RESPONSE_LENGTH {
            return Err(EcliptixError::InvalidInput(format!(
                "registration response must be {REGISTRATION_RESPONSE_LENGTH} bytes, got {}",
                server_response.len()
            )));
        }
        let oprf_response = decode_point(&server_response[..COMPRESSED_POINT_LEN])?;
        // Validated for shape only; the client does not retain the
        // server's static public key across registration and login — see
        // DESIGN.md.
        decode_public_key(&server_response[COMPRESSED_POINT_LEN..])?;

        let r = buffer_scalar(&state.r)?;
        let oprf_key_point = unblind(&oprf_response, &r)?;
        let password = state.password.read_copy();

        let (credential_key, _stretch) =
            derive_credential_material(&oprf_key_point, &password, self.pbkdf2_iterations)?;

        let client_secret = SecretKey::random(&mut OsRng);
        let client_public = client_secret.public_key();
        let csk_bytes = client_secret.to_bytes();

        let nonce_vec = primitives::random_bytes(AEAD_NONCE_LEN);
        let mut nonce = [0u8; AEAD_NONCE_LEN];
        nonce.copy_from_slice(&nonce_vec);

        let (ct, tag) = primitives::aead_seal(&credential_key, &nonce, &password, &csk_bytes)?;

        let mut record = Vec::with_capacity(REGISTRATION_RECORD_LENGTH);
        record.extend_from_slice(client_public.to_encoded_point(true).as_bytes());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&ct);
        record.extend_from_slice(&tag);
        Ok(record)
    }

    pub fn generate_ke1(&self, password: &[u8]) -> Result<(Vec<u8>, LoginClientState)> {
        let p = hash_to_curve(password)?;
        let r = NonZeroScalar::random(&mut OsRng);
        let blinded = p * *r.as_ref();

        let esk_c = SecretKey::random(&mut OsRng);
        let epk_c = esk_c.public_key();

        let mut ke1 = Vec::with_capacity(KE1_LENGTH);
        ke1.extend_from_slice(&encode_compressed(&blinded));
        ke1.extend_from_slice(epk_c.to_encoded_point(true).as_bytes());

        let state = LoginClientState {
            r: scalar_buffer(r.as_ref()),
            password: SecureBuffer::from_vec(password.to_vec()),
            esk_c: SecureBuffer::from_vec(esk_c.to_bytes().to_vec()),
            ke1_bytes: ke1.clone(),
            session_key: None,
            export_key: None,
        };
        Ok((ke1, state))
    }

    /// `server_static_public` is the server's long-term P-256 identity
    /// public key, pinned by the caller ahead of time — it is not carried
    /// on this wire path (see DESIGN.md).
    pub fn generate_ke3(
        &self,
        ke2_bytes: &[u8],
        phone_number: &str,
        server_static_public: &[u8],
        state: &mut LoginClientState,
    ) -> Result<Vec<u8>> {
        if ke2_bytes.len() != KE2_LENGTH {
            return Err(EcliptixError::InvalidInput(format!(
                "KE2 must be {KE2_LENGTH} bytes, got {}",
                ke2_bytes.len()
            )));
        }

        let oprf_response_bytes = &ke2_bytes[..COMPRESSED_POINT_LEN];
        let server_ephemeral_bytes = &ke2_bytes[COMPRESSED_POINT_LEN..COMPRESSED_POINT_LEN * 2];
        let envelope_ciphertext = &ke2_bytes[COMPRESSED_POINT_LEN * 2..COMPRESSED_POINT_LEN * 2 + ENVELOPE_LEN];
        let server_mac = &ke2_bytes[COMPRESSED_POINT_LEN * 2 + ENVELOPE_LEN..];

        let oprf_response = decode_point(oprf_response_bytes)?;
        let r = buffer_scalar(&state.r)?;
        let oprf_key_point = unblind(&oprf_response, &r)?;
        let password = state.password.read_copy();

        let (credential_key, _stretch) =
            derive_credential_material(&oprf_key_point, &password, self.pbkdf2_iterations)?;

        let nonce: [u8; AEAD_NONCE_LEN] = envelope_ciphertext[..AEAD_NONCE_LEN].try_into().unwrap();
        let ct = &envelope_ciphertext[AEAD_NONCE_LEN..AEAD_NONCE_LEN + CLIENT_STATIC_SECRET_LEN];
        let tag: [u8; AEAD_TAG_LEN] = envelope_ciphertext[AEAD_NONCE_LEN + CLIENT_STATIC_SECRET_LEN..]
            .try_into()
            .unwrap();

        let csk_bytes = primitives::aead_open(&credential_key, &nonce, &password, ct, &tag)
            .map_err(|_| EcliptixError::EnvelopeOpenFailed)?;

        let csk = SecretKey::from_slice(&csk_bytes)
            .map_err(|_| EcliptixError::EnvelopeOpenFailed)?;

        let server_ephemeral_public = decode_public_key(server_ephemeral_bytes)?;
        let server_static_public = decode_public_key(server_static_public)?;
        let esk_c = {
            let mut repr = [0u8; 32];
            state.esk_c.read(&mut repr)?;
            SecretKey::from_slice(&repr).map_err(|_| EcliptixError::CryptoError("invalid esk_c".into()))?
        };

        let dh1 = diffie_hellman(&esk_c.to_nonzero_scalar(), server_ephemeral_public.as_affine());
        let dh2 = diffie_hellman(&csk.to_nonzero_scalar(), server_ephemeral_public.as_affine());
        let dh3 = diffie_hellman(&esk_c.to_nonzero_scalar(), server_static_public.as_affine());

        let mut ikm = Vec::with_capacity(96);
        ikm.extend_from_slice(dh1.raw_secret_bytes());
        ikm.extend_from_slice(dh2.raw_secret_bytes());
        ikm.extend_from_slice(dh3.raw_secret_bytes());

        let mut transcript_input = Vec::with_capacity(
            TRANSCRIPT_DOMAIN.len() + phone_number.len() + state.ke1_bytes.len() + server_ephemeral_bytes.len() + envelope_ciphertext.len(),
        );
        transcript_input.extend_from_slice(TRANSCRIPT_DOMAIN);
        transcript_input.extend_from_slice(phone_number.as_bytes());
        transcript_input.extend_from_slice(&state.ke1_bytes);
        transcript_input.extend_from_slice(server_ephemeral_bytes);
        transcript_input.extend_from_slice(envelope_ciphertext);
        let transcript_hash = primitives::sha256(&transcript_input);

        let prk = primitives::hkdf_extract(Some(AKE_SALT), &ikm);

        let mut session_key_info = Vec::with_capacity(SESSION_KEY_INFO.len() + transcript_hash.len());
        session_key_info.extend_from_slice(SESSION_KEY_INFO);
        session_key_info.extend_from_slice(&transcript_hash);
        let session_key = primitives::hkdf_expand(&prk, &session_key_info, SESSION_KEY_LENGTH)?;

        let mut client_mac_info = Vec::with_capacity(CLIENT_MAC_INFO.len() + transcript_hash.len());
        client_mac_info.extend_from_slice(CLIENT_MAC_INFO);
        client_mac_info.extend_from_slice(&transcript_hash);
        let client_mac_key = primitives::hkdf_expand(&prk, &client_mac_info, 32)?;

        let mut server_mac_info = Vec::with_capacity(SERVER_MAC_INFO.len() + transcript_hash.len());
        server_mac_info.extend_from_slice(SERVER_MAC_INFO);
        server_mac_info.extend_from_slice(&transcript_hash);
        let server_mac_key = primitives::hkdf_expand(&prk, &server_mac_info, 32)?;

        let mut export_key_info = Vec::with_capacity(EXPORT_KEY_INFO.len() + transcript_hash.len());
        export_key_info.extend_from_slice(EXPORT_KEY_INFO);
        export_key_info.extend_from_slice(&transcript_hash);
        let export_key = primitives::hkdf_expand(&prk, &export_key_info, 32)?;

        let expected_server_mac = primitives::hmac_sha256(&server_mac_key, &transcript_hash);
        if !crate::secure_buffer::constant_time_eq_bytes(&expected_server_mac, server_mac) {
            return Err(EcliptixError::ServerMacInvalid);
        }

        let client_mac = primitives::hmac_sha256(&client_mac_key, &transcript_hash);

        state.session_key = Some(SecureBuffer::from_vec(session_key));
        state.export_key = Some(SecureBuffer::from_vec(export_key));

        tracing::debug!("opaque login transcript verified, session key derived");
        Ok(client_mac.to_vec())
    }

    pub fn derive_session_key(&self, state: &LoginClientState) -> Result<[u8; SESSION_KEY_LENGTH]> {
        let buf = state
            .session_key
            .as_ref()
            .ok_or_else(|| EcliptixError::InvalidInput("session key not yet derived; call generate_ke3 first".into()))?;
        let mut out = [0u8; SESSION_KEY_LENGTH];
        buf.read(&mut out)?;
        Ok(out)
    }

    pub fn derive_export_key(&self, state: &LoginClientState) -> Result<[u8; 32]> {
        let buf = state
            .export_key
            .as_ref()
            .ok_or_else(|| EcliptixError::InvalidInput("export key not yet derived; call generate_ke3 first".into()))?;
        let mut out = [0u8; 32];
        buf.read(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal in-test server double: runs the server half of OPAQUE
    /// well enough to exercise the client scenarios from §8 without
    /// pulling in a second implementation crate. Mirrors `generate_ke3`'s
    /// transcript math exactly, from the server's side of each DH term.
    struct TestServer {
        oprf_seed: Scalar,
        static_secret: SecretKey,
        record: Vec<u8>,
    }

    impl TestServer {
        fn new() -> Self {
            Self {
                oprf_seed: *NonZeroScalar::random(&mut OsRng).as_ref(),
                static_secret: SecretKey::random(&mut OsRng),
                record: Vec::new(),
            }
        }

        fn static_public_bytes(&self) -> Vec<u8> {
            self.static_secret.public_key().to_encoded_point(true).as_bytes().to_vec()
        }

        fn oprf_evaluate(&self, blinded: &[u8]) -> Vec<u8> {
            let point = decode_point(blinded).unwrap();
            encode_compressed(&(point * self.oprf_seed)).to_vec()
        }

        fn registration_response(&self, request: &[u8]) -> Vec<u8> {
            let mut out = self.oprf_evaluate(request);
            out.extend_from_slice(&self.static_public_bytes());
            out
        }

        fn store_record(&mut self, record: Vec<u8>) {
            self.record = record;
        }

        /// Build a fully valid KE2 (correct server MAC) plus the server's
        /// own view of the session/client-MAC keys and transcript hash,
        /// for asserting agreement with the client's derived values.
        fn ke2_and_keys(&self, ke1: &[u8], phone_number: &str) -> (Vec<u8>, [u8; 32], [u8; 32], [u8; 32]) {
            let client_ephemeral_public = decode_public_key(&ke1[COMPRESSED_POINT_LEN..]).unwrap();
            let client_static_public = decode_public_key(&self.record[..COMPRESSED_POINT_LEN]).unwrap();
            let envelope_ciphertext = &self.record[COMPRESSED_POINT_LEN..COMPRESSED_POINT_LEN + ENVELOPE_LEN];

            let oprf_response = self.oprf_evaluate(&ke1[..COMPRESSED_POINT_LEN]);
            let server_ephemeral_secret = SecretKey::random(&mut OsRng);
            let server_ephemeral_public = server_ephemeral_secret.public_key().to_encoded_point(true);

            let dh1 = diffie_hellman(&server_ephemeral_secret.to_nonzero_scalar(), client_ephemeral_public.as_affine());
            let dh2 = diffie_hellman(&server_ephemeral_secret.to_nonzero_scalar(), client_static_public.as_affine());
            let dh3 = diffie_hellman(&self.static_secret.to_nonzero_scalar(), client_ephemeral_public.as_affine());

            let mut ikm = Vec::with_capacity(96);
            ikm.extend_from_slice(dh1.raw_secret_bytes());
            ikm.extend_from_slice(dh2.raw_secret_bytes());
            ikm.extend_from_slice(dh3.raw_secret_bytes());

            let mut transcript_input = Vec::new();
            transcript_input.extend_from_slice(TRANSCRIPT_DOMAIN);
            transcript_input.extend_from_slice(phone_number.as_bytes());
            transcript_input.extend_from_slice(ke1);
            transcript_input.extend_from_slice(server_ephemeral_public.as_bytes());
            transcript_input.extend_from_slice(envelope_ciphertext);
            let transcript_hash = primitives::sha256(&transcript_input);

            let prk = primitives::hkdf_extract(Some(AKE_SALT), &ikm);
            let session_key: [u8; 32] = {
                let mut info = SESSION_KEY_INFO.to_vec();
                info.extend_from_slice(&transcript_hash);
                primitives::hkdf_expand(&prk, &info, 32).unwrap().try_into().unwrap()
            };
            let client_mac_key: [u8; 32] = {
                let mut info = CLIENT_MAC_INFO.to_vec();
                info.extend_from_slice(&transcript_hash);
                primitives::hkdf_expand(&prk, &info, 32).unwrap().try_into().unwrap()
            };
            let server_mac_key: [u8; 32] = {
                let mut info = SERVER_MAC_INFO.to_vec();
                info.extend_from_slice(&transcript_hash);
                primitives::hkdf_expand(&prk, &info, 32).unwrap().try_into().unwrap()
            };
            let server_mac = primitives::hmac_sha256(&server_mac_key, &transcript_hash);

            let mut ke2 = Vec::with_capacity(KE2_LENGTH);
            ke2.extend_from_slice(&oprf_response);
            ke2.extend_from_slice(server_ephemeral_public.as_bytes());
            ke2.extend_from_slice(envelope_ciphertext);
            ke2.extend_from_slice(&server_mac);

            (ke2, session_key, client_mac_key, transcript_hash)
        }
    }

    #[test]
    fn hash_to_curve_is_deterministic_for_same_password() {
        let a = hash_to_curve(b"correct horse battery staple").unwrap();
        let b = hash_to_curve(b"correct horse battery staple").unwrap();
        assert_eq!(encode_compressed(&a), encode_compressed(&b));
    }

    #[test]
    fn registration_request_has_expected_length() {
        let client = OpaqueClient::new(&Config { pbkdf2_iterations: 1000, ..Config::default() });
        let (request, _state) = client.create_registration_request(b"hunter2").unwrap();
        assert_eq!(request.len(), REGISTRATION_REQUEST_LENGTH);
    }

    #[test]
    fn registration_round_trips_through_test_server() {
        let client = OpaqueClient::new(&Config { pbkdf2_iterations: 1000, ..Config::default() });
        let server = TestServer::new();

        let (request, state) = client.create_registration_request(b"hunter2").unwrap();
        let response = server.registration_response(&request);
        let record = client.finalize_registration(&response, state).unwrap();
        assert_eq!(record.len(), REGISTRATION_RECORD_LENGTH);
    }

    #[test]
    fn correct_password_login_verifies_and_matches() {
        let client = OpaqueClient::new(&Config { pbkdf2_iterations: 1000, ..Config::default() });
        let mut server = TestServer::new();
        let phone_number = "+15555550100";

        let (reg_request, reg_state) = client.create_registration_request(b"hunter2").unwrap();
        let reg_response = server.registration_response(&reg_request);
        let record = client.finalize_registration(&reg_response, reg_state).unwrap();
        server.store_record(record);

        let (ke1, mut login_state) = client.generate_ke1(b"hunter2").unwrap();
        let (ke2, server_session_key, server_client_mac_key, transcript_hash) =
            server.ke2_and_keys(&ke1, phone_number);

        let server_static_public = server.static_public_bytes();
        let client_mac = client
            .generate_ke3(&ke2, phone_number, &server_static_public, &mut login_state)
            .unwrap();
        assert_eq!(client_mac.len(), KE3_LENGTH);
        assert_eq!(client_mac, primitives::hmac_sha256(&server_client_mac_key, &transcript_hash));

        let session_key = client.derive_session_key(&login_state).unwrap();
        assert_eq!(session_key, server_session_key);
    }

    #[test]
    fn wrong_password_fails_envelope_open() {
        let client = OpaqueClient::new(&Config { pbkdf2_iterations: 1000, ..Config::default() });
        let mut server = TestServer::new();
        let phone_number = "+15555550100";

        let (reg_request, reg_state) = client.create_registration_request(b"hunter2").unwrap();
        let reg_response = server.registration_response(&reg_request);
        let record = client.finalize_registration(&reg_response, reg_state).unwrap();
        server.store_record(record);

        let (ke1, mut login_state) = client.generate_ke1(b"wrong-password").unwrap();
        let (ke2, _session_key, _client_mac_key, _transcript_hash) = server.ke2_and_keys(&ke1, phone_number);

        let server_static_public = server.static_public_bytes();
        let result = client.generate_ke3(&ke2, phone_number, &server_static_public, &mut login_state);
        assert!(matches!(result, Err(EcliptixError::EnvelopeOpenFailed)));
    }
}
