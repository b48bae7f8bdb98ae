use p256::ecdh::EphemeralSecret;
use p256::EncodedPoint;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::handshake::Random;
use crate::prf;
use crate::srtp_profile::SrtpProfile;
use shared::crypto::KeyingMaterialExporter;

/// Everything about one handshake that outlives a single flight: the
/// randoms, the negotiated suite, the running transcript hash and, once
/// derived, the master secret. One `ConnectionState` per `Pair`.
pub struct ConnectionState {
    pub local_epoch: u16,
    pub remote_epoch: u16,
    pub local_sequence_number: u64,
    pub remote_sequence_number: u64,
    pub client_random: Option<Random>,
    pub server_random: Random,
    pub cookie: Vec<u8>,
    pub srtp_profile: Option<SrtpProfile>,
    pub extended_master_secret: bool,
    pub master_secret: Option<Vec<u8>>,
    pub peer_certificate_der: Option<Vec<u8>>,
    ephemeral_secret: Option<EphemeralSecret>,
    transcript: Sha256,
}

impl ConnectionState {
    pub fn new() -> Self {
        ConnectionState {
            local_epoch: 0,
            remote_epoch: 0,
            local_sequence_number: 0,
            remote_sequence_number: 0,
            client_random: None,
            server_random: Random::generate(),
            cookie: Vec::new(),
            srtp_profile: None,
            extended_master_secret: false,
            master_secret: None,
            peer_certificate_der: None,
            ephemeral_secret: None,
            transcript: Sha256::new(),
        }
    }

    pub fn next_local_sequence_number(&mut self) -> u64 {
        let seq = self.local_sequence_number;
        self.local_sequence_number += 1;
        seq
    }

    pub fn record_handshake_message(&mut self, raw: &[u8]) {
        self.transcript.update(raw);
    }

    pub fn transcript_hash(&self) -> Vec<u8> {
        self.transcript.clone().finalize().to_vec()
    }

    pub fn generate_server_keypair(&mut self) -> EncodedPoint {
        let secret = EphemeralSecret::random(&mut rand::rngs::OsRng);
        let point = EncodedPoint::from(secret.public_key());
        self.ephemeral_secret = Some(secret);
        point
    }

    /// Consumes the server's ephemeral secret against the client's public
    /// point to derive the pre-master secret, then runs the TLS 1.2 PRF to
    /// get `master_secret`. Called once, when ClientKeyExchange arrives.
    pub fn derive_master_secret(&mut self, client_public: &[u8]) -> Result<()> {
        let secret = self
            .ephemeral_secret
            .take()
            .ok_or_else(|| Error::Crypto("no local keypair generated".into()))?;
        let client_point = p256::PublicKey::from_sec1_bytes(client_public)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let shared = secret.diffie_hellman(&client_point);
        let pre_master_secret = shared.raw_secret_bytes().to_vec();

        let client_random = self
            .client_random
            .as_ref()
            .ok_or_else(|| Error::Crypto("client random not yet seen".into()))?
            .to_bytes();
        let server_random = self.server_random.to_bytes();
        let master = prf::master_secret(&pre_master_secret, &client_random, &server_random)?;
        self.master_secret = Some(master);
        Ok(())
    }

    pub fn verify_data(&self, client_sends: bool) -> Result<Vec<u8>> {
        let master_secret = self
            .master_secret
            .as_ref()
            .ok_or_else(|| Error::Crypto("master secret not derived yet".into()))?;
        let label: &'static [u8] = if client_sends { b"client finished" } else { b"server finished" };
        prf::verify_data(master_secret, &self.transcript_hash(), label)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

const INVALID_KEYING_LABELS: &[&str] = &["client finished", "server finished", "master secret", "key expansion"];

impl KeyingMaterialExporter for ConnectionState {
    fn export_keying_material(&self, label: &str, context: &[u8], length: usize) -> shared::error::Result<Vec<u8>> {
        if self.local_epoch == 0 {
            return Err(shared::error::Error::HandshakeInProgress);
        }
        if !context.is_empty() {
            return Err(shared::error::Error::ContextUnsupported);
        }
        if INVALID_KEYING_LABELS.contains(&label) {
            return Err(shared::error::Error::ReservedExportKeyingMaterial(label.to_string()));
        }
        let master_secret = self
            .master_secret
            .as_ref()
            .ok_or(shared::error::Error::HandshakeInProgress)?;
        let client_random = self
            .client_random
            .as_ref()
            .map(|r| r.to_bytes())
            .ok_or(shared::error::Error::HandshakeInProgress)?;
        let server_random = self.server_random.to_bytes();

        // This gateway only ever plays the server role, so the export
        // ordering is always remote (client) random then local (server)
        // random — RFC 5705's ordering is from the perspective of the
        // connection's originator, i.e. the client.
        let mut seed = label.as_bytes().to_vec();
        seed.extend_from_slice(&client_random);
        seed.extend_from_slice(&server_random);
        prf::p_hash(master_secret, &seed, length).map_err(|e| shared::error::Error::Hash(e.to_string()))
    }
}
