//! BFV key fixtures and a reference decryptor for encrypted votes

use crisp_common::types::{EncryptedVote, RoundPublicKey};
use crisp_core::encryption::bfv_params;
use eyre::{eyre, Result};
use fhe::bfv::{Ciphertext, Encoding, PublicKey, SecretKey};
use fhe_traits::{DeserializeParametrized, FheDecoder, FheDecrypter, Serialize as FheSerialize};
use rand::{CryptoRng, RngCore};

/// A round keypair, standing in for the key the ciphernodes aggregate
pub struct RoundKeypair {
    /// The secret key, held by nobody in a real round
    pub secret_key: SecretKey,
    /// The public key, as the round server publishes it
    pub public_key: RoundPublicKey,
}

/// Generates a random round keypair
pub fn random_round_keypair<R: RngCore + CryptoRng>(rng: &mut R) -> Result<RoundKeypair> {
    let params = bfv_params()?;
    let secret_key = SecretKey::random(&params, rng);
    let public_key = PublicKey::new(&secret_key, rng);

    Ok(RoundKeypair {
        secret_key,
        public_key: RoundPublicKey::new(public_key.to_bytes()),
    })
}

/// Decrypts a vote, returning the choice it encodes
pub fn decrypt_vote(secret_key: &SecretKey, vote: &EncryptedVote) -> Result<u64> {
    decrypt_vote_bytes(secret_key, vote.as_bytes())
}

/// Decrypts a serialized ciphertext, returning the choice it encodes.
///
/// A vote is valid only if every coefficient besides the constant one is zero
pub fn decrypt_vote_bytes(secret_key: &SecretKey, bytes: &[u8]) -> Result<u64> {
    let params = bfv_params()?;
    let ciphertext = Ciphertext::from_bytes(bytes, &params)?;
    let plaintext = secret_key.try_decrypt(&ciphertext)?;
    let coeffs = Vec::<u64>::try_decode(&plaintext, Encoding::poly())?;

    match coeffs.split_first() {
        Some((choice, rest)) if rest.iter().all(|c| *c == 0) => Ok(*choice),
        _ => Err(eyre!("ciphertext does not encode a single choice")),
    }
}
