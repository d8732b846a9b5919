//! Constants that parameterize the encryption scheme, the vote circuit
//! and the round server protocol

/// The ring degree of the BFV parameter set votes are encrypted under
pub const BFV_DEGREE: usize = 4096;

/// The plaintext modulus of the BFV parameter set
pub const BFV_PLAINTEXT_MODULUS: u64 = 4096;

/// The ciphertext moduli of the BFV parameter set.
///
/// These must match the parameters the ciphernodes used to generate the
/// round's public key, otherwise the key fails to deserialize
pub const BFV_MODULI: [u64; 3] = [0xffffee001, 0xffffc4001, 0x1ffffe0001];

/// The number of options in a poll
pub const NUM_POLL_OPTIONS: usize = 2;

/// The default file name of the compiled vote integrity circuit
pub const CIRCUIT_PROGRAM_FILE: &str = "vote_integrity.circuit";

/// The default file name of the vote integrity proving key
pub const PROVING_KEY_FILE: &str = "vote_integrity_0001.zkey";

/// The default file name of the vote integrity verifying key
pub const VERIFYING_KEY_FILE: &str = "vote_integrity.vkey";

/// The response the round server sends when a vote was relayed
pub const VOTE_SUCCESSFUL: &str = "Vote Successful";

/// The response the round server sends when the voter already cast a vote in the round
pub const USER_ALREADY_VOTED: &str = "User Has Already Voted";
