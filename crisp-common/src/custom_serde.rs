//! Custom de/serialization logic used to convert proofs between their arkworks
//! representation and the 256-bit word representation consumed by the round
//! server and the on-chain verifier

use ark_bn254::Bn254;
use ark_ec::AffineRepr;
use ark_ff::{BigInt, PrimeField, Zero};
use ark_groth16::Proof;
use ruint::aliases::U256;

use crate::{
    errors::SerdeError,
    types::{G1Affine, G1BaseField, G2Affine, G2BaseField, RawProof, U256Pair, VoteProof},
};

// -------------------------------
// | WORD SERDE TRAIT DEFINITION |
// -------------------------------

/// A trait for serializing types into 256-bit words
pub trait WordsSerializable {
    /// The word representation of the type
    type Words;

    /// Serializes the type into its word representation
    fn serialize_to_words(&self) -> Self::Words;
}

/// A trait for deserializing types from 256-bit words
pub trait WordsDeserializable: Sized {
    /// The word representation of the type
    type Words;

    /// Deserializes the type from its word representation,
    /// rejecting words that do not describe a valid value
    fn deserialize_from_words(words: &Self::Words) -> Result<Self, SerdeError>;
}

// -------------------------
// | TRAIT IMPLEMENTATIONS |
// -------------------------

impl WordsSerializable for G1BaseField {
    type Words = U256;

    fn serialize_to_words(&self) -> U256 {
        U256::from_limbs(self.into_bigint().0)
    }
}

impl WordsDeserializable for G1BaseField {
    type Words = U256;

    fn deserialize_from_words(words: &U256) -> Result<Self, SerdeError> {
        // Words at or above the modulus are rejected rather than reduced,
        // so every field element has exactly one word representation
        G1BaseField::from_bigint(BigInt::new(*words.as_limbs())).ok_or(SerdeError::ScalarConversion)
    }
}

impl WordsSerializable for G1Affine {
    type Words = U256Pair;

    /// Serializes a G1 point into its affine coordinates `[x, y]`,
    /// the point at infinity being `[0, 0]`
    fn serialize_to_words(&self) -> U256Pair {
        let zero = G1BaseField::zero();
        let (x, y) = self.xy().unwrap_or((&zero, &zero));
        [x.serialize_to_words(), y.serialize_to_words()]
    }
}

impl WordsDeserializable for G1Affine {
    type Words = U256Pair;

    fn deserialize_from_words(words: &U256Pair) -> Result<Self, SerdeError> {
        let x = G1BaseField::deserialize_from_words(&words[0])?;
        let y = G1BaseField::deserialize_from_words(&words[1])?;

        let point = G1Affine {
            x,
            y,
            infinity: x.is_zero() && y.is_zero(),
        };
        if !point.infinity && !point.is_on_curve() {
            return Err(SerdeError::InvalidPoint);
        }

        Ok(point)
    }
}

impl WordsSerializable for G2Affine {
    type Words = [U256Pair; 2];

    /// Serializes a G2 point into the coefficients of its affine coordinates
    /// in the order arkworks stores them, i.e.:
    ///
    /// Given an element of the field extension F_p^2[i] represented as ai + b, where a and b are elements
    /// of F_p, its serialization is `[b, a]`, i.e. `[c0, c1]`.
    ///
    /// This is NOT the order expected by the EVM `ecPairing` precompile,
    /// [`VoteProof`] takes care of the reordering
    fn serialize_to_words(&self) -> [U256Pair; 2] {
        let zero = G2BaseField::zero();
        let (x, y) = self.xy().unwrap_or((&zero, &zero));
        [
            [x.c0.serialize_to_words(), x.c1.serialize_to_words()],
            [y.c0.serialize_to_words(), y.c1.serialize_to_words()],
        ]
    }
}

impl WordsDeserializable for G2Affine {
    type Words = [U256Pair; 2];

    fn deserialize_from_words(words: &[U256Pair; 2]) -> Result<Self, SerdeError> {
        let [[x_c0, x_c1], [y_c0, y_c1]] = words;

        let x = G2BaseField {
            c0: G1BaseField::deserialize_from_words(x_c0)?,
            c1: G1BaseField::deserialize_from_words(x_c1)?,
        };
        let y = G2BaseField {
            c0: G1BaseField::deserialize_from_words(y_c0)?,
            c1: G1BaseField::deserialize_from_words(y_c1)?,
        };

        let point = G2Affine {
            x,
            y,
            infinity: x.is_zero() && y.is_zero(),
        };
        if !point.infinity
            && !(point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve())
        {
            return Err(SerdeError::InvalidPoint);
        }

        Ok(point)
    }
}

impl WordsSerializable for Proof<Bn254> {
    type Words = RawProof;

    fn serialize_to_words(&self) -> RawProof {
        RawProof {
            a: self.a.serialize_to_words(),
            b: self.b.serialize_to_words(),
            c: self.c.serialize_to_words(),
        }
    }
}

impl WordsDeserializable for Proof<Bn254> {
    type Words = RawProof;

    fn deserialize_from_words(words: &RawProof) -> Result<Self, SerdeError> {
        Ok(Proof {
            a: G1Affine::deserialize_from_words(&words.a)?,
            b: G2Affine::deserialize_from_words(&words.b)?,
            c: G1Affine::deserialize_from_words(&words.c)?,
        })
    }
}

/// Converts an arkworks proof into the wire format, reordering `b` for the EVM
pub fn proof_to_wire(proof: &Proof<Bn254>) -> VoteProof {
    VoteProof::from(proof.serialize_to_words())
}

/// Converts a wire format proof back into an arkworks proof
pub fn proof_from_wire(proof: &VoteProof) -> Result<Proof<Bn254>, SerdeError> {
    Proof::deserialize_from_words(&RawProof::from(*proof))
}

#[cfg(test)]
mod tests {
    use ark_bn254::Bn254;
    use ark_ec::AffineRepr;
    use ark_groth16::Proof;
    use ark_std::UniformRand;
    use num_bigint::BigUint;
    use rand::thread_rng;
    use ruint::aliases::U256;

    use crate::{
        errors::SerdeError,
        types::{G1Affine, G1BaseField, G2Affine, VoteProof},
    };

    use super::{proof_from_wire, proof_to_wire, WordsDeserializable, WordsSerializable};

    /// Parses a decimal constant into a word
    fn word(decimal: &str) -> U256 {
        let value = BigUint::parse_bytes(decimal.as_bytes(), 10).unwrap();
        U256::from_be_slice(&value.to_bytes_be())
    }

    #[test]
    fn test_g1_words_serde() {
        let mut rng = thread_rng();
        let a = G1Affine::rand(&mut rng);
        let words = a.serialize_to_words();
        let a_prime = G1Affine::deserialize_from_words(&words).unwrap();
        assert_eq!(a, a_prime)
    }

    #[test]
    fn test_g1_rejects_off_curve_point() {
        let words = [U256::from(1u64), U256::from(3u64)];
        assert_eq!(
            G1Affine::deserialize_from_words(&words),
            Err(SerdeError::InvalidPoint)
        );
    }

    #[test]
    fn test_field_rejects_non_canonical_word() {
        assert_eq!(
            G1BaseField::deserialize_from_words(&U256::MAX),
            Err(SerdeError::ScalarConversion)
        );
    }

    #[test]
    fn test_wire_proof_b_in_evm_order() {
        let proof = Proof::<Bn254> {
            a: G1Affine::generator(),
            b: G2Affine::generator(),
            c: G1Affine::generator(),
        };
        let raw = proof.serialize_to_words();
        let wire = proof_to_wire(&proof);

        // Expected values taken from: https://eips.ethereum.org/EIPS/eip-197#definition-of-the-groups
        let x_c1 = word("11559732032986387107991004021392285783925812861821192530917403151452391805634");
        let x_c0 = word("10857046999023057135944570762232829481370756359578518086990519993285655852781");
        let y_c1 = word("4082367875863433681332203403145435568316851327593401208105741076214120093531");
        let y_c0 = word("8495653923123431417604973247489272438418190587263600148770280649306958101930");

        assert_eq!(raw.b, [[x_c0, x_c1], [y_c0, y_c1]]);
        assert_eq!(wire.b, [[x_c1, x_c0], [y_c1, y_c0]]);
        assert_eq!(wire.a, raw.a);
        assert_eq!(wire.c, raw.c);
        assert_eq!(wire.a, [U256::from(1u64), U256::from(2u64)]);
    }

    #[test]
    fn test_wire_proof_recovers_ark_proof() {
        let mut rng = thread_rng();
        let proof = Proof::<Bn254> {
            a: G1Affine::rand(&mut rng),
            b: G2Affine::rand(&mut rng),
            c: G1Affine::rand(&mut rng),
        };

        let wire = proof_to_wire(&proof);
        assert_eq!(proof_from_wire(&wire).unwrap(), proof);
    }

    #[test]
    fn test_wire_proof_json_shape() {
        let proof = proof_to_wire(&Proof::<Bn254> {
            a: G1Affine::generator(),
            b: G2Affine::generator(),
            c: G1Affine::generator(),
        });
        let json = serde_json::to_value(proof).unwrap();

        assert_eq!(json["a"], serde_json::json!(["1", "2"]));
        assert_eq!(json["b"].as_array().unwrap().len(), 2);
        assert_eq!(
            json["b"][0][0],
            "11559732032986387107991004021392285783925812861821192530917403151452391805634"
        );
        let parsed: VoteProof = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, proof);
    }
}
