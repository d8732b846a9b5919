//! The vote integrity circuit, its compiled constraint program, and the
//! one-off setup that produces the proving and verifying keys

use ark_bn254::Bn254;
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_relations::{
    lc,
    r1cs::{
        ConstraintMatrices, ConstraintSynthesizer, ConstraintSystem, ConstraintSystemRef, Matrix,
        OptimizationGoal, SynthesisError, SynthesisMode, Variable,
    },
};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use ark_snark::SNARK;
use crisp_common::{errors::VoteError, types::ScalarField};
use rand::{CryptoRng, RngCore};

/// The header every serialized circuit program starts with
const PROGRAM_MAGIC: &[u8; 8] = b"CRISPVIC";

/// The version of the circuit program encoding
const PROGRAM_VERSION: u64 = 1;

/// The R1CS matrices of the vote circuit
pub type VoteMatrices = ConstraintMatrices<ScalarField>;

// -----------
// | CIRCUIT |
// -----------

/// Proves that a private vote is one of the first `num_options` integers,
/// by constraining `(vote - 0) * (vote - 1) * ... * (vote - (num_options - 1)) = 0`.
///
/// Each partial product is its own witness, so that every constraint is
/// quadratic. With two options this is the single constraint
/// `vote * (vote - 1) = 0`
#[derive(Clone, Copy, Debug)]
pub struct VoteIntegrityCircuit {
    /// The vote, absent during setup
    vote: Option<ScalarField>,
    /// The number of valid options
    num_options: usize,
}

impl VoteIntegrityCircuit {
    /// A circuit with no assignment, for setup and compilation
    pub fn blank(num_options: usize) -> Self {
        Self {
            vote: None,
            num_options,
        }
    }

    /// A circuit assigned the given vote
    pub fn with_vote(num_options: usize, vote: u64) -> Self {
        Self {
            vote: Some(ScalarField::from(vote)),
            num_options,
        }
    }
}

impl ConstraintSynthesizer<ScalarField> for VoteIntegrityCircuit {
    fn generate_constraints(
        self,
        cs: ConstraintSystemRef<ScalarField>,
    ) -> Result<(), SynthesisError> {
        if self.num_options == 0 {
            return Err(SynthesisError::Unsatisfiable);
        }

        let vote =
            cs.new_witness_variable(|| self.vote.ok_or(SynthesisError::AssignmentMissing))?;

        // A single option leaves only `vote = 0`
        if self.num_options == 1 {
            return cs.enforce_constraint(lc!() + vote, lc!() + Variable::One, lc!());
        }

        let mut product = vote;
        let mut product_value = self.vote;
        for i in 1..self.num_options {
            let offset = ScalarField::from(i as u64);
            let factor = lc!() + vote - (offset, Variable::One);

            if i == self.num_options - 1 {
                cs.enforce_constraint(lc!() + product, factor, lc!())?;
                break;
            }

            let next_value = product_value.zip(self.vote).map(|(p, v)| p * (v - offset));
            let next =
                cs.new_witness_variable(|| next_value.ok_or(SynthesisError::AssignmentMissing))?;
            cs.enforce_constraint(lc!() + product, factor, lc!() + next)?;

            product = next;
            product_value = next_value;
        }

        Ok(())
    }
}

// -----------
// | PROGRAM |
// -----------

/// The compiled vote circuit: its constraint matrices, along with the number
/// of options it was compiled for
#[derive(Clone, Debug)]
pub struct CircuitProgram {
    /// The number of valid options
    num_options: usize,
    /// The constraint matrices
    matrices: VoteMatrices,
}

impl CircuitProgram {
    /// Compiles the vote circuit for `num_options` options
    pub fn compile(num_options: usize) -> Result<Self, VoteError> {
        let cs = ConstraintSystem::<ScalarField>::new_ref();
        cs.set_optimization_goal(OptimizationGoal::Constraints);
        cs.set_mode(SynthesisMode::Setup);

        VoteIntegrityCircuit::blank(num_options)
            .generate_constraints(cs.clone())
            .map_err(|e| VoteError::Initialization(format!("circuit compilation failed: {e}")))?;
        cs.finalize();

        let matrices = cs.to_matrices().ok_or_else(|| {
            VoteError::Initialization("constraint system produced no matrices".to_string())
        })?;

        Ok(Self {
            num_options,
            matrices,
        })
    }

    /// The number of valid options
    pub fn num_options(&self) -> usize {
        self.num_options
    }

    /// The constraint matrices
    pub fn matrices(&self) -> &VoteMatrices {
        &self.matrices
    }

    /// The total number of variables, including the constant one
    pub fn num_variables(&self) -> usize {
        self.matrices.num_instance_variables + self.matrices.num_witness_variables
    }

    /// Serializes the program
    pub fn to_bytes(&self) -> Result<Vec<u8>, VoteError> {
        let m = &self.matrices;
        let mut bytes = PROGRAM_MAGIC.to_vec();

        let header = [
            PROGRAM_VERSION,
            self.num_options as u64,
            m.num_instance_variables as u64,
            m.num_witness_variables as u64,
            m.num_constraints as u64,
        ];
        let write_err = |e: SerializationError| VoteError::Initialization(e.to_string());
        for word in header {
            word.serialize_uncompressed(&mut bytes).map_err(write_err)?;
        }
        for matrix in [&m.a, &m.b, &m.c] {
            matrix.serialize_uncompressed(&mut bytes).map_err(write_err)?;
        }

        Ok(bytes)
    }

    /// Deserializes a program, checking that its matrices are well formed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VoteError> {
        let mut reader = bytes
            .strip_prefix(PROGRAM_MAGIC)
            .ok_or_else(|| VoteError::Initialization("not a circuit program".to_string()))?;
        let parse_err = |e: SerializationError| {
            VoteError::Initialization(format!("malformed circuit program: {e}"))
        };

        let mut header = [0u64; 5];
        for word in header.iter_mut() {
            *word = u64::deserialize_uncompressed(&mut reader).map_err(parse_err)?;
        }
        let [version, num_options, num_instance_variables, num_witness_variables, num_constraints] =
            header;
        if version != PROGRAM_VERSION {
            return Err(VoteError::Initialization(format!(
                "unsupported circuit program version {version}"
            )));
        }

        let a = Matrix::<ScalarField>::deserialize_uncompressed(&mut reader).map_err(parse_err)?;
        let b = Matrix::<ScalarField>::deserialize_uncompressed(&mut reader).map_err(parse_err)?;
        let c = Matrix::<ScalarField>::deserialize_uncompressed(&mut reader).map_err(parse_err)?;

        let num_variables = (num_instance_variables + num_witness_variables) as usize;
        let num_constraints = num_constraints as usize;
        for matrix in [&a, &b, &c] {
            let well_formed = matrix.len() == num_constraints
                && matrix.iter().flatten().all(|(_, col)| *col < num_variables);
            if !well_formed {
                return Err(VoteError::Initialization(
                    "circuit program matrices do not match its dimensions".to_string(),
                ));
            }
        }

        let nnz = |m: &Matrix<ScalarField>| -> usize { m.iter().map(Vec::len).sum() };
        Ok(Self {
            num_options: num_options as usize,
            matrices: ConstraintMatrices {
                num_instance_variables: num_instance_variables as usize,
                num_witness_variables: num_witness_variables as usize,
                num_constraints,
                a_num_non_zero: nnz(&a),
                b_num_non_zero: nnz(&b),
                c_num_non_zero: nnz(&c),
                a,
                b,
                c,
            },
        })
    }
}

// ---------
// | SETUP |
// ---------

/// Everything produced by the circuit-specific setup
#[derive(Clone, Debug)]
pub struct CircuitArtifacts {
    /// The compiled circuit
    pub program: CircuitProgram,
    /// The Groth16 proving key
    pub proving_key: ProvingKey<Bn254>,
    /// The Groth16 verifying key
    pub verifying_key: VerifyingKey<Bn254>,
}

impl CircuitArtifacts {
    /// The serialized circuit program
    pub fn program_bytes(&self) -> Result<Vec<u8>, VoteError> {
        self.program.to_bytes()
    }

    /// The serialized proving key
    pub fn proving_key_bytes(&self) -> Result<Vec<u8>, VoteError> {
        serialize_uncompressed(&self.proving_key)
    }

    /// The serialized verifying key
    pub fn verifying_key_bytes(&self) -> Result<Vec<u8>, VoteError> {
        serialize_uncompressed(&self.verifying_key)
    }
}

/// Serializes an arkworks value in its uncompressed canonical encoding
fn serialize_uncompressed<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>, VoteError> {
    let mut bytes = Vec::with_capacity(value.uncompressed_size());
    value
        .serialize_uncompressed(&mut bytes)
        .map_err(|e| VoteError::Initialization(e.to_string()))?;
    Ok(bytes)
}

/// Compiles the vote circuit for `num_options` options and runs its
/// Groth16 setup.
///
/// The randomness drawn from `rng` is toxic waste: whoever learns it can
/// forge proofs
pub fn generate_artifacts<R: RngCore + CryptoRng>(
    num_options: usize,
    rng: &mut R,
) -> Result<CircuitArtifacts, VoteError> {
    let program = CircuitProgram::compile(num_options)?;
    let (proving_key, verifying_key) =
        Groth16::<Bn254>::circuit_specific_setup(VoteIntegrityCircuit::blank(num_options), rng)
            .map_err(|e| VoteError::Initialization(format!("circuit setup failed: {e}")))?;

    Ok(CircuitArtifacts {
        program,
        proving_key,
        verifying_key,
    })
}

#[cfg(test)]
mod tests {
    use ark_ff::{Field, Zero};
    use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
    use crisp_common::{constants::NUM_POLL_OPTIONS, types::ScalarField};

    use super::{CircuitProgram, VoteIntegrityCircuit};

    /// Evaluates `(vote - 0) * ... * (vote - (num_options - 1))` natively
    fn vote_polynomial(num_options: usize, vote: u64) -> ScalarField {
        let vote = ScalarField::from(vote);
        (0..num_options as u64).fold(ScalarField::ONE, |acc, i| acc * (vote - ScalarField::from(i)))
    }

    /// Whether the circuit is satisfied by the given vote
    fn is_satisfied(num_options: usize, vote: u64) -> bool {
        let cs = ConstraintSystem::<ScalarField>::new_ref();
        VoteIntegrityCircuit::with_vote(num_options, vote)
            .generate_constraints(cs.clone())
            .unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn test_circuit_accepts_exactly_the_options() {
        for num_options in 1..=4 {
            for vote in 0..num_options as u64 {
                assert!(is_satisfied(num_options, vote));
                assert!(vote_polynomial(num_options, vote).is_zero());
            }
            assert!(!is_satisfied(num_options, num_options as u64));
            assert!(!is_satisfied(num_options, u64::MAX));
        }
    }

    #[test]
    fn test_two_option_program_is_one_constraint() {
        let program = CircuitProgram::compile(NUM_POLL_OPTIONS).unwrap();
        let m = program.matrices();

        assert_eq!(m.num_constraints, 1);
        assert_eq!(m.num_instance_variables, 1);
        assert_eq!(m.num_witness_variables, 1);
        assert_eq!(program.num_variables(), 2);
    }

    #[test]
    fn test_program_bytes_recover_matrices() {
        let program = CircuitProgram::compile(3).unwrap();
        let parsed = CircuitProgram::from_bytes(&program.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed.num_options(), 3);
        assert_eq!(parsed.matrices(), program.matrices());
    }

    #[test]
    fn test_truncated_program_rejected() {
        let bytes = CircuitProgram::compile(NUM_POLL_OPTIONS)
            .unwrap()
            .to_bytes()
            .unwrap();

        assert!(CircuitProgram::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(CircuitProgram::from_bytes(b"garbage").is_err());
    }
}
