//! Witness computation for the vote circuit

use ark_ff::Zero;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisMode};
use crisp_common::{errors::VoteError, types::ScalarField};
use itertools::izip;

use super::circuit::{CircuitProgram, VoteIntegrityCircuit};

/// The full variable assignment of the vote circuit: the constant one,
/// followed by the vote and the partial products of the range check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    /// The number of instance variables at the front of the assignment
    num_instance_variables: usize,
    /// The assignment, instance variables first
    assignment: Vec<ScalarField>,
}

impl Witness {
    /// Computes the assignment of `program` for the input `{vote}`, and
    /// checks that it satisfies every constraint
    pub fn compute(program: &CircuitProgram, vote: u64) -> Result<Self, VoteError> {
        let cs = ConstraintSystem::<ScalarField>::new_ref();
        cs.set_mode(SynthesisMode::Prove {
            construct_matrices: false,
        });

        VoteIntegrityCircuit::with_vote(program.num_options(), vote)
            .generate_constraints(cs.clone())
            .map_err(|e| VoteError::ProofGeneration(format!("witness generation failed: {e}")))?;

        let assignment = {
            let cs = cs.borrow().ok_or_else(|| {
                VoteError::ProofGeneration("constraint system dropped".to_string())
            })?;
            [cs.instance_assignment.as_slice(), cs.witness_assignment.as_slice()].concat()
        };

        if assignment.len() != program.num_variables() {
            return Err(VoteError::ProofGeneration(format!(
                "witness has {} variables, circuit program expects {}",
                assignment.len(),
                program.num_variables()
            )));
        }

        let witness = Self {
            num_instance_variables: program.matrices().num_instance_variables,
            assignment,
        };
        if let Some(row) = witness.first_unsatisfied(program) {
            return Err(VoteError::ProofGeneration(format!(
                "vote {vote} does not satisfy constraint {row} of the vote circuit"
            )));
        }

        Ok(witness)
    }

    /// The full assignment, instance variables first
    pub fn assignment(&self) -> &[ScalarField] {
        &self.assignment
    }

    /// The public inputs, excluding the constant one
    pub fn public_inputs(&self) -> &[ScalarField] {
        &self.assignment[1..self.num_instance_variables]
    }

    /// Returns the index of the first constraint of `program` this witness
    /// violates, if any
    pub fn first_unsatisfied(&self, program: &CircuitProgram) -> Option<usize> {
        let m = program.matrices();
        let eval = |row: &[(ScalarField, usize)]| -> ScalarField {
            row.iter().fold(ScalarField::zero(), |acc, (coeff, col)| {
                acc + *coeff * self.assignment[*col]
            })
        };

        izip!(&m.a, &m.b, &m.c).position(|(a, b, c)| eval(a) * eval(b) != eval(c))
    }
}

#[cfg(test)]
mod tests {
    use crisp_common::{constants::NUM_POLL_OPTIONS, errors::VoteError, types::ScalarField};

    use super::Witness;
    use crate::prover::circuit::CircuitProgram;

    #[test]
    fn test_witness_for_valid_votes() {
        let program = CircuitProgram::compile(NUM_POLL_OPTIONS).unwrap();

        for vote in 0..NUM_POLL_OPTIONS as u64 {
            let witness = Witness::compute(&program, vote).unwrap();
            assert_eq!(
                witness.assignment(),
                &[ScalarField::from(1u64), ScalarField::from(vote)]
            );
            assert!(witness.public_inputs().is_empty());
        }
    }

    #[test]
    fn test_witness_rejects_out_of_range_vote() {
        let program = CircuitProgram::compile(NUM_POLL_OPTIONS).unwrap();

        let res = Witness::compute(&program, 2);
        assert!(matches!(res, Err(VoteError::ProofGeneration(_))));
    }

    #[test]
    fn test_witness_with_partial_products() {
        let program = CircuitProgram::compile(4).unwrap();

        let witness = Witness::compute(&program, 3).unwrap();
        assert_eq!(witness.assignment().len(), program.num_variables());
        assert!(Witness::compute(&program, 4).is_err());
    }
}
