//! # Groth16 Proof Artifact
//!
//! The off-core proving pipeline (circom + snarkjs) emits proofs as JSON:
//!
//! ```text
//! {
//!   "pi_a": ["<x>", "<y>", "1"],
//!   "pi_b": [["<x.c0>", "<x.c1>"], ["<y.c0>", "<y.c1>"], ["1", "0"]],
//!   "pi_c": ["<x>", "<y>", "1"],
//!   "protocol": "groth16",
//!   "curve": "bn128"
//! }
//! ```
//!
//! Coordinates are canonical decimal strings of BN254 base-field elements in
//! projective form with `z = 1`. [`Proof`] keeps that shape verbatim, with
//! loosely typed vectors, so that *any* JSON of roughly the right form
//! deserializes and malformed content is reported by the verifier as a
//! plain rejection rather than as a transport error.
//!
//! Decoding to arkworks points happens in [`Proof::to_ark`], which checks
//! canonical encoding, curve membership, and subgroup membership.

use ark_bn254::{Bn254, Fq, Fq2, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signals::{field_to_decimal, parse_field};
use crate::config::{PROOF_PROTOCOL, SNARKJS_CURVE};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a proof could not be decoded into curve points.
///
/// Never surfaced past the verifier: every variant means "reject".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofDecodeError {
    #[error("unsupported proof protocol {0:?}")]
    Protocol(String),

    #[error("unsupported curve {0:?}")]
    Curve(String),

    #[error("{0}: wrong number of coordinates")]
    Shape(&'static str),

    #[error("{0}: coordinate is not a canonical base-field element")]
    Coordinate(&'static str),

    #[error("{0}: projective z must be 1")]
    NotNormalized(&'static str),

    #[error("{0}: point is not on the curve")]
    NotOnCurve(&'static str),

    #[error("{0}: point is not in the prime-order subgroup")]
    NotInSubgroup(&'static str),
}

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

/// A Groth16 proof in snarkjs JSON form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

impl Proof {
    /// Render an arkworks proof in snarkjs form.
    pub fn from_ark(proof: &ark_groth16::Proof<Bn254>) -> Self {
        Self {
            pi_a: g1_to_strings(&proof.a),
            pi_b: g2_to_strings(&proof.b),
            pi_c: g1_to_strings(&proof.c),
            protocol: Some(PROOF_PROTOCOL.to_string()),
            curve: Some(SNARKJS_CURVE.to_string()),
        }
    }

    /// Decode into an arkworks proof, validating every point.
    pub fn to_ark(&self) -> Result<ark_groth16::Proof<Bn254>, ProofDecodeError> {
        if let Some(protocol) = &self.protocol {
            if protocol != PROOF_PROTOCOL {
                return Err(ProofDecodeError::Protocol(protocol.clone()));
            }
        }
        if let Some(curve) = &self.curve {
            if curve != SNARKJS_CURVE {
                return Err(ProofDecodeError::Curve(curve.clone()));
            }
        }

        Ok(ark_groth16::Proof {
            a: g1_from_strings("pi_a", &self.pi_a)?,
            b: g2_from_strings("pi_b", &self.pi_b)?,
            c: g1_from_strings("pi_c", &self.pi_c)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Point codecs (shared with the snarkjs verification-key loader)
// ---------------------------------------------------------------------------

fn fq(label: &'static str, raw: &str) -> Result<Fq, ProofDecodeError> {
    parse_field::<Fq>(raw).ok_or(ProofDecodeError::Coordinate(label))
}

/// Decode a snarkjs `[x, y, "1"]` G1 point.
pub(crate) fn g1_from_strings(
    label: &'static str,
    raw: &[String],
) -> Result<G1Affine, ProofDecodeError> {
    let [x, y, z] = raw else {
        return Err(ProofDecodeError::Shape(label));
    };
    if z != "1" {
        return Err(ProofDecodeError::NotNormalized(label));
    }

    let point = G1Affine::new_unchecked(fq(label, x)?, fq(label, y)?);
    if !point.is_on_curve() {
        return Err(ProofDecodeError::NotOnCurve(label));
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProofDecodeError::NotInSubgroup(label));
    }
    Ok(point)
}

/// Decode a snarkjs `[[x.c0, x.c1], [y.c0, y.c1], ["1", "0"]]` G2 point.
pub(crate) fn g2_from_strings(
    label: &'static str,
    raw: &[Vec<String>],
) -> Result<G2Affine, ProofDecodeError> {
    let [x, y, z] = raw else {
        return Err(ProofDecodeError::Shape(label));
    };
    let ([x0, x1], [y0, y1], [z0, z1]) = (x.as_slice(), y.as_slice(), z.as_slice()) else {
        return Err(ProofDecodeError::Shape(label));
    };
    if z0 != "1" || z1 != "0" {
        return Err(ProofDecodeError::NotNormalized(label));
    }

    let x = Fq2::new(fq(label, x0)?, fq(label, x1)?);
    let y = Fq2::new(fq(label, y0)?, fq(label, y1)?);
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(ProofDecodeError::NotOnCurve(label));
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProofDecodeError::NotInSubgroup(label));
    }
    Ok(point)
}

pub(crate) fn g1_to_strings(point: &G1Affine) -> Vec<String> {
    match point.xy() {
        Some((x, y)) => vec![field_to_decimal(x), field_to_decimal(y), "1".into()],
        None => vec!["0".into(), "1".into(), "0".into()],
    }
}

pub(crate) fn g2_to_strings(point: &G2Affine) -> Vec<Vec<String>> {
    match point.xy() {
        Some((x, y)) => vec![
            vec![field_to_decimal(&x.c0), field_to_decimal(&x.c1)],
            vec![field_to_decimal(&y.c0), field_to_decimal(&y.c1)],
            vec!["1".into(), "0".into()],
        ],
        None => vec![
            vec!["0".into(), "0".into()],
            vec!["1".into(), "0".into()],
            vec!["0".into(), "0".into()],
        ],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::{G1Projective, G2Projective};
    use ark_ec::CurveGroup;
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use ark_std::UniformRand;

    fn random_proof() -> ark_groth16::Proof<Bn254> {
        let mut rng = StdRng::seed_from_u64(7);
        ark_groth16::Proof {
            a: G1Projective::rand(&mut rng).into_affine(),
            b: G2Projective::rand(&mut rng).into_affine(),
            c: G1Projective::rand(&mut rng).into_affine(),
        }
    }

    #[test]
    fn ark_round_trip() {
        let ark = random_proof();
        let proof = Proof::from_ark(&ark);
        assert_eq!(proof.pi_a.len(), 3);
        assert_eq!(proof.pi_b.len(), 3);
        assert_eq!(proof.pi_a[2], "1");
        assert_eq!(proof.to_ark().unwrap(), ark);
    }

    #[test]
    fn json_round_trip_keeps_snarkjs_tags() {
        let proof = Proof::from_ark(&random_proof());
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["protocol"], "groth16");
        assert_eq!(json["curve"], "bn128");
        let back: Proof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }

    #[test]
    fn missing_tags_are_accepted() {
        let mut proof = Proof::from_ark(&random_proof());
        proof.protocol = None;
        proof.curve = None;
        assert!(proof.to_ark().is_ok());
    }

    #[test]
    fn foreign_protocol_rejected() {
        let mut proof = Proof::from_ark(&random_proof());
        proof.protocol = Some("plonk".into());
        assert_eq!(
            proof.to_ark().unwrap_err(),
            ProofDecodeError::Protocol("plonk".into())
        );

        let mut proof = Proof::from_ark(&random_proof());
        proof.curve = Some("bls12381".into());
        assert!(matches!(proof.to_ark(), Err(ProofDecodeError::Curve(_))));
    }

    #[test]
    fn off_curve_point_rejected() {
        let mut proof = Proof::from_ark(&random_proof());
        proof.pi_a[1] = "5".into();
        assert_eq!(
            proof.to_ark().unwrap_err(),
            ProofDecodeError::NotOnCurve("pi_a")
        );
    }

    #[test]
    fn wrong_shape_rejected() {
        let mut proof = Proof::from_ark(&random_proof());
        proof.pi_c.pop();
        assert_eq!(proof.to_ark().unwrap_err(), ProofDecodeError::Shape("pi_c"));

        let mut proof = Proof::from_ark(&random_proof());
        proof.pi_b[0].push("0".into());
        assert_eq!(proof.to_ark().unwrap_err(), ProofDecodeError::Shape("pi_b"));
    }

    #[test]
    fn non_normalized_point_rejected() {
        let mut proof = Proof::from_ark(&random_proof());
        proof.pi_a[2] = "2".into();
        assert_eq!(
            proof.to_ark().unwrap_err(),
            ProofDecodeError::NotNormalized("pi_a")
        );
    }

    #[test]
    fn out_of_field_coordinate_rejected() {
        let mut proof = Proof::from_ark(&random_proof());
        // Base-field modulus itself is not a canonical element.
        proof.pi_c[0] =
            "21888242871839275222246405745257275088696311157297823662689037894645226208583".into();
        assert_eq!(
            proof.to_ark().unwrap_err(),
            ProofDecodeError::Coordinate("pi_c")
        );
    }
}
