//! Polynomials over the scalar field and Lagrange interpolation

use std::collections::BTreeSet;

use elliptic_curve::{ff::Field, group::Group};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::types::SharingId;
use crate::{Error, Result};

/// Secret polynomial, zeroized on drop.
pub struct Polynomial<C: EcdsaCurve> {
    coefficients: Vec<Scalar<C>>,
}

impl<C: EcdsaCurve> Polynomial<C> {
    /// Random polynomial with `size` coefficients and the given constant term.
    pub fn random(rng: &mut impl CryptoRngCore, constant: Scalar<C>, size: usize) -> Self {
        let mut coefficients = Vec::with_capacity(size);
        coefficients.push(constant);
        for _ in 1..size {
            coefficients.push(Scalar::<C>::random(&mut *rng));
        }
        Self { coefficients }
    }

    pub fn constant(&self) -> &Scalar<C> {
        &self.coefficients[0]
    }

    pub fn evaluate(&self, x: SharingId) -> Scalar<C> {
        let x = Scalar::<C>::from(u64::from(x));
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::<C>::ZERO, |acc, coefficient| acc * x + coefficient)
    }

    /// Feldman commitment vector `a_k * G`.
    pub fn commit(&self) -> Vec<Point<C>> {
        self.coefficients
            .iter()
            .map(|coefficient| Point::<C>::generator() * coefficient)
            .collect()
    }
}

impl<C: EcdsaCurve> Drop for Polynomial<C> {
    fn drop(&mut self) {
        self.coefficients.zeroize();
    }
}

/// Evaluate a Feldman commitment vector at `x`.
pub fn evaluate_commitment<C: EcdsaCurve>(commitments: &[Point<C>], x: SharingId) -> Point<C> {
    let x = Scalar::<C>::from(u64::from(x));
    commitments
        .iter()
        .rev()
        .fold(Point::<C>::identity(), |acc, commitment| acc * x + commitment)
}

/// Lagrange coefficient of `id` for interpolation at zero over `ids`.
pub fn lagrange_coefficient<C: EcdsaCurve>(id: SharingId, ids: &[SharingId]) -> Result<Scalar<C>> {
    if !ids.contains(&id) {
        return Err(Error::InvalidArgument(format!(
            "sharing id {id} is not in the interpolation set"
        )));
    }
    if ids.iter().collect::<BTreeSet<_>>().len() != ids.len() {
        return Err(Error::InvalidArgument("duplicate sharing ids".into()));
    }
    let i = Scalar::<C>::from(u64::from(id));
    let mut numerator = Scalar::<C>::ONE;
    let mut denominator = Scalar::<C>::ONE;

    for &other in ids {
        if other == id {
            continue;
        }
        let j = Scalar::<C>::from(u64::from(other));
        numerator *= j;
        denominator *= j - i;
    }

    let inverse: Option<Scalar<C>> = denominator.invert().into();
    inverse
        .map(|inverse| numerator * inverse)
        .ok_or_else(|| Error::InvalidArgument("sharing ids collide modulo the group order".into()))
}

/// Shamir reconstruction of the secret from `(id, share)` pairs.
pub fn interpolate_at_zero<C: EcdsaCurve>(shares: &[(SharingId, Scalar<C>)]) -> Result<Scalar<C>> {
    let ids: Vec<SharingId> = shares.iter().map(|(id, _)| *id).collect();
    shares.iter().try_fold(Scalar::<C>::ZERO, |acc, (id, share)| {
        Ok(acc + lagrange_coefficient::<C>(*id, &ids)? * share)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::Secp256k1;
    use rand::rngs::OsRng;

    #[test]
    fn test_reconstruct_from_any_subset() {
        let secret = k256::Scalar::random(&mut OsRng);
        let polynomial = Polynomial::<Secp256k1>::random(&mut OsRng, secret, 3);

        for subset in [[1, 2, 3], [2, 4, 5], [1, 3, 5]] {
            let shares: Vec<_> = subset.iter().map(|&id| (id, polynomial.evaluate(id))).collect();
            assert_eq!(interpolate_at_zero::<Secp256k1>(&shares).unwrap(), secret);
        }

        let too_few: Vec<_> = [1, 2].iter().map(|&id| (id, polynomial.evaluate(id))).collect();
        assert_ne!(interpolate_at_zero::<Secp256k1>(&too_few).unwrap(), secret);
    }

    #[test]
    fn test_commitment_matches_evaluation() {
        let polynomial =
            Polynomial::<Secp256k1>::random(&mut OsRng, k256::Scalar::random(&mut OsRng), 4);
        let commitments = polynomial.commit();
        for id in 1..=5 {
            assert_eq!(
                evaluate_commitment::<Secp256k1>(&commitments, id),
                k256::ProjectivePoint::GENERATOR * polynomial.evaluate(id)
            );
        }
    }

    #[test]
    fn test_lagrange_rejects_unknown_id() {
        assert!(lagrange_coefficient::<Secp256k1>(4, &[1, 2, 3]).is_err());
        assert!(lagrange_coefficient::<Secp256k1>(1, &[1, 2, 2]).is_err());
        assert!(lagrange_coefficient::<Secp256k1>(2, &[1, 2, 2]).is_err());
    }

    #[test]
    fn test_interpolation_rejects_duplicate_shares() {
        let polynomial =
            Polynomial::<Secp256k1>::random(&mut OsRng, k256::Scalar::random(&mut OsRng), 2);
        let shares = [
            (1, polynomial.evaluate(1)),
            (2, polynomial.evaluate(2)),
            (2, polynomial.evaluate(2)),
        ];
        let err = interpolate_at_zero::<Secp256k1>(&shares).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
