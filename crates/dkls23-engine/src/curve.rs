//! Curve abstraction over the RustCrypto prime-order curves.
//!
//! Protocol code is generic over [`EcdsaCurve`]; encoding and the few
//! operations that need the concrete field repr live in the per-curve impls.

use elliptic_curve::{
    ff::{Field, PrimeField},
    group::Curve as _,
    ops::Reduce,
    point::AffineCoordinates,
    sec1::{FromEncodedPoint, ToEncodedPoint},
    CurveArithmetic, PrimeCurve,
};
use sha2::{Digest, Sha256};

/// Scalar field element of `C`.
pub type Scalar<C> = <C as CurveArithmetic>::Scalar;

/// Projective point of `C`.
pub type Point<C> = <C as CurveArithmetic>::ProjectivePoint;

/// Length of an encoded scalar.
pub const SCALAR_BYTES: usize = 32;

/// Length of a compressed SEC1 point.
pub const POINT_BYTES: usize = 33;

/// A prime-order curve usable for threshold ECDSA.
pub trait EcdsaCurve: PrimeCurve + CurveArithmetic + Send + Sync + 'static {
    /// Curve name, bound into transcripts and configs.
    const NAME: &'static str;

    /// Compressed SEC1 encoding.
    fn point_to_bytes(point: &Point<Self>) -> Vec<u8>;

    fn point_from_bytes(bytes: &[u8]) -> Option<Point<Self>>;

    /// Big-endian canonical encoding.
    fn scalar_to_bytes(scalar: &Scalar<Self>) -> [u8; SCALAR_BYTES];

    /// Decodes a canonical scalar, rejecting values `>= n`.
    fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar<Self>>;

    /// Reduces 32 big-endian bytes modulo the group order.
    fn reduce_bytes(bytes: &[u8; 32]) -> Scalar<Self>;

    /// Affine x-coordinate reduced modulo the group order.
    fn x_coordinate(point: &Point<Self>) -> Scalar<Self>;

    /// `(y is odd, x >= n)` of the affine point.
    fn recovery_bits(point: &Point<Self>) -> (bool, bool);

    /// Reduces 64 big-endian bytes modulo the group order with negligible bias.
    fn reduce_wide(bytes: &[u8; 64]) -> Scalar<Self> {
        let mut hi = [0u8; 32];
        let mut lo = [0u8; 32];
        hi.copy_from_slice(&bytes[..32]);
        lo.copy_from_slice(&bytes[32..]);
        // 2^256 mod n
        let shift = Self::reduce_bytes(&[0xff; 32]) + Scalar::<Self>::ONE;
        Self::reduce_bytes(&hi) * shift + Self::reduce_bytes(&lo)
    }

    /// SHA-256 digest of `message` as a scalar, as used by ECDSA.
    fn hash_message(message: &[u8]) -> Scalar<Self> {
        let digest: [u8; 32] = Sha256::digest(message).into();
        Self::reduce_bytes(&digest)
    }
}

macro_rules! impl_ecdsa_curve {
    ($curve:ty, $krate:ident, $name:literal) => {
        impl EcdsaCurve for $curve {
            const NAME: &'static str = $name;

            fn point_to_bytes(point: &Point<Self>) -> Vec<u8> {
                point.to_affine().to_encoded_point(true).as_bytes().to_vec()
            }

            fn point_from_bytes(bytes: &[u8]) -> Option<Point<Self>> {
                let encoded = $krate::EncodedPoint::from_bytes(bytes).ok()?;
                let affine: Option<$krate::AffinePoint> =
                    $krate::AffinePoint::from_encoded_point(&encoded).into();
                affine.map($krate::ProjectivePoint::from)
            }

            fn scalar_to_bytes(scalar: &Scalar<Self>) -> [u8; SCALAR_BYTES] {
                let mut out = [0u8; SCALAR_BYTES];
                out.copy_from_slice(&scalar.to_repr());
                out
            }

            fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar<Self>> {
                if bytes.len() != SCALAR_BYTES {
                    return None;
                }
                let repr = *$krate::FieldBytes::from_slice(bytes);
                <$krate::Scalar as PrimeField>::from_repr(repr).into()
            }

            fn reduce_bytes(bytes: &[u8; 32]) -> Scalar<Self> {
                <$krate::Scalar as Reduce<$krate::U256>>::reduce_bytes(
                    $krate::FieldBytes::from_slice(bytes),
                )
            }

            fn x_coordinate(point: &Point<Self>) -> Scalar<Self> {
                let x = point.to_affine().x();
                <$krate::Scalar as Reduce<$krate::U256>>::reduce_bytes(&x)
            }

            fn recovery_bits(point: &Point<Self>) -> (bool, bool) {
                let affine = point.to_affine();
                let x = affine.x();
                let y_is_odd: bool = affine.y_is_odd().into();
                let x_reduced = <$krate::Scalar as Reduce<$krate::U256>>::reduce_bytes(&x);
                (y_is_odd, x_reduced.to_repr() != x)
            }
        }
    };
}

impl_ecdsa_curve!(k256::Secp256k1, k256, "secp256k1");
impl_ecdsa_curve!(p256::NistP256, p256, "P-256");
