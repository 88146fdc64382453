//! Supported elliptic curves and point encoding.
//!
//! # Purpose
//! Names the prime-order NIST curves anonymous-token keys may live on and
//! maps raw big-endian scalars to public points on them.
//!
//! # Key invariants
//! - A scalar is accepted only when it is in `[1, n-1]` for the curve order
//!   `n`; anything else yields `None` rather than a reduced value.
//! - Coordinates are big-endian and exactly [`CurveName::key_byte_size`]
//!   bytes long.
use crate::{KeyError, KeyResult};
use elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use elliptic_curve::{AffinePoint, CurveArithmetic, FieldBytes, FieldBytesSize, NonZeroScalar};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveName {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
}

impl CurveName {
    /// Bit length of the group order.
    pub fn order_bits(self) -> usize {
        match self {
            CurveName::P256 => 256,
            CurveName::P384 => 384,
        }
    }

    /// `ceil(order_bits / 8)`; the length of scalars and coordinates.
    pub fn key_byte_size(self) -> usize {
        self.order_bits().div_ceil(8)
    }

    /// JOSE curve identifier (`crv`).
    pub fn as_str(self) -> &'static str {
        match self {
            CurveName::P256 => "P-256",
            CurveName::P384 => "P-384",
        }
    }

    pub fn jwt_algorithm(self) -> jsonwebtoken::Algorithm {
        match self {
            CurveName::P256 => jsonwebtoken::Algorithm::ES256,
            CurveName::P384 => jsonwebtoken::Algorithm::ES384,
        }
    }

    /// Multiply the generator by a big-endian scalar.
    ///
    /// Returns `None` when the scalar has the wrong length, is zero, or is not
    /// below the group order.
    pub fn public_point(self, scalar: &[u8]) -> Option<EcPoint> {
        match self {
            CurveName::P256 => public_point_on::<p256::NistP256>(scalar),
            CurveName::P384 => public_point_on::<p384::NistP384>(scalar),
        }
    }
}

impl std::fmt::Display for CurveName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurveName {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Accept the JOSE names plus the common SEC/ANSI aliases seen in
        // certificate tooling output.
        match value.trim().to_ascii_lowercase().as_str() {
            "p-256" | "p256" | "nistp256" | "secp256r1" | "prime256v1" => Ok(CurveName::P256),
            "p-384" | "p384" | "nistp384" | "secp384r1" => Ok(CurveName::P384),
            other => Err(KeyError::UnsupportedKeyFormat(format!("curve {other}"))),
        }
    }
}

/// Affine public point with big-endian coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EcPoint {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl EcPoint {
    /// SEC1 uncompressed encoding (`0x04 || x || y`).
    pub fn to_sec1_uncompressed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.x.len() + self.y.len());
        out.push(0x04);
        out.extend_from_slice(&self.x);
        out.extend_from_slice(&self.y);
        out
    }
}

fn public_point_on<C>(scalar: &[u8]) -> Option<EcPoint>
where
    C: CurveArithmetic,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
{
    let mut repr = FieldBytes::<C>::default();
    if scalar.len() != repr.len() {
        return None;
    }
    repr.copy_from_slice(scalar);
    let secret: Option<NonZeroScalar<C>> = NonZeroScalar::<C>::from_repr(repr).into();
    let public = elliptic_curve::PublicKey::<C>::from_secret_scalar(&secret?);
    encoded_to_point::<C>(&public.to_encoded_point(false))
}

pub(crate) fn encoded_to_point<C>(
    encoded: &elliptic_curve::sec1::EncodedPoint<C>,
) -> Option<EcPoint>
where
    C: elliptic_curve::Curve,
    FieldBytesSize<C>: ModulusSize,
{
    Some(EcPoint {
        x: encoded.x()?.to_vec(),
        y: encoded.y()?.to_vec(),
    })
}

pub(crate) fn require_public_point(curve: CurveName, scalar: &[u8]) -> KeyResult<EcPoint> {
    curve.public_point(scalar).ok_or_else(|| {
        KeyError::InvalidKeyMaterial(format!("scalar out of range for {curve}"))
    })
}
