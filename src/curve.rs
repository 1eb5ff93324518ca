//! Baby Jubjub: the twisted Edwards curve embedded in the BN254 scalar
//! field.
//!
//! The curve is `168700·x² + y² = 1 + 168696·x²·y²` over `F`, with a
//! subgroup of prime order `r` behind a cofactor of 8. `GENERATOR` is
//! the order-`r` base point the circuits use (the canonical "Base8"
//! point, i.e. 8 times the full-group generator), so every point this
//! crate produces by scalar multiplication lives in the prime-order
//! subgroup by construction. Points arriving from outside must pass
//! [`assert_subgroup`] before they are used.
//!
//! Group arithmetic is `ark-ec`'s twisted Edwards implementation; this
//! module contributes the curve configuration, the subgroup boundary
//! checks, and the `(x, y)` coordinate-pair codecs used by the wire and
//! the persistent stores.

#![forbid(unsafe_code)]

use ark_ec::twisted_edwards::{Affine, MontCurveConfig, Projective, TECurveConfig};
use ark_ec::{AffineRepr, CurveConfig, CurveGroup};
use ark_ff::MontFp;
use std::ops::Mul;

use crate::error::{Error, Result};
use crate::field::{f_from_dec, f_to_dec};
use crate::{Scalar, F};

/// Curve parameters for Baby Jubjub in twisted Edwards form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BabyJubjubConfig;

/// Affine Baby Jubjub point; `(0, 1)` is the identity.
pub type Point = Affine<BabyJubjubConfig>;

/// Projective form used for intermediate group arithmetic.
pub type PointProjective = Projective<BabyJubjubConfig>;

const GENERATOR_X: F =
    MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553");
const GENERATOR_Y: F =
    MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203");

impl CurveConfig for BabyJubjubConfig {
    type BaseField = F;
    type ScalarField = Scalar;

    const COFACTOR: &'static [u64] = &[8];
    const COFACTOR_INV: Scalar =
        MontFp!("2394026564107420727433200628387514462817212225638746351800188703329891451411");
}

impl TECurveConfig for BabyJubjubConfig {
    const COEFF_A: F = MontFp!("168700");
    const COEFF_D: F = MontFp!("168696");
    const GENERATOR: Point = Point::new_unchecked(GENERATOR_X, GENERATOR_Y);

    type MontCurveConfig = BabyJubjubConfig;
}

impl MontCurveConfig for BabyJubjubConfig {
    const COEFF_A: F = MontFp!("168698");
    const COEFF_B: F = MontFp!("1");

    type TECurveConfig = BabyJubjubConfig;
}

/// The order-`r` base point `G`.
pub fn base_point() -> Point {
    BabyJubjubConfig::GENERATOR
}

/// Check that `point` is on the curve and inside the prime-order
/// subgroup. Everything that crosses the trust boundary (coordinator
/// keys, decrypted signature points, persisted bindings) goes through
/// here.
pub fn assert_subgroup(point: &Point) -> Result<()> {
    if !point.is_on_curve() {
        return Err(Error::Domain("point is not on the curve"));
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(Error::Domain("point is outside the prime-order subgroup"));
    }
    Ok(())
}

/// Scalar multiplication with the identity guarded: a zero result means
/// the scalar was `≡ 0 (mod r)`, which callers must treat as an error.
pub fn mul_point(point: &Point, scalar: &Scalar) -> Result<Point> {
    let out = point.mul(scalar).into_affine();
    if out.is_zero() {
        return Err(Error::Domain("scalar multiplication produced the identity"));
    }
    Ok(out)
}

/// Affine coordinates as a base-field pair.
pub fn coords(point: &Point) -> (F, F) {
    (point.x, point.y)
}

/// Rebuild a point from a coordinate pair, enforcing curve and subgroup
/// membership.
pub fn from_coords(x: F, y: F) -> Result<Point> {
    let point = Point::new_unchecked(x, y);
    assert_subgroup(&point)?;
    Ok(point)
}

/// Serde adapter storing a point as a decimal `(x, y)` string pair and
/// re-validating subgroup membership on the way back in.
pub mod point_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{coords, from_coords, Point};
    use crate::field::{f_from_dec, f_to_dec};

    pub fn serialize<S: Serializer>(point: &Point, serializer: S) -> Result<S::Ok, S::Error> {
        let (x, y) = coords(point);
        [f_to_dec(&x), f_to_dec(&y)].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point, D::Error> {
        let [x, y] = <[String; 2]>::deserialize(deserializer)?;
        let x = f_from_dec(&x).map_err(D::Error::custom)?;
        let y = f_from_dec(&y).map_err(D::Error::custom)?;
        from_coords(x, y).map_err(D::Error::custom)
    }

    /// `Option<Point>` variant for ballot records.
    pub mod opt {
        use super::*;

        pub fn serialize<S: Serializer>(
            point: &Option<Point>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            point
                .as_ref()
                .map(|p| {
                    let (x, y) = coords(p);
                    [f_to_dec(&x), f_to_dec(&y)]
                })
                .serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Point>, D::Error> {
            match <Option<[String; 2]>>::deserialize(deserializer)? {
                None => Ok(None),
                Some([x, y]) => {
                    let x = f_from_dec(&x).map_err(D::Error::custom)?;
                    let y = f_from_dec(&y).map_err(D::Error::custom)?;
                    from_coords(x, y).map(Some).map_err(D::Error::custom)
                }
            }
        }
    }
}

/// Decimal coordinate pair, used by the persisted-state layout.
pub fn point_to_dec(point: &Point) -> (String, String) {
    let (x, y) = coords(point);
    (f_to_dec(&x), f_to_dec(&y))
}

/// Parse a decimal coordinate pair back into a validated point.
pub fn point_from_dec(x: &str, y: &str) -> Result<Point> {
    from_coords(f_from_dec(x)?, f_from_dec(y)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::{One, PrimeField, Zero};

    #[test]
    fn generator_is_a_subgroup_point() {
        let g = base_point();
        assert!(g.is_on_curve());
        assert_subgroup(&g).unwrap();
        // Multiplying by the group order lands on the identity.
        assert!(g.mul_bigint(Scalar::MODULUS).into_affine().is_zero());
    }

    #[test]
    fn identity_has_the_canonical_coordinates() {
        let id = Point::zero();
        assert_eq!(coords(&id), (F::zero(), F::one()));
    }

    #[test]
    fn scalar_multiplication_is_additive_in_the_exponent() {
        let g = base_point();
        let a = Scalar::from(11u64);
        let b = Scalar::from(31u64);
        let left = mul_point(&g, &(a + b)).unwrap();
        let right = (mul_point(&g, &a).unwrap().into_group() + mul_point(&g, &b).unwrap())
            .into_affine();
        assert_eq!(left, right);
    }

    #[test]
    fn zero_scalar_is_a_domain_error() {
        assert!(matches!(
            mul_point(&base_point(), &Scalar::zero()),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn off_curve_coordinates_are_refused() {
        assert!(from_coords(F::from(1u64), F::from(1u64)).is_err());
    }

    #[test]
    fn low_order_points_are_refused() {
        // (0, -1) satisfies the curve equation but has order 2.
        let low = Point::new_unchecked(F::zero(), -F::one());
        assert!(low.is_on_curve());
        assert!(assert_subgroup(&low).is_err());
    }

    #[test]
    fn decimal_round_trip_preserves_the_point() {
        let p = mul_point(&base_point(), &Scalar::from(99u64)).unwrap();
        let (x, y) = point_to_dec(&p);
        assert_eq!(point_from_dec(&x, &y).unwrap(), p);
    }
}
