//! Atmospheric extinction: dimming of starlight along its path through air.
//!
//! Extinction is modelled as `k * X`, where `k` is the extinction coefficient
//! in magnitudes per airmass and `X` the airmass at the object's altitude.
//!
//! # Airmass Formulas
//!
//! Two empirical formulas are available, selected by the altitude frame of the
//! input:
//!
//! - **Apparent** (refracted) altitude: Rozenberg (1966), as reported by
//!   Schaefer.
//!   ```text
//!   X = 1 / (cosZ + 0.025 * exp(-11 * cosZ))
//!   ```
//!   Valid to a zenith angle of about 92.17 degrees, airmass ~40 at the horizon.
//!   Refraction already carries the pressure/temperature dependence, so this is
//!   the formula to pair with [`Refraction`](super::Refraction) output.
//!
//! - **Geometric** altitude: Young (1994) rational polynomial.
//!   ```text
//!   X = (1.002432 cosZ² + 0.148386 cosZ + 0.0096467)
//!     / (cosZ³ + 0.149864 cosZ² + 0.0102963 cosZ + 0.000303978)
//!   ```
//!   Valid to a zenith angle of about 93.6 degrees, airmass ~32 at the horizon.
//!   Assumes standard pressure and temperature.
//!
//! Below `cosZ = -0.035` (altitude of roughly -2 degrees) both formulas
//! diverge. What happens there is chosen by [`UndergroundExtinctionMode`].
//!
//! # Batch Operations
//!
//! [`Extinction::forward`] and [`Extinction::backward`] process index-aligned
//! slices of positions and magnitudes in place. They are called for every
//! visible star, every frame, and never allocate.

use clap::ValueEnum;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::transform::{lit, SkyFloat};

/// Default extinction coefficient in magnitudes per airmass
pub const DEFAULT_EXTINCTION_COEFFICIENT: f64 = 0.20;

/// `cosZ` below which the airmass formulas are not evaluated directly (about -2 degrees)
pub const SUBHORIZONTAL_THRESHOLD: f64 = -0.035;

/// Airmass reported below the threshold in [`UndergroundExtinctionMode::Max`]
pub const UNDERGROUND_MAX_AIRMASS: f64 = 42.0;

/// Which altitude an airmass input was derived from.
///
/// Forward extinction of a rendered object must use the apparent (refracted)
/// position. Passing a geometric altitude selects Young's formula instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeFrame {
    /// Refracted altitude, as seen by the observer
    Apparent,
    /// True, extra-atmospheric altitude
    Geometric,
}

/// Airmass policy for objects below the subhorizontal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UndergroundExtinctionMode {
    /// Airmass 0: no extinction at all below the threshold
    #[default]
    Zero,
    /// Constant airmass of [`UNDERGROUND_MAX_AIRMASS`]
    Max,
    /// Airmass of the altitude mirrored about the threshold
    Mirror,
}

/// Anything that carries the sine of an altitude (the cosine of a zenith angle).
///
/// Lets the batch operations accept alt-az unit vectors (vertical component)
/// and bare sin-altitude scalars through the same code path.
pub trait AltitudeSine<T> {
    fn sin_altitude(&self) -> T;
}

impl<T: SkyFloat> AltitudeSine<T> for Vector3<T> {
    #[inline]
    fn sin_altitude(&self) -> T {
        self.z
    }
}

impl AltitudeSine<f64> for f64 {
    #[inline]
    fn sin_altitude(&self) -> f64 {
        *self
    }
}

impl AltitudeSine<f32> for f32 {
    #[inline]
    fn sin_altitude(&self) -> f32 {
        *self
    }
}

/// Extinction model: converts between extra-atmospheric and observed magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct Extinction {
    /// Magnitudes per airmass. Not range-checked: values outside [0, 1] are
    /// accepted but physically implausible.
    coefficient: f64,
    underground_mode: UndergroundExtinctionMode,
}

impl Extinction {
    /// Model with the given coefficient and the default underground mode
    pub fn new(coefficient: f64) -> Self {
        Self {
            coefficient,
            underground_mode: UndergroundExtinctionMode::default(),
        }
    }

    /// Set the extinction coefficient (mag/airmass). Stored unconditionally.
    pub fn set_coefficient(&mut self, coefficient: f64) {
        self.coefficient = coefficient;
    }

    /// Extinction coefficient in magnitudes per airmass
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Choose the airmass policy below [`SUBHORIZONTAL_THRESHOLD`]
    pub fn set_underground_mode(&mut self, mode: UndergroundExtinctionMode) {
        self.underground_mode = mode;
    }

    /// Current airmass policy below the threshold
    pub fn underground_mode(&self) -> UndergroundExtinctionMode {
        self.underground_mode
    }

    /// Airmass for the given cosine of the zenith angle (sine of the altitude).
    ///
    /// `frame` states which altitude `cos_z` was derived from and selects the
    /// formula. Below [`SUBHORIZONTAL_THRESHOLD`] the result follows the
    /// configured [`UndergroundExtinctionMode`]; with the default mode it is 0.
    pub fn airmass<T: SkyFloat>(&self, cos_z: T, frame: AltitudeFrame) -> T {
        let threshold = lit::<T>(SUBHORIZONTAL_THRESHOLD);
        let mut cos_z = cos_z;
        if cos_z < threshold {
            match self.underground_mode {
                UndergroundExtinctionMode::Zero => return T::zero(),
                UndergroundExtinctionMode::Max => return lit::<T>(UNDERGROUND_MAX_AIRMASS),
                UndergroundExtinctionMode::Mirror => {
                    let mirrored = threshold - (cos_z - threshold);
                    cos_z = mirrored.min(T::one());
                }
            }
        }

        match frame {
            AltitudeFrame::Apparent => {
                T::one() / (cos_z + lit::<T>(0.025) * (lit::<T>(-11.0) * cos_z).exp())
            }
            AltitudeFrame::Geometric => {
                let nom_partial = lit::<T>(1.002432) * cos_z + lit::<T>(0.148386);
                let nom = nom_partial * cos_z + lit::<T>(0.0096467);
                let denom_partial = (cos_z + lit::<T>(0.149864)) * cos_z + lit::<T>(0.0102963);
                let denom = denom_partial * cos_z + lit::<T>(0.000303978);
                nom / denom
            }
        }
    }

    /// Dim extra-atmospheric magnitudes to observed magnitudes, in place.
    ///
    /// `positions` carry the *apparent* (refracted) altitude of each object:
    /// alt-az vectors (vertical component is used) or sin-altitude scalars.
    /// `magnitudes[i] += airmass(positions[i]) * k`. Slices are index-aligned;
    /// when their lengths differ only the common prefix is processed.
    pub fn forward<T, P>(&self, positions: &[P], magnitudes: &mut [T])
    where
        T: SkyFloat,
        P: AltitudeSine<T>,
    {
        let k = lit::<T>(self.coefficient);
        for (pos, mag) in positions.iter().zip(magnitudes.iter_mut()) {
            *mag += self.airmass(pos.sin_altitude(), AltitudeFrame::Apparent) * k;
        }
    }

    /// Brighten observed magnitudes back to atmosphere-free magnitudes, in place.
    ///
    /// Same contract as [`forward`](Self::forward) with the sign flipped. The
    /// result is still expressed at the apparent altitude. This is not an
    /// absolute inverse of a forward pass that was fed refracted positions:
    /// only calling both with the same position inputs cancels exactly.
    pub fn backward<T, P>(&self, positions: &[P], magnitudes: &mut [T])
    where
        T: SkyFloat,
        P: AltitudeSine<T>,
    {
        let k = lit::<T>(self.coefficient);
        for (pos, mag) in positions.iter().zip(magnitudes.iter_mut()) {
            *mag -= self.airmass(pos.sin_altitude(), AltitudeFrame::Apparent) * k;
        }
    }
}

impl Default for Extinction {
    fn default() -> Self {
        Self::new(DEFAULT_EXTINCTION_COEFFICIENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn sin_deg(alt_deg: f64) -> f64 {
        alt_deg.to_radians().sin()
    }

    #[test]
    fn test_default_coefficient() {
        let ext = Extinction::default();
        assert_eq!(ext.coefficient(), 0.20);
        assert_eq!(ext.underground_mode(), UndergroundExtinctionMode::Zero);
    }

    #[test]
    fn test_coefficient_stored_unvalidated() {
        let mut ext = Extinction::default();
        ext.set_coefficient(1.7);
        assert_eq!(ext.coefficient(), 1.7);
        ext.set_coefficient(-0.1);
        assert_eq!(ext.coefficient(), -0.1);
    }

    #[test]
    fn test_zenith_airmass_is_one() {
        let ext = Extinction::default();
        let rozenberg = ext.airmass(1.0f64, AltitudeFrame::Apparent);
        let rozenberg_f32 = ext.airmass(1.0f32, AltitudeFrame::Apparent);
        let young = ext.airmass(1.0f64, AltitudeFrame::Geometric);
        assert_relative_eq!(rozenberg, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rozenberg_f32, 1.0, epsilon = 1e-6);
        assert_relative_eq!(young, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_horizon_airmass_magnitudes() {
        let ext = Extinction::default();
        let rozenberg = ext.airmass(0.0f64, AltitudeFrame::Apparent);
        let young = ext.airmass(0.0f64, AltitudeFrame::Geometric);
        assert_relative_eq!(rozenberg, 40.0, epsilon = 0.1);
        assert!(young > 30.0 && young < 34.0, "horizon airmass {young}");
    }

    fn check_apparent_airmass_monotonic<T: SkyFloat>() {
        let ext = Extinction::default();
        let span = 1.0 - SUBHORIZONTAL_THRESHOLD;
        let steps = 2000;
        let mut previous = f64::INFINITY;
        for i in 0..=steps {
            let cos_z = SUBHORIZONTAL_THRESHOLD + span * i as f64 / steps as f64;
            let airmass: T = ext.airmass(lit::<T>(cos_z), AltitudeFrame::Apparent);
            let x = airmass.as_f64();
            assert!(x <= previous, "airmass rose at cosZ={cos_z}");
            previous = x;
        }
    }

    #[test]
    fn test_apparent_airmass_monotonic_f64() {
        check_apparent_airmass_monotonic::<f64>();
    }

    #[test]
    fn test_apparent_airmass_monotonic_f32() {
        check_apparent_airmass_monotonic::<f32>();
    }

    #[rstest]
    #[case(-0.0351)]
    #[case(-0.2)]
    #[case(-0.9)]
    #[case(-1.0)]
    fn test_subhorizontal_clamp(#[case] cos_z: f64) {
        let ext = Extinction::default();
        assert_eq!(ext.airmass(cos_z, AltitudeFrame::Apparent), 0.0);
        assert_eq!(ext.airmass(cos_z, AltitudeFrame::Geometric), 0.0);
        assert_eq!(ext.airmass(cos_z as f32, AltitudeFrame::Apparent), 0.0);
    }

    #[test]
    fn test_underground_max_mode() {
        let mut ext = Extinction::default();
        ext.set_underground_mode(UndergroundExtinctionMode::Max);
        assert_eq!(ext.airmass(-0.5f64, AltitudeFrame::Apparent), 42.0);
        // Above the threshold the formula still applies
        assert!(ext.airmass(0.5f64, AltitudeFrame::Apparent) < 3.0);
    }

    #[test]
    fn test_underground_mirror_mode() {
        let mut ext = Extinction::default();
        ext.set_underground_mode(UndergroundExtinctionMode::Mirror);
        // -0.1 mirrors to 0.03 about the threshold
        let mirrored = ext.airmass(-0.1f64, AltitudeFrame::Apparent);
        let direct = ext.airmass(0.03f64, AltitudeFrame::Apparent);
        assert_relative_eq!(mirrored, direct, epsilon = 1e-12);

        // The nadir mirrors to 0.93
        assert_relative_eq!(
            ext.airmass(-1.0f64, AltitudeFrame::Apparent),
            ext.airmass(0.93f64, AltitudeFrame::Apparent),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_forward_adds_scaled_airmass() {
        let ext = Extinction::default();
        let sins = [sin_deg(90.0), sin_deg(30.0), sin_deg(-10.0)];
        let mut mags = [1.0f64, 2.0, 3.0];
        ext.forward(&sins, &mut mags);

        assert_relative_eq!(mags[0], 1.0 + 0.2, epsilon = 1e-6);
        assert_relative_eq!(
            mags[1],
            2.0 + 0.2 * ext.airmass(0.5f64, AltitudeFrame::Apparent),
            epsilon = 1e-12
        );
        // Below the threshold: untouched
        assert_eq!(mags[2], 3.0);
    }

    #[test]
    fn test_forward_uses_vertical_component() {
        let ext = Extinction::default();
        let alt = 20.0f64.to_radians();
        let positions = [Vector3::new(alt.cos(), 0.0, alt.sin())];
        let scalars = [alt.sin()];

        let mut from_vectors = [4.0f64];
        let mut from_scalars = [4.0f64];
        ext.forward(&positions, &mut from_vectors);
        ext.forward(&scalars, &mut from_scalars);
        assert_eq!(from_vectors, from_scalars);
    }

    #[test]
    fn test_forward_backward_cancel_on_same_input_f64() {
        let ext = Extinction::default();
        let sins = [0.5f64];
        let mut mags = [2.0f64];
        ext.forward(&sins, &mut mags);
        assert!(mags[0] > 2.0);
        ext.backward(&sins, &mut mags);
        assert_relative_eq!(mags[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_forward_backward_cancel_on_same_input_f32() {
        let ext = Extinction::default();
        let positions: Vec<Vector3<f32>> = (0..50)
            .map(|i| {
                let alt = (i as f32 * 1.8f32).to_radians();
                Vector3::new(alt.cos(), 0.0, alt.sin())
            })
            .collect();
        let original: Vec<f32> = (0..50).map(|i| i as f32 * 0.1).collect();
        let mut mags = original.clone();

        ext.forward(&positions, &mut mags);
        ext.backward(&positions, &mut mags);
        for (restored, orig) in mags.iter().zip(&original) {
            assert_relative_eq!(*restored, *orig, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_mismatched_lengths_process_common_prefix() {
        let ext = Extinction::default();
        let mut mags = [1.0f64, 2.0, 3.0];
        ext.forward(&[1.0f64, 1.0], &mut mags);
        assert_relative_eq!(mags[0], 1.2, epsilon = 1e-6);
        assert_relative_eq!(mags[1], 2.2, epsilon = 1e-6);
        assert_eq!(mags[2], 3.0);

        let mut short = [4.0f64];
        ext.backward(&[1.0f64, 0.5, 0.2], &mut short);
        assert_relative_eq!(short[0], 3.8, epsilon = 1e-6);
    }

    #[test]
    fn test_negative_coefficient_brightens() {
        let ext = Extinction::new(-0.2);
        let mut mags = [5.0f64];
        ext.forward(&[0.5f64], &mut mags);
        assert!(mags[0] < 5.0);
    }
}
