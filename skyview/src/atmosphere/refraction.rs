//! Atmospheric refraction: geometric <-> apparent altitude in the alt-az frame.
//!
//! The atmosphere bends light so that objects appear higher than they are,
//! by about half a degree at the horizon and almost nothing at the zenith.
//! [`Refraction`] moves a position vector between its geometric
//! (extra-atmospheric) and apparent (refracted) location under a given
//! surface pressure and temperature.
//!
//! # Formulas
//!
//! Forward (geometric to apparent) uses Saemundsson (S&T 1986, via Meeus):
//! ```text
//! R = cS / tan(h + 10.3 / (h + 5.11)) + 0.0019279
//! ```
//! Backward (apparent to geometric) uses Bennett (via Meeus):
//! ```text
//! R = cB / tan(h + 7.31 / (h + 4.4)) + 0.0013515
//! ```
//! with `h` in degrees and the pressure/temperature corrections
//! ```text
//! cB = P/1010 * 283/(273 + T) / 60
//! cS = 1.02 * cB
//! ```
//! The two are independently fitted approximations. `backward(forward(v))`
//! is close to, but never exactly, `v`.
//!
//! # Horizon Handling
//!
//! Both formulas become meaningless well below the horizon. Above
//! [`MIN_GEO_ALTITUDE_DEG`] (resp. [`MIN_APP_ALTITUDE_DEG`]) the full
//! correction applies. In the [`TRANSITION_WIDTH_DEG`] band below that cutoff
//! the correction evaluated *at* the cutoff is ramped linearly down to zero, so
//! the mapping has no jump. Below the band nothing is applied.
//!
//! Only the vertical component of the working vector is rewritten. The
//! horizontal components, and so the azimuth, are left as they are.

use nalgebra::{Matrix4, Vector3};
use thiserror::Error;

use crate::transform::{
    deg_to_rad, lit, sin_altitude_to_deg, FrameTransform, ModelViewTransform, SkyFloat,
};

/// Geometric altitude (degrees) above which forward refraction is fully applied
pub const MIN_GEO_ALTITUDE_DEG: f64 = -3.0;

/// Apparent altitude (degrees) above which backward refraction is fully applied
pub const MIN_APP_ALTITUDE_DEG: f64 = -3.0;

/// Width (degrees) of the linear ramp below either cutoff
pub const TRANSITION_WIDTH_DEG: f64 = 2.0;

/// Default surface pressure in millibar
pub const DEFAULT_PRESSURE_MBAR: f64 = 1013.0;

/// Default surface temperature in degrees Celsius
pub const DEFAULT_TEMPERATURE_CELSIUS: f64 = 10.0;

const SAEMUNDSSON_OFFSET_DEG: f64 = 0.0019279;
const BENNETT_OFFSET_DEG: f64 = 0.0013515;

/// Bennett corrections above this (degrees) are compressed by half
const BENNETT_LOBE_LIMIT_DEG: f64 = 0.5;

/// Errors that can occur when configuring a refraction model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefractionError {
    #[error("{0} transform matrix is singular and cannot be inverted")]
    SingularTransform(&'static str),
}

/// Saemundsson refraction in degrees for a geometric altitude in degrees.
pub fn saemundsson_deg<T: SkyFloat>(correction: T, geometric_alt_deg: T) -> T {
    let h = geometric_alt_deg;
    let arg = (h + lit::<T>(10.3) / (h + lit::<T>(5.11))) * deg_to_rad::<T>();
    correction / arg.tan() + lit::<T>(SAEMUNDSSON_OFFSET_DEG)
}

/// Raw Bennett refraction in degrees for an apparent altitude in degrees.
///
/// No lobe reduction; see [`bennett_deg`].
pub fn bennett_raw_deg<T: SkyFloat>(correction: T, apparent_alt_deg: T) -> T {
    let h = apparent_alt_deg;
    let arg = (h + lit::<T>(7.31) / (h + lit::<T>(4.4))) * deg_to_rad::<T>();
    correction / arg.tan() + lit::<T>(BENNETT_OFFSET_DEG)
}

/// Bennett refraction with the near-horizon lobe reduced.
///
/// Values above 0.5 degrees become `0.5 * (r - 0.5) + 0.5`.
pub fn bennett_deg<T: SkyFloat>(correction: T, apparent_alt_deg: T) -> T {
    let r = bennett_raw_deg(correction, apparent_alt_deg);
    let limit = lit::<T>(BENNETT_LOBE_LIMIT_DEG);
    if r > limit {
        lit::<T>(0.5) * (r - limit) + limit
    } else {
        r
    }
}

/// Refraction model with pre/post frame transforms.
///
/// `forward` runs: pre-transform, refraction, post-transform.
/// `backward` runs: inverse post-transform, inverse refraction, inverse
/// pre-transform. The pre-transform must land in the alt-az frame (Z up).
#[derive(Debug, Clone, PartialEq)]
pub struct Refraction {
    pressure_mbar: f64,
    temperature_celsius: f64,
    correction_bennett: f64,
    correction_saemundson: f64,
    pre_transform: FrameTransform,
    post_transform: FrameTransform,
}

impl Refraction {
    /// Model at standard conditions (1013 mbar, 10 C) with identity transforms
    pub fn new() -> Self {
        Self::with_conditions(DEFAULT_PRESSURE_MBAR, DEFAULT_TEMPERATURE_CELSIUS)
    }

    /// Model at the given surface conditions with identity transforms
    pub fn with_conditions(pressure_mbar: f64, temperature_celsius: f64) -> Self {
        let mut refraction = Self {
            pressure_mbar,
            temperature_celsius,
            correction_bennett: 0.0,
            correction_saemundson: 0.0,
            pre_transform: FrameTransform::identity(),
            post_transform: FrameTransform::identity(),
        };
        refraction.update_precomputed();
        refraction
    }

    fn update_precomputed(&mut self) {
        self.correction_bennett =
            self.pressure_mbar / 1010.0 * 283.0 / (273.0 + self.temperature_celsius) / 60.0;
        self.correction_saemundson = 1.02 * self.correction_bennett;
    }

    /// Set the surface pressure in millibars and refresh the corrections
    pub fn set_pressure(&mut self, pressure_mbar: f64) {
        self.pressure_mbar = pressure_mbar;
        self.update_precomputed();
        log::debug!(
            "Refraction pressure set to {pressure_mbar} mbar (Bennett correction {:.6})",
            self.correction_bennett
        );
    }

    /// Set the air temperature in degrees Celsius and refresh the corrections
    pub fn set_temperature(&mut self, temperature_celsius: f64) {
        self.temperature_celsius = temperature_celsius;
        self.update_precomputed();
        log::debug!(
            "Refraction temperature set to {temperature_celsius} C (Bennett correction {:.6})",
            self.correction_bennett
        );
    }

    /// Surface pressure in millibars
    pub fn pressure(&self) -> f64 {
        self.pressure_mbar
    }

    /// Air temperature in degrees Celsius
    pub fn temperature(&self) -> f64 {
        self.temperature_celsius
    }

    /// Pressure/temperature factor used by the Bennett formula
    pub fn correction_bennett(&self) -> f64 {
        self.correction_bennett
    }

    /// Pressure/temperature factor used by the Saemundsson formula
    pub fn correction_saemundson(&self) -> f64 {
        self.correction_saemundson
    }

    /// Set the transform from the caller's input frame into the alt-az frame.
    ///
    /// # Errors
    /// [`RefractionError::SingularTransform`] if `matrix` has no inverse; the
    /// previous transform is kept.
    pub fn set_pre_transform(&mut self, matrix: Matrix4<f64>) -> Result<(), RefractionError> {
        let Some(transform) = FrameTransform::new(matrix) else {
            return Err(RefractionError::SingularTransform("pre"));
        };
        self.pre_transform = transform;
        Ok(())
    }

    /// Set the transform from the alt-az frame into the caller's output frame.
    ///
    /// # Errors
    /// [`RefractionError::SingularTransform`] if `matrix` has no inverse; the
    /// previous transform is kept.
    pub fn set_post_transform(&mut self, matrix: Matrix4<f64>) -> Result<(), RefractionError> {
        let Some(transform) = FrameTransform::new(matrix) else {
            return Err(RefractionError::SingularTransform("post"));
        };
        self.post_transform = transform;
        Ok(())
    }

    /// Input frame to alt-az
    pub fn pre_transform(&self) -> &FrameTransform {
        &self.pre_transform
    }

    /// Alt-az to output frame
    pub fn post_transform(&self) -> &FrameTransform {
        &self.post_transform
    }

    /// Geometric to apparent position, in place.
    pub fn forward<T: SkyFloat>(&self, position: &mut Vector3<T>) {
        self.pre_transform.apply(position);
        self.refract_forward(position);
        self.post_transform.apply(position);
    }

    /// Apparent to geometric position, in place. Not an exact inverse of
    /// [`forward`](Self::forward).
    pub fn backward<T: SkyFloat>(&self, position: &mut Vector3<T>) {
        self.post_transform.apply_inverse(position);
        self.refract_backward(position);
        self.pre_transform.apply_inverse(position);
    }

    /// Forward refraction of an alt-az vector, without frame transforms.
    pub fn refract_forward<T: SkyFloat>(&self, alt_az: &mut Vector3<T>) {
        let length = alt_az.norm();
        if length == T::zero() {
            return;
        }
        let geom_alt_deg = sin_altitude_to_deg(alt_az.z / length);
        let correction = lit::<T>(self.correction_saemundson);
        let min_alt = lit::<T>(MIN_GEO_ALTITUDE_DEG);
        let width = lit::<T>(TRANSITION_WIDTH_DEG);

        let apparent_alt_deg = if geom_alt_deg > min_alt {
            let alt = geom_alt_deg + saemundsson_deg(correction, geom_alt_deg);
            alt.min(lit::<T>(90.0))
        } else if geom_alt_deg > min_alt - width {
            let r_min = saemundsson_deg(correction, min_alt);
            geom_alt_deg + r_min * (geom_alt_deg - (min_alt - width)) / width
        } else {
            return;
        };

        alt_az.z = (apparent_alt_deg * deg_to_rad::<T>()).sin() * length;
    }

    /// Backward refraction of an alt-az vector, without frame transforms.
    pub fn refract_backward<T: SkyFloat>(&self, alt_az: &mut Vector3<T>) {
        let length = alt_az.norm();
        if length == T::zero() {
            return;
        }
        let app_alt_deg = sin_altitude_to_deg(alt_az.z / length);
        let correction = lit::<T>(self.correction_bennett);
        let min_alt = lit::<T>(MIN_APP_ALTITUDE_DEG);
        let width = lit::<T>(TRANSITION_WIDTH_DEG);

        let geom_alt_deg = if app_alt_deg > min_alt {
            app_alt_deg - bennett_deg(correction, app_alt_deg)
        } else if app_alt_deg > min_alt - width {
            let r_min = bennett_deg(correction, min_alt);
            app_alt_deg - r_min * (app_alt_deg - (min_alt - width)) / width
        } else {
            return;
        };

        alt_az.z = (geom_alt_deg * deg_to_rad::<T>()).sin() * length;
    }
}

impl Default for Refraction {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SkyFloat> ModelViewTransform<T> for Refraction {
    fn forward(&self, v: &mut Vector3<T>) {
        Refraction::forward(self, v);
    }

    fn backward(&self, v: &mut Vector3<T>) {
        Refraction::backward(self, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{altitude_deg, SkyFloat};
    use approx::assert_relative_eq;
    use float_cmp::approx_eq;
    use nalgebra::Rotation3;
    use rstest::rstest;

    fn alt_az<T: SkyFloat>(alt_deg: f64, az_deg: f64) -> Vector3<T> {
        let (alt, az) = (alt_deg.to_radians(), az_deg.to_radians());
        Vector3::new(
            lit::<T>(alt.cos() * az.cos()),
            lit::<T>(alt.cos() * az.sin()),
            lit::<T>(alt.sin()),
        )
    }

    /// Altitude (degrees) of the output of `refract_forward` for a geometric altitude
    fn forward_alt<T: SkyFloat>(refraction: &Refraction, alt_deg: f64) -> f64 {
        let mut v = alt_az::<T>(alt_deg, 0.0);
        refraction.refract_forward(&mut v);
        altitude_deg(&v).as_f64()
    }

    fn backward_alt<T: SkyFloat>(refraction: &Refraction, alt_deg: f64) -> f64 {
        let mut v = alt_az::<T>(alt_deg, 0.0);
        refraction.refract_backward(&mut v);
        altitude_deg(&v).as_f64()
    }

    /// Altitude encoded in the rewritten vertical component
    fn vertical_alt<T: SkyFloat>(v: &Vector3<T>, length: f64) -> f64 {
        (v.z.as_f64() / length).clamp(-1.0, 1.0).asin().to_degrees()
    }

    #[test]
    fn test_precomputed_corrections_at_standard_conditions() {
        let r = Refraction::new();
        assert_eq!(r.pressure(), 1013.0);
        assert_eq!(r.temperature(), 10.0);
        let expected = 1013.0 / 1010.0 / 60.0;
        assert!(approx_eq!(
            f64,
            r.correction_bennett(),
            expected,
            epsilon = 1e-12
        ));
        assert!(approx_eq!(
            f64,
            r.correction_saemundson(),
            1.02 * expected,
            epsilon = 1e-12
        ));
    }

    #[test]
    fn test_setters_recompute_corrections() {
        let mut r = Refraction::new();
        r.set_pressure(800.0);
        let expected = 800.0 / 1010.0 / 60.0;
        assert_relative_eq!(r.correction_bennett(), expected, epsilon = 1e-12);
        r.set_temperature(-10.0);
        let expected = 800.0 / 1010.0 * 283.0 / 263.0 / 60.0;
        let saemundson = r.correction_saemundson();
        assert_relative_eq!(r.correction_bennett(), expected, epsilon = 1e-12);
        assert_relative_eq!(saemundson, 1.02 * expected, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_transforms_rejected() {
        let mut r = Refraction::new();
        assert_eq!(
            r.set_pre_transform(Matrix4::zeros()),
            Err(RefractionError::SingularTransform("pre"))
        );
        assert_eq!(
            r.set_post_transform(Matrix4::zeros()),
            Err(RefractionError::SingularTransform("post"))
        );
        assert_eq!(r.pre_transform(), &FrameTransform::identity());
    }

    fn check_raises_objects<T: SkyFloat>() {
        let r = Refraction::new();
        for alt in [0.0, 5.0, 10.0, 30.0, 60.0] {
            let apparent = forward_alt::<T>(&r, alt);
            assert!(apparent > alt, "alt {alt} -> {apparent}");
        }
        // About half a degree at the horizon
        let horizon = forward_alt::<T>(&r, 0.0);
        assert!(horizon > 0.45 && horizon < 0.65, "horizon lift {horizon}");
    }

    #[test]
    fn test_forward_raises_objects_f64() {
        check_raises_objects::<f64>();
    }

    #[test]
    fn test_forward_raises_objects_f32() {
        check_raises_objects::<f32>();
    }

    #[test]
    fn test_forward_preserves_horizontal_components() {
        let r = Refraction::new();
        let mut v = alt_az::<f64>(12.0, 37.0);
        let before = v;
        r.refract_forward(&mut v);
        assert_eq!(v.x, before.x);
        assert_eq!(v.y, before.y);
        assert!(v.z > before.z);
    }

    fn check_zenith_clamped<T: SkyFloat>() {
        let r = Refraction::new();
        let mut v = Vector3::new(T::zero(), T::zero(), T::one());
        r.refract_forward(&mut v);
        assert!(v.z <= T::one());
        assert_relative_eq!(v.z.as_f64(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zenith_clamped_f64() {
        check_zenith_clamped::<f64>();
    }

    #[test]
    fn test_zenith_clamped_f32() {
        check_zenith_clamped::<f32>();
    }

    #[test]
    fn test_zero_vector_untouched() {
        let r = Refraction::new();
        let mut v = Vector3::<f64>::zeros();
        r.refract_forward(&mut v);
        r.refract_backward(&mut v);
        assert_eq!(v, Vector3::zeros());
    }

    #[rstest]
    #[case(-5.2)]
    #[case(-7.5)]
    #[case(-30.0)]
    #[case(-90.0)]
    fn test_no_correction_below_transition(#[case] alt: f64) {
        let r = Refraction::new();
        let mut v = alt_az::<f64>(alt, 20.0);
        let before = v;
        r.refract_forward(&mut v);
        assert_eq!(v, before);
        r.refract_backward(&mut v);
        assert_eq!(v, before);
    }

    fn check_transition_continuity<T: SkyFloat>(tolerance: f64) {
        let r = Refraction::new();
        let cutoff = MIN_GEO_ALTITUDE_DEG;
        let bottom = MIN_GEO_ALTITUDE_DEG - TRANSITION_WIDTH_DEG;
        let jump = saemundsson_deg(r.correction_saemundson(), cutoff);

        for boundary in [cutoff, bottom] {
            let samples: Vec<f64> = [-0.001, 0.0, 0.001]
                .iter()
                .map(|d| {
                    let mut v = alt_az::<T>(boundary + d, 0.0);
                    r.refract_forward(&mut v);
                    vertical_alt(&v, 1.0)
                })
                .collect();
            for pair in samples.windows(2) {
                let delta = (pair[1] - pair[0]).abs();
                assert!(delta < tolerance, "jump {delta} at {boundary}");
                assert!(delta < jump / 10.0);
            }
        }
    }

    #[test]
    fn test_transition_continuity_f64() {
        check_transition_continuity::<f64>(0.01);
    }

    #[test]
    fn test_transition_continuity_f32() {
        check_transition_continuity::<f32>(0.01);
    }

    #[test]
    fn test_transition_ramp_is_linear() {
        let r = Refraction::new();
        let r_min = saemundsson_deg(r.correction_saemundson(), MIN_GEO_ALTITUDE_DEG);

        // Halfway down the band, half the correction at the cutoff
        let mut v = alt_az::<f64>(-4.0, 0.0);
        r.refract_forward(&mut v);
        assert_relative_eq!(vertical_alt(&v, 1.0), -4.0 + r_min / 2.0, epsilon = 1e-9);
    }

    fn check_bennett_lobe_clamp<T: SkyFloat>(tolerance: f64) {
        let r = Refraction::new();
        let raw = bennett_raw_deg(r.correction_bennett(), 0.0);
        assert!(raw > 0.5, "raw Bennett correction at horizon {raw}");
        let clamped = 0.5 * (raw - 0.5) + 0.5;

        let mut v = alt_az::<T>(0.0, 90.0);
        r.refract_backward(&mut v);
        let geometric = vertical_alt(&v, 1.0);
        assert_relative_eq!(geometric, -clamped, epsilon = tolerance);
        assert!((geometric + raw).abs() > 0.01);
    }

    #[test]
    fn test_bennett_lobe_clamp_f64() {
        check_bennett_lobe_clamp::<f64>(1e-9);
    }

    #[test]
    fn test_bennett_lobe_clamp_f32() {
        check_bennett_lobe_clamp::<f32>(1e-4);
    }

    #[test]
    fn test_bennett_below_lobe_unchanged() {
        let r = Refraction::new();
        let raw = bennett_raw_deg(r.correction_bennett(), 20.0);
        assert!(raw < 0.5);
        assert_eq!(bennett_deg(r.correction_bennett(), 20.0), raw);
    }

    #[test]
    fn test_backward_lowers_objects() {
        let r = Refraction::new();
        for alt in [1.0, 10.0, 45.0] {
            assert!(backward_alt::<f64>(&r, alt) < alt);
            assert!(backward_alt::<f32>(&r, alt) < alt);
        }
    }

    fn check_not_exact_inverse<T: SkyFloat>() {
        let r = Refraction::new();
        let mut v = alt_az::<T>(1.0, 0.0);
        r.refract_backward(&mut v);
        r.refract_forward(&mut v);
        let residual = altitude_deg(&v).as_f64() - 1.0;

        // Approximately, not exactly, invertible
        assert!(residual.abs() > 1e-5, "residual {residual}");
        assert!(residual.abs() < 0.02, "residual {residual}");
    }

    #[test]
    fn test_forward_backward_not_exact_inverse_f64() {
        check_not_exact_inverse::<f64>();
    }

    #[test]
    fn test_forward_backward_not_exact_inverse_f32() {
        check_not_exact_inverse::<f32>();
    }

    #[test]
    fn test_precisions_agree() {
        let r = Refraction::new();
        for alt in [-4.5, -2.0, 0.0, 3.0, 10.0, 45.0, 89.0] {
            let double = forward_alt::<f64>(&r, alt);
            let single = forward_alt::<f32>(&r, alt);
            assert_relative_eq!(double, single, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_pressure_scales_refraction() {
        let mut r = Refraction::new();
        let standard = forward_alt::<f64>(&r, 5.0) - 5.0;
        r.set_pressure(0.0);
        let vacuum = forward_alt::<f64>(&r, 5.0) - 5.0;
        // Only the additive offset remains without air
        assert!(vacuum < standard / 10.0);
        assert_relative_eq!(vacuum, SAEMUNDSSON_OFFSET_DEG, epsilon = 1e-4);
    }

    #[test]
    fn test_transforms_wrap_refraction() {
        let mut r = Refraction::new();
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.7).to_homogeneous();
        r.set_pre_transform(rotation).unwrap();
        let inverse = rotation.try_inverse().unwrap();
        r.set_post_transform(inverse).unwrap();

        // Input frame vector that lands at 10 degrees altitude after the pre-transform
        let target = alt_az::<f64>(10.0, 30.0);
        let mut input = target;
        r.pre_transform().apply_inverse(&mut input);

        let mut expected = target;
        r.refract_forward(&mut expected);
        r.post_transform().apply(&mut expected);

        let mut v = input;
        r.forward(&mut v);
        assert_relative_eq!(v, expected, epsilon = 1e-12);

        r.backward(&mut v);
        assert_relative_eq!(v, input, epsilon = 1e-4);
    }
}
