//! Per-view sky state: atmosphere models, gating, and limiting magnitude.
//!
//! A [`SkyContext`] owns one [`Extinction`] and one [`Refraction`] model and
//! decides when they apply. Rendering code asks it for apparent positions and
//! observed magnitudes; the object resolver asks it for the faintest
//! selectable magnitude.
//!
//! Configuration changes (pressure, temperature, coefficient) are expected
//! between frames only. There is no internal locking.

use nalgebra::{Matrix4, Vector3};

use crate::atmosphere::{Extinction, Refraction, RefractionError};
use crate::transform::{FrameTransform, MatrixTransform, ModelViewTransform};

/// Default naked-eye limiting magnitude
pub const DEFAULT_LIMIT_MAGNITUDE: f64 = 6.5;

/// When to apply atmospheric effects to a coordinate conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefractionMode {
    /// Apply only if the context currently has an atmosphere
    #[default]
    Auto,
    /// Always apply (apparent coordinates)
    On,
    /// Never apply (geometric coordinates)
    Off,
}

/// Position and magnitude of an object as the observer sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Apparent alt-az direction (unit length before refraction)
    pub position: Vector3<f64>,
    /// Magnitude after extinction
    pub magnitude: f64,
}

/// Atmosphere models and selection limits of one view.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyContext {
    extinction: Extinction,
    refraction: Refraction,
    has_atmosphere: bool,
    limit_magnitude: f64,
    custom_limit_magnitude: Option<f64>,
}

impl SkyContext {
    /// Context with an atmosphere and the default limiting magnitude
    pub fn new(extinction: Extinction, refraction: Refraction) -> Self {
        Self {
            extinction,
            refraction,
            has_atmosphere: true,
            limit_magnitude: DEFAULT_LIMIT_MAGNITUDE,
            custom_limit_magnitude: None,
        }
    }

    pub fn extinction(&self) -> &Extinction {
        &self.extinction
    }

    pub fn refraction(&self) -> &Refraction {
        &self.refraction
    }

    /// Update the extinction coefficient (mag/airmass)
    pub fn set_extinction_coefficient(&mut self, coefficient: f64) {
        self.extinction.set_coefficient(coefficient);
        log::debug!("Extinction coefficient set to {coefficient} mag/airmass");
    }

    pub fn set_atmosphere_pressure(&mut self, pressure_mbar: f64) {
        self.refraction.set_pressure(pressure_mbar);
    }

    pub fn set_atmosphere_temperature(&mut self, temperature_celsius: f64) {
        self.refraction.set_temperature(temperature_celsius);
    }

    /// Whether atmospheric effects apply in [`RefractionMode::Auto`]
    pub fn has_atmosphere(&self) -> bool {
        self.has_atmosphere
    }

    pub fn set_has_atmosphere(&mut self, has_atmosphere: bool) {
        self.has_atmosphere = has_atmosphere;
        log::debug!("Atmosphere {}", if has_atmosphere { "on" } else { "off" });
    }

    /// Limiting magnitude computed by the renderer for the current view
    pub fn limit_magnitude(&self) -> f64 {
        self.limit_magnitude
    }

    pub fn set_limit_magnitude(&mut self, magnitude: f64) {
        self.limit_magnitude = magnitude;
    }

    pub fn custom_limit_magnitude(&self) -> Option<f64> {
        self.custom_limit_magnitude
    }

    /// Override (or with `None`, stop overriding) the computed limit
    pub fn set_custom_limit_magnitude(&mut self, magnitude: Option<f64>) {
        self.custom_limit_magnitude = magnitude;
    }

    /// Faintest select priority an object may have and still be pickable.
    ///
    /// The custom override wins over the computed limit when set.
    pub fn selection_limit_magnitude(&self) -> f64 {
        self.custom_limit_magnitude.unwrap_or(self.limit_magnitude)
    }

    /// Whether atmospheric effects apply under `mode`
    pub fn refraction_active(&self, mode: RefractionMode) -> bool {
        match mode {
            RefractionMode::On => true,
            RefractionMode::Off => false,
            RefractionMode::Auto => self.has_atmosphere,
        }
    }

    /// Geometric to apparent alt-az position, in place, if refraction is active
    pub fn geometric_to_apparent(&self, alt_az: &mut Vector3<f64>, mode: RefractionMode) {
        if self.refraction_active(mode) {
            self.refraction.refract_forward(alt_az);
        }
    }

    /// Apparent to geometric alt-az position, in place, if refraction is active
    pub fn apparent_to_geometric(&self, alt_az: &mut Vector3<f64>, mode: RefractionMode) {
        if self.refraction_active(mode) {
            self.refraction.refract_backward(alt_az);
        }
    }

    /// Where and how bright an object at a geometric alt-az direction appears.
    ///
    /// With atmosphere active: refraction moves the position, then extinction
    /// dims the magnitude at the refracted altitude. Otherwise both pass
    /// through (the direction is still normalized).
    pub fn observe(
        &self,
        geometric_alt_az: &Vector3<f64>,
        magnitude: f64,
        mode: RefractionMode,
    ) -> Observation {
        let mut position = geometric_alt_az
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros);
        let mut magnitudes = [magnitude];

        if self.refraction_active(mode) {
            self.refraction.refract_forward(&mut position);
            self.extinction
                .forward(std::slice::from_ref(&position), &mut magnitudes);
        }

        Observation {
            position,
            magnitude: magnitudes[0],
        }
    }

    /// Model-view step from an input frame to the view frame.
    ///
    /// `pre` maps input coordinates to alt-az, `post` maps alt-az to the view
    /// frame. With refraction active the result is a copy of this context's
    /// refraction model wrapped by those transforms; otherwise the plain
    /// product `post * pre`.
    ///
    /// # Errors
    /// [`RefractionError::SingularTransform`] if either matrix (or their
    /// product) cannot be inverted.
    pub fn model_view(
        &self,
        pre: Matrix4<f64>,
        post: Matrix4<f64>,
        mode: RefractionMode,
    ) -> Result<Box<dyn ModelViewTransform<f64>>, RefractionError> {
        if self.refraction_active(mode) {
            let mut refraction = self.refraction.clone();
            refraction.set_pre_transform(pre)?;
            refraction.set_post_transform(post)?;
            Ok(Box::new(refraction))
        } else {
            let transform = FrameTransform::new(post * pre)
                .ok_or(RefractionError::SingularTransform("model-view"))?;
            Ok(Box::new(MatrixTransform::new(transform)))
        }
    }
}

impl Default for SkyContext {
    fn default() -> Self {
        Self::new(Extinction::default(), Refraction::default())
    }
}
