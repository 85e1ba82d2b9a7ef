//! Projection between sky directions and viewport pixels.
//!
//! The resolver only needs the [`Projector`] trait. [`GnomonicProjector`] is
//! a tangent-plane implementation with a pluggable model-view step, so the
//! same projector can run with or without atmospheric refraction in the
//! chain.

use std::fmt;

use nalgebra::{Vector2, Vector3};

use crate::transform::{look_at, FrameTransform, MatrixTransform, ModelViewTransform};

/// Maps sky directions to viewport pixels and back.
///
/// Pixel coordinates have their origin at the top-left corner with y down.
pub trait Projector {
    /// Field of view spanned by the smaller viewport dimension, in degrees
    fn fov_deg(&self) -> f64;

    /// Viewport `(width, height)` in pixels
    fn viewport_size(&self) -> (f64, f64);

    /// Pixel position of a direction, or `None` if it cannot be projected
    fn project(&self, direction: &Vector3<f64>) -> Option<Vector2<f64>>;

    /// Unit direction under a pixel, or `None` outside the projection domain
    fn unproject(&self, pixel: &Vector2<f64>) -> Option<Vector3<f64>>;

    /// Like [`project`](Self::project), but also `None` when the pixel lands
    /// outside the viewport
    fn project_in_viewport(&self, direction: &Vector3<f64>) -> Option<Vector2<f64>> {
        let pixel = self.project(direction)?;
        let (width, height) = self.viewport_size();
        let inside = (0.0..=width).contains(&pixel.x) && (0.0..=height).contains(&pixel.y);
        inside.then_some(pixel)
    }
}

/// Tangent-plane (TAN) projection.
///
/// The model-view step maps input directions into a camera frame looking
/// along +Z. The camera frame is then projected onto the plane `z = 1` and
/// scaled so that `fov_deg` spans the smaller viewport dimension.
pub struct GnomonicProjector {
    width: f64,
    height: f64,
    fov_deg: f64,
    focal_px: f64,
    model_view: Box<dyn ModelViewTransform<f64>>,
}

impl GnomonicProjector {
    /// Projector whose `fov_deg` spans the smaller of `width` and `height`
    pub fn new(
        width: f64,
        height: f64,
        fov_deg: f64,
        model_view: Box<dyn ModelViewTransform<f64>>,
    ) -> Self {
        let half_extent = width.min(height) / 2.0;
        let focal_px = half_extent / (fov_deg.to_radians() / 2.0).tan();
        Self {
            width,
            height,
            fov_deg,
            focal_px,
            model_view,
        }
    }

    /// Projector with a plain rotation looking along `direction`.
    ///
    /// `up` is the input-frame direction that should appear towards the top
    /// of the viewport. Returns `None` if the two are parallel.
    pub fn looking_at(
        direction: &Vector3<f64>,
        up: &Vector3<f64>,
        width: f64,
        height: f64,
        fov_deg: f64,
    ) -> Option<Self> {
        let view = FrameTransform::new(look_at(direction, up)?)?;
        Some(Self::new(
            width,
            height,
            fov_deg,
            Box::new(MatrixTransform::new(view)),
        ))
    }

    fn center(&self) -> Vector2<f64> {
        Vector2::new(self.width / 2.0, self.height / 2.0)
    }
}

impl fmt::Debug for GnomonicProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GnomonicProjector")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fov_deg", &self.fov_deg)
            .finish_non_exhaustive()
    }
}

impl Projector for GnomonicProjector {
    fn fov_deg(&self) -> f64 {
        self.fov_deg
    }

    fn viewport_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn project(&self, direction: &Vector3<f64>) -> Option<Vector2<f64>> {
        let mut view = *direction;
        self.model_view.forward(&mut view);
        // Behind (or on) the tangent plane
        if view.z.is_nan() || view.z <= 0.0 {
            return None;
        }
        let xi = view.x / view.z;
        let eta = view.y / view.z;
        Some(self.center() + Vector2::new(xi, -eta) * self.focal_px)
    }

    fn unproject(&self, pixel: &Vector2<f64>) -> Option<Vector3<f64>> {
        if !pixel.x.is_finite() || !pixel.y.is_finite() {
            return None;
        }
        if pixel.x < 0.0 || pixel.x > self.width || pixel.y < 0.0 || pixel.y > self.height {
            return None;
        }
        let offset = (pixel - self.center()) / self.focal_px;
        let mut direction = Vector3::new(offset.x, -offset.y, 1.0).normalize();
        self.model_view.backward(&mut direction);
        direction.try_normalize(0.0)
    }
}
