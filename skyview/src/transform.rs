//! Coordinate-frame transforms shared by the atmosphere models and projectors.
//!
//! Sky vectors move through a chain of frames before they reach the screen:
//! catalog frame, altitude-azimuth frame, view frame. Each step is a 4x4
//! homogeneous matrix applied as an affine map (the projective row is ignored).
//! Strategies that bend this chain non-linearly, like atmospheric refraction,
//! plug in through the [`ModelViewTransform`] trait.
//!
//! All transforms are written once over [`SkyFloat`] and run at both `f32`
//! and `f64`. Matrices are cached at both precisions so the single-precision
//! path never re-casts per call.

use nalgebra::{Matrix4, RealField, Vector3};

/// Floating-point precision usable for sky coordinate math.
///
/// Implemented for `f32` and `f64`. The trait selects the matching cached
/// matrix from a [`FrameTransform`] so hot loops stay cast-free.
pub trait SkyFloat: RealField + Copy {
    /// Forward matrix of `transform` at this precision
    fn forward_matrix(transform: &FrameTransform) -> &Matrix4<Self>;

    /// Inverse matrix of `transform` at this precision
    fn inverse_matrix(transform: &FrameTransform) -> &Matrix4<Self>;

    /// Widen to `f64` (for logging and reporting)
    fn as_f64(self) -> f64;
}

impl SkyFloat for f64 {
    fn forward_matrix(transform: &FrameTransform) -> &Matrix4<Self> {
        &transform.matrix
    }

    fn inverse_matrix(transform: &FrameTransform) -> &Matrix4<Self> {
        &transform.inverse
    }

    fn as_f64(self) -> f64 {
        self
    }
}

impl SkyFloat for f32 {
    fn forward_matrix(transform: &FrameTransform) -> &Matrix4<Self> {
        &transform.matrix_f32
    }

    fn inverse_matrix(transform: &FrameTransform) -> &Matrix4<Self> {
        &transform.inverse_f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

/// Convert an `f64` constant into the working precision.
#[inline]
pub(crate) fn lit<T: SkyFloat>(value: f64) -> T {
    nalgebra::convert(value)
}

/// Degrees per radian at the working precision
#[inline]
pub(crate) fn rad_to_deg<T: SkyFloat>() -> T {
    lit::<T>(180.0) / T::pi()
}

/// Radians per degree at the working precision
#[inline]
pub(crate) fn deg_to_rad<T: SkyFloat>() -> T {
    T::pi() / lit::<T>(180.0)
}

/// Altitude of a vector above the XY plane, in degrees.
///
/// Returns zero for the zero vector.
pub fn altitude_deg<T: SkyFloat>(v: &Vector3<T>) -> T {
    let length = v.norm();
    if length == T::zero() {
        return T::zero();
    }
    sin_altitude_to_deg(v.z / length)
}

/// `asin` in degrees, tolerant of rounding just past +/-1.
#[inline]
pub(crate) fn sin_altitude_to_deg<T: SkyFloat>(sin_alt: T) -> T {
    let sin_alt = if sin_alt > T::one() {
        T::one()
    } else if sin_alt < -T::one() {
        -T::one()
    } else {
        sin_alt
    };
    sin_alt.asin() * rad_to_deg::<T>()
}

/// Apply a 4x4 matrix to a 3-vector as an affine map: `v' = M * (v, 1)`.
#[inline]
pub fn apply_affine<T: SkyFloat>(matrix: &Matrix4<T>, v: &mut Vector3<T>) {
    let homogeneous = matrix * v.push(T::one());
    *v = homogeneous.xyz();
}

/// A 4x4 frame transform with its inverse, cached at `f64` and `f32`.
///
/// The four matrices are only ever computed together, so the inverse can
/// never drift out of sync with the forward matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTransform {
    matrix: Matrix4<f64>,
    inverse: Matrix4<f64>,
    matrix_f32: Matrix4<f32>,
    inverse_f32: Matrix4<f32>,
}

impl FrameTransform {
    /// The identity transform
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: Matrix4::identity(),
            matrix_f32: Matrix4::identity(),
            inverse_f32: Matrix4::identity(),
        }
    }

    /// Build a transform from a matrix, computing its inverse.
    ///
    /// Returns `None` when the matrix is singular.
    pub fn new(matrix: Matrix4<f64>) -> Option<Self> {
        let inverse = matrix.try_inverse()?;
        Some(Self {
            matrix,
            inverse,
            matrix_f32: matrix.cast::<f32>(),
            inverse_f32: inverse.cast::<f32>(),
        })
    }

    /// Apply the forward matrix in place
    pub fn apply<T: SkyFloat>(&self, v: &mut Vector3<T>) {
        apply_affine(T::forward_matrix(self), v);
    }

    /// Apply the inverse matrix in place
    pub fn apply_inverse<T: SkyFloat>(&self, v: &mut Vector3<T>) {
        apply_affine(T::inverse_matrix(self), v);
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// A pluggable model-view step between a catalog frame and the view frame.
///
/// `forward` maps input coordinates to the view frame, `backward` maps
/// view-frame coordinates back. Implementations mutate the vector in place.
/// `backward` is not required to be an exact inverse of `forward`.
pub trait ModelViewTransform<T: SkyFloat> {
    /// Map an input-frame vector into the view frame
    fn forward(&self, v: &mut Vector3<T>);

    /// Map a view-frame vector back to the input frame
    fn backward(&self, v: &mut Vector3<T>);
}

/// Plain linear model-view step: one matrix, no atmosphere.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixTransform {
    transform: FrameTransform,
}

impl MatrixTransform {
    /// Model-view step applying `transform`
    pub fn new(transform: FrameTransform) -> Self {
        Self { transform }
    }
}

impl<T: SkyFloat> ModelViewTransform<T> for MatrixTransform {
    fn forward(&self, v: &mut Vector3<T>) {
        self.transform.apply(v);
    }

    fn backward(&self, v: &mut Vector3<T>) {
        self.transform.apply_inverse(v);
    }
}

/// Rotation taking world vectors into a camera frame looking along `direction`.
///
/// The camera frame has +Z along `direction` and +Y as close to `up` as
/// possible. Returns `None` if `direction` is zero or parallel to `up`.
pub fn look_at(direction: &Vector3<f64>, up: &Vector3<f64>) -> Option<Matrix4<f64>> {
    let z = direction.try_normalize(1e-12)?;
    let x = up.cross(&z).try_normalize(1e-12)?;
    let y = z.cross(&x);

    #[rustfmt::skip]
    let matrix = Matrix4::new(
        x.x, x.y, x.z, 0.0,
        y.x, y.y, y.z, 0.0,
        z.x, z.y, z.z, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
    Some(matrix)
}
