//! Click-to-object resolution.
//!
//! [`ObjectResolver::clever_find`] turns a direction (or, via
//! [`ObjectResolver::clever_find_at_pixel`], a clicked pixel) into the single
//! best object nearby. Every registered [`CandidateSource`] is asked for
//! objects inside a small search circle; each survivor gets the cost
//!
//! ```text
//! cost = pixel_distance * distance_weight + select_priority
//! ```
//!
//! and the cheapest one wins. Candidates fainter than the sky's selection
//! limit are skipped, so invisible objects can never be picked.
//!
//! Ties keep the first candidate found, which makes the result depend on
//! source registration order.

use nalgebra::{Vector2, Vector3};

use super::object::ObjectHandle;
use super::projector::Projector;
use crate::sky_context::SkyContext;

/// Diameter of the on-screen search circle, in pixels
pub const DEFAULT_SEARCH_RADIUS_PX: f64 = 25.0;

/// Pixels of distance worth one magnitude of priority
pub const DEFAULT_DISTANCE_WEIGHT: f64 = 1.0;

/// Cost a candidate must beat to be selected at all
const NO_CANDIDATE_COST: f64 = 100_000.0;

/// A module that owns selectable objects and can search them spatially.
pub trait CandidateSource {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Objects within `limit_fov_deg` of `direction`.
    ///
    /// Sources may return extra objects outside the circle; the resolver
    /// ranks by on-screen distance anyway.
    fn search_around(&self, direction: &Vector3<f64>, limit_fov_deg: f64) -> Vec<ObjectHandle>;
}

/// Candidate source backed by a flat list, searched by brute force.
#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    name: String,
    objects: Vec<ObjectHandle>,
}

impl ObjectList {
    /// Named source over `objects`
    pub fn with_objects(name: impl Into<String>, objects: Vec<ObjectHandle>) -> Self {
        Self {
            name: name.into(),
            objects,
        }
    }
}

impl CandidateSource for ObjectList {
    fn name(&self) -> &str {
        &self.name
    }

    fn search_around(&self, direction: &Vector3<f64>, limit_fov_deg: f64) -> Vec<ObjectHandle> {
        let cos_limit = limit_fov_deg.to_radians().cos();
        let Some(target) = direction.try_normalize(0.0) else {
            return Vec::new();
        };

        self.objects
            .iter()
            .filter(|object| {
                object
                    .position()
                    .try_normalize(0.0)
                    .is_some_and(|position| position.dot(&target) >= cos_limit)
            })
            .cloned()
            .collect()
    }
}

/// Tunables of the selection cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionSettings {
    /// On-screen search circle diameter in pixels
    pub search_radius_px: f64,
    /// Weight of pixel distance against select priority
    pub distance_weight: f64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            search_radius_px: DEFAULT_SEARCH_RADIUS_PX,
            distance_weight: DEFAULT_DISTANCE_WEIGHT,
        }
    }
}

/// Aggregates candidate sources and picks the best object near a direction.
#[derive(Default)]
pub struct ObjectResolver {
    sources: Vec<Box<dyn CandidateSource>>,
    settings: SelectionSettings,
}

impl ObjectResolver {
    /// Resolver with no sources yet
    pub fn new(settings: SelectionSettings) -> Self {
        Self {
            sources: Vec::new(),
            settings,
        }
    }

    /// Add a source. Earlier sources win exact cost ties.
    pub fn register_source(&mut self, source: Box<dyn CandidateSource>) {
        log::debug!("Registered candidate source '{}'", source.name());
        self.sources.push(source);
    }

    /// Names of the registered sources, in registration order
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Current selection cost tunables
    pub fn settings(&self) -> &SelectionSettings {
        &self.settings
    }

    /// Angular size of the search circle for the current view, in degrees.
    ///
    /// `None` for a degenerate viewport.
    pub fn search_fov_deg<P: Projector + ?Sized>(&self, projector: &P) -> Option<f64> {
        let (width, height) = projector.viewport_size();
        let min_extent = width.min(height);
        if min_extent.is_nan() || min_extent <= 0.0 {
            return None;
        }
        let deg_per_px = projector.fov_deg() / min_extent;
        Some(deg_per_px * self.settings.search_radius_px)
    }

    /// Best selectable object near `direction`, if any.
    ///
    /// `direction` is in the frame `projector` consumes. Returns `None` when
    /// the direction cannot be projected, when every candidate is fainter
    /// than [`SkyContext::selection_limit_magnitude`], or when nothing is
    /// found at all.
    pub fn clever_find<P: Projector + ?Sized>(
        &self,
        sky: &SkyContext,
        projector: &P,
        direction: &Vector3<f64>,
    ) -> Option<ObjectHandle> {
        let fov_around = self.search_fov_deg(projector)?;
        let target_px = projector.project(direction)?;
        let limit = sky.selection_limit_magnitude();

        log::debug!(
            "Searching {:?} within {fov_around:.4} deg (limit mag {limit:.2})",
            self.source_names()
        );

        let candidates = self
            .sources
            .iter()
            .flat_map(|source| source.search_around(direction, fov_around))
            .filter(|candidate| candidate.select_priority() <= limit);

        let mut best: Option<ObjectHandle> = None;
        let mut best_cost = NO_CANDIDATE_COST;
        let mut considered = 0usize;

        for candidate in candidates {
            let Some(candidate_px) = projector.project(&candidate.position()) else {
                continue;
            };
            considered += 1;

            let distance_px = (candidate_px - target_px).norm();
            let cost = distance_px * self.settings.distance_weight + candidate.select_priority();
            log::trace!(
                "Candidate '{}': {distance_px:.2} px, cost {cost:.3}",
                candidate.name()
            );

            if cost < best_cost {
                best_cost = cost;
                best = Some(candidate);
            }
        }

        match &best {
            Some(winner) => log::debug!(
                "Selected '{}' ({}) from {considered} candidates, cost {best_cost:.3}",
                winner.name(),
                winner.kind()
            ),
            None => log::debug!("No selection among {considered} candidates"),
        }
        best
    }

    /// Best selectable object under a clicked pixel.
    ///
    /// The pixel is unprojected, re-projected, and unprojected again at the
    /// pixel shifted by the re-projection error. Near the horizon refraction
    /// makes `project(unproject(p))` miss `p`; the shift compensates.
    pub fn clever_find_at_pixel<P: Projector + ?Sized>(
        &self,
        sky: &SkyContext,
        projector: &P,
        pixel: &Vector2<f64>,
    ) -> Option<ObjectHandle> {
        let Some(direction) = projector.unproject(pixel) else {
            let (x, y) = (pixel.x, pixel.y);
            log::debug!("Click at ({x:.1}, {y:.1}) is off the projection");
            return None;
        };

        let direction = match projector.project(&direction) {
            Some(reprojected) => {
                let corrected = pixel + (pixel - reprojected);
                projector.unproject(&corrected).unwrap_or(direction)
            }
            None => direction,
        };

        self.clever_find(sky, projector, &direction)
    }
}
