//! Atmospheric effects and object selection for sky rendering
//!
//! This crate provides the atmosphere models applied between geometric sky
//! positions and what an observer sees (refraction and extinction), the
//! per-view sky state that gates them, and the click-to-object resolver
//! that ranks nearby candidates by on-screen distance and brightness.

pub mod atmosphere;
pub mod config;
pub mod selection;
pub mod sky_context;
pub mod transform;

pub use atmosphere::{Extinction, Refraction, RefractionError, UndergroundExtinctionMode};
pub use config::{ConfigError, SkyConfig};
pub use selection::{ObjectHandle, ObjectResolver, Projector, SelectionSettings};
pub use sky_context::{Observation, RefractionMode, SkyContext};
pub use transform::{FrameTransform, ModelViewTransform, SkyFloat};
