//! Atmosphere models applied between the geometric sky and what an observer sees.
//!
//! [`Extinction`] and [`Refraction`] are independent of each other and are
//! only combined by their caller, typically per object and per frame:
//! refraction first (position), then extinction on the refracted altitude
//! (magnitude). See [`SkyContext::observe`](crate::sky_context::SkyContext::observe).

pub mod extinction;
pub mod refraction;

pub use extinction::{
    AltitudeFrame, AltitudeSine, Extinction, UndergroundExtinctionMode,
    DEFAULT_EXTINCTION_COEFFICIENT, SUBHORIZONTAL_THRESHOLD,
};
pub use refraction::{
    Refraction, RefractionError, DEFAULT_PRESSURE_MBAR, DEFAULT_TEMPERATURE_CELSIUS,
    MIN_APP_ALTITUDE_DEG, MIN_GEO_ALTITUDE_DEG, TRANSITION_WIDTH_DEG,
};
