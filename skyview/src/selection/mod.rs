//! Object selection: projecting sky directions to pixels and resolving a
//! click to the best nearby object.

pub mod object;
pub mod projector;
pub mod resolver;

pub use object::{CatalogObject, ObjectHandle, ObjectKind, SelectionBias, SkyObject};
pub use projector::{GnomonicProjector, Projector};
pub use resolver::{
    CandidateSource, ObjectList, ObjectResolver, SelectionSettings, DEFAULT_DISTANCE_WEIGHT,
    DEFAULT_SEARCH_RADIUS_PX,
};
