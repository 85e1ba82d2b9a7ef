//! Selectable sky objects and their select priority.
//!
//! Select priority is the scalar the resolver ranks candidates by: lower means
//! easier to pick. It starts from the observed magnitude and is shifted by a
//! per-kind bias so that e.g. a faint labelled planet still wins a click over
//! a nearby bright star.

use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;

/// Closed set of object categories that carry distinct selection bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Star,
    Planet,
    Nebula,
    Other,
}

/// How a kind adjusts magnitude into select priority
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionBias {
    /// No adjustment, priority is the magnitude
    Unbiased,
    /// Added to the magnitude
    Offset(f64),
    /// Priority replaced by a constant
    Fixed(f64),
}

impl SelectionBias {
    /// Select priority of an object of `magnitude` under this bias
    pub fn apply(self, magnitude: f64) -> f64 {
        match self {
            SelectionBias::Unbiased => magnitude,
            SelectionBias::Offset(offset) => magnitude + offset,
            SelectionBias::Fixed(priority) => priority,
        }
    }
}

impl ObjectKind {
    /// Selection bias of this kind, depending on whether hint markers are drawn.
    ///
    /// | kind   | hints shown | hints hidden |
    /// |--------|-------------|--------------|
    /// | Star   | none        | none         |
    /// | Planet | -15         | -8           |
    /// | Nebula | fixed -1    | -9           |
    /// | Other  | none        | none         |
    pub fn selection_bias(self, hints_shown: bool) -> SelectionBias {
        match (self, hints_shown) {
            (ObjectKind::Planet, true) => SelectionBias::Offset(-15.0),
            (ObjectKind::Planet, false) => SelectionBias::Offset(-8.0),
            (ObjectKind::Nebula, true) => SelectionBias::Fixed(-1.0),
            (ObjectKind::Nebula, false) => SelectionBias::Offset(-9.0),
            (ObjectKind::Star | ObjectKind::Other, _) => SelectionBias::Unbiased,
        }
    }

    /// Select priority of an object of this kind
    pub fn select_priority(self, magnitude: f64, hints_shown: bool) -> f64 {
        self.selection_bias(hints_shown).apply(magnitude)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Star => "star",
            ObjectKind::Planet => "planet",
            ObjectKind::Nebula => "nebula",
            ObjectKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Anything a user can click on.
pub trait SkyObject: fmt::Debug + Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Category, used for logging and selection bias
    fn kind(&self) -> ObjectKind;

    /// Direction in the frame the active projector consumes
    fn position(&self) -> Vector3<f64>;

    /// Lower is easier to select
    fn select_priority(&self) -> f64;
}

/// Shared reference to a selectable object
pub type ObjectHandle = Arc<dyn SkyObject>;

/// Plain object record with a precomputed select priority.
///
/// The priority is fixed at construction. Rebuild the record when the
/// observed magnitude or the hint setting changes.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogObject {
    name: String,
    kind: ObjectKind,
    position: Vector3<f64>,
    magnitude: f64,
    select_priority: f64,
}

impl CatalogObject {
    /// Object whose priority follows its kind's bias table
    pub fn new(
        name: impl Into<String>,
        kind: ObjectKind,
        position: Vector3<f64>,
        magnitude: f64,
        hints_shown: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            position,
            magnitude,
            select_priority: kind.select_priority(magnitude, hints_shown),
        }
    }

    /// Object with an explicitly supplied priority
    pub fn with_priority(
        name: impl Into<String>,
        kind: ObjectKind,
        position: Vector3<f64>,
        magnitude: f64,
        select_priority: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            position,
            magnitude,
            select_priority,
        }
    }

    /// Observed magnitude the priority was derived from
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Wrap into a shareable [`ObjectHandle`]
    pub fn into_handle(self) -> ObjectHandle {
        Arc::new(self)
    }
}

impl SkyObject for CatalogObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn position(&self) -> Vector3<f64> {
        self.position
    }

    fn select_priority(&self) -> f64 {
        self.select_priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ObjectKind::Star, true, 3.0, 3.0)]
    #[case(ObjectKind::Star, false, 3.0, 3.0)]
    #[case(ObjectKind::Planet, true, 3.0, -12.0)]
    #[case(ObjectKind::Planet, false, 3.0, -5.0)]
    #[case(ObjectKind::Nebula, true, 11.0, -1.0)]
    #[case(ObjectKind::Nebula, false, 11.0, 2.0)]
    #[case(ObjectKind::Other, true, 7.5, 7.5)]
    fn test_select_priority_table(
        #[case] kind: ObjectKind,
        #[case] hints_shown: bool,
        #[case] magnitude: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(kind.select_priority(magnitude, hints_shown), expected);
    }

    #[test]
    fn test_catalog_object_priority() {
        let saturn = CatalogObject::new("Saturn", ObjectKind::Planet, Vector3::z(), 0.7, false);
        assert_eq!(saturn.select_priority(), 0.7 - 8.0);
        assert_eq!(saturn.magnitude(), 0.7);
        assert_eq!(saturn.kind().to_string(), "planet");

        let custom =
            CatalogObject::with_priority("marker", ObjectKind::Other, Vector3::x(), 9.0, -3.0);
        assert_eq!(custom.select_priority(), -3.0);
    }

    #[test]
    fn test_handle_shares_object() {
        let vega = CatalogObject::new("Vega", ObjectKind::Star, Vector3::z(), 0.03, true);
        let handle = vega.into_handle();
        let other = Arc::clone(&handle);
        assert!(Arc::ptr_eq(&handle, &other));
        assert_eq!(other.name(), "Vega");
    }
}
