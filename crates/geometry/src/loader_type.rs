//! Geometry type requested from the spatial-format loader.

use crate::GeometryKind;
use std::fmt;

/// Geometry column type passed to the loader (`-nlt`).
///
/// Single-part lines and polygons are promoted so a table loaded across many
/// pages always ends up with one uniform multi-geometry column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderGeometryType {
    /// Attribute-only load
    None,
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    /// Let the loader promote whatever it finds to a multi type
    PromoteToMulti,
}

impl LoaderGeometryType {
    /// Map a declared GeoJSON kind (e.g. `"Polygon"`) to a loader type.
    pub fn from_declared(kind: &str) -> Self {
        match kind {
            "Polygon" => LoaderGeometryType::MultiPolygon,
            "LineString" => LoaderGeometryType::MultiLineString,
            other => Self::lookup(other),
        }
    }

    /// Map an optional page kind; pages without any geometry fall back to
    /// [`LoaderGeometryType::PromoteToMulti`].
    pub fn for_kind(kind: Option<GeometryKind>) -> Self {
        kind.map(|k| Self::from_declared(k.as_str()))
            .unwrap_or(LoaderGeometryType::PromoteToMulti)
    }

    fn lookup(kind: &str) -> Self {
        match kind {
            "Point" => LoaderGeometryType::Point,
            "MultiPoint" => LoaderGeometryType::MultiPoint,
            "LineString" => LoaderGeometryType::LineString,
            "MultiLineString" => LoaderGeometryType::MultiLineString,
            "Polygon" => LoaderGeometryType::Polygon,
            "MultiPolygon" => LoaderGeometryType::MultiPolygon,
            _ => LoaderGeometryType::PromoteToMulti,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderGeometryType::None => "NONE",
            LoaderGeometryType::Point => "POINT",
            LoaderGeometryType::MultiPoint => "MULTIPOINT",
            LoaderGeometryType::LineString => "LINESTRING",
            LoaderGeometryType::MultiLineString => "MULTILINESTRING",
            LoaderGeometryType::Polygon => "POLYGON",
            LoaderGeometryType::MultiPolygon => "MULTIPOLYGON",
            LoaderGeometryType::PromoteToMulti => "PROMOTE_TO_MULTI",
        }
    }
}

impl fmt::Display for LoaderGeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_kinds_are_promoted() {
        assert_eq!(
            LoaderGeometryType::from_declared("Polygon"),
            LoaderGeometryType::MultiPolygon
        );
        assert_eq!(
            LoaderGeometryType::from_declared("LineString"),
            LoaderGeometryType::MultiLineString
        );
    }

    #[test]
    fn test_other_kinds_pass_through() {
        assert_eq!(LoaderGeometryType::from_declared("Point").as_str(), "POINT");
        assert_eq!(
            LoaderGeometryType::from_declared("MultiPoint").as_str(),
            "MULTIPOINT"
        );
        assert_eq!(
            LoaderGeometryType::from_declared("MultiPolygon").as_str(),
            "MULTIPOLYGON"
        );
    }

    #[test]
    fn test_unknown_kind_defaults_to_promote() {
        assert_eq!(
            LoaderGeometryType::from_declared("GeometryCollection"),
            LoaderGeometryType::PromoteToMulti
        );
        assert_eq!(
            LoaderGeometryType::for_kind(None),
            LoaderGeometryType::PromoteToMulti
        );
    }
}
