//! Column introspection results and their mapping to feature-service field
//! and geometry types.

pub const OID_FIELD_TYPE: &str = "esriFieldTypeOID";
pub const STRING_FIELD_TYPE: &str = "esriFieldTypeString";

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// `data_type`, e.g. `integer`, `character varying`, `USER-DEFINED`
    pub data_type: String,
    /// `udt_name`, e.g. `int4`, `geometry`
    pub udt_name: String,
}

impl ColumnInfo {
    pub fn new(name: &str, data_type: &str, udt_name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: udt_name.to_string(),
        }
    }
}

/// A feature-service field derived from a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: &'static str,
    pub alias: String,
}

/// Feature-service field type for a PostgreSQL `data_type`.
pub fn esri_field_type(data_type: &str) -> &'static str {
    match data_type.to_lowercase().as_str() {
        "integer" | "bigint" => "esriFieldTypeInteger",
        "smallint" => "esriFieldTypeSmallInteger",
        "text" | "varchar" | "character varying" | "character" => STRING_FIELD_TYPE,
        "date"
        | "timestamp"
        | "timestamp without time zone"
        | "timestamp with time zone"
        | "timestamptz" => "esriFieldTypeDate",
        "numeric" | "double precision" | "float" | "real" => "esriFieldTypeDouble",
        _ => STRING_FIELD_TYPE,
    }
}

/// Field definitions for every column except the geometry column and the
/// ignored ones; the primary key becomes the object-id field.
pub fn field_definitions(
    columns: &[ColumnInfo],
    primary_key: Option<&str>,
    geometry_column: &str,
    ignore: &[String],
) -> Vec<FieldDefinition> {
    columns
        .iter()
        .filter(|c| c.name != geometry_column && !ignore.contains(&c.name))
        .map(|c| FieldDefinition {
            name: c.name.clone(),
            field_type: if Some(c.name.as_str()) == primary_key {
                OID_FIELD_TYPE
            } else {
                esri_field_type(&c.data_type)
            },
            alias: c.name.clone(),
        })
        .collect()
}

/// Feature-service geometry type for a PostGIS `GeometryType()` result.
/// Unknown or missing types fall back to polygon.
pub fn esri_geometry_type(postgis_type: Option<&str>) -> &'static str {
    match postgis_type.map(str::to_uppercase).as_deref() {
        Some("POINT") => "esriGeometryPoint",
        Some("MULTIPOINT") => "esriGeometryMultipoint",
        Some("LINESTRING") | Some("MULTILINESTRING") => "esriGeometryPolyline",
        _ => "esriGeometryPolygon",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(esri_field_type("integer"), "esriFieldTypeInteger");
        assert_eq!(esri_field_type("bigint"), "esriFieldTypeInteger");
        assert_eq!(esri_field_type("smallint"), "esriFieldTypeSmallInteger");
        assert_eq!(esri_field_type("character varying"), "esriFieldTypeString");
        assert_eq!(esri_field_type("text"), "esriFieldTypeString");
        assert_eq!(esri_field_type("timestamp with time zone"), "esriFieldTypeDate");
        assert_eq!(esri_field_type("date"), "esriFieldTypeDate");
        assert_eq!(esri_field_type("numeric"), "esriFieldTypeDouble");
        assert_eq!(esri_field_type("double precision"), "esriFieldTypeDouble");
        assert_eq!(esri_field_type("real"), "esriFieldTypeDouble");
        assert_eq!(esri_field_type("boolean"), "esriFieldTypeString");
        assert_eq!(esri_field_type("USER-DEFINED"), "esriFieldTypeString");
    }

    #[test]
    fn test_field_definitions_skip_geometry_and_ignored() {
        let columns = vec![
            ColumnInfo::new("id", "integer", "int4"),
            ColumnInfo::new("name", "character varying", "varchar"),
            ColumnInfo::new("internal_note", "text", "text"),
            ColumnInfo::new("geom", "USER-DEFINED", "geometry"),
            ColumnInfo::new("area", "double precision", "float8"),
        ];
        let fields =
            field_definitions(&columns, Some("id"), "geom", &["internal_note".to_string()]);

        let summary: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.name.as_str(), f.field_type))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("id", "esriFieldTypeOID"),
                ("name", "esriFieldTypeString"),
                ("area", "esriFieldTypeDouble"),
            ]
        );
        assert_eq!(fields[1].alias, "name");
    }

    #[test]
    fn test_geometry_type_mapping() {
        assert_eq!(esri_geometry_type(Some("POINT")), "esriGeometryPoint");
        assert_eq!(esri_geometry_type(Some("MULTIPOINT")), "esriGeometryMultipoint");
        assert_eq!(esri_geometry_type(Some("LINESTRING")), "esriGeometryPolyline");
        assert_eq!(esri_geometry_type(Some("multilinestring")), "esriGeometryPolyline");
        assert_eq!(esri_geometry_type(Some("MULTIPOLYGON")), "esriGeometryPolygon");
        assert_eq!(esri_geometry_type(Some("GEOMETRYCOLLECTION")), "esriGeometryPolygon");
        assert_eq!(esri_geometry_type(None), "esriGeometryPolygon");
    }
}
