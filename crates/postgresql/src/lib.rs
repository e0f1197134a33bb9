//! PostgreSQL/PostGIS side of feature-sync
//!
//! Connection service files, destination table preparation, attachment
//! staging and the reads used to publish tables back to a feature service.

pub mod attachment;
pub mod error;
pub mod lifecycle;
pub mod schema;
pub mod service;
pub mod store;
pub mod table;
pub mod value;

pub use attachment::ParentKey;
pub use error::StoreError;
pub use lifecycle::{prepare, prepare_attachment_table, PrepareOptions, PrepareOutcome};
pub use schema::{esri_field_type, esri_geometry_type, field_definitions, ColumnInfo, FieldDefinition};
pub use service::{PgServiceFile, SERVICE_FILE_ENV};
pub use store::{
    connect, AttachmentRecord, AttachmentRow, AttachmentStore, PgStore, RowSource, SourceRow,
    TableStore,
};
pub use table::{qualified_name, quote_ident, TableDescriptor};
