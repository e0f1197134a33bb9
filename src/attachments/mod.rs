//! Attachments: paging attachment records into PostgreSQL, then relocating
//! their content into a bucket.

mod download;
mod transfer;

pub use download::{download_attachments, flatten_groups};
pub use transfer::{object_name, sanitize_file_name, split_extension, sync_attachments, SyncSummary};
