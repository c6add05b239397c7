//! Upload storage: path layout and sidecar metadata

mod layout;
mod metadata;

pub use layout::{generate_file_id, validate_file_name, validate_id, StorageLayout, META_SUFFIX};
pub use metadata::{remove_if_exists, write_atomic, MetadataStore};
