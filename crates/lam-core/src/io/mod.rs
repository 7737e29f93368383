pub mod staged;
pub mod vpk;

pub use staged::{StagedFile, is_staging_file, write_atomic};
