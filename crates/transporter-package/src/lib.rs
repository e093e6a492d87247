/// Local side of an upload: the package file itself, the identity read out of
/// it, the generated metadata document, and fetching remote packages to disk.

pub mod archive;
pub mod download;
pub mod file;
pub mod metadata;

pub use archive::{extract_bundle_descriptor, parse_bundle_descriptor, read_file_from_zip};
pub use download::{TempPackage, download_temp_file, ensure_temp_dir, is_remote_source};
pub use file::{PackageFile, PositionalReader};
pub use metadata::{METADATA_TEMPLATE, assemble_metadata};
