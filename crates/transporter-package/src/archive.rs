use std::io::{self, Cursor, Read, Seek};

use plist::Value;
use zip::ZipArchive;

use transporter_types::{BundleDescriptor, UploadError, UploadResult};

use crate::file::PackageFile;

/// Read the bundle identity out of `Payload/<App>.app/Info.plist`.
pub async fn extract_bundle_descriptor(package: &PackageFile) -> UploadResult<BundleDescriptor> {
    let reader = package.reader();
    tokio::task::spawn_blocking(move || {
        let data = read_file_from_zip(reader, is_app_info_plist)?
            .ok_or_else(|| UploadError::Archive("Info.plist not found".into()))?;
        parse_bundle_descriptor(&data)
    })
    .await
    .map_err(|e| UploadError::Io(io::Error::other(e)))?
}

/// Contents of the first entry whose name satisfies `matches`, or `None`.
pub fn read_file_from_zip<R, F>(reader: R, matches: F) -> UploadResult<Option<Vec<u8>>>
where
    R: Read + Seek,
    F: Fn(&str) -> bool,
{
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| UploadError::Archive(format!("Failed to open archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UploadError::Archive(format!("Failed to read archive entry {}: {}", i, e)))?;
        if !matches(entry.name()) {
            continue;
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        return Ok(Some(data));
    }

    Ok(None)
}

/// `Payload/<anything>.app/Info.plist`, exactly one directory deep.
pub fn is_app_info_plist(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("Payload/") else {
        return false;
    };
    match rest.split_once('/') {
        Some((app_dir, file)) => app_dir.ends_with(".app") && file == "Info.plist",
        None => false,
    }
}

/// Parse an XML or binary Info.plist into a descriptor.
pub fn parse_bundle_descriptor(data: &[u8]) -> UploadResult<BundleDescriptor> {
    let value = Value::from_reader(Cursor::new(data))
        .map_err(|_| UploadError::Archive("Failed to parse Info.plist".into()))?;

    let dict = value.as_dictionary();
    let field = |key: &str| {
        dict.and_then(|d| d.get(key))
            .and_then(Value::as_string)
            .map(str::to_string)
    };

    match (field("CFBundleIdentifier"), field("CFBundleVersion")) {
        (Some(bundle_id), Some(bundle_version)) => Ok(BundleDescriptor {
            bundle_id,
            bundle_version,
            bundle_short_version: field("CFBundleShortVersionString").unwrap_or_default(),
        }),
        _ => Err(UploadError::Archive(
            "Bundle info not found in Info.plist".into(),
        )),
    }
}
