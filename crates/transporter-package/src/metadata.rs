use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;

use transporter_crypto::md5_hex;
use transporter_types::{AppleId, BundleDescriptor, FileStats, MetadataArtifact, UploadResult};

/// Bundled `metadata.xml` template.
pub const METADATA_TEMPLATE: &str = include_str!("../assets/metadata_template.xml");

/// Fill `template` and produce the metadata document in all its wire forms.
///
/// Each placeholder is substituted at its first occurrence only, in a single
/// left-to-right pass, so values containing placeholder text are left alone.
pub fn assemble_metadata(
    template: &str,
    bundle: &BundleDescriptor,
    stats: &FileStats,
    file_checksum: &str,
    apple_id: &AppleId,
) -> UploadResult<MetadataArtifact> {
    let apple_id = apple_id.to_string();
    let file_size = stats.size.to_string();
    let text = substitute(
        template,
        &[
            ("APPLE_ID", &apple_id),
            ("BUNDLE_IDENTIFIER", &bundle.bundle_id),
            ("BUNDLE_VERSION", &bundle.bundle_version),
            ("BUNDLE_SHORT_VERSION", &bundle.bundle_short_version),
            ("FILE_SIZE", &file_size),
            ("FILE_NAME", &stats.file_name),
            ("MD5", file_checksum),
        ],
    );

    let buffer = Bytes::from(text.into_bytes());
    let checksum = md5_hex(&buffer);

    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&buffer)?;
    let compressed_base64 = BASE64.encode(gz.finish()?);

    Ok(MetadataArtifact {
        size: buffer.len() as u64,
        checksum,
        compressed_base64,
        buffer,
    })
}

fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut used = vec![false; values.len()];
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    'scan: while let Some(ch) = rest.chars().next() {
        for (i, (key, value)) in values.iter().enumerate() {
            if !used[i] && rest.starts_with(key) {
                out.push_str(&escape_xml(value));
                rest = &rest[key.len()..];
                used[i] = true;
                continue 'scan;
            }
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    out
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
