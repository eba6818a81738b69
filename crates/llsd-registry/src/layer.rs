//! Single-entry extraction from an image layer
//!
//! Layers are tar archives, usually gzip-compressed. Only the named entry is
//! read; everything else in the archive is skipped while streaming.

use crate::error::RegistryError;
use crate::Result;
use flate2::read::GzDecoder;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest config file read out of a layer.
pub const MAX_LAYER_CONFIG_BYTES: u64 = 1024 * 1024;

/// Read the file at `path` out of a layer blob.
///
/// `digest` is only used for error reporting.
pub fn extract_entry(blob: &[u8], digest: &str, path: &str) -> Result<Vec<u8>> {
    extract_entry_bounded(blob, digest, path, MAX_LAYER_CONFIG_BYTES)
}

fn extract_entry_bounded(blob: &[u8], digest: &str, path: &str, max: u64) -> Result<Vec<u8>> {
    let wanted = normalize_path(path);
    if blob.starts_with(&GZIP_MAGIC) {
        find_in_archive(GzDecoder::new(blob), digest, &wanted, max)
    } else {
        find_in_archive(blob, digest, &wanted, max)
    }
}

fn find_in_archive<R: Read>(reader: R, digest: &str, wanted: &str, max: u64) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_string_lossy().into_owned();
        if normalize_path(&entry_path) != wanted {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let too_large = |size: u64| RegistryError::ContentTooLarge {
            what: format!("entry {:?}", wanted),
            digest: digest.to_string(),
            size,
            max,
        };
        if entry.size() > max {
            return Err(too_large(entry.size()));
        }
        let mut contents = Vec::new();
        entry.by_ref().take(max + 1).read_to_end(&mut contents)?;
        if contents.len() as u64 > max {
            return Err(too_large(contents.len() as u64));
        }
        return Ok(contents);
    }
    Err(RegistryError::LayerEntryNotFound {
        digest: digest.to_string(),
        path: wanted.to_string(),
    })
}

/// Strip leading `/` and `./` so label paths match archive member names.
fn normalize_path(path: &str) -> String {
    let mut p = path.trim();
    loop {
        if let Some(rest) = p.strip_prefix("./") {
            p = rest;
        } else if let Some(rest) = p.strip_prefix('/') {
            p = rest;
        } else {
            break;
        }
    }
    p.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn tar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_extracts_from_gzip_layer() {
        let layer = gzip(&tar_with(&[
            ("usr/bin/tool", b"binary"),
            ("app/config.yaml", b"version: 2\n"),
        ]));
        let out = extract_entry(&layer, "sha256:l1", "/app/config.yaml").unwrap();
        assert_eq!(out, b"version: 2\n");
    }

    #[test]
    fn test_extracts_from_plain_tar() {
        let layer = tar_with(&[("app/config.yaml", b"version: 1\n")]);
        let out = extract_entry(&layer, "sha256:l1", "./app/config.yaml").unwrap();
        assert_eq!(out, b"version: 1\n");
    }

    #[test]
    fn test_missing_entry_names_layer_and_path() {
        let layer = gzip(&tar_with(&[("other.txt", b"x")]));
        let err = extract_entry(&layer, "sha256:l1", "app/config.yaml").unwrap_err();
        match err {
            RegistryError::LayerEntryNotFound { digest, path } => {
                assert_eq!(digest, "sha256:l1");
                assert_eq!(path, "app/config.yaml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let big = vec![b'a'; 64];
        let layer = gzip(&tar_with(&[("app/config.yaml", &big)]));
        let err = extract_entry_bounded(&layer, "sha256:l1", "app/config.yaml", 32).unwrap_err();
        match err {
            RegistryError::ContentTooLarge { size, max, .. } => {
                assert_eq!(size, 64);
                assert_eq!(max, 32);
            }
            other => panic!("unexpected error: {other}"),
        }
        // exactly at the bound is fine
        let out = extract_entry_bounded(&layer, "sha256:l1", "app/config.yaml", 64).unwrap();
        assert_eq!(out.len(), 64);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/./app/c.yaml"), "app/c.yaml");
        assert_eq!(normalize_path("app/c.yaml"), "app/c.yaml");
    }
}
