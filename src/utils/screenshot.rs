use crate::errors::{BrowserError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn to_data_uri(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", to_base64(bytes))
}

/// Writes a PNG, creating parent directories as needed.
pub fn save_png(bytes: &[u8], path: &Path) -> Result<()> {
    if !is_png(bytes) {
        return Err(BrowserError::ChromeError("screenshot is not a PNG image".into()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_png() -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(b"IHDR");
        bytes
    }

    #[test]
    fn test_encoding() {
        assert_eq!(to_base64(b"hi"), "aGk=");
        assert!(to_data_uri(b"hi").starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_save_rejects_non_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots/a.png");
        assert!(save_png(b"not an image", &path).is_err());
        save_png(&fake_png(), &path).unwrap();
        assert!(path.is_file());
    }
}
