// This file is part of OpenSGD.
//
// OpenSGD is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// OpenSGD is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with OpenSGD.  If not, see <http://www.gnu.org/licenses/>.

use crate::{
    raster::{MAX_HEIGHT, MAX_WIDTH},
    DecodeError, SGD_OFFSET,
};
use anyhow::{bail, ensure, Context, Result};
use flate2::read::GzDecoder;
use log::trace;
use std::{
    fs,
    io::{ErrorKind, Read},
    path::Path,
};

/// Largest container we will decode, inflated.
pub const MAX_BASE: usize = (MAX_WIDTH * MAX_HEIGHT) as usize;

/// Read an SGD file into memory, inflating gzip framing when the magic
/// announces it.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let raw = fs::read(&path)
        .with_context(|| format!("couldn't open {}", path.as_ref().display()))?;
    let data = if is_gzip_framed(&raw) {
        trace!("{}: gzip framed", path.as_ref().display());
        inflate_container(&raw)?
    } else {
        ensure!(
            raw.len() <= MAX_BASE,
            DecodeError::Limit("SGD file too big".to_owned())
        );
        raw
    };
    ensure!(
        data.len() >= SGD_OFFSET,
        DecodeError::Format("SGD file too small".to_owned())
    );
    Ok(data)
}

fn is_gzip_framed(raw: &[u8]) -> bool {
    raw.len() >= 4
        && u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) & 0xe0ff_ffff == 0x0008_8b1f
}

fn inflate_container(raw: &[u8]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut decoder = GzDecoder::new(raw).take(MAX_BASE as u64 + 1);
    match decoder.read_to_end(&mut data) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => bail!(DecodeError::Partial),
        Err(err) => return Err(anyhow::Error::new(err).context("inflate failed")),
    }
    ensure!(
        data.len() <= MAX_BASE,
        DecodeError::Limit("SGD file too big".to_owned())
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn temp_file(name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("opensgd-{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path
    }

    fn gzip(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn plain_and_framed_loads_agree() -> Result<()> {
        let content = vec![0x5au8; SGD_OFFSET + 64];
        let plain = temp_file("plain", &content);
        let framed = temp_file("framed", &gzip(&content));
        assert_eq!(load(&plain)?, load(&framed)?);
        fs::remove_file(plain).ok();
        fs::remove_file(framed).ok();
        Ok(())
    }

    #[test]
    fn detects_gzip_magic_with_masked_flags() {
        assert!(is_gzip_framed(&[0x1f, 0x8b, 0x08, 0x00]));
        assert!(is_gzip_framed(&[0x1f, 0x8b, 0x08, 0x08]));
        assert!(!is_gzip_framed(&[0x1f, 0x8b, 0x09, 0x00]));
        assert!(!is_gzip_framed(&[0x90, 0x00, 0x0a, 0x00]));
        assert!(!is_gzip_framed(&[0x1f, 0x8b]));
    }

    #[test]
    fn rejects_oversized_plain_files() {
        let path = temp_file("huge", &vec![0u8; MAX_BASE + 1]);
        let err = load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::Limit(_))
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_undersized_files() {
        let path = temp_file("tiny", &[0u8; 16]);
        let err = load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::Format(_))
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_truncated_gzip_streams() {
        let full = gzip(&vec![0x33u8; SGD_OFFSET + 512]);
        let path = temp_file("truncated", &full[..full.len() / 2]);
        assert!(load(&path).is_err());
        fs::remove_file(path).ok();
    }
}
