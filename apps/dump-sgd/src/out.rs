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

//! PNG writer adapter: palette-indexed output at 4-bit depth, two pixels
//! per byte.

use anyhow::{Context, Result};
use std::{fs::File, io::BufWriter};

/// Write a rectangle of `image` (row stride `stride`) as an indexed PNG.
/// `palette` holds flattened RGB triples; pixel values must index it.
#[allow(clippy::too_many_arguments)]
pub fn write_indexed(
    path: &str,
    image: &[u8],
    stride: usize,
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    palette: Vec<u8>,
    compression: Option<i32>,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("couldn't open {}", path))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width as u32, height as u32);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Four);
    encoder.set_palette(palette);
    if let Some(level) = compression {
        encoder.set_compression(match level {
            0..=3 => png::Compression::Fast,
            4..=6 => png::Compression::Default,
            _ => png::Compression::Best,
        });
    }

    let row_bytes = (width + 1) / 2;
    let mut packed = vec![0u8; row_bytes * height];
    for row in 0..height {
        let src = &image[(y0 + row) * stride + x0..][..width];
        let dst = &mut packed[row * row_bytes..][..row_bytes];
        for (i, &pixel) in src.iter().enumerate() {
            dst[i / 2] |= (pixel & 0x0f) << if i % 2 == 0 { 4 } else { 0 };
        }
    }

    let mut writer = encoder
        .write_header()
        .with_context(|| format!("couldn't write {}", path))?;
    writer
        .write_image_data(&packed)
        .with_context(|| format!("couldn't write {}", path))?;
    writer
        .finish()
        .with_context(|| format!("couldn't write {}", path))?;
    Ok(())
}
