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
use anyhow::{bail, ensure, Result};
use std::{fs, path::Path};

/// Number of working colors every decoded pixel is remapped into.
pub const WORKING_COLORS: usize = 8;

/// Total output colors: the working set plus its label-highlight variants.
pub const OUTPUT_COLORS: usize = 16;

pub const PAL_BLACK: u8 = 0;
pub const PAL_WHITE: u8 = 7;

// Made up palette. Load an actual SGD palette with Palette::from_text to
// get original colors.
const SUBSTITUTE: [[u8; 3]; WORKING_COLORS] = [
    [0x15, 0x22, 0x25],
    [0x55, 0x6a, 0x48],
    [0x75, 0x92, 0x64],
    [0x90, 0xa9, 0x80],
    [0xaa, 0xbd, 0x9f],
    [0xc5, 0xd2, 0xbd],
    [0xdf, 0xe7, 0xdb],
    [0xff, 0xff, 0xff],
];

/// The 16-entry output palette: entries 0..8 are the working colors,
/// entries 8..16 the same colors with the blue channel dropped, marking
/// highlighted pixels.
#[derive(Clone, Debug)]
pub struct Palette {
    entries: [[u8; 3]; OUTPUT_COLORS],
}

impl Palette {
    /// The built-in stand-in palette used when no palette file is given.
    pub fn substitute() -> Self {
        Self::from_working(&SUBSTITUTE)
    }

    fn from_working(working: &[[u8; 3]; WORKING_COLORS]) -> Self {
        let mut entries = [[0u8; 3]; OUTPUT_COLORS];
        for (i, color) in working.iter().enumerate() {
            entries[i] = *color;
            entries[i + WORKING_COLORS] = [color[0], color[1], 0];
        }
        Self { entries }
    }

    /// Parse a palette file: one color per line as three hex integers,
    /// whitespace-only lines skipped. Exactly 8 or 16 colors; 8 colors get
    /// the label variants synthesized.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut colors = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut channels = [0u8; 3];
            let mut fields = line.split_whitespace();
            for channel in &mut channels {
                let field = fields.next().ok_or_else(|| parse_error(lineno + 1))?;
                *channel =
                    u8::from_str_radix(field, 16).map_err(|_| parse_error(lineno + 1))?;
            }
            ensure!(
                colors.len() < OUTPUT_COLORS,
                "too many colors in palette file"
            );
            colors.push(channels);
        }

        if colors.len() == WORKING_COLORS {
            let mut working = [[0u8; 3]; WORKING_COLORS];
            working.copy_from_slice(&colors);
            return Ok(Self::from_working(&working));
        }
        if colors.len() == OUTPUT_COLORS {
            let mut entries = [[0u8; 3]; OUTPUT_COLORS];
            entries.copy_from_slice(&colors);
            return Ok(Self { entries });
        }
        bail!("palette file must contain 8 or 16 colors");
    }

    pub fn from_text_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_text(&fs::read_to_string(path)?)
    }

    /// The 8 working colors that tile pixels remap into.
    pub fn working(&self) -> &[[u8; 3]] {
        &self.entries[..WORKING_COLORS]
    }

    #[inline]
    pub fn rgb(&self, index: usize) -> [u8; 3] {
        self.entries[index]
    }

    /// Flattened RGB triples for the PNG encoder; `count` is 8 for the
    /// base image or 16 for per-set overlays.
    pub fn png_bytes(&self, count: usize) -> Vec<u8> {
        assert!(count == WORKING_COLORS || count == OUTPUT_COLORS);
        let mut out = Vec::with_capacity(count * 3);
        for entry in &self.entries[..count] {
            out.extend_from_slice(entry);
        }
        out
    }
}

fn parse_error(lineno: usize) -> anyhow::Error {
    anyhow::anyhow!("error at line {} in palette file", lineno)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_synthesizes_label_variants_from_8_colors() -> Result<()> {
        let pal = Palette::from_text(
            "10 20 30\n0 0 0\n1 2 3\n4 5 6\n7 8 9\na b c\nd e f\nff ff ff\n",
        )?;
        assert_eq!(pal.rgb(0), [0x10, 0x20, 0x30]);
        assert_eq!(pal.rgb(8), [0x10, 0x20, 0x00]);
        assert_eq!(pal.rgb(7), [0xff, 0xff, 0xff]);
        assert_eq!(pal.rgb(15), [0xff, 0xff, 0x00]);
        Ok(())
    }

    #[test]
    fn it_takes_16_colors_verbatim() -> Result<()> {
        let mut text = String::new();
        for i in 0..16 {
            text.push_str(&format!("{:x} {:x} {:x}\n", i, i, i));
        }
        let pal = Palette::from_text(&text)?;
        assert_eq!(pal.rgb(15), [15, 15, 15]);
        Ok(())
    }

    #[test]
    fn it_skips_blank_lines() -> Result<()> {
        let pal = Palette::from_text(
            "\n  \n1 1 1\n2 2 2\n3 3 3\n4 4 4\n\t\n5 5 5\n6 6 6\n7 7 7\n8 8 8\n",
        )?;
        assert_eq!(pal.rgb(0), [1, 1, 1]);
        Ok(())
    }

    #[test]
    fn it_rejects_wrong_color_counts() {
        assert!(Palette::from_text("").is_err());
        let seven = "1 1 1\n".repeat(7);
        assert!(Palette::from_text(&seven).is_err());
        let seventeen = "1 1 1\n".repeat(17);
        assert!(Palette::from_text(&seventeen).is_err());
    }

    #[test]
    fn it_rejects_malformed_lines() {
        assert!(Palette::from_text("1 2\n").is_err());
        assert!(Palette::from_text("zz 0 0\n").is_err());
    }

    #[test]
    fn substitute_ends_in_white() {
        let pal = Palette::substitute();
        assert_eq!(pal.rgb(PAL_WHITE as usize), [0xff, 0xff, 0xff]);
        assert_eq!(pal.rgb(8 + PAL_WHITE as usize), [0xff, 0xff, 0x00]);
    }
}
