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

//! The MRCI tiled raster: header validation, embedded palette decode with
//! remapping into the working palette, and per-tile inflation.

use crate::{
    container::{EntryHeader, SGD_MRCIHEADER},
    reader::{slice_at, tail, view, Le16, Le32, LeF32},
    DecodeError,
};
use anyhow::{ensure, Context, Result};
use flate2::read::ZlibDecoder;
use log::trace;
use std::{io::Read, mem};
use zerocopy::{FromBytes, Unaligned};

pub const MAX_WIDTH: u32 = 2048;
pub const MAX_HEIGHT: u32 = 2048;
pub const TILE_WIDTH: usize = 128;
pub const TILE_HEIGHT: usize = 128;

const TILE_PIXELS: usize = TILE_WIDTH * TILE_HEIGHT;

/// Offset of the MRCI entity relative to the container base.
const MRCI_OFFSET: usize = 8;

const SGD_BMPTILELIST: u16 = 0x4ed;
const SGD_BMPTILE: u16 = 0x4ee;
const SGD_BMPPALETTE: u16 = 0x4ef;

#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
struct MrciHeader {
    width: Le32,
    height: Le32,
    unk9: Le32,
    unk10: Le32,
    unk11: Le32,
    unk12: Le32,
    unk13: Le32,
    unk14: Le32,
    unk15: LeF32,
    unk16: Le32,
    unk17: LeF32,
    unk18: Le32,
    unk19: Le32,
    unk20: Le32,
    unk21: Le32,
    unk22: Le32,
    unk23: Le32,
    unk24: Le32,
    unk25: Le32,
    unk26: Le32,
    bytes_per_pixel: Le32,
    bit_depth: Le32,
    palette_addr: Le32,
    tile_width: Le32,
    tile_height: Le32,
    unk32: Le32,
    unk33: Le32,
    unk34: Le32,
    unk35: Le32,
    bitmap_addr: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
struct PaletteHeader {
    size: Le16,
    kind: Le16,
    bytes_per_pixel: Le16,
    bit_depth: Le16,
    num_colors: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
struct TileListHeader {
    size: Le16,
    kind: Le16,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct TileHeader {
    size: Le16,
    kind: Le16,
    encoding: Le32,
}

/// The decoded base raster: inflated tiles in row-major tile order plus
/// the colormap into the working palette.
#[derive(Debug)]
pub struct Raster {
    width: u32,
    height: u32,
    h_tiles: u32,
    v_tiles: u32,
    tiles: Vec<Vec<u8>>,
    colormap: [u8; 256],
}

impl Raster {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn h_tiles(&self) -> u32 {
        self.h_tiles
    }

    pub fn v_tiles(&self) -> u32 {
        self.v_tiles
    }

    /// Tile pixels, 128x128 bytes, by row-major tile number.
    pub fn tile(&self, number: usize) -> &[u8] {
        &self.tiles[number]
    }

    pub fn colormap(&self) -> &[u8; 256] {
        &self.colormap
    }
}

pub(crate) fn parse_raster(base: &[u8], working: &[[u8; 3]]) -> Result<Raster> {
    let header = view::<EntryHeader>(tail(base, MRCI_OFFSET, "MRCI header")?, "MRCI header")?;
    ensure!(
        header.kind.get() == SGD_MRCIHEADER,
        DecodeError::Format("bad MRCI header type".to_owned())
    );
    let mrci = view::<MrciHeader>(
        tail(
            base,
            MRCI_OFFSET + mem::size_of::<EntryHeader>(),
            "MRCI header",
        )?,
        "MRCI header",
    )?;

    let (width, height) = (mrci.width.get(), mrci.height.get());
    ensure!(
        width >= 1 && height >= 1,
        DecodeError::Format("bad MRCI image size".to_owned())
    );
    ensure!(
        width <= MAX_WIDTH && height <= MAX_HEIGHT,
        DecodeError::Limit(format!(
            "MRCI image {}x{} exceeds {}x{}",
            width, height, MAX_WIDTH, MAX_HEIGHT
        ))
    );
    ensure!(
        mrci.bytes_per_pixel.get() == 1 && mrci.bit_depth.get() == 8,
        DecodeError::Format("bad MRCI bit depth or bytes per pixel".to_owned())
    );
    ensure!(
        mrci.tile_width.get() == TILE_WIDTH as u32 && mrci.tile_height.get() == TILE_HEIGHT as u32,
        DecodeError::Format("bad MRCI tile size".to_owned())
    );

    let h_tiles = (width + TILE_WIDTH as u32 - 1) / TILE_WIDTH as u32;
    let v_tiles = (height + TILE_HEIGHT as u32 - 1) / TILE_HEIGHT as u32;

    let palette = parse_palette(base, mrci.palette_addr.get() as usize)?;
    let colormap = remap_colors(&palette, working);
    let tiles = parse_tiles(
        base,
        mrci.bitmap_addr.get() as usize,
        (h_tiles * v_tiles) as usize,
    )?;
    trace!(
        "MRCI: {}x{}, {}x{} tiles, {} palette colors",
        width,
        height,
        h_tiles,
        v_tiles,
        palette.len()
    );

    Ok(Raster {
        width,
        height,
        h_tiles,
        v_tiles,
        tiles,
        colormap,
    })
}

fn parse_palette(base: &[u8], addr: usize) -> Result<Vec<[u8; 3]>> {
    let header = view::<PaletteHeader>(tail(base, addr, "palette")?, "palette")?;
    ensure!(
        header.kind.get() == SGD_BMPPALETTE,
        DecodeError::Format("bad palette type".to_owned())
    );
    let bytes_per_pixel = header.bytes_per_pixel.get() as usize;
    ensure!(
        bytes_per_pixel == 1 || bytes_per_pixel == 3,
        DecodeError::Format("bad palette bytes per pixel".to_owned())
    );
    let num_colors = header.num_colors.get();
    ensure!(
        header.bit_depth.get() == 8 && (1..=256).contains(&num_colors),
        DecodeError::Format("bad palette bit depth or number of colors".to_owned())
    );

    let data = slice_at::<u8>(
        base,
        addr + mem::size_of::<PaletteHeader>(),
        num_colors as usize * bytes_per_pixel,
        "palette data",
    )?;
    Ok(data
        .chunks(bytes_per_pixel)
        .map(|entry| match entry {
            [r, g, b] => [*r, *g, *b],
            // One byte per entry is a grayscale ramp.
            gray => [gray[0], gray[0], gray[0]],
        })
        .collect())
}

/// Match each embedded palette entry to the nearest working color by L1
/// distance; the first of equally distant candidates wins.
fn remap_colors(palette: &[[u8; 3]], working: &[[u8; 3]]) -> [u8; 256] {
    let mut colormap = [0u8; 256];
    for (i, color) in palette.iter().enumerate() {
        let mut best = 0;
        let mut min_dist = i32::MAX;
        for (j, candidate) in working.iter().enumerate() {
            let dist = (i32::from(candidate[0]) - i32::from(color[0])).abs()
                + (i32::from(candidate[1]) - i32::from(color[1])).abs()
                + (i32::from(candidate[2]) - i32::from(color[2])).abs();
            if dist < min_dist {
                min_dist = dist;
                best = j;
            }
        }
        colormap[i] = best as u8;
    }
    colormap
}

fn parse_tiles(base: &[u8], addr: usize, count: usize) -> Result<Vec<Vec<u8>>> {
    let header = view::<TileListHeader>(tail(base, addr, "tile list")?, "tile list")?;
    ensure!(
        header.kind.get() == SGD_BMPTILELIST,
        DecodeError::Format("bad tile list type".to_owned())
    );
    let addrs = slice_at::<Le32>(
        base,
        addr + mem::size_of::<TileListHeader>(),
        count,
        "tile addresses",
    )?;

    let mut tiles = Vec::with_capacity(count);
    for tile_addr in addrs {
        let tile_addr = tile_addr.get() as usize;
        let header = view::<TileHeader>(tail(base, tile_addr, "tile")?, "tile")?;
        ensure!(
            header.kind.get() == SGD_BMPTILE,
            DecodeError::Format("bad tile type".to_owned())
        );
        ensure!(
            header.encoding.get() == 1,
            DecodeError::Format("bad tile encoding".to_owned())
        );
        let size = header.size.get() as usize;
        // The record size counts the encoding word plus the payload.
        let payload = size
            .checked_sub(mem::size_of::<Le32>())
            .and_then(|len| base.get(tile_addr + 8..tile_addr + 8 + len))
            .ok_or_else(|| DecodeError::Format("bad tile size".to_owned()))?;
        tiles.push(inflate_tile(payload)?);
    }
    Ok(tiles)
}

fn inflate_tile(payload: &[u8]) -> Result<Vec<u8>> {
    let mut pixels = Vec::with_capacity(TILE_PIXELS);
    let mut decoder = ZlibDecoder::new(payload).take(TILE_PIXELS as u64 + 1);
    decoder
        .read_to_end(&mut pixels)
        .context("tile inflate failed")?;
    ensure!(
        pixels.len() <= TILE_PIXELS,
        DecodeError::Format("tile inflates past 128x128".to_owned())
    );
    // Short streams leave the tail of the tile blank.
    pixels.resize(TILE_PIXELS, 0);
    Ok(pixels)
}
