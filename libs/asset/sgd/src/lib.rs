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

// Each SGD file is a flat container. A fixed header carries magic, version
// and flag words, a directory table at 0x4c locates the type-0 directory,
// and everything else is addressed as byte offsets from SGD_OFFSET. The
// directory lists vector entities (points, polylines, arcs, lassos, text
// lines, areas and selection sets) by address; entities reference each
// other by a 32-bit index carried in every entity header. The tiled base
// raster (MRCI) sits at a fixed offset from the base and holds a palette
// plus zlib-compressed 128x128 tiles.
//
// Files are usually shipped gzip-framed; the loader sniffs the magic and
// inflates transparently.

mod bounds;
mod container;
mod entity;
mod loader;
mod raster;
mod reader;
mod set;

#[cfg(any(test, feature = "synth"))]
pub mod synth;

pub use crate::{
    bounds::{finalize_bounds, set_bounds, Bounds},
    entity::{Entry, EntryKind, Point, Polyline, SetEntity, TextLine},
    loader::{load, MAX_BASE},
    raster::{Raster, MAX_HEIGHT, MAX_WIDTH, TILE_HEIGHT, TILE_WIDTH},
    set::SET_DRAWN,
};

use anyhow::{ensure, Result};
use pal::Palette;
use std::collections::HashMap;
use thiserror::Error;

/// Base offset: all addresses stored inside the file are relative to this.
pub const SGD_OFFSET: usize = 0x94;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Format(String),
    #[error("{0}")]
    Bounds(String),
    #[error("set cycle encountered")]
    Cycle,
    #[error("{0}")]
    Limit(String),
    #[error("compressed stream ended before completion")]
    Partial,
}

/// A fully decoded SGD container: the validated entity directory plus the
/// decoded base raster. The source buffer is not retained.
#[derive(Debug)]
pub struct Sgd {
    raster: Raster,
    pub(crate) entries: Vec<Entry>,
    by_index: HashMap<u32, usize>,
}

impl Sgd {
    /// Validate and decode a loaded (already inflated) container. Tile
    /// pixels are remapped into `palette`'s working colors.
    pub fn from_bytes(data: &[u8], palette: &Palette) -> Result<Self> {
        ensure!(
            data.len() >= SGD_OFFSET,
            DecodeError::Format("SGD file too small".to_owned())
        );
        container::check_header(data)?;
        let (entries, by_index) = container::parse_directory(data)?;
        container::check_cycles(&entries, &by_index)?;
        let raster = raster::parse_raster(&data[SGD_OFFSET..], palette.working())?;
        Ok(Self {
            raster,
            entries,
            by_index,
        })
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// All directory entries, in directory order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Resolve an entity reference. Duplicate indices resolve to the first
    /// entry in directory order.
    pub fn entry(&self, index: u32) -> Result<&Entry> {
        self.by_index
            .get(&index)
            .map(|&pos| &self.entries[pos])
            .ok_or_else(|| DecodeError::Format(format!("entry {} not found", index)).into())
    }

    /// Resolve a reference that must name a POINT entity.
    pub fn point(&self, index: u32) -> Result<Point> {
        match self.entry(index)?.kind {
            EntryKind::Point(p) => Ok(p),
            _ => Err(DecodeError::Format(format!("entry {} is not a point", index)).into()),
        }
    }
}
