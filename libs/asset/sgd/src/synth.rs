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

//! Synthetic SGD containers for the test suites. Builds byte-exact files:
//! header, directory table, MRCI raster with zlib tiles, and a type-0
//! directory of entities.

use crate::SGD_OFFSET;
use flate2::{write::GzEncoder, write::ZlibEncoder, Compression};
use std::io::Write;

const ENTRY_HEADER_SIZE: usize = 28;

struct RawEntity {
    kind: u16,
    index: u32,
    labeled: bool,
    payload: Vec<u8>,
}

pub struct Builder {
    width: u32,
    height: u32,
    palette: Vec<[u8; 3]>,
    tile_fill: u8,
    entities: Vec<RawEntity>,
}

fn p16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn p32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn pf32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn patch32(out: &mut [u8], offset: usize, v: u32) {
    out[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

impl Builder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            palette: vec![[0xff, 0xff, 0xff]],
            tile_fill: 0,
            entities: Vec::new(),
        }
    }

    pub fn palette(&mut self, colors: &[[u8; 3]]) -> &mut Self {
        self.palette = colors.to_vec();
        self
    }

    pub fn tile_fill(&mut self, value: u8) -> &mut Self {
        self.tile_fill = value;
        self
    }

    /// Mark the most recently added entity for the label overlay.
    pub fn labeled(&mut self) -> &mut Self {
        self.entities
            .last_mut()
            .expect("no entity to label")
            .labeled = true;
        self
    }

    /// Push an entity with an arbitrary payload; for malformed-input
    /// tests.
    pub fn raw_entity(&mut self, kind: u16, index: u32, payload: Vec<u8>) -> &mut Self {
        self.entity(kind, index, payload)
    }

    fn entity(&mut self, kind: u16, index: u32, payload: Vec<u8>) -> &mut Self {
        self.entities.push(RawEntity {
            kind,
            index,
            labeled: false,
            payload,
        });
        self
    }

    pub fn point(&mut self, index: u32, x: f32, y: f32) -> &mut Self {
        let mut payload = Vec::new();
        pf32(&mut payload, x);
        pf32(&mut payload, y);
        p32(&mut payload, 0);
        self.entity(40, index, payload)
    }

    pub fn polyline(
        &mut self,
        index: u32,
        head: u32,
        tail: u32,
        points: &[(f32, f32)],
    ) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, head);
        p32(&mut payload, tail);
        p32(&mut payload, points.len() as u32);
        for &(x, y) in points {
            pf32(&mut payload, x);
            pf32(&mut payload, y);
        }
        self.entity(45, index, payload)
    }

    pub fn arc(&mut self, index: u32, p0: (f32, f32), p1: (f32, f32)) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, 0);
        p32(&mut payload, 0);
        p32(&mut payload, 2);
        pf32(&mut payload, p0.0);
        pf32(&mut payload, p0.1);
        pf32(&mut payload, p1.0);
        pf32(&mut payload, p1.1);
        self.entity(47, index, payload)
    }

    pub fn lasso(&mut self, index: u32, points: &[(f32, f32)]) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, points.len() as u32);
        for &(x, y) in points {
            pf32(&mut payload, x);
            pf32(&mut payload, y);
        }
        self.entity(50, index, payload)
    }

    pub fn text(&mut self, index: u32, x: f32, y: f32, text: &str) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, 0);
        p32(&mut payload, 0);
        pf32(&mut payload, x);
        pf32(&mut payload, y);
        pf32(&mut payload, 0.0);
        for _ in 0..6 {
            pf32(&mut payload, 0.0);
        }
        payload.extend_from_slice(text.as_bytes());
        payload.push(0);
        self.entity(55, index, payload)
    }

    pub fn simple_area(&mut self, index: u32, refs: &[i32]) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, refs.len() as u32);
        for &r in refs {
            payload.extend_from_slice(&r.to_le_bytes());
        }
        self.entity(82, index, payload)
    }

    pub fn connected_area(&mut self, index: u32, refs: &[u32]) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, refs.len() as u32);
        for &r in refs {
            p32(&mut payload, r);
        }
        self.entity(83, index, payload)
    }

    pub fn set(&mut self, index: u32, flags: u32, children: &[u32]) -> &mut Self {
        let mut payload = Vec::new();
        p32(&mut payload, flags);
        p32(&mut payload, children.len() as u32);
        for &c in children {
            p32(&mut payload, c);
        }
        self.entity(89, index, payload)
    }

    pub fn build(&self) -> Vec<u8> {
        let h_tiles = (self.width as usize + 127) / 128;
        let v_tiles = (self.height as usize + 127) / 128;

        // Everything after the base offset; addresses below are relative
        // to it. The MRCI entity sits at base + 8.
        let mut body = vec![0u8; 8];

        let mrci_at = body.len();
        push_entity_header(&mut body, 25, 0, false);
        p32(&mut body, self.width);
        p32(&mut body, self.height);
        for _ in 0..6 {
            p32(&mut body, 0); // unk9..unk14
        }
        pf32(&mut body, 0.0); // unk15
        p32(&mut body, 0); // unk16
        pf32(&mut body, 0.0); // unk17
        for _ in 0..9 {
            p32(&mut body, 0); // unk18..unk26
        }
        p32(&mut body, 1); // bytes_per_pixel
        p32(&mut body, 8); // bit_depth
        let palette_addr_at = body.len();
        p32(&mut body, 0); // palette_addr, patched below
        p32(&mut body, 128); // tile_width
        p32(&mut body, 128); // tile_height
        for _ in 0..4 {
            p32(&mut body, 0); // unk32..unk35
        }
        let bitmap_addr_at = body.len();
        p32(&mut body, 0); // bitmap_addr, patched below
        debug_assert_eq!(body.len(), mrci_at + 148);

        // Palette record.
        let palette_at = body.len();
        p16(&mut body, 0);
        p16(&mut body, 0x4ef);
        p16(&mut body, 3); // bytes per pixel
        p16(&mut body, 8); // bit depth
        p32(&mut body, self.palette.len() as u32);
        for color in &self.palette {
            body.extend_from_slice(color);
        }

        // One compressed tile body, shared by every tile address.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[self.tile_fill; 128 * 128]).unwrap();
        let tile_pixels = encoder.finish().unwrap();

        let tile_at = body.len();
        p16(&mut body, (4 + tile_pixels.len()) as u16);
        p16(&mut body, 0x4ee);
        p32(&mut body, 1); // encoding
        body.extend_from_slice(&tile_pixels);

        // Tile list record.
        let bitmap_at = body.len();
        p16(&mut body, 0);
        p16(&mut body, 0x4ed);
        for _ in 0..h_tiles * v_tiles {
            p32(&mut body, tile_at as u32);
        }

        // Entities, then the directory listing them.
        let mut addrs = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            addrs.push(body.len() as u32);
            push_entity_header(&mut body, entity.kind, entity.index, entity.labeled);
            body.extend_from_slice(&entity.payload);
        }

        let directory_at = body.len();
        p16(&mut body, 0);
        p16(&mut body, 99); // BULKDATA
        p32(&mut body, 0); // size
        p32(&mut body, 0); // unk2
        p32(&mut body, addrs.len() as u32);
        p32(&mut body, 0); // unk4
        p32(&mut body, 0); // unk5
        for addr in &addrs {
            p32(&mut body, *addr);
        }

        patch32(&mut body, palette_addr_at, palette_at as u32);
        patch32(&mut body, bitmap_addr_at, bitmap_at as u32);

        // File header and directory table in front of the base.
        let mut data = vec![0u8; SGD_OFFSET];
        patch32(&mut data, 0, 0x000a_0090);
        data[4..6].copy_from_slice(&0x07dbu16.to_le_bytes());
        data[6..8].copy_from_slice(&0x0407u16.to_le_bytes());
        patch32(&mut data, 8, 0x0102_0015);
        patch32(&mut data, 12, 0x5555_5555);
        patch32(&mut data, 0x4c, 1); // one directory table slot
        patch32(&mut data, 0x50, 0); // slot type 0
        patch32(&mut data, 0x54, (SGD_OFFSET + directory_at) as u32);

        data.extend_from_slice(&body);
        data
    }

    pub fn build_gzip(&self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.build()).unwrap();
        encoder.finish().unwrap()
    }
}

fn push_entity_header(out: &mut Vec<u8>, kind: u16, index: u32, labeled: bool) {
    p16(out, 0); // size, unused by the reader
    p16(out, kind);
    p32(out, index);
    p32(out, 0); // unk2
    p32(out, labeled as u32); // unk3
    p32(out, 0); // unk4
    p32(out, 0); // unk5
    p32(out, 0); // unk6
}
