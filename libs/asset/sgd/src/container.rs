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

//! Container header and type-0 directory: validation, entity parsing and
//! SET cycle rejection.

use crate::{
    entity::{Entry, EntryKind, Point, Polyline, SetEntity, TextLine},
    reader::{slice_at, tail, view, Le16, Le32, LeF32, LeI32},
    DecodeError, SGD_OFFSET,
};
use anyhow::{bail, ensure, Result};
use log::trace;
use std::{collections::HashMap, mem};
use zerocopy::{FromBytes, Unaligned};

const MAGIC1: u32 = 0x000a_0090;
const MAGIC2: u32 = 0x5555_5555;
const VER_MAJOR: u16 = 0x07db;
const VER_MINOR_A: u16 = 0x0407;
const VER_MINOR_B: u16 = 0x0406;
const FLAGS: u32 = 0x0102_0015;

const DIRECTORY_TABLE_OFFSET: usize = 0x4c;
const MAX_TABLE_ENTRIES: u32 = 8;

// Entity type tags.
pub(crate) const SGD_MRCIHEADER: u16 = 25;
const SGD_POINT2D: u16 = 40;
const SGD_POLYLINE2D: u16 = 45;
const SGD_ELLIPTICALARC2D: u16 = 47;
const SGD_LASSO2D: u16 = 50;
const SGD_TEXTLINE2D: u16 = 55;
const SGD_SIMPLEAREA: u16 = 82;
const SGD_CONNECTEDAREA: u16 = 83;
const SGD_SET: u16 = 89;
const SGD_BULKDATA: u16 = 99;

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct FileHeader {
    magic1: Le32,
    ver_major: Le16,
    ver_minor: Le16,
    flags: Le32,
    magic2: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct DirectoryTableHeader {
    num_entries: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct DirectoryTableSlot {
    kind: Le32,
    addr: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
struct DirectoryHeader {
    size_16: Le16,
    kind: Le16,
    size: Le32,
    unk2: Le32,
    num_entries: Le32,
    unk4: Le32,
    unk5: Le32,
}

/// Common entity header; every directory address points at one of these.
#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
pub(crate) struct EntryHeader {
    pub size: Le16,
    pub kind: Le16,
    pub index: Le32,
    pub unk2: Le32,
    pub unk3: Le32,
    pub unk4: Le32,
    pub unk5: Le32,
    pub unk6: Le32,
}

#[derive(FromBytes, Unaligned, Clone, Copy)]
#[repr(C)]
pub(crate) struct RawPoint {
    x: LeF32,
    y: LeF32,
}

impl RawPoint {
    pub(crate) fn get(&self) -> Point {
        Point {
            x: self.x.get(),
            y: self.y.get(),
        }
    }
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct PolylineHeader {
    point1: Le32,
    point2: Le32,
    num_points: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
struct ArcHeader {
    unk7: Le32,
    unk8: Le32,
    num_points: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct LassoHeader {
    num_points: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
#[allow(dead_code)]
struct TextLineHeader {
    unk7: Le32,
    unk8: Le32,
    pos: RawPoint,
    unk11: LeF32,
    width: RawPoint,
    height: RawPoint,
    end: RawPoint,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct AreaHeader {
    num_entries: Le32,
}

#[derive(FromBytes, Unaligned)]
#[repr(C)]
struct SetHeader {
    unk7: Le32,
    num_entries: Le32,
}

pub(crate) fn check_header(data: &[u8]) -> Result<()> {
    let header = view::<FileHeader>(data, "file header")?;
    ensure!(
        header.magic1.get() == MAGIC1 && header.magic2.get() == MAGIC2,
        DecodeError::Format("bad SGD magic".to_owned())
    );
    ensure!(
        header.ver_major.get() == VER_MAJOR
            && (header.ver_minor.get() == VER_MINOR_A || header.ver_minor.get() == VER_MINOR_B),
        DecodeError::Format("bad SGD version".to_owned())
    );
    ensure!(
        header.flags.get() == FLAGS,
        DecodeError::Format("bad SGD flags".to_owned())
    );
    Ok(())
}

/// Locate the type-0 directory through the directory table and parse every
/// entity it lists.
pub(crate) fn parse_directory(data: &[u8]) -> Result<(Vec<Entry>, HashMap<u32, usize>)> {
    let table = view_table(data)?;
    let slot = table
        .iter()
        .find(|slot| slot.kind.get() == 0)
        .ok_or_else(|| DecodeError::Format("directory 0 not found".to_owned()))?;

    let dir_addr = slot.addr.get() as usize;
    let dir = view::<DirectoryHeader>(tail(data, dir_addr, "directory")?, "directory")?;
    ensure!(
        dir.kind.get() == SGD_BULKDATA,
        DecodeError::Format("bad directory type".to_owned())
    );
    let count = dir.num_entries.get() as usize;
    ensure!(
        count <= (data.len() - dir_addr) / mem::size_of::<Le32>(),
        DecodeError::Format("bad number of directory entries".to_owned())
    );
    let addrs = slice_at::<Le32>(
        data,
        dir_addr + mem::size_of::<DirectoryHeader>(),
        count,
        "directory entries",
    )?;
    trace!("directory at {:#x} with {} entries", dir_addr, count);

    let base = &data[SGD_OFFSET..];
    let mut entries = Vec::with_capacity(count);
    let mut by_index = HashMap::with_capacity(count);
    for addr in addrs {
        let entry = parse_entry(base, addr.get())?;
        // The first entry in directory order wins an index collision.
        by_index.entry(entry.index).or_insert(entries.len());
        entries.push(entry);
    }
    Ok((entries, by_index))
}

fn view_table(data: &[u8]) -> Result<&[DirectoryTableSlot]> {
    let header = view::<DirectoryTableHeader>(
        tail(data, DIRECTORY_TABLE_OFFSET, "directory table")?,
        "directory table",
    )?;
    let count = header.num_entries.get();
    ensure!(
        count <= MAX_TABLE_ENTRIES,
        DecodeError::Format("bad number of directory table entries".to_owned())
    );
    slice_at::<DirectoryTableSlot>(
        data,
        DIRECTORY_TABLE_OFFSET + mem::size_of::<DirectoryTableHeader>(),
        count as usize,
        "directory table",
    )
}

fn parse_entry(base: &[u8], addr: u32) -> Result<Entry> {
    let entry = tail(base, addr as usize, "entry")?;
    let header = view::<EntryHeader>(entry, "entity header")?;
    let body = &entry[mem::size_of::<EntryHeader>()..];

    let kind = match header.kind.get() {
        SGD_POINT2D => EntryKind::Point(view::<RawPoint>(body, "point")?.get()),
        SGD_POLYLINE2D => {
            let head = view::<PolylineHeader>(body, "polyline")?;
            let points = read_points(
                body,
                mem::size_of::<PolylineHeader>(),
                head.num_points.get(),
            )?;
            EntryKind::Polyline(Polyline {
                head: reference(head.point1.get()),
                tail: reference(head.point2.get()),
                points,
            })
        }
        SGD_ELLIPTICALARC2D => {
            let head = view::<ArcHeader>(body, "elliptical arc")?;
            ensure!(
                head.num_points.get() >= 2,
                DecodeError::Format("bad number of points".to_owned())
            );
            let control = slice_at::<RawPoint>(
                body,
                mem::size_of::<ArcHeader>(),
                2,
                "elliptical arc points",
            )?;
            EntryKind::EllipticalArc {
                p0: control[0].get(),
                p1: control[1].get(),
            }
        }
        SGD_LASSO2D => {
            let head = view::<LassoHeader>(body, "lasso")?;
            EntryKind::Lasso(read_points(
                body,
                mem::size_of::<LassoHeader>(),
                head.num_points.get(),
            )?)
        }
        SGD_TEXTLINE2D => {
            let head = view::<TextLineHeader>(body, "text line")?;
            let bytes = &body[mem::size_of::<TextLineHeader>()..];
            let nul = bytes
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| DecodeError::Format("text too long".to_owned()))?;
            EntryKind::TextLine(TextLine {
                pos: head.pos.get(),
                text: String::from_utf8_lossy(&bytes[..nul]).into_owned(),
            })
        }
        SGD_SIMPLEAREA => {
            let head = view::<AreaHeader>(body, "simple area")?;
            let refs = checked_refs::<LeI32>(body, head.num_entries.get())?;
            EntryKind::SimpleArea(refs.iter().map(|r| r.get()).collect())
        }
        SGD_CONNECTEDAREA => {
            let head = view::<AreaHeader>(body, "connected area")?;
            let refs = checked_refs::<Le32>(body, head.num_entries.get())?;
            EntryKind::ConnectedArea(refs.iter().map(|r| r.get()).collect())
        }
        SGD_SET => {
            let head = view::<SetHeader>(body, "set")?;
            let count = head.num_entries.get() as usize;
            ensure!(
                count <= body.len().saturating_sub(mem::size_of::<SetHeader>()) / 4,
                DecodeError::Format("bad number of entries".to_owned())
            );
            let refs =
                slice_at::<Le32>(body, mem::size_of::<SetHeader>(), count, "set entries")?;
            EntryKind::Set(SetEntity {
                flags: head.unk7.get(),
                children: refs.iter().map(|r| r.get()).collect(),
            })
        }
        kind => EntryKind::Unrecognized(kind),
    };

    Ok(Entry {
        index: header.index.get(),
        labeled: header.unk3.get() != 0,
        kind,
    })
}

fn reference(index: u32) -> Option<u32> {
    (index != 0).then_some(index)
}

fn read_points(body: &[u8], offset: usize, count: u32) -> Result<Vec<Point>> {
    let count = count as usize;
    ensure!(
        count <= body.len().saturating_sub(offset) / mem::size_of::<RawPoint>(),
        DecodeError::Format("bad number of points".to_owned())
    );
    let raw = slice_at::<RawPoint>(body, offset, count, "points")?;
    Ok(raw.iter().map(RawPoint::get).collect())
}

fn checked_refs<T>(body: &[u8], count: u32) -> Result<&[T]>
where
    T: FromBytes + Unaligned,
{
    let count = count as usize;
    ensure!(
        count <= body.len().saturating_sub(mem::size_of::<AreaHeader>()) / 4,
        DecodeError::Format("bad number of entries".to_owned())
    );
    slice_at::<T>(body, mem::size_of::<AreaHeader>(), count, "area entries")
}

/// Reject SETs that reach themselves through child references. Children of
/// sets must resolve; other dangling references are caught lazily at use.
pub(crate) fn check_cycles(entries: &[Entry], by_index: &HashMap<u32, usize>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Clear,
        Visiting,
        Done,
    }

    fn visit(
        pos: usize,
        entries: &[Entry],
        by_index: &HashMap<u32, usize>,
        marks: &mut [Mark],
    ) -> Result<()> {
        match marks[pos] {
            Mark::Visiting => bail!(DecodeError::Cycle),
            Mark::Done => return Ok(()),
            Mark::Clear => {}
        }
        marks[pos] = Mark::Visiting;
        if let EntryKind::Set(set) = &entries[pos].kind {
            for &child in &set.children {
                let &child_pos = by_index
                    .get(&child)
                    .ok_or_else(|| DecodeError::Format(format!("entry {} not found", child)))?;
                if entries[child_pos].is_set() {
                    visit(child_pos, entries, by_index, marks)?;
                }
            }
        }
        marks[pos] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Clear; entries.len()];
    for pos in 0..entries.len() {
        if entries[pos].is_set() {
            visit(pos, entries, by_index, &mut marks)?;
        }
    }
    Ok(())
}
