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

//! Selection set relations: annotation-pair fixup, subset detection and
//! display-name derivation.

use crate::{
    entity::{Entry, EntryKind, SetEntity},
    Sgd,
};
use anyhow::Result;

/// Flag bit in a SET's attribute word marking it as already emitted.
pub const SET_DRAWN: u32 = 0x8000_0000;

/// Attribute class (under the drawn mask) of sets that carry no geometry
/// of their own and act purely as containers for child sets.
pub(crate) const SET_WRAPPER_CLASS: u32 = 0x79;

const NAME_LIMIT: usize = 15;

impl Sgd {
    /// Move every adjacent (TEXT_LINE containing '-', SIMPLE_AREA) pair to
    /// the tail of each set's child list, isolating annotation pairs from
    /// primary geometry. Idempotent.
    pub fn fixup_sets(&mut self) -> Result<()> {
        let mut fixed = Vec::new();
        for (pos, entry) in self.entries().iter().enumerate() {
            if let EntryKind::Set(set) = &entry.kind {
                let children = fixup_children(self, &set.children)?;
                if children != set.children {
                    fixed.push((pos, children));
                }
            }
        }
        for (pos, children) in fixed {
            if let EntryKind::Set(set) = &mut self.entries[pos].kind {
                set.children = children;
            }
        }
        Ok(())
    }

    /// True when some other SET in the directory strictly contains every
    /// child of the set at directory position `pos`.
    pub fn set_is_subset(&self, pos: usize) -> bool {
        let Some(set) = self.entries[pos].as_set() else {
            return false;
        };
        for (other_pos, other) in self.entries().iter().enumerate() {
            if other_pos == pos {
                continue;
            }
            let Some(other) = other.as_set() else {
                continue;
            };
            if other.children.len() <= set.children.len() {
                continue;
            }
            if set
                .children
                .iter()
                .all(|child| other.children.contains(child))
            {
                return true;
            }
        }
        false
    }

    /// Derive the display name of a set: the first TEXT_LINE child whose
    /// text carries no '-' and survives normalization non-empty.
    pub fn set_name(&self, set: &SetEntity) -> Result<Option<String>> {
        for &child in &set.children {
            if let EntryKind::TextLine(line) = &self.entry(child)?.kind {
                if !line.text.contains('-') {
                    let name = normalize_name(&line.text);
                    if !name.is_empty() {
                        return Ok(Some(name));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Bounds classification of an entry: 1 = SET, 2 = LASSO,
/// 3 = CONNECTED_AREA, 4 = SIMPLE_AREA holding at least one polyline,
/// 0 = no shape. Areas made only of arcs intentionally classify as 0.
pub(crate) fn shape_class(doc: &Sgd, entry: &Entry) -> Result<u32> {
    Ok(match &entry.kind {
        EntryKind::Set(_) => 1,
        EntryKind::Lasso(_) => 2,
        EntryKind::ConnectedArea(_) => 3,
        EntryKind::SimpleArea(refs) => {
            for &r in refs {
                if let EntryKind::Polyline(_) = doc.entry(r.unsigned_abs())?.kind {
                    return Ok(4);
                }
            }
            0
        }
        _ => 0,
    })
}

fn is_annotation_pair(doc: &Sgd, first: u32, second: u32) -> Result<bool> {
    let first = doc.entry(first)?;
    let second = doc.entry(second)?;
    Ok(match (&first.kind, &second.kind) {
        (EntryKind::TextLine(line), EntryKind::SimpleArea(_)) => line.text.contains('-'),
        _ => false,
    })
}

fn fixup_children(doc: &Sgd, children: &[u32]) -> Result<Vec<u32>> {
    let mut primary = Vec::with_capacity(children.len());
    let mut annotations = Vec::new();
    let mut i = 0;
    while i < children.len() {
        if i + 1 < children.len() && is_annotation_pair(doc, children[i], children[i + 1])? {
            annotations.push(children[i]);
            annotations.push(children[i + 1]);
            i += 2;
        } else {
            primary.push(children[i]);
            i += 1;
        }
    }
    primary.extend(annotations);
    Ok(primary)
}

/// Sanitize label text into a file-name-safe identifier: uppercase
/// alphanumerics pass, control bytes, whitespace and parentheses drop,
/// everything else becomes '_'. At most 15 bytes.
fn normalize_name(text: &str) -> String {
    let mut name = String::new();
    for &byte in text.as_bytes() {
        let c = match byte {
            0..=32 | b'(' | b')' => continue,
            b'A'..=b'Z' | b'0'..=b'9' => byte,
            b'a'..=b'z' => byte - (b'a' - b'A'),
            _ => b'_',
        };
        if name.len() == NAME_LIMIT {
            break;
        }
        name.push(c as char);
    }
    name
}
