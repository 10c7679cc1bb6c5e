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

//! Crop rectangle selection for selection sets. Coordinates are screen
//! space: y grows downward, flipped from entity space with `H - y`.
//!
//! The child list of a set is scanned in runs delimited by text lines,
//! each run is classified by the multiset of shape kinds it carries, and
//! the classification decides between the union of all runs and the
//! single run that grows the caller's rectangle least.

use crate::{
    entity::{Entry, EntryKind, Polyline},
    set::{shape_class, SET_WRAPPER_CLASS},
    Sgd, SET_DRAWN,
};
use anyhow::Result;

const EXPAND_MARGIN: i32 = 75;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Bounds {
    pub const EMPTY: Bounds = Bounds {
        min_x: 9999,
        min_y: 9999,
        max_x: -9999,
        max_y: -9999,
    };

    pub fn add_point(&mut self, x: i32, y: i32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        i64::from(self.max_x - self.min_x + 1) * i64::from(self.max_y - self.min_y + 1)
    }

    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1) as u32
    }

    /// Grow symmetrically by up to EXPAND_MARGIN without leaving a canvas
    /// the rectangle already sits inside.
    fn expand(&mut self, canvas_width: i32, canvas_height: i32) {
        if self.is_empty() {
            return;
        }
        let mx = EXPAND_MARGIN
            .min(self.min_x)
            .min(canvas_width - self.max_x - 1);
        let my = EXPAND_MARGIN
            .min(self.min_y)
            .min(canvas_height - self.max_y - 1);
        self.min_x -= mx;
        self.min_y -= my;
        self.max_x += mx;
        self.max_y += my;
    }

    /// Intersect with the canvas so crops index real pixels even when
    /// entity geometry strays outside the raster.
    fn clamp(&mut self, canvas_width: i32, canvas_height: i32) {
        if self.is_empty() {
            return;
        }
        self.min_x = self.min_x.max(0);
        self.min_y = self.min_y.max(0);
        self.max_x = self.max_x.min(canvas_width - 1);
        self.max_y = self.max_y.min(canvas_height - 1);
        if self.is_empty() {
            *self = Bounds::EMPTY;
        }
    }
}

fn polyline_bounds(doc: &Sgd, b: &mut Bounds, line: &Polyline) -> Result<()> {
    let height = doc.height() as f32;
    if let Some(head) = line.head {
        let p = doc.point(head)?;
        b.add_point(p.x as i32, (height - p.y) as i32);
    }
    for p in &line.points {
        b.add_point(p.x as i32, (height - p.y) as i32);
    }
    if let Some(tail) = line.tail {
        let p = doc.point(tail)?;
        b.add_point(p.x as i32, (height - p.y) as i32);
    }
    Ok(())
}

fn area_bounds(doc: &Sgd, b: &mut Bounds, refs: &[i32]) -> Result<()> {
    let height = doc.height() as f32;
    for &r in refs {
        match &doc.entry(r.unsigned_abs())?.kind {
            EntryKind::Polyline(line) => polyline_bounds(doc, b, line)?,
            EntryKind::EllipticalArc { p0, p1 } => {
                let x = p0.x;
                let y = height - p0.y;
                let r = (p1.x - x) / 2.0;
                let x = x + r;
                b.add_point((x - r) as i32, (y - r) as i32);
                b.add_point((x + r) as i32, (y + r) as i32);
            }
            _ => {}
        }
    }
    Ok(())
}

fn entry_bounds(doc: &Sgd, b: &mut Bounds, entry: &Entry) -> Result<()> {
    let height = doc.height() as f32;
    match &entry.kind {
        EntryKind::Lasso(points) => {
            for p in points {
                b.add_point(p.x as i32, (height - p.y) as i32);
            }
        }
        EntryKind::ConnectedArea(refs) => {
            for &r in refs {
                if let EntryKind::SimpleArea(srefs) = &doc.entry(r)?.kind {
                    area_bounds(doc, b, srefs)?;
                }
            }
        }
        EntryKind::SimpleArea(refs) => area_bounds(doc, b, refs)?,
        _ => {}
    }
    Ok(())
}

/// Accumulate the crop rectangle of `set` into `b`.
pub fn set_bounds(doc: &Sgd, b: &mut Bounds, set: &Entry) -> Result<()> {
    let Some(set) = set.as_set() else {
        return Ok(());
    };

    // Wrapper-class sets contribute no geometry of their own.
    if set.flags & !SET_DRAWN != SET_WRAPPER_CLASS {
        let mut min_b = Bounds::EMPTY;
        let mut max_b = Bounds::EMPTY;
        let mut min_area = i64::MAX;
        let mut last_shape: i32 = 0;
        let mut saw_text = false;

        let children = &set.children;
        let mut i = 0;
        while i < children.len() {
            let start = i;
            let mut eb = Bounds::EMPTY;
            let mut shape: i32 = 0;

            while i < children.len() {
                let entry = doc.entry(children[i])?;
                if matches!(entry.kind, EntryKind::TextLine(_)) {
                    if saw_text {
                        break;
                    }
                    saw_text = true;
                    i += 1;
                    continue;
                }
                entry_bounds(doc, &mut eb, entry)?;
                let class = shape_class(doc, entry)?;
                if class != 0 {
                    shape = shape.wrapping_add(1 << (8 * (class - 1)));
                }
                i += 1;
            }
            let run_end = i;
            // Consume the delimiting text line.
            i += 1;

            if shape == 0 {
                continue;
            }
            if last_shape == 0 {
                last_shape = shape;
            } else if last_shape != shape {
                last_shape = -1;
            }

            for &child in &children[start..run_end] {
                let entry = doc.entry(child)?;
                if entry.is_set() {
                    set_bounds(doc, &mut eb, entry)?;
                }
            }

            let t = b.union(&eb);
            let area = t.area();
            if area < min_area {
                min_b = t;
                min_area = area;
            }
            max_b = max_b.union(&t);
        }

        if last_shape == -1 {
            if !max_b.is_empty() {
                *b = max_b;
                return Ok(());
            }
        } else if !min_b.is_empty() {
            *b = min_b;
            return Ok(());
        }
    }

    for &child in &set.children {
        let entry = doc.entry(child)?;
        if entry.is_set() {
            set_bounds(doc, b, entry)?;
        }
    }
    Ok(())
}

/// Seed still-empty bounds from the first named annotation's area, then
/// expand toward the canvas edges and clamp.
pub fn finalize_bounds(doc: &Sgd, b: &mut Bounds, set: &Entry) -> Result<()> {
    let (width, height) = (doc.width() as i32, doc.height() as i32);
    if b.is_empty() {
        if let Some(set) = set.as_set() {
            for pair in set.children.windows(2) {
                let first = doc.entry(pair[0])?;
                let second = doc.entry(pair[1])?;
                if let (EntryKind::TextLine(line), EntryKind::SimpleArea(_)) =
                    (&first.kind, &second.kind)
                {
                    if !line.text.contains('-') {
                        entry_bounds(doc, b, second)?;
                        break;
                    }
                }
            }
        }
    }
    b.expand(width, height);
    b.clamp(width, height);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Builder;
    use pal::Palette;

    fn decode(builder: &Builder) -> Result<Sgd> {
        Sgd::from_bytes(&builder.build(), &Palette::substitute())
    }

    #[test]
    fn bounds_primitives() {
        let mut b = Bounds::EMPTY;
        assert!(b.is_empty());
        assert_eq!(b.area(), 0);
        b.add_point(10, 20);
        b.add_point(4, 30);
        assert_eq!(
            b,
            Bounds {
                min_x: 4,
                min_y: 20,
                max_x: 10,
                max_y: 30
            }
        );
        assert_eq!(b.area(), 7 * 11);
    }

    #[test]
    fn expand_stops_at_canvas_edges() {
        let mut b = Bounds {
            min_x: 10,
            min_y: 100,
            max_x: 20,
            max_y: 120,
        };
        b.expand(200, 300);
        // x expansion limited by the left margin, y by the full margin.
        assert_eq!(
            b,
            Bounds {
                min_x: 0,
                min_y: 25,
                max_x: 30,
                max_y: 195
            }
        );
    }

    #[test]
    fn lasso_bounds_expand_by_margin() -> Result<()> {
        let mut builder = Builder::new(512, 512);
        builder
            .lasso(1, &[(200.0, 200.0), (300.0, 200.0), (300.0, 300.0)])
            .set(2, 0, &[1]);
        let doc = decode(&builder)?;
        let set = &doc.entries()[1];
        let mut b = Bounds::EMPTY;
        set_bounds(&doc, &mut b, set)?;
        // Screen y flips: 512 - 300 = 212, 512 - 200 = 312.
        assert_eq!(
            b,
            Bounds {
                min_x: 200,
                min_y: 212,
                max_x: 300,
                max_y: 312
            }
        );
        finalize_bounds(&doc, &mut b, set)?;
        assert_eq!(
            b,
            Bounds {
                min_x: 125,
                min_y: 137,
                max_x: 375,
                max_y: 387
            }
        );
        Ok(())
    }

    #[test]
    fn matching_runs_take_minimum_area_union() -> Result<()> {
        // Three runs delimited by text lines; two lassos of different
        // sizes and an empty run. Identical shape signatures select the
        // smallest union, not the union of everything.
        let mut builder = Builder::new(1024, 1024);
        builder
            .lasso(1, &[(0.0, 924.0), (100.0, 1024.0)])
            .lasso(2, &[(500.0, 1004.0), (520.0, 1024.0)])
            .text(3, 0.0, 0.0, "T1")
            .text(4, 0.0, 0.0, "T2")
            .text(5, 0.0, 0.0, "T3")
            .set(6, 0, &[3, 1, 4, 2, 5]);
        let doc = decode(&builder)?;
        let set = &doc.entries()[5];
        let mut b = Bounds::EMPTY;
        set_bounds(&doc, &mut b, set)?;
        // The 20x20 lasso wins over the 100x100 one.
        assert_eq!(
            b,
            Bounds {
                min_x: 500,
                min_y: 0,
                max_x: 520,
                max_y: 20
            }
        );
        Ok(())
    }

    #[test]
    fn mixed_runs_take_the_full_union() -> Result<()> {
        let mut builder = Builder::new(1024, 1024);
        builder
            .lasso(1, &[(0.0, 924.0), (100.0, 1024.0)])
            .point(2, 500.0, 1004.0)
            .point(3, 520.0, 1024.0)
            .polyline(4, 2, 3, &[])
            .simple_area(5, &[4])
            .text(6, 0.0, 0.0, "T1")
            .text(7, 0.0, 0.0, "T2")
            .set(8, 0, &[6, 1, 7, 5]);
        let doc = decode(&builder)?;
        let set = &doc.entries()[7];
        let mut b = Bounds::EMPTY;
        set_bounds(&doc, &mut b, set)?;
        // Lasso run and polyline-area run disagree: union of both.
        assert_eq!(
            b,
            Bounds {
                min_x: 0,
                min_y: 0,
                max_x: 520,
                max_y: 100
            }
        );
        Ok(())
    }

    #[test]
    fn wrapper_class_sets_defer_to_children() -> Result<()> {
        let mut builder = Builder::new(256, 256);
        builder
            .lasso(1, &[(10.0, 236.0), (20.0, 246.0)])
            .lasso(2, &[(200.0, 6.0), (250.0, 56.0)])
            .set(3, 0, &[1])
            .set(4, 0x79, &[2, 3]);
        let doc = decode(&builder)?;
        let wrapper = &doc.entries()[3];
        let mut b = Bounds::EMPTY;
        set_bounds(&doc, &mut b, wrapper)?;
        // The wrapper's own lasso (entry 2) is skipped; only the child
        // set's geometry counts.
        assert_eq!(
            b,
            Bounds {
                min_x: 10,
                min_y: 10,
                max_x: 20,
                max_y: 20
            }
        );
        Ok(())
    }

    #[test]
    fn arc_only_areas_carry_no_shape_but_have_extent() -> Result<()> {
        let mut builder = Builder::new(256, 256);
        builder
            .arc(1, (100.0, 156.0), (140.0, 156.0))
            .simple_area(2, &[1])
            .set(3, 0, &[2]);
        let doc = decode(&builder)?;
        let set = &doc.entries()[2];
        let mut b = Bounds::EMPTY;
        set_bounds(&doc, &mut b, set)?;
        // The run has extent but classifies as no-shape, so nothing is
        // selected.
        assert!(b.is_empty());
        Ok(())
    }

    #[test]
    fn empty_bounds_seed_from_named_annotation_area() -> Result<()> {
        let mut builder = Builder::new(256, 256);
        builder
            .point(1, 30.0, 226.0)
            .point(2, 50.0, 206.0)
            .polyline(3, 1, 2, &[])
            .simple_area(4, &[3])
            .text(5, 0.0, 0.0, "NAME")
            .set(6, 0, &[5, 4]);
        let doc = decode(&builder)?;
        let set = &doc.entries()[5];
        let mut b = Bounds::EMPTY;
        // A single-run set: the run's own bounds are selected, so force
        // the seed path by leaving set_bounds out entirely.
        finalize_bounds(&doc, &mut b, set)?;
        // Seeded from the simple area (30..50 x flipped 30..50), then
        // expanded by 30 (left margin limits x) and 30 in y.
        assert_eq!(
            b,
            Bounds {
                min_x: 0,
                min_y: 0,
                max_x: 80,
                max_y: 80
            }
        );
        Ok(())
    }

    #[test]
    fn reversed_area_references_resolve_through_abs() -> Result<()> {
        let mut builder = Builder::new(128, 128);
        builder
            .point(1, 5.0, 123.0)
            .point(2, 25.0, 103.0)
            .polyline(3, 1, 2, &[])
            .simple_area(4, &[-3])
            .set(5, 0, &[4]);
        let doc = decode(&builder)?;
        let set = &doc.entries()[4];
        let mut b = Bounds::EMPTY;
        set_bounds(&doc, &mut b, set)?;
        assert_eq!(
            b,
            Bounds {
                min_x: 5,
                min_y: 5,
                max_x: 25,
                max_y: 25
            }
        );
        Ok(())
    }
}
