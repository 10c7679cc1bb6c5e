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

// Rasterization and composition. Masks are 8-bit alpha surfaces carried
// in the alpha channel of a premultiplied-black pixmap. Three semantic
// levels exist: 0 marks holes, 128 shape fill, 255 label fill; the base
// compositor additionally treats any non-255 label-mask value as a
// three-bit gray ramp.
//
// Shape masks fill with the even-odd rule and no anti-aliasing so that
// connected areas cut holes where sub-paths overlap. Pixel coordinates
// are (rint(x), H - rint(y)).

mod text;

pub use crate::text::TextPainter;

use anyhow::{anyhow, Result};
use log::debug;
use pal::PAL_WHITE;
use sgd::{
    finalize_bounds, set_bounds, Bounds, EntryKind, Point, Polyline, SetEntity, Sgd, SET_DRAWN,
    TILE_HEIGHT, TILE_WIDTH,
};
use tiny_skia::{BlendMode, Color, FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

const ALPHA_HOLE: u8 = 0;
const ALPHA_SHAPE: u8 = 128;
const ALPHA_LABEL: u8 = 255;

const LABEL_STROKE_WIDTH: f32 = 2.0;

/// Accumulates path contours in screen coordinates.
struct PathSink {
    pb: PathBuilder,
    open: bool,
    height: f32,
}

impl PathSink {
    fn new(height: f32) -> Self {
        Self {
            pb: PathBuilder::new(),
            open: false,
            height,
        }
    }

    fn line_to(&mut self, p: Point) {
        let x = p.x.round_ties_even();
        let y = self.height - p.y.round_ties_even();
        if self.open {
            self.pb.line_to(x, y);
        } else {
            self.pb.move_to(x, y);
            self.open = true;
        }
    }

    fn circle(&mut self, cx: f32, cy: f32, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.pb.push_circle(cx, cy, radius);
        }
        self.open = false;
    }

    fn break_contour(&mut self) {
        self.open = false;
    }

    fn close(&mut self) {
        if self.open {
            self.pb.close();
            self.open = false;
        }
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.pb.finish()
    }
}

/// Mask surface plus the current fill level, which persists across shapes
/// the way a stateful canvas source color would.
struct MaskPainter<'a> {
    pixmap: &'a mut Pixmap,
    level: u8,
}

impl MaskPainter<'_> {
    fn fill(&mut self, sink: PathSink) {
        if let Some(path) = sink.finish() {
            let mut paint = Paint::default();
            paint.set_color_rgba8(0, 0, 0, self.level);
            paint.anti_alias = false;
            paint.blend_mode = BlendMode::Source;
            self.pixmap
                .fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
        }
    }
}

fn add_polyline(doc: &Sgd, sink: &mut PathSink, line: &Polyline, reverse: bool) -> Result<()> {
    let (first, last) = if reverse {
        (line.tail, line.head)
    } else {
        (line.head, line.tail)
    };
    if let Some(index) = first {
        sink.line_to(doc.point(index)?);
    }
    if reverse {
        for p in line.points.iter().rev() {
            sink.line_to(*p);
        }
    } else {
        for p in &line.points {
            sink.line_to(*p);
        }
    }
    if let Some(index) = last {
        sink.line_to(doc.point(index)?);
    }
    Ok(())
}

/// Append a simple area's perimeter: polylines traversed by signed
/// reference, elliptical arcs inflated to full circles. The fill level
/// follows the last element appended.
fn add_area(doc: &Sgd, sink: &mut PathSink, refs: &[i32], level: &mut u8) -> Result<()> {
    for &r in refs {
        match &doc.entry(r.unsigned_abs())?.kind {
            EntryKind::Polyline(line) => {
                add_polyline(doc, sink, line, r < 0)?;
                *level = ALPHA_SHAPE;
            }
            EntryKind::EllipticalArc { p0, p1 } => {
                let x = p0.x;
                let y = sink.height - p0.y;
                let radius = (p1.x - x) / 2.0;
                sink.circle(x + radius, y, radius);
                *level = ALPHA_LABEL;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Rasterize a set's shape mask: non-SET children first, then child sets.
pub fn render_set_mask(doc: &Sgd, pixmap: &mut Pixmap, set: &SetEntity) -> Result<()> {
    let mut painter = MaskPainter {
        pixmap,
        level: ALPHA_HOLE,
    };
    render_set_mask_r(doc, &mut painter, set)
}

fn render_set_mask_r(doc: &Sgd, painter: &mut MaskPainter, set: &SetEntity) -> Result<()> {
    let height = doc.height() as f32;
    for &child in &set.children {
        match &doc.entry(child)?.kind {
            EntryKind::Lasso(points) => {
                painter.level = ALPHA_SHAPE;
                let mut sink = PathSink::new(height);
                for p in points {
                    sink.line_to(*p);
                }
                painter.fill(sink);
            }
            EntryKind::ConnectedArea(refs) => {
                let mut sink = PathSink::new(height);
                let mut level = painter.level;
                for &r in refs {
                    if let EntryKind::SimpleArea(srefs) = &doc.entry(r)?.kind {
                        sink.break_contour();
                        add_area(doc, &mut sink, srefs, &mut level)?;
                        sink.close();
                    }
                }
                painter.level = level;
                painter.fill(sink);
            }
            EntryKind::SimpleArea(refs) => {
                let mut sink = PathSink::new(height);
                let mut level = painter.level;
                add_area(doc, &mut sink, refs, &mut level)?;
                painter.level = level;
                painter.fill(sink);
            }
            _ => {}
        }
    }
    for &child in &set.children {
        if let EntryKind::Set(child_set) = &doc.entry(child)?.kind {
            render_set_mask_r(doc, painter, child_set)?;
        }
    }
    Ok(())
}

/// Rasterize the label overlay: a white mask with entities carrying the
/// label flag stroked or typeset in black.
pub fn render_labels(doc: &Sgd, text: &TextPainter) -> Result<Vec<u8>> {
    let (width, height) = (doc.width(), doc.height());
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("couldn't allocate {}x{} label mask", width, height))?;
    pixmap.fill(Color::from_rgba8(0, 0, 0, 255));

    let flip = height as f32;
    for entry in doc.entries() {
        if !entry.labeled {
            continue;
        }
        match &entry.kind {
            EntryKind::Polyline(line) => {
                let mut sink = PathSink::new(flip);
                add_polyline(doc, &mut sink, line, false)?;
                if let Some(path) = sink.finish() {
                    let mut paint = Paint::default();
                    paint.set_color_rgba8(0, 0, 0, 0);
                    paint.anti_alias = true;
                    paint.blend_mode = BlendMode::Source;
                    let stroke = Stroke {
                        width: LABEL_STROKE_WIDTH,
                        ..Stroke::default()
                    };
                    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
                }
            }
            EntryKind::TextLine(line) => {
                text.draw(&mut pixmap, line.pos.x, flip - line.pos.y, &line.text);
            }
            _ => {}
        }
    }
    Ok(alpha_channel(&pixmap))
}

/// Compose decoded tiles and the label mask into the palette-indexed base
/// image: untouched pixels take their remapped tile color, label pixels a
/// three-bit gray ramp.
pub fn render_base(doc: &Sgd, label_mask: &[u8]) -> Vec<u8> {
    let raster = doc.raster();
    let (width, height) = (doc.width() as usize, doc.height() as usize);
    let h_tiles = raster.h_tiles() as usize;
    let colormap = raster.colormap();

    let mut image = vec![0u8; width * height];
    for y in 0..height {
        let tile_row = y / TILE_HEIGHT;
        let row_in_tile = y % TILE_HEIGHT;
        for tile_col in 0..h_tiles {
            // The rightmost tile column stores rows at the clamped width.
            let tile_width = TILE_WIDTH.min(width - tile_col * TILE_WIDTH);
            let tile = raster.tile(tile_row * h_tiles + tile_col);
            for k in 0..tile_width {
                let x = tile_col * TILE_WIDTH + k;
                let alpha = label_mask[y * width + x];
                image[y * width + x] = if alpha == 255 {
                    colormap[tile[row_in_tile * tile_width + k] as usize]
                } else {
                    alpha >> 5
                };
            }
        }
    }
    image
}

/// Switch masked pixels to their label-palette variant. White base pixels
/// only switch under full-level mask so shape fills do not wash out the
/// background.
pub fn apply_highlight(image: &mut [u8], mask: &[u8]) {
    for (pixel, &alpha) in image.iter_mut().zip(mask) {
        if alpha != 0 && (*pixel != PAL_WHITE || alpha == 255) {
            *pixel |= 8;
        }
    }
}

/// One emitted per-set image: the full canvas with the set's highlight
/// applied, and the finalized crop rectangle when requested.
pub struct SetRender {
    pub name: String,
    pub pixels: Vec<u8>,
    pub bounds: Option<Bounds>,
}

/// Run the per-set render passes: select named top-level sets, merge
/// same-named candidates, apply each merged mask to a copy of the base
/// image.
pub fn render_sets(doc: &mut Sgd, base: &[u8], with_bounds: bool) -> Result<Vec<SetRender>> {
    doc.fixup_sets()?;
    let doc = &*doc;

    let (width, height) = (doc.width(), doc.height());
    let mut mask = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("couldn't allocate {}x{} set mask", width, height))?;

    // Sets pre-marked drawn on disk never render.
    let mut drawn: Vec<bool> = doc
        .entries()
        .iter()
        .map(|e| matches!(&e.kind, EntryKind::Set(s) if s.flags & SET_DRAWN != 0))
        .collect();

    let mut renders = Vec::new();
    for i in 0..doc.entries().len() {
        let entry = &doc.entries()[i];
        let Some(set) = entry.as_set() else {
            continue;
        };
        if drawn[i] || doc.set_is_subset(i) {
            continue;
        }
        let Some(name) = doc.set_name(set)? else {
            continue;
        };

        mask.fill(Color::TRANSPARENT);
        render_set_mask(doc, &mut mask, set)?;
        let mut bounds = Bounds::EMPTY;
        if with_bounds {
            set_bounds(doc, &mut bounds, entry)?;
        }
        drawn[i] = true;

        // Later candidates with the same normalized name join this pass.
        for j in i + 1..doc.entries().len() {
            let other = &doc.entries()[j];
            let Some(other_set) = other.as_set() else {
                continue;
            };
            if drawn[j] || doc.set_is_subset(j) {
                continue;
            }
            if doc.set_name(other_set)?.as_deref() != Some(name.as_str()) {
                continue;
            }
            render_set_mask(doc, &mut mask, other_set)?;
            if with_bounds {
                set_bounds(doc, &mut bounds, other)?;
            }
            drawn[j] = true;
        }

        let mut pixels = base.to_vec();
        apply_highlight(&mut pixels, &alpha_channel(&mask));
        let bounds = if with_bounds {
            finalize_bounds(doc, &mut bounds, entry)?;
            (!bounds.is_empty()).then_some(bounds)
        } else {
            None
        };
        debug!("set {}: rendered (crop: {:?})", name, bounds);
        renders.push(SetRender {
            name,
            pixels,
            bounds,
        });
    }
    Ok(renders)
}

fn alpha_channel(pixmap: &Pixmap) -> Vec<u8> {
    pixmap.pixels().iter().map(|p| p.alpha()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pal::Palette;
    use sgd::synth::Builder;

    fn decode(builder: &Builder) -> Result<Sgd> {
        Sgd::from_bytes(&builder.build(), &Palette::substitute())
    }

    fn set_mask(doc: &Sgd, position: usize) -> Result<Vec<u8>> {
        let mut pixmap = Pixmap::new(doc.width(), doc.height()).unwrap();
        let set = doc.entries()[position].as_set().unwrap();
        render_set_mask(doc, &mut pixmap, set)?;
        Ok(alpha_channel(&pixmap))
    }

    #[test]
    fn base_composition_maps_label_alpha_to_gray_ramp() -> Result<()> {
        // Palette color 0 is pure white: remaps to working index 7.
        let mut builder = Builder::new(140, 40);
        builder.palette(&[[0xff, 0xff, 0xff]]).tile_fill(0);
        let doc = decode(&builder)?;

        let mut label_mask = vec![255u8; 140 * 40];
        label_mask[0] = 0; // full label coverage
        label_mask[1] = 70; // partial coverage: 70 >> 5 == 2
        let image = render_base(&doc, &label_mask);
        assert_eq!(image[0], 0);
        assert_eq!(image[1], 2);
        assert_eq!(image[2], 7);
        // Rightmost tile column (clamped width) composes too.
        assert_eq!(image[139], 7);
        Ok(())
    }

    #[test]
    fn base_dimensions_follow_the_header() -> Result<()> {
        let doc = decode(&Builder::new(200, 150))?;
        let label_mask = vec![255u8; 200 * 150];
        assert_eq!(render_base(&doc, &label_mask).len(), 200 * 150);
        Ok(())
    }

    #[test]
    fn highlight_respects_the_white_exception() {
        let mut image = vec![3, PAL_WHITE, PAL_WHITE, 3, 5];
        let mask = [128, 128, 255, 0, 255];
        apply_highlight(&mut image, &mask);
        assert_eq!(image, vec![3 | 8, PAL_WHITE, PAL_WHITE | 8, 3, 5 | 8]);
    }

    #[test]
    fn lasso_fills_at_shape_level() -> Result<()> {
        let mut builder = Builder::new(32, 32);
        builder
            .lasso(1, &[(4.0, 4.0), (28.0, 4.0), (28.0, 28.0), (4.0, 28.0)])
            .set(2, 0, &[1]);
        let doc = decode(&builder)?;
        let mask = set_mask(&doc, 1)?;
        assert_eq!(mask[16 * 32 + 16], ALPHA_SHAPE);
        assert_eq!(mask[1 * 32 + 1], ALPHA_HOLE);
        Ok(())
    }

    #[test]
    fn arc_areas_fill_at_label_level() -> Result<()> {
        let mut builder = Builder::new(32, 32);
        builder
            .arc(1, (8.0, 16.0), (24.0, 16.0))
            .simple_area(2, &[1])
            .set(3, 0, &[2]);
        let doc = decode(&builder)?;
        let mask = set_mask(&doc, 2)?;
        // Circle center (16, 16), radius 8.
        assert_eq!(mask[16 * 32 + 16], ALPHA_LABEL);
        assert_eq!(mask[2 * 32 + 2], ALPHA_HOLE);
        Ok(())
    }

    #[test]
    fn signed_references_reverse_polyline_traversal() -> Result<()> {
        // Two horizontal chains; chained forward-forward they outline a
        // rectangle, forward-reversed they cross into a bowtie whose
        // left-center is a hole under even-odd.
        let mut builder = Builder::new(32, 32);
        builder
            .polyline(1, 0, 0, &[(4.0, 4.0), (28.0, 4.0)])
            .polyline(2, 0, 0, &[(28.0, 28.0), (4.0, 28.0)])
            .simple_area(3, &[1, 2])
            .simple_area(4, &[1, -2])
            .set(5, 0, &[3])
            .set(6, 0, &[4]);
        let doc = decode(&builder)?;

        let rect = set_mask(&doc, 4)?;
        assert_eq!(rect[16 * 32 + 6], ALPHA_SHAPE);
        assert_eq!(rect[16 * 32 + 16], ALPHA_SHAPE);

        let bowtie = set_mask(&doc, 5)?;
        assert_eq!(bowtie[16 * 32 + 6], ALPHA_HOLE);
        Ok(())
    }

    #[test]
    fn endpoint_only_polylines_still_draw() -> Result<()> {
        // A triangle from three chains that carry only endpoint
        // references.
        let mut builder = Builder::new(32, 32);
        builder
            .point(1, 4.0, 4.0)
            .point(2, 28.0, 4.0)
            .point(3, 16.0, 28.0)
            .polyline(4, 1, 2, &[])
            .polyline(5, 2, 3, &[])
            .polyline(6, 3, 1, &[])
            .simple_area(7, &[4, 5, 6])
            .set(8, 0, &[7]);
        let doc = decode(&builder)?;
        let mask = set_mask(&doc, 7)?;
        // Triangle interior near the base.
        assert_eq!(mask[25 * 32 + 16], ALPHA_SHAPE);
        assert_eq!(mask[2 * 32 + 2], ALPHA_HOLE);
        Ok(())
    }

    #[test]
    fn connected_areas_cut_holes_where_subpaths_overlap() -> Result<()> {
        let mut builder = Builder::new(32, 32);
        builder
            .polyline(1, 0, 0, &[(4.0, 4.0), (28.0, 4.0), (28.0, 28.0), (4.0, 28.0)])
            .simple_area(2, &[1])
            .polyline(3, 0, 0, &[(12.0, 12.0), (20.0, 12.0), (20.0, 20.0), (12.0, 20.0)])
            .simple_area(4, &[3])
            .connected_area(5, &[2, 4])
            .set(6, 0, &[5]);
        let doc = decode(&builder)?;
        let mask = set_mask(&doc, 5)?;
        assert_eq!(mask[16 * 32 + 6], ALPHA_SHAPE);
        assert_eq!(mask[16 * 32 + 16], ALPHA_HOLE);
        Ok(())
    }

    #[test]
    fn unnamed_sets_produce_no_render() -> Result<()> {
        let mut builder = Builder::new(32, 32);
        builder.set(1, 0, &[]);
        let mut doc = decode(&builder)?;
        let base = vec![7u8; 32 * 32];
        assert!(render_sets(&mut doc, &base, true)?.is_empty());
        Ok(())
    }

    #[test]
    fn same_named_sets_merge_into_one_pass() -> Result<()> {
        let mut builder = Builder::new(64, 64);
        builder
            .lasso(1, &[(4.0, 4.0), (20.0, 4.0), (20.0, 20.0), (4.0, 20.0)])
            .text(2, 0.0, 0.0, "zone 9")
            .set(3, 0, &[1, 2])
            .lasso(4, &[(40.0, 40.0), (60.0, 40.0), (60.0, 60.0), (40.0, 60.0)])
            .text(5, 0.0, 0.0, "ZONE(9)")
            .set(6, 0, &[4, 5]);
        let mut doc = decode(&builder)?;
        let base = vec![0u8; 64 * 64];
        let renders = render_sets(&mut doc, &base, false)?;
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].name, "ZONE9");
        // Both lassos land in the merged highlight.
        let pixels = &renders[0].pixels;
        assert_eq!(pixels[(64 - 12) * 64 + 12], 8);
        assert_eq!(pixels[(64 - 50) * 64 + 50], 8);
        Ok(())
    }

    #[test]
    fn subsets_and_predrawn_sets_are_skipped() -> Result<()> {
        let mut builder = Builder::new(64, 64);
        builder
            .lasso(1, &[(4.0, 4.0), (20.0, 4.0), (20.0, 20.0), (4.0, 20.0)])
            .text(2, 0.0, 0.0, "INNER")
            .set(3, 0, &[1, 2])
            .text(4, 0.0, 0.0, "OUTER")
            .set(5, 0, &[1, 4, 2])
            .text(6, 0.0, 0.0, "SLEEPER")
            .set(7, SET_DRAWN, &[6]);
        let mut doc = decode(&builder)?;
        let base = vec![0u8; 64 * 64];
        let renders = render_sets(&mut doc, &base, false)?;
        assert_eq!(renders.len(), 1);
        // Set 3 is a subset of set 5; set 7 arrived drawn.
        assert_eq!(renders[0].name, "OUTER");
        Ok(())
    }

    #[test]
    fn crop_bounds_expand_and_attach() -> Result<()> {
        let mut builder = Builder::new(512, 512);
        builder
            .lasso(1, &[(200.0, 200.0), (300.0, 200.0), (300.0, 300.0)])
            .text(2, 0.0, 0.0, "HILL")
            .set(3, 0, &[1, 2]);
        let mut doc = decode(&builder)?;
        let base = vec![0u8; 512 * 512];
        let renders = render_sets(&mut doc, &base, true)?;
        assert_eq!(renders.len(), 1);
        let bounds = renders[0].bounds.expect("crop bounds");
        assert_eq!(
            (bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y),
            (125, 137, 375, 387)
        );
        assert_eq!(bounds.width(), 251);
        assert_eq!(bounds.height(), 251);
        Ok(())
    }

    #[test]
    fn render_passes_are_deterministic() -> Result<()> {
        let mut builder = Builder::new(64, 64);
        builder
            .lasso(1, &[(4.0, 4.0), (40.0, 4.0), (40.0, 40.0)])
            .text(2, 0.0, 0.0, "AREA")
            .set(3, 0, &[1, 2]);
        let base = vec![0u8; 64 * 64];

        let mut first = decode(&builder)?;
        let mut second = decode(&builder)?;
        let a = render_sets(&mut first, &base, true)?;
        let b = render_sets(&mut second, &base, true)?;
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].pixels, b[0].pixels);
        assert_eq!(a[0].bounds, b[0].bounds);
        Ok(())
    }
}
