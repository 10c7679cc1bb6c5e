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

//! Thin "draw text at a baseline" adapter over the system font stack.
//! Glyph coverage darkens the alpha channel of the label mask the same
//! way a source-operator fill would.

use log::warn;
use rusttype::{point, Font, Scale};
use tiny_skia::Pixmap;

pub struct TextPainter {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl TextPainter {
    /// Look up a generic bold sans-serif among the system fonts. When no
    /// usable face exists the painter draws nothing.
    pub fn bold_sans(size: f32) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let face = db.query(&fontdb::Query {
            families: &[fontdb::Family::SansSerif],
            weight: fontdb::Weight::BOLD,
            stretch: fontdb::Stretch::Normal,
            style: fontdb::Style::Normal,
        });
        let font = face.and_then(|id| {
            db.with_face_data(id, |data, face_index| {
                Font::try_from_vec_and_index(data.to_vec(), face_index)
            })
            .flatten()
        });
        if font.is_none() {
            warn!("no system sans-serif font found; text labels will be blank");
        }
        Self {
            font,
            scale: Scale::uniform(size),
        }
    }

    /// A painter that draws nothing; keeps test output independent of the
    /// host's font installation.
    pub fn disabled() -> Self {
        Self {
            font: None,
            scale: Scale::uniform(1.0),
        }
    }

    /// Draw `text` with its baseline starting at (x, y), in mask space.
    pub fn draw(&self, pixmap: &mut Pixmap, x: f32, y: f32, text: &str) {
        let Some(font) = self.font.as_ref() else {
            return;
        };
        let width = pixmap.width() as i32;
        let height = pixmap.height() as i32;
        let data = pixmap.data_mut();
        for glyph in font.layout(text, self.scale, point(x, y)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px >= 0 && px < width && py >= 0 && py < height {
                    // Only the alpha byte carries mask state; the color
                    // stays premultiplied black.
                    let at = (py * width + px) as usize * 4 + 3;
                    data[at] = (f32::from(data[at]) * (1.0 - coverage)) as u8;
                }
            });
        }
    }
}
