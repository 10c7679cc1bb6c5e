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

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// An open chain of samples, optionally anchored at POINT entities on
/// either end. Index 0 means "no endpoint".
#[derive(Debug, Clone)]
pub struct Polyline {
    pub head: Option<u32>,
    pub tail: Option<u32>,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone)]
pub struct TextLine {
    pub pos: Point,
    pub text: String,
}

/// A selection set: child references by index plus the attribute word that
/// carries the drawn flag and the membership-class discriminator.
#[derive(Debug, Clone)]
pub struct SetEntity {
    pub flags: u32,
    pub children: Vec<u32>,
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Point(Point),
    Polyline(Polyline),
    /// Two control points describing a circle: center is p0 shifted right
    /// by half the x span, radius is half the x span.
    EllipticalArc {
        p0: Point,
        p1: Point,
    },
    /// A closed polygon of inline samples.
    Lasso(Vec<Point>),
    TextLine(TextLine),
    /// Signed polyline references; a negative index reverses traversal of
    /// the referenced polyline.
    SimpleArea(Vec<i32>),
    /// SIMPLE_AREA references composing a fill with holes.
    ConnectedArea(Vec<u32>),
    Set(SetEntity),
    /// Entity types we do not interpret; kept so index references resolve.
    Unrecognized(u16),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub index: u32,
    /// Nonzero "unk3" header flag: the entity takes part in the label
    /// overlay of the base image.
    pub labeled: bool,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_set(&self) -> bool {
        matches!(self.kind, EntryKind::Set(_))
    }

    pub fn as_set(&self) -> Option<&SetEntity> {
        match &self.kind {
            EntryKind::Set(set) => Some(set),
            _ => None,
        }
    }
}
