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

//! Bounds-checked little-endian views into the container buffer. Every
//! structure in the file is read through these; an address or count that
//! runs past the buffer surfaces as DecodeError::Bounds instead of a
//! panic.

use crate::DecodeError;
use anyhow::Result;
use byteorder::LittleEndian;
use zerocopy::{
    byteorder::{F32, I32, U16, U32},
    FromBytes, LayoutVerified, Unaligned,
};

pub(crate) type Le16 = U16<LittleEndian>;
pub(crate) type Le32 = U32<LittleEndian>;
pub(crate) type LeI32 = I32<LittleEndian>;
pub(crate) type LeF32 = F32<LittleEndian>;

pub(crate) fn view<'a, T>(data: &'a [u8], what: &str) -> Result<&'a T>
where
    T: FromBytes + Unaligned,
{
    Ok(LayoutVerified::<&[u8], T>::new_from_prefix(data)
        .ok_or_else(|| DecodeError::Bounds(format!("{} does not fit in file tail", what)))?
        .0
        .into_ref())
}

pub(crate) fn slice_at<'a, T>(
    data: &'a [u8],
    offset: usize,
    count: usize,
    what: &str,
) -> Result<&'a [T]>
where
    T: FromBytes + Unaligned,
{
    Ok(
        LayoutVerified::<&[u8], [T]>::new_slice_from_prefix(tail(data, offset, what)?, count)
            .ok_or_else(|| DecodeError::Bounds(format!("{} does not fit in file tail", what)))?
            .0
            .into_slice(),
    )
}

pub(crate) fn tail<'a>(data: &'a [u8], offset: usize, what: &str) -> Result<&'a [u8]> {
    data.get(offset..)
        .ok_or_else(|| DecodeError::Bounds(format!("bad {} address {:#x}", what, offset)).into())
}
