/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::fmt;
use core::fmt::{Debug, Display, Formatter, LowerHex};
use num_integer::Integer;

#[cfg(feature = "linked")]
pub mod load;

pub const PAGE_SIZE: u64 = 4096;

/// A virtual address in the final kernel mapping, as assigned by the linker.
///
/// Link-time addresses are always 64-bit, whatever the host the link model
/// runs on.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VAddr(pub u64);

impl VAddr {
    #[inline]
    pub fn is_page_aligned(self) -> bool {
        Integer::is_multiple_of(&self.0, &PAGE_SIZE)
    }

    /// Returns the distance from `base` to `self`, or `None` if `self` lies
    /// below `base`.
    #[inline]
    pub fn offset_from(self, base: VAddr) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl<T> From<*const T> for VAddr {
    fn from(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }
}

impl Debug for VAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", R(*self))
    }
}

impl Display for VAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Formats an address with a `'` separating its high and low halves, which
/// keeps kernel-half addresses readable in logs.
pub struct R<T>(pub T);

impl LowerHex for R<u64> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        write!(f, "{:08x}", &(self.0 >> 32))?;
        write!(f, "'")?;
        write!(f, "{:08x}", &(self.0 & 0xffffffff))
    }
}

impl LowerHex for R<VAddr> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        R(self.0.0).fmt(f)
    }
}

#[cfg(test)]
mod test {
    use std::format;
    use crate::mem::VAddr;

    #[test]
    fn test_page_aligned() {
        assert!(VAddr(0xffff_8000_0000_0000).is_page_aligned());
        assert!(!VAddr(0x1008).is_page_aligned());
    }

    #[test]
    fn test_offset_from() {
        assert_eq!(VAddr(0x3000).offset_from(VAddr(0x1000)), Some(0x2000));
        assert_eq!(VAddr(0x1000).offset_from(VAddr(0x3000)), None);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(
            format!("{:?}", VAddr(0xffff_8000_0000_1000)),
            "0xffff8000'00001000"
        );
        assert_eq!(format!("{}", VAddr(0x1000)), "0x1000");
    }
}
