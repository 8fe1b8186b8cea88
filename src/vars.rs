/******************************************************************************
 * Copyright © 2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>             *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::ops::Range;
use thiserror_no_std::Error;

use crate::link::LinkedImage;
use crate::mem::VAddr;

/// The layout of the final kernel image, as seen by the early-boot code.
///
/// These are link-time virtual addresses of the final mapping. Before the MMU
/// is set up, none of them can be dereferenced: only their differences are
/// meaningful.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageVars {
    pub init_idmap_pg_dir: VAddr,
    pub init_idmap_pg_end: VAddr,
    pub init_pg_dir: VAddr,
    pub init_pg_end: VAddr,
    pub swapper_pg_dir: VAddr,

    pub text: VAddr,
    pub stext: VAddr,
    pub etext: VAddr,
    pub start_rodata: VAddr,
    pub inittext_begin: VAddr,
    pub inittext_end: VAddr,
    pub initdata_begin: VAddr,
    pub initdata_end: VAddr,
    pub data: VAddr,
    pub bss_start: VAddr,
    pub end: VAddr,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarsError {
    #[error("image variable '{0}' is not defined")]
    Missing(&'static str),

    #[error("'{lower}' ({lower_addr}) lies above '{upper}' ({upper_addr})")]
    Misordered {
        lower: &'static str,
        lower_addr: VAddr,
        upper: &'static str,
        upper_addr: VAddr,
    },

    #[error("page table '{0}' at {1} is not page-aligned")]
    Misaligned(&'static str, VAddr),

    #[error("page table '{0}' lies outside of the kernel image")]
    OutsideImage(&'static str),
}

impl ImageVars {
    /// Reads the `__pi_` names of a linked image, i.e. what the early-boot
    /// code resolves, whether they were provided or defined explicitly.
    pub fn from_image(image: &LinkedImage<'_>) -> Result<Self, VarsError> {
        let get = |name: &'static str| {
            image.address(name).ok_or(VarsError::Missing(name))
        };

        Ok(Self {
            init_idmap_pg_dir: get("__pi_init_idmap_pg_dir")?,
            init_idmap_pg_end: get("__pi_init_idmap_pg_end")?,
            init_pg_dir: get("__pi_init_pg_dir")?,
            init_pg_end: get("__pi_init_pg_end")?,
            swapper_pg_dir: get("__pi_swapper_pg_dir")?,
            text: get("__pi__text")?,
            stext: get("__pi__stext")?,
            etext: get("__pi__etext")?,
            start_rodata: get("__pi___start_rodata")?,
            inittext_begin: get("__pi___inittext_begin")?,
            inittext_end: get("__pi___inittext_end")?,
            initdata_begin: get("__pi___initdata_begin")?,
            initdata_end: get("__pi___initdata_end")?,
            data: get("__pi__data")?,
            bss_start: get("__pi___bss_start")?,
            end: get("__pi__end")?,
        })
    }

    /// Checks the layout is one the early-boot code can map: section
    /// boundaries in increasing order, page tables page-aligned and inside the
    /// image.
    pub fn validate(&self) -> Result<(), VarsError> {
        let boundaries = [
            ("_text", self.text),
            ("_stext", self.stext),
            ("_etext", self.etext),
            ("__start_rodata", self.start_rodata),
            ("__inittext_begin", self.inittext_begin),
            ("__inittext_end", self.inittext_end),
            ("__initdata_begin", self.initdata_begin),
            ("__initdata_end", self.initdata_end),
            ("_data", self.data),
            ("__bss_start", self.bss_start),
            ("_end", self.end),
        ];

        for pair in boundaries.windows(2) {
            let (lower, lower_addr) = pair[0];
            let (upper, upper_addr) = pair[1];

            if lower_addr > upper_addr {
                return Err(VarsError::Misordered {
                    lower,
                    lower_addr,
                    upper,
                    upper_addr,
                });
            }
        }

        let page_tables = [
            ("init_idmap_pg_dir", self.init_idmap_pg(), "init_idmap_pg_end"),
            ("init_pg_dir", self.init_pg(), "init_pg_end"),
            ("swapper_pg_dir", self.swapper_pg_dir..self.swapper_pg_dir, "swapper_pg_dir"),
        ];
        let image = self.kernel_image();

        for (dir, range, end) in page_tables {
            if !range.start.is_page_aligned() {
                return Err(VarsError::Misaligned(dir, range.start));
            }
            if range.start > range.end {
                return Err(VarsError::Misordered {
                    lower: dir,
                    lower_addr: range.start,
                    upper: end,
                    upper_addr: range.end,
                });
            }
            if range.start < image.start || range.end > image.end {
                return Err(VarsError::OutsideImage(dir));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn kernel_image(&self) -> Range<VAddr> {
        self.text..self.end
    }

    /// `None` if `_end` lies below `_text`, which [`validate`] rejects.
    ///
    /// [`validate`]: ImageVars::validate
    #[inline]
    pub fn image_size(&self) -> Option<u64> {
        self.end.offset_from(self.text)
    }

    #[inline]
    pub fn text_segment(&self) -> Range<VAddr> {
        self.stext..self.etext
    }

    #[inline]
    pub fn rodata_segment(&self) -> Range<VAddr> {
        self.start_rodata..self.inittext_begin
    }

    #[inline]
    pub fn inittext(&self) -> Range<VAddr> {
        self.inittext_begin..self.inittext_end
    }

    #[inline]
    pub fn initdata(&self) -> Range<VAddr> {
        self.initdata_begin..self.initdata_end
    }

    #[inline]
    pub fn data_segment(&self) -> Range<VAddr> {
        self.data..self.bss_start
    }

    #[inline]
    pub fn bss(&self) -> Range<VAddr> {
        self.bss_start..self.end
    }

    #[inline]
    pub fn init_idmap_pg(&self) -> Range<VAddr> {
        self.init_idmap_pg_dir..self.init_idmap_pg_end
    }

    #[inline]
    pub fn init_pg(&self) -> Range<VAddr> {
        self.init_pg_dir..self.init_pg_end
    }

    /// Where `addr` actually sits when the image was loaded at `load_base`
    /// instead of its link address. `None` if `addr` is not part of the
    /// image.
    pub fn load_address(&self, addr: VAddr, load_base: u64) -> Option<u64> {
        if addr > self.end {
            return None;
        }

        addr.offset_from(self.text)?.checked_add(load_base)
    }
}
