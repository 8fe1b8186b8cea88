/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! The image variables of the kernel this code is linked into.
//!
//! Every symbol below is passed as a memory address; what it points to is
//! irrelevant. ONLY take the ADDRESS of these variables and *IN NO CASE ACCESS
//! THE VALUE EVEN FOR READING*: before the kernel mapping exists, most of them
//! point to nowhere.

#![allow(non_upper_case_globals)]

use core::ptr::addr_of;

use crate::mem::VAddr;
use crate::vars::ImageVars;

unsafe extern "C" {
    static __pi_init_idmap_pg_dir: u8;
    static __pi_init_idmap_pg_end: u8;
    static __pi_init_pg_dir: u8;
    static __pi_init_pg_end: u8;
    static __pi_swapper_pg_dir: u8;

    /// The first byte of the kernel image; guaranteed to be page-aligned.
    static __pi__text: u8;
    static __pi__stext: u8;
    static __pi__etext: u8;
    static __pi___start_rodata: u8;
    static __pi___inittext_begin: u8;
    static __pi___inittext_end: u8;
    static __pi___initdata_begin: u8;
    static __pi___initdata_end: u8;
    static __pi__data: u8;
    static __pi___bss_start: u8;

    /// The first byte past the kernel image.
    static __pi__end: u8;
}

macro_rules! addr {
    ($sym:ident) => {
        VAddr::from(unsafe { addr_of!($sym) })
    };
}

/// The layout of the running image, as resolved by the final link.
#[inline]
pub fn image_vars() -> ImageVars {
    ImageVars {
        init_idmap_pg_dir: addr!(__pi_init_idmap_pg_dir),
        init_idmap_pg_end: addr!(__pi_init_idmap_pg_end),
        init_pg_dir: addr!(__pi_init_pg_dir),
        init_pg_end: addr!(__pi_init_pg_end),
        swapper_pg_dir: addr!(__pi_swapper_pg_dir),
        text: addr!(__pi__text),
        stext: addr!(__pi__stext),
        etext: addr!(__pi__etext),
        start_rodata: addr!(__pi___start_rodata),
        inittext_begin: addr!(__pi___inittext_begin),
        inittext_end: addr!(__pi___inittext_end),
        initdata_begin: addr!(__pi___initdata_begin),
        initdata_end: addr!(__pi___initdata_end),
        data: addr!(__pi__data),
        bss_start: addr!(__pi___bss_start),
        end: addr!(__pi__end),
    }
}

#[inline]
pub fn kernel_image() -> core::ops::Range<VAddr> {
    image_vars().kernel_image()
}
