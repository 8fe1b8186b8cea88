/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! Image variables shared between the kernel image and its position
//! independent early-boot code.
//!
//! The early-boot code (everything under the `__pi_` prefix) runs before the
//! kernel is mapped at its final address, and is built as if it were a
//! standalone unit. It reaches the page-table roots and section boundaries of
//! the final image through `__pi_` aliases, which the final link provides
//! unless the early-boot code defines them itself.

#![cfg_attr(not(test), no_std)]

#![allow(unused_unsafe)]

extern crate alloc;

pub mod logging;
pub mod sync;
pub mod mem;
pub mod symbol;
pub mod alias;
pub mod link;
pub mod script;
pub mod elf;
pub mod vars;

pub use crate::alias::{AliasDecl, AliasError, AliasRegistry, IMAGE_VARS};
pub use crate::link::{LinkError, LinkUnit, LinkedImage, Linker};
pub use crate::mem::VAddr;
pub use crate::symbol::{Section, Symbol, SymbolName, PI_PREFIX};
pub use crate::vars::{ImageVars, VarsError};
