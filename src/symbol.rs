/******************************************************************************
 * Copyright © 2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>             *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::fmt;
use core::fmt::{Debug, Display, Formatter};

use crate::mem::VAddr;

/// Prefix reserved for symbols of the position-independent early-boot code.
pub const PI_PREFIX: &str = "__pi_";

/// A link-time symbol name, borrowed from wherever it was read (a static
/// table, a linker script, an object file's string table).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolName<'a>(&'a str);

impl<'a> SymbolName<'a> {
    #[inline]
    pub const fn new(name: &'a str) -> Self {
        Self(name)
    }

    #[inline]
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Whether the name lies in the early-boot `__pi_` namespace.
    #[inline]
    pub fn is_pi(&self) -> bool {
        self.0.starts_with(PI_PREFIX)
    }

    /// The final-image name this early-boot name mirrors, e.g. `_text` for
    /// `__pi__text`.
    pub fn strip_pi(&self) -> Option<SymbolName<'a>> {
        self.0.strip_prefix(PI_PREFIX)
            .filter(|rest| !rest.is_empty())
            .map(SymbolName)
    }

    /// Whether this is something a linker script accepts as a plain symbol
    /// name: `[A-Za-z_.$][A-Za-z0-9_.$]*`.
    pub fn is_valid(&self) -> bool {
        let mut chars = self.0.chars();

        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '$') => (),
            _ => return false,
        }

        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
    }
}

impl Display for SymbolName<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Debug for SymbolName<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

/// Output section a symbol is relative to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Section<'a> {
    /// Not relative to any section, the value is the address itself.
    Absolute,
    Named(&'a str),
}

impl Display for Section<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Section::Absolute => f.write_str("*ABS*"),
            Section::Named(name) => f.write_str(name),
        }
    }
}

/// How a symbol of the linked image came to be defined.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin<'a> {
    /// Defined by the input object named here.
    Explicit { unit: &'a str },

    /// Filled in by an alias declaration, sharing `target`'s address.
    Provided { target: SymbolName<'a> },
}

impl<'a> Origin<'a> {
    /// The input object that defined the symbol, if it was not provided.
    #[inline]
    pub fn unit(&self) -> Option<&'a str> {
        match *self {
            Origin::Explicit { unit } => Some(unit),
            Origin::Provided { .. } => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Symbol<'a> {
    pub name: SymbolName<'a>,
    pub addr: VAddr,
    pub section: Section<'a>,
    pub origin: Origin<'a>,
}

impl Symbol<'_> {
    #[inline]
    pub fn is_provided(&self) -> bool {
        matches!(self.origin, Origin::Provided { .. })
    }
}
