/******************************************************************************
 * Copyright © 2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>             *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! The registry of `__pi_` aliases.
//!
//! The early-boot code is built as if it were a standalone relocatable unit
//! and only ever refers to the image layout through `__pi_`-prefixed names.
//! Each declaration states that such a name, when nothing else defines it,
//! takes the address of its counterpart in the final kernel image. An explicit
//! definition of the prefixed name always wins over the alias.

use arrayvec::ArrayVec;
use thiserror_no_std::Error;

use crate::symbol::SymbolName;

/// Default capacity of an [`AliasRegistry`].
pub const DEFAULT_CAPACITY: usize = 32;

/// The image variables the early-boot code needs from the final image, as
/// `(alias, target)` pairs: page-table roots first, then section boundaries.
pub const IMAGE_VARS: [(&str, &str); 16] = [
    ("__pi_init_idmap_pg_dir",  "init_idmap_pg_dir"),
    ("__pi_init_idmap_pg_end",  "init_idmap_pg_end"),
    ("__pi_init_pg_dir",        "init_pg_dir"),
    ("__pi_init_pg_end",        "init_pg_end"),
    ("__pi_swapper_pg_dir",     "swapper_pg_dir"),

    ("__pi__text",              "_text"),
    ("__pi__stext",             "_stext"),
    ("__pi__etext",             "_etext"),
    ("__pi___start_rodata",     "__start_rodata"),
    ("__pi___inittext_begin",   "__inittext_begin"),
    ("__pi___inittext_end",     "__inittext_end"),
    ("__pi___initdata_begin",   "__initdata_begin"),
    ("__pi___initdata_end",     "__initdata_end"),
    ("__pi__data",              "_data"),
    ("__pi___bss_start",        "__bss_start"),
    ("__pi__end",               "_end"),
];

/// "Define `alias` as `target` unless something already defines `alias`."
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AliasDecl<'a> {
    alias: SymbolName<'a>,
    target: SymbolName<'a>,
}

impl<'a> AliasDecl<'a> {
    #[inline]
    pub fn alias(&self) -> SymbolName<'a> {
        self.alias
    }

    #[inline]
    pub fn target(&self) -> SymbolName<'a> {
        self.target
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError<'a> {
    #[error("invalid symbol name '{0}'")]
    InvalidName(&'a str),

    #[error("alias '{0}' is outside the '__pi_' namespace")]
    NotPositionIndependent(SymbolName<'a>),

    #[error("alias target '{0}' belongs to the '__pi_' namespace")]
    TargetInEarlyNamespace(SymbolName<'a>),

    #[error("alias '{0}' is declared more than once")]
    DuplicateAlias(SymbolName<'a>),

    #[error("alias registry is full ({0} declarations)")]
    RegistryFull(usize),
}

/// An ordered, fixed-capacity set of alias declarations. It does not allocate
/// so it can be built before any allocator exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasRegistry<'a, const N: usize = DEFAULT_CAPACITY> {
    decls: ArrayVec<AliasDecl<'a>, N>,
}

impl AliasRegistry<'static> {
    /// The registry the final image link script includes.
    pub fn image_vars() -> Self {
        let decls = IMAGE_VARS.iter()
            .map(|&(alias, target)| AliasDecl {
                alias: SymbolName::new(alias),
                target: SymbolName::new(target),
            })
            .collect();

        Self { decls }
    }
}

impl<'a, const N: usize> AliasRegistry<'a, N> {
    pub const fn new() -> Self {
        Self {
            decls: ArrayVec::new_const(),
        }
    }

    /// Declares that `alias`, if left undefined by every linked object, is
    /// defined with the address and section of `target`.
    pub fn declare_alias(
        &mut self,
        alias: &'a str,
        target: &'a str,
    ) -> Result<(), AliasError<'a>> {
        let alias = SymbolName::new(alias);
        let target = SymbolName::new(target);

        if !alias.is_valid() {
            return Err(AliasError::InvalidName(alias.as_str()));
        }
        if !target.is_valid() {
            return Err(AliasError::InvalidName(target.as_str()));
        }
        if alias.strip_pi().is_none() {
            return Err(AliasError::NotPositionIndependent(alias));
        }
        if target.is_pi() {
            return Err(AliasError::TargetInEarlyNamespace(target));
        }
        if self.lookup(alias).is_some() {
            return Err(AliasError::DuplicateAlias(alias));
        }

        self.decls.try_push(AliasDecl { alias, target })
            .map_err(|_| AliasError::RegistryFull(N))
    }

    pub fn lookup(&self, alias: SymbolName<'_>) -> Option<&AliasDecl<'a>> {
        self.decls.iter().find(|decl| decl.alias == alias)
    }

    #[inline]
    pub fn target_of(&self, alias: SymbolName<'_>) -> Option<SymbolName<'a>> {
        self.lookup(alias).map(|decl| decl.target)
    }

    /// Declarations in the order they were made, which is the order the
    /// linker evaluates them in.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &AliasDecl<'a>> {
        self.decls.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

impl<const N: usize> Default for AliasRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}
