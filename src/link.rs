/******************************************************************************
 * Copyright © 2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>             *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! Link-time symbol resolution of the kernel image.
//!
//! Resolution happens in two phases. First every explicit definition of every
//! input unit is collected; then the alias declarations are evaluated in order
//! and fill in the names still missing. An alias therefore never overrides an
//! explicit definition, and a missing alias target fails the whole link: no
//! image is produced.

use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use thiserror_no_std::Error;

use crate::alias::AliasRegistry;
use crate::mem::VAddr;
use crate::symbol::{Origin, Section, Symbol, SymbolName};
use crate::{debug, info, notice};

/// A definition made by an input object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Definition<'a> {
    pub name: SymbolName<'a>,
    pub addr: VAddr,
    pub section: Section<'a>,
    /// Gives way to any strong definition of the same name.
    pub weak: bool,
}

/// One input object of the link: what it defines and what it expects someone
/// else to define.
#[derive(Clone, Debug, Default)]
pub struct LinkUnit<'a> {
    name: &'a str,
    definitions: Vec<Definition<'a>>,
    references: Vec<SymbolName<'a>>,
}

impl<'a> LinkUnit<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            definitions: Vec::new(),
            references: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn define(
        &mut self,
        name: &'a str,
        addr: VAddr,
        section: Section<'a>,
    ) -> &mut Self {
        self.definitions.push(Definition {
            name: SymbolName::new(name),
            addr,
            section,
            weak: false,
        });
        self
    }

    pub fn define_weak(
        &mut self,
        name: &'a str,
        addr: VAddr,
        section: Section<'a>,
    ) -> &mut Self {
        self.definitions.push(Definition {
            name: SymbolName::new(name),
            addr,
            section,
            weak: true,
        });
        self
    }

    pub fn reference(&mut self, name: &'a str) -> &mut Self {
        self.references.push(SymbolName::new(name));
        self
    }

    #[inline]
    pub fn definitions(&self) -> &[Definition<'a>] {
        &self.definitions
    }

    #[inline]
    pub fn references(&self) -> &[SymbolName<'a>] {
        &self.references
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError<'a> {
    #[error("undefined alias target '{target}' (needed by '{alias}')")]
    UnresolvedAliasTarget {
        alias: SymbolName<'a>,
        target: SymbolName<'a>,
    },

    #[error("multiple definition of '{name}': first in '{first}', again in '{second}'")]
    MultipleDefinition {
        name: SymbolName<'a>,
        first: &'a str,
        second: &'a str,
    },

    #[error("undefined reference to '{name}' in '{unit}'")]
    UndefinedReference {
        name: SymbolName<'a>,
        unit: &'a str,
    },
}

#[derive(Default)]
pub struct Linker<'a> {
    units: Vec<LinkUnit<'a>>,
}

impl<'a> Linker<'a> {
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    pub fn add_unit(&mut self, unit: LinkUnit<'a>) -> &mut Self {
        self.units.push(unit);
        self
    }

    #[inline]
    pub fn units(&self) -> &[LinkUnit<'a>] {
        &self.units
    }

    /// Resolves every unit's symbols together with `registry`'s aliases.
    pub fn link<const N: usize>(
        &self,
        registry: &AliasRegistry<'a, N>,
    ) -> Result<LinkedImage<'a>, LinkError<'a>> {
        let mut image = LinkedImage::default();

        for unit in &self.units {
            for def in unit.definitions() {
                image.insert_explicit(unit.name(), def)?;
            }
        }

        let nr_explicit = image.symbols.len();

        for decl in registry.iter() {
            if let Some(existing) = image.symbol(decl.alias()) {
                notice!("{} defined by '{}' at {:?}, alias to {} ignored",
                        decl.alias(), existing.origin.unit().unwrap_or("?"),
                        existing.addr, decl.target());
                image.overridden.push(decl.alias());
                continue;
            }

            let target = image.symbol(decl.target())
                .copied()
                .ok_or(LinkError::UnresolvedAliasTarget {
                    alias: decl.alias(),
                    target: decl.target(),
                })?;

            debug!("PROVIDE {} = {} ({:?} in {})",
                   decl.alias(), decl.target(), target.addr, target.section);
            image.push(Symbol {
                name: decl.alias(),
                addr: target.addr,
                section: target.section,
                origin: Origin::Provided { target: decl.target() },
            });
        }

        for unit in &self.units {
            if let Some(&name) = unit.references().iter()
                .find(|&&name| image.symbol(name).is_none())
            {
                return Err(LinkError::UndefinedReference {
                    name,
                    unit: unit.name(),
                });
            }
        }

        info!("linked {} units: {} symbols, {} provided, {} overridden",
              self.units.len(), nr_explicit,
              image.symbols.len() - nr_explicit, image.overridden.len());

        Ok(image)
    }
}

/// The frozen symbol table of a successful link.
#[derive(Clone, Debug, Default)]
pub struct LinkedImage<'a> {
    symbols: Vec<Symbol<'a>>,
    index: HashMap<&'a str, usize>,
    weak: HashSet<&'a str>,
    overridden: Vec<SymbolName<'a>>,
}

impl<'a> LinkedImage<'a> {
    /// Adds `def`, made by `unit`. A strong definition replaces a weak one;
    /// among weak definitions the first one stays.
    fn insert_explicit(
        &mut self,
        unit: &'a str,
        def: &Definition<'a>,
    ) -> Result<(), LinkError<'a>> {
        let symbol = Symbol {
            name: def.name,
            addr: def.addr,
            section: def.section,
            origin: Origin::Explicit { unit },
        };

        let Some(&idx) = self.index.get(def.name.as_str()) else {
            if def.weak {
                self.weak.insert(def.name.as_str());
            }
            self.push(symbol);
            return Ok(());
        };

        let existing = &self.symbols[idx];
        let first = existing.origin.unit().unwrap_or("?");

        if def.weak {
            debug!("weak {} of '{}' ignored, already defined by '{}'",
                   def.name, unit, first);
        } else if self.weak.remove(def.name.as_str()) {
            debug!("{} of '{}' overrides weak definition of '{}'",
                   def.name, unit, first);
            self.symbols[idx] = symbol;
        } else {
            return Err(LinkError::MultipleDefinition {
                name: def.name,
                first,
                second: unit,
            });
        }

        Ok(())
    }

    fn push(&mut self, symbol: Symbol<'a>) {
        self.index.insert(symbol.name.as_str(), self.symbols.len());
        self.symbols.push(symbol);
    }

    pub fn symbol(&self, name: SymbolName<'_>) -> Option<&Symbol<'a>> {
        self.index.get(name.as_str()).map(|&idx| &self.symbols[idx])
    }

    #[inline]
    pub fn address(&self, name: &str) -> Option<VAddr> {
        self.symbol(SymbolName::new(name)).map(|sym| sym.addr)
    }

    /// All symbols: explicit definitions in unit order, then provided aliases
    /// in declaration order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Symbol<'a>> {
        self.symbols.iter()
    }

    #[inline]
    pub fn provided(&self) -> impl Iterator<Item = &Symbol<'a>> {
        self.symbols.iter().filter(|sym| sym.is_provided())
    }

    /// Aliases that were not applied because some unit defined the name.
    #[inline]
    pub fn overridden(&self) -> &[SymbolName<'a>] {
        &self.overridden
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl PartialEq for LinkedImage<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.symbols == other.symbols && self.overridden == other.overridden
    }
}

impl Eq for LinkedImage<'_> {}

#[cfg(test)]
mod test {
    use crate::alias::{AliasRegistry, IMAGE_VARS};
    use crate::link::{LinkError, LinkUnit, Linker};
    use crate::mem::VAddr;
    use crate::symbol::{Origin, Section, SymbolName};

    /// A final image defining every target of the image-vars table, 64 KiB
    /// apart from each other.
    fn vmlinux() -> LinkUnit<'static> {
        let mut unit = LinkUnit::new("vmlinux.o");

        for (i, &(_, target)) in IMAGE_VARS.iter().enumerate() {
            let section = if i < 5 {
                Section::Named(".bss..page_aligned")
            } else {
                Section::Named(".text")
            };
            unit.define(target, VAddr(0xffff_8000_0000_0000 + (i as u64) * 0x10000), section);
        }

        unit
    }

    #[test]
    fn it_provides_aliases_of_text_and_end() {
        let mut registry: AliasRegistry = AliasRegistry::new();
        registry.declare_alias("__pi__text", "_text").unwrap();
        registry.declare_alias("__pi__end", "_end").unwrap();

        let mut vmlinux = LinkUnit::new("vmlinux.o");
        vmlinux
            .define("_text", VAddr(0x1000), Section::Named(".head.text"))
            .define("_end", VAddr(0x9000), Section::Absolute);

        let mut linker = Linker::new();
        linker.add_unit(vmlinux);
        let image = linker.link(&registry).unwrap();

        assert_eq!(image.address("__pi__text"), Some(VAddr(0x1000)));
        assert_eq!(image.address("__pi__end"), Some(VAddr(0x9000)));
        assert_eq!(image.provided().count(), 2);
        assert!(image.overridden().is_empty());
    }

    #[test]
    fn aliases_share_address_and_section() {
        let mut linker = Linker::new();
        linker.add_unit(vmlinux());
        let image = linker.link(&AliasRegistry::image_vars()).unwrap();

        assert_eq!(image.len(), 2 * IMAGE_VARS.len());
        for (alias, target) in IMAGE_VARS {
            let alias = image.symbol(SymbolName::new(alias)).unwrap();
            let target = image.symbol(SymbolName::new(target)).unwrap();

            assert_eq!(alias.addr, target.addr);
            assert_eq!(alias.section, target.section);
            assert_eq!(alias.origin, Origin::Provided { target: target.name });
        }
    }

    #[test]
    fn explicit_definition_wins_over_alias() {
        let mut pi = LinkUnit::new("pi.o");
        pi.define("__pi_swapper_pg_dir", VAddr(0x2000), Section::Named(".bss"));

        let mut vmlinux = LinkUnit::new("vmlinux.o");
        vmlinux.define("swapper_pg_dir", VAddr(0x5000), Section::Named(".rodata"));

        let mut registry: AliasRegistry = AliasRegistry::new();
        registry.declare_alias("__pi_swapper_pg_dir", "swapper_pg_dir").unwrap();

        let mut linker = Linker::new();
        linker.add_unit(pi).add_unit(vmlinux);
        let image = linker.link(&registry).unwrap();

        let sym = image.symbol(SymbolName::new("__pi_swapper_pg_dir")).unwrap();
        assert_eq!(sym.addr, VAddr(0x2000));
        assert_eq!(sym.section, Section::Named(".bss"));
        assert_eq!(sym.origin, Origin::Explicit { unit: "pi.o" });
        assert_eq!(image.overridden(), [SymbolName::new("__pi_swapper_pg_dir")]);
        assert_eq!(image.provided().count(), 0);
    }

    #[test]
    fn overridden_alias_does_not_need_its_target() {
        let mut pi = LinkUnit::new("pi.o");
        pi.define("__pi__text", VAddr(0x40_0000), Section::Named(".text"));

        let mut registry: AliasRegistry = AliasRegistry::new();
        registry.declare_alias("__pi__text", "_text").unwrap();

        let mut linker = Linker::new();
        linker.add_unit(pi);
        let image = linker.link(&registry).unwrap();

        assert_eq!(image.address("__pi__text"), Some(VAddr(0x40_0000)));
        assert_eq!(image.address("_text"), None);
    }

    #[test]
    fn missing_target_fails_the_link() {
        let mut vmlinux = vmlinux();
        vmlinux.definitions.retain(|def| def.name.as_str() != "__initdata_end");

        let mut linker = Linker::new();
        linker.add_unit(vmlinux);

        assert_eq!(
            linker.link(&AliasRegistry::image_vars()),
            Err(LinkError::UnresolvedAliasTarget {
                alias: SymbolName::new("__pi___initdata_end"),
                target: SymbolName::new("__initdata_end"),
            })
        );
    }

    #[test]
    fn unresolved_error_names_the_target() {
        let err = LinkError::UnresolvedAliasTarget {
            alias: SymbolName::new("__pi__data"),
            target: SymbolName::new("_data"),
        };

        assert_eq!(
            std::format!("{}", err),
            "undefined alias target '_data' (needed by '__pi__data')"
        );
    }

    #[test]
    fn linking_is_deterministic() {
        let mut pi = LinkUnit::new("pi.o");
        pi.define("__pi_init_pg_dir", VAddr(0x8000), Section::Named(".bss"))
            .reference("__pi__text")
            .reference("__pi_swapper_pg_dir");

        let mut linker = Linker::new();
        linker.add_unit(pi).add_unit(vmlinux());

        let registry = AliasRegistry::image_vars();
        let first = linker.link(&registry).unwrap();
        let second = linker.link(&registry).unwrap();

        assert_eq!(first, second);
        let names: std::vec::Vec<_> = first.provided()
            .map(|sym| sym.name.as_str())
            .collect();
        let expected: std::vec::Vec<_> = IMAGE_VARS.iter()
            .map(|&(alias, _)| alias)
            .filter(|&alias| alias != "__pi_init_pg_dir")
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn it_rejects_multiple_definitions() {
        let mut a = LinkUnit::new("head.o");
        a.define("_text", VAddr(0x1000), Section::Named(".head.text"));
        let mut b = LinkUnit::new("vmlinux.o");
        b.define("_text", VAddr(0x2000), Section::Named(".text"));

        let mut linker = Linker::new();
        linker.add_unit(a).add_unit(b);

        assert_eq!(
            linker.link(&AliasRegistry::<4>::new()),
            Err(LinkError::MultipleDefinition {
                name: SymbolName::new("_text"),
                first: "head.o",
                second: "vmlinux.o",
            })
        );
    }

    #[test]
    fn strong_definition_replaces_weak_one() {
        for weak_first in [true, false] {
            let mut weak = LinkUnit::new("weak.o");
            weak.define_weak("arch_hook", VAddr(0x1000), Section::Named(".text"));
            let mut strong = LinkUnit::new("strong.o");
            strong.define("arch_hook", VAddr(0x2000), Section::Named(".text"));

            let mut linker = Linker::new();
            if weak_first {
                linker.add_unit(weak).add_unit(strong);
            } else {
                linker.add_unit(strong).add_unit(weak);
            }
            let image = linker.link(&AliasRegistry::<4>::new()).unwrap();

            let sym = image.symbol(SymbolName::new("arch_hook")).unwrap();
            assert_eq!(sym.addr, VAddr(0x2000));
            assert_eq!(sym.origin, Origin::Explicit { unit: "strong.o" });
            assert_eq!(image.len(), 1);
        }
    }

    #[test]
    fn first_weak_definition_stays() {
        let mut a = LinkUnit::new("a.o");
        a.define_weak("arch_hook", VAddr(0x1000), Section::Named(".text"));
        let mut b = LinkUnit::new("b.o");
        b.define_weak("arch_hook", VAddr(0x2000), Section::Named(".text"));

        let mut linker = Linker::new();
        linker.add_unit(a).add_unit(b);
        let image = linker.link(&AliasRegistry::<4>::new()).unwrap();

        assert_eq!(image.address("arch_hook"), Some(VAddr(0x1000)));
    }

    #[test]
    fn weak_definition_still_wins_over_alias() {
        let mut pi = LinkUnit::new("pi.o");
        pi.define_weak("__pi__end", VAddr(0x7000), Section::Absolute);

        let mut registry: AliasRegistry = AliasRegistry::new();
        registry.declare_alias("__pi__end", "_end").unwrap();

        let mut linker = Linker::new();
        linker.add_unit(pi);
        let image = linker.link(&registry).unwrap();

        assert_eq!(image.address("__pi__end"), Some(VAddr(0x7000)));
        assert_eq!(image.overridden(), [SymbolName::new("__pi__end")]);
    }

    #[test]
    fn strong_definitions_still_conflict_after_weak_one() {
        let mut weak = LinkUnit::new("weak.o");
        weak.define_weak("_text", VAddr(0x1000), Section::Named(".text"));
        let mut a = LinkUnit::new("head.o");
        a.define("_text", VAddr(0x2000), Section::Named(".head.text"));
        let mut b = LinkUnit::new("vmlinux.o");
        b.define("_text", VAddr(0x3000), Section::Named(".text"));

        let mut linker = Linker::new();
        linker.add_unit(weak).add_unit(a).add_unit(b);

        assert_eq!(
            linker.link(&AliasRegistry::<4>::new()),
            Err(LinkError::MultipleDefinition {
                name: SymbolName::new("_text"),
                first: "head.o",
                second: "vmlinux.o",
            })
        );
    }

    #[test]
    fn references_resolve_through_aliases() {
        let mut pi = LinkUnit::new("pi.o");
        pi.reference("__pi_init_idmap_pg_dir").reference("__pi__end");

        let mut linker = Linker::new();
        linker.add_unit(pi).add_unit(vmlinux());

        assert!(linker.link(&AliasRegistry::image_vars()).is_ok());
    }

    #[test]
    fn it_reports_undefined_references() {
        let mut pi = LinkUnit::new("pi.o");
        pi.reference("__pi__text").reference("__pi_kimage_vaddr");

        let mut linker = Linker::new();
        linker.add_unit(pi).add_unit(vmlinux());

        assert_eq!(
            linker.link(&AliasRegistry::image_vars()),
            Err(LinkError::UndefinedReference {
                name: SymbolName::new("__pi_kimage_vaddr"),
                unit: "pi.o",
            })
        );
    }
}
