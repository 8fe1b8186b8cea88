/******************************************************************************
 * Copyright © 2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>             *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! Reads the symbol table of a little-endian ELF64 file into a [`LinkUnit`].
//!
//! A symbol's value is taken as its address, which is what it is in a linked
//! image and for absolute symbols.

use alloc::vec::Vec;
use binrw::BinRead;
use binrw::io::{Cursor, Seek, SeekFrom};
use thiserror_no_std::Error;

use crate::debug;
use crate::link::LinkUnit;
use crate::mem::VAddr;
use crate::symbol::Section;

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

const SHT_SYMTAB: u32 = 2;

const SHN_UNDEF: u16 = 0;
const SHN_LORESERVE: u16 = 0xff00;
const SHN_COMMON: u16 = 0xfff2;

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;
const STB_WEAK: u8 = 2;

const SHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;

#[derive(Error, Debug)]
pub enum ElfError {
    #[error("invalid ELF header: {0}")]
    InvalidHeader(binrw::error::Error),

    #[error("not an ELF64 file")]
    NotElf64,

    #[error("not a little-endian ELF file")]
    NotLittleEndian,

    #[error("unsupported {0} entry size {1}")]
    UnsupportedEntrySize(&'static str, u64),

    #[error("{0} #{1} lies past the end of the address space")]
    OffsetOverflow(&'static str, u64),

    #[error("invalid section header #{0}: {1}")]
    InvalidSectionHeader(u16, binrw::error::Error),

    #[error("no symbol table")]
    NoSymbolTable,

    #[error("invalid symbol #{0}: {1}")]
    InvalidSymbol(u64, binrw::error::Error),

    #[error("reference to missing section #{0}")]
    MissingSection(u32),

    #[error("string at offset {0} is out of its table")]
    StringOutOfBounds(u32),

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidString(u32),
}

#[derive(BinRead, Debug)]
#[br(little, magic = b"\x7fELF")]
struct FileHeader {
    class: u8,
    data: u8,
    _ident_version: u8,
    _ident_pad: [u8; 9],
    _kind: u16,
    _machine: u16,
    _version: u32,
    _entry: u64,
    _phoff: u64,
    shoff: u64,
    _flags: u32,
    _ehsize: u16,
    _phentsize: u16,
    _phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
struct SectionHeader {
    name: u32,
    kind: u32,
    _flags: u64,
    _addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    _info: u32,
    _addralign: u64,
    entsize: u64,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct RawSymbol {
    name: u32,
    info: u8,
    _other: u8,
    shndx: u16,
    value: u64,
    _size: u64,
}

impl RawSymbol {
    #[inline]
    fn binding(&self) -> u8 {
        self.info >> 4
    }
}

/// Builds a link unit named `unit_name` from the global symbols of `data`:
/// defined ones become definitions (weak ones stay weak), undefined global
/// ones become references. Local symbols are ignored.
pub fn read_unit<'a>(
    unit_name: &'a str,
    data: &'a [u8],
) -> Result<LinkUnit<'a>, ElfError> {
    let mut reader = Cursor::new(data);
    let header = FileHeader::read(&mut reader)
        .map_err(ElfError::InvalidHeader)?;

    if header.class != ELFCLASS64 {
        return Err(ElfError::NotElf64);
    }
    if header.data != ELFDATA2LSB {
        return Err(ElfError::NotLittleEndian);
    }
    if header.shentsize as u64 != SHDR_SIZE {
        return Err(ElfError::UnsupportedEntrySize("section header",
                                                  header.shentsize as u64));
    }

    let mut sections = Vec::with_capacity(header.shnum as usize);
    for idx in 0..header.shnum {
        let offset = entry_offset(header.shoff, idx as u64, SHDR_SIZE)
            .ok_or(ElfError::OffsetOverflow("section header", idx as u64))?;
        let shdr = reader.seek(SeekFrom::Start(offset))
            .map_err(binrw::Error::Io)
            .and_then(|_| SectionHeader::read(&mut reader))
            .map_err(|e| ElfError::InvalidSectionHeader(idx, e))?;
        sections.push(shdr);
    }

    let symtab = *sections.iter()
        .find(|shdr| shdr.kind == SHT_SYMTAB)
        .ok_or(ElfError::NoSymbolTable)?;
    if symtab.entsize != SYM_SIZE {
        return Err(ElfError::UnsupportedEntrySize("symbol", symtab.entsize));
    }

    let strtab = *sections.get(symtab.link as usize)
        .ok_or(ElfError::MissingSection(symtab.link))?;
    let shstrtab = sections.get(header.shstrndx as usize).copied();

    let mut unit = LinkUnit::new(unit_name);

    // Symbol #0 is the reserved null symbol.
    for idx in 1..(symtab.size / SYM_SIZE) {
        let offset = entry_offset(symtab.offset, idx, SYM_SIZE)
            .ok_or(ElfError::OffsetOverflow("symbol", idx))?;
        let sym = reader.seek(SeekFrom::Start(offset))
            .map_err(binrw::Error::Io)
            .and_then(|_| RawSymbol::read(&mut reader))
            .map_err(|e| ElfError::InvalidSymbol(idx, e))?;

        if sym.binding() == STB_LOCAL {
            continue;
        }

        let name = string_at(data, &strtab, sym.name)?;
        if name.is_empty() {
            continue;
        }

        if sym.shndx == SHN_UNDEF {
            if sym.binding() == STB_GLOBAL {
                unit.reference(name);
            }
            continue;
        }

        let section = match sym.shndx {
            SHN_COMMON => Section::Named("COMMON"),
            shndx if shndx >= SHN_LORESERVE => Section::Absolute,
            shndx => {
                let shdr = sections.get(shndx as usize)
                    .ok_or(ElfError::MissingSection(shndx as u32))?;
                match &shstrtab {
                    Some(shstrtab) => Section::Named(string_at(data, shstrtab, shdr.name)?),
                    None => Section::Named(""),
                }
            },
        };

        if sym.binding() == STB_WEAK {
            unit.define_weak(name, VAddr(sym.value), section);
        } else {
            unit.define(name, VAddr(sym.value), section);
        }
    }

    debug!("{}: {} definitions, {} references", unit_name,
           unit.definitions().len(), unit.references().len());

    Ok(unit)
}

/// File offset of entry `idx` of a table at `base`.
#[inline]
fn entry_offset(base: u64, idx: u64, entry_size: u64) -> Option<u64> {
    idx.checked_mul(entry_size)
        .and_then(|off| base.checked_add(off))
}

/// The NUL-terminated string at `offset` of string table `table`.
fn string_at<'a>(
    data: &'a [u8],
    table: &SectionHeader,
    offset: u32,
) -> Result<&'a str, ElfError> {
    let start = table.offset.checked_add(offset as u64)
        .filter(|_| (offset as u64) < table.size);
    let end = table.offset.checked_add(table.size);

    let bytes = match (start, end) {
        (Some(start), Some(end)) => usize::try_from(start).ok()
            .zip(usize::try_from(end).ok())
            .and_then(|(start, end)| data.get(start..end)),
        _ => None,
    }.ok_or(ElfError::StringOutOfBounds(offset))?;

    let len = bytes.iter()
        .position(|&b| b == 0)
        .ok_or(ElfError::StringOutOfBounds(offset))?;

    core::str::from_utf8(&bytes[..len])
        .map_err(|_| ElfError::InvalidString(offset))
}
