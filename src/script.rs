/******************************************************************************
 * Copyright © 2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>             *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! The `image-vars.h` linker script fragment.
//!
//! The fragment is included by the kernel linker script after `SECTIONS` has
//! been processed (ld.lld refuses such assignments before it), and never by a
//! translation unit: it guards against that with `#error`.

use core::fmt;
use core::fmt::{Display, Formatter};
use thiserror_no_std::Error;

use crate::alias::{AliasError, AliasRegistry};

pub const DEFAULT_GUARD: &str = "__NUCLOID_IMAGE_VARS_H";

/// Renders an [`AliasRegistry`] as linker script, one `PROVIDE` per
/// declaration.
pub struct Fragment<'r, 'a, const N: usize> {
    registry: &'r AliasRegistry<'a, N>,
    guard: &'r str,
}

impl<'r, 'a, const N: usize> Fragment<'r, 'a, N> {
    pub fn new(registry: &'r AliasRegistry<'a, N>) -> Self {
        Self {
            registry,
            guard: DEFAULT_GUARD,
        }
    }

    pub fn with_guard(mut self, guard: &'r str) -> Self {
        self.guard = guard;
        self
    }
}

impl<const N: usize> Display for Fragment<'_, '_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let width = self.registry.iter()
            .map(|decl| decl.alias().as_str().len())
            .max()
            .unwrap_or(0);

        writeln!(f, "/* SPDX-License-Identifier: GPL-2.0-or-later */")?;
        writeln!(f, "/*")?;
        writeln!(f, " * Linker script variables to be set after section resolution.")?;
        writeln!(f, " * Generated from the early-boot alias registry, do not edit.")?;
        writeln!(f, " */")?;
        writeln!(f, "#ifndef {}", self.guard)?;
        writeln!(f, "#define {}", self.guard)?;
        writeln!(f)?;
        writeln!(f, "#ifndef LINKER_SCRIPT")?;
        writeln!(f, "#error This file should only be included in the kernel linker script")?;
        writeln!(f, "#endif")?;
        writeln!(f)?;

        for decl in self.registry.iter() {
            writeln!(f, "PROVIDE({:<width$} = {});",
                     decl.alias().as_str(), decl.target(), width = width)?;
        }

        writeln!(f)?;
        writeln!(f, "#endif /* {} */", self.guard)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError<'a> {
    #[error("line {line}: expected 'PROVIDE(alias = target);', found '{found}'")]
    Syntax {
        line: usize,
        found: &'a str,
    },

    #[error("line {line}: missing ';' after '{found}'")]
    MissingSemicolon {
        line: usize,
        found: &'a str,
    },

    #[error("line {line}: {err}")]
    Alias {
        line: usize,
        err: AliasError<'a>,
    },

    #[error("unterminated comment starting at line {0}")]
    UnterminatedComment(usize),
}

/// Reads back the `PROVIDE` declarations of a fragment, in order. Blank
/// lines, comments and preprocessor directives are skipped.
///
/// This reads the fragments [`Fragment`] renders, not any linker script: a
/// statement must end on the line it starts on and must not be interrupted by
/// a comment. A `PROVIDE(` split across lines is a
/// [`ScriptError::MissingSemicolon`].
pub fn parse<'a, const N: usize>(
    text: &'a str,
) -> Result<AliasRegistry<'a, N>, ScriptError<'a>> {
    let mut registry = AliasRegistry::new();
    let mut comment_start = None;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let mut rest = line;

        loop {
            if comment_start.is_some() {
                match rest.find("*/") {
                    Some(end) => {
                        rest = &rest[end + 2..];
                        comment_start = None;
                    },
                    None => break,
                }
            }

            let block = rest.find("/*");
            let inline = rest.find("//");

            match (block, inline) {
                (Some(b), Some(l)) if l < b => {
                    parse_code(&rest[..l], lineno, &mut registry)?;
                    break;
                },
                (None, Some(l)) => {
                    parse_code(&rest[..l], lineno, &mut registry)?;
                    break;
                },
                (Some(b), _) => {
                    parse_code(&rest[..b], lineno, &mut registry)?;
                    rest = &rest[b + 2..];
                    comment_start = Some(lineno);
                },
                (None, None) => {
                    parse_code(rest, lineno, &mut registry)?;
                    break;
                },
            }
        }
    }

    match comment_start {
        Some(line) => Err(ScriptError::UnterminatedComment(line)),
        None => Ok(registry),
    }
}

fn parse_code<'a, const N: usize>(
    code: &'a str,
    line: usize,
    registry: &mut AliasRegistry<'a, N>,
) -> Result<(), ScriptError<'a>> {
    let code = code.trim();

    if code.is_empty() || code.starts_with('#') {
        return Ok(());
    }

    let mut stmts = code.split(';').map(str::trim).peekable();

    while let Some(stmt) = stmts.next() {
        if stmts.peek().is_none() {
            // Text after the last ';' is an unterminated statement.
            if !stmt.is_empty() {
                return Err(ScriptError::MissingSemicolon { line, found: stmt });
            }
            break;
        }
        if stmt.is_empty() {
            continue;
        }

        let (alias, target) = parse_provide(stmt)
            .ok_or(ScriptError::Syntax { line, found: stmt })?;
        registry.declare_alias(alias, target)
            .map_err(|err| ScriptError::Alias { line, err })?;
    }

    Ok(())
}

/// `PROVIDE(alias = target)` or `PROVIDE_HIDDEN(alias = target)`, without the
/// trailing semicolon.
fn parse_provide(stmt: &str) -> Option<(&str, &str)> {
    let args = stmt.strip_prefix("PROVIDE_HIDDEN")
        .or_else(|| stmt.strip_prefix("PROVIDE"))?
        .trim_start()
        .strip_prefix('(')?
        .trim_end()
        .strip_suffix(')')?;
    let (alias, target) = args.split_once('=')?;

    Some((alias.trim(), target.trim()))
}
