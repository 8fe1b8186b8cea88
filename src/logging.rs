/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use crate::sync::Spinlock;

use core::fmt;

/// The logger every macro of this module writes to. Early boot has no console
/// yet, so it discards everything until [`set_logger`] installs a real one.
pub static DEFAULT_LOGGER: Spinlock<&'static (dyn Logger + Sync)>
    = Spinlock::new(&NULL_LOGGER);

pub trait Logger {
    fn log(&self, severity: Severity, args: fmt::Arguments);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    pub fn label(&self) -> &str {
        use Severity::*;

        match self {
            Debug       => "debug",
            Info        => "info",
            Notice      => "notice",
            Warning     => "warn",
            Error       => "error",
            Critical    => "critical",
            Alert       => "alert",
            Emergency   => "emerg",
        }
    }
}

/// Replaces the default logger, returning the previous one.
pub fn set_logger(
    logger: &'static (dyn Logger + Sync),
) -> &'static (dyn Logger + Sync) {
    core::mem::replace(&mut *DEFAULT_LOGGER.lock(), logger)
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($severity:ident, $($arg:tt)*) => ({
        let logger = $crate::logging::DEFAULT_LOGGER.lock();
        logger.log($crate::logging::Severity::$severity, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ($crate::__log!(Debug, $($arg)*));
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::__log!(Info, $($arg)*));
}

#[macro_export]
macro_rules! notice {
    ($($arg:tt)*) => ($crate::__log!(Notice, $($arg)*));
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => ($crate::__log!(Warning, $($arg)*));
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ($crate::__log!(Error, $($arg)*));
}

#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => ($crate::__log!(Critical, $($arg)*));
}

#[macro_export]
macro_rules! alert {
    ($($arg:tt)*) => ($crate::__log!(Alert, $($arg)*));
}

#[macro_export]
macro_rules! emergency {
    ($($arg:tt)*) => ($crate::__log!(Emergency, $($arg)*));
}

struct NullLogger;

static NULL_LOGGER: NullLogger = NullLogger;

impl Logger for NullLogger {
    fn log(&self, _severity: Severity, _args: fmt::Arguments) {
    }
}

#[cfg(test)]
pub(crate) mod stdout {
    use std::println;
    use crate::logging::{Logger, Severity, set_logger};
    use core::fmt;

    pub struct StdoutLogger;

    static LOGGER_STDOUT: StdoutLogger = StdoutLogger;

    impl Logger for StdoutLogger {
        fn log(&self, severity: Severity, args: fmt::Arguments) {
            let color = match severity {
                Severity::Debug => "\x1b[90m",
                Severity::Info => "\x1b[37m",
                Severity::Notice => "\x1b[97m",
                Severity::Warning => "\x1b[93m",
                Severity::Error => "\x1b[31m",
                Severity::Critical => "\x1b[1;31m",
                Severity::Alert => "\x1b[1;97;41m",
                Severity::Emergency => "\x1b[1;93;41m",
            };

            println!("{}{:>8}: {}\x1b[0m", color, severity.label(), args);
        }
    }

    #[ctor::ctor]
    fn init() {
        set_logger(&LOGGER_STDOUT);
    }
}
