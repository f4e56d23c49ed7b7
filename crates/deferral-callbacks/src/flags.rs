#![forbid(unsafe_code)]

//! Registry policy flags and the flag-string cache.
//!
//! A registry's lifecycle is fixed at construction by four independent
//! policies. They can be given directly as [`RegistryFlags`] or parsed from a
//! whitespace-separated flag string such as `"once memory"`.
//!
//! # Cache
//!
//! Parsed flag strings are memoized per thread in an [`AHashMap`]. Dispatch is
//! single-threaded and cooperative, so the cache needs no synchronisation;
//! every thread simply builds its own.

use std::cell::RefCell;
use std::fmt;

use ahash::AHashMap;
use thiserror::Error;

bitflags::bitflags! {
    /// Lifecycle policy of a [`Callbacks`](crate::Callbacks) registry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegistryFlags: u8 {
        /// Dispatch the list at most once; later fires are ignored.
        const ONCE          = 0b0001;
        /// Replay the last fire to callbacks added afterwards.
        const MEMORY        = 0b0010;
        /// Skip callbacks that are already registered.
        const UNIQUE        = 0b0100;
        /// Abort a pass when a listener returns [`Flow::Stop`](crate::Flow::Stop).
        const STOP_ON_FALSE = 0b1000;
    }
}

impl RegistryFlags {
    /// Policy of the fulfillment and rejection channels of a result.
    pub const SETTLEMENT: Self = Self::ONCE.union(Self::MEMORY);

    /// Policy of the progress channel of a result.
    pub const PROGRESS: Self = Self::MEMORY;

    /// Parse a whitespace-separated flag string.
    ///
    /// The empty string yields the empty set. Names are case-sensitive except
    /// for the stop flag, which accepts `stopOnFalse`, `stop_on_false` and
    /// `stop-on-false`.
    pub fn parse(spec: &str) -> Result<Self, FlagsError> {
        spec.split_whitespace()
            .try_fold(Self::empty(), |acc, name| Ok(acc | Self::parse_name(name)?))
    }

    fn parse_name(name: &str) -> Result<Self, FlagsError> {
        match name {
            "once" => Ok(Self::ONCE),
            "memory" => Ok(Self::MEMORY),
            "unique" => Ok(Self::UNIQUE),
            "stopOnFalse" | "stop_on_false" | "stop-on-false" => Ok(Self::STOP_ON_FALSE),
            other => Err(FlagsError::Unknown {
                flag: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for RegistryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ONCE, "once"),
            (Self::MEMORY, "memory"),
            (Self::UNIQUE, "unique"),
            (Self::STOP_ON_FALSE, "stopOnFalse"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for RegistryFlags {
    type Err = FlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error produced when a flag string names an unknown policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagsError {
    #[error("unknown registry flag `{flag}`")]
    Unknown { flag: String },
}

thread_local! {
    static FLAG_CACHE: RefCell<AHashMap<String, RegistryFlags>> =
        RefCell::new(AHashMap::new());
}

/// Parse `spec`, reusing an earlier parse of the identical string.
///
/// Only successful parses are cached.
pub fn cached_flags(spec: &str) -> Result<RegistryFlags, FlagsError> {
    FLAG_CACHE.with(|cache| {
        if let Some(flags) = cache.borrow().get(spec) {
            return Ok(*flags);
        }
        let flags = RegistryFlags::parse(spec)?;
        cache.borrow_mut().insert(spec.to_owned(), flags);
        Ok(flags)
    })
}

/// Number of distinct flag strings cached on the current thread.
#[must_use]
pub fn cached_spec_count() -> usize {
    FLAG_CACHE.with(|cache| cache.borrow().len())
}
