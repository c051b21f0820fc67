// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Error kinds for process management, with stable numeric codes.

#![cfg_attr(not(test), no_std)]

use core::fmt;

use strum::EnumCount;

/// The error kind type used by the process layer.
///
/// Similar to [`std::io::ErrorKind`].
///
/// [`std::io::ErrorKind`]: https://doc.rust-lang.org/std/io/enum.ErrorKind.html
#[repr(i32)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, EnumCount)]
pub enum KErrorKind {
    /// An entity already exists.
    AlreadyExists = 1,
    /// Not enough memory to duplicate a process.
    NoMemory,
    /// No such process, or not a child of the caller.
    NoSuchProcess,
    /// The requested entity is not found.
    NotFound,
    /// Operation not permitted.
    OperationNotPermitted,
}

impl KErrorKind {
    /// Returns the error description.
    pub fn as_str(&self) -> &'static str {
        use KErrorKind::*;
        match *self {
            AlreadyExists => "Entity already exists",
            NoMemory => "Out of memory",
            NoSuchProcess => "No such process",
            NotFound => "Entity not found",
            OperationNotPermitted => "Operation not permitted",
        }
    }

    /// Returns the error code value in `i32`.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for KErrorKind {
    type Error = i32;

    #[inline]
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if value > 0 && value <= KErrorKind::COUNT as i32 {
            // SAFETY: `KErrorKind` is `repr(i32)` with contiguous discriminants
            // starting at 1, and `value` is within that range.
            Ok(unsafe { core::mem::transmute::<i32, KErrorKind>(value) })
        } else {
            Err(value)
        }
    }
}

impl fmt::Display for KErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error type used by the process layer.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct KError(KErrorKind);

impl KError {
    const fn new(kind: KErrorKind) -> Self {
        KError(kind)
    }

    /// Returns the kind of this error.
    pub const fn kind(self) -> KErrorKind {
        self.0
    }

    /// Returns the error code value in `i32`.
    pub const fn code(self) -> i32 {
        self.0.code()
    }

    /// Converts a code produced by [`code`](Self::code) back into an error.
    pub fn try_from_i32(value: i32) -> Result<Self, i32> {
        KErrorKind::try_from(value).map(KError)
    }
}

impl From<KErrorKind> for KError {
    fn from(kind: KErrorKind) -> Self {
        KError::new(kind)
    }
}

impl fmt::Debug for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KErrorKind::{:?}", self.0)
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! kerror_consts {
    ($($name:ident),*) => {
        #[allow(non_upper_case_globals)]
        impl KError {
            $(
                #[doc = concat!("An [`KError`] with kind [`KErrorKind::", stringify!($name), "`].")]
                pub const $name: Self = Self::new(KErrorKind::$name);
            )*
        }
    };
}

kerror_consts!(
    AlreadyExists,
    NoMemory,
    NoSuchProcess,
    NotFound,
    OperationNotPermitted
);

/// A specialized [`Result`] type with [`KError`] as the error type.
pub type KResult<T = ()> = Result<T, KError>;

/// Convenience method to construct an [`KError`] type while printing a warning
/// message.
///
/// # Examples
///
/// ```
/// # use kerrno::{k_err_type, KError};
/// #
/// // Also print "[KError::AlreadyExists]" if the `log` crate is enabled.
/// assert_eq!(k_err_type!(AlreadyExists), KError::AlreadyExists);
///
/// assert_eq!(
///     k_err_type!(NoSuchProcess, "pid 7 is not a child"),
///     KError::NoSuchProcess,
/// );
/// ```
#[macro_export]
macro_rules! k_err_type {
    ($err:ident) => {{
        use $crate::KErrorKind::*;
        let err = $crate::KError::from($err);
        $crate::__priv::warn!("[{:?}]", err);
        err
    }};
    ($err:ident, $msg:expr) => {{
        use $crate::KErrorKind::*;
        let err = $crate::KError::from($err);
        $crate::__priv::warn!("[{:?}] {}", err, $msg);
        err
    }};
}

/// Ensure a condition is true. If it is not, return from the function
/// with an error.
///
/// ## Examples
///
/// ```rust
/// # use kerrno::{ensure, k_err, KError, KResult};
///
/// fn example(pid: i32) -> KResult {
///     ensure!(pid > 0, k_err!(NotFound));
///     Ok(())
/// }
/// assert_eq!(example(0), Err(KError::NotFound));
/// ```
#[macro_export]
macro_rules! ensure {
    ($predicate:expr, $context_selector:expr $(,)?) => {
        if !$predicate {
            return $context_selector;
        }
    };
}

/// Convenience method to construct an [`Err(KError)`] type while printing a
/// warning message.
///
/// # Examples
///
/// ```
/// # use kerrno::{k_err, KResult, KError};
/// #
/// assert_eq!(
///     k_err!(OperationNotPermitted),
///     KResult::<()>::Err(KError::OperationNotPermitted),
/// );
/// ```
/// [`Err(KError)`]: Err
#[macro_export]
macro_rules! k_err {
    ($err:ident) => {
        Err($crate::k_err_type!($err))
    };
    ($err:ident, $msg:expr) => {
        Err($crate::k_err_type!($err, $msg))
    };
}

/// Throws an error of type [`KError`] with the given error code, optionally
/// with a message.
#[macro_export]
macro_rules! k_bail {
    ($($t:tt)*) => {
        return $crate::k_err!($($t)*);
    };
}

#[doc(hidden)]
pub mod __priv {
    pub use log::warn;
}

#[cfg(test)]
mod tests {
    use strum::EnumCount;

    use crate::{KError, KErrorKind, KResult};

    #[test]
    fn test_try_from() {
        let max_code = KErrorKind::COUNT as i32;
        assert_eq!(max_code, 5);
        assert_eq!(max_code, KError::OperationNotPermitted.code());

        assert_eq!(KError::AlreadyExists.code(), 1);
        assert_eq!(Ok(KError::AlreadyExists), KError::try_from_i32(1));
        assert_eq!(Ok(KError::NoMemory), KError::try_from_i32(KError::NoMemory.code()));
        assert_eq!(Err(max_code + 1), KError::try_from_i32(max_code + 1));
        assert_eq!(Err(0), KError::try_from_i32(0));
        assert_eq!(Err(-3), KError::try_from_i32(-3));
    }

    #[test]
    fn test_macros() {
        fn checked(pid: i32) -> KResult<i32> {
            ensure!(pid >= 0, k_err!(NotFound, "negative pid"));
            if pid == 0 {
                k_bail!(NoSuchProcess);
            }
            Ok(pid)
        }
        assert_eq!(checked(-1), Err(KError::NotFound));
        assert_eq!(checked(0), Err(KError::NoSuchProcess));
        assert_eq!(checked(4), Ok(4));
        assert_eq!(format!("{}", KError::NoSuchProcess), "No such process");
        assert_eq!(format!("{:?}", KError::NoMemory), "KErrorKind::NoMemory");
    }
}
