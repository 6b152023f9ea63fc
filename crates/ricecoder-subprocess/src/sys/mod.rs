//! Platform backends
//!
//! Both backends export the same set of functions; call sites never branch on
//! the platform themselves.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use self::unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use self::windows::*;
