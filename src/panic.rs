//! Utilities for working with panic payloads.
//!
//! Connection tasks run under `catch_unwind`; these helpers turn the
//! captured payload into something loggable.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use exrframe::panic::format_panic;
///
/// let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(boxed.as_ref()).to_string(), "boom");
/// let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
/// assert_eq!(format_panic(owned.as_ref()).to_string(), "boom");
/// let other: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert!(format_panic(other.as_ref()).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }
