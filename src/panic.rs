//! Rendering of `panic!` payloads caught in connection tasks.

use std::{any::Any, fmt};

/// Panic payload that renders as text when logged.
///
/// `String` and `&'static str` payloads print verbatim; anything else falls
/// back to its `Debug` form.
///
/// ```
/// use framelink::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("bang"))).as_str(), Some("bang"));
/// assert!(format_panic(Box::new(5_u32)).as_str().is_none());
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    /// The payload as text, if it was a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap a payload returned by `catch_unwind`.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }
