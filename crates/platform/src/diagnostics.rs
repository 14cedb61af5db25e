//! Line-oriented diagnostic output
//!
//! The bench reports progress and failures one line at a time. A sink takes
//! pre-formatted [`fmt::Arguments`] so callers never allocate.

use core::fmt;

/// Text sink for progress and error reporting.
pub trait DiagnosticSink {
    /// Emit one line. Implementations append the line terminator.
    fn line(&mut self, args: fmt::Arguments<'_>);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &mut T {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        (**self).line(args);
    }
}
