//! Diagnostic message handling for the HRL compiler

use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for diagnostic messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// Location of a diagnostic in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub width: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32, width: u32) -> Self {
        Self { file: file.into(), line, column, width }
    }

    pub fn from_span(file: impl Into<String>, span: Span) -> Self {
        Self::new(file, span.start.line, span.start.column, span.width())
    }

    pub fn unknown() -> Self {
        Self::new("<unknown>", 0, 0, 0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A diagnostic message with location and severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: u32,
    pub message: String,
    pub location: Location,
    pub suggestion: Option<String>,
    /// Monotonic counter assigned by the reporter. Keeps emission order
    /// stable regardless of how messages are stored or filtered.
    pub order: u64,
}

impl Diagnostic {
    pub fn error(code: u32, message: impl Into<String>, location: Location) -> Self {
        Self::new(Severity::Error, code, message, location)
    }

    pub fn warning(code: u32, message: impl Into<String>, location: Location) -> Self {
        Self::new(Severity::Warning, code, message, location)
    }

    pub fn note(code: u32, message: impl Into<String>, location: Location) -> Self {
        Self::new(Severity::Note, code, message, location)
    }

    fn new(severity: Severity, code: u32, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location,
            suggestion: None,
            order: 0,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {} [E{:04}]", self.location, self.severity, self.message, self.code)?;

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

/// A filter applied to every diagnostic before it is stored.
///
/// Filters may rewrite or annotate the message in place, or suppress it
/// entirely by returning `false`.
pub trait DiagnosticFilter {
    fn apply(&self, diagnostic: &mut Diagnostic) -> bool;
}

/// Central reporter that stores and filters diagnostic messages
#[derive(Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
    filters: Vec<Box<dyn DiagnosticFilter>>,
    next_order: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: Box<dyn DiagnosticFilter>) {
        self.filters.push(filter);
    }

    /// Report a diagnostic, running it through the filter chain. Returns
    /// whether the message survived.
    pub fn report(&mut self, mut diagnostic: Diagnostic) -> bool {
        for filter in &self.filters {
            if !filter.apply(&mut diagnostic) {
                return false;
            }
        }
        diagnostic.order = self.next_order;
        self.next_order += 1;
        self.messages.push(diagnostic);
        true
    }

    pub fn error(&mut self, code: u32, message: impl Into<String>, location: Location) {
        self.report(Diagnostic::error(code, message, location));
    }

    pub fn warning(&mut self, code: u32, message: impl Into<String>, location: Location) {
        self.report(Diagnostic::warning(code, message, location));
    }

    pub fn note(&mut self, code: u32, message: impl Into<String>, location: Location) {
        self.report(Diagnostic::note(code, message, location));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in stable emission order.
    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for message in other.messages {
            self.report(message);
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("messages", &self.messages)
            .field("filters", &self.filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Demote;

    impl DiagnosticFilter for Demote {
        fn apply(&self, diagnostic: &mut Diagnostic) -> bool {
            if diagnostic.severity == Severity::Warning {
                diagnostic.severity = Severity::Note;
            }
            true
        }
    }

    struct DropNotes;

    impl DiagnosticFilter for DropNotes {
        fn apply(&self, diagnostic: &mut Diagnostic) -> bool {
            diagnostic.severity != Severity::Note
        }
    }

    #[test]
    fn order_counter_is_stable() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(1, "first", Location::unknown());
        diagnostics.warning(2, "second", Location::unknown());
        diagnostics.error(3, "third", Location::unknown());

        let orders: Vec<u64> = diagnostics.messages().iter().map(|d| d.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 2);
    }

    #[test]
    fn filters_rewrite_and_suppress() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_filter(Box::new(Demote));
        diagnostics.add_filter(Box::new(DropNotes));

        diagnostics.warning(10, "demoted then dropped", Location::unknown());
        diagnostics.error(11, "kept", Location::unknown());

        assert_eq!(diagnostics.messages().len(), 1);
        assert_eq!(diagnostics.messages()[0].message, "kept");
    }
}
