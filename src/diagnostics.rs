//! Pretty error reporting for Rachet
//! Renders errors and warnings against the source with ariadne

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use std::ops::Range;

use crate::error::{RachetError, Warning};
use crate::span::Span;

/// Diagnostic renderer for one source file
pub struct Diagnostics<'a> {
    source: &'a str,
    filename: &'a str,
    color: bool,
}

impl<'a> Diagnostics<'a> {
    pub fn new(source: &'a str, filename: &'a str) -> Self {
        Self { source, filename, color: true }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn render_error(&self, error: &RachetError) -> String {
        let Some(span) = error.span() else {
            return format!("error: {}\n", error);
        };

        let (title, label) = match error {
            RachetError::Lexer { message, .. } => ("unrecognized input".to_string(), message.clone()),
            RachetError::Syntax { expected, found, .. } => (
                format!("expected {}, found {}", expected, found),
                format!("expected {} here", expected),
            ),
            RachetError::UndefinedVariable { name, .. } => (
                format!("undefined variable `{}`", name),
                "not declared in this function".to_string(),
            ),
            RachetError::Codegen { message, .. } => (message.clone(), "cannot be compiled".to_string()),
            other => (other.to_string(), String::new()),
        };
        self.render(ReportKind::Error, Color::Red, &title, &label, span)
    }

    pub fn render_warning(&self, warning: &Warning) -> String {
        self.render(ReportKind::Warning, Color::Yellow, &warning.message, "argument ignored", warning.span)
    }

    fn render(&self, kind: ReportKind, color: Color, title: &str, label: &str, span: Span) -> String {
        let range = self.clamp(span);
        let mut marker = Label::new((self.filename, range.clone())).with_color(color);
        if !label.is_empty() {
            marker = marker.with_message(label);
        }
        let report = Report::build(kind, self.filename, range.start)
            .with_config(Config::default().with_color(self.color))
            .with_message(title)
            .with_label(marker)
            .finish();

        let mut out = Vec::new();
        match report.write((self.filename, Source::from(self.source.to_string())), &mut out) {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => format!("{}: {}\n", self.filename, title),
        }
    }

    /// Byte span to the char range ariadne expects, kept inside the source
    /// and at least one character wide so end-of-input errors still point
    /// somewhere.
    fn clamp(&self, span: Span) -> Range<usize> {
        let chars = |byte: usize| {
            self.source
                .get(..byte.min(self.source.len()))
                .map_or(0, |prefix| prefix.chars().count())
        };
        let total = self.source.chars().count();
        let start = chars(span.start);
        let end = chars(span.end).max(start);
        if end > start {
            start..end
        } else if start < total {
            start..start + 1
        } else {
            start.saturating_sub(1)..total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn plain(source: &str) -> Diagnostics<'_> {
        Diagnostics::new(source, "main.rx").with_color(false)
    }

    #[test]
    fn test_syntax_error_report() {
        let source = "fn main() {\n    let x = 1\n}\n";
        let err = parse(&tokenize(source).unwrap()).unwrap_err();
        let text = plain(source).render_error(&err);
        assert!(text.contains("expected `;`, found `}`"), "{text}");
        assert!(text.contains("main.rx"), "{text}");
        assert!(!text.contains('\x1b'), "colour codes leaked: {text}");
    }

    #[test]
    fn test_lexer_error_report() {
        let source = "fn main() { let a = 1 $ 2; }";
        let err = tokenize(source).unwrap_err();
        let text = plain(source).render_error(&err);
        assert!(text.contains("unexpected character '$'"), "{text}");
    }

    #[test]
    fn test_end_of_input_span_is_clamped() {
        let source = "fn main() {";
        let err = parse(&tokenize(source).unwrap()).unwrap_err();
        let text = plain(source).render_error(&err);
        assert!(text.contains("end of input"), "{text}");
    }

    #[test]
    fn test_spanless_error() {
        let err = RachetError::toolchain("nasm", "not found on PATH");
        assert_eq!(plain("").render_error(&err), "error: Toolchain error (nasm): not found on PATH\n");
    }

    #[test]
    fn test_warning_report() {
        let source = "fn f(a) { } fn main() { f(b); }";
        let warning = Warning::unsupported("argument to `f` replaced with 0", Span::new(26, 27));
        let text = plain(source).render_warning(&warning);
        assert!(text.contains("Warning"), "{text}");
        assert!(text.contains("argument to `f` replaced with 0"), "{text}");
    }
}
