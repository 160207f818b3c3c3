//! Human-readable diagnostic rendering (SPEC_FULL.md §12), grounded on the
//! teacher's `error_message.rs`: turns `SemanticError`/`SemanticErrors`
//! plus the original query text into a plain or `ariadne`-rendered report.
//! Simplified from the teacher's multi-file `SourceTree`/`Cache` machinery
//! to a single source string, since one `AstNode` here is always parsed
//! from exactly one query text rather than a tree of imported modules.

use std::fmt::{self, Debug, Display, Formatter};
use std::io::stderr;

use anstream::adapter::strip_str;
use ariadne::{Config, Label, Report, ReportKind, Source};
use serde::Serialize;

use crate::ast::SourcePos;
use crate::error::{SemanticError, SemanticErrorKind, SemanticErrors};

#[derive(Clone, Serialize)]
pub struct ErrorMessage {
    pub kind: SemanticErrorKind,
    pub reason: String,
    pub hints: Vec<String>,
    pub span: Option<SourcePos>,
    /// `ariadne`-rendered, span-highlighted report text, present once
    /// [`ErrorMessages::composed`] has run against the source text.
    pub display: Option<String>,
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(display) = &self.display {
            let trimmed = display.split('\n').map(str::trim_end).collect::<Vec<_>>().join("\n");
            f.write_str(&trimmed)
        } else {
            writeln!(f, "{}: {}", self.kind, &self.reason)?;
            for hint in &self.hints {
                writeln!(f, "  hint: {hint}")?;
            }
            Ok(())
        }
    }
}

impl Debug for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<SemanticError> for ErrorMessage {
    fn from(e: SemanticError) -> Self {
        log::debug!("{e:?}");
        ErrorMessage {
            kind: e.kind,
            reason: e.reason,
            hints: e.hints,
            span: e.span,
            display: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}

impl From<SemanticError> for ErrorMessages {
    fn from(e: SemanticError) -> Self {
        ErrorMessages { inner: vec![ErrorMessage::from(e)] }
    }
}

impl From<SemanticErrors> for ErrorMessages {
    fn from(errs: SemanticErrors) -> Self {
        ErrorMessages { inner: errs.0.into_iter().map(ErrorMessage::from).collect() }
    }
}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.inner.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            Display::fmt(e, f)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorMessages {}

impl ErrorMessages {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    /// Resolves each message's `SourcePos` against `source_text` and
    /// renders an `ariadne` report, the way the teacher's `composed`
    /// resolves spans against its `SourceTree`.
    pub fn composed(mut self, source_text: &str) -> Self {
        for e in &mut self.inner {
            let Some(span) = e.span else { continue };
            e.display = compose_display(source_text, span, &e.reason, &e.hints);
        }
        self
    }
}

fn byte_offset(source_text: &str, pos: SourcePos) -> Option<usize> {
    let mut offset = 0;
    for (i, line) in source_text.split('\n').enumerate() {
        if i as u32 + 1 == pos.line {
            return Some(offset + pos.column as usize);
        }
        offset += line.len() + 1;
    }
    None
}

fn compose_display(source_text: &str, pos: SourcePos, reason: &str, hints: &[String]) -> Option<String> {
    let offset = byte_offset(source_text, pos)?;
    let span = offset..(offset + 1).min(source_text.len());
    let config = Config::default().with_color(true);

    let mut report = Report::build(ReportKind::Error, (), span.start)
        .with_config(config)
        .with_label(Label::new(span).with_message(reason));

    if !hints.is_empty() {
        report.set_help(&hints[0]);
    }
    if hints.len() > 1 {
        report.set_note(&hints[1]);
    }

    let mut out = Vec::new();
    report.finish().write(Source::from(source_text), &mut out).ok()?;
    String::from_utf8(out).ok().map(|s| maybe_strip_colors(&s))
}

fn should_use_color() -> bool {
    !matches!(anstream::AutoStream::choice(&stderr()), anstream::ColorChoice::Never)
}

pub(crate) fn maybe_strip_colors(s: &str) -> String {
    if should_use_color() {
        s.to_string()
    } else {
        strip_str(s).to_string()
    }
}
