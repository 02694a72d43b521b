use crate::parsing::model::{Span, Spanned};
use annotate_snippets::renderer::DecorStyle;
use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::mem;

pub mod code {
    // Parse errors
    pub const LINE_PARSE: &str = "E1001 line parse error";
    pub const UNKNOWN_SYMBOL: &str = "E1002 unknown notation symbol";
    pub const UNTERMINATED_METADATA: &str = "E1003 unterminated metadata";
    pub const MALFORMED_DIRECTIVE: &str = "E1004 malformed directive";
    pub const UNKNOWN_DIRECTIVE: &str = "E1005 unknown directive";
    pub const UNSUPPORTED_DIRECTIVE: &str = "E1006 unsupported directive";
    // Resolution errors
    pub const UNKNOWN_TAG: &str = "E2001 unknown instrument tag";
    pub const UNKNOWN_POSITION: &str = "E2002 unknown position";
    pub const UNMAPPABLE_SHARED: &str = "E2003 unmappable shared notation";
    pub const DUPLICATE_LABEL: &str = "E2004 duplicate label";
    pub const UNDEFINED_LABEL: &str = "E2005 undefined label reference";
    // Structural errors
    pub const BEAT_LENGTH: &str = "E3001 beat length mismatch";
    pub const STAVE_LENGTH: &str = "E3002 stave length mismatch";
    pub const NOTE_RANGE: &str = "E3003 note out of range";
    pub const KEMPYUNG: &str = "E3004 kempyung mismatch";
    pub const OCTAVATE_RANGE: &str = "E3005 octavation out of range";
    // Execution errors
    pub const DIVERGENT_FLOW: &str = "E4001 divergent flow";
    pub const GOTO_UNBOUND: &str = "E4002 goto target in unbound block";
    pub const REPEAT_COUNT: &str = "E4003 invalid repeat count";
    // Configuration and I/O
    pub const TABLE: &str = "E5001 invalid lookup table";
    pub const INPUT_FILE: &str = "E5002 input file missing";
    pub const OUTPUT_FILE: &str = "E5003 output file write error";
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: Spanned<String>,
    pub context: Vec<Spanned<String>>,
}
impl Diagnostic {
    pub fn new(code: &'static str, span: impl Into<Span>, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Spanned::new(span, msg),
            context: Default::default(),
        }
    }

    pub fn with_context(mut self, span: impl Into<Span>, msg: impl Into<String>) -> Self {
        self.context.push(Spanned::new(span, msg));
        self
    }

    pub fn group<'a>(&'a self, filename: &'a str, src: &'a str) -> Group<'a> {
        let mut source = Snippet::source(src).path(filename).annotation(
            AnnotationKind::Primary
                .span(self.message.span.into())
                .label(&self.message.value),
        );
        for m in &self.context {
            source = source.annotation(AnnotationKind::Context.span(m.span.into()).label(&m.value));
        }
        Level::ERROR.primary_title(self.code).element(source)
    }
}

/// Error accumulator for one pipeline stage. A stage keeps diagnosing its whole
/// input and reports everything it found; the pipeline aborts at the stage
/// boundary when the list is non-empty.
#[derive(Serialize, Default, Debug)]
pub struct Diagnostics {
    pub list: RefCell<Vec<Diagnostic>>,
    #[serde(skip)]
    pub seen: RefCell<HashSet<(&'static str, Spanned<String>)>>,
}
impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }
}
impl Display for Diagnostics {
    /// Diagnostics can be formatted as a string, but it's better to use [Diagnostics::render].
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let list = self.list.borrow_mut();
        if list.is_empty() {
            return writeln!(f, "no errors");
        }
        let mut first = true;
        for i in &*list {
            if first {
                write!(f, "ERRORS: ")?;
                first = false;
            } else {
                write!(f, ", ")?;
            }
            write!(
                f,
                "offset {}..{}: {}: {}",
                i.message.span.start, i.message.span.end, i.code, i.message.value
            )?;
            for c in &i.context {
                write!(
                    f,
                    ", (context {}..{}: {})",
                    c.span.start, c.span.end, c.value
                )?;
            }
        }
        Ok(())
    }
}
impl Diagnostics {
    /// Convenience function for adding a simple error without context
    pub fn err(&self, code: &'static str, span: impl Into<Span>, msg: impl Into<String>) {
        self.push(Diagnostic::new(code, span, msg))
    }

    pub fn push(&self, d: Diagnostic) {
        if self.seen.borrow_mut().insert((d.code, d.message.clone())) {
            self.list.borrow_mut().push(d)
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.list.borrow_mut().is_empty()
    }

    pub fn num_errors(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn get_all(&self) -> Vec<Diagnostic> {
        mem::take(&mut self.list.borrow_mut())
    }

    /// Wraps a result-producing closure in the stage contract: return the value
    /// only if no errors were recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.has_errors() { Err(self) } else { Ok(value) }
    }

    pub fn render(&self, filename: &str, src: &str) -> String {
        let list = self.list.borrow();
        let report: Vec<Group> = list.iter().map(|x| x.group(filename, src)).collect();
        let renderer = Renderer::styled().decor_style(DecorStyle::Unicode);
        renderer.render(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let x = Diagnostics::new();
        assert!(x.to_string().contains("no errors"));
        x.push(Diagnostic::new(
            code::BEAT_LENGTH,
            14..22,
            "gongan 2 beat 3: CALUNG has length 3, expected 4",
        ));
        x.push(
            Diagnostic::new(
                code::KEMPYUNG,
                31..35,
                "PEMADE_SANGSIH plays DENG/1 where the kempyung of DONG/1 is DANG/1",
            )
            .with_context(23..27, "here is the polos line"),
        );
        assert_eq!(
            x.to_string(),
            "ERRORS: offset 14..22: E3001 beat length mismatch: gongan 2 beat 3: CALUNG has \
             length 3, expected 4, offset 31..35: E3004 kempyung mismatch: PEMADE_SANGSIH plays \
             DENG/1 where the kempyung of DONG/1 is DANG/1, (context 23..27: here is the polos \
             line)"
        );
    }

    #[test]
    fn test_dedup() {
        // The same finding reported through two code paths surfaces once.
        let x = Diagnostics::new();
        x.err(
            code::NOTE_RANGE,
            8..10,
            "gongan 1 beat 2: DANG/2 is outside the range of PEMADE_POLOS",
        );
        x.err(
            code::NOTE_RANGE,
            8..10,
            "gongan 1 beat 2: DANG/2 is outside the range of PEMADE_POLOS",
        );
        assert_eq!(x.num_errors(), 1);
    }
}
