// This file contains the first pass of parsing: classifying the tab-delimited
// lines of a notation file and decoding beat groups into font symbols. The
// notation is strictly line-oriented, so this pass is a hand-coded scanner
// that tracks byte offsets itself; the winnow combinators come in for the
// stave leader here and for the metadata directive grammar in pass 2.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::model::{PassSpec, RawBeat, RawSymbol, Span, Spanned};
use crate::tables::FontTable;
use std::env;
use std::fmt::Display;
use std::sync::LazyLock;
use winnow::Parser;
use winnow::combinator::{opt, preceded};
use winnow::error::{ContextError, StrContext};
use winnow::stream::AsChar;
use winnow::token::{one_of, take_while};

pub type CErr = ContextError<StrContext>;
pub type Input1<'s> = winnow::LocatingSlice<&'s str>;

pub fn trace(msg: impl Display) {
    static TRACING: LazyLock<bool> = LazyLock::new(|| env::var("KOTEKAN_TRACE_PARSER").is_ok());
    if *TRACING {
        eprintln!("{msg}");
    }
}

/// A classified line of notation. Blank lines are kept because they separate
/// gongans in pass 2.
#[derive(Debug, Clone)]
pub enum Line1 {
    Blank,
    /// Span of the directive body, without the enclosing braces.
    Metadata { body: Span },
    Comment { text: Spanned<String> },
    Stave {
        tag: Spanned<String>,
        passes: Spanned<PassSpec>,
        beats: Vec<RawBeat>,
        line: u32,
    },
}

/// Splits a line into tab-separated fields with their spans. Trailing empty
/// fields (trailing tabs) are dropped.
fn split_fields(line: &str, start: usize) -> Vec<(Span, String)> {
    let mut fields: Vec<(Span, String)> = Vec::new();
    let mut field_start = start;
    for field in line.split('\t') {
        fields.push((
            Span::from(field_start..field_start + field.len()),
            field.to_string(),
        ));
        field_start += field.len() + 1;
    }
    while fields.last().is_some_and(|(_, f)| f.trim().is_empty()) {
        fields.pop();
    }
    fields
}

/// Parses a stave leader `tag` or `tag:3` or `tag:1-3`. An open-ended range
/// like `1-` is rejected.
fn parse_leader(
    diags: &Diagnostics,
    span: Span,
    text: &str,
) -> Option<(Spanned<String>, Spanned<PassSpec>)> {
    let mut parser = (
        take_while(1.., |c: char| AsChar::is_alphanum(c) || c == '_'),
        opt(preceded(
            ':',
            (
                take_while(1.., AsChar::is_dec_digit),
                opt((
                    one_of::<_, _, CErr>('-'),
                    opt(take_while(1.., AsChar::is_dec_digit)),
                )),
            ),
        )),
    );
    let input = Input1::new(text);
    let result: Result<(&str, Option<(&str, Option<(char, Option<&str>)>)>), _> =
        parser.parse(input);
    let Ok((tag, passes)) = result else {
        diags.err(
            code::LINE_PARSE,
            span,
            format!("invalid stave leader '{text}'"),
        );
        return None;
    };
    let tag_span = Span::from(span.start..span.start + tag.len());
    let passes = match passes {
        None => PassSpec::All,
        Some((first, rest)) => {
            // Digits already verified, but reject values that overflow or are 0.
            let parse_pass = |digits: &str| -> Option<u32> {
                let n = digits.parse::<u32>().ok().filter(|n| *n > 0);
                if n.is_none() {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        span,
                        format!("invalid pass number '{digits}'"),
                    );
                }
                n
            };
            let first = parse_pass(first)?;
            match rest {
                None => PassSpec::Passes(vec![first]),
                Some((_, None)) => {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        span,
                        "a pass range must have an upper bound",
                    );
                    return None;
                }
                Some((_, Some(last))) => {
                    let last = parse_pass(last)?;
                    if last < first {
                        diags.err(
                            code::MALFORMED_DIRECTIVE,
                            span,
                            format!("invalid pass range {first}-{last}"),
                        );
                        return None;
                    }
                    PassSpec::Passes((first..=last).collect())
                }
            }
        }
    };
    Some((
        Spanned::new(tag_span, tag),
        Spanned::new(span, passes),
    ))
}

/// Decodes one beat group: each non-combining character starts a symbol and
/// the combining characters that follow attach to it as modifiers, sorted
/// into canonical order.
fn decode_beat(diags: &Diagnostics, font: &FontTable, span: Span, text: &str) -> RawBeat {
    let mut symbols: Vec<RawSymbol> = Vec::new();
    let mut offset = span.start;
    for ch in text.chars() {
        let ch_span = Span::from(offset..offset + ch.len_utf8());
        offset = ch_span.end;
        if ch == ' ' {
            // Spaces may be used for visual alignment within a beat.
            continue;
        }
        match font.get(ch) {
            None => diags.err(
                code::UNKNOWN_SYMBOL,
                ch_span,
                format!("character '{ch}' is not in the font table"),
            ),
            Some(glyph) if glyph.is_modifier() => match symbols.last_mut() {
                Some(last) => {
                    last.modifiers.push(ch);
                    last.span.end = ch_span.end;
                }
                None => diags.err(
                    code::LINE_PARSE,
                    ch_span,
                    "modifier without a preceding base symbol",
                ),
            },
            Some(_) => symbols.push(RawSymbol {
                span: ch_span,
                base: ch,
                modifiers: Vec::new(),
            }),
        }
    }
    for s in &mut symbols {
        s.modifiers.sort_by_key(|c| font.modifier_order(*c));
    }
    symbols
}

pub fn parse1(src: &str, font: &FontTable) -> Result<Vec<Spanned<Line1>>, Diagnostics> {
    let diags = Diagnostics::new();
    let mut out: Vec<Spanned<Line1>> = Vec::new();
    let mut offset = 0usize;
    for (line_idx, raw_line) in src.split('\n').enumerate() {
        let start = offset;
        offset += raw_line.len() + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let line_nr = line_idx as u32 + 1;
        let line_span = Span::from(start..start + line.len().max(1));
        let fields = split_fields(line, start);

        let parsed = if fields.is_empty() {
            Line1::Blank
        } else if fields[0].1 == "metadata" || fields[0].1.starts_with('{') {
            // The `metadata` literal is optional; the body runs to end of line.
            let body_start = if fields[0].1 == "metadata" {
                match fields.get(1) {
                    Some((s, _)) => s.start,
                    None => {
                        diags.err(code::LINE_PARSE, line_span, "metadata line without a body");
                        continue;
                    }
                }
            } else {
                fields[0].0.start
            };
            let body = src[body_start..line_span.end].trim_end();
            let body_span = Span::from(body_start..body_start + body.len());
            if !body.starts_with('{') {
                diags.err(
                    code::LINE_PARSE,
                    body_span,
                    "a metadata body must be enclosed in braces",
                );
                continue;
            }
            if !body.ends_with('}') || body.len() < 2 {
                diags.err(
                    code::UNTERMINATED_METADATA,
                    body_span,
                    "metadata is missing its closing brace",
                );
                continue;
            }
            Line1::Metadata {
                body: Span::from(body_span.start + 1..body_span.end - 1),
            }
        } else if (fields[0].1 == "comment" && fields.len() > 1)
            || (fields[0].1.is_empty() && fields[1].1.starts_with('#'))
        {
            let text_start = fields[1].0.start;
            let text = src[text_start..line_span.end]
                .trim_end()
                .trim_start_matches('#')
                .trim()
                .to_string();
            Line1::Comment {
                text: Spanned::new(text_start..line_span.end, text),
            }
        } else if fields[0].1 == "comment" {
            Line1::Comment {
                text: Spanned::new(line_span, String::new()),
            }
        } else if fields[0].1.is_empty() {
            diags.err(
                code::LINE_PARSE,
                line_span,
                "this line has content but no tag in its first field",
            );
            continue;
        } else {
            let Some((tag, passes)) = parse_leader(&diags, fields[0].0, &fields[0].1) else {
                continue;
            };
            if fields.len() < 2 {
                diags.err(
                    code::LINE_PARSE,
                    line_span,
                    "a stave line needs at least one beat group",
                );
                continue;
            }
            let beats: Vec<RawBeat> = fields[1..]
                .iter()
                .map(|(span, text)| decode_beat(&diags, font, *span, text))
                .collect();
            Line1::Stave {
                tag,
                passes,
                beats,
                line: line_nr,
            }
        };
        trace(format!("pass 1 line {line_nr}: {parsed:?}"));
        out.push(Spanned::new(line_span, parsed));
    }
    diags.into_result(out)
}

#[cfg(test)]
mod tests;
