// Pass 2 assembles classified lines into the raw notation tree: gongans are
// maximal runs of non-blank lines, and metadata bodies are parsed with the
// directive grammar `KEYWORD [value [, key=value]*]` into typed directives.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::metadata::MetaData;
use crate::parsing::model::{
    ParamValue, RawDirective, RawGongan, RawNotation, RawParam, RawStave, Span, Spanned,
};
use crate::parsing::pass1::{self, Input1, Line1, trace};
use crate::tables::FontTable;
use winnow::Parser;
use winnow::combinator::{alt, delimited, opt, preceded, separated, terminated};
use winnow::stream::AsChar;
use winnow::token::take_while;

fn p_space(input: &mut Input1<'_>) -> winnow::Result<()> {
    take_while(0.., |c: char| c == ' ')
        .void()
        .parse_next(input)
}

fn p_keyword(input: &mut Input1<'_>) -> winnow::Result<Spanned<String>> {
    take_while(1.., |c: char| c.is_ascii_uppercase())
        .with_span()
        .parse_next(input)
        .map(|(s, span): (&str, _)| Spanned::new(Span::from(span), s))
}

fn p_ident(input: &mut Input1<'_>) -> winnow::Result<Spanned<String>> {
    (
        take_while(1, |c: char| AsChar::is_alpha(c)),
        take_while(0.., |c: char| AsChar::is_alphanum(c) || c == '_'),
    )
        .take()
        .with_span()
        .parse_next(input)
        .map(|(s, span): (&str, _)| Spanned::new(Span::from(span), s))
}

fn p_string(input: &mut Input1<'_>) -> winnow::Result<Spanned<ParamValue>> {
    alt((
        delimited('"', take_while(0.., |c: char| c != '"'), '"'),
        delimited('\'', take_while(0.., |c: char| c != '\''), '\''),
    ))
    .with_span()
    .parse_next(input)
    .map(|(s, span): (&str, _)| Spanned::new(Span::from(span), ParamValue::Str(s.to_string())))
}

/// Bare words cover enum-ish values (`regular`, `beat-duration`) and labels.
fn p_word(input: &mut Input1<'_>) -> winnow::Result<Spanned<ParamValue>> {
    (
        take_while(1, |c: char| AsChar::is_alpha(c) || c == '_'),
        take_while(0.., |c: char| {
            AsChar::is_alphanum(c) || c == '_' || c == '-'
        }),
    )
        .take()
        .with_span()
        .parse_next(input)
        .map(|(s, span): (&str, _)| Spanned::new(Span::from(span), ParamValue::Word(s.to_string())))
}

fn p_number<'d>(
    diags: &'d Diagnostics,
    base: usize,
) -> impl FnMut(&mut Input1<'_>) -> winnow::Result<Spanned<ParamValue>> + 'd {
    move |input| {
        (
            opt('-'),
            take_while(1.., AsChar::is_dec_digit),
            opt(('.', take_while(1.., AsChar::is_dec_digit))),
        )
            .take()
            .with_span()
            .parse_next(input)
            .map(|(s, span): (&str, _)| {
                let value = if s.contains('.') {
                    // Floats only occur for WAIT seconds.
                    ParamValue::Float(s.parse().unwrap_or(0.0))
                } else {
                    match s.parse() {
                        Ok(n) => ParamValue::Int(n),
                        Err(_) => {
                            diags.err(
                                code::MALFORMED_DIRECTIVE,
                                Span::from(span.clone()).offset(base),
                                "number out of range",
                            );
                            ParamValue::Int(0)
                        }
                    }
                };
                Spanned::new(Span::from(span), value)
            })
    }
}

fn p_value<'d>(
    diags: &'d Diagnostics,
    base: usize,
) -> impl FnMut(&mut Input1<'_>) -> winnow::Result<Spanned<ParamValue>> + 'd {
    move |input| {
        let list = |input: &mut Input1<'_>| {
            delimited(
                ('[', p_space),
                separated(0.., p_value(diags, base), (p_space, ',', p_space)),
                (p_space, ']'),
            )
            .with_span()
            .parse_next(input)
            .map(|(items, span): (Vec<Spanned<ParamValue>>, _)| {
                Spanned::new(Span::from(span), ParamValue::List(items))
            })
        };
        alt((p_string, list, p_number(diags, base), p_word)).parse_next(input)
    }
}

fn p_param<'d>(
    diags: &'d Diagnostics,
    base: usize,
) -> impl FnMut(&mut Input1<'_>) -> winnow::Result<RawParam> + 'd {
    move |input| {
        (
            opt(terminated(p_ident, (p_space, '=', p_space))),
            p_value(diags, base),
        )
            .parse_next(input)
            .map(|(key, value)| RawParam { key, value })
    }
}

fn p_directive<'d>(
    diags: &'d Diagnostics,
    base: usize,
) -> impl FnMut(&mut Input1<'_>) -> winnow::Result<RawDirective> + 'd {
    move |input| {
        (
            preceded(p_space, p_keyword),
            opt(preceded(
                take_while(1.., |c: char| c == ' '),
                separated(1.., p_param(diags, base), (p_space, ',', p_space)),
            )),
            p_space,
        )
            .parse_next(input)
            .map(|(name, params, ()): (_, Option<Vec<RawParam>>, _)| RawDirective {
                name,
                params: params.unwrap_or_default(),
            })
    }
}

fn offset_value(v: &mut Spanned<ParamValue>, base: usize) {
    v.span = v.span.offset(base);
    if let ParamValue::List(items) = &mut v.value {
        for item in items {
            offset_value(item, base);
        }
    }
}

/// Parses the body of a metadata line (the text between the braces) into a
/// raw directive with spans rebased onto the whole source.
fn parse_directive(diags: &Diagnostics, src: &str, body: Span) -> Option<RawDirective> {
    let text = &src[body];
    let input = Input1::new(text);
    match p_directive(diags, body.start).parse(input) {
        Ok(mut d) => {
            d.name.span = d.name.span.offset(body.start);
            for p in &mut d.params {
                if let Some(k) = &mut p.key {
                    k.span = k.span.offset(body.start);
                }
                offset_value(&mut p.value, body.start);
            }
            Some(d)
        }
        Err(e) => {
            let at = body.start + e.offset().min(text.len());
            diags.err(
                code::MALFORMED_DIRECTIVE,
                at..at + 1,
                "unable to parse metadata directive",
            );
            None
        }
    }
}

fn flush(
    current: &mut Option<RawGongan>,
    notation: &mut RawNotation,
    first_group: &mut bool,
) {
    if let Some(g) = current.take() {
        if *first_group && g.staves.is_empty() {
            // A leading block without staves is the unbound score-level block.
            notation.unbound = g.block;
        } else {
            notation.gongans.push(g);
        }
        *first_group = false;
    }
}

pub fn parse2(src: &str, font: &FontTable) -> Result<RawNotation, Diagnostics> {
    let lines = pass1::parse1(src, font)?;
    let diags = Diagnostics::new();
    let mut notation = RawNotation::default();
    let mut current: Option<RawGongan> = None;
    let mut first_group = true;

    for line in lines {
        match line.value {
            Line1::Blank => flush(&mut current, &mut notation, &mut first_group),
            Line1::Metadata { body } => {
                if let Some(d) = parse_directive(&diags, src, body) {
                    let d = Spanned::new(body, d);
                    if let Some(meta) = MetaData::from_raw(&diags, &d) {
                        trace(format!("pass 2 directive: {meta:?}"));
                        current
                            .get_or_insert_with(Default::default)
                            .block
                            .metadata
                            .push(Spanned::new(body, meta));
                    }
                }
            }
            Line1::Comment { text } => {
                current
                    .get_or_insert_with(Default::default)
                    .block
                    .comments
                    .push(text);
            }
            Line1::Stave {
                tag,
                passes,
                beats,
                line: line_nr,
            } => {
                current
                    .get_or_insert_with(Default::default)
                    .staves
                    .push(RawStave {
                        tag,
                        passes,
                        beats,
                        line: line_nr,
                    });
            }
        }
    }
    flush(&mut current, &mut notation, &mut first_group);
    diags.into_result(notation)
}

#[cfg(test)]
mod tests;
