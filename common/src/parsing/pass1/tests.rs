use super::*;
use crate::tables::Tables;

fn font() -> FontTable {
    Tables::builtin().font
}

fn parse_ok(src: &str) -> Vec<Spanned<Line1>> {
    parse1(src, &font()).unwrap()
}

#[test]
fn test_stave_line() {
    let lines = parse_ok("pemade\to-i-\to-e-\n");
    let [line, _blank] = lines.as_slice() else {
        panic!("expected two lines, got {lines:?}");
    };
    let Line1::Stave {
        tag,
        passes,
        beats,
        line: line_nr,
    } = &line.value
    else {
        panic!("expected a stave line, got {line:?}");
    };
    assert_eq!(tag.value, "pemade");
    assert_eq!(passes.value, PassSpec::All);
    assert_eq!(*line_nr, 1);
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].len(), 4);
    assert_eq!(beats[0][0].base, 'o');
    assert!(beats[0][0].modifiers.is_empty());
    assert_eq!(beats[0][1].base, '-');
}

#[test]
fn test_modifiers_attach_and_sort() {
    // The mute comes before the octave in the input; canonical order puts the
    // octave modifier first.
    let lines = parse_ok("ugal\to/,\n");
    let Line1::Stave { beats, .. } = &lines[0].value else {
        panic!("expected a stave line");
    };
    assert_eq!(beats[0][0].base, 'o');
    assert_eq!(beats[0][0].modifiers, vec![',', '/']);
}

#[test]
fn test_pass_specifiers() {
    let lines = parse_ok("pemade:2\to\nkantilan:1-3\ti\n");
    let Line1::Stave { passes, .. } = &lines[0].value else {
        panic!("expected a stave line");
    };
    assert_eq!(passes.value, PassSpec::Passes(vec![2]));
    let Line1::Stave { passes, .. } = &lines[1].value else {
        panic!("expected a stave line");
    };
    assert_eq!(passes.value, PassSpec::Passes(vec![1, 2, 3]));
}

#[test]
fn test_open_pass_range_rejected() {
    let e = parse1("pemade:1-\to\n", &font()).unwrap_err().get_all();
    assert_eq!(e[0].code, code::MALFORMED_DIRECTIVE);
    assert!(e[0].message.value.contains("upper bound"));
}

#[test]
fn test_unknown_symbol() {
    let e = parse1("pemade\toqo\n", &font()).unwrap_err().get_all();
    assert_eq!(e[0].code, code::UNKNOWN_SYMBOL);
    // The span points at the offending character.
    assert_eq!(e[0].message.span.start, 8);
}

#[test]
fn test_modifier_without_base() {
    let e = parse1("pemade\t,o\n", &font()).unwrap_err().get_all();
    assert_eq!(e[0].code, code::LINE_PARSE);
}

#[test]
fn test_comment_forms() {
    let lines = parse_ok("comment\thello there\n\t# inline form\n");
    let Line1::Comment { text } = &lines[0].value else {
        panic!("expected a comment");
    };
    assert_eq!(text.value, "hello there");
    let Line1::Comment { text } = &lines[1].value else {
        panic!("expected a comment");
    };
    assert_eq!(text.value, "inline form");
}

#[test]
fn test_metadata_line() {
    let src = "metadata\t{TEMPO 120}\n";
    let lines = parse_ok(src);
    let Line1::Metadata { body } = &lines[0].value else {
        panic!("expected metadata");
    };
    assert_eq!(&src[*body], "TEMPO 120");
}

#[test]
fn test_metadata_without_literal() {
    let src = "{LABEL intro}\n";
    let lines = parse_ok(src);
    let Line1::Metadata { body } = &lines[0].value else {
        panic!("expected metadata");
    };
    assert_eq!(&src[*body], "LABEL intro");
}

#[test]
fn test_unterminated_metadata() {
    let e = parse1("metadata\t{TEMPO 120\n", &font())
        .unwrap_err()
        .get_all();
    assert_eq!(e[0].code, code::UNTERMINATED_METADATA);
}

#[test]
fn test_content_without_tag() {
    let e = parse1("\to-i-\n", &font()).unwrap_err().get_all();
    assert_eq!(e[0].code, code::LINE_PARSE);
}

#[test]
fn test_crlf_and_trailing_tabs() {
    let lines = parse_ok("pemade\to-i-\t\t\r\n");
    let Line1::Stave { beats, .. } = &lines[0].value else {
        panic!("expected a stave line");
    };
    assert_eq!(beats.len(), 1);
}
