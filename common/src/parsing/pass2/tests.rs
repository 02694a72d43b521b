use super::*;
use crate::parsing::metadata::{GonganType, MetaData, Passes};
use crate::tables::Tables;

fn parse_ok(src: &str) -> RawNotation {
    parse2(src, &Tables::builtin().font).unwrap()
}

#[test]
fn test_unbound_block_then_gongans() {
    let src = "metadata\t{TEMPO 100}\ncomment\ttitle line\n\npemade\to-i-\n\nkantilan\ti-o-\n";
    let notation = parse_ok(src);
    assert_eq!(notation.unbound.metadata.len(), 1);
    assert_eq!(notation.unbound.comments.len(), 1);
    assert_eq!(notation.gongans.len(), 2);
    assert_eq!(notation.gongans[0].staves.len(), 1);
    assert_eq!(notation.gongans[0].staves[0].tag.value, "pemade");
}

#[test]
fn test_gongan_metadata_attaches() {
    let src = "metadata\t{GONGAN kebyar}\npemade\to-i-\n";
    let notation = parse_ok(src);
    assert!(notation.unbound.metadata.is_empty());
    assert_eq!(notation.gongans.len(), 1);
    let meta = &notation.gongans[0].block.metadata;
    assert_eq!(meta.len(), 1);
    assert_eq!(
        meta[0].value,
        MetaData::Gongan(crate::parsing::metadata::GonganMeta {
            gongan_type: GonganType::Kebyar
        })
    );
}

#[test]
fn test_directive_with_named_params_and_lists() {
    let src = "metadata\t{GOTO coda, from_beat=2, passes=[1, 3]}\npemade\to\n";
    let notation = parse_ok(src);
    let MetaData::Goto(goto) = &notation.gongans[0].block.metadata[0].value else {
        panic!("expected GOTO");
    };
    assert_eq!(goto.label.value, "coda");
    assert_eq!(goto.from_beat, Some(2));
    assert_eq!(goto.passes, Passes(vec![1, 3]));
}

#[test]
fn test_quoted_string_value() {
    let src = "metadata\t{PART \"pengawak one\"}\npemade\to\n";
    let notation = parse_ok(src);
    let MetaData::Part(part) = &notation.gongans[0].block.metadata[0].value else {
        panic!("expected PART");
    };
    assert_eq!(part.name, "pengawak one");
}

#[test]
fn test_malformed_directive() {
    let e = parse2(
        "metadata\t{TEMPO 120,, first_beat=2}\npemade\to\n",
        &Tables::builtin().font,
    )
    .unwrap_err()
    .get_all();
    assert_eq!(e[0].code, code::MALFORMED_DIRECTIVE);
}

#[test]
fn test_spans_point_into_source() {
    let src = "metadata\t{LABEL intro, beat=2}\npemade\to\n";
    let notation = parse_ok(src);
    let meta = &notation.gongans[0].block.metadata[0];
    // The directive span covers the body between the braces.
    assert_eq!(&src[meta.span], "LABEL intro, beat=2");
}

#[test]
fn test_metadata_only_group_later_is_a_gongan() {
    // Only a leading block can be unbound; a later stave-less group must
    // surface as an (invalid) gongan for validation to flag.
    let src = "pemade\to\n\nmetadata\t{TEMPO 80}\n";
    let notation = parse_ok(src);
    assert_eq!(notation.gongans.len(), 2);
    assert!(notation.gongans[1].staves.is_empty());
}
