//! Score construction (pipeline stage 3): turns the raw notation tree into a
//! score with generic notes. Tags resolve to positions here and shared-tag
//! staves are duplicated per position; the pitches stay as written until the
//! binding stage casts them into each position's range.

use crate::parsing::diagnostics::{Diagnostic, Diagnostics, code};
use crate::parsing::metadata::{GonganType, MetaData, Scope};
use crate::parsing::model::{PassSpec, RawNotation, RawStave, RawSymbol, Span, Spanned};
use crate::score::{
    Beat, DEFAULT_PASS, Gongan, LabelRef, Measure, MeasurePass, Note, Score, ScoreSettings,
    most_occurring_duration,
};
use crate::tables::{Modifier, Pitch, Position, Tables};
use num_rational::Ratio;
use std::collections::{BTreeMap, BTreeSet};

/// Converts one decoded symbol into a generic note by applying its modifier
/// characters to the base glyph.
fn symbol_to_note(diags: &Diagnostics, tables: &Tables, sym: &RawSymbol) -> Option<Note> {
    let glyph = tables.font.get(sym.base)?;
    let mut note = Note {
        pitch: glyph.pitch,
        octave: glyph.octave,
        stroke: glyph.stroke,
        duration: glyph.duration,
        rest_after: glyph.rest_after,
        modifier: Modifier::None,
        velocity: None,
        autogenerated: false,
    };
    for ch in &sym.modifiers {
        let Some(m) = tables.font.get(*ch) else {
            continue;
        };
        match m.modifier {
            Modifier::Octave0 | Modifier::Octave2 => {
                if !note.is_melodic() {
                    diags.err(
                        code::LINE_PARSE,
                        sym.span,
                        format!("octave modifier is not applicable to {}", note.pitch),
                    );
                    continue;
                }
                note.octave = Some(if m.modifier == Modifier::Octave0 { 0 } else { 2 });
            }
            Modifier::Mute => {
                if !note.is_audible() {
                    diags.err(code::LINE_PARSE, sym.span, "a rest cannot be muted");
                    continue;
                }
                note.stroke = crate::tables::Stroke::Muted;
            }
            Modifier::Abbreviate => {
                if !note.is_audible() {
                    diags.err(code::LINE_PARSE, sym.span, "a rest cannot be abbreviated");
                    continue;
                }
                note.stroke = crate::tables::Stroke::Abbreviated;
                // An abbreviated note sounds half its written length and
                // rests for the remainder.
                let half = note.duration / 2;
                note.rest_after += half;
                note.duration = half;
            }
            Modifier::HalfNote => {
                note.duration /= 2;
                note.rest_after /= 2;
            }
            Modifier::QuarterNote => {
                note.duration /= 4;
                note.rest_after /= 4;
            }
            Modifier::Tremolo => note.stroke = crate::tables::Stroke::Tremolo,
            Modifier::TremoloAccelerating => {
                note.stroke = crate::tables::Stroke::TremoloAccelerating
            }
            Modifier::Norot => note.stroke = crate::tables::Stroke::Norot,
            Modifier::None => {}
        }
        note.modifier = m.modifier;
    }
    Some(note)
}

/// Validates that every position tag used in a directive resolves.
fn check_metadata_tags(diags: &Diagnostics, tables: &Tables, meta: &Spanned<MetaData>) {
    let tags: Vec<&Spanned<String>> = match &meta.value {
        MetaData::Dynamics(x) => x.positions.iter().collect(),
        MetaData::AutoKempyung(x) => x.positions.iter().collect(),
        MetaData::Suppress(x) => x.positions.iter().collect(),
        MetaData::Octavate(x) => vec![&x.instrument],
        _ => Vec::new(),
    };
    for tag in tags {
        if tables.tags.positions(&tag.value).is_none() {
            diags.err(
                code::UNKNOWN_TAG,
                tag.span,
                format!("unknown instrument tag '{}'", tag.value),
            );
        }
    }
}

/// Resolves the position tags of a directive; unresolvable tags have been
/// reported by [check_metadata_tags] and resolve to nothing.
pub fn resolve_tags(tables: &Tables, tags: &[Spanned<String>]) -> Vec<Position> {
    let mut out: Vec<Position> = tags
        .iter()
        .filter_map(|t| tables.tags.positions(&t.value))
        .flatten()
        .copied()
        .collect();
    out.sort();
    out.dedup();
    out
}

pub fn build_score(
    notation: &RawNotation,
    tables: &Tables,
    settings: &ScoreSettings,
    title: &str,
) -> Result<Score, Diagnostics> {
    let diags = Diagnostics::new();
    let mut score = Score {
        title: title.to_string(),
        positions: BTreeSet::new(),
        gongans: Vec::new(),
        labels: BTreeMap::new(),
        unbound_labels: BTreeMap::new(),
        global_metadata: notation.unbound.metadata.clone(),
        global_comments: notation
            .unbound
            .comments
            .iter()
            .map(|c| c.value.clone())
            .collect(),
        settings: settings.clone(),
    };

    // Labels in the unbound block bind no beat; record them so gotos that
    // target them can be diagnosed.
    for meta in &notation.unbound.metadata {
        check_metadata_tags(&diags, tables, meta);
        if let MetaData::Label(label) = &meta.value {
            score
                .unbound_labels
                .insert(label.name.value.clone(), label.name.span);
        }
    }

    let mut label_spans: BTreeMap<String, Span> = BTreeMap::new();
    for (gongan_idx, raw) in notation.gongans.iter().enumerate() {
        let gongan_id = gongan_idx as u32 + 1;
        let beat_count = raw.staves.iter().map(|s| s.beats.len()).max().unwrap_or(0);
        let mut beats: Vec<Beat> = (0..beat_count)
            .map(|i| Beat {
                id: i as u32 + 1,
                gongan_id,
                duration: Ratio::from_integer(0),
                measures: BTreeMap::new(),
                has_kempli: true,
                validation_ignore: Vec::new(),
            })
            .collect();

        let mut seen_staves: BTreeMap<(Position, i32), Span> = BTreeMap::new();
        for stave in &raw.staves {
            build_stave(&diags, tables, stave, &mut beats, &mut seen_staves, &mut score);
        }

        // Record nominal beat durations as the most common measure length.
        for beat in &mut beats {
            beat.duration = most_occurring_duration(
                beat.measures.values().map(Measure::total_duration),
            );
        }
        let beat_duration = most_occurring_duration(beats.iter().map(|b| b.duration));

        // Score-scoped directives written inside a gongan are lifted to the
        // global list; completion applies them everywhere.
        let mut metadata = Vec::new();
        for meta in &raw.block.metadata {
            check_metadata_tags(&diags, tables, meta);
            match &meta.value {
                MetaData::Sequence(_) => {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        meta.span,
                        "SEQUENCE may only appear in the unbound block before all gongans",
                    );
                }
                MetaData::Label(label) => {
                    let target_beat = label.beat as usize;
                    if target_beat == 0 || target_beat > beat_count {
                        diags.err(
                            code::MALFORMED_DIRECTIVE,
                            label.name.span,
                            format!("label beat {} exceeds the gongan length", label.beat),
                        );
                    } else if let Some(old) = label_spans
                        .insert(label.name.value.clone(), label.name.span)
                        .or_else(|| score.unbound_labels.get(&label.name.value).copied())
                    {
                        diags.push(
                            Diagnostic::new(
                                code::DUPLICATE_LABEL,
                                label.name.span,
                                format!("label '{}' is already defined", label.name.value),
                            )
                            .with_context(old, "here is the previous definition"),
                        );
                    } else {
                        score.labels.insert(
                            label.name.value.clone(),
                            LabelRef {
                                gongan: gongan_idx,
                                beat: target_beat - 1,
                            },
                        );
                    }
                    metadata.push(meta.clone());
                }
                _ if meta.value.scope() == Scope::Score => {
                    score.global_metadata.push(meta.clone());
                }
                _ => metadata.push(meta.clone()),
            }
        }

        score.gongans.push(Gongan {
            id: gongan_id,
            beats,
            beat_duration,
            gongan_type: GonganType::Regular,
            metadata,
            comments: raw.block.comments.iter().map(|c| c.value.clone()).collect(),
        });
    }

    // Global metadata may not carry gongan-scoped flow directives.
    for meta in &score.global_metadata {
        if meta.value.scope() == Scope::Gongan
            && matches!(
                meta.value,
                MetaData::Goto(_) | MetaData::Repeat(_) | MetaData::Gongan(_)
            )
        {
            diags.err(
                code::MALFORMED_DIRECTIVE,
                meta.span,
                format!(
                    "{} must be attached to a gongan, not to the unbound block",
                    meta.value.keyword()
                ),
            );
        }
    }

    diags.into_result(score)
}

fn build_stave(
    diags: &Diagnostics,
    tables: &Tables,
    stave: &RawStave,
    beats: &mut [Beat],
    seen_staves: &mut BTreeMap<(Position, i32), Span>,
    score: &mut Score,
) {
    let Some(positions) = tables.tags.positions(&stave.tag.value) else {
        diags.err(
            code::UNKNOWN_TAG,
            stave.tag.span,
            format!("unknown instrument tag '{}'", stave.tag.value),
        );
        return;
    };
    if positions.is_empty() {
        diags.err(
            code::UNKNOWN_POSITION,
            stave.tag.span,
            format!("tag '{}' resolves to no position", stave.tag.value),
        );
        return;
    }
    let passes: Vec<i32> = match &stave.passes.value {
        PassSpec::All => vec![DEFAULT_PASS],
        PassSpec::Passes(list) => list.iter().map(|p| *p as i32).collect(),
    };
    for position in positions {
        score.positions.insert(*position);
        for pass in &passes {
            if let Some(old) = seen_staves.insert((*position, *pass), stave.tag.span) {
                diags.push(
                    Diagnostic::new(
                        code::LINE_PARSE,
                        stave.tag.span,
                        format!("a stave for {position} on this pass has already occurred"),
                    )
                    .with_context(old, "here is the previous stave"),
                );
                continue;
            }
            for (beat_idx, raw_beat) in stave.beats.iter().enumerate() {
                let notes: Vec<Note> = raw_beat
                    .iter()
                    .filter_map(|sym| symbol_to_note(diags, tables, sym))
                    .collect();
                let span = raw_beat
                    .first()
                    .map(|s| Span::from(s.span.start..raw_beat.last().unwrap().span.end))
                    .unwrap_or(stave.tag.span);
                let measure = beats[beat_idx]
                    .measures
                    .entry(*position)
                    .or_insert_with(|| Measure {
                        position: *position,
                        shared_with: positions.to_vec(),
                        passes: BTreeMap::new(),
                        autogenerated: false,
                    });
                measure.passes.insert(
                    *pass,
                    MeasurePass {
                        pass: *pass,
                        line: stave.line,
                        span,
                        notes,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pass2;
    use crate::tables::Stroke;

    fn build(src: &str) -> Result<Score, Diagnostics> {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        build_score(&notation, &tables, &ScoreSettings::default(), "test")
    }

    #[test]
    fn test_simple_score() {
        let score = build("calung\to-i-\te-u-\n").unwrap();
        assert_eq!(score.gongans.len(), 1);
        let gongan = &score.gongans[0];
        assert_eq!(gongan.beats.len(), 2);
        assert_eq!(gongan.beat_duration, Ratio::from_integer(4));
        let measure = &gongan.beats[0].measures[&Position::Calung];
        let notes = &measure.default_pass().unwrap().notes;
        assert_eq!(notes.len(), 4);
        assert_eq!(notes[0].pitch, Pitch::Dong);
        assert_eq!(notes[0].octave, Some(1));
        assert_eq!(notes[1].stroke, Stroke::Extension);
    }

    #[test]
    fn test_shared_tag_duplicates_measures() {
        let score = build("gangsa\to-i-\n").unwrap();
        let beat = &score.gongans[0].beats[0];
        assert_eq!(beat.measures.len(), 4);
        let m = &beat.measures[&Position::KantilanSangsih];
        assert_eq!(m.shared_with.len(), 4);
    }

    #[test]
    fn test_modifiers() {
        let score = build("pemade\to,/u<a_\n").unwrap();
        let notes = &score.gongans[0].beats[0].measures[&Position::PemadePolos]
            .default_pass()
            .unwrap()
            .notes;
        assert_eq!(notes[0].octave, Some(0));
        assert_eq!(notes[0].stroke, Stroke::Muted);
        assert_eq!(notes[1].octave, Some(2));
        assert_eq!(notes[2].duration, Ratio::new(1, 2));
    }

    #[test]
    fn test_pass_specific_stave() {
        let score = build("calung\to-i-\ncalung:2\tu-a-\n").unwrap();
        let measure = &score.gongans[0].beats[0].measures[&Position::Calung];
        assert!(measure.passes.contains_key(&DEFAULT_PASS));
        assert!(measure.passes.contains_key(&2));
    }

    #[test]
    fn test_unknown_tag() {
        let e = build("zither\to-i-\n").unwrap_err().get_all();
        assert_eq!(e[0].code, code::UNKNOWN_TAG);
    }

    #[test]
    fn test_duplicate_label() {
        let e = build(
            "metadata\t{LABEL intro}\nmetadata\t{LABEL intro}\ncalung\to-i-\n",
        )
        .unwrap_err()
        .get_all();
        assert_eq!(e[0].code, code::DUPLICATE_LABEL);
    }

    #[test]
    fn test_labels_resolve() {
        let score = build(
            "calung\to-i-\n\nmetadata\t{LABEL coda, beat=2}\ncalung\tu-a-\ti-o-\n",
        )
        .unwrap();
        assert_eq!(score.label("coda"), Some(LabelRef { gongan: 1, beat: 1 }));
    }
}
