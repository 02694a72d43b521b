//! Position binding (pipeline stage 4): casts measures written under a
//! shared tag into each target position's range. The rules table supplies an
//! ordered list of transforms per position; the first transform that maps
//! every melodic note of the measure wins.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::metadata::{MetaData, Switch};
use crate::score::build::resolve_tags;
use crate::score::{Note, Score, notes_duration};
use crate::tables::{Position, SharedTransform, Tables, Tone};
use std::collections::BTreeSet;

fn same_pitch(tables: &Tables, position: Position, tone: Tone, extended: bool) -> Option<Tone> {
    // Accept the written octave, or the nearest octave at most one away.
    tables
        .instruments
        .tones_with_pitch(position, tone.pitch, tone.octave, extended)
        .into_iter()
        .find(|t| (t.octave - tone.octave).abs() <= 1)
}

fn apply_transform(
    tables: &Tables,
    transform: SharedTransform,
    position: Position,
    notes: &[Note],
    autokempyung: bool,
) -> Option<Vec<Note>> {
    let mut out = Vec::with_capacity(notes.len());
    for note in notes {
        let Some(tone) = note.tone().filter(|_| note.is_melodic()) else {
            out.push(note.clone());
            continue;
        };
        let mapped = match transform {
            SharedTransform::SamePitch => same_pitch(tables, position, tone, false),
            SharedTransform::SamePitchExtendedRange => same_pitch(tables, position, tone, true),
            SharedTransform::Kempyung if autokempyung => {
                tables
                    .rules
                    .kempyung_in_range(&tables.instruments, tone, position, false)
            }
            // With AUTOKEMPYUNG off, sangsih positions read the shared line
            // at pitch.
            SharedTransform::Kempyung => same_pitch(tables, position, tone, false),
        };
        out.push(note.with_tone(mapped?));
    }
    Some(out)
}

pub fn bind_positions(mut score: Score, tables: &Tables) -> Result<Score, Diagnostics> {
    let diags = Diagnostics::new();
    for gongan in &mut score.gongans {
        // Positions for which AUTOKEMPYUNG has been switched off.
        let mut autokempyung_off: BTreeSet<Position> = BTreeSet::new();
        for meta in gongan.metadata.iter().chain(&score.global_metadata) {
            if let MetaData::AutoKempyung(x) = &meta.value
                && x.status == Switch::Off
            {
                if x.positions.is_empty() {
                    autokempyung_off.extend(score.positions.iter().copied());
                } else {
                    autokempyung_off.extend(resolve_tags(tables, &x.positions));
                }
            }
        }

        for beat in &mut gongan.beats {
            for (position, measure) in &mut beat.measures {
                if measure.shared_with.len() < 2 {
                    continue;
                }
                let shared: BTreeSet<Position> = measure.shared_with.iter().copied().collect();
                let Some(transforms) = tables.rules.shared_transforms(*position, &shared) else {
                    diags.err(
                        code::UNMAPPABLE_SHARED,
                        measure
                            .default_pass()
                            .map(|p| p.span)
                            .unwrap_or((0..1).into()),
                        format!("no shared-notation rule for {position}"),
                    );
                    continue;
                };
                let autokempyung = !autokempyung_off.contains(position);
                for stave in measure.passes.values_mut() {
                    let bound = transforms.iter().find_map(|t| {
                        apply_transform(tables, *t, *position, &stave.notes, autokempyung)
                    });
                    match bound {
                        Some(notes) => stave.notes = notes,
                        None => {
                            diags.err(
                                code::UNMAPPABLE_SHARED,
                                stave.span,
                                format!(
                                    "shared notation cannot be mapped onto {position} (beat {})",
                                    beat.id
                                ),
                            );
                            // Bind a rest measure of the same length so later
                            // stages stay consistent.
                            stave.notes = vec![Note::silence(notes_duration(&stave.notes))];
                        }
                    }
                }
            }
        }
    }
    diags.into_result(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pass2;
    use crate::score::build::build_score;
    use crate::score::{Score, ScoreSettings};
    use crate::tables::{Pitch, Stroke};

    fn bind(src: &str) -> Result<Score, Diagnostics> {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        let score = build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap();
        bind_positions(score, &tables)
    }

    fn beat_pitches(score: &Score, position: Position) -> Vec<(Pitch, Option<i8>)> {
        score.gongans[0].beats[0].measures[&position]
            .default_pass()
            .unwrap()
            .notes
            .iter()
            .filter(|n| n.is_audible())
            .map(|n| (n.pitch, n.octave))
            .collect()
    }

    #[test]
    fn test_sangsih_takes_kempyung() {
        let score = bind("gangsa\to-e-\n").unwrap();
        assert_eq!(
            beat_pitches(&score, Position::PemadePolos),
            vec![(Pitch::Dong, Some(1)), (Pitch::Deng, Some(1))]
        );
        // Builtin kempyung table: DONG/1 -> DANG/1, DENG/1 -> DING/2.
        assert_eq!(
            beat_pitches(&score, Position::PemadeSangsih),
            vec![(Pitch::Dang, Some(1)), (Pitch::Ding, Some(2))]
        );
    }

    #[test]
    fn test_autokempyung_off_keeps_pitch() {
        let score =
            bind("metadata\t{AUTOKEMPYUNG off}\ngangsa\to-e-\n").unwrap();
        assert_eq!(
            beat_pitches(&score, Position::PemadeSangsih),
            vec![(Pitch::Dong, Some(1)), (Pitch::Deng, Some(1))]
        );
    }

    #[test]
    fn test_octave_adjustment_within_range() {
        // Reyong position 1 tops out at DING/1; a written DING/2 comes down
        // one octave under SAME_PITCH.
        let score = bind("reyong13\ti<\n").unwrap();
        assert_eq!(
            beat_pitches(&score, Position::Reyong1),
            vec![(Pitch::Ding, Some(1))]
        );
        assert_eq!(
            beat_pitches(&score, Position::Reyong3),
            vec![(Pitch::Ding, Some(2))]
        );
    }

    #[test]
    fn test_unmappable_binds_rest() {
        // Reyong position 3 has no DANG at all, so the shared line cannot be
        // cast onto it.
        let e = bind("reyong13\ta\n").unwrap_err().get_all();
        assert!(e.iter().any(|d| d.code == code::UNMAPPABLE_SHARED));
    }

    #[test]
    fn test_single_position_is_untouched() {
        let score = bind("calung\to,\n").unwrap();
        assert_eq!(
            beat_pitches(&score, Position::Calung),
            vec![(Pitch::Dong, Some(0))]
        );
    }

    #[test]
    fn test_rests_pass_through() {
        let score = bind("gangsa\to-.-\n").unwrap();
        let notes = &score.gongans[0].beats[0].measures[&Position::PemadeSangsih]
            .default_pass()
            .unwrap()
            .notes;
        assert_eq!(notes[2].stroke, Stroke::Silence);
    }
}
