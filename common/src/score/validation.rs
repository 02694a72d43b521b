//! Score validation (pipeline stage 7): beat-length equality, stave
//! coverage, instrument range and kempyung correctness, each of which can be
//! waived per beat with a VALIDATION directive. Kempyung autocorrection
//! rewrites the sangsih line and reports warnings instead of errors.

use crate::parsing::diagnostics::{Diagnostic, Diagnostics, code};
use crate::parsing::metadata::{GonganType, ValidationProperty};
use crate::score::{Note, Score, notes_duration};
use crate::tables::{Position, Tables, Tone};
use log::warn;

#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub autocorrect: bool,
    pub detailed_logging: bool,
}

fn check_beat_lengths(diags: &Diagnostics, score: &Score) {
    for gongan in &score.gongans {
        if gongan.gongan_type != GonganType::Regular {
            continue;
        }
        for beat in &gongan.beats {
            if beat.ignores(ValidationProperty::BeatDuration) {
                continue;
            }
            for (position, measure) in &beat.measures {
                if measure.autogenerated {
                    continue;
                }
                for stave in measure.passes.values() {
                    let actual = notes_duration(&stave.notes);
                    if actual != beat.duration {
                        diags.err(
                            code::BEAT_LENGTH,
                            stave.span,
                            format!(
                                "gongan {} beat {}: {position} has length {actual}, expected {}",
                                gongan.id, beat.id, beat.duration
                            ),
                        );
                    }
                }
            }
        }
    }
}

fn check_stave_lengths(diags: &Diagnostics, score: &Score) {
    for gongan in &score.gongans {
        if gongan
            .beats
            .first()
            .is_some_and(|b| b.ignores(ValidationProperty::StaveLength))
        {
            continue;
        }
        if gongan.beats.is_empty() {
            let span = gongan
                .metadata
                .first()
                .map(|m| m.span)
                .unwrap_or((0..1).into());
            diags.err(
                code::STAVE_LENGTH,
                span,
                format!("gongan {} has no staves", gongan.id),
            );
            continue;
        }
        // Every hand-written stave must cover every beat of its gongan.
        for position in &score.positions {
            let written = gongan
                .beats
                .iter()
                .filter(|b| {
                    b.measures
                        .get(position)
                        .is_some_and(|m| !m.autogenerated)
                })
                .count();
            if written > 0 && written < gongan.beats.len() {
                let span = gongan
                    .beats
                    .iter()
                    .find_map(|b| {
                        b.measures
                            .get(position)
                            .filter(|m| !m.autogenerated)
                            .and_then(|m| m.default_pass().map(|p| p.span))
                    })
                    .unwrap_or((0..1).into());
                diags.err(
                    code::STAVE_LENGTH,
                    span,
                    format!(
                        "gongan {}: {position} covers {written} of {} beats",
                        gongan.id,
                        gongan.beats.len()
                    ),
                );
            }
        }
    }
}

fn check_ranges(diags: &Diagnostics, score: &Score, tables: &Tables) {
    for gongan in &score.gongans {
        for beat in &gongan.beats {
            if beat.ignores(ValidationProperty::InstrumentRange) {
                continue;
            }
            for (position, measure) in &beat.measures {
                if measure.autogenerated {
                    continue;
                }
                for stave in measure.passes.values() {
                    for note in &stave.notes {
                        let Some(tone) = note.tone().filter(|_| note.is_melodic()) else {
                            continue;
                        };
                        if !tables.instruments.contains(*position, tone, true) {
                            diags.err(
                                code::NOTE_RANGE,
                                stave.span,
                                format!(
                                    "gongan {} beat {}: {tone} is outside the range of {position}",
                                    gongan.id, beat.id
                                ),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// The expected sangsih tone: the kempyung equivalent bounded to the nominal
/// range, falling back to the polos tone itself when the pair leaves the
/// instrument.
fn expected_sangsih(tables: &Tables, position: Position, polos: Tone) -> Tone {
    tables
        .rules
        .kempyung_in_range(&tables.instruments, polos, position, false)
        .unwrap_or(polos)
}

/// Two staves are homophone when they agree in rhythm and articulation; only
/// then is the sangsih expected to play the kempyung.
fn homophone(polos: &[Note], sangsih: &[Note]) -> bool {
    polos.len() == sangsih.len()
        && polos.iter().zip(sangsih).all(|(p, s)| {
            p.stroke == s.stroke && p.duration == s.duration && p.rest_after == s.rest_after
        })
}

fn check_kempyung(
    diags: &Diagnostics,
    score: &mut Score,
    tables: &Tables,
    options: &ValidationOptions,
) {
    for gongan in &mut score.gongans {
        if gongan.gongan_type != GonganType::Regular {
            continue;
        }
        for beat in &mut gongan.beats {
            if beat.ignores(ValidationProperty::Kempyung) {
                continue;
            }
            for (polos_pos, sangsih_pos) in tables.rules.polos_sangsih_pairs() {
                // Gather corrections first so the pair borrow ends before the
                // sangsih stave is rewritten.
                let mut corrections: Vec<(i32, Vec<(usize, Tone)>)> = Vec::new();
                {
                    let (Some(polos), Some(sangsih)) = (
                        beat.measures.get(polos_pos),
                        beat.measures.get(sangsih_pos),
                    ) else {
                        continue;
                    };
                    if polos.autogenerated || sangsih.autogenerated {
                        continue;
                    }
                    for (pass, s_stave) in &sangsih.passes {
                        let Some(p_stave) = polos.passes.get(pass) else {
                            continue;
                        };
                        if !homophone(&p_stave.notes, &s_stave.notes) {
                            continue;
                        }
                        let mut fixes: Vec<(usize, Tone)> = Vec::new();
                        for (i, (p, s)) in p_stave.notes.iter().zip(&s_stave.notes).enumerate() {
                            let (Some(p_tone), Some(s_tone)) = (
                                p.tone().filter(|_| p.is_melodic()),
                                s.tone().filter(|_| s.is_melodic()),
                            ) else {
                                continue;
                            };
                            let expected = expected_sangsih(tables, *sangsih_pos, p_tone);
                            if s_tone != expected {
                                if options.autocorrect {
                                    fixes.push((i, expected));
                                } else {
                                    diags.push(
                                        Diagnostic::new(
                                            code::KEMPYUNG,
                                            s_stave.span,
                                            format!(
                                                "gongan {} beat {}: {sangsih_pos} plays {s_tone} \
                                                 where the kempyung of {p_tone} is {expected}",
                                                gongan.id, beat.id
                                            ),
                                        )
                                        .with_context(p_stave.span, "here is the polos line"),
                                    );
                                }
                            }
                        }
                        if !fixes.is_empty() {
                            corrections.push((*pass, fixes));
                        }
                    }
                }
                for (pass, fixes) in corrections {
                    warn!(
                        "gongan {} beat {}: corrected {} kempyung note(s) for {sangsih_pos}",
                        gongan.id,
                        beat.id,
                        fixes.len()
                    );
                    if let Some(stave) = beat
                        .measures
                        .get_mut(sangsih_pos)
                        .and_then(|m| m.passes.get_mut(&pass))
                    {
                        for (i, tone) in fixes {
                            stave.notes[i] = stave.notes[i].with_tone(tone);
                        }
                    }
                }
            }
        }
    }
}

/// Validates the completed score. With autocorrection enabled the returned
/// score may differ from the input; autocorrections warn, they do not fail
/// the pipeline.
pub fn validate_score(
    score: &Score,
    tables: &Tables,
    options: &ValidationOptions,
) -> Result<Score, Diagnostics> {
    let diags = Diagnostics::new();
    let mut checked = score.clone();
    check_beat_lengths(&diags, &checked);
    check_stave_lengths(&diags, &checked);
    check_ranges(&diags, &checked, tables);
    check_kempyung(&diags, &mut checked, tables, options);
    if options.detailed_logging {
        warn!("validation finished with {} finding(s)", diags.num_errors());
    }
    diags.into_result(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pass2;
    use crate::score::ScoreSettings;
    use crate::score::binding::bind_positions;
    use crate::score::build::build_score;
    use crate::score::completion::complete_score;
    use crate::score::patterns::elaborate_patterns;
    use crate::tables::Pitch;

    fn validate(src: &str, options: &ValidationOptions) -> Result<Score, Diagnostics> {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        let score = build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap();
        let score = bind_positions(score, &tables).unwrap();
        let score = elaborate_patterns(score, &tables).unwrap();
        let score = complete_score(score, &tables).unwrap();
        validate_score(&score, &tables, options)
    }

    #[test]
    fn test_valid_score_passes() {
        assert!(validate("pemade\to-i-\te-u-\n", &ValidationOptions::default()).is_ok());
    }

    #[test]
    fn test_beat_length_mismatch() {
        let e = validate(
            "pemade_polos\to-i-\npemade_sangsih\ta-\n",
            &ValidationOptions::default(),
        )
        .unwrap_err()
        .get_all();
        assert!(e.iter().any(|d| d.code == code::BEAT_LENGTH));
    }

    #[test]
    fn test_beat_length_ignore() {
        let r = validate(
            "metadata\t{VALIDATION ignore=[beat-duration]}\npemade_polos\to-i-\npemade_sangsih\ta-\n",
            &ValidationOptions::default(),
        );
        assert!(r.is_ok());
    }

    #[test]
    fn test_stave_length_mismatch() {
        let e = validate(
            "pemade_polos\to-i-\te-u-\npemade_sangsih\ta-i-\n",
            &ValidationOptions::default(),
        )
        .unwrap_err()
        .get_all();
        assert!(e.iter().any(|d| d.code == code::STAVE_LENGTH));
    }

    #[test]
    fn test_empty_gongan() {
        let e = validate(
            "pemade\to-i-\n\nmetadata\t{PART closing}\n",
            &ValidationOptions::default(),
        )
        .unwrap_err()
        .get_all();
        assert!(e.iter().any(|d| d.code == code::STAVE_LENGTH));
    }

    #[test]
    fn test_note_out_of_range() {
        // DANG/2 is beyond the pemade's extended range.
        let e = validate("pemade_polos\ta<---\n", &ValidationOptions::default())
            .unwrap_err()
            .get_all();
        assert!(e.iter().any(|d| d.code == code::NOTE_RANGE));
    }

    #[test]
    fn test_kempyung_mismatch_reported() {
        // Polos DONG/1 expects sangsih DANG/1; DENG/1 is wrong.
        let e = validate(
            "pemade_polos\to---\npemade_sangsih\te---\n",
            &ValidationOptions::default(),
        )
        .unwrap_err()
        .get_all();
        assert!(e.iter().any(|d| d.code == code::KEMPYUNG));
    }

    #[test]
    fn test_kempyung_autocorrect() {
        let options = ValidationOptions {
            autocorrect: true,
            detailed_logging: false,
        };
        let score = validate(
            "pemade_polos\to-e-\npemade_sangsih\te-u-\n",
            &options,
        )
        .unwrap();
        let notes = &score.gongans[0].beats[0].measures[&Position::PemadeSangsih]
            .default_pass()
            .unwrap()
            .notes;
        // DONG/1 -> DANG/1 and DENG/1 -> DING/2 per the builtin pair table.
        assert_eq!((notes[0].pitch, notes[0].octave), (Pitch::Dang, Some(1)));
        assert_eq!((notes[2].pitch, notes[2].octave), (Pitch::Ding, Some(2)));
    }

    #[test]
    fn test_kempyung_autocorrect_is_fixed_point() {
        let options = ValidationOptions {
            autocorrect: true,
            detailed_logging: false,
        };
        let tables = Tables::builtin();
        let src = "pemade_polos\to-e-\npemade_sangsih\te-u-\n";
        let notation = pass2::parse2(src, &tables.font).unwrap();
        let score = build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap();
        let score = bind_positions(score, &tables).unwrap();
        let score = elaborate_patterns(score, &tables).unwrap();
        let score = complete_score(score, &tables).unwrap();
        let once = validate_score(&score, &tables, &options).unwrap();
        let twice = validate_score(&once, &tables, &options).unwrap();
        assert_eq!(
            format!("{:?}", once.gongans[0].beats[0].measures),
            format!("{:?}", twice.gongans[0].beats[0].measures)
        );
    }

    #[test]
    fn test_heterophone_staves_are_not_checked() {
        // Different rhythms: no kempyung expectation.
        let r = validate(
            "pemade_polos\to-e-\npemade_sangsih\te.u.\n",
            &ValidationOptions::default(),
        );
        assert!(r.is_ok());
    }
}
