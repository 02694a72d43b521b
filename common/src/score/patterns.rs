//! Pattern elaboration (pipeline stage 5): expands shorthand symbols into
//! concrete note sequences. Tremolos unfold into repetitions, accelerating
//! tremolos consume the configured duration/velocity tables, ornaments like
//! norot expand by table-driven rules, grace notes steal time from their
//! predecessor, and shorthand staves are padded to the nominal beat length.
//! Elaboration is idempotent: everything it emits is a plain struck note.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::model::Span;
use crate::score::{Note, Score, ScoreSettings, notes_duration};
use crate::tables::{Position, Stroke, Tables};
use num_rational::Ratio;

fn zero() -> Ratio<u32> {
    Ratio::from_integer(0)
}

/// A grace note sounds just before its successor; its time comes out of the
/// preceding note, rest first.
fn expand_grace_notes(
    diags: &Diagnostics,
    tables: &Tables,
    position: Position,
    notes: &mut [Note],
    span: Span,
) {
    for i in 0..notes.len() {
        if notes[i].stroke != Stroke::GraceNote {
            continue;
        }
        if i == 0 {
            diags.err(
                code::LINE_PARSE,
                span,
                "a grace note may not start a measure",
            );
            notes[i].duration = zero();
            notes[i].stroke = Stroke::Open;
            continue;
        }
        let steal = notes[i].duration;
        let from_rest = notes[i - 1].rest_after.min(steal);
        notes[i - 1].rest_after -= from_rest;
        let from_duration = notes[i - 1].duration.min(steal - from_rest);
        notes[i - 1].duration -= from_duration;
        // If the predecessor was too short, the grace note shrinks with it.
        notes[i].duration = from_rest + from_duration;
        // Pick the octave that puts the grace note nearest its successor.
        if let Some(next_tone) = notes.get(i + 1).and_then(|n| n.tone())
            && notes[i].is_melodic()
        {
            if let Some(nearest) = tables
                .instruments
                .tones_with_pitch(position, notes[i].pitch, next_tone.octave, false)
                .first()
            {
                notes[i].octave = Some(nearest.octave);
            }
        }
        notes[i].stroke = Stroke::Open;
    }
}

fn expand_tremolo(settings: &ScoreSettings, note: &Note) -> Vec<Note> {
    let npq = settings.tremolo.notes_per_quarternote;
    let count = (note.duration * npq).round().to_integer().max(1);
    let sub = note.duration / count;
    (0..count)
        .map(|i| Note {
            stroke: Stroke::Open,
            duration: sub,
            rest_after: if i + 1 == count { note.rest_after } else { zero() },
            ..note.clone()
        })
        .collect()
}

/// One or two consecutive accelerating-tremolo notes alternate through the
/// configured pattern; the pattern length is even so a two-note tremolo ends
/// on its second note.
fn expand_accelerating(settings: &ScoreSettings, notes: &[Note]) -> Vec<Note> {
    let pattern = &settings.tremolo.accelerating_pattern;
    let velocities = &settings.tremolo.accelerating_velocity;
    let mut out = Vec::with_capacity(pattern.len());
    for (i, (ticks, velocity)) in pattern.iter().zip(velocities).enumerate() {
        let base = &notes[i % notes.len()];
        out.push(Note {
            stroke: Stroke::Open,
            duration: Ratio::new(*ticks, settings.base_note_time),
            rest_after: zero(),
            velocity: Some(*velocity),
            ..base.clone()
        });
    }
    out
}

fn expand_ornament(
    tables: &Tables,
    position: Position,
    note: &Note,
    steps: &[crate::tables::OrnamentStep],
) -> Vec<Note> {
    let mut out = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let tone = note
            .tone()
            .and_then(|t| tables.instruments.step(position, t, step.degree))
            .or_else(|| note.tone());
        let mut n = Note {
            stroke: Stroke::Open,
            duration: note.duration * step.fraction,
            rest_after: if i + 1 == steps.len() { note.rest_after } else { zero() },
            ..note.clone()
        };
        if let Some(tone) = tone {
            n = n.with_tone(tone);
        }
        out.push(n);
    }
    out
}

fn expand_stave(
    tables: &Tables,
    settings: &ScoreSettings,
    position: Position,
    notes: &[Note],
) -> Vec<Note> {
    let mut out = Vec::with_capacity(notes.len());
    let mut i = 0;
    while i < notes.len() {
        let note = &notes[i];
        match note.stroke {
            Stroke::Tremolo => {
                out.extend(expand_tremolo(settings, note));
                i += 1;
            }
            Stroke::TremoloAccelerating => {
                // Up to two consecutive notes form one accelerating tremolo.
                let pair_len = if notes
                    .get(i + 1)
                    .is_some_and(|n| n.stroke == Stroke::TremoloAccelerating)
                {
                    2
                } else {
                    1
                };
                out.extend(expand_accelerating(settings, &notes[i..i + pair_len]));
                i += pair_len;
            }
            stroke => {
                match tables.rules.ornament(stroke) {
                    Some(steps) => out.extend(expand_ornament(tables, position, note, steps)),
                    None => out.push(note.clone()),
                }
                i += 1;
            }
        }
    }
    out
}

/// Pads a shorthand stave up to the nominal beat length. Whether the filler
/// extends the last note or rests is decided by the last note's natural
/// sustain from the font table.
fn pad_to(notes: &mut Vec<Note>, target: Ratio<u32>) {
    let mut total = notes_duration(notes);
    if total >= target {
        return;
    }
    let extend = notes
        .last()
        .is_some_and(|last| last.is_audible() && last.rest_after == zero());
    while total < target {
        let unit = (target - total).min(Ratio::from_integer(1));
        notes.push(if extend {
            Note::extension(unit)
        } else {
            Note::silence(unit)
        });
        total += unit;
    }
}

pub fn elaborate_patterns(mut score: Score, tables: &Tables) -> Result<Score, Diagnostics> {
    let diags = Diagnostics::new();
    let settings = score.settings.clone();
    for gongan in &mut score.gongans {
        for beat in &mut gongan.beats {
            let target = beat.duration;
            for (position, measure) in &mut beat.measures {
                let shorthand = settings
                    .shorthand_instruments
                    .contains(&position.instrument());
                for stave in measure.passes.values_mut() {
                    expand_grace_notes(&diags, tables, *position, &mut stave.notes, stave.span);
                    stave.notes = expand_stave(tables, &settings, *position, &stave.notes);
                    if shorthand {
                        pad_to(&mut stave.notes, target);
                    }
                }
            }
            beat.duration = crate::score::most_occurring_duration(
                beat.measures.values().map(crate::score::Measure::total_duration),
            );
        }
        gongan.beat_duration =
            crate::score::most_occurring_duration(gongan.beats.iter().map(|b| b.duration));
    }
    diags.into_result(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pass2;
    use crate::score::binding::bind_positions;
    use crate::score::build::build_score;
    use crate::tables::Pitch;

    fn elaborate(src: &str) -> Score {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        let score = build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap();
        let score = bind_positions(score, &tables).unwrap();
        elaborate_patterns(score, &tables).unwrap()
    }

    fn notes(score: &Score, position: Position) -> Vec<Note> {
        score.gongans[0].beats[0].measures[&position]
            .default_pass()
            .unwrap()
            .notes
            .clone()
    }

    #[test]
    fn test_fixed_tremolo() {
        let score = elaborate("pemade\ta;\n");
        let notes = notes(&score, Position::PemadePolos);
        // Three notes per base note, evenly spaced.
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|n| n.stroke == Stroke::Open));
        assert!(notes.iter().all(|n| n.duration == Ratio::new(1, 3)));
        assert_eq!(notes_duration(&notes), Ratio::from_integer(1));
    }

    #[test]
    fn test_accelerating_tremolo_two_notes() {
        let score = elaborate("pemade\to:e:\n");
        let notes = notes(&score, Position::PemadePolos);
        let settings = ScoreSettings::default();
        assert_eq!(notes.len(), settings.tremolo.accelerating_pattern.len());
        // The two pitches alternate and the sequence ends on the second one.
        assert_eq!(notes[0].pitch, Pitch::Dong);
        assert_eq!(notes[1].pitch, Pitch::Deng);
        assert_eq!(notes.last().unwrap().pitch, Pitch::Deng);
        assert_eq!(
            notes.last().unwrap().velocity,
            settings.tremolo.accelerating_velocity.last().copied()
        );
        // Total duration is the scaled pattern sum.
        let expected: u32 = settings.tremolo.accelerating_pattern.iter().sum();
        assert_eq!(
            notes_duration(&notes),
            Ratio::new(expected, settings.base_note_time)
        );
    }

    #[test]
    fn test_norot_expansion() {
        let score = elaborate("pemade\to~---\n");
        let notes = notes(&score, Position::PemadePolos);
        // The builtin norot rule alternates the upper neighbour and the base.
        assert_eq!(notes[0].pitch, Pitch::Deng);
        assert_eq!(notes[1].pitch, Pitch::Dong);
        assert_eq!(notes[2].pitch, Pitch::Deng);
        assert_eq!(notes[3].pitch, Pitch::Dong);
        assert!(notes[..4]
            .iter()
            .all(|n| n.duration == Ratio::new(1, 4)));
    }

    #[test]
    fn test_grace_note_steals_from_predecessor() {
        let score = elaborate("pemade\toUu\n");
        let notes = notes(&score, Position::PemadePolos);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].duration, Ratio::new(3, 4));
        assert_eq!(notes[1].pitch, Pitch::Dung);
        assert_eq!(notes[1].duration, Ratio::new(1, 4));
        assert_eq!(notes[1].stroke, Stroke::Open);
        // Total time is unchanged by the grace note.
        assert_eq!(notes_duration(&notes), Ratio::from_integer(2));
    }

    #[test]
    fn test_shorthand_padding_extends_sustained_note() {
        // Calung is a shorthand instrument: a lone note fills the beat with
        // extensions because it has no written rest.
        let score = elaborate("calung\to,\npemade\to-i-\n");
        let calung = notes(&score, Position::Calung);
        assert_eq!(notes_duration(&calung), Ratio::from_integer(4));
        assert!(calung[1..].iter().all(|n| n.stroke == Stroke::Extension));
    }

    #[test]
    fn test_elaboration_is_idempotent() {
        let tables = Tables::builtin();
        let notation = pass2::parse2("pemade\ta;o~--\to:e:\n", &tables.font).unwrap();
        let score =
            build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap();
        let score = bind_positions(score, &tables).unwrap();
        let once = elaborate_patterns(score, &tables).unwrap();
        let twice = elaborate_patterns(once.clone(), &tables).unwrap();
        let collect = |s: &Score| {
            s.gongans[0].beats[0].measures[&Position::PemadePolos]
                .default_pass()
                .unwrap()
                .notes
                .clone()
        };
        assert_eq!(collect(&once), collect(&twice));
    }
}
