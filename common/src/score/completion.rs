//! Score completion (pipeline stage 6): after this stage every beat holds a
//! measure for every position and all structural metadata is materialized
//! onto the score: gongan types, kempli suppression, octavation, silenced
//! measures, validation overrides and the beat-at-end rotation.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::metadata::{GonganType, MetaData, Scope, Switch};
use crate::parsing::model::{Span, Spanned};
use crate::score::build::resolve_tags;
use crate::score::{
    Beat, DEFAULT_PASS, Measure, MeasurePass, Note, Score, most_occurring_duration, notes_duration,
};
use crate::tables::{Modifier, Pitch, Position, Stroke, Tables};
use num_rational::Ratio;
use std::collections::BTreeMap;

fn zero() -> Ratio<u32> {
    Ratio::from_integer(0)
}

/// A rest stave spanning the given number of base notes, as whole rests plus
/// a fractional remainder.
fn rest_notes(mut remaining: Ratio<u32>) -> Vec<Note> {
    let mut notes = Vec::new();
    while remaining > zero() {
        let unit = remaining.min(Ratio::from_integer(1));
        notes.push(Note::silence(unit));
        remaining -= unit;
    }
    notes
}

fn rest_measure(position: Position, duration: Ratio<u32>, span: Span) -> Measure {
    Measure {
        position,
        shared_with: vec![position],
        passes: [(
            DEFAULT_PASS,
            MeasurePass {
                pass: DEFAULT_PASS,
                line: 0,
                span,
                notes: rest_notes(duration),
            },
        )]
        .into_iter()
        .collect(),
        autogenerated: true,
    }
}

/// The kempli keeps the beat with one strike on the downbeat.
fn kempli_measure(beat: &Beat, span: Span) -> Measure {
    let mut notes = Vec::new();
    if beat.has_kempli && beat.duration >= Ratio::from_integer(1) {
        notes.push(Note {
            pitch: Pitch::Strike,
            octave: None,
            stroke: Stroke::Open,
            duration: Ratio::from_integer(1),
            rest_after: zero(),
            modifier: Modifier::None,
            velocity: None,
            autogenerated: true,
        });
        notes.extend(rest_notes(beat.duration - Ratio::from_integer(1)));
    } else {
        notes = rest_notes(beat.duration);
    }
    Measure {
        position: Position::Kempli,
        shared_with: vec![Position::Kempli],
        passes: [(
            DEFAULT_PASS,
            MeasurePass {
                pass: DEFAULT_PASS,
                line: 0,
                span,
                notes,
            },
        )]
        .into_iter()
        .collect(),
        autogenerated: true,
    }
}

/// Applies one gongan's directives (its own plus the score-scoped ones).
fn apply_metadata(
    diags: &Diagnostics,
    tables: &Tables,
    score_metadata: &[Spanned<MetaData>],
    gongan: &mut crate::score::Gongan,
    labels_ok: impl Fn(&str) -> bool,
) {
    let own: Vec<Spanned<MetaData>> = gongan.metadata.clone();
    let scoped: Vec<&Spanned<MetaData>> = score_metadata
        .iter()
        .filter(|m| m.value.scope() == Scope::Score)
        .chain(own.iter())
        .collect();
    for meta in scoped {
        match &meta.value {
            MetaData::Gongan(x) => {
                gongan.gongan_type = x.gongan_type;
                if x.gongan_type != GonganType::Regular {
                    // Kebyar and gineman sections are played freely, without
                    // the kempli beat.
                    for beat in &mut gongan.beats {
                        beat.has_kempli = false;
                    }
                }
            }
            MetaData::Kempli(x) => {
                for beat in &mut gongan.beats {
                    if x.beats.matches(beat.id) {
                        beat.has_kempli = x.status == Switch::On;
                    }
                }
            }
            MetaData::Validation(x) => {
                for beat in &mut gongan.beats {
                    if x.beats.matches(beat.id) {
                        beat.validation_ignore.extend(x.ignore.iter().copied());
                    }
                }
            }
            MetaData::Octavate(x) => {
                let positions = resolve_tags(tables, std::slice::from_ref(&x.instrument));
                for beat in &mut gongan.beats {
                    for position in &positions {
                        let Some(measure) = beat.measures.get_mut(position) else {
                            continue;
                        };
                        for stave in measure.passes.values_mut() {
                            for note in &mut stave.notes {
                                let Some(tone) = note.tone().filter(|_| note.is_melodic()) else {
                                    continue;
                                };
                                let target = crate::tables::Tone::new(
                                    tone.pitch,
                                    tone.octave + x.octaves as i8,
                                );
                                if tables.instruments.contains(*position, target, true) {
                                    *note = note.with_tone(target);
                                } else {
                                    diags.err(
                                        code::OCTAVATE_RANGE,
                                        meta.span,
                                        format!(
                                            "octavating {tone} by {} leaves the range of {position}",
                                            x.octaves
                                        ),
                                    );
                                }
                            }
                        }
                    }
                }
            }
            MetaData::Suppress(x) => {
                let positions = resolve_tags(tables, &x.positions);
                for beat in &mut gongan.beats {
                    if !x.beats.matches(beat.id) {
                        continue;
                    }
                    for position in &positions {
                        let Some(measure) = beat.measures.get_mut(position) else {
                            continue;
                        };
                        let rest = MeasurePass {
                            pass: DEFAULT_PASS,
                            line: 0,
                            span: meta.span,
                            notes: rest_notes(beat.duration),
                        };
                        if x.passes.is_all() {
                            measure.passes = [(DEFAULT_PASS, rest)].into_iter().collect();
                        } else {
                            for pass in &x.passes.0 {
                                measure.passes.insert(
                                    *pass as i32,
                                    MeasurePass {
                                        pass: *pass as i32,
                                        ..rest.clone()
                                    },
                                );
                            }
                        }
                    }
                }
            }
            MetaData::Goto(x) => {
                if !labels_ok(&x.label.value) {
                    diags.err(
                        code::UNDEFINED_LABEL,
                        x.label.span,
                        format!("goto references undefined label '{}'", x.label.value),
                    );
                }
                if let Some(from_beat) = x.from_beat
                    && (from_beat == 0 || from_beat as usize > gongan.beats.len())
                {
                    diags.err(
                        code::MALFORMED_DIRECTIVE,
                        x.label.span,
                        format!("goto from_beat {from_beat} exceeds the gongan length"),
                    );
                }
            }
            MetaData::Tempo(x) => {
                check_first_beat(diags, meta.span, "TEMPO", x.first_beat, gongan.beats.len());
            }
            MetaData::Dynamics(x) => {
                check_first_beat(diags, meta.span, "DYNAMICS", x.first_beat, gongan.beats.len());
            }
            MetaData::AutoKempyung(_)
            | MetaData::Label(_)
            | MetaData::Part(_)
            | MetaData::Repeat(_)
            | MetaData::Sequence(_)
            | MetaData::Wait(_) => {}
        }
    }
}

fn check_first_beat(
    diags: &Diagnostics,
    span: Span,
    keyword: &str,
    first_beat: u32,
    beats: usize,
) {
    if first_beat == 0 || first_beat as usize > beats {
        diags.err(
            code::MALFORMED_DIRECTIVE,
            span,
            format!("{keyword}: first_beat {first_beat} exceeds the gongan length"),
        );
    }
}

/// Rotates each measure's closing note into the next beat so the gong lands
/// on the downbeat it sounds on. Adds a final gongan holding the displaced
/// material and prefixes a whole rest to the very first beat.
fn move_beat_to_start(score: &mut Score) {
    let Some(last) = score.gongans.last() else {
        return;
    };
    if last.beats.iter().all(|b| b.has_kempli) {
        let gongan_id = last.id + 1;
        let mut measures = BTreeMap::new();
        for position in &score.positions {
            measures.insert(*position, rest_measure(*position, zero(), Span::from(0..1)));
        }
        score.gongans.push(crate::score::Gongan {
            id: gongan_id,
            beats: vec![Beat {
                id: 1,
                gongan_id,
                duration: zero(),
                measures,
                has_kempli: false,
                validation_ignore: Vec::new(),
            }],
            beat_duration: zero(),
            gongan_type: GonganType::Regular,
            metadata: Vec::new(),
            comments: Vec::new(),
        });
    }

    // Walk beats from the end, moving one base note's worth of notes from the
    // tail of each measure to the head of its successor.
    let mut flat: Vec<(usize, usize)> = Vec::new();
    for (g, gongan) in score.gongans.iter().enumerate() {
        for b in 0..gongan.beats.len() {
            flat.push((g, b));
        }
    }
    for w in (1..flat.len()).rev() {
        let (pg, pb) = flat[w - 1];
        let (cg, cb) = flat[w];
        let positions: Vec<Position> = score.gongans[pg].beats[pb].measures.keys().copied().collect();
        for position in positions {
            let Some(prev_measure) = score.gongans[pg].beats[pb].measures.get_mut(&position) else {
                continue;
            };
            let mut moved: BTreeMap<i32, Vec<Note>> = BTreeMap::new();
            for (pass, stave) in prev_measure.passes.iter_mut() {
                let mut taken: Vec<Note> = Vec::new();
                while notes_duration(&taken) < Ratio::from_integer(1)
                    && let Some(note) = stave.notes.pop()
                {
                    taken.insert(0, note);
                }
                moved.insert(*pass, taken);
            }
            let span = prev_measure.default_pass().map(|p| p.span);
            let current = score.gongans[cg].beats[cb]
                .measures
                .entry(position)
                .or_insert_with(|| {
                    rest_measure(position, zero(), span.unwrap_or(Span::from(0..1)))
                });
            for (pass, mut taken) in moved {
                match current.passes.get_mut(&pass) {
                    Some(stave) => {
                        taken.append(&mut stave.notes);
                        stave.notes = taken;
                    }
                    None => {
                        current.passes.insert(
                            pass,
                            MeasurePass {
                                pass,
                                line: 0,
                                span: span.unwrap_or(Span::from(0..1)),
                                notes: taken,
                            },
                        );
                    }
                }
            }
        }
    }
    // The first beat now starts a base note late.
    if let Some(first) = score.gongans.first_mut().and_then(|g| g.beats.first_mut()) {
        for measure in first.measures.values_mut() {
            for stave in measure.passes.values_mut() {
                stave.notes.insert(0, Note::silence(Ratio::from_integer(1)));
            }
        }
    }
}

pub fn complete_score(mut score: Score, tables: &Tables) -> Result<Score, Diagnostics> {
    let diags = Diagnostics::new();

    // Every position of the score gets a measure in every beat; positions
    // without a stave rest.
    let positions: Vec<Position> = score.positions.iter().copied().collect();
    for gongan in &mut score.gongans {
        for beat in &mut gongan.beats {
            let span = beat
                .measures
                .values()
                .find_map(|m| m.default_pass().map(|p| p.span))
                .unwrap_or(Span::from(0..1));
            for position in &positions {
                beat.measures
                    .entry(*position)
                    .or_insert_with(|| rest_measure(*position, beat.duration, span));
            }
        }
    }

    let global = score.global_metadata.clone();
    let labels = score.labels.clone();
    let unbound = score.unbound_labels.clone();
    for gongan in &mut score.gongans {
        apply_metadata(&diags, tables, &global, gongan, |label| {
            labels.contains_key(label) || unbound.contains_key(label)
        });
    }

    if score.settings.beat_at_end {
        move_beat_to_start(&mut score);
    }

    // The implicit kempli track.
    if tables.instruments.spec(Position::Kempli).is_some() {
        score.positions.insert(Position::Kempli);
        for gongan in &mut score.gongans {
            for beat in &mut gongan.beats {
                let span = beat
                    .measures
                    .values()
                    .find_map(|m| m.default_pass().map(|p| p.span))
                    .unwrap_or(Span::from(0..1));
                let replace = beat
                    .measures
                    .get(&Position::Kempli)
                    .is_none_or(|m| m.autogenerated);
                if replace {
                    beat.measures
                        .insert(Position::Kempli, kempli_measure(beat, span));
                }
            }
        }
    }

    for gongan in &mut score.gongans {
        for beat in &mut gongan.beats {
            beat.duration = most_occurring_duration(
                beat.measures
                    .values()
                    .filter(|m| !m.autogenerated)
                    .map(Measure::total_duration),
            );
            if beat.duration == zero() {
                // All-autogenerated beats (e.g. the closing gongan added by
                // the beat-at-end rotation) take the longest measure.
                beat.duration = beat
                    .measures
                    .values()
                    .map(Measure::total_duration)
                    .max()
                    .unwrap_or_else(zero);
            }
        }
        gongan.beat_duration =
            most_occurring_duration(gongan.beats.iter().map(|b| b.duration));
    }

    diags.into_result(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pass2;
    use crate::score::binding::bind_positions;
    use crate::score::build::build_score;
    use crate::score::patterns::elaborate_patterns;
    use crate::score::ScoreSettings;

    fn complete_with(src: &str, settings: ScoreSettings) -> Result<Score, Diagnostics> {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        let score = build_score(&notation, &tables, &settings, "test").unwrap();
        let score = bind_positions(score, &tables).unwrap();
        let score = elaborate_patterns(score, &tables).unwrap();
        complete_score(score, &tables)
    }

    fn complete(src: &str) -> Result<Score, Diagnostics> {
        complete_with(src, ScoreSettings::default())
    }

    #[test]
    fn test_missing_positions_get_rests() {
        let score = complete("pemade\to-i-\ncalung\to,---\n").unwrap();
        let beat = &score.gongans[0].beats[0];
        // pemade polos+sangsih, calung, and the implicit kempli.
        assert!(beat.measures.contains_key(&Position::Kempli));
        let m = &beat.measures[&Position::PemadeSangsih];
        assert!(!m.autogenerated);
        assert_eq!(m.total_duration(), Ratio::from_integer(4));
    }

    #[test]
    fn test_kempli_track() {
        let score = complete("pemade\to-i-\n").unwrap();
        let kempli = &score.gongans[0].beats[0].measures[&Position::Kempli];
        let notes = &kempli.default_pass().unwrap().notes;
        assert_eq!(notes[0].pitch, Pitch::Strike);
        assert_eq!(notes_duration(notes), Ratio::from_integer(4));
    }

    #[test]
    fn test_kempli_off() {
        let score = complete("metadata\t{KEMPLI off}\npemade\to-i-\n").unwrap();
        let beat = &score.gongans[0].beats[0];
        assert!(!beat.has_kempli);
        let notes = &beat.measures[&Position::Kempli].default_pass().unwrap().notes;
        assert!(notes.iter().all(|n| !n.is_audible()));
    }

    #[test]
    fn test_kebyar_has_no_kempli_beat() {
        let score = complete("metadata\t{GONGAN kebyar}\npemade\to-i-\n").unwrap();
        assert_eq!(score.gongans[0].gongan_type, GonganType::Kebyar);
        assert!(!score.gongans[0].beats[0].has_kempli);
    }

    #[test]
    fn test_octavate() {
        let score =
            complete("metadata\t{OCTAVATE pemade_polos, octaves=1}\npemade\to,-i,-\n").unwrap();
        let notes = &score.gongans[0].beats[0].measures[&Position::PemadePolos]
            .default_pass()
            .unwrap()
            .notes;
        assert_eq!(notes[0].octave, Some(1));
        // The sangsih stave is untouched.
        let sangsih = &score.gongans[0].beats[0].measures[&Position::PemadeSangsih]
            .default_pass()
            .unwrap()
            .notes;
        assert_eq!(sangsih[0].octave, Some(0));
    }

    #[test]
    fn test_octavate_out_of_range() {
        let e = complete("metadata\t{OCTAVATE calung, octaves=-1}\ncalung\to,---\n")
            .unwrap_err()
            .get_all();
        assert_eq!(e[0].code, code::OCTAVATE_RANGE);
    }

    #[test]
    fn test_suppress_creates_rest_pass() {
        let score = complete(
            "metadata\t{SUPPRESS pemade_sangsih, passes=[2]}\npemade\to-i-\n",
        )
        .unwrap();
        let m = &score.gongans[0].beats[0].measures[&Position::PemadeSangsih];
        let silent = m.notes_for_pass(2).unwrap();
        assert!(silent.iter().all(|n| !n.is_audible()));
        let sounding = m.notes_for_pass(1).unwrap();
        assert!(sounding.iter().any(|n| n.is_audible()));
    }

    #[test]
    fn test_goto_to_unknown_label() {
        let e = complete("metadata\t{GOTO nowhere}\npemade\to-i-\n")
            .unwrap_err()
            .get_all();
        assert_eq!(e[0].code, code::UNDEFINED_LABEL);
    }

    #[test]
    fn test_validation_ignore_attaches() {
        let score = complete(
            "metadata\t{VALIDATION ignore=[beat-duration], beats=[1]}\npemade\to-i-\to-\n",
        )
        .unwrap();
        use crate::parsing::metadata::ValidationProperty;
        assert!(score.gongans[0].beats[0].ignores(ValidationProperty::BeatDuration));
        assert!(!score.gongans[0].beats[1].ignores(ValidationProperty::BeatDuration));
    }

    #[test]
    fn test_beat_at_end_rotation() {
        let mut settings = ScoreSettings::default();
        settings.beat_at_end = true;
        let score = complete_with("gongs\t...G\n", settings).unwrap();
        // A closing gongan is appended and the gong stroke moves onto its
        // first beat.
        assert_eq!(score.gongans.len(), 2);
        let final_beat = &score.gongans[1].beats[0];
        let gongs = &final_beat.measures[&Position::Gongs]
            .default_pass()
            .unwrap()
            .notes;
        assert_eq!(gongs[0].pitch, Pitch::Gir);
        // The first beat gained a leading rest and kept its length.
        let first = &score.gongans[0].beats[0].measures[&Position::Gongs]
            .default_pass()
            .unwrap()
            .notes;
        assert!(!first[0].is_audible());
        assert_eq!(notes_duration(first), Ratio::from_integer(4));
    }
}
