//! The score model: notes, measures, beats and gongans, plus the settings
//! that govern timing and dynamics. The transformation stages live in the
//! submodules and each produce a new score value:
//! [build] (raw notation to generic score), [binding] (shared notation to
//! concrete positions), [patterns] (ornament elaboration), [completion]
//! (missing staves, metadata materialization) and [validation].

use crate::parsing::metadata::{GonganType, MetaData, ValidationProperty};
use crate::parsing::model::{Span, Spanned};
use crate::tables::{DynamicLevel, InstrumentType, Modifier, Pitch, Position, Stroke, Tone};
use num_rational::Ratio;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub mod binding;
pub mod build;
pub mod completion;
pub mod notation;
pub mod patterns;
pub mod validation;

/// Pass key standing for "all passes".
pub const DEFAULT_PASS: i32 = -1;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: Pitch,
    pub octave: Option<i8>,
    pub stroke: Stroke,
    /// Audible length as a fraction of one base note.
    pub duration: Ratio<u32>,
    /// Trailing silence as a fraction of one base note.
    pub rest_after: Ratio<u32>,
    pub modifier: Modifier,
    /// Fixed velocity; `None` means the prevailing dynamics apply.
    pub velocity: Option<u8>,
    pub autogenerated: bool,
}

impl Note {
    pub fn total_duration(&self) -> Ratio<u32> {
        self.duration + self.rest_after
    }

    pub fn is_melodic(&self) -> bool {
        self.pitch.is_melodic()
    }

    pub fn is_audible(&self) -> bool {
        self.pitch != Pitch::None
    }

    pub fn tone(&self) -> Option<Tone> {
        self.octave.map(|octave| Tone::new(self.pitch, octave))
    }

    pub fn with_tone(&self, tone: Tone) -> Note {
        Note {
            pitch: tone.pitch,
            octave: Some(tone.octave),
            ..self.clone()
        }
    }

    /// A whole rest: no pitch, one base note of silence.
    pub fn silence(rest_after: Ratio<u32>) -> Note {
        Note {
            pitch: Pitch::None,
            octave: None,
            stroke: Stroke::Silence,
            duration: Ratio::from_integer(0),
            rest_after,
            modifier: Modifier::None,
            velocity: None,
            autogenerated: true,
        }
    }

    /// An extension of the preceding note.
    pub fn extension(duration: Ratio<u32>) -> Note {
        Note {
            pitch: Pitch::None,
            octave: None,
            stroke: Stroke::Extension,
            duration,
            rest_after: Ratio::from_integer(0),
            modifier: Modifier::None,
            velocity: None,
            autogenerated: true,
        }
    }
}

pub fn notes_duration(notes: &[Note]) -> Ratio<u32> {
    notes
        .iter()
        .map(Note::total_duration)
        .fold(Ratio::from_integer(0), |a, b| a + b)
}

/// One stave of one measure: the notes a position plays in a beat on the
/// passes selected by `pass` (−1 = all passes).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MeasurePass {
    pub pass: i32,
    pub line: u32,
    pub span: Span,
    pub notes: Vec<Note>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Measure {
    pub position: Position,
    /// All positions that shared this measure's notation line.
    pub shared_with: Vec<Position>,
    pub passes: BTreeMap<i32, MeasurePass>,
    pub autogenerated: bool,
}

impl Measure {
    pub fn default_pass(&self) -> Option<&MeasurePass> {
        self.passes.get(&DEFAULT_PASS)
    }

    pub fn default_pass_mut(&mut self) -> Option<&mut MeasurePass> {
        self.passes.get_mut(&DEFAULT_PASS)
    }

    /// The stave to play on the given pass: the pass-specific exception if
    /// one exists, the default stave otherwise.
    pub fn notes_for_pass(&self, pass: u32) -> Option<&[Note]> {
        self.passes
            .get(&(pass as i32))
            .or_else(|| self.default_pass())
            .map(|p| p.notes.as_slice())
    }

    pub fn total_duration(&self) -> Ratio<u32> {
        self.default_pass()
            .map(|p| notes_duration(&p.notes))
            .unwrap_or_else(|| Ratio::from_integer(0))
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Beat {
    /// 1-based beat number within the gongan.
    pub id: u32,
    pub gongan_id: u32,
    /// Nominal length in base notes (the mode of the measure lengths).
    pub duration: Ratio<u32>,
    pub measures: BTreeMap<Position, Measure>,
    pub has_kempli: bool,
    pub validation_ignore: Vec<ValidationProperty>,
}

impl Beat {
    pub fn ignores(&self, property: ValidationProperty) -> bool {
        self.validation_ignore.contains(&property)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Gongan {
    /// 1-based gongan number in notation order.
    pub id: u32,
    pub beats: Vec<Beat>,
    pub beat_duration: Ratio<u32>,
    pub gongan_type: GonganType,
    pub metadata: Vec<Spanned<MetaData>>,
    pub comments: Vec<String>,
}

impl Gongan {
    /// Metadata in processing order (labels before anything that may
    /// reference them).
    pub fn metadata_sorted(&self) -> Vec<&Spanned<MetaData>> {
        let mut sorted: Vec<&Spanned<MetaData>> = self.metadata.iter().collect();
        sorted.sort_by_key(|m| m.value.processing_order());
        sorted
    }
}

/// Resolved label target by index into the score.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRef {
    pub gongan: usize,
    pub beat: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct TremoloSettings {
    /// Number of notes a fixed tremolo produces per base note.
    pub notes_per_quarternote: u32,
    /// Accelerating tremolo durations in ticks of one base note time.
    pub accelerating_pattern: Vec<u32>,
    pub accelerating_velocity: Vec<u8>,
}

impl Default for TremoloSettings {
    fn default() -> Self {
        Self {
            notes_per_quarternote: 3,
            accelerating_pattern: vec![48, 40, 32, 26, 22, 18, 14, 10, 10, 10, 10, 10],
            accelerating_velocity: vec![100, 100, 100, 100, 100, 100, 100, 90, 80, 70, 60, 50],
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ScoreSettings {
    /// MIDI pulses per quarter note.
    pub ppq: u16,
    /// Ticks per base note.
    pub base_note_time: u32,
    pub default_tempo: u32,
    pub default_dynamics: DynamicLevel,
    pub dynamics: BTreeMap<DynamicLevel, u8>,
    pub tremolo: TremoloSettings,
    pub silence_seconds_before_start: u32,
    pub silence_seconds_after_end: u32,
    /// Natural-release tail appended when the piece does not loop.
    pub release_tail_seconds: u32,
    /// Whether the piece loops back to its start when played.
    pub looping: bool,
    /// Whether the notation writes the gong at the end of the gongan it
    /// closes instead of on the downbeat it sounds on.
    pub beat_at_end: bool,
    /// Instruments whose staves may omit trailing rests and extensions.
    pub shorthand_instruments: Vec<InstrumentType>,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            ppq: 96,
            base_note_time: 24,
            default_tempo: 60,
            default_dynamics: DynamicLevel::Mezzoforte,
            dynamics: [
                (DynamicLevel::Pianissimo, 40),
                (DynamicLevel::Piano, 50),
                (DynamicLevel::Mezzopiano, 60),
                (DynamicLevel::Mezzoforte, 70),
                (DynamicLevel::Forte, 85),
                (DynamicLevel::Fortissimo, 100),
            ]
            .into_iter()
            .collect(),
            tremolo: TremoloSettings::default(),
            silence_seconds_before_start: 1,
            silence_seconds_after_end: 2,
            release_tail_seconds: 3,
            looping: false,
            beat_at_end: false,
            shorthand_instruments: vec![
                InstrumentType::Ugal,
                InstrumentType::Penyacah,
                InstrumentType::Calung,
                InstrumentType::Jegogan,
                InstrumentType::Gongs,
                InstrumentType::Kempli,
            ],
        }
    }
}

impl ScoreSettings {
    pub fn velocity(&self, level: DynamicLevel) -> u8 {
        self.dynamics.get(&level).copied().unwrap_or(70)
    }

    pub fn default_velocity(&self) -> u8 {
        self.velocity(self.default_dynamics)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Score {
    pub title: String,
    pub positions: BTreeSet<Position>,
    pub gongans: Vec<Gongan>,
    pub labels: BTreeMap<String, LabelRef>,
    /// Labels declared in the unbound block; they bind no beat and poison
    /// any GOTO that targets them.
    pub unbound_labels: BTreeMap<String, Span>,
    pub global_metadata: Vec<Spanned<MetaData>>,
    pub global_comments: Vec<String>,
    pub settings: ScoreSettings,
}

impl Score {
    pub fn label(&self, name: &str) -> Option<LabelRef> {
        self.labels.get(name).copied()
    }
}

/// The most frequently occurring duration; ties go to the larger value.
pub fn most_occurring_duration(durations: impl Iterator<Item = Ratio<u32>>) -> Ratio<u32> {
    let mut counts: BTreeMap<Ratio<u32>, usize> = BTreeMap::new();
    for d in durations {
        *counts.entry(d).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(d, n)| (*n, *d))
        .map(|(d, _)| d)
        .unwrap_or_else(|| Ratio::from_integer(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_occurring_duration() {
        let r = |n, d| Ratio::new(n, d);
        assert_eq!(
            most_occurring_duration([r(4, 1), r(4, 1), r(2, 1)].into_iter()),
            r(4, 1)
        );
        // Tie goes to the larger duration.
        assert_eq!(
            most_occurring_duration([r(2, 1), r(4, 1)].into_iter()),
            r(4, 1)
        );
        assert_eq!(
            most_occurring_duration(std::iter::empty()),
            Ratio::from_integer(0)
        );
    }

    #[test]
    fn test_measure_pass_selection() {
        let stave = |pass, n| MeasurePass {
            pass,
            line: 1,
            span: Span::from(0..1),
            notes: vec![Note::silence(Ratio::from_integer(n))],
        };
        let measure = Measure {
            position: Position::PemadePolos,
            shared_with: vec![Position::PemadePolos],
            passes: [(DEFAULT_PASS, stave(DEFAULT_PASS, 1)), (2, stave(2, 4))]
                .into_iter()
                .collect(),
            autogenerated: false,
        };
        assert_eq!(notes_duration(measure.notes_for_pass(1).unwrap()), 1.into());
        assert_eq!(notes_duration(measure.notes_for_pass(2).unwrap()), 4.into());
    }
}
