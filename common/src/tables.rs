//! Read-only lookup tables: the font table, instrument ranges, tag bindings,
//! the rules engine data (kempyung pairs, shared-notation transforms,
//! ornament expansions) and the MIDI note/preset maps. All tables are
//! tab-separated text with a header row; a complete gong kebyar data set is
//! embedded in [builtin].

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::model::Span;
use num_rational::Ratio;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub mod builtin;

macro_rules! notation_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant),+
        }
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_name(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Index in declaration order; used for stable sorting.
            pub fn sequence(&self) -> usize {
                Self::ALL.iter().position(|x| x == self).unwrap()
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

notation_enum!(InstrumentGroup {
    GongKebyar => "GONG_KEBYAR",
    SemarPagulingan => "SEMAR_PAGULINGAN",
    GenderWayang => "GENDER_WAYANG",
});

notation_enum!(
    /// A distinct voice: an instrument or a player position within one.
    /// Declaration order is the canonical position order used for track
    /// numbering and sorting.
    Position {
    Ugal => "UGAL",
    PemadePolos => "PEMADE_POLOS",
    PemadeSangsih => "PEMADE_SANGSIH",
    KantilanPolos => "KANTILAN_POLOS",
    KantilanSangsih => "KANTILAN_SANGSIH",
    Reyong1 => "REYONG_1",
    Reyong2 => "REYONG_2",
    Reyong3 => "REYONG_3",
    Reyong4 => "REYONG_4",
    Penyacah => "PENYACAH",
    Calung => "CALUNG",
    Jegogan => "JEGOGAN",
    Gongs => "GONGS",
    Kempli => "KEMPLI",
});

notation_enum!(InstrumentType {
    Ugal => "UGAL",
    Pemade => "PEMADE",
    Kantilan => "KANTILAN",
    Reyong => "REYONG",
    Penyacah => "PENYACAH",
    Calung => "CALUNG",
    Jegogan => "JEGOGAN",
    Gongs => "GONGS",
    Kempli => "KEMPLI",
});

impl Position {
    pub fn instrument(&self) -> InstrumentType {
        match self {
            Position::Ugal => InstrumentType::Ugal,
            Position::PemadePolos | Position::PemadeSangsih => InstrumentType::Pemade,
            Position::KantilanPolos | Position::KantilanSangsih => InstrumentType::Kantilan,
            Position::Reyong1 | Position::Reyong2 | Position::Reyong3 | Position::Reyong4 => {
                InstrumentType::Reyong
            }
            Position::Penyacah => InstrumentType::Penyacah,
            Position::Calung => InstrumentType::Calung,
            Position::Jegogan => InstrumentType::Jegogan,
            Position::Gongs => InstrumentType::Gongs,
            Position::Kempli => InstrumentType::Kempli,
        }
    }
}

notation_enum!(Pitch {
    Ding => "DING",
    Dong => "DONG",
    Deng => "DENG",
    Deung => "DEUNG",
    Dung => "DUNG",
    Dang => "DANG",
    Daing => "DAING",
    Byong => "BYONG",
    Gir => "GIR",
    Pur => "PUR",
    Tong => "TONG",
    Strike => "STRIKE",
    None => "NONE",
});

impl Pitch {
    /// The melodic pitches participate in range checks, octavation and the
    /// shared-notation rules; percussion pitches and rests do not.
    pub fn is_melodic(&self) -> bool {
        matches!(
            self,
            Pitch::Ding
                | Pitch::Dong
                | Pitch::Deng
                | Pitch::Deung
                | Pitch::Dung
                | Pitch::Dang
                | Pitch::Daing
        )
    }
}

notation_enum!(Stroke {
    Open => "OPEN",
    Muted => "MUTED",
    Abbreviated => "ABBREVIATED",
    GraceNote => "GRACE_NOTE",
    Tremolo => "TREMOLO",
    TremoloAccelerating => "TREMOLO_ACCELERATING",
    Norot => "NOROT",
    Extension => "EXTENSION",
    Silence => "SILENCE",
    None => "NONE",
});

notation_enum!(
    /// Combining-character kinds, in canonical attachment order: octave,
    /// stroke, duration, ornament.
    Modifier {
    None => "NONE",
    Octave0 => "OCTAVE_0",
    Octave2 => "OCTAVE_2",
    Mute => "MUTE",
    Abbreviate => "ABBREVIATE",
    HalfNote => "HALF_NOTE",
    QuarterNote => "QUARTER_NOTE",
    Tremolo => "TREMOLO",
    TremoloAccelerating => "TREMOLO_ACCELERATING",
    Norot => "NOROT",
});

notation_enum!(DynamicLevel {
    Pianissimo => "pp",
    Piano => "p",
    Mezzopiano => "mp",
    Mezzoforte => "mf",
    Forte => "f",
    Fortissimo => "ff",
});

/// A pitch in a concrete octave.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tone {
    pub pitch: Pitch,
    pub octave: i8,
}
impl Tone {
    pub fn new(pitch: Pitch, octave: i8) -> Self {
        Self { pitch, octave }
    }

    /// Sorting key ordering tones by frequency.
    pub fn key(&self) -> i32 {
        self.pitch.sequence() as i32 + self.octave as i32 * 10
    }
}
impl PartialOrd for Tone {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Tone {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.pitch.sequence().cmp(&other.pitch.sequence()))
    }
}
impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pitch, self.octave)
    }
}

// ---------------------------------------------------------------------------
// TSV scaffolding

/// Iterates the rows of a TSV table, skipping the header row and blank lines.
/// Each row yields the row span and the fields with their spans, so table
/// errors can point into the table source.
fn tsv_rows(src: &str) -> impl Iterator<Item = (Span, Vec<(Span, &str)>)> {
    let mut offset = 0usize;
    src.lines()
        .map(move |line| {
            let start = offset;
            offset = start + line.len() + 1;
            (start, line)
        })
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(start, line)| {
            let mut fields = Vec::new();
            let mut field_start = start;
            for field in line.split('\t') {
                fields.push((
                    Span::from(field_start..field_start + field.len()),
                    field.trim(),
                ));
                field_start += field.len() + 1;
            }
            (Span::from(start..start + line.len()), fields)
        })
}

fn field<'a>(
    diags: &Diagnostics,
    row: &[(Span, &'a str)],
    row_span: Span,
    idx: usize,
    what: &str,
) -> Option<(Span, &'a str)> {
    let got = row.get(idx).copied();
    if got.is_none() {
        diags.err(code::TABLE, row_span, format!("missing column '{what}'"));
    }
    got
}

fn parse_ratio(diags: &Diagnostics, span: Span, s: &str) -> Ratio<u32> {
    let parts: Vec<&str> = s.split('/').collect();
    let parsed = match parts.as_slice() {
        [n] => n.parse::<u32>().ok().map(Ratio::from_integer),
        [n, d] => match (n.parse::<u32>(), d.parse::<u32>()) {
            (Ok(n), Ok(d)) if d != 0 => Some(Ratio::new(n, d)),
            _ => Option::None,
        },
        _ => Option::None,
    };
    parsed.unwrap_or_else(|| {
        diags.err(code::TABLE, span, format!("invalid rational value '{s}'"));
        Ratio::from_integer(0)
    })
}

fn parse_enum<T>(
    diags: &Diagnostics,
    span: Span,
    s: &str,
    what: &str,
    from_name: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let v = from_name(s);
    if v.is_none() {
        diags.err(code::TABLE, span, format!("unknown {what} '{s}'"));
    }
    v
}

/// Parses a comma-separated list of `PITCH/OCT` pairs.
fn parse_tone_list(diags: &Diagnostics, span: Span, s: &str) -> Vec<Tone> {
    let mut tones = Vec::new();
    for part in s.split(',').map(str::trim).filter(|x| !x.is_empty()) {
        let Some((p, o)) = part.split_once('/') else {
            diags.err(code::TABLE, span, format!("invalid tone '{part}'"));
            continue;
        };
        let pitch = parse_enum(diags, span, p, "pitch", Pitch::from_name);
        let octave = o.parse::<i8>().ok();
        if octave.is_none() {
            diags.err(code::TABLE, span, format!("invalid octave in '{part}'"));
        }
        if let (Some(pitch), Some(octave)) = (pitch, octave) {
            tones.push(Tone::new(pitch, octave));
        }
    }
    tones.sort();
    tones
}

// ---------------------------------------------------------------------------
// Font table

#[derive(Serialize, Debug, Clone)]
pub struct FontGlyph {
    pub symbol: char,
    pub pitch: Pitch,
    pub octave: Option<i8>,
    pub stroke: Stroke,
    pub duration: Ratio<u32>,
    pub rest_after: Ratio<u32>,
    pub modifier: Modifier,
}
impl FontGlyph {
    pub fn is_modifier(&self) -> bool {
        self.modifier != Modifier::None
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct FontTable {
    glyphs: BTreeMap<char, FontGlyph>,
}

impl FontTable {
    pub fn from_tsv(src: &str) -> Result<Self, Diagnostics> {
        let diags = Diagnostics::new();
        let mut glyphs = BTreeMap::new();
        for (row_span, row) in tsv_rows(src) {
            let Some((sym_span, sym)) = field(&diags, &row, row_span, 0, "symbol") else {
                continue;
            };
            let mut chars = sym.chars();
            let (Some(symbol), Option::None) = (chars.next(), chars.next()) else {
                diags.err(code::TABLE, sym_span, "symbol must be a single character");
                continue;
            };
            let pitch = field(&diags, &row, row_span, 1, "pitch")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "pitch", Pitch::from_name));
            let octave = field(&diags, &row, row_span, 2, "octave")
                .and_then(|(_, v)| (v != "-").then(|| v.parse::<i8>().ok()).flatten());
            let stroke = field(&diags, &row, row_span, 3, "stroke")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "stroke", Stroke::from_name));
            let duration = field(&diags, &row, row_span, 4, "duration")
                .map(|(s, v)| parse_ratio(&diags, s, v));
            let rest_after = field(&diags, &row, row_span, 5, "rest_after")
                .map(|(s, v)| parse_ratio(&diags, s, v));
            let modifier = field(&diags, &row, row_span, 6, "modifier")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "modifier", Modifier::from_name));
            let (Some(pitch), Some(stroke), Some(duration), Some(rest_after), Some(modifier)) =
                (pitch, stroke, duration, rest_after, modifier)
            else {
                continue;
            };
            if glyphs
                .insert(
                    symbol,
                    FontGlyph {
                        symbol,
                        pitch,
                        octave,
                        stroke,
                        duration,
                        rest_after,
                        modifier,
                    },
                )
                .is_some()
            {
                diags.err(
                    code::TABLE,
                    sym_span,
                    format!("symbol '{symbol}' defined more than once"),
                );
            }
        }
        diags.into_result(Self { glyphs })
    }

    pub fn get(&self, symbol: char) -> Option<&FontGlyph> {
        self.glyphs.get(&symbol)
    }

    pub fn is_modifier(&self, symbol: char) -> bool {
        self.glyphs.get(&symbol).is_some_and(FontGlyph::is_modifier)
    }

    /// Canonical attachment order for a modifier character; used to normalize
    /// equivalent spellings before decoding.
    pub fn modifier_order(&self, symbol: char) -> usize {
        self.glyphs
            .get(&symbol)
            .map(|g| g.modifier.sequence())
            .unwrap_or(usize::MAX)
    }

    /// Reverse lookup of a base (non-modifier) glyph for the notation writer.
    pub fn base_symbol(&self, pitch: Pitch, stroke: Stroke) -> Option<&FontGlyph> {
        self.glyphs
            .values()
            .find(|g| !g.is_modifier() && g.pitch == pitch && g.stroke == stroke)
    }

    /// Reverse lookup of the character carrying the given modifier kind.
    pub fn modifier_symbol(&self, modifier: Modifier) -> Option<char> {
        self.glyphs
            .values()
            .find(|g| g.modifier == modifier)
            .map(|g| g.symbol)
    }
}

// ---------------------------------------------------------------------------
// Instruments table

#[derive(Serialize, Debug, Clone)]
pub struct InstrumentSpec {
    pub position: Position,
    pub instrument: InstrumentType,
    pub range: Vec<Tone>,
    pub extended: Vec<Tone>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Instruments {
    by_pos: BTreeMap<Position, InstrumentSpec>,
}

impl Instruments {
    pub fn from_tsv(src: &str, group: InstrumentGroup) -> Result<Self, Diagnostics> {
        let diags = Diagnostics::new();
        let mut by_pos = BTreeMap::new();
        for (row_span, row) in tsv_rows(src) {
            let row_group = field(&diags, &row, row_span, 0, "group")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "group", InstrumentGroup::from_name));
            if row_group != Some(group) {
                continue;
            }
            let position = field(&diags, &row, row_span, 1, "position")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "position", Position::from_name));
            let instrument = field(&diags, &row, row_span, 2, "instrument")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "instrument", InstrumentType::from_name));
            let range = field(&diags, &row, row_span, 3, "position_range")
                .map(|(s, v)| parse_tone_list(&diags, s, v))
                .unwrap_or_default();
            let extended = field(&diags, &row, row_span, 4, "extended_position_range")
                .map(|(s, v)| parse_tone_list(&diags, s, v))
                .unwrap_or_default();
            let (Some(position), Some(instrument)) = (position, instrument) else {
                continue;
            };
            // An empty extended range means the nominal range.
            let extended = if extended.is_empty() {
                range.clone()
            } else {
                extended
            };
            by_pos.insert(
                position,
                InstrumentSpec {
                    position,
                    instrument,
                    range,
                    extended,
                },
            );
        }
        diags.into_result(Self { by_pos })
    }

    pub fn spec(&self, position: Position) -> Option<&InstrumentSpec> {
        self.by_pos.get(&position)
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.by_pos.keys().copied()
    }

    pub fn range(&self, position: Position, extended: bool) -> &[Tone] {
        self.by_pos
            .get(&position)
            .map(|s| {
                if extended {
                    s.extended.as_slice()
                } else {
                    s.range.as_slice()
                }
            })
            .unwrap_or(&[])
    }

    pub fn contains(&self, position: Position, tone: Tone, extended: bool) -> bool {
        self.range(position, extended).contains(&tone)
    }

    /// Tones of the range with the given pitch, nearest octave first
    /// (same octave, then one above, then one below).
    pub fn tones_with_pitch(
        &self,
        position: Position,
        pitch: Pitch,
        reference_octave: i8,
        extended: bool,
    ) -> Vec<Tone> {
        let mut tones: Vec<Tone> = self
            .range(position, extended)
            .iter()
            .filter(|t| t.pitch == pitch)
            .copied()
            .collect();
        // The -0.1 bias prefers the octave above over the octave below at
        // equal distance.
        tones.sort_by_key(|t| {
            let d = (t.octave - reference_octave) as f64 - 0.1;
            (d.abs() * 10.0) as i32
        });
        tones
    }

    /// Moves `delta` scale steps through the position's nominal range.
    pub fn step(&self, position: Position, tone: Tone, delta: i32) -> Option<Tone> {
        let range = self.range(position, false);
        let idx = range.iter().position(|t| *t == tone)? as i32;
        let target = idx + delta;
        if target < 0 || target as usize >= range.len() {
            return Option::None;
        }
        Some(range[target as usize])
    }
}

// ---------------------------------------------------------------------------
// Tag table

#[derive(Serialize, Debug, Clone, Default)]
pub struct TagTable {
    map: BTreeMap<String, Vec<Position>>,
}

impl TagTable {
    pub fn from_tsv(src: &str) -> Result<Self, Diagnostics> {
        let diags = Diagnostics::new();
        let mut map = BTreeMap::new();
        for (row_span, row) in tsv_rows(src) {
            let Some((_, tag)) = field(&diags, &row, row_span, 0, "tag") else {
                continue;
            };
            let Some((pos_span, pos)) = field(&diags, &row, row_span, 1, "positions") else {
                continue;
            };
            let positions: Vec<Position> = pos
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .filter_map(|p| parse_enum(&diags, pos_span, p, "position", Position::from_name))
                .collect();
            map.insert(tag.to_string(), positions);
        }
        diags.into_result(Self { map })
    }

    pub fn positions(&self, tag: &str) -> Option<&[Position]> {
        self.map.get(tag).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[Position])> {
        self.map.iter().map(|(tag, p)| (tag.as_str(), p.as_slice()))
    }

    pub fn tag_for(&self, position: Position) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, positions)| positions.as_slice() == [position])
            .map(|(tag, _)| tag.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rules table

notation_enum!(SharedTransform {
    SamePitch => "SAME_PITCH",
    SamePitchExtendedRange => "SAME_PITCH_EXTENDED_RANGE",
    Kempyung => "KEMPYUNG",
});

#[derive(Serialize, Debug, Clone)]
pub struct SharedRule {
    pub positions: Vec<Position>,
    /// The full position set the notation is shared by; `None` matches any set.
    pub shared_by: Option<Vec<Position>>,
    pub transforms: Vec<SharedTransform>,
}

#[derive(Serialize, Debug, Clone)]
pub struct OrnamentStep {
    /// Scale steps relative to the ornamented note, within the position's range.
    pub degree: i32,
    /// Share of the ornamented note's duration.
    pub fraction: Ratio<u32>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Rules {
    kempyung: BTreeMap<Tone, Tone>,
    shared: Vec<SharedRule>,
    pairs: Vec<(Position, Position)>,
    ornaments: BTreeMap<Stroke, Vec<OrnamentStep>>,
}

impl Rules {
    pub fn from_tsv(src: &str, group: InstrumentGroup) -> Result<Self, Diagnostics> {
        let diags = Diagnostics::new();
        let mut rules = Rules::default();
        for (row_span, row) in tsv_rows(src) {
            let row_group = field(&diags, &row, row_span, 0, "group")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "group", InstrumentGroup::from_name));
            if row_group != Some(group) {
                continue;
            }
            let Some((_, ruletype)) = field(&diags, &row, row_span, 1, "ruletype") else {
                continue;
            };
            let Some((pos_span, positions)) = field(&diags, &row, row_span, 2, "positions") else {
                continue;
            };
            match ruletype {
                "KEMPYUNG" => {
                    // positions column is ANY for the note-pair table; the
                    // value column holds `PITCH/OCT>PITCH/OCT` pairs.
                    let Some((val_span, pairs)) = field(&diags, &row, row_span, 3, "value") else {
                        continue;
                    };
                    for pair in pairs.split(',').map(str::trim).filter(|x| !x.is_empty()) {
                        let Some((from, to)) = pair.split_once('>') else {
                            diags.err(
                                code::TABLE,
                                val_span,
                                format!("invalid kempyung pair '{pair}'"),
                            );
                            continue;
                        };
                        let from = parse_tone_list(&diags, val_span, from);
                        let to = parse_tone_list(&diags, val_span, to);
                        if let ([from], [to]) = (from.as_slice(), to.as_slice()) {
                            rules.kempyung.insert(*from, *to);
                        }
                    }
                }
                "SHARED_NOTATION" => {
                    let positions = Self::parse_positions(&diags, pos_span, positions);
                    let shared_by = field(&diags, &row, row_span, 3, "shared_by")
                        .and_then(|(s, v)| {
                            (v != "ANY").then(|| Self::parse_positions(&diags, s, v))
                        });
                    let transforms = field(&diags, &row, row_span, 4, "transforms")
                        .map(|(s, v)| {
                            v.split(',')
                                .map(str::trim)
                                .filter(|x| !x.is_empty())
                                .filter_map(|t| {
                                    parse_enum(&diags, s, t, "transform", SharedTransform::from_name)
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    rules.shared.push(SharedRule {
                        positions,
                        shared_by,
                        transforms,
                    });
                }
                "POLOS_SANGSIH" => {
                    let positions = Self::parse_positions(&diags, pos_span, positions);
                    if let [polos, sangsih] = positions.as_slice() {
                        rules.pairs.push((*polos, *sangsih));
                    } else {
                        diags.err(
                            code::TABLE,
                            pos_span,
                            "POLOS_SANGSIH needs exactly two positions",
                        );
                    }
                }
                "ORNAMENT" => {
                    // positions column holds the triggering stroke; the value
                    // column holds `degree:fraction` steps.
                    let stroke = parse_enum(&diags, pos_span, positions, "stroke", Stroke::from_name);
                    let Some((val_span, steps)) = field(&diags, &row, row_span, 3, "value") else {
                        continue;
                    };
                    let mut parsed = Vec::new();
                    for step in steps.split(',').map(str::trim).filter(|x| !x.is_empty()) {
                        let Some((degree, fraction)) = step.split_once(':') else {
                            diags.err(code::TABLE, val_span, format!("invalid step '{step}'"));
                            continue;
                        };
                        let Ok(degree) = degree.parse::<i32>() else {
                            diags.err(code::TABLE, val_span, format!("invalid degree '{degree}'"));
                            continue;
                        };
                        parsed.push(OrnamentStep {
                            degree,
                            fraction: parse_ratio(&diags, val_span, fraction),
                        });
                    }
                    if let Some(stroke) = stroke {
                        rules.ornaments.insert(stroke, parsed);
                    }
                }
                other => {
                    diags.err(code::TABLE, row_span, format!("unknown rule type '{other}'"));
                }
            }
        }
        diags.into_result(rules)
    }

    fn parse_positions(diags: &Diagnostics, span: Span, s: &str) -> Vec<Position> {
        if s == "ANY" {
            return Vec::new();
        }
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| parse_enum(diags, span, p, "position", Position::from_name))
            .collect()
    }

    pub fn kempyung_of(&self, tone: Tone) -> Option<Tone> {
        self.kempyung.get(&tone).copied()
    }

    pub fn kempyung_pairs(&self) -> impl Iterator<Item = (&Tone, &Tone)> {
        self.kempyung.iter()
    }

    /// The kempyung equivalent bounded to the position's range. Falls back to
    /// a nearby octave of the kempyung pitch before giving up.
    pub fn kempyung_in_range(
        &self,
        instruments: &Instruments,
        tone: Tone,
        position: Position,
        extended: bool,
    ) -> Option<Tone> {
        let mapped = self.kempyung_of(tone)?;
        if instruments.contains(position, mapped, extended) {
            return Some(mapped);
        }
        instruments
            .tones_with_pitch(position, mapped.pitch, mapped.octave, extended)
            .first()
            .copied()
    }

    /// The ordered transform list to try when `position` reads notation shared
    /// by `shared_by`. An exact shared-by rule wins over the generic one.
    pub fn shared_transforms(
        &self,
        position: Position,
        shared_by: &BTreeSet<Position>,
    ) -> Option<&[SharedTransform]> {
        let applies = |rule: &&SharedRule| {
            rule.positions.is_empty() || rule.positions.contains(&position)
        };
        self.shared
            .iter()
            .filter(applies)
            .find(|rule| {
                rule.shared_by
                    .as_ref()
                    .is_some_and(|s| s.iter().copied().collect::<BTreeSet<_>>() == *shared_by)
            })
            .or_else(|| {
                self.shared
                    .iter()
                    .filter(applies)
                    .find(|rule| rule.shared_by.is_none())
            })
            .map(|rule| rule.transforms.as_slice())
    }

    /// Polos/sangsih pairs whose kempyung correctness is validated.
    pub fn polos_sangsih_pairs(&self) -> &[(Position, Position)] {
        &self.pairs
    }

    pub fn ornament(&self, stroke: Stroke) -> Option<&[OrnamentStep]> {
        self.ornaments.get(&stroke).map(Vec::as_slice)
    }
}

// ---------------------------------------------------------------------------
// MIDI notes and presets

#[derive(Serialize, Debug, Clone, Copy)]
pub struct Preset {
    pub bank: u16,
    pub program: u8,
    pub channel: u8,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct MidiNotes {
    notes: BTreeMap<(InstrumentType, Pitch, Option<i8>, Stroke), u8>,
    presets: BTreeMap<Position, Preset>,
}

impl MidiNotes {
    pub fn from_tsv(notes_src: &str, presets_src: &str, group: InstrumentGroup) -> Result<Self, Diagnostics> {
        let diags = Diagnostics::new();
        let mut notes = BTreeMap::new();
        for (row_span, row) in tsv_rows(notes_src) {
            let row_group = field(&diags, &row, row_span, 0, "group")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "group", InstrumentGroup::from_name));
            if row_group != Some(group) {
                continue;
            }
            let instrument = field(&diags, &row, row_span, 1, "instrument")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "instrument", InstrumentType::from_name));
            let pitch = field(&diags, &row, row_span, 2, "pitch")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "pitch", Pitch::from_name));
            let octave = field(&diags, &row, row_span, 3, "octave")
                .and_then(|(_, v)| (v != "-").then(|| v.parse::<i8>().ok()).flatten());
            let stroke = field(&diags, &row, row_span, 4, "stroke")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "stroke", Stroke::from_name));
            let midinote = field(&diags, &row, row_span, 5, "midinote").and_then(|(s, v)| {
                let n = v.parse::<u8>().ok().filter(|n| *n < 128);
                if n.is_none() {
                    diags.err(code::TABLE, s, format!("invalid midi note '{v}'"));
                }
                n
            });
            let (Some(instrument), Some(pitch), Some(stroke), Some(midinote)) =
                (instrument, pitch, stroke, midinote)
            else {
                continue;
            };
            notes.insert((instrument, pitch, octave, stroke), midinote);
        }
        let mut presets = BTreeMap::new();
        for (row_span, row) in tsv_rows(presets_src) {
            let row_group = field(&diags, &row, row_span, 0, "group")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "group", InstrumentGroup::from_name));
            if row_group != Some(group) {
                continue;
            }
            let position = field(&diags, &row, row_span, 1, "position")
                .and_then(|(s, v)| parse_enum(&diags, s, v, "position", Position::from_name));
            let bank = field(&diags, &row, row_span, 2, "bank").and_then(|(s, v)| {
                let n = v.parse::<u16>().ok().filter(|n| *n < 16384);
                if n.is_none() {
                    diags.err(code::TABLE, s, format!("invalid bank '{v}'"));
                }
                n
            });
            let program = field(&diags, &row, row_span, 3, "program").and_then(|(s, v)| {
                let n = v.parse::<u8>().ok().filter(|n| *n < 128);
                if n.is_none() {
                    diags.err(code::TABLE, s, format!("invalid program '{v}'"));
                }
                n
            });
            let channel = field(&diags, &row, row_span, 4, "channel").and_then(|(s, v)| {
                let n = v.parse::<u8>().ok().filter(|n| *n < 16);
                if n.is_none() {
                    diags.err(code::TABLE, s, format!("invalid channel '{v}'"));
                }
                n
            });
            let (Some(position), Some(bank), Some(program), Some(channel)) =
                (position, bank, program, channel)
            else {
                continue;
            };
            presets.insert(
                position,
                Preset {
                    bank,
                    program,
                    channel,
                },
            );
        }
        diags.into_result(Self { notes, presets })
    }

    /// MIDI note number for a sounding note. Strokes without a dedicated
    /// sample fall back to the open stroke.
    pub fn note_for(
        &self,
        instrument: InstrumentType,
        pitch: Pitch,
        octave: Option<i8>,
        stroke: Stroke,
    ) -> Option<u8> {
        self.notes
            .get(&(instrument, pitch, octave, stroke))
            .or_else(|| self.notes.get(&(instrument, pitch, octave, Stroke::Open)))
            .copied()
    }

    pub fn preset(&self, position: Position) -> Option<Preset> {
        self.presets.get(&position).copied()
    }
}

// ---------------------------------------------------------------------------
// The combined table set

#[derive(Serialize, Debug, Clone)]
pub struct Tables {
    pub group: InstrumentGroup,
    pub font: FontTable,
    pub instruments: Instruments,
    pub tags: TagTable,
    pub rules: Rules,
    pub midi: MidiNotes,
}

impl Tables {
    /// The embedded gong kebyar data set.
    pub fn builtin() -> Self {
        let group = InstrumentGroup::GongKebyar;
        Self {
            group,
            font: FontTable::from_tsv(builtin::FONT).expect("builtin font table is valid"),
            instruments: Instruments::from_tsv(builtin::INSTRUMENTS, group)
                .expect("builtin instruments table is valid"),
            tags: TagTable::from_tsv(builtin::TAGS).expect("builtin tag table is valid"),
            rules: Rules::from_tsv(builtin::RULES, group).expect("builtin rules table is valid"),
            midi: MidiNotes::from_tsv(builtin::MIDINOTES, builtin::PRESETS, group)
                .expect("builtin midi tables are valid"),
        }
    }

    /// Settings validation (pipeline stage 1): cross-table consistency.
    pub fn validate(&self, settings: &crate::score::ScoreSettings) -> Result<(), Diagnostics> {
        let diags = Diagnostics::new();
        let all = Span::from(0..1);
        for (tag, positions) in self.tags.entries() {
            for p in positions {
                if self.instruments.spec(*p).is_none() {
                    diags.err(
                        code::TABLE,
                        all,
                        format!("tag '{tag}' names position {p} absent from the instruments table"),
                    );
                }
            }
        }
        for (polos, sangsih) in self.rules.polos_sangsih_pairs() {
            for p in [polos, sangsih] {
                if self.instruments.spec(*p).is_none() {
                    diags.err(
                        code::TABLE,
                        all,
                        format!("polos/sangsih pair names unknown position {p}"),
                    );
                }
            }
        }
        for position in self.instruments.positions() {
            if self.midi.preset(position).is_none() {
                diags.err(
                    code::TABLE,
                    all,
                    format!("no preset defined for position {position}"),
                );
            }
        }
        let t = &settings.tremolo;
        if t.accelerating_pattern.len() != t.accelerating_velocity.len() {
            diags.err(
                code::TABLE,
                all,
                "accelerating tremolo pattern and velocity tables differ in length",
            );
        }
        if t.accelerating_pattern.len() % 2 != 0 {
            diags.err(
                code::TABLE,
                all,
                "accelerating tremolo pattern must have even length",
            );
        }
        if settings.dynamics.get(&settings.default_dynamics).is_none() {
            diags.err(
                code::TABLE,
                all,
                format!(
                    "default dynamics '{}' missing from the dynamics map",
                    settings.default_dynamics
                ),
            );
        }
        if settings.ppq as u32 % settings.base_note_time != 0 {
            diags.err(
                code::TABLE,
                all,
                format!(
                    "PPQ {} is not a multiple of the base note time {}",
                    settings.ppq, settings.base_note_time
                ),
            );
        }
        diags.into_result(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_loads() {
        let tables = Tables::builtin();
        assert_eq!(tables.group, InstrumentGroup::GongKebyar);
        assert!(tables.font.get('o').is_some());
        assert!(tables.font.is_modifier(','));
        assert!(!tables.font.is_modifier('o'));
        assert!(tables.instruments.spec(Position::PemadePolos).is_some());
        assert!(tables.tags.positions("gangsa").is_some_and(|p| p.len() == 4));
    }

    #[test]
    fn test_tones_with_pitch_prefers_nearest_octave() {
        let tables = Tables::builtin();
        // Pemade holds DONG in octaves 0 and 1; from a reference octave of 1
        // the same octave must come first.
        let tones =
            tables
                .instruments
                .tones_with_pitch(Position::PemadePolos, Pitch::Dong, 1, false);
        assert_eq!(tones.first(), Some(&Tone::new(Pitch::Dong, 1)));
        assert!(tones.contains(&Tone::new(Pitch::Dong, 0)));
    }

    #[test]
    fn test_kempyung_in_range() {
        let tables = Tables::builtin();
        let k = tables.rules.kempyung_in_range(
            &tables.instruments,
            Tone::new(Pitch::Ding, 1),
            Position::PemadeSangsih,
            false,
        );
        assert_eq!(k, Some(Tone::new(Pitch::Dung, 1)));
    }

    #[test]
    fn test_shared_transforms_exact_match_wins() {
        let tables = Tables::builtin();
        let shared: BTreeSet<Position> =
            [Position::PemadePolos, Position::PemadeSangsih].into_iter().collect();
        let transforms = tables
            .rules
            .shared_transforms(Position::PemadeSangsih, &shared)
            .unwrap();
        assert_eq!(transforms.first(), Some(&SharedTransform::Kempyung));
    }

    #[test]
    fn test_step() {
        let tables = Tables::builtin();
        let up = tables
            .instruments
            .step(Position::PemadePolos, Tone::new(Pitch::Dang, 0), 1);
        assert_eq!(up, Some(Tone::new(Pitch::Ding, 1)));
        let off_the_end = tables
            .instruments
            .step(Position::PemadePolos, Tone::new(Pitch::Ding, 2), 1);
        assert_eq!(off_the_end, None);
    }
}
