//! Score-to-notation writer: renders a score back into tab-delimited
//! notation text through the font table's reverse lookup. Used to save
//! autocorrected scores; round-trips a freshly constructed score up to
//! whitespace, comment placement and the expansion of shared tags into
//! per-position staves.

use crate::score::{DEFAULT_PASS, Measure, Note, Score};
use crate::tables::{Modifier, Stroke, Tables};
use num_rational::Ratio;
use std::fmt::Write as _;

/// Re-encodes one note as its base symbol plus modifier characters in
/// canonical order. Returns `None` for notes the font cannot express (for
/// example elaborated tremolo repetitions).
fn note_symbols(tables: &Tables, note: &Note) -> Option<String> {
    let (base_stroke, stroke_modifier) = match note.stroke {
        Stroke::Muted => (Stroke::Open, Some(Modifier::Mute)),
        Stroke::Abbreviated => (Stroke::Open, Some(Modifier::Abbreviate)),
        Stroke::Tremolo => (Stroke::Open, Some(Modifier::Tremolo)),
        Stroke::TremoloAccelerating => (Stroke::Open, Some(Modifier::TremoloAccelerating)),
        Stroke::Norot => (Stroke::Open, Some(Modifier::Norot)),
        stroke => (stroke, None),
    };
    let glyph = tables.font.base_symbol(note.pitch, base_stroke)?;
    let mut out = String::new();
    out.push(glyph.symbol);
    if note.is_melodic()
        && let Some(octave) = note.octave
        && Some(octave) != glyph.octave
    {
        let m = match octave {
            0 => Modifier::Octave0,
            2 => Modifier::Octave2,
            _ => return None,
        };
        out.push(tables.font.modifier_symbol(m)?);
    }
    if let Some(m) = stroke_modifier {
        out.push(tables.font.modifier_symbol(m)?);
    }
    // Duration modifiers scale the note's total length relative to the glyph.
    let glyph_total = glyph.duration + glyph.rest_after;
    if glyph_total != Ratio::from_integer(0) {
        let scale = note.total_duration() / glyph_total;
        if scale == Ratio::new(1, 2) {
            out.push(tables.font.modifier_symbol(Modifier::HalfNote)?);
        } else if scale == Ratio::new(1, 4) {
            out.push(tables.font.modifier_symbol(Modifier::QuarterNote)?);
        } else if scale != Ratio::from_integer(1) {
            return None;
        }
    }
    Some(out)
}

fn stave_tag(tables: &Tables, measure: &Measure) -> String {
    tables
        .tags
        .tag_for(measure.position)
        .map(str::to_string)
        .unwrap_or_else(|| measure.position.name().to_lowercase())
}

pub fn score_to_notation(score: &Score, tables: &Tables) -> String {
    let mut out = String::new();
    for comment in &score.global_comments {
        let _ = writeln!(out, "comment\t{comment}");
    }
    for meta in &score.global_metadata {
        let _ = writeln!(out, "metadata\t{}", meta.value.to_notation());
    }
    let mut first = score.global_comments.is_empty() && score.global_metadata.is_empty();
    for gongan in &score.gongans {
        if !first {
            out.push('\n');
        }
        first = false;
        for meta in &gongan.metadata {
            let _ = writeln!(out, "metadata\t{}", meta.value.to_notation());
        }
        for comment in &gongan.comments {
            let _ = writeln!(out, "comment\t{comment}");
        }
        // One line per hand-written (position, pass) stave.
        for position in &score.positions {
            let passes: Vec<i32> = gongan
                .beats
                .iter()
                .filter_map(|b| b.measures.get(position).filter(|m| !m.autogenerated))
                .flat_map(|m| m.passes.keys().copied())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            for pass in passes {
                let mut line = String::new();
                let mut any = false;
                for beat in &gongan.beats {
                    line.push('\t');
                    let Some(stave) = beat
                        .measures
                        .get(position)
                        .filter(|m| !m.autogenerated)
                        .and_then(|m| m.passes.get(&pass))
                    else {
                        continue;
                    };
                    any = true;
                    for note in &stave.notes {
                        if let Some(symbols) = note_symbols(tables, note) {
                            line.push_str(&symbols);
                        }
                    }
                }
                if !any {
                    continue;
                }
                let measure = gongan
                    .beats
                    .iter()
                    .find_map(|b| b.measures.get(position).filter(|m| !m.autogenerated));
                let tag = measure
                    .map(|m| stave_tag(tables, m))
                    .unwrap_or_else(|| position.name().to_lowercase());
                if pass == DEFAULT_PASS {
                    let _ = writeln!(out, "{tag}{line}");
                } else {
                    let _ = writeln!(out, "{tag}:{pass}{line}");
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::pass2;
    use crate::score::ScoreSettings;
    use crate::score::build::build_score;

    fn build(src: &str) -> Score {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap()
    }

    #[test]
    fn test_round_trip_simple() {
        let src = "metadata\t{TEMPO 120}\n\ncalung\to,-i,-\te,/u,?a,\n";
        let tables = Tables::builtin();
        let rendered = score_to_notation(&build(src), &tables);
        // Rendering the re-parsed text reproduces itself exactly.
        let again = score_to_notation(&build(&rendered), &tables);
        assert_eq!(rendered, again);
        assert!(rendered.contains("calung\to,-i,-\te,/u,?a,"));
        assert!(rendered.contains("metadata\t{TEMPO 120}"));
    }

    #[test]
    fn test_round_trip_pass_stave() {
        let src = "calung\to,-i,-\ncalung:2\tu,-a,-\n";
        let tables = Tables::builtin();
        let rendered = score_to_notation(&build(src), &tables);
        assert!(rendered.contains("calung\to,-i,-"));
        assert!(rendered.contains("calung:2\tu,-a,-"));
    }

    #[test]
    fn test_duration_modifiers_survive() {
        let src = "calung\to,_i,_u,=a,=e,_e,_\n";
        let tables = Tables::builtin();
        let rendered = score_to_notation(&build(src), &tables);
        assert!(rendered.contains("o,_i,_u,=a,=e,_e,_"));
    }

    #[test]
    fn test_grace_and_ornament_symbols() {
        let src = "pemade\toUu\ta;o~--\n";
        let tables = Tables::builtin();
        let rendered = score_to_notation(&build(src), &tables);
        // The constructed (pre-elaboration) score still carries the
        // shorthand strokes, so the symbols round-trip.
        assert!(rendered.contains("oUu"));
        assert!(rendered.contains("a;o~--"));
    }
}
