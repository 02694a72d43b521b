use crate::generator::midi;
use crate::pipeline::{self, RunConfig, RunOptions};
use kotekan_common::execution::linearize;
use kotekan_common::parsing::pass2;
use kotekan_common::score::ScoreSettings;
use kotekan_common::score::binding::bind_positions;
use kotekan_common::score::build::build_score;
use kotekan_common::score::completion::complete_score;
use kotekan_common::score::patterns::elaborate_patterns;
use kotekan_common::score::validation::{ValidationOptions, validate_score};
use kotekan_common::tables::Tables;
use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use std::fs;

fn transcribe(src: &str) -> Vec<u8> {
    transcribe_with(src, ScoreSettings::default())
}

fn transcribe_with(src: &str, settings: ScoreSettings) -> Vec<u8> {
    let tables = Tables::builtin();
    let notation = pass2::parse2(src, &tables.font).unwrap();
    let score = build_score(&notation, &tables, &settings, "test").unwrap();
    let score = bind_positions(score, &tables).unwrap();
    let score = elaborate_patterns(score, &tables).unwrap();
    let score = complete_score(score, &tables).unwrap();
    let score = validate_score(&score, &tables, &ValidationOptions::default()).unwrap();
    let execution = linearize(&score, &tables).unwrap();
    midi::generate(&score, &execution, &tables).unwrap()
}

/// Absolute (tick, key, velocity) of every note-on in a track.
fn note_ons(smf: &Smf, track: usize) -> Vec<(u32, u8, u8)> {
    let mut out = Vec::new();
    let mut time = 0u32;
    for event in &smf.tracks[track] {
        time += u32::from(event.delta);
        if let TrackEventKind::Midi {
            message: MidiMessage::NoteOn { key, vel },
            ..
        } = event.kind
        {
            out.push((time, key.into(), vel.into()));
        }
    }
    out
}

fn tempo_events(smf: &Smf) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut time = 0u32;
    for event in &smf.tracks[0] {
        time += u32::from(event.delta);
        if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
            out.push((time, micros.into()));
        }
    }
    out
}

#[test]
fn test_minimal_piece() {
    let bytes = transcribe("metadata\t{TEMPO 120}\nugal\to-i-\to-e-\n");
    let smf = Smf::parse(&bytes).unwrap();
    // Track 0 conducts; then one track each for ugal and the implicit kempli.
    assert_eq!(smf.tracks.len(), 3);
    assert_eq!(tempo_events(&smf), vec![(0, 500000)]);

    // One second of leading silence at 120 bpm is 192 ticks; each beat holds
    // two struck notes a half-beat (48 ticks) apart.
    let ons = note_ons(&smf, 1);
    let times: Vec<u32> = ons.iter().map(|(t, ..)| *t).collect();
    assert_eq!(times, vec![192, 240, 288, 336]);
    // Default dynamics is mf = 70.
    assert!(ons.iter().all(|(_, _, vel)| *vel == 70));

    // The kempli strikes once per beat.
    let kempli = note_ons(&smf, 2);
    let times: Vec<u32> = kempli.iter().map(|(t, ..)| *t).collect();
    assert_eq!(times, vec![192, 288]);
}

#[test]
fn test_notes_balance() {
    // Every note-on has its note-off (well-formed MIDI).
    let bytes = transcribe("pemade\to-i-\te/u?a-\n\nmetadata\t{REPEAT 2}\npemade\ta;--i-\n");
    let smf = Smf::parse(&bytes).unwrap();
    for track in &smf.tracks {
        let mut active = 0i32;
        for event in track {
            match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                } => active += 1,
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => active -= 1,
                _ => {}
            }
            assert!(active >= 0);
        }
        assert_eq!(active, 0);
    }
}

#[test]
fn test_repeat_doubles_notes() {
    let once = transcribe("ugal\to-i-\n");
    let twice = transcribe("metadata\t{REPEAT 2}\nugal\to-i-\n");
    let count = |bytes: &[u8]| {
        let smf = Smf::parse(bytes).unwrap();
        note_ons(&smf, 1).len()
    };
    assert_eq!(count(&once) * 2, count(&twice));
}

#[test]
fn test_deterministic_output() {
    let src = "metadata\t{TEMPO 90}\nmetadata\t{PART pengecet}\ngangsa\to-e-\tu-a-\ncalung\to,---\te,---\n";
    assert_eq!(transcribe(src), transcribe(src));
}

#[test]
fn test_marker_and_program_change() {
    let bytes = transcribe("metadata\t{PART kawitan}\nugal\to-i-\n");
    let smf = Smf::parse(&bytes).unwrap();
    let has_marker = smf.tracks[0].iter().any(|e| {
        matches!(
            e.kind,
            TrackEventKind::Meta(MetaMessage::Marker(b"kawitan"))
        )
    });
    assert!(has_marker);
    let has_program = smf.tracks[1].iter().any(|e| {
        matches!(
            e.kind,
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { .. },
                ..
            }
        )
    });
    assert!(has_program);
}

#[test]
fn test_looping_piece_ends_exactly() {
    let src = "ugal\to-i-\n";
    let tail = transcribe(src);
    let mut settings = ScoreSettings::default();
    settings.looping = true;
    let exact = transcribe_with(src, settings);
    let last_off_delta = |bytes: &[u8]| {
        let smf = Smf::parse(bytes).unwrap();
        smf.tracks[1]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => Some(u32::from(e.delta)),
                _ => None,
            })
            .last()
            .unwrap()
    };
    // The non-looping rendition rings out; the looping one stops on time.
    assert!(last_off_delta(&tail) > last_off_delta(&exact));
}

#[test]
fn test_run_piece_writes_outputs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let notation = tmp.path().join("cendrawasih.gam");
    fs::write(
        &notation,
        "metadata\t{TEMPO 100}\npemade_polos\to-e-\npemade_sangsih\te-u-\n",
    )?;
    let config = RunConfig {
        notation_file: notation.clone(),
        title: "cendrawasih".to_string(),
        midi_out: None,
        json_out: Some(tmp.path().join("cendrawasih.json")),
        settings: ScoreSettings::default(),
        options: RunOptions {
            autocorrect: true,
            save_corrected: true,
            save_midifile: true,
            detailed_validation_logging: false,
            production: false,
        },
    };
    let tables = pipeline::load_tables(None)?;
    pipeline::run_piece(&config, &tables)?;
    let midi_bytes = fs::read(tmp.path().join("cendrawasih.mid"))?;
    assert!(Smf::parse(&midi_bytes).is_ok());
    let corrected = fs::read_to_string(tmp.path().join("cendrawasih.corrected.gam"))?;
    // The sangsih line was autocorrected to the kempyung of the polos line.
    assert!(corrected.contains("pemade_sangsih\ta-i<-"));
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("cendrawasih.json"))?)?;
    assert_eq!(json["title"], "cendrawasih");
    assert!(json["steps"].as_array().is_some_and(|s| !s.is_empty()));
    Ok(())
}

#[test]
fn test_production_run_refuses_autocorrect() {
    let tmp = tempfile::tempdir().unwrap();
    let notation = tmp.path().join("bad.gam");
    fs::write(&notation, "pemade_polos\to---\npemade_sangsih\te---\n").unwrap();
    let config = RunConfig {
        notation_file: notation,
        title: "bad".to_string(),
        midi_out: None,
        json_out: None,
        settings: ScoreSettings::default(),
        options: RunOptions {
            autocorrect: true,
            save_corrected: false,
            save_midifile: false,
            detailed_validation_logging: false,
            production: true,
        },
    };
    let tables = pipeline::load_tables(None).unwrap();
    assert!(pipeline::run_piece(&config, &tables).is_err());
}
