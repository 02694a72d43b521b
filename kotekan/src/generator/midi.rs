use anyhow::{anyhow, bail};
use kotekan_common::execution::{Execution, StepKind};
use kotekan_common::score::{Note, Score};
use kotekan_common::tables::{Position, Stroke, Tables};
use midly::MetaMessage::{EndOfTrack, Marker, Tempo, TrackName};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Arena, Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use num_rational::Ratio;
use std::collections::BTreeMap;

// Track layout: track 0 carries the tempo map and PART markers; tracks 1..K
// carry one instrument position each, in canonical position order. All
// iteration is over ordered maps so the same score always produces the same
// bytes; events that land on the same tick are written note-off first.

fn bpm_to_micros_per_beat(bpm: u32) -> anyhow::Result<u24> {
    if bpm == 0 {
        bail!("tempo of zero beats per minute");
    }
    u24::try_from(60_000_000 / bpm).ok_or_else(|| anyhow!("overflow calculating tempo"))
}

/// Ticks for a duration of `seconds` at the given tempo.
fn seconds_to_ticks(seconds: u32, bpm: u32, ppq: u16) -> u32 {
    seconds * bpm * ppq as u32 / 60
}

/// Given a larger integer value, return (msb, lsb).
fn split_u14<T: TryInto<u16>>(val: T) -> anyhow::Result<(u7, u7)> {
    let as_u16 = val
        .try_into()
        .map_err(|_| anyhow!("range error mapping value to 16 bits"))?;
    let msb = u8::try_from(as_u16 / 128)
        .ok()
        .and_then(u7::try_from)
        .ok_or_else(|| anyhow!("range error getting msb of 14-bit value"))?;
    let lsb = u7::try_from((as_u16 % 128) as u8).unwrap();
    Ok((msb, lsb))
}

fn delta(ticks: u32) -> anyhow::Result<u28> {
    u28::try_from(ticks).ok_or_else(|| anyhow!("tick delta overflow"))
}

/// Event stream for one instrument position. Silence accumulates in
/// `pending_ticks` until the next event; extensions merge into the preceding
/// note-off the way the notation means them.
struct PositionTrack<'a> {
    channel: u4,
    events: Vec<TrackEvent<'a>>,
    pending_ticks: u32,
    written_ticks: u32,
    last_note_off: Option<usize>,
    last_after_silence: bool,
}

impl<'a> PositionTrack<'a> {
    fn new(position: Position, channel: u4) -> Self {
        Self {
            channel,
            events: vec![TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(TrackName(position.name().as_bytes())),
            }],
            pending_ticks: 0,
            written_ticks: 0,
            last_note_off: None,
            last_after_silence: false,
        }
    }

    fn push(&mut self, kind: TrackEventKind<'a>) -> anyhow::Result<()> {
        self.events.push(TrackEvent {
            delta: delta(self.pending_ticks)?,
            kind,
        });
        self.pending_ticks = 0;
        Ok(())
    }

    fn add_note(&mut self, key: u7, velocity: u7, on_ticks: u32, rest_ticks: u32) -> anyhow::Result<()> {
        self.push(TrackEventKind::Midi {
            channel: self.channel,
            message: MidiMessage::NoteOn { key, vel: velocity },
        })?;
        self.events.push(TrackEvent {
            delta: delta(on_ticks)?,
            kind: TrackEventKind::Midi {
                channel: self.channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: 0.into(),
                },
            },
        });
        self.last_note_off = Some(self.events.len() - 1);
        self.last_after_silence = false;
        self.written_ticks += on_ticks + rest_ticks;
        self.pending_ticks = rest_ticks;
        Ok(())
    }

    fn add_silence(&mut self, ticks: u32) {
        self.pending_ticks += ticks;
        self.written_ticks += ticks;
        if ticks > 0 {
            self.last_after_silence = true;
        }
    }

    /// An extension lengthens the last sounding note; after a silence it
    /// behaves like more silence.
    fn add_extension(&mut self, ticks: u32) -> anyhow::Result<()> {
        match self.last_note_off {
            Some(idx) if !self.last_after_silence && self.pending_ticks == 0 => {
                let new_delta = u32::from(self.events[idx].delta) + ticks;
                self.events[idx].delta = delta(new_delta)?;
                self.written_ticks += ticks;
            }
            _ => self.add_silence(ticks),
        }
        Ok(())
    }

    fn extend_last_note(&mut self, ticks: u32) -> anyhow::Result<()> {
        if let Some(idx) = self.last_note_off {
            let new_delta = u32::from(self.events[idx].delta) + ticks;
            self.events[idx].delta = delta(new_delta)?;
            self.written_ticks += ticks;
        }
        Ok(())
    }

    fn finish(mut self, trailing_ticks: u32) -> anyhow::Result<Vec<TrackEvent<'a>>> {
        self.pending_ticks += trailing_ticks;
        self.push(TrackEventKind::Meta(EndOfTrack))?;
        Ok(self.events)
    }
}

struct MidiGenerator<'a> {
    score: &'a Score,
    execution: &'a Execution,
    tables: &'a Tables,
    arena: &'a Arena,
}

impl<'a> MidiGenerator<'a> {
    fn ticks(&self, fraction: Ratio<u32>) -> u32 {
        (fraction * self.score.settings.base_note_time)
            .round()
            .to_integer()
    }

    /// Ticks spanned by one execution step.
    fn step_ticks(&self, step: &kotekan_common::execution::ExecStep) -> u32 {
        match step.kind {
            StepKind::Beat { gongan, beat, .. } => {
                self.ticks(self.score.gongans[gongan].beats[beat].duration)
            }
            StepKind::Silence { quarter_seconds } => {
                (Ratio::new(
                    quarter_seconds * step.bpm * self.score.settings.ppq as u32,
                    240,
                ))
                .round()
                .to_integer()
            }
        }
    }

    fn initial_bpm(&self) -> u32 {
        self.execution
            .steps
            .first()
            .map(|s| s.bpm)
            .unwrap_or(self.score.settings.default_tempo)
    }

    fn final_bpm(&self) -> u32 {
        self.execution
            .steps
            .last()
            .map(|s| s.bpm)
            .unwrap_or(self.score.settings.default_tempo)
    }

    /// Track 0: the tempo map and PART markers.
    fn conductor_track(&self) -> anyhow::Result<Vec<TrackEvent<'a>>> {
        let settings = &self.score.settings;
        let mut events = vec![TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(TrackName(self.arena.add(self.score.title.as_bytes()))),
        }];
        // The opening tempo is set before the leading silence so the silence
        // has a defined length.
        events.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(Tempo(bpm_to_micros_per_beat(self.initial_bpm())?)),
        });
        let mut last_bpm = Some(self.initial_bpm());
        let mut pending = seconds_to_ticks(
            settings.silence_seconds_before_start,
            self.initial_bpm(),
            settings.ppq,
        );
        for step in &self.execution.steps {
            if last_bpm != Some(step.bpm) {
                events.push(TrackEvent {
                    delta: delta(pending)?,
                    kind: TrackEventKind::Meta(Tempo(bpm_to_micros_per_beat(step.bpm)?)),
                });
                pending = 0;
                last_bpm = Some(step.bpm);
            }
            if let Some(marker) = &step.marker {
                events.push(TrackEvent {
                    delta: delta(pending)?,
                    kind: TrackEventKind::Meta(Marker(self.arena.add(marker.as_bytes()))),
                });
                pending = 0;
            }
            pending += self.step_ticks(step);
        }
        pending += seconds_to_ticks(settings.silence_seconds_after_end, self.final_bpm(), settings.ppq);
        events.push(TrackEvent {
            delta: delta(pending)?,
            kind: TrackEventKind::Meta(EndOfTrack),
        });
        Ok(events)
    }

    fn emit_note(
        &self,
        track: &mut PositionTrack<'a>,
        position: Position,
        note: &Note,
        velocity: u8,
    ) -> anyhow::Result<u32> {
        let on_ticks = self.ticks(note.duration);
        let rest_ticks = self.ticks(note.rest_after);
        match note.stroke {
            _ if note.is_audible() => {
                let key = self
                    .tables
                    .midi
                    .note_for(position.instrument(), note.pitch, note.octave, note.stroke)
                    .and_then(u7::try_from)
                    .ok_or_else(|| {
                        anyhow!(
                            "no MIDI note defined for {} {} octave {:?} {}",
                            position,
                            note.pitch,
                            note.octave,
                            note.stroke
                        )
                    })?;
                let velocity = u7::try_from(note.velocity.unwrap_or(velocity).min(127)).unwrap();
                track.add_note(key, velocity, on_ticks, rest_ticks)?;
            }
            Stroke::Extension => track.add_extension(on_ticks + rest_ticks)?,
            _ => track.add_silence(on_ticks + rest_ticks),
        }
        Ok(on_ticks + rest_ticks)
    }

    fn position_track(&self, position: Position) -> anyhow::Result<PositionTrack<'a>> {
        let settings = &self.score.settings;
        let preset = self
            .tables
            .midi
            .preset(position)
            .ok_or_else(|| anyhow!("no preset defined for position {position}"))?;
        let channel = u4::try_from(preset.channel.min(15)).unwrap();
        let mut track = PositionTrack::new(position, channel);
        if preset.bank > 0 {
            let (bank_msb, bank_lsb) = split_u14(preset.bank)?;
            track.push(TrackEventKind::Midi {
                channel,
                message: MidiMessage::Controller {
                    controller: 0.into(), // Bank Select MSB
                    value: bank_msb,
                },
            })?;
            track.push(TrackEventKind::Midi {
                channel,
                message: MidiMessage::Controller {
                    controller: 32.into(), // Bank Select LSB
                    value: bank_lsb,
                },
            })?;
        }
        let program = u7::try_from(preset.program)
            .ok_or_else(|| anyhow!("program out of range for {position}"))?;
        track.push(TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange { program },
        })?;
        track.add_silence(seconds_to_ticks(
            settings.silence_seconds_before_start,
            self.initial_bpm(),
            settings.ppq,
        ));
        for step in &self.execution.steps {
            let step_ticks = self.step_ticks(step);
            match step.kind {
                StepKind::Beat { gongan, beat, pass } => {
                    let b = &self.score.gongans[gongan].beats[beat];
                    let start = track.written_ticks;
                    if let Some(notes) = b
                        .measures
                        .get(&position)
                        .and_then(|m| m.notes_for_pass(pass))
                    {
                        let velocity = step.velocities.get(&position).copied().unwrap_or(70);
                        for note in notes {
                            self.emit_note(&mut track, position, note, velocity)?;
                        }
                    }
                    // Short or missing measures rest out the remainder of the
                    // beat so all tracks stay aligned.
                    let emitted = track.written_ticks - start;
                    if emitted < step_ticks {
                        track.add_silence(step_ticks - emitted);
                    }
                }
                StepKind::Silence { .. } => track.add_silence(step_ticks),
            }
        }
        Ok(track)
    }

    fn generate(&self) -> anyhow::Result<Smf<'a>> {
        let settings = &self.score.settings;
        let timing = u15::try_from(settings.ppq)
            .ok_or_else(|| anyhow!("PPQ out of range"))?;
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(timing)));
        smf.tracks.push(self.conductor_track()?);

        let mut tracks: BTreeMap<Position, PositionTrack> = BTreeMap::new();
        for position in &self.score.positions {
            tracks.insert(*position, self.position_track(*position)?);
        }
        // A piece that loops must end exactly; otherwise the longest-ringing
        // tracks get a natural release tail.
        if !settings.looping {
            let max_end = tracks.values().map(|t| t.written_ticks).max().unwrap_or(0);
            let tail = seconds_to_ticks(settings.release_tail_seconds, self.final_bpm(), settings.ppq);
            for track in tracks.values_mut() {
                if track.written_ticks == max_end {
                    track.extend_last_note(tail)?;
                }
            }
        }
        let trailing = seconds_to_ticks(
            settings.silence_seconds_after_end,
            self.final_bpm(),
            settings.ppq,
        );
        for (_, track) in tracks {
            smf.tracks.push(track.finish(trailing)?);
        }
        Ok(smf)
    }
}

/// Renders the execution as a standard MIDI file (format 1) and returns the
/// encoded bytes.
pub fn generate(
    score: &Score,
    execution: &Execution,
    tables: &Tables,
) -> anyhow::Result<Vec<u8>> {
    let arena = Arena::new();
    let generator = MidiGenerator {
        score,
        execution,
        tables,
        arena: &arena,
    };
    let smf = generator.generate()?;
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|e| anyhow!("encoding MIDI file: {e}"))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpm_to_micros_per_beat() {
        assert_eq!(bpm_to_micros_per_beat(120).unwrap(), 500000);
        assert_eq!(bpm_to_micros_per_beat(60).unwrap(), 1000000);
        assert!(bpm_to_micros_per_beat(0).is_err());
    }

    #[test]
    fn test_seconds_to_ticks() {
        // One second at 120 bpm and 96 ppq is two quarter notes.
        assert_eq!(seconds_to_ticks(1, 120, 96), 192);
        assert_eq!(seconds_to_ticks(2, 60, 96), 192);
    }

    #[test]
    fn test_split_u14() {
        assert!(split_u14(16384).is_err());
        assert_eq!(split_u14(16383).unwrap(), (127.into(), 127.into()));
        assert_eq!(split_u14(128).unwrap(), (1.into(), 0.into()));
        assert_eq!(split_u14(127).unwrap(), (0.into(), 127.into()));
    }
}
