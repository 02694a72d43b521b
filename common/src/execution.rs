//! Execution linearization (pipeline stage 8): walks the score in notational
//! order, interpreting labels, gotos, repeats and sequence directives into an
//! ordered list of (gongan, beat, pass) steps, and propagates tempo and
//! dynamics curves onto each step.

use crate::parsing::diagnostics::{Diagnostics, code};
use crate::parsing::metadata::MetaData;
use crate::score::build::resolve_tags;
use crate::score::{LabelRef, Score};
use crate::tables::{Position, Tables};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Backstop behind the flow-state cycle check, for scores whose state space
/// is genuinely enormous.
const MAX_STEPS: usize = 100_000;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Beat {
        gongan: usize,
        beat: usize,
        pass: u32,
    },
    /// A WAIT directive, rounded to quarter seconds.
    Silence { quarter_seconds: u32 },
}

#[derive(Serialize, Debug, Clone)]
pub struct ExecStep {
    pub kind: StepKind,
    pub bpm: u32,
    pub velocities: BTreeMap<Position, u8>,
    pub marker: Option<String>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Execution {
    pub steps: Vec<ExecStep>,
}

impl Execution {
    pub fn beats(&self) -> impl Iterator<Item = (&ExecStep, usize, usize, u32)> {
        self.steps.iter().filter_map(|s| match s.kind {
            StepKind::Beat { gongan, beat, pass } => Some((s, gongan, beat, pass)),
            StepKind::Silence { .. } => None,
        })
    }
}

/// A linear change from `start` to `target` over `n` beats; `k` counts beats
/// since activation. With `n == 0` the target applies immediately.
#[derive(Debug, Clone, Copy)]
struct Ramp {
    start: i64,
    target: i64,
    n: u32,
    k: u32,
}

impl Ramp {
    fn immediate(target: i64) -> Self {
        Self {
            start: target,
            target,
            n: 0,
            k: 0,
        }
    }

    fn value(&self) -> i64 {
        if self.n <= 1 || self.k + 1 >= self.n {
            self.target
        } else {
            self.start + (self.target - self.start) * self.k as i64 / (self.n as i64 - 1)
        }
    }

    fn advance(&mut self) {
        self.k = self.k.saturating_add(1);
    }
}

/// One past the largest pass number any directive's pass filter mentions.
/// Filters cannot distinguish counters at or beyond this value: finite
/// filters have stopped matching and all-pass filters always match.
fn pass_horizon(score: &Score) -> u32 {
    let metadata = score
        .global_metadata
        .iter()
        .chain(score.gongans.iter().flat_map(|g| g.metadata.iter()));
    let mut max_pass = 0u32;
    for meta in metadata {
        let passes = match &meta.value {
            MetaData::Goto(x) => &x.passes,
            MetaData::Wait(x) => &x.passes,
            MetaData::Tempo(x) => &x.passes,
            MetaData::Dynamics(x) => &x.passes,
            MetaData::Suppress(x) => &x.passes,
            _ => continue,
        };
        max_pass = max_pass.max(passes.0.iter().copied().max().unwrap_or(0));
    }
    max_pass + 1
}

/// Snapshot of everything that determines the future of the walk: the
/// cursor, the repeat countdown, the sequence index, and the pass counters
/// capped at the pass horizon. Pass filters cannot tell two counts at or
/// above the horizon apart, so a repeated state proves the walk is periodic.
type FlowState = (usize, usize, u32, usize, Vec<u32>);

struct Linearizer<'a> {
    score: &'a Score,
    tables: &'a Tables,
    diags: Diagnostics,
    visit_count: HashMap<(usize, usize), u32>,
    seen_states: HashSet<FlowState>,
    /// Every (gongan, beat) coordinate in notational order.
    flat_beats: Vec<(usize, usize)>,
    /// One past the largest pass any directive's pass filter mentions.
    pass_horizon: u32,
    marked_gongans: HashSet<usize>,
    tempo: Ramp,
    dynamics: BTreeMap<Position, Ramp>,
    steps: Vec<ExecStep>,
}

impl<'a> Linearizer<'a> {
    fn new(score: &'a Score, tables: &'a Tables) -> Self {
        let default_velocity = score.settings.default_velocity() as i64;
        let dynamics = score
            .positions
            .iter()
            .map(|p| (*p, Ramp::immediate(default_velocity)))
            .collect();
        let flat_beats: Vec<(usize, usize)> = score
            .gongans
            .iter()
            .enumerate()
            .flat_map(|(g, gongan)| (0..gongan.beats.len()).map(move |b| (g, b)))
            .collect();
        let mut this = Self {
            score,
            tables,
            diags: Diagnostics::new(),
            visit_count: HashMap::new(),
            seen_states: HashSet::new(),
            flat_beats,
            pass_horizon: pass_horizon(score),
            marked_gongans: HashSet::new(),
            tempo: Ramp::immediate(score.settings.default_tempo as i64),
            dynamics,
            steps: Vec::new(),
        };
        // Score-level TEMPO and DYNAMICS in the unbound block set the opening
        // values.
        for meta in &score.global_metadata {
            match &meta.value {
                MetaData::Tempo(x) => this.tempo = Ramp::immediate(x.value as i64),
                MetaData::Dynamics(x) => {
                    let velocity = score.settings.velocity(x.value) as i64;
                    for position in this.dynamics_positions(&x.positions) {
                        this.dynamics.insert(position, Ramp::immediate(velocity));
                    }
                }
                _ => {}
            }
        }
        this
    }

    /// The current flow state for cycle detection; see [FlowState].
    fn flow_state(&self, g: usize, b: usize, countdown: u32, seq_idx: usize) -> FlowState {
        let counts = self
            .flat_beats
            .iter()
            .map(|k| {
                self.visit_count
                    .get(k)
                    .copied()
                    .unwrap_or(0)
                    .min(self.pass_horizon)
            })
            .collect();
        (g, b, countdown, seq_idx, counts)
    }

    fn dynamics_positions(&self, tags: &[crate::parsing::model::Spanned<String>]) -> Vec<Position> {
        if tags.is_empty() {
            self.score.positions.iter().copied().collect()
        } else {
            resolve_tags(self.tables, tags)
        }
    }

    /// The repeat count attached to a gongan (1 when absent).
    fn repeat_count(&self, gongan: usize) -> u32 {
        self.score.gongans[gongan]
            .metadata
            .iter()
            .find_map(|m| match &m.value {
                MetaData::Repeat(x) => Some(x.count),
                _ => None,
            })
            .unwrap_or(1)
    }

    /// Applies tempo and dynamics directives that activate at this step, then
    /// advances active ramps and records their current values.
    fn expression_for_step(&mut self, gongan: usize, beat: usize, pass: u32) -> (u32, BTreeMap<Position, u8>) {
        for meta in &self.score.gongans[gongan].metadata {
            match &meta.value {
                MetaData::Tempo(x)
                    if x.first_beat as usize == beat + 1 && x.passes.matches(pass) =>
                {
                    self.tempo = Ramp {
                        start: self.tempo.value(),
                        target: x.value as i64,
                        n: x.beat_count,
                        k: 0,
                    };
                }
                MetaData::Dynamics(x)
                    if x.first_beat as usize == beat + 1 && x.passes.matches(pass) =>
                {
                    let target = self.score.settings.velocity(x.value) as i64;
                    for position in self.dynamics_positions(&x.positions) {
                        let start = self
                            .dynamics
                            .get(&position)
                            .map(Ramp::value)
                            .unwrap_or(target);
                        self.dynamics.insert(
                            position,
                            Ramp {
                                start,
                                target,
                                n: x.beat_count,
                                k: 0,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
        let bpm = self.tempo.value().clamp(1, u32::MAX as i64) as u32;
        let velocities = self
            .dynamics
            .iter()
            .map(|(p, r)| (*p, r.value().clamp(0, 127) as u8))
            .collect();
        self.tempo.advance();
        for ramp in self.dynamics.values_mut() {
            ramp.advance();
        }
        (bpm, velocities)
    }

    /// The goto target that applies when leaving this step, if any. The last
    /// matching directive wins.
    fn goto_target(&self, gongan: usize, beat: usize, pass: u32) -> Option<LabelRef> {
        let g = &self.score.gongans[gongan];
        let mut target = None;
        for meta in &g.metadata {
            let MetaData::Goto(x) = &meta.value else {
                continue;
            };
            let from_beat = x
                .from_beat
                .map(|b| b as usize - 1)
                .unwrap_or(g.beats.len().saturating_sub(1));
            if from_beat != beat || !x.passes.matches(pass) {
                continue;
            }
            if self.score.unbound_labels.contains_key(&x.label.value) {
                self.diags.err(
                    code::GOTO_UNBOUND,
                    x.label.span,
                    format!(
                        "goto target '{}' is declared in the unbound block and binds no beat",
                        x.label.value
                    ),
                );
                continue;
            }
            if let Some(label) = self.score.label(&x.label.value) {
                target = Some(label);
            }
        }
        target
    }

    fn wait_after(&self, gongan: usize, pass: u32) -> Option<u32> {
        self.score.gongans[gongan]
            .metadata
            .iter()
            .find_map(|m| match &m.value {
                MetaData::Wait(x) if x.passes.matches(pass) => {
                    Some((x.seconds * 4.0).round() as u32)
                }
                _ => None,
            })
    }

    /// Resolves the gongan order dictated by a SEQUENCE directive into the
    /// ordered list of label targets.
    fn sequence_plan(&mut self) -> Option<Vec<LabelRef>> {
        let labels = self.score.global_metadata.iter().find_map(|m| match &m.value {
            MetaData::Sequence(x) => Some(x.labels.clone()),
            _ => None,
        })?;
        let mut targets: Vec<LabelRef> = Vec::new();
        for label in &labels {
            if self.score.unbound_labels.contains_key(&label.value) {
                self.diags.err(
                    code::GOTO_UNBOUND,
                    label.span,
                    format!(
                        "sequence entry '{}' is declared in the unbound block and binds no beat",
                        label.value
                    ),
                );
                return None;
            }
            let Some(target) = self.score.label(&label.value) else {
                self.diags.err(
                    code::UNDEFINED_LABEL,
                    label.span,
                    format!("sequence references undefined label '{}'", label.value),
                );
                return None;
            };
            targets.push(target);
        }
        (!targets.is_empty()).then_some(targets)
    }

    fn run(mut self) -> Result<Execution, Diagnostics> {
        if self.score.gongans.iter().all(|g| g.beats.is_empty()) {
            return self.diags.into_result(Execution::default());
        }
        let sequence = self.sequence_plan();
        // Index of the next sequence entry to move to at the end of a gongan.
        let mut seq_idx = 1usize;
        let start = match &sequence {
            Some(targets) => (targets[0].gongan, targets[0].beat),
            None => (0, 0),
        };

        let mut cursor = Some(start);
        let mut entered_gongan: Option<usize> = None;
        let mut countdown = 0u32;
        while let Some((g, b)) = cursor {
            let gongan = &self.score.gongans[g];
            if gongan.beats.is_empty() {
                cursor = (g + 1 < self.score.gongans.len()).then_some((g + 1, 0));
                continue;
            }
            let entering = entered_gongan != Some(g);
            if entering {
                // Every arrival restarts the gongan's repeat counter.
                countdown = self.repeat_count(g);
                entered_gongan = Some(g);
            }
            let pass = {
                let counter = self.visit_count.entry((g, b)).or_insert(0);
                *counter += 1;
                *counter
            };
            if entering && b > 0 {
                // Entering mid-gongan: keep the pass counters of the skipped
                // beats in step so pass-filtered directives stay consistent.
                for bb in 0..b {
                    self.visit_count.insert((g, bb), pass);
                }
            }
            // A repeated flow state means no repeat countdown, pass filter or
            // sequence entry is left to break the cycle: the walk is periodic
            // and will never terminate.
            let state = self.flow_state(g, b, countdown, seq_idx);
            if !self.seen_states.insert(state) || self.steps.len() >= MAX_STEPS {
                self.diags.err(
                    code::DIVERGENT_FLOW,
                    (0..1),
                    format!(
                        "execution does not terminate (gongan {} beat {} pass {pass})",
                        g + 1,
                        b + 1
                    ),
                );
                break;
            }
            let (bpm, velocities) = self.expression_for_step(g, b, pass);
            let marker = if self.marked_gongans.insert(g) {
                gongan.metadata.iter().find_map(|m| match &m.value {
                    MetaData::Part(x) => Some(x.name.clone()),
                    _ => None,
                })
            } else {
                None
            };
            self.steps.push(ExecStep {
                kind: StepKind::Beat {
                    gongan: g,
                    beat: b,
                    pass,
                },
                bpm,
                velocities: velocities.clone(),
                marker,
            });

            // Decide where to go next: goto, then beat succession, then
            // repeat, then the sequence plan or the following gongan.
            let next = if let Some(target) = self.goto_target(g, b, pass) {
                entered_gongan = None;
                Some((target.gongan, target.beat))
            } else if b + 1 < gongan.beats.len() {
                Some((g, b + 1))
            } else if countdown > 1 {
                countdown -= 1;
                Some((g, 0))
            } else if let Some(targets) = &sequence {
                // The sequence replaces the default forward walk; after its
                // last entry the piece ends.
                match targets.get(seq_idx) {
                    Some(target) => {
                        seq_idx += 1;
                        entered_gongan = None;
                        Some((target.gongan, target.beat))
                    }
                    None => None,
                }
            } else {
                (g + 1 < self.score.gongans.len()).then_some((g + 1, 0))
            };

            let leaving = next.is_none_or(|(ng, _)| ng != g);
            if leaving && let Some(quarter_seconds) = self.wait_after(g, pass) {
                self.steps.push(ExecStep {
                    kind: StepKind::Silence { quarter_seconds },
                    bpm,
                    velocities,
                    marker: None,
                });
            }
            cursor = next;
        }
        let steps = std::mem::take(&mut self.steps);
        self.diags.into_result(Execution { steps })
    }
}

pub fn linearize(score: &Score, tables: &Tables) -> Result<Execution, Diagnostics> {
    Linearizer::new(score, tables).run()
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
    use crate::score::validation::{ValidationOptions, validate_score};
    use crate::tables::Tables;

    fn run(src: &str) -> Result<Execution, Diagnostics> {
        let tables = Tables::builtin();
        let notation = pass2::parse2(src, &tables.font).unwrap();
        let score =
            build_score(&notation, &tables, &ScoreSettings::default(), "test").unwrap();
        let score = bind_positions(score, &tables).unwrap();
        let score = elaborate_patterns(score, &tables).unwrap();
        let score = complete_score(score, &tables).unwrap();
        let score = validate_score(&score, &tables, &ValidationOptions::default()).unwrap();
        linearize(&score, &tables)
    }

    fn beat_steps(execution: &Execution) -> Vec<(usize, usize, u32)> {
        execution
            .beats()
            .map(|(_, g, b, p)| (g, b, p))
            .collect()
    }

    #[test]
    fn test_forward_walk() {
        let execution = run("pemade\to-i-\te-u-\n\npemade\ta-u-\n").unwrap();
        assert_eq!(
            beat_steps(&execution),
            vec![(0, 0, 1), (0, 1, 1), (1, 0, 1)]
        );
    }

    #[test]
    fn test_repeat_total_count() {
        let execution = run("metadata\t{REPEAT 3}\npemade\to-i-\te-u-\n").unwrap();
        assert_eq!(
            beat_steps(&execution),
            vec![
                (0, 0, 1),
                (0, 1, 1),
                (0, 0, 2),
                (0, 1, 2),
                (0, 0, 3),
                (0, 1, 3)
            ]
        );
    }

    #[test]
    fn test_goto_on_pass_one_only() {
        // Two gongans; the second jumps back to the first on pass 1 only, so
        // the order is A B A B.
        let src = "metadata\t{LABEL start}\npemade\to-i-\n\nmetadata\t{GOTO start, passes=[1]}\npemade\te-u-\n";
        let execution = run(src).unwrap();
        assert_eq!(
            beat_steps(&execution),
            vec![(0, 0, 1), (1, 0, 1), (0, 0, 2), (1, 0, 2)]
        );
    }

    #[test]
    fn test_repeat_restarts_after_goto() {
        // The repeated gongan plays twice, then the goto on the second gongan
        // sends the flow back; the repeat fires again on re-arrival.
        let src = "metadata\t{LABEL top}\nmetadata\t{REPEAT 2}\npemade\to-i-\n\nmetadata\t{GOTO top, passes=[1]}\npemade\te-u-\n";
        let execution = run(src).unwrap();
        assert_eq!(
            beat_steps(&execution),
            vec![
                (0, 0, 1),
                (0, 0, 2),
                (1, 0, 1),
                (0, 0, 3),
                (0, 0, 4),
                (1, 0, 2)
            ]
        );
    }

    #[test]
    fn test_sequence_governs_order() {
        let src = "metadata\t{SEQUENCE [two, one, two]}\n\nmetadata\t{LABEL one}\npemade\to-i-\n\nmetadata\t{LABEL two}\npemade\te-u-\n";
        let execution = run(src).unwrap();
        assert_eq!(
            beat_steps(&execution),
            vec![(1, 0, 1), (0, 0, 1), (1, 0, 2)]
        );
    }

    #[test]
    fn test_tempo_ramp() {
        let src = "metadata\t{TEMPO 60}\nmetadata\t{TEMPO 120, first_beat=1, beat_count=4}\npemade\to-i-\te-u-\ta-u-\ti-o-\n";
        let execution = run(src).unwrap();
        let bpms: Vec<u32> = execution.beats().map(|(s, ..)| s.bpm).collect();
        assert_eq!(bpms, vec![60, 80, 100, 120]);
    }

    #[test]
    fn test_immediate_tempo() {
        let src = "metadata\t{TEMPO 100, first_beat=2}\npemade\to-i-\te-u-\n";
        let execution = run(src).unwrap();
        let bpms: Vec<u32> = execution.beats().map(|(s, ..)| s.bpm).collect();
        // Default tempo on beat 1, then the immediate change.
        assert_eq!(bpms, vec![60, 100]);
    }

    #[test]
    fn test_dynamics_per_position() {
        let src = "metadata\t{DYNAMICS ff, positions=[pemade_polos]}\npemade\to-i-\n";
        let execution = run(src).unwrap();
        let (step, ..) = execution.beats().next().unwrap();
        assert_eq!(step.velocities[&Position::PemadePolos], 100);
        // Other positions keep the default dynamics.
        assert_eq!(step.velocities[&Position::PemadeSangsih], 70);
    }

    #[test]
    fn test_wait_inserts_silence() {
        let src = "metadata\t{WAIT 2.6}\npemade\to-i-\n";
        let execution = run(src).unwrap();
        let silences: Vec<&StepKind> = execution
            .steps
            .iter()
            .map(|s| &s.kind)
            .filter(|k| matches!(k, StepKind::Silence { .. }))
            .collect();
        assert_eq!(
            silences,
            vec![&StepKind::Silence {
                quarter_seconds: 10
            }]
        );
    }

    #[test]
    fn test_part_marker_on_first_arrival() {
        let src = "metadata\t{PART pengawak}\npemade\to-i-\te-u-\n";
        let execution = run(src).unwrap();
        let markers: Vec<Option<&str>> = execution
            .steps
            .iter()
            .map(|s| s.marker.as_deref())
            .collect();
        assert_eq!(markers, vec![Some("pengawak"), None]);
    }

    #[test]
    fn test_divergent_flow() {
        // An unconditional self-goto never terminates.
        let src = "metadata\t{LABEL loop}\nmetadata\t{GOTO loop}\npemade\to-i-\n";
        let e = run(src).unwrap_err().get_all();
        let d = e
            .iter()
            .find(|d| d.code == code::DIVERGENT_FLOW)
            .expect("divergent flow reported");
        // The flow state repeats on the second arrival, so the cycle is
        // caught immediately rather than by the step cap.
        assert!(d.message.value.contains("pass 2"));
    }

    #[test]
    fn test_bounded_goto_is_not_divergent() {
        // A pass-filtered goto cycles through states that differ in their
        // capped pass counters, so it terminates without a finding.
        let src = "metadata\t{LABEL top}\nmetadata\t{REPEAT 2}\npemade\to-i-\n\nmetadata\t{GOTO top, passes=[1, 2]}\npemade\te-u-\n";
        let execution = run(src).unwrap();
        // The first gongan is entered three times and repeats on each visit.
        assert_eq!(execution.beats().count(), 9);
    }

    #[test]
    fn test_goto_target_in_unbound_block() {
        let src = "metadata\t{LABEL orphan}\n\nmetadata\t{GOTO orphan}\npemade\to-i-\n";
        let e = run(src).unwrap_err().get_all();
        assert!(e.iter().any(|d| d.code == code::GOTO_UNBOUND));
    }
}
