//! The transcription pipeline: a fixed sequence of stages, each taking its
//! input by value and producing a new artifact. A stage that records
//! diagnostics finishes its own analysis; the pipeline then renders the
//! findings and aborts before the next stage runs.

use crate::generator::midi;
use anyhow::{Context, bail};
use kotekan_common::execution::{Execution, linearize};
use kotekan_common::parsing::diagnostics::Diagnostics;
use kotekan_common::parsing::pass2;
use kotekan_common::score::binding::bind_positions;
use kotekan_common::score::build::build_score;
use kotekan_common::score::completion::complete_score;
use kotekan_common::score::notation::score_to_notation;
use kotekan_common::score::patterns::elaborate_patterns;
use kotekan_common::score::validation::{ValidationOptions, validate_score};
use kotekan_common::score::{Score, ScoreSettings};
use kotekan_common::tables::{
    FontTable, InstrumentGroup, Instruments, MidiNotes, Rules, TagTable, Tables,
};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub autocorrect: bool,
    pub save_corrected: bool,
    pub save_midifile: bool,
    pub detailed_validation_logging: bool,
    /// Production runs refuse autocorrection: the notation itself must be
    /// correct before a piece is published.
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub notation_file: PathBuf,
    pub title: String,
    pub midi_out: Option<PathBuf>,
    pub json_out: Option<PathBuf>,
    pub settings: ScoreSettings,
    pub options: RunOptions,
}

/// Runs one stage, rendering accumulated diagnostics against the source on
/// failure.
fn stage<T>(
    name: &str,
    filename: &str,
    src: &str,
    result: Result<T, Diagnostics>,
) -> anyhow::Result<T> {
    info!("--- {name} ---");
    match result {
        Ok(value) => Ok(value),
        Err(diags) => {
            let count = diags.num_errors();
            anstream::eprintln!("{}", diags.render(filename, src));
            bail!("{name} failed with {count} error(s)");
        }
    }
}

fn read_table(dir: &Path, name: &str) -> anyhow::Result<String> {
    let path = dir.join(name);
    fs::read_to_string(&path).with_context(|| format!("reading table {}", path.display()))
}

fn table_stage<T>(name: &str, src: &str, result: Result<T, Diagnostics>) -> anyhow::Result<T> {
    stage(&format!("loading {name}"), name, src, result)
}

/// Loads the lookup tables from a data directory, falling back to the
/// embedded gong kebyar set when none is given.
pub fn load_tables(data_dir: Option<&Path>) -> anyhow::Result<Tables> {
    let Some(dir) = data_dir else {
        return Ok(Tables::builtin());
    };
    let group = InstrumentGroup::GongKebyar;
    let font_src = read_table(dir, "font.tsv")?;
    let instruments_src = read_table(dir, "instruments.tsv")?;
    let tags_src = read_table(dir, "tags.tsv")?;
    let rules_src = read_table(dir, "rules.tsv")?;
    let midinotes_src = read_table(dir, "midinotes.tsv")?;
    let presets_src = read_table(dir, "presets.tsv")?;
    Ok(Tables {
        group,
        font: table_stage("font.tsv", &font_src, FontTable::from_tsv(&font_src))?,
        instruments: table_stage(
            "instruments.tsv",
            &instruments_src,
            Instruments::from_tsv(&instruments_src, group),
        )?,
        tags: table_stage("tags.tsv", &tags_src, TagTable::from_tsv(&tags_src))?,
        rules: table_stage("rules.tsv", &rules_src, Rules::from_tsv(&rules_src, group))?,
        midi: table_stage(
            "midinotes.tsv",
            &midinotes_src,
            MidiNotes::from_tsv(&midinotes_src, &presets_src, group),
        )?,
    })
}

/// The full pipeline for one piece: parse, construct, bind, elaborate,
/// complete, validate, linearize, emit.
pub fn run_piece(config: &RunConfig, tables: &Tables) -> anyhow::Result<()> {
    info!("transcribing {}", config.notation_file.display());
    let filename = config.notation_file.display().to_string();
    let src = fs::read_to_string(&config.notation_file)
        .with_context(|| format!("reading notation file {filename}"))?;

    stage(
        "settings validation",
        &filename,
        &src,
        tables.validate(&config.settings),
    )?;
    let notation = stage(
        "notation parse",
        &filename,
        &src,
        pass2::parse2(&src, &tables.font),
    )?;
    let score = stage(
        "score construction",
        &filename,
        &src,
        build_score(&notation, tables, &config.settings, &config.title),
    )?;
    let score = stage(
        "position binding",
        &filename,
        &src,
        bind_positions(score, tables),
    )?;
    let score = stage(
        "pattern elaboration",
        &filename,
        &src,
        elaborate_patterns(score, tables),
    )?;
    let score = stage(
        "score completion",
        &filename,
        &src,
        complete_score(score, tables),
    )?;
    let validation = ValidationOptions {
        autocorrect: config.options.autocorrect && !config.options.production,
        detailed_logging: config.options.detailed_validation_logging,
    };
    let score = stage(
        "score validation",
        &filename,
        &src,
        validate_score(&score, tables, &validation),
    )?;
    if config.options.save_corrected {
        let path = config.notation_file.with_extension("corrected.gam");
        fs::write(&path, score_to_notation(&score, tables))
            .with_context(|| format!("writing corrected notation to {}", path.display()))?;
        info!("corrected notation written to {}", path.display());
    }
    let execution = stage(
        "execution linearization",
        &filename,
        &src,
        linearize(&score, tables),
    )?;
    if let Some(path) = &config.json_out {
        write_execution_json(path, &score, &execution)?;
    }
    if config.options.save_midifile {
        info!("--- MIDI emission ---");
        let bytes = midi::generate(&score, &execution, tables)?;
        let out = midi_out_path(config);
        fs::write(&out, bytes)
            .with_context(|| format!("writing MIDI file to {}", out.display()))?;
        info!("output written to {}", out.display());
    }
    Ok(())
}

fn midi_out_path(config: &RunConfig) -> PathBuf {
    config
        .midi_out
        .clone()
        .unwrap_or_else(|| config.notation_file.with_extension("mid"))
}

fn write_execution_json(path: &Path, score: &Score, execution: &Execution) -> anyhow::Result<()> {
    let value = serde_json::json!({
        "title": score.title,
        "positions": score.positions,
        "steps": execution.steps,
    });
    fs::write(path, serde_json::to_string_pretty(&value)?)
        .with_context(|| format!("writing execution dump to {}", path.display()))?;
    Ok(())
}
