use crate::pipeline::{self, RunConfig, RunOptions};
use anyhow::bail;
use clap::Parser;
use kotekan_common::score::ScoreSettings;
use std::fs;
use std::path::PathBuf;

pub mod midi;

/// File extension of notation files.
const NOTATION_EXTENSION: &str = "gam";

#[derive(Parser, Debug)]
pub struct GenerateOptions {
    /// Notation file, or a directory of notation files with --all
    #[arg(long)]
    pub notation: PathBuf,
    /// Transcribe every notation file in the given directory
    #[arg(long)]
    pub all: bool,
    /// Directory with lookup-table overrides (font.tsv, instruments.tsv, ...)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// MIDI output path; defaults to the notation file with a .mid extension
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Write the linearized execution as JSON next to the MIDI file
    #[arg(long)]
    pub json: Option<PathBuf>,
    /// Title recorded in the MIDI file; defaults to the file stem
    #[arg(long)]
    pub title: Option<String>,
    /// Correct kempyung mistakes instead of reporting them
    #[arg(long)]
    pub autocorrect: bool,
    /// Write the (possibly corrected) score back to notation text
    #[arg(long)]
    pub save_corrected: bool,
    /// Production run: autocorrection is refused
    #[arg(long)]
    pub production: bool,
    /// Log every validation finding in detail
    #[arg(long)]
    pub detailed_validation_logging: bool,
    /// Parse and validate only, do not write a MIDI file
    #[arg(long)]
    pub no_midi: bool,
    /// The piece loops: end exactly instead of adding a release tail
    #[arg(long)]
    pub r#loop: bool,
    /// The notation writes each gong at the end of the gongan it closes
    #[arg(long)]
    pub beat_at_end: bool,
}

impl GenerateOptions {
    fn config_for(&self, notation_file: PathBuf) -> RunConfig {
        let title = self.title.clone().unwrap_or_else(|| {
            notation_file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "untitled".to_string())
        });
        let mut settings = ScoreSettings::default();
        settings.looping = self.r#loop;
        settings.beat_at_end = self.beat_at_end;
        RunConfig {
            notation_file,
            title,
            midi_out: self.out.clone(),
            json_out: self.json.clone(),
            settings,
            options: RunOptions {
                autocorrect: self.autocorrect,
                save_corrected: self.save_corrected,
                save_midifile: !self.no_midi,
                detailed_validation_logging: self.detailed_validation_logging,
                production: self.production,
            },
        }
    }
}

pub fn run(options: GenerateOptions) -> anyhow::Result<()> {
    let tables = pipeline::load_tables(options.data_dir.as_deref())?;
    if !options.all {
        return pipeline::run_piece(&options.config_for(options.notation.clone()), &tables);
    }
    // RUN_ALL: transcribe every notation file in the directory; keep going
    // after a failing piece and fail at the end.
    let mut files: Vec<PathBuf> = fs::read_dir(&options.notation)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.extension().and_then(|e| e.to_str()) == Some(NOTATION_EXTENSION))
                .then_some(path)
        })
        .collect();
    files.sort();
    if files.is_empty() {
        bail!(
            "no .{NOTATION_EXTENSION} files found in {}",
            options.notation.display()
        );
    }
    let mut failures = Vec::new();
    for file in files {
        if let Err(e) = pipeline::run_piece(&options.config_for(file.clone()), &tables) {
            log::error!("{}: {e}", file.display());
            failures.push(file);
        }
    }
    if !failures.is_empty() {
        bail!("{} piece(s) failed to transcribe", failures.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests;
