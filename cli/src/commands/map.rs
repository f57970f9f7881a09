//! Map command implementation - index reads and scan them against a genome

use anyhow::{Context, Result};
use pash_core::params::MIN_KEEP_PERCENT;
use pash_core::{MapParams, Mapper, MappingSummary, Sensitivity};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{CliError, CliResult};

/// Options given on the `pash map` command line
#[derive(Debug, Clone, Default)]
pub struct MapArgs {
    pub reads: PathBuf,
    pub genome: PathBuf,
    pub output: PathBuf,
    pub gzip: bool,
    pub ignore_list: Option<PathBuf>,
    pub max_mappings: Option<u32>,
    /// Percentage, not a fraction
    pub top_percent: Option<f64>,
    pub bisulfite: bool,
    pub sensitivity: Option<Sensitivity>,
    pub word_offset: Option<usize>,
    pub keep_percent: Option<u32>,
    pub pattern: Option<String>,
    pub stats: Option<PathBuf>,
}

pub fn execute(config: &Config, args: MapArgs) -> Result<()> {
    log::info!("Reads: {}", args.reads.display());
    log::info!("Genome: {}", args.genome.display());
    log::info!("Output: {}", args.output.display());

    require_file(&args.reads)?;
    require_file(&args.genome)?;

    let params = build_map_params(config, &args)?;
    log::debug!("Mapping parameters: {:?}", params);

    let mapper = Mapper::new(params).map_err(CliError::from)?;
    let summary = mapper
        .run(&args.reads, &args.genome, &args.output)
        .map_err(CliError::from)?;

    log::info!(
        "Mapped {} of {} reads, {} mappings reported",
        summary.reads_mapped,
        summary.reads,
        summary.mappings_reported
    );

    if let Some(stats_path) = &args.stats {
        write_stats(&summary, stats_path)
            .with_context(|| format!("Failed to write statistics to {}", stats_path.display()))?;
        log::info!("Statistics written to {}", stats_path.display());
    }

    Ok(())
}

fn require_file(path: &Path) -> CliResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::file_not_found(path.to_path_buf()))
    }
}

/// Use CLI args, then config, then defaults
fn build_map_params(config: &Config, args: &MapArgs) -> CliResult<MapParams> {
    let map = &config.map;
    let sensitivity = args.sensitivity.unwrap_or(map.sensitivity);

    let top_percent = args.top_percent.unwrap_or(map.top_percent);
    if !(0.0..100.0).contains(&top_percent) {
        return Err(CliError::validation(format!(
            "top percent must be in [0, 100), got {}",
            top_percent
        )));
    }

    let requested_keep = args.keep_percent.unwrap_or(map.keep_percent);
    let keep_percent = MapParams::clamp_keep_percent(requested_keep);
    if keep_percent != requested_keep {
        log::warn!(
            "Keep percent {} is outside {}..=100, using {}",
            requested_keep,
            MIN_KEEP_PERCENT,
            keep_percent
        );
    }

    let params = MapParams {
        pattern: args.pattern.clone().unwrap_or_else(|| map.pattern.clone()),
        word_offset: args.word_offset.unwrap_or(map.word_offset),
        top_percent: top_percent / 100.0,
        max_mappings: args.max_mappings.unwrap_or(map.max_mappings),
        keep_percent,
        bisulfite: args.bisulfite || map.bisulfite,
        max_bisulfite_variants: map.max_bisulfite_variants,
        gzip: args.gzip || map.gzip,
        ignore_list: args.ignore_list.clone().or_else(|| map.ignore_list.clone()),
        ..Default::default()
    };

    let params = params.with_sensitivity(sensitivity);
    if sensitivity == Sensitivity::Fast && args.keep_percent.is_some() {
        // an explicit keep percent still wins over the fast preset
        return Ok(MapParams { keep_percent, ..params });
    }
    Ok(params)
}

fn write_stats(summary: &MappingSummary, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), summary)?;
    Ok(())
}
