use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Level;

use crate::cli::args::{Cli, Commands};
use crate::config::DatasetConfig;
use crate::pipeline::{Batcher, StreamAssembler};
use crate::processors::{DataPreparer, StratifiedSelector};
use crate::readers::{ParquetTileReader, TileStore};
use crate::utils::progress::ProgressReporter;
use crate::writers::{ParquetWriter, SplitWriter};

/// Install the fmt subscriber: DEBUG when verbose, INFO otherwise
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<DatasetConfig> {
    DatasetConfig::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Split {
            config,
            report,
            output_dir,
            compression,
            row_group_size,
        } => {
            let config = load_config(&config)?;
            let preparer = DataPreparer::new(&config);

            let progress = ProgressReporter::stage("Preparing splits...", true);
            let (observations, stations) = preparer.load().context("Failed to load input tables")?;
            let splits = preparer.prepare_train_test_data(observations, &stations)?;
            progress.finish("Splits prepared");

            println!("{:<16} {:>10} {:>10}", "mode", "samples", "stations");
            for line in splits.summary() {
                println!("{:<16} {:>10} {:>10}", line.mode.as_str(), line.samples, line.stations);
            }
            println!("{} stations rejected", splits.assignment().rejected.len());

            if let Some(path) = report {
                SplitWriter::new()
                    .write_report(&splits, &path)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
                println!("Report written to {}", path.display());
            }

            if let Some(dir) = output_dir {
                std::fs::create_dir_all(&dir)?;
                let writer = ParquetWriter::new()
                    .with_compression(&compression)?
                    .with_row_group_size(row_group_size);
                for mode in splits.modes() {
                    let path = dir.join(format!("{}.parquet", mode));
                    writer.write_split(splits.get(mode)?, &path)?;
                    println!("{}: {}", mode, writer.get_file_info(&path)?.summary());
                }
            }
        }

        Commands::Select {
            config,
            output,
            seed,
        } => {
            let mut config = load_config(&config)?;
            if seed.is_some() {
                config.selection.seed = seed;
            }

            let (observations, stations) = DataPreparer::new(&config)
                .load()
                .context("Failed to load input tables")?;
            let selected = StratifiedSelector::new(&config.selection).select(
                &observations,
                &stations,
                &config.split.country_to_reject_during_training,
            )?;

            println!("Test stations ({}): {}", selected.test.len(), selected.test.join(", "));
            println!("Validation stations ({}): {}", selected.val.len(), selected.val.join(", "));
            println!(
                "Attempts: {}, skipped cells: {} test / {} val",
                selected.attempts,
                selected.test_report.skipped.len(),
                selected.val_report.skipped.len()
            );

            if let Some(path) = output {
                SplitWriter::new().write_json(&selected, &path)?;
            }
        }

        Commands::Stream {
            config,
            mode,
            no_labels,
            batch_size,
        } => {
            let mut config = load_config(&config)?;
            if let Some(batch_size) = batch_size {
                config.pipeline.global_batch_size = batch_size;
            }

            let preparer = DataPreparer::new(&config);
            let (observations, stations) = preparer.load().context("Failed to load input tables")?;
            let splits = preparer.prepare_train_test_data(observations, &stations)?;

            let reader = ParquetTileReader::from_paths(&config.data, &config.features.map_variables)?;
            let mut store = TileStore::new(Arc::new(reader)).with_crop_size(config.pipeline.crop_size);
            let stream = StreamAssembler::new(&config).assemble(&splits, mode, &mut store, !no_labels)?;

            let batcher = Batcher::from_config(&config.pipeline);
            let mut progress = ProgressReporter::batches(mode, batcher.batch_count(stream.len()), true);
            for batch in batcher.batch(mode, &stream) {
                progress.record_batch(batch?.len());
            }
            progress.finish(&format!(
                "{} batches, {} samples",
                progress.batches_seen(),
                progress.samples_seen()
            ));
        }
    }

    Ok(())
}
