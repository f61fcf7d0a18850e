use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libovstream::config::{Config, Direction};
use libovstream::process::process;
use libovstream::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Stage of the conversion a status comes from
fn stage_name(color: BarColor) -> &'static str {
    match color {
        BarColor::CYAN => "Encoding",
        BarColor::MAGENTA => "Acquiring",
        BarColor::GREEN => "Writing CSV",
    }
}

fn log_config(config: &Config) {
    log::info!("Input Path: {}", config.input_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!("Direction: {:?}", config.direction);
    if config.direction == Direction::StreamToCsv {
        log::info!("Expected Stream Type: {}", config.stream_type);
        log::info!(
            "Separator: '{}' Precision: {} Append: {} Last Matrix Only: {}",
            config.separator,
            config.precision,
            config.append,
            config.last_matrix_only
        );
    } else {
        log::info!(
            "Separator: '{}' Rows Per Read: {} Legacy Samples Per Buffer: {}",
            config.separator,
            config.rows_per_read,
            config.legacy_samples_per_buffer
        );
    }
    if config.direction == Direction::CsvToAcquisition {
        log::info!(
            "Subject Id: {} Age: {} Gender: {}",
            config.subject_id,
            config.subject_age,
            config.subject_gender
        );
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("ovstream_cli")
        .about("Convert between CSV files and binary stream files")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required (-p <path>)");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_separator_valid() {
        log::error!("'{}' cannot be used as a CSV separator", config.separator);
        return;
    }
    if !config.is_rows_per_read_valid() {
        log::error!("rows_per_read must be at least 1");
        return;
    }
    log::info!("Config successfully loaded.");
    log_config(&config);
    let output_path = config.output_path.clone();

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{msg:12} [{bar:40.cyan/blue}] {pos}%") {
        pb.set_style(style);
    }
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    let mut chunk_count = 0;
    loop {
        // Block until the next status; the channel closes when the task is done
        match rx.recv() {
            Ok(status) => {
                pb.set_message(stage_name(status.color));
                pb.set_position((status.progress * 100.0) as u64);
                chunk_count = status.chunk_count;
            }
            Err(mpsc::RecvError) => break,
        }
    }

    match handle.join() {
        Ok(Ok(())) => {
            let size = std::fs::metadata(&output_path)
                .map(|m| m.len())
                .unwrap_or(0);
            log::info!(
                "Successfully converted {chunk_count} chunks to {} ({})",
                output_path.to_string_lossy(),
                human_bytes::human_bytes(size as f64)
            );
        }
        Ok(Err(e)) => log::error!("Conversion failed with error: {e}"),
        Err(_) => log::error!("Failed to join conversion task!"),
    }

    pb.finish();

    log::info!("Done.");
}
