use std::path::Path;
use std::sync::mpsc::Sender;

use super::acquisition::AcquisitionDecoder;
use super::channel_localisation::DynamicMatrix;
use super::codec::{Decoder, Encoder};
use super::config::{Config, Direction};
use super::csv_handler::{CsvHandler, FileAccessMode};
use super::csv_header::StreamType;
use super::csv_reader_box::{take_events, CsvStreamReader};
use super::csv_writer_box::CsvStreamWriter;
use super::error::{ConverterError, ProcessorError};
use super::master_acquisition::{AcquisitionInput, MasterAcquisitionEncoder};
use super::matrix::Matrix;
use super::signal::Signal;
use super::stream_file::{StreamChunk, StreamFileReader, StreamFileWriter};
use super::time_arith::{sample_count_to_time, seconds_to_time};
use super::worker_status::{BarColor, WorkerStatus};

/// Name recorded in the header of a stream file holding acquisition messages
pub const ACQUISITION_STREAM_TYPE: &str = "Acquisition";

/// Fraction of the input between two progress reports
const FLUSH_FRACTION: f32 = 0.01;

/// Sends a status every time another FLUSH_FRACTION of the input has been consumed
struct ProgressReporter<'a> {
    tx: &'a Sender<WorkerStatus>,
    color: BarColor,
    total: u64,
    last_progress: f32,
}

impl<'a> ProgressReporter<'a> {
    fn new(tx: &'a Sender<WorkerStatus>, color: BarColor, total: u64) -> Self {
        Self {
            tx,
            color,
            total,
            last_progress: 0.0,
        }
    }

    fn start(&self) -> Result<(), ProcessorError> {
        self.tx.send(WorkerStatus::new(0.0, 0, self.color))?;
        Ok(())
    }

    fn update(&mut self, consumed: u64, chunk_count: u64) -> Result<(), ProcessorError> {
        if self.total == 0 {
            return Ok(());
        }
        let progress = (consumed as f32 / self.total as f32).min(1.0);
        if progress - self.last_progress >= FLUSH_FRACTION {
            self.last_progress = progress;
            self.tx
                .send(WorkerStatus::new(progress, chunk_count, self.color))?;
        }
        Ok(())
    }

    fn finish(&self, chunk_count: u64) -> Result<(), ProcessorError> {
        self.tx
            .send(WorkerStatus::new(1.0, chunk_count, self.color))?;
        Ok(())
    }
}

fn file_size(path: &Path) -> Result<u64, ProcessorError> {
    Ok(std::fs::metadata(path)?.len())
}

/// Convert a CSV file into a data stream file, plus a stimulation stream file next to it
/// when the CSV file carries events
fn csv_to_stream(config: &Config, tx: &Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    let input_path = config.get_input_path()?;
    let output_path = config.get_output_path()?;
    let input_size = file_size(input_path)?;
    spdlog::info!(
        "Converting {input_path:?} ({}) to stream file {output_path:?}",
        human_bytes::human_bytes(input_size as f64)
    );

    let mut reader = CsvStreamReader::open(input_path, config)?;
    let stream_type = reader.stream_type();
    let mut data_file = StreamFileWriter::create(output_path, stream_type.as_str())?;
    let stimulation_path = Config::stimulation_path(output_path);
    // Headers are held back until an event shows up so that event-free files get no companion
    let mut stimulation_file: Option<StreamFileWriter> = None;
    let mut held_stimulations: Vec<StreamChunk> = vec![];

    let mut progress = ProgressReporter::new(tx, BarColor::CYAN, input_size);
    progress.start()?;
    while let Some(step) = reader.next_step()? {
        for chunk in &step.data {
            data_file.write_chunk(chunk)?;
        }
        if stream_type == StreamType::Stimulations {
            for chunk in &step.stimulations {
                data_file.write_chunk(chunk)?;
            }
        } else if let Some(file) = &mut stimulation_file {
            for chunk in &step.stimulations {
                file.write_chunk(chunk)?;
            }
        } else if reader.event_count() > 0 {
            let mut file = StreamFileWriter::create(
                &stimulation_path,
                StreamType::Stimulations.as_str(),
            )?;
            for chunk in held_stimulations.drain(..).chain(step.stimulations) {
                file.write_chunk(&chunk)?;
            }
            stimulation_file = Some(file);
        } else {
            held_stimulations.extend(step.stimulations);
        }
        progress.update(reader.bytes_read(), data_file.chunk_count())?;
    }

    let chunk_count = data_file.close()?;
    progress.finish(chunk_count)?;
    spdlog::info!(
        "Wrote {chunk_count} {stream_type} chunks ({}) to {output_path:?}",
        human_bytes::human_bytes(file_size(output_path)? as f64)
    );
    if let Some(file) = stimulation_file {
        let event_chunks = file.close()?;
        spdlog::info!(
            "Wrote {} events in {event_chunks} chunks to {stimulation_path:?}",
            reader.event_count()
        );
    }
    Ok(())
}

/// Wrap a signal CSV file and its events into one acquisition stream file
fn csv_to_acquisition(config: &Config, tx: &Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    let input_path = config.get_input_path()?;
    let output_path = config.get_output_path()?;
    let input_size = file_size(input_path)?;

    let mut handler = CsvHandler::with_config(config);
    handler
        .open_file(input_path, FileAccessMode::Read)
        .map_err(ConverterError::from)?;
    handler.parse_header().map_err(ConverterError::from)?;
    if handler.format_type() != StreamType::Signal {
        return Err(ConverterError::StreamTypeMismatch {
            expected: StreamType::Signal.to_string(),
            found: handler.format_type().to_string(),
        }
        .into());
    }
    let (channels, sampling, samples_per_buffer) =
        handler.signal_information().map_err(ConverterError::from)?;
    spdlog::info!(
        "Building acquisition stream of {} channels at {sampling} Hz from {input_path:?} ({})",
        channels.len(),
        human_bytes::human_bytes(input_size as f64)
    );

    let mut matrix = Matrix::with_dimensions(&[channels.len(), samples_per_buffer]);
    matrix
        .set_dimension_labels(0, &channels)
        .map_err(ConverterError::from)?;
    let mut input = AcquisitionInput {
        subject_id: config.subject_id,
        subject_age: config.subject_age,
        subject_gender: config.subject_gender,
        signal: Signal::new(matrix, sampling),
        channel_localisation: DynamicMatrix::channel_localisation(&channels)
            .map_err(ConverterError::from)?,
        channel_units: DynamicMatrix::channel_units(&channels).map_err(ConverterError::from)?,
        buffer_duration: sample_count_to_time(sampling, samples_per_buffer as u64),
        encode_channel_localisation_data: true,
        encode_channel_unit_data: true,
        ..Default::default()
    };

    let mut encoder = Encoder::new(MasterAcquisitionEncoder::default());
    let mut output = StreamFileWriter::create(output_path, ACQUISITION_STREAM_TYPE)?;
    output.write_chunk(&StreamChunk::new(0, 0, encoder.encode_header(&input)?))?;

    let mut progress = ProgressReporter::new(tx, BarColor::MAGENTA, input_size);
    progress.start()?;
    let mut chunks = vec![];
    let mut pending_events = vec![];
    let mut last_time = 0;
    while handler.has_data_to_read() {
        let rows = config.rows_per_read.max(1);
        handler
            .read_samples_and_events(rows, &mut chunks, &mut pending_events)
            .map_err(ConverterError::from)?;
        for chunk in &chunks {
            input
                .signal
                .matrix
                .set_buffer(&chunk.matrix)
                .map_err(ConverterError::from)?;
            input.stimulations = take_events(&mut pending_events, Some(chunk.end_time));
            let start = seconds_to_time(chunk.start_time);
            let end = seconds_to_time(chunk.end_time);
            output.write_chunk(&StreamChunk::new(start, end, encoder.encode_buffer(&input)?))?;
            // Localisation and units only travel with the first buffer
            input.encode_channel_localisation_data = false;
            input.encode_channel_unit_data = false;
            last_time = end;
        }
        progress.update(handler.bytes_read(), output.chunk_count())?;
    }
    if !pending_events.is_empty() {
        spdlog::warn!(
            "{} events are dated after the last signal buffer and were dropped",
            pending_events.len()
        );
    }
    output.write_chunk(&StreamChunk::new(last_time, last_time, encoder.encode_end()?))?;
    handler.close_file().map_err(ConverterError::from)?;

    let chunk_count = output.close()?;
    progress.finish(chunk_count)?;
    spdlog::info!(
        "Wrote {chunk_count} acquisition chunks ({}) to {output_path:?}",
        human_bytes::human_bytes(file_size(output_path)? as f64)
    );
    Ok(())
}

/// Next chunk of an optional stream file
fn next_or_none(
    reader: &mut Option<StreamFileReader>,
) -> Result<Option<StreamChunk>, ProcessorError> {
    match reader {
        Some(reader) => Ok(reader.next_chunk()?),
        None => Ok(None),
    }
}

/// Convert a stream file (and its stimulation companion, if any) into a CSV file
fn stream_to_csv(config: &Config, tx: &Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    let input_path = config.get_input_path()?;
    let output_path = config.get_output_path()?;
    let mut data_file = StreamFileReader::open(input_path)?;
    let declared = data_file.stream_type().to_string();
    let is_acquisition = declared == ACQUISITION_STREAM_TYPE;
    let stream_type = if is_acquisition {
        StreamType::Signal
    } else {
        StreamType::from_name(&declared)
            .ok_or_else(|| ConverterError::UnsupportedStreamType(declared.clone()))?
    };
    if config.stream_type != StreamType::Undefined && config.stream_type != stream_type {
        return Err(ConverterError::StreamTypeMismatch {
            expected: config.stream_type.to_string(),
            found: declared,
        }
        .into());
    }
    spdlog::info!(
        "Converting {declared} stream file {input_path:?} ({}) to {output_path:?}",
        human_bytes::human_bytes(file_size(input_path)? as f64)
    );

    let stimulation_path = Config::stimulation_path(input_path);
    let mut stimulation_file = if !is_acquisition
        && stream_type != StreamType::Stimulations
        && stimulation_path.exists()
    {
        spdlog::info!("Merging events from {stimulation_path:?}");
        Some(StreamFileReader::open(&stimulation_path)?)
    } else {
        None
    };

    let mut writer = CsvStreamWriter::create(output_path, stream_type, config)?;
    let mut acquisition = Decoder::new(AcquisitionDecoder::default());
    let mut progress = ProgressReporter::new(tx, BarColor::GREEN, 100);
    progress.start()?;

    let mut chunk_count = 0;
    let mut next_data = data_file.next_chunk()?;
    let mut next_stimulation = next_or_none(&mut stimulation_file)?;
    loop {
        // Chunks of both files are merged by start time, data first on ties
        let take_data = match (&next_data, &next_stimulation) {
            (Some(data), Some(stimulation)) => data.start_time <= stimulation.start_time,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if take_data {
            if let Some(chunk) = next_data.take() {
                if is_acquisition {
                    acquisition.decode(&chunk.content).map_err(ConverterError::from)?;
                    let streams = acquisition.output();
                    if !streams.signal.is_empty() {
                        let signal = StreamChunk::new(
                            chunk.start_time,
                            chunk.end_time,
                            streams.signal.clone(),
                        );
                        writer.write_data_chunk(&signal)?;
                    }
                    if !streams.stimulation.is_empty() {
                        let stimulation = StreamChunk::new(
                            chunk.start_time,
                            chunk.end_time,
                            streams.stimulation.clone(),
                        );
                        writer.write_stimulation_chunk(&stimulation)?;
                    }
                } else if stream_type == StreamType::Stimulations {
                    writer.write_stimulation_chunk(&chunk)?;
                } else {
                    writer.write_data_chunk(&chunk)?;
                }
            }
            next_data = data_file.next_chunk()?;
        } else {
            if let Some(chunk) = next_stimulation.take() {
                writer.write_stimulation_chunk(&chunk)?;
            }
            next_stimulation = next_or_none(&mut stimulation_file)?;
        }
        chunk_count += 1;
        progress.update((data_file.progress() * 100.0) as u64, chunk_count)?;
    }
    writer.finish()?;
    progress.finish(chunk_count)?;
    spdlog::info!(
        "Wrote {chunk_count} chunks as CSV ({}) to {output_path:?}",
        human_bytes::human_bytes(file_size(output_path)? as f64)
    );
    Ok(())
}

/// The main entry of a conversion, typically run on a separate thread.
///
/// This takes in a config (and progress monitor) and converts the input file in the
/// direction the config asks for.
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    match config.direction {
        Direction::CsvToStream => csv_to_stream(&config, &tx)?,
        Direction::CsvToAcquisition => csv_to_acquisition(&config, &tx)?,
        Direction::StreamToCsv => stream_to_csv(&config, &tx)?,
    }
    spdlog::info!("Conversion complete.");
    Ok(())
}
