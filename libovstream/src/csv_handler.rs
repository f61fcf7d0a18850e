use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use super::config::Config;
use super::constants::{
    DEFAULT_CSV_PRECISION, DEFAULT_CSV_SEPARATOR, DEFAULT_LEGACY_SAMPLES_PER_BUFFER,
};
use super::csv_header::{
    matrix_column_labels, split_columns, wrong_header, Dialect, HeaderClassifier, StreamType,
    DATA_SEPARATOR, DIMENSION_SEPARATOR, EVENT_DATE_COLUMN, EVENT_DURATION_COLUMN,
    EVENT_ID_COLUMN, POST_DATA_COLUMNS, PRE_DATA_COLUMNS,
};
use super::error::{CsvError, CsvErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccessMode {
    Write,
    Append,
    Read,
}

/// A block of values with its time window in seconds.
///
/// For signals a chunk read from a file holds a whole buffer (channel-major, one row per
/// channel); a chunk added for writing holds a single sample of every channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixChunk {
    pub start_time: f64,
    pub end_time: f64,
    pub matrix: Vec<f64>,
    pub epoch: u64,
}

impl MatrixChunk {
    pub fn new(start_time: f64, end_time: f64, matrix: Vec<f64>, epoch: u64) -> Self {
        Self {
            start_time,
            end_time,
            matrix,
            epoch,
        }
    }
}

/// A stimulation with its date and duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StimulationChunk {
    pub identifier: u64,
    pub date: f64,
    pub duration: f64,
}

impl StimulationChunk {
    pub fn new(identifier: u64, date: f64, duration: f64) -> Self {
        Self {
            identifier,
            date,
            duration,
        }
    }
}

#[derive(Debug, Default)]
enum CsvFile {
    #[default]
    Closed,
    Writer(BufWriter<File>),
    Reader(BufReader<File>),
}

/// Position inside a legacy file, whose rows carry less timing information than current ones
#[derive(Debug, Default)]
struct LegacyCursor {
    chunk_index: u64,
    previous_end: Option<f64>,
    previous_interval: f64,
}

fn parse_list<T: FromStr>(cell: &str) -> Option<Vec<T>> {
    if cell.trim().is_empty() {
        return Some(vec![]);
    }
    cell.split(DATA_SEPARATOR)
        .map(|part| part.trim().parse().ok())
        .collect()
}

/// Reader and writer of the CSV representation of streams.
///
/// Writing buffers samples and events until they can be laid out as rows: a row carries the
/// events that fall in its time window, so a row is only flushed once the events up to its
/// end are known (see `no_events_until_date`). Reading parses the header to find the stream
/// type, then hands out chunks and events row by row. Every failure is returned and also
/// kept as the last error of the handler.
#[derive(Debug)]
pub struct CsvHandler {
    file: CsvFile,
    separator: char,
    precision: usize,
    last_matrix_only: bool,
    legacy_samples_per_buffer: usize,

    stream_type: StreamType,
    dialect: Dialect,
    dimension_sizes: Vec<usize>,
    labels: Vec<String>,
    frequency_abscissa: Vec<f64>,
    sampling: u64,
    samples_per_buffer: usize,
    column_count: usize,

    info_set: bool,
    header_written: bool,
    header_read: bool,
    appending_to_existing: bool,
    has_data_to_read: bool,

    chunks: VecDeque<MatrixChunk>,
    stimulations: VecDeque<StimulationChunk>,
    no_event_since: f64,
    last_start_time: Option<f64>,

    pending_lines: VecDeque<String>,
    lines_consumed: usize,
    bytes_read: u64,
    legacy: LegacyCursor,

    last_error: CsvError,
}

impl Default for CsvHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvHandler {
    pub fn new() -> Self {
        Self {
            file: CsvFile::Closed,
            separator: DEFAULT_CSV_SEPARATOR,
            precision: DEFAULT_CSV_PRECISION,
            last_matrix_only: false,
            legacy_samples_per_buffer: DEFAULT_LEGACY_SAMPLES_PER_BUFFER,
            stream_type: StreamType::Undefined,
            dialect: Dialect::Current,
            dimension_sizes: vec![],
            labels: vec![],
            frequency_abscissa: vec![],
            sampling: 0,
            samples_per_buffer: 0,
            column_count: 0,
            info_set: false,
            header_written: false,
            header_read: false,
            appending_to_existing: false,
            has_data_to_read: false,
            chunks: VecDeque::new(),
            stimulations: VecDeque::new(),
            no_event_since: 0.0,
            last_start_time: None,
            pending_lines: VecDeque::new(),
            lines_consumed: 0,
            bytes_read: 0,
            legacy: LegacyCursor::default(),
            last_error: CsvError::new(CsvErrorCode::NoError, ""),
        }
    }

    /// Create a handler with the separator, precision and modes of the configuration
    pub fn with_config(config: &Config) -> Self {
        let mut handler = Self::new();
        handler.separator = config.separator;
        handler.precision = config.precision;
        handler.last_matrix_only = config.last_matrix_only;
        handler.legacy_samples_per_buffer = config.legacy_samples_per_buffer.max(1);
        handler
    }

    pub fn set_separator(&mut self, separator: char) {
        self.separator = separator;
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn set_output_float_precision(&mut self, precision: usize) {
        self.precision = precision;
    }

    pub fn set_last_matrix_only_mode(&mut self, last_matrix_only: bool) {
        self.last_matrix_only = last_matrix_only;
    }

    pub fn set_format_type(&mut self, stream_type: StreamType) {
        self.stream_type = stream_type;
    }

    pub fn format_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn has_data_to_read(&self) -> bool {
        self.has_data_to_read
    }

    /// Bytes pulled from the file being read, lookahead included
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn last_error(&self) -> CsvErrorCode {
        self.last_error.code
    }

    pub fn last_error_string(&self) -> &str {
        &self.last_error.detail
    }

    fn fail<T>(&mut self, code: CsvErrorCode, detail: impl Into<String>) -> Result<T, CsvError> {
        self.last_error = CsvError::new(code, detail);
        Err(self.last_error.clone())
    }

    fn remember(&mut self, error: CsvError) -> CsvError {
        self.last_error = error.clone();
        error
    }

    fn is_open(&self) -> bool {
        !matches!(self.file, CsvFile::Closed)
    }

    pub fn open_file(&mut self, path: &Path, mode: FileAccessMode) -> Result<(), CsvError> {
        if self.is_open() {
            return self.fail(
                CsvErrorCode::CantOpenFile,
                format!("Cannot open {path:?}: a file is already open"),
            );
        }
        let appending_to_existing = mode == FileAccessMode::Append
            && std::fs::metadata(path)
                .map(|meta| meta.len() > 0)
                .unwrap_or(false);
        let opened = match mode {
            FileAccessMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map(|file| CsvFile::Writer(BufWriter::new(file))),
            FileAccessMode::Append => OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map(|file| CsvFile::Writer(BufWriter::new(file))),
            FileAccessMode::Read => {
                File::open(path).map(|file| CsvFile::Reader(BufReader::new(file)))
            }
        };
        match opened {
            Ok(file) => self.file = file,
            Err(e) => {
                return self.fail(
                    CsvErrorCode::CantOpenFile,
                    format!("Error while opening file {path:?}: {e}"),
                )
            }
        }

        self.appending_to_existing = appending_to_existing;
        self.header_read = false;
        self.header_written = false;
        self.info_set = false;
        self.dialect = Dialect::Current;
        self.pending_lines.clear();
        self.lines_consumed = 0;
        self.bytes_read = 0;
        self.legacy = LegacyCursor::default();
        self.last_start_time = None;
        self.no_event_since = 0.0;
        self.has_data_to_read = mode == FileAccessMode::Read;
        Ok(())
    }

    /// Close the file. Samples and events still buffered are discarded; flush them with
    /// `write_all_data_to_file` first.
    pub fn close_file(&mut self) -> Result<(), CsvError> {
        self.stimulations.clear();
        self.chunks.clear();
        self.dimension_sizes.clear();
        self.labels.clear();
        self.frequency_abscissa.clear();
        self.column_count = 0;
        self.sampling = 0;
        self.samples_per_buffer = 0;
        self.header_written = false;
        self.info_set = false;
        self.has_data_to_read = false;
        self.pending_lines.clear();
        self.last_start_time = None;
        self.no_event_since = 0.0;

        if let CsvFile::Writer(mut writer) = std::mem::take(&mut self.file) {
            if let Err(e) = writer.flush() {
                return self.fail(
                    CsvErrorCode::ErrorWhileClosing,
                    format!("Error while closing the file: {e}"),
                );
            }
        }
        Ok(())
    }

    fn check_information_call(&mut self, expected: StreamType) -> Result<(), CsvError> {
        if self.stream_type != expected {
            return self.fail(
                CsvErrorCode::WrongInputType,
                format!(
                    "Cannot set {expected} information on a {} file",
                    self.stream_type
                ),
            );
        }
        if self.info_set {
            return self.fail(
                CsvErrorCode::SetInfoOnce,
                "Information can only be set once per file",
            );
        }
        self.info_set = true;
        Ok(())
    }

    fn check_information_type(&mut self, expected: &[StreamType]) -> Result<(), CsvError> {
        if expected.contains(&self.stream_type) {
            Ok(())
        } else {
            self.fail(
                CsvErrorCode::WrongInputType,
                format!("Information requested from a {} file", self.stream_type),
            )
        }
    }

    pub fn set_signal_information(
        &mut self,
        channel_names: &[String],
        sampling: u64,
        samples_per_buffer: usize,
    ) -> Result<(), CsvError> {
        self.check_information_call(StreamType::Signal)?;
        if channel_names.is_empty() {
            return self.fail(CsvErrorCode::NoChannelsName, "");
        }
        self.dimension_sizes = vec![channel_names.len()];
        self.labels = channel_names.to_vec();
        self.sampling = sampling;
        self.samples_per_buffer = samples_per_buffer;
        Ok(())
    }

    /// Channel names, sampling rate and samples per buffer of a signal file
    pub fn signal_information(&mut self) -> Result<(Vec<String>, u64, usize), CsvError> {
        self.check_information_type(&[StreamType::Signal])?;
        Ok((self.labels.clone(), self.sampling, self.samples_per_buffer))
    }

    pub fn set_spectrum_information(
        &mut self,
        channel_names: &[String],
        frequency_abscissa: &[f64],
        sampling: u64,
    ) -> Result<(), CsvError> {
        self.check_information_call(StreamType::Spectrum)?;
        if channel_names.is_empty() {
            return self.fail(CsvErrorCode::NoChannelsName, "");
        }
        if frequency_abscissa.is_empty() {
            return self.fail(
                CsvErrorCode::DimensionSizeZero,
                "A spectrum needs at least one frequency",
            );
        }
        self.dimension_sizes = vec![channel_names.len(), frequency_abscissa.len()];
        self.labels = channel_names.to_vec();
        self.frequency_abscissa = frequency_abscissa.to_vec();
        self.sampling = sampling;
        Ok(())
    }

    /// Channel names, frequency abscissa and original sampling of a spectrum file
    pub fn spectrum_information(&mut self) -> Result<(Vec<String>, Vec<f64>, u64), CsvError> {
        self.check_information_type(&[StreamType::Spectrum])?;
        Ok((
            self.labels.clone(),
            self.frequency_abscissa.clone(),
            self.sampling,
        ))
    }

    pub fn set_feature_vector_information(
        &mut self,
        channel_names: &[String],
    ) -> Result<(), CsvError> {
        self.check_information_call(StreamType::FeatureVector)?;
        if channel_names.is_empty() {
            return self.fail(CsvErrorCode::NoChannelsName, "");
        }
        self.dimension_sizes = vec![channel_names.len()];
        self.labels = channel_names.to_vec();
        Ok(())
    }

    pub fn feature_vector_information(&mut self) -> Result<Vec<String>, CsvError> {
        self.check_information_type(&[StreamType::FeatureVector])?;
        Ok(self.labels.clone())
    }

    /// Declare the shape of a streamed (or covariance) matrix. `labels` holds the labels of
    /// every dimension one after the other.
    pub fn set_streamed_matrix_information(
        &mut self,
        dimension_sizes: &[usize],
        labels: &[String],
    ) -> Result<(), CsvError> {
        let expected = match self.stream_type {
            StreamType::CovarianceMatrix => StreamType::CovarianceMatrix,
            _ => StreamType::StreamedMatrix,
        };
        self.check_information_call(expected)?;
        if dimension_sizes.is_empty() {
            return self.fail(CsvErrorCode::DimensionSizeEmpty, "");
        }
        if dimension_sizes.contains(&0) {
            return self.fail(CsvErrorCode::DimensionSizeZero, "");
        }
        let label_count: usize = dimension_sizes.iter().sum();
        if labels.len() != label_count {
            return self.fail(
                CsvErrorCode::WrongDimensionSize,
                format!(
                    "{} labels given for dimensions needing {label_count}",
                    labels.len()
                ),
            );
        }
        self.dimension_sizes = dimension_sizes.to_vec();
        self.labels = labels.to_vec();
        Ok(())
    }

    /// Dimension sizes and labels of a matrix file
    pub fn streamed_matrix_information(&mut self) -> Result<(Vec<usize>, Vec<String>), CsvError> {
        self.check_information_type(&[
            StreamType::StreamedMatrix,
            StreamType::CovarianceMatrix,
        ])?;
        Ok((self.dimension_sizes.clone(), self.labels.clone()))
    }

    /// Number of values a single row carries for the declared shape
    fn row_value_count(&self) -> usize {
        match self.stream_type {
            StreamType::Signal => self.labels.len(),
            StreamType::Spectrum => self.labels.len() * self.frequency_abscissa.len(),
            _ => self.dimension_sizes.iter().product(),
        }
    }

    fn header_string(&mut self) -> Result<String, CsvError> {
        let mut columns: Vec<String> = vec![];
        match self.stream_type {
            StreamType::Undefined => {
                return self.fail(
                    CsvErrorCode::WrongStreamType,
                    "Cannot write header for Undefined stream type",
                )
            }
            StreamType::Signal => {
                columns.push(format!("Time{DATA_SEPARATOR}{}Hz", self.sampling));
                columns.push("Epoch".to_string());
            }
            StreamType::Spectrum => {
                let (channels, frequencies) = (self.labels.len(), self.frequency_abscissa.len());
                let sampling = if self.sampling != 0 {
                    self.sampling
                } else {
                    (channels * frequencies) as u64
                };
                columns.push(format!(
                    "Time{DATA_SEPARATOR}{channels}{DIMENSION_SEPARATOR}{frequencies}{DATA_SEPARATOR}{sampling}"
                ));
                columns.push("End Time".to_string());
            }
            StreamType::StreamedMatrix
            | StreamType::CovarianceMatrix
            | StreamType::FeatureVector => {
                if self.dimension_sizes.is_empty() {
                    return self.fail(CsvErrorCode::DimensionCountZero, "");
                }
                let sizes: Vec<String> = self
                    .dimension_sizes
                    .iter()
                    .map(|size| size.to_string())
                    .collect();
                columns.push(format!(
                    "Time{DATA_SEPARATOR}{}",
                    sizes.join(&DIMENSION_SEPARATOR.to_string())
                ));
                columns.push("End Time".to_string());
            }
            StreamType::Stimulations => (),
        }

        if self.stream_type != StreamType::Stimulations && self.labels.is_empty() {
            return self.fail(CsvErrorCode::NoMatrixLabels, "");
        }
        match self.stream_type {
            StreamType::Signal | StreamType::FeatureVector => {
                columns.extend(self.labels.iter().cloned())
            }
            StreamType::StreamedMatrix | StreamType::CovarianceMatrix => {
                let cells = matrix_column_labels(&self.dimension_sizes, &self.labels);
                if cells.is_empty() {
                    return self.fail(CsvErrorCode::DimensionSizeZero, "");
                }
                columns.extend(cells);
            }
            StreamType::Spectrum => {
                for label in &self.labels {
                    for frequency in &self.frequency_abscissa {
                        columns.push(format!("{label}{DATA_SEPARATOR}{frequency:.6}"));
                    }
                }
            }
            _ => (),
        }
        columns.push(EVENT_ID_COLUMN.to_string());
        columns.push(EVENT_DATE_COLUMN.to_string());
        columns.push(EVENT_DURATION_COLUMN.to_string());

        self.column_count = columns.len();
        Ok(columns.join(&self.separator.to_string()) + "\n")
    }

    fn write_text(&mut self, text: &str) -> Result<(), CsvError> {
        let result = match &mut self.file {
            CsvFile::Writer(writer) => writer.write_all(text.as_bytes()),
            _ => return self.fail(CsvErrorCode::NoFileDefined, "File is not opened."),
        };
        if let Err(e) = result {
            return self.fail(
                CsvErrorCode::ErrorWhileWriting,
                format!("Error occurred while writing: {e}"),
            );
        }
        Ok(())
    }

    /// Write the header row. A second call on the same file does nothing; when appending to
    /// a file that already has content only the column layout is computed.
    pub fn write_header_to_file(&mut self) -> Result<(), CsvError> {
        if !matches!(self.file, CsvFile::Writer(_)) {
            return self.fail(CsvErrorCode::NoFileDefined, "File is not opened.");
        }
        if self.header_written {
            return Ok(());
        }
        let header = self.header_string()?;
        self.header_written = true;
        if self.appending_to_existing {
            return Ok(());
        }
        self.write_text(&header)
    }

    /// Write every row whose events are all known
    pub fn write_data_to_file(&mut self) -> Result<(), CsvError> {
        if !matches!(self.file, CsvFile::Writer(_)) {
            return self.fail(CsvErrorCode::NoFileDefined, "File is not opened.");
        }
        let csv = self.csv_string_from_data(false)?;
        self.write_text(&csv)
    }

    /// Write every buffered row and event, whatever the watermark
    pub fn write_all_data_to_file(&mut self) -> Result<(), CsvError> {
        let csv = self.csv_string_from_data(true)?;
        if csv.is_empty() {
            return Ok(());
        }
        self.write_text(&csv)
    }

    fn format_value(&self, value: f64) -> String {
        format!("{value:.*}", self.precision)
    }

    /// Event columns of a row: identifiers, dates and durations, each column holding every
    /// event of the row joined with the data separator
    fn event_columns(&self, events: &[StimulationChunk]) -> String {
        let separator = self.separator.to_string();
        if events.is_empty() {
            return separator.repeat(2);
        }
        let join = |values: Vec<String>| values.join(&DATA_SEPARATOR.to_string());
        [
            join(events.iter().map(|e| e.identifier.to_string()).collect()),
            join(events.iter().map(|e| self.format_value(e.date)).collect()),
            join(events.iter().map(|e| self.format_value(e.duration)).collect()),
        ]
        .join(&separator)
    }

    fn csv_string_from_data(&mut self, write_all: bool) -> Result<String, CsvError> {
        let mut csv = String::new();
        let separator = self.separator;

        if let Some(front) = self.chunks.front() {
            if self.column_count == 0 {
                self.column_count = front.matrix.len() + PRE_DATA_COLUMNS + POST_DATA_COLUMNS;
            }
            let mut lines_written = 0;
            while let Some(front) = self.chunks.front() {
                let (start, end, value_count) = (front.start_time, front.end_time, front.matrix.len());
                let flushable = write_all
                    || (self.stimulations.is_empty() && end <= self.no_event_since)
                    || self
                        .stimulations
                        .back()
                        .is_some_and(|last| start <= last.date);
                if !flushable {
                    break;
                }
                // Without a full flush a signal is written one buffer at a time
                if self.stream_type == StreamType::Signal
                    && !write_all
                    && self.samples_per_buffer > 0
                    && lines_written != 0
                    && lines_written % self.samples_per_buffer == 0
                {
                    break;
                }

                match self.stream_type {
                    StreamType::Signal | StreamType::Spectrum => {
                        if value_count + PRE_DATA_COLUMNS + POST_DATA_COLUMNS != self.column_count {
                            return self.fail(
                                CsvErrorCode::WrongLineSize,
                                format!(
                                    "Line size is {} but must be {}",
                                    value_count + PRE_DATA_COLUMNS + POST_DATA_COLUMNS,
                                    self.column_count
                                ),
                            );
                        }
                    }
                    StreamType::StreamedMatrix
                    | StreamType::CovarianceMatrix
                    | StreamType::FeatureVector => {
                        let expected = self.dimension_sizes.iter().product::<usize>()
                            + PRE_DATA_COLUMNS
                            + POST_DATA_COLUMNS;
                        if expected != self.column_count {
                            return self.fail(
                                CsvErrorCode::WrongLineSize,
                                format!(
                                    "Line size is {expected} but must be {}",
                                    self.column_count
                                ),
                            );
                        }
                    }
                    StreamType::Stimulations => {
                        return self.fail(
                            CsvErrorCode::WrongInputType,
                            "Samples were added to a Stimulations file",
                        )
                    }
                    StreamType::Undefined => {
                        return self.fail(
                            CsvErrorCode::WrongInputType,
                            "Stream type is undefined, samples cannot be written",
                        )
                    }
                }

                let Some(chunk) = self.chunks.pop_front() else {
                    break;
                };
                csv.push_str(&self.format_value(chunk.start_time));
                csv.push(separator);
                if self.stream_type == StreamType::Signal {
                    csv.push_str(&chunk.epoch.to_string());
                } else {
                    csv.push_str(&self.format_value(chunk.end_time));
                }
                for value in &chunk.matrix {
                    csv.push(separator);
                    csv.push_str(&self.format_value(*value));
                }
                csv.push(separator);

                let mut events = vec![];
                while let Some(event) = self.stimulations.front() {
                    if event.date - chunk.start_time >= chunk.end_time - chunk.start_time {
                        break;
                    }
                    events.extend(self.stimulations.pop_front());
                }
                csv.push_str(&self.event_columns(&events));
                csv.push('\n');
                lines_written += 1;
            }
        } else if self.stream_type == StreamType::Stimulations {
            while let Some(event) = self.stimulations.pop_front() {
                csv.push_str(&self.event_columns(&[event]));
                csv.push('\n');
            }
        }
        Ok(csv)
    }

    fn check_sample_time(
        &mut self,
        start: f64,
        end: f64,
        previous_start: Option<f64>,
    ) -> Result<(), CsvError> {
        if start.is_sign_negative()
            || end.is_sign_negative()
            || !start.is_finite()
            || !end.is_finite()
            || end < start
        {
            return self.fail(
                CsvErrorCode::WrongSampleDate,
                format!("Sample start time [{start}] | end time [{end}]"),
            );
        }
        if let Some(previous) = previous_start {
            if start < previous {
                return self.fail(
                    CsvErrorCode::WrongSampleDate,
                    format!("Sample start time {start} is before the previous start time {previous}"),
                );
            }
        }
        Ok(())
    }

    /// Queue one row of values
    pub fn add_sample(&mut self, sample: MatrixChunk) -> Result<(), CsvError> {
        if sample.matrix.is_empty() {
            return self.fail(CsvErrorCode::MatrixEmpty, "");
        }
        match self.stream_type {
            StreamType::Signal
            | StreamType::Spectrum
            | StreamType::StreamedMatrix
            | StreamType::CovarianceMatrix
            | StreamType::FeatureVector => {
                let expected = self.row_value_count();
                if sample.matrix.len() != expected {
                    return self.fail(
                        CsvErrorCode::WrongMatrixSize,
                        format!(
                            "Matrix size is {} and size to have is {expected}",
                            sample.matrix.len()
                        ),
                    );
                }
            }
            _ => {
                return self.fail(
                    CsvErrorCode::WrongStreamType,
                    format!("Cannot add Sample in {} file type", self.stream_type),
                )
            }
        }
        self.check_sample_time(sample.start_time, sample.end_time, self.last_start_time)?;

        if self.last_matrix_only
            && (self.stream_type != StreamType::Signal
                || self
                    .chunks
                    .back()
                    .is_some_and(|last| last.epoch != sample.epoch))
        {
            self.chunks.clear();
            let start = sample.start_time;
            self.stimulations.retain(|event| event.date >= start);
        }
        self.last_start_time = Some(sample.start_time);
        self.chunks.push_back(sample);
        Ok(())
    }

    /// Queue several rows of a signal at once
    pub fn add_buffer(&mut self, samples: Vec<MatrixChunk>) -> Result<(), CsvError> {
        if samples.is_empty() {
            return self.fail(CsvErrorCode::NoSample, "");
        }
        let channel_count = self.labels.len();
        let mut previous_start = self.last_start_time;
        for sample in &samples {
            if sample.matrix.is_empty() {
                return self.fail(CsvErrorCode::MatrixEmpty, "");
            }
            if sample.matrix.len() != channel_count {
                return self.fail(
                    CsvErrorCode::WrongMatrixSize,
                    format!(
                        "Matrix size is {} and size to have is {channel_count}",
                        sample.matrix.len()
                    ),
                );
            }
            self.check_sample_time(sample.start_time, sample.end_time, previous_start)?;
            previous_start = Some(sample.start_time);
        }
        self.last_start_time = previous_start;

        if !self.last_matrix_only {
            self.chunks.extend(samples);
            return Ok(());
        }
        let last_epoch = samples[samples.len() - 1].epoch;
        if self.stream_type == StreamType::Signal {
            let first_of_last = samples
                .iter()
                .position(|sample| sample.epoch == last_epoch)
                .unwrap_or(0);
            if self
                .chunks
                .front()
                .is_some_and(|front| front.epoch != last_epoch)
            {
                self.chunks.clear();
            }
            self.chunks.extend(samples.into_iter().skip(first_of_last));
        } else {
            self.chunks.clear();
            self.chunks.extend(samples.into_iter().last());
        }
        if let Some(current) = self.chunks.front().map(|front| front.start_time) {
            self.stimulations.retain(|event| event.date >= current);
        }
        Ok(())
    }

    pub fn add_event(&mut self, identifier: u64, date: f64, duration: f64) -> Result<(), CsvError> {
        if date.is_sign_negative() || date.is_nan() {
            return self.fail(
                CsvErrorCode::DateError,
                format!("Event date {date} is not valid"),
            );
        }
        if duration.is_sign_negative() || duration.is_nan() {
            return self.fail(
                CsvErrorCode::DurationError,
                format!("Event duration {duration} is not valid"),
            );
        }
        self.stimulations
            .push_back(StimulationChunk::new(identifier, date, duration));
        Ok(())
    }

    pub fn add_event_chunk(&mut self, event: StimulationChunk) -> Result<(), CsvError> {
        self.add_event(event.identifier, event.date, event.duration)
    }

    /// Promise that no event dated before `date` will be added anymore, so rows ending before
    /// it can be written. Infinity releases every row.
    pub fn no_events_until_date(&mut self, date: f64) -> Result<(), CsvError> {
        if date.is_sign_negative() || date.is_nan() {
            return self.fail(
                CsvErrorCode::WrongSampleDate,
                format!("Date is negative: {date}"),
            );
        }
        self.no_event_since = date;
        Ok(())
    }

    fn read_raw_line(&mut self) -> Result<Option<String>, CsvError> {
        let reader = match &mut self.file {
            CsvFile::Reader(reader) => reader,
            _ => return self.fail(CsvErrorCode::NoFileDefined, "File is not opened for reading"),
        };
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(count) => {
                self.bytes_read += count as u64;
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Ok(Some(line))
            }
            Err(e) => self.fail(
                CsvErrorCode::MissingData,
                format!("Error while reading the file: {e}"),
            ),
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, CsvError> {
        let line = match self.pending_lines.pop_front() {
            Some(line) => Some(line),
            None => self.read_raw_line()?,
        };
        if line.is_some() {
            self.lines_consumed += 1;
        }
        Ok(line)
    }

    /// Look at the line `index` rows ahead without consuming it
    fn peek_line(&mut self, index: usize) -> Result<Option<String>, CsvError> {
        while self.pending_lines.len() <= index {
            match self.read_raw_line()? {
                Some(line) => self.pending_lines.push_back(line),
                None => return Ok(None),
            }
        }
        Ok(self.pending_lines.get(index).cloned())
    }

    fn refresh_has_data(&mut self) -> Result<(), CsvError> {
        self.has_data_to_read = self.peek_line(0)?.is_some();
        Ok(())
    }

    fn parse_cell<T: FromStr>(&mut self, cell: &str, what: &str) -> Result<T, CsvError> {
        match cell.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => self.fail(
                CsvErrorCode::InvalidArgumentException,
                format!(
                    "Invalid value for the {what} ({cell:?}). Error on line {}",
                    self.lines_consumed
                ),
            ),
        }
    }

    fn check_line_size(&mut self, found: usize) -> Result<(), CsvError> {
        if found != self.column_count {
            return self.fail(
                CsvErrorCode::WrongLineSize,
                format!(
                    "There are {found} columns instead of {} on line {}",
                    self.column_count, self.lines_consumed
                ),
            );
        }
        Ok(())
    }

    /// Read the header row and deduce the stream type and shape of the file
    pub fn parse_header(&mut self) -> Result<(), CsvError> {
        if self.header_read {
            return Ok(());
        }
        let line = match self.next_line()? {
            Some(line) => line,
            None => {
                return self.fail(
                    CsvErrorCode::EmptyColumn,
                    "No header in the file or file empty",
                )
            }
        };
        let layout = match HeaderClassifier::new(self.separator).and_then(|c| c.parse(&line)) {
            Ok(layout) => layout,
            Err(e) => {
                self.stream_type = StreamType::Undefined;
                return Err(self.remember(e));
            }
        };
        self.stream_type = layout.stream_type;
        self.dialect = layout.dialect;
        self.column_count = layout.column_count;
        self.dimension_sizes = layout.dimension_sizes;
        self.labels = layout.labels;
        self.sampling = layout.sampling;
        self.frequency_abscissa = layout.frequency_abscissa;
        self.samples_per_buffer = 1;

        let completed = match (self.stream_type, self.dialect) {
            (StreamType::Signal, Dialect::Current) => self.count_samples_per_buffer(),
            (StreamType::Signal, Dialect::Legacy) => self.read_legacy_sampling(),
            (StreamType::Spectrum, Dialect::Legacy) => self.read_legacy_bands(),
            _ => Ok(()),
        };
        if let Err(e) = completed {
            self.stream_type = StreamType::Undefined;
            return Err(self.remember(e));
        }
        if self.dialect == Dialect::Legacy {
            spdlog::debug!(
                "Accepted a legacy {} CSV header with {} columns",
                self.stream_type,
                self.column_count
            );
        }
        self.header_read = true;
        self.refresh_has_data()
    }

    /// Rows of the first signal buffer all carry epoch 0
    fn count_samples_per_buffer(&mut self) -> Result<(), CsvError> {
        let mut count = 0;
        while let Some(line) = self.peek_line(count)? {
            let columns = split_columns(&line, self.separator);
            if columns.len() != self.column_count {
                return Err(wrong_header(
                    "File may be corrupt, can't find sample count per buffer",
                ));
            }
            if columns[1].trim() != "0" {
                break;
            }
            count += 1;
        }
        if count == 0 {
            return Err(wrong_header(
                "File contains no data to get sample count per buffer",
            ));
        }
        self.samples_per_buffer = count;
        Ok(())
    }

    /// A legacy signal writes its sampling rate in the last column of the first data row
    fn read_legacy_sampling(&mut self) -> Result<(), CsvError> {
        let line = self
            .peek_line(0)?
            .ok_or_else(|| wrong_header("Error reading sampling rate from file"))?;
        let columns = split_columns(&line, self.separator);
        let sampling: f64 = columns
            .get(self.column_count - 1)
            .and_then(|cell| cell.trim().parse().ok())
            .ok_or_else(|| wrong_header("Error reading sampling rate from the first data row"))?;
        if sampling <= 0.0 || sampling.fract() != 0.0 {
            return Err(wrong_header(format!(
                "Invalid sampling rate ({sampling}) in file"
            )));
        }
        self.sampling = sampling as u64;
        self.samples_per_buffer = self.legacy_samples_per_buffer;
        Ok(())
    }

    /// A legacy spectrum writes one row per frequency bin with the bounds of the bin; the
    /// rows sharing the first time form one spectrum.
    fn read_legacy_bands(&mut self) -> Result<(), CsvError> {
        let channel_count = self.labels.len();
        let mut bands: Vec<(f64, f64)> = vec![];
        let mut block_time: Option<String> = None;
        while let Some(line) = self.peek_line(bands.len())? {
            let columns = split_columns(&line, self.separator);
            if columns.len() != self.column_count {
                return Err(wrong_header(format!(
                    "Frequency band row has {} columns instead of {}",
                    columns.len(),
                    self.column_count
                )));
            }
            if block_time
                .get_or_insert_with(|| columns[0].to_string())
                .as_str()
                != columns[0]
            {
                break;
            }
            let bound = |cell: &str| {
                cell.trim()
                    .parse::<f64>()
                    .map_err(|_| wrong_header(format!("Invalid frequency band bound {cell:?}")))
            };
            bands.push((
                bound(columns[channel_count + 1])?,
                bound(columns[channel_count + 2])?,
            ));
        }
        if bands.is_empty() {
            return Err(wrong_header("File contains no frequency band"));
        }

        let bin_count = bands.len();
        self.frequency_abscissa = if bin_count > 1 {
            bands
                .iter()
                .enumerate()
                .map(|(k, (low, high))| low + k as f64 / (bin_count - 1) as f64 * (high - low))
                .collect()
        } else {
            vec![0.0]
        };
        let span = bands[bin_count - 1].0 - bands[0].0;
        self.sampling = if span > 0.0 {
            (bin_count as f64 / span) as u64
        } else {
            0
        };
        self.dimension_sizes = vec![channel_count, bin_count];
        self.samples_per_buffer = bin_count;
        Ok(())
    }

    /// Read up to `chunk_count` chunks, appending the events found on their rows to `events`.
    ///
    /// `chunks` is replaced by what was read; it is left empty at the end of the file. On
    /// failure neither output is modified beyond the clearing of `chunks`.
    pub fn read_samples_and_events(
        &mut self,
        chunk_count: usize,
        chunks: &mut Vec<MatrixChunk>,
        events: &mut Vec<StimulationChunk>,
    ) -> Result<(), CsvError> {
        if !self.header_read {
            return self.fail(
                CsvErrorCode::HeaderNotRead,
                "Trying to read data without having read a header",
            );
        }
        chunks.clear();
        if matches!(
            self.stream_type,
            StreamType::Stimulations | StreamType::Undefined
        ) {
            return self.fail(
                CsvErrorCode::WrongStreamType,
                format!("Cannot read samples from a {} file", self.stream_type),
            );
        }
        if !self.has_data_to_read {
            return Ok(());
        }

        let mut read_chunks = vec![];
        let mut read_events = vec![];
        while read_chunks.len() < chunk_count {
            let chunk = match (self.stream_type, self.dialect) {
                (_, Dialect::Current) => self.read_chunk(&mut read_events)?,
                (StreamType::Signal, Dialect::Legacy) => self.read_legacy_signal_chunk()?,
                (StreamType::Spectrum, Dialect::Legacy) => self.read_legacy_spectrum_chunk()?,
                (_, Dialect::Legacy) => self.read_legacy_matrix_chunk()?,
            };
            match chunk {
                Some(chunk) => read_chunks.push(chunk),
                None => break,
            }
        }
        self.refresh_has_data()?;
        chunks.extend(read_chunks);
        events.extend(read_events);
        Ok(())
    }

    fn read_chunk(
        &mut self,
        events: &mut Vec<StimulationChunk>,
    ) -> Result<Option<MatrixChunk>, CsvError> {
        let rows = self.samples_per_buffer;
        let value_count = self.column_count - PRE_DATA_COLUMNS - POST_DATA_COLUMNS;
        let mut chunk = MatrixChunk {
            matrix: vec![0.0; rows * value_count],
            ..Default::default()
        };

        for row in 0..rows {
            let line = match self.next_line()? {
                Some(line) => line,
                None if row == 0 => return Ok(None),
                None => return self.fail(CsvErrorCode::MissingData, "Chunk is not complete"),
            };
            let columns = split_columns(&line, self.separator);
            self.check_line_size(columns.len())?;

            if row == 0 {
                chunk.start_time = self.parse_cell(columns[0], "start time")?;
            }
            if self.stream_type == StreamType::Signal {
                chunk.epoch = self.parse_cell(columns[1], "epoch")?;
                chunk.end_time = if self.sampling > 0 {
                    chunk.start_time + rows as f64 / self.sampling as f64
                } else {
                    chunk.start_time
                };
            } else {
                chunk.epoch = u64::MAX;
                chunk.end_time = self.parse_cell(columns[1], "end time")?;
            }

            let data = &columns[PRE_DATA_COLUMNS..columns.len() - POST_DATA_COLUMNS];
            for (index, cell) in data.iter().enumerate() {
                chunk.matrix[index * rows + row] = self.parse_cell(cell, "matrix value")?;
            }
            self.parse_event_columns(&columns[columns.len() - POST_DATA_COLUMNS..], events)?;
        }
        Ok(Some(chunk))
    }

    fn parse_event_columns(
        &mut self,
        cells: &[&str],
        events: &mut Vec<StimulationChunk>,
    ) -> Result<(), CsvError> {
        let identifiers = parse_list::<u64>(cells[0]);
        let dates = parse_list::<f64>(cells[1]);
        let durations = parse_list::<f64>(cells[2]);
        let (Some(identifiers), Some(dates), Some(durations)) = (identifiers, dates, durations)
        else {
            return self.fail(
                CsvErrorCode::InvalidStimulationArgument,
                format!("Invalid stimulation on line {}", self.lines_consumed),
            );
        };
        if identifiers.len() != dates.len() || identifiers.len() != durations.len() {
            return self.fail(
                CsvErrorCode::StimulationSize,
                format!(
                    "There are {} identifiers, {} dates and {} durations on line {}",
                    identifiers.len(),
                    dates.len(),
                    durations.len(),
                    self.lines_consumed
                ),
            );
        }
        events.extend(
            identifiers
                .into_iter()
                .zip(dates)
                .zip(durations)
                .map(|((identifier, date), duration)| {
                    StimulationChunk::new(identifier, date, duration)
                }),
        );
        Ok(())
    }

    /// A legacy signal has no epoch column; rows are grouped in buffers of a fixed size and
    /// a short final buffer is padded with zeros.
    fn read_legacy_signal_chunk(&mut self) -> Result<Option<MatrixChunk>, CsvError> {
        let rows = self.samples_per_buffer;
        let channel_count = self.labels.len();
        let mut chunk = MatrixChunk {
            matrix: vec![0.0; rows * channel_count],
            epoch: self.legacy.chunk_index,
            ..Default::default()
        };
        for row in 0..rows {
            let line = match self.next_line()? {
                Some(line) => line,
                None if row == 0 => return Ok(None),
                None => break,
            };
            let columns = split_columns(&line, self.separator);
            self.check_line_size(columns.len())?;
            if row == 0 {
                chunk.start_time = self.parse_cell(columns[0], "time")?;
            }
            for (channel, cell) in columns[1..=channel_count].iter().enumerate() {
                chunk.matrix[channel * rows + row] = self.parse_cell(cell, "sample value")?;
            }
        }
        chunk.end_time = chunk.start_time + rows as f64 / self.sampling as f64;
        self.legacy.chunk_index += 1;
        Ok(Some(chunk))
    }

    /// One legacy spectrum spans one row per bin, all stamped with the spectrum end time
    fn read_legacy_spectrum_chunk(&mut self) -> Result<Option<MatrixChunk>, CsvError> {
        let bins = self.samples_per_buffer;
        let channel_count = self.labels.len();
        let mut chunk = MatrixChunk {
            matrix: vec![0.0; bins * channel_count],
            epoch: u64::MAX,
            ..Default::default()
        };
        for bin in 0..bins {
            let line = match self.next_line()? {
                Some(line) => line,
                None if bin == 0 => return Ok(None),
                None => return self.fail(CsvErrorCode::MissingData, "Spectrum is not complete"),
            };
            let columns = split_columns(&line, self.separator);
            self.check_line_size(columns.len())?;
            let time: f64 = self.parse_cell(columns[0], "time")?;
            if bin == 0 {
                chunk.end_time = time;
            } else if time != chunk.end_time {
                return self.fail(
                    CsvErrorCode::MissingData,
                    format!(
                        "Spectrum ending at {} has only {bin} of {bins} frequency rows",
                        chunk.end_time
                    ),
                );
            }
            for (channel, cell) in columns[1..=channel_count].iter().enumerate() {
                chunk.matrix[channel * bins + bin] = self.parse_cell(cell, "spectrum value")?;
            }
        }
        chunk.start_time = self.legacy.previous_end.unwrap_or(chunk.end_time);
        self.legacy.previous_end = Some(chunk.end_time);
        Ok(Some(chunk))
    }

    /// A legacy matrix row only has a start time; it ends where the next row starts
    fn read_legacy_matrix_chunk(&mut self) -> Result<Option<MatrixChunk>, CsvError> {
        let Some(line) = self.next_line()? else {
            return Ok(None);
        };
        let columns = split_columns(&line, self.separator);
        self.check_line_size(columns.len())?;
        let start_time: f64 = self.parse_cell(columns[0], "time")?;
        let mut matrix = Vec::with_capacity(columns.len() - 1);
        for cell in &columns[1..] {
            matrix.push(self.parse_cell(cell, "matrix value")?);
        }

        let end_time = match self.peek_line(0)? {
            Some(next) => {
                let next_columns = split_columns(&next, self.separator);
                self.parse_cell(next_columns[0], "time")?
            }
            None => start_time + self.legacy.previous_interval,
        };
        self.legacy.previous_interval = end_time - start_time;
        Ok(Some(MatrixChunk::new(start_time, end_time, matrix, u64::MAX)))
    }

    /// Read up to `event_count` events of a stimulation file into `events`
    pub fn read_events(
        &mut self,
        event_count: usize,
        events: &mut Vec<StimulationChunk>,
    ) -> Result<(), CsvError> {
        if !self.header_read {
            return self.fail(
                CsvErrorCode::HeaderNotRead,
                "Trying to read events without having read a header",
            );
        }
        events.clear();
        if self.dialect == Dialect::Legacy && self.stream_type != StreamType::Stimulations {
            return self.fail(
                CsvErrorCode::WrongStreamType,
                format!("Cannot read events alone from a legacy {} file", self.stream_type),
            );
        }

        let mut read = vec![];
        while read.len() < event_count {
            let Some(line) = self.next_line()? else {
                break;
            };
            let columns = split_columns(&line, self.separator);
            match self.dialect {
                Dialect::Current => {
                    if columns.len() < POST_DATA_COLUMNS {
                        return self.fail(
                            CsvErrorCode::StimulationSize,
                            format!("No event columns found on line {}", self.lines_consumed),
                        );
                    }
                    self.parse_event_columns(&columns[columns.len() - POST_DATA_COLUMNS..], &mut read)?;
                }
                Dialect::Legacy => {
                    if columns.len() != 3 {
                        return self.fail(
                            CsvErrorCode::StimulationSize,
                            format!(
                                "Invalid row length on line {}: must be 3 for stimulation date, identifier and duration",
                                self.lines_consumed
                            ),
                        );
                    }
                    let date: f64 = self.parse_cell(columns[0], "stimulation date")?;
                    let identifier: f64 = self.parse_cell(columns[1], "stimulation identifier")?;
                    let duration: f64 = self.parse_cell(columns[2], "stimulation duration")?;
                    read.push(StimulationChunk::new(identifier as u64, date, duration));
                }
            }
        }
        self.refresh_has_data()?;
        events.extend(read);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    fn open_reader(path: &Path) -> CsvHandler {
        let mut handler = CsvHandler::new();
        handler.open_file(path, FileAccessMode::Read).unwrap();
        handler.parse_header().unwrap();
        handler
    }

    #[test]
    fn test_signal_last_matrix_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.csv");
        let mut handler = CsvHandler::new();
        handler.set_last_matrix_only_mode(true);
        handler.open_file(&path, FileAccessMode::Write).unwrap();
        handler.set_format_type(StreamType::Signal);
        handler
            .set_signal_information(&names(&["O1", "O2", "Pz", "P1", "P2"]), 8, 8)
            .unwrap();

        let mut index = 0.0;
        while index < 1.2 {
            let epoch = (index / 0.5) as u64;
            handler
                .add_sample(MatrixChunk::new(
                    index,
                    index + 0.125,
                    vec![-10.10, -5.05, 0.00, 5.05, 10.10],
                    epoch,
                ))
                .unwrap();
            if index == 0.25 || index == 0.75 || index == 1.0 {
                handler.add_event(35000, index, 0.0).unwrap();
            }
            index += 0.125;
        }
        handler.write_header_to_file().unwrap();
        handler.write_all_data_to_file().unwrap();
        handler.close_file().unwrap();

        let expected = "Time:8Hz,Epoch,O1,O2,Pz,P1,P2,Event Id,Event Date,Event Duration\n\
            1.0000000000,2,-10.1000000000,-5.0500000000,0.0000000000,5.0500000000,10.1000000000,35000,1.0000000000,0.0000000000\n\
            1.1250000000,2,-10.1000000000,-5.0500000000,0.0000000000,5.0500000000,10.1000000000,,,\n";
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
    }

    #[test]
    fn test_matrix_last_matrix_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.csv");
        let mut handler = CsvHandler::new();
        handler.set_last_matrix_only_mode(true);
        handler.open_file(&path, FileAccessMode::Write).unwrap();
        handler.set_format_type(StreamType::StreamedMatrix);
        handler
            .set_streamed_matrix_information(&[2, 2, 2], &names(&["LA", "LB", "1", "2", "X", "Y"]))
            .unwrap();
        handler.write_header_to_file().unwrap();

        for i in 0..50 {
            let start = i as f64;
            let matrix = vec![start, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
            handler
                .add_sample(MatrixChunk::new(start, start + 1.0, matrix, 0))
                .unwrap();
            if i == 3 || i == 5 || i == 7 {
                handler.add_event(35000, start + 3.5, 0.0).unwrap();
            }
        }
        handler.write_all_data_to_file().unwrap();
        handler.close_file().unwrap();

        let expected = "Time:2x2x2,End Time,LA:1:X,LA:1:Y,LA:2:X,LA:2:Y,LB:1:X,LB:1:Y,LB:2:X,LB:2:Y,Event Id,Event Date,Event Duration\n\
            49.0000000000,50.0000000000,49.0000000000,1.0000000000,2.0000000000,3.0000000000,4.0000000000,5.0000000000,6.0000000000,7.0000000000,,,\n";
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
    }

    #[test]
    fn test_signal_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.csv");
        let channels = names(&["C1", "C2", "C3", "C4", "C5"]);

        let mut writer = CsvHandler::new();
        writer.open_file(&path, FileAccessMode::Write).unwrap();
        writer.set_format_type(StreamType::Signal);
        writer.set_signal_information(&channels, 8, 8).unwrap();
        writer.write_header_to_file().unwrap();
        for k in 0..3 {
            for s in 0..8 {
                let start = k as f64 + s as f64 * 0.125;
                let matrix = (0..5).map(|c| (k * 100 + s * 10 + c) as f64).collect();
                writer
                    .add_sample(MatrixChunk::new(start, start + 0.125, matrix, k as u64))
                    .unwrap();
            }
        }
        writer.add_event(33025, 0.25, 0.0).unwrap();
        writer.add_event(33026, 0.75, 0.0).unwrap();
        writer.write_all_data_to_file().unwrap();
        writer.close_file().unwrap();

        let mut reader = open_reader(&path);
        assert_eq!(reader.format_type(), StreamType::Signal);
        assert_eq!(reader.signal_information().unwrap(), (channels, 8, 8));

        let mut chunks = vec![];
        let mut events = vec![];
        reader
            .read_samples_and_events(10, &mut chunks, &mut events)
            .unwrap();
        assert_eq!(chunks.len(), 3);
        for (k, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start_time, k as f64);
            assert_eq!(chunk.end_time, k as f64 + 1.0);
            assert_eq!(chunk.epoch, k as u64);
            for c in 0..5 {
                for s in 0..8 {
                    assert_eq!(chunk.matrix[c * 8 + s], (k * 100 + s * 10 + c) as f64);
                }
            }
        }
        assert_eq!(
            events,
            vec![
                StimulationChunk::new(33025, 0.25, 0.0),
                StimulationChunk::new(33026, 0.75, 0.0)
            ]
        );
        assert!(!reader.has_data_to_read());

        // Reading past the end is not an error
        reader
            .read_samples_and_events(1, &mut chunks, &mut events)
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_rows_wait_for_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.csv");
        let mut handler = CsvHandler::new();
        handler.set_output_float_precision(1);
        handler.open_file(&path, FileAccessMode::Write).unwrap();
        handler.set_format_type(StreamType::FeatureVector);
        handler
            .set_feature_vector_information(&names(&["F1", "F2"]))
            .unwrap();
        handler.write_header_to_file().unwrap();
        handler
            .add_sample(MatrixChunk::new(0.0, 1.0, vec![1.0, 2.0], 0))
            .unwrap();
        handler
            .add_sample(MatrixChunk::new(1.0, 2.0, vec![3.0, 4.0], 0))
            .unwrap();

        // Nothing is known about events yet
        handler.write_data_to_file().unwrap();
        handler.no_events_until_date(1.0).unwrap();
        handler.write_data_to_file().unwrap();
        handler.add_event(7, 1.5, 0.0).unwrap();
        handler.write_data_to_file().unwrap();
        handler.close_file().unwrap();

        let expected = "Time:2,End Time,F1,F2,Event Id,Event Date,Event Duration\n\
            0.0,1.0,1.0,2.0,,,\n\
            1.0,2.0,3.0,4.0,7,1.5,0.0\n";
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
    }

    #[test]
    fn test_watermark_does_not_outlive_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        let mut handler = CsvHandler::new();
        handler.set_output_float_precision(1);
        handler.open_file(&first, FileAccessMode::Write).unwrap();
        handler.set_format_type(StreamType::FeatureVector);
        handler
            .set_feature_vector_information(&names(&["F1"]))
            .unwrap();
        handler.write_header_to_file().unwrap();
        handler.no_events_until_date(10.0).unwrap();
        handler.close_file().unwrap();

        handler.open_file(&second, FileAccessMode::Write).unwrap();
        handler
            .set_feature_vector_information(&names(&["F1"]))
            .unwrap();
        handler.write_header_to_file().unwrap();
        handler
            .add_sample(MatrixChunk::new(0.0, 1.0, vec![1.0], 0))
            .unwrap();
        // The new file has no watermark yet, so the row stays buffered
        handler.write_data_to_file().unwrap();
        handler.close_file().unwrap();

        assert_eq!(
            std::fs::read_to_string(&second).unwrap(),
            "Time:1,End Time,F1,Event Id,Event Date,Event Duration\n"
        );
    }

    #[test]
    fn test_spectrum_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum.csv");
        let mut writer = CsvHandler::new();
        writer.open_file(&path, FileAccessMode::Write).unwrap();
        writer.set_format_type(StreamType::Spectrum);
        writer
            .set_spectrum_information(&names(&["O1", "O2"]), &[0.0, 2.5, 5.0], 128)
            .unwrap();
        writer.write_header_to_file().unwrap();
        writer
            .add_sample(MatrixChunk::new(0.0, 0.5, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 0))
            .unwrap();
        writer
            .add_sample(MatrixChunk::new(0.5, 1.0, vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0], 0))
            .unwrap();
        writer.write_all_data_to_file().unwrap();
        writer.close_file().unwrap();

        let mut reader = open_reader(&path);
        assert_eq!(reader.format_type(), StreamType::Spectrum);
        assert_eq!(
            reader.spectrum_information().unwrap(),
            (names(&["O1", "O2"]), vec![0.0, 2.5, 5.0], 128)
        );
        let mut chunks = vec![];
        let mut events = vec![];
        reader
            .read_samples_and_events(5, &mut chunks, &mut events)
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                MatrixChunk::new(0.0, 0.5, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], u64::MAX),
                MatrixChunk::new(0.5, 1.0, vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0], u64::MAX),
            ]
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_stimulations_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stimulations.csv");
        let mut writer = CsvHandler::new();
        writer.set_output_float_precision(3);
        writer.open_file(&path, FileAccessMode::Write).unwrap();
        writer.set_format_type(StreamType::Stimulations);
        writer.write_header_to_file().unwrap();
        writer.add_event(35000, 1.0, 0.0).unwrap();
        writer.add_event(35001, 2.5, 0.5).unwrap();
        writer.write_all_data_to_file().unwrap();
        writer.close_file().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Event Id,Event Date,Event Duration\n35000,1.000,0.000\n35001,2.500,0.500\n"
        );

        let mut reader = open_reader(&path);
        assert_eq!(reader.format_type(), StreamType::Stimulations);
        let mut events = vec![];
        reader.read_events(1, &mut events).unwrap();
        assert_eq!(events, vec![StimulationChunk::new(35000, 1.0, 0.0)]);
        assert!(reader.has_data_to_read());
        reader.read_events(10, &mut events).unwrap();
        assert_eq!(events, vec![StimulationChunk::new(35001, 2.5, 0.5)]);
        assert!(!reader.has_data_to_read());
    }

    #[test]
    fn test_legacy_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy_matrix.csv");
        std::fs::write(&path, "Time (s),L1:A,L1:B,L1:C,L1:D\n0,1,2,3,4\n0.5,5,6,7,8\n").unwrap();

        let mut reader = open_reader(&path);
        assert_eq!(reader.format_type(), StreamType::StreamedMatrix);
        assert_eq!(reader.dialect(), Dialect::Legacy);
        assert_eq!(
            reader.streamed_matrix_information().unwrap(),
            (vec![1, 4], names(&["L1", "A", "B", "C", "D"]))
        );
        let mut chunks = vec![];
        let mut events = vec![];
        reader
            .read_samples_and_events(10, &mut chunks, &mut events)
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                MatrixChunk::new(0.0, 0.5, vec![1.0, 2.0, 3.0, 4.0], u64::MAX),
                MatrixChunk::new(0.5, 1.0, vec![5.0, 6.0, 7.0, 8.0], u64::MAX),
            ]
        );
    }

    #[test]
    fn test_legacy_spectrum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy_spectrum.csv");
        std::fs::write(
            &path,
            "Time (s),O1,O2,Min frequency band,Max frequency band\n\
             1,10,20,0,4\n1,11,21,4,8\n1,12,22,8,12\n\
             2,13,23,,\n2,14,24,,\n2,15,25,,\n",
        )
        .unwrap();

        let mut reader = open_reader(&path);
        assert_eq!(reader.format_type(), StreamType::Spectrum);
        let (channels, abscissa, sampling) = reader.spectrum_information().unwrap();
        assert_eq!(channels, names(&["O1", "O2"]));
        assert_eq!(abscissa, vec![0.0, 6.0, 12.0]);
        assert_eq!(sampling, 0);

        let mut chunks = vec![];
        let mut events = vec![];
        reader
            .read_samples_and_events(10, &mut chunks, &mut events)
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                MatrixChunk::new(1.0, 1.0, vec![10.0, 11.0, 12.0, 20.0, 21.0, 22.0], u64::MAX),
                MatrixChunk::new(1.0, 2.0, vec![13.0, 14.0, 15.0, 23.0, 24.0, 25.0], u64::MAX),
            ]
        );
    }

    #[test]
    fn test_legacy_signal_and_stimulations() {
        let dir = tempfile::tempdir().unwrap();
        let signal = dir.path().join("legacy_signal.csv");
        std::fs::write(
            &signal,
            "Time (s),C1,C2,Sampling Rate\n0,1,2,4\n0.25,3,4,\n0.5,5,6,\n",
        )
        .unwrap();
        let config = Config {
            legacy_samples_per_buffer: 2,
            ..Default::default()
        };
        let mut reader = CsvHandler::with_config(&config);
        reader.open_file(&signal, FileAccessMode::Read).unwrap();
        reader.parse_header().unwrap();
        assert_eq!(
            reader.signal_information().unwrap(),
            (names(&["C1", "C2"]), 4, 2)
        );
        let mut chunks = vec![];
        let mut events = vec![];
        reader
            .read_samples_and_events(10, &mut chunks, &mut events)
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                MatrixChunk::new(0.0, 0.5, vec![1.0, 3.0, 2.0, 4.0], 0),
                MatrixChunk::new(0.5, 1.0, vec![5.0, 0.0, 6.0, 0.0], 1),
            ]
        );

        let stimulations = dir.path().join("legacy_stimulations.csv");
        std::fs::write(
            &stimulations,
            "Time (s),Identifier,Duration\n0.5,33025,0\n1.5,33026,0.25\n",
        )
        .unwrap();
        let mut reader = open_reader(&stimulations);
        assert_eq!(reader.format_type(), StreamType::Stimulations);
        reader.read_events(10, &mut events).unwrap();
        assert_eq!(
            events,
            vec![
                StimulationChunk::new(33025, 0.5, 0.0),
                StimulationChunk::new(33026, 1.5, 0.25)
            ]
        );
    }

    #[test]
    fn test_bad_row_leaves_outputs_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.csv");
        std::fs::write(
            &path,
            "Time:3,End Time,F1,F2,F3,Event Id,Event Date,Event Duration\n\
             0.0,1.0,1,2,3,5,0.5,0\n\
             1.0,2.0,1,2,,,\n",
        )
        .unwrap();
        let mut reader = open_reader(&path);
        assert_eq!(reader.format_type(), StreamType::FeatureVector);
        let mut chunks = vec![MatrixChunk::default()];
        let mut events = vec![];
        match reader.read_samples_and_events(5, &mut chunks, &mut events) {
            Err(e) => assert_eq!(e.code, CsvErrorCode::WrongLineSize),
            Ok(_) => panic!("A short row must be rejected"),
        }
        assert!(chunks.is_empty());
        assert!(events.is_empty());
        assert_eq!(reader.last_error(), CsvErrorCode::WrongLineSize);
    }

    #[test]
    fn test_unknown_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unknown.csv");
        std::fs::write(&path, "Foo,Bar\n1,2\n").unwrap();
        let mut reader = CsvHandler::new();
        reader.open_file(&path, FileAccessMode::Read).unwrap();
        assert_eq!(
            reader.parse_header().map_err(|e| e.code),
            Err(CsvErrorCode::WrongHeader)
        );
        assert_eq!(reader.format_type(), StreamType::Undefined);

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        let mut reader = CsvHandler::new();
        reader.open_file(&empty, FileAccessMode::Read).unwrap();
        assert_eq!(
            reader.parse_header().map_err(|e| e.code),
            Err(CsvErrorCode::EmptyColumn)
        );
    }

    #[test]
    fn test_writer_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.csv");
        let mut handler = CsvHandler::new();
        handler.set_format_type(StreamType::Signal);
        assert_eq!(
            handler.write_header_to_file().map_err(|e| e.code),
            Err(CsvErrorCode::NoFileDefined)
        );
        assert_eq!(handler.last_error(), CsvErrorCode::NoFileDefined);
        assert_eq!(handler.last_error_string(), "File is not opened.");

        handler.open_file(&path, FileAccessMode::Write).unwrap();
        assert_eq!(
            handler.open_file(&path, FileAccessMode::Write).map_err(|e| e.code),
            Err(CsvErrorCode::CantOpenFile)
        );
        assert_eq!(
            handler
                .set_spectrum_information(&names(&["A"]), &[1.0], 8)
                .map_err(|e| e.code),
            Err(CsvErrorCode::WrongInputType)
        );
        handler
            .set_signal_information(&names(&["A", "B"]), 8, 4)
            .unwrap();
        assert_eq!(
            handler
                .set_signal_information(&names(&["A", "B"]), 8, 4)
                .map_err(|e| e.code),
            Err(CsvErrorCode::SetInfoOnce)
        );
        assert_eq!(
            handler
                .add_sample(MatrixChunk::new(0.0, 0.1, vec![], 0))
                .map_err(|e| e.code),
            Err(CsvErrorCode::MatrixEmpty)
        );
        assert_eq!(
            handler
                .add_sample(MatrixChunk::new(0.0, 0.1, vec![1.0], 0))
                .map_err(|e| e.code),
            Err(CsvErrorCode::WrongMatrixSize)
        );
        for (start, end) in [(1.0, 0.0), (-1.0, 0.0), (-1.0, -0.5), (1.0, -1.0)] {
            assert_eq!(
                handler
                    .add_sample(MatrixChunk::new(start, end, vec![1.0, 2.0], 0))
                    .map_err(|e| e.code),
                Err(CsvErrorCode::WrongSampleDate)
            );
        }
        handler
            .add_sample(MatrixChunk::new(1.0, 1.125, vec![1.0, 2.0], 0))
            .unwrap();
        assert_eq!(
            handler
                .add_sample(MatrixChunk::new(0.5, 0.625, vec![1.0, 2.0], 0))
                .map_err(|e| e.code),
            Err(CsvErrorCode::WrongSampleDate)
        );
        assert_eq!(
            handler.add_buffer(vec![]).map_err(|e| e.code),
            Err(CsvErrorCode::NoSample)
        );
        assert_eq!(
            handler.add_event(1, -1.0, 0.0).map_err(|e| e.code),
            Err(CsvErrorCode::DateError)
        );
        assert_eq!(
            handler.add_event(1, 1.0, -1.0).map_err(|e| e.code),
            Err(CsvErrorCode::DurationError)
        );
        assert_eq!(
            handler.no_events_until_date(-2.0).map_err(|e| e.code),
            Err(CsvErrorCode::WrongSampleDate)
        );
        handler.close_file().unwrap();
    }

    #[test]
    fn test_append_keeps_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.csv");
        for start in [0.0, 1.0] {
            let mut handler = CsvHandler::new();
            handler.set_output_float_precision(1);
            handler.open_file(&path, FileAccessMode::Append).unwrap();
            handler.set_format_type(StreamType::FeatureVector);
            handler
                .set_feature_vector_information(&names(&["F"]))
                .unwrap();
            handler.write_header_to_file().unwrap();
            // A second header request is a no-op
            handler.write_header_to_file().unwrap();
            handler
                .add_sample(MatrixChunk::new(start, start + 1.0, vec![start], 0))
                .unwrap();
            handler.write_all_data_to_file().unwrap();
            handler.close_file().unwrap();
        }
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Time:1,End Time,F,Event Id,Event Date,Event Duration\n\
             0.0,1.0,0.0,,,\n\
             1.0,2.0,1.0,,,\n"
        );
    }
}
