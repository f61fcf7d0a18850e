use ndarray::Axis;
use regex::Regex;
use std::path::Path;

use super::codec::{Decoder, Phase};
use super::config::Config;
use super::csv_handler::{CsvHandler, FileAccessMode, MatrixChunk};
use super::csv_header::StreamType;
use super::error::{ConverterError, CsvError, CsvErrorCode};
use super::feature_vector::FeatureVectorDecoder;
use super::matrix::Matrix;
use super::signal::SignalDecoder;
use super::spectrum::SpectrumDecoder;
use super::stimulation::StimulationDecoder;
use super::stream_file::StreamChunk;
use super::streamed_matrix::StreamedMatrixDecoder;
use super::time_arith::{sample_count_to_time, time_to_seconds};

/// Decoder of the data stream written to a CSV file
#[derive(Debug)]
enum DataDecoder {
    StreamedMatrix(Decoder<StreamedMatrixDecoder>),
    FeatureVector(Decoder<FeatureVectorDecoder>),
    Signal(Decoder<SignalDecoder>),
    Spectrum(Decoder<SpectrumDecoder>),
}

impl DataDecoder {
    fn for_type(stream_type: StreamType) -> Option<Self> {
        match stream_type {
            StreamType::StreamedMatrix | StreamType::CovarianceMatrix => {
                Some(Self::StreamedMatrix(Decoder::default()))
            }
            StreamType::FeatureVector => Some(Self::FeatureVector(Decoder::default())),
            StreamType::Signal => Some(Self::Signal(Decoder::default())),
            StreamType::Spectrum => Some(Self::Spectrum(Decoder::default())),
            StreamType::Stimulations | StreamType::Undefined => None,
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<Phase>, ConverterError> {
        Ok(match self {
            Self::StreamedMatrix(decoder) => decoder.decode(bytes)?,
            Self::FeatureVector(decoder) => decoder.decode(bytes)?,
            Self::Signal(decoder) => decoder.decode(bytes)?,
            Self::Spectrum(decoder) => decoder.decode(bytes)?,
        })
    }
}

/// CsvStreamWriter turns encoded streams back into a CSV file.
///
/// Data chunks and stimulation chunks must be handed over in start time order. Rows stay
/// buffered until the stimulation stream has covered their time window, so that their
/// events can be written on the same line.
#[derive(Debug)]
pub struct CsvStreamWriter {
    handler: CsvHandler,
    stream_type: StreamType,
    data: Option<DataDecoder>,
    stimulation: Decoder<StimulationDecoder>,
    chunk_index: u64,
    last_matrix_only: bool,
    new_line: Regex,
}

impl CsvStreamWriter {
    /// Open the CSV file for a stream of the given type, appending when the config asks for it
    pub fn create(
        path: &Path,
        stream_type: StreamType,
        config: &Config,
    ) -> Result<Self, ConverterError> {
        if stream_type == StreamType::Undefined {
            return Err(ConverterError::UnsupportedStreamType(
                stream_type.to_string(),
            ));
        }
        let mut handler = CsvHandler::with_config(config);
        handler.set_format_type(stream_type);
        let mode = if config.append {
            FileAccessMode::Append
        } else {
            FileAccessMode::Write
        };
        handler.open_file(path, mode)?;
        let new_line = Regex::new(r"\r*\n")
            .map_err(|e| CsvError::new(CsvErrorCode::WrongParameters, e.to_string()))?;
        Ok(Self {
            handler,
            stream_type,
            data: DataDecoder::for_type(stream_type),
            stimulation: Decoder::default(),
            chunk_index: 0,
            last_matrix_only: config.last_matrix_only,
            new_line,
        })
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn escape_labels(&self, labels: &[String]) -> Vec<String> {
        labels
            .iter()
            .map(|label| {
                self.new_line
                    .replace_all(label, super::csv_reader_box::NEW_LINE_MARKER)
                    .into_owned()
            })
            .collect()
    }

    fn all_labels(&self, matrix: &Matrix) -> Vec<String> {
        let labels: Vec<String> = (0..matrix.dimension_count())
            .filter_map(|dimension| matrix.dimension_labels(dimension))
            .flatten()
            .cloned()
            .collect();
        self.escape_labels(&labels)
    }

    /// Declare the shape of the data stream from its decoded header and write the CSV header
    fn declare_header(&mut self) -> Result<(), ConverterError> {
        let Some(data) = &self.data else {
            return Ok(());
        };
        match data {
            DataDecoder::StreamedMatrix(decoder) => {
                let matrix = decoder.output();
                let labels = self.all_labels(matrix);
                let sizes = matrix.dimension_sizes().to_vec();
                self.handler.set_streamed_matrix_information(&sizes, &labels)?;
            }
            DataDecoder::FeatureVector(decoder) => {
                let labels = self.all_labels(decoder.output());
                self.handler.set_feature_vector_information(&labels)?;
            }
            DataDecoder::Signal(decoder) => {
                let signal = decoder.output();
                if signal.matrix.dimension_count() != 2 {
                    return Err(ConverterError::SignalShape(signal.matrix.dimension_count()));
                }
                let channels =
                    self.escape_labels(signal.matrix.dimension_labels(0).unwrap_or_default());
                let (sampling, samples) = (signal.sampling_rate, signal.samples_per_chunk());
                self.handler
                    .set_signal_information(&channels, sampling, samples)?;
            }
            DataDecoder::Spectrum(decoder) => {
                let spectrum = decoder.output();
                let channels =
                    self.escape_labels(spectrum.matrix.dimension_labels(0).unwrap_or_default());
                let abscissa = spectrum.frequency_abscissa.clone();
                let sampling = spectrum.sampling_rate;
                self.handler
                    .set_spectrum_information(&channels, &abscissa, sampling)?;
            }
        }
        self.handler.write_header_to_file()?;
        Ok(())
    }

    /// Queue the rows of the last decoded buffer
    fn queue_buffer(&mut self, chunk: &StreamChunk) -> Result<(), ConverterError> {
        let Some(data) = &self.data else {
            return Ok(());
        };
        let start = time_to_seconds(chunk.start_time);
        let end = time_to_seconds(chunk.end_time);
        match data {
            DataDecoder::Signal(decoder) => {
                let signal = decoder.output();
                let samples = signal.matrix.as_array()?;
                if samples.ndim() != 2 {
                    return Err(ConverterError::SignalShape(samples.ndim()));
                }
                let rows: Vec<MatrixChunk> = samples
                    .axis_iter(Axis(1))
                    .enumerate()
                    .map(|(index, values)| {
                        let index = index as u64;
                        let row_start = chunk.start_time
                            + sample_count_to_time(signal.sampling_rate, index);
                        let row_end = chunk.start_time
                            + sample_count_to_time(signal.sampling_rate, index + 1);
                        MatrixChunk::new(
                            time_to_seconds(row_start),
                            time_to_seconds(row_end),
                            values.iter().copied().collect(),
                            self.chunk_index,
                        )
                    })
                    .collect();
                self.handler.add_buffer(rows)?;
            }
            DataDecoder::Spectrum(decoder) => {
                let values = decoder.output().matrix.buffer().to_vec();
                self.handler
                    .add_sample(MatrixChunk::new(start, end, values, u64::MAX))?;
            }
            DataDecoder::StreamedMatrix(decoder) => {
                let values = decoder.output().buffer().to_vec();
                self.handler
                    .add_sample(MatrixChunk::new(start, end, values, u64::MAX))?;
            }
            DataDecoder::FeatureVector(decoder) => {
                let values = decoder.output().buffer().to_vec();
                self.handler
                    .add_sample(MatrixChunk::new(start, end, values, u64::MAX))?;
            }
        }
        self.chunk_index += 1;
        Ok(())
    }

    /// Hand over one message of the data stream
    pub fn write_data_chunk(&mut self, chunk: &StreamChunk) -> Result<(), ConverterError> {
        let phases = match &mut self.data {
            Some(data) => data.decode(&chunk.content)?,
            None => {
                return Err(ConverterError::UnsupportedStreamType(
                    self.stream_type.to_string(),
                ))
            }
        };
        for phase in phases {
            match phase {
                Phase::Header => self.declare_header()?,
                Phase::Buffer => {
                    self.queue_buffer(chunk)?;
                    self.write_resolved_rows()?;
                }
                Phase::End => {
                    spdlog::debug!("Data stream ended after {} buffers", self.chunk_index)
                }
            }
        }
        Ok(())
    }

    /// Hand over one message of the stimulation stream
    pub fn write_stimulation_chunk(&mut self, chunk: &StreamChunk) -> Result<(), ConverterError> {
        for phase in self.stimulation.decode(&chunk.content)? {
            match phase {
                Phase::Header if self.stream_type == StreamType::Stimulations => {
                    self.handler.write_header_to_file()?
                }
                Phase::Header | Phase::End => (),
                Phase::Buffer => {
                    for stimulation in self.stimulation.output() {
                        self.handler.add_event(
                            stimulation.identifier,
                            time_to_seconds(stimulation.date),
                            time_to_seconds(stimulation.duration),
                        )?;
                    }
                    self.handler
                        .no_events_until_date(time_to_seconds(chunk.end_time))?;
                    self.write_resolved_rows()?;
                }
            }
        }
        Ok(())
    }

    /// Write the rows no future event can change. With only the last matrix kept, nothing
    /// is written before `finish`.
    fn write_resolved_rows(&mut self) -> Result<(), ConverterError> {
        if !self.last_matrix_only {
            self.handler.write_data_to_file()?;
        }
        Ok(())
    }

    /// Write everything still buffered and close the file
    pub fn finish(mut self) -> Result<(), ConverterError> {
        self.handler.no_events_until_date(f64::INFINITY)?;
        self.handler.write_all_data_to_file()?;
        self.handler.close_file()?;
        Ok(())
    }
}
