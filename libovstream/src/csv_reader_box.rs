use std::path::Path;

use super::codec::Encoder;
use super::config::Config;
use super::csv_handler::{CsvHandler, FileAccessMode, StimulationChunk};
use super::csv_header::StreamType;
use super::error::ConverterError;
use super::feature_vector::FeatureVectorEncoder;
use super::matrix::Matrix;
use super::signal::{Signal, SignalEncoder};
use super::spectrum::{Spectrum, SpectrumEncoder};
use super::stimulation::StimulationEncoder;
use super::stimulation_set::{Stimulation, StimulationSet};
use super::stream_file::StreamChunk;
use super::streamed_matrix::StreamedMatrixEncoder;
use super::time_arith::seconds_to_time;

/// Marker standing for a line break inside a CSV label
pub const NEW_LINE_MARKER: &str = "_newLine_";

fn restore_labels(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .map(|label| label.replace(NEW_LINE_MARKER, "\n"))
        .collect()
}

/// Encoder of the data stream of a CSV file, holding the matrix every buffer is copied into
#[derive(Debug)]
enum DataEncoder {
    StreamedMatrix(Encoder<StreamedMatrixEncoder>, Matrix),
    FeatureVector(Encoder<FeatureVectorEncoder>, Matrix),
    Signal(Encoder<SignalEncoder>, Signal),
    Spectrum(Encoder<SpectrumEncoder>, Spectrum),
}

impl DataEncoder {
    /// Build the encoder matching the header the handler has parsed. None for a file of
    /// stimulations only.
    fn from_handler(handler: &mut CsvHandler) -> Result<Option<Self>, ConverterError> {
        let encoder = match handler.format_type() {
            StreamType::Signal => {
                let (channels, sampling, samples_per_buffer) = handler.signal_information()?;
                let mut matrix = Matrix::with_dimensions(&[channels.len(), samples_per_buffer]);
                matrix.set_dimension_labels(0, &restore_labels(&channels))?;
                Self::Signal(Encoder::default(), Signal::new(matrix, sampling))
            }
            StreamType::Spectrum => {
                let (channels, abscissa, sampling) = handler.spectrum_information()?;
                let mut matrix = Matrix::with_dimensions(&[channels.len(), abscissa.len()]);
                matrix.set_dimension_labels(0, &restore_labels(&channels))?;
                Self::Spectrum(
                    Encoder::default(),
                    Spectrum::new(matrix, sampling, abscissa),
                )
            }
            StreamType::FeatureVector => {
                let labels = handler.feature_vector_information()?;
                let mut matrix = Matrix::with_dimensions(&[labels.len()]);
                matrix.set_dimension_labels(0, &restore_labels(&labels))?;
                Self::FeatureVector(Encoder::default(), matrix)
            }
            StreamType::StreamedMatrix | StreamType::CovarianceMatrix => {
                let (sizes, labels) = handler.streamed_matrix_information()?;
                let labels = restore_labels(&labels);
                let mut matrix = Matrix::with_dimensions(&sizes);
                let mut offset = 0;
                for (dimension, size) in sizes.iter().enumerate() {
                    matrix.set_dimension_labels(dimension, &labels[offset..offset + size])?;
                    offset += size;
                }
                Self::StreamedMatrix(Encoder::default(), matrix)
            }
            StreamType::Stimulations => return Ok(None),
            StreamType::Undefined => {
                return Err(ConverterError::UnsupportedStreamType(
                    StreamType::Undefined.to_string(),
                ))
            }
        };
        Ok(Some(encoder))
    }

    fn header(&mut self) -> Result<Vec<u8>, ConverterError> {
        Ok(match self {
            Self::StreamedMatrix(encoder, matrix) => encoder.encode_header(matrix)?,
            Self::FeatureVector(encoder, matrix) => encoder.encode_header(matrix)?,
            Self::Signal(encoder, signal) => encoder.encode_header(signal)?,
            Self::Spectrum(encoder, spectrum) => encoder.encode_header(spectrum)?,
        })
    }

    fn buffer(&mut self, values: &[f64]) -> Result<Vec<u8>, ConverterError> {
        Ok(match self {
            Self::StreamedMatrix(encoder, matrix) => {
                matrix.set_buffer(values)?;
                encoder.encode_buffer(matrix)?
            }
            Self::FeatureVector(encoder, matrix) => {
                matrix.set_buffer(values)?;
                encoder.encode_buffer(matrix)?
            }
            Self::Signal(encoder, signal) => {
                signal.matrix.set_buffer(values)?;
                encoder.encode_buffer(signal)?
            }
            Self::Spectrum(encoder, spectrum) => {
                spectrum.matrix.set_buffer(values)?;
                encoder.encode_buffer(spectrum)?
            }
        })
    }

    fn end(&mut self) -> Result<Vec<u8>, ConverterError> {
        Ok(match self {
            Self::StreamedMatrix(encoder, _) => encoder.encode_end()?,
            Self::FeatureVector(encoder, _) => encoder.encode_end()?,
            Self::Signal(encoder, _) => encoder.encode_end()?,
            Self::Spectrum(encoder, _) => encoder.encode_end()?,
        })
    }
}

fn to_stimulation(event: &StimulationChunk) -> Stimulation {
    Stimulation::new(
        event.identifier,
        seconds_to_time(event.date),
        seconds_to_time(event.duration),
    )
}

/// Take the pending events dated before `end` (seconds), or all of them when `end` is None
pub(crate) fn take_events(pending: &mut Vec<StimulationChunk>, end: Option<f64>) -> StimulationSet {
    let (taken, kept): (Vec<_>, Vec<_>) = pending
        .drain(..)
        .partition(|event| end.map_or(true, |end| event.date < end));
    *pending = kept;
    taken.iter().map(to_stimulation).collect()
}

/// Messages produced by one read of a CSV file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvReadStep {
    /// Messages of the data stream, empty for a file of stimulations only
    pub data: Vec<StreamChunk>,
    pub stimulations: Vec<StreamChunk>,
}

/// CsvStreamReader turns a CSV file into encoded streams.
///
/// Every file yields a stimulation stream, and a data stream unless it holds stimulations
/// only. The first step carries the headers; each following step carries the chunks of up to
/// `rows_per_read` reads, with one stimulation buffer per data buffer covering the same time
/// window. The step that reaches the end of the file also carries the end messages.
#[derive(Debug)]
pub struct CsvStreamReader {
    handler: CsvHandler,
    data: Option<DataEncoder>,
    stimulation: Encoder<StimulationEncoder>,
    rows_per_read: usize,
    pending_events: Vec<StimulationChunk>,
    event_count: u64,
    last_time: u64,
    header_sent: bool,
    ended: bool,
}

impl CsvStreamReader {
    pub fn open(path: &Path, config: &Config) -> Result<Self, ConverterError> {
        let mut handler = CsvHandler::with_config(config);
        handler.open_file(path, FileAccessMode::Read)?;
        handler.parse_header()?;
        let data = DataEncoder::from_handler(&mut handler)?;
        spdlog::info!("Reading {} CSV file {path:?}", handler.format_type());
        Ok(Self {
            handler,
            data,
            stimulation: Encoder::default(),
            rows_per_read: config.rows_per_read.max(1),
            pending_events: vec![],
            event_count: 0,
            last_time: 0,
            header_sent: false,
            ended: false,
        })
    }

    pub fn stream_type(&self) -> StreamType {
        self.handler.format_type()
    }

    /// Bytes of the CSV file consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.handler.bytes_read()
    }

    /// Number of events read from the file so far
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Get the next messages of the file
    ///
    /// Returns a `Result<Option<CsvReadStep>>`. The Option is None once the end messages have
    /// been handed out.
    pub fn next_step(&mut self) -> Result<Option<CsvReadStep>, ConverterError> {
        if self.ended {
            return Ok(None);
        }
        let mut step = CsvReadStep::default();
        if !self.header_sent {
            if let Some(data) = &mut self.data {
                step.data.push(StreamChunk::new(0, 0, data.header()?));
            }
            step.stimulations.push(StreamChunk::new(
                0,
                0,
                self.stimulation.encode_header(&StimulationSet::new())?,
            ));
            self.header_sent = true;
            return Ok(Some(step));
        }

        match &mut self.data {
            Some(data) => {
                let mut chunks = vec![];
                let mut events = vec![];
                self.handler
                    .read_samples_and_events(self.rows_per_read, &mut chunks, &mut events)?;
                self.event_count += events.len() as u64;
                self.pending_events.extend(events);
                for chunk in &chunks {
                    let start = seconds_to_time(chunk.start_time);
                    let end = seconds_to_time(chunk.end_time);
                    step.data
                        .push(StreamChunk::new(start, end, data.buffer(&chunk.matrix)?));
                    let set = take_events(&mut self.pending_events, Some(chunk.end_time));
                    step.stimulations.push(StreamChunk::new(
                        start,
                        end,
                        self.stimulation.encode_buffer(&set)?,
                    ));
                    self.last_time = end;
                }
            }
            None => {
                let mut events = vec![];
                self.handler.read_events(self.rows_per_read, &mut events)?;
                self.event_count += events.len() as u64;
                self.pending_events.extend(events);
            }
        }

        if !self.handler.has_data_to_read() {
            self.finish_stream(&mut step)?;
        } else if self.data.is_none() {
            self.flush_events(&mut step)?;
        }
        Ok(Some(step))
    }

    /// Send every pending event in one stimulation buffer ending at the last event date
    fn flush_events(&mut self, step: &mut CsvReadStep) -> Result<(), ConverterError> {
        if self.pending_events.is_empty() {
            return Ok(());
        }
        let start = self.last_time;
        let end = self
            .pending_events
            .iter()
            .map(|event| seconds_to_time(event.date))
            .fold(start, u64::max);
        let set = take_events(&mut self.pending_events, None);
        step.stimulations
            .push(StreamChunk::new(start, end, self.stimulation.encode_buffer(&set)?));
        self.last_time = end;
        Ok(())
    }

    fn finish_stream(&mut self, step: &mut CsvReadStep) -> Result<(), ConverterError> {
        self.flush_events(step)?;
        let end = self.last_time;
        if let Some(data) = &mut self.data {
            step.data.push(StreamChunk::new(end, end, data.end()?));
        }
        step.stimulations
            .push(StreamChunk::new(end, end, self.stimulation.encode_end()?));
        self.ended = true;
        spdlog::debug!("Reached the end of the CSV file after {} events", self.event_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Phase};
    use crate::signal::SignalDecoder;
    use crate::stimulation::StimulationDecoder;
    use crate::streamed_matrix::StreamedMatrixDecoder;

    #[test]
    fn test_signal_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.csv");
        std::fs::write(
            &path,
            "Time:4Hz,Epoch,A_newLine_1,B,Event Id,Event Date,Event Duration\n\
             0.0,0,1,2,,,\n0.25,0,3,4,7,0.25,0\n\
             0.5,1,5,6,,,\n0.75,1,7,8,,,\n",
        )
        .unwrap();
        let mut reader = CsvStreamReader::open(&path, &Config::default()).unwrap();
        assert_eq!(reader.stream_type(), StreamType::Signal);

        let mut signal = Decoder::new(SignalDecoder::default());
        let mut stimulations = Decoder::new(StimulationDecoder::default());
        let header = reader.next_step().unwrap().unwrap();
        assert_eq!(header.data.len(), 1);
        signal.decode(&header.data[0].content).unwrap();
        stimulations.decode(&header.stimulations[0].content).unwrap();
        assert_eq!(signal.output().sampling_rate, 4);
        assert_eq!(signal.output().matrix.dimension_sizes(), &[2, 2]);
        assert_eq!(signal.output().matrix.dimension_label(0, 0), Some("A\n1"));

        let step = reader.next_step().unwrap().unwrap();
        // Two buffers then the end message
        assert_eq!(step.data.len(), 3);
        assert_eq!(step.data[1].start_time, 1 << 31);
        assert_eq!(step.data[1].end_time, 1 << 32);
        signal.decode(&step.data[1].content).unwrap();
        assert_eq!(signal.output().matrix.buffer(), &[5.0, 7.0, 6.0, 8.0]);
        assert_eq!(
            signal.decode(&step.data[2].content).unwrap(),
            vec![Phase::End]
        );

        stimulations.decode(&step.stimulations[0].content).unwrap();
        assert_eq!(
            stimulations.output().get(0),
            Some(&Stimulation::new(7, 1 << 30, 0))
        );
        stimulations.decode(&step.stimulations[1].content).unwrap();
        assert!(stimulations.output().is_empty());
        assert_eq!(reader.event_count(), 1);
        assert!(reader.next_step().unwrap().is_none());
    }

    #[test]
    fn test_legacy_matrix_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.csv");
        std::fs::write(&path, "Time (s),L1:A,L1:B\n0,1,2\n1,3,4\n").unwrap();
        let config = Config {
            rows_per_read: 1,
            ..Default::default()
        };
        let mut reader = CsvStreamReader::open(&path, &config).unwrap();
        let mut matrix = Decoder::new(StreamedMatrixDecoder::default());
        matrix
            .decode(&reader.next_step().unwrap().unwrap().data[0].content)
            .unwrap();
        assert_eq!(matrix.output().dimension_sizes(), &[1, 2]);
        assert_eq!(matrix.output().dimension_label(1, 1), Some("B"));

        let first = reader.next_step().unwrap().unwrap();
        assert_eq!(first.data.len(), 1);
        let second = reader.next_step().unwrap().unwrap();
        assert_eq!(second.data.len(), 2);
        matrix.decode(&second.data[0].content).unwrap();
        assert_eq!(matrix.output().buffer(), &[3.0, 4.0]);
        assert_eq!(second.data[0].start_time, 1 << 32);
        assert_eq!(second.data[0].end_time, 2 << 32);
    }

    #[test]
    fn test_stimulation_file_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stimulations.csv");
        std::fs::write(
            &path,
            "Event Id,Event Date,Event Duration\n1,0.5,0\n2,1.5,0.5\n",
        )
        .unwrap();
        let mut reader = CsvStreamReader::open(&path, &Config::default()).unwrap();
        assert_eq!(reader.stream_type(), StreamType::Stimulations);
        let header = reader.next_step().unwrap().unwrap();
        assert!(header.data.is_empty());

        let step = reader.next_step().unwrap().unwrap();
        assert!(step.data.is_empty());
        let mut stimulations = Decoder::new(StimulationDecoder::default());
        stimulations.decode(&header.stimulations[0].content).unwrap();
        stimulations.decode(&step.stimulations[0].content).unwrap();
        assert_eq!(stimulations.output().len(), 2);
        assert_eq!(step.stimulations[0].end_time, 3 << 31);
        assert_eq!(
            stimulations.decode(&step.stimulations[1].content).unwrap(),
            vec![Phase::End]
        );
    }
}
