use super::acquisition::{AcquisitionEncoder, AcquisitionStreams};
use super::channel_localisation::{DynamicMatrix, DynamicMatrixEncoder};
use super::codec::{Encoder, StreamEncoder, StreamState};
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;
use super::experiment_info::{ExperimentInfo, ExperimentInfoEncoder};
use super::signal::{Signal, SignalEncoder};
use super::stimulation::StimulationEncoder;
use super::stimulation_set::StimulationSet;

/// Everything an acquisition stream is built from
#[derive(Debug, Clone, Default)]
pub struct AcquisitionInput {
    pub subject_id: u64,
    pub subject_age: u64,
    pub subject_gender: u64,
    pub signal: Signal,
    pub stimulations: StimulationSet,
    pub channel_localisation: DynamicMatrix,
    pub channel_units: DynamicMatrix,
    /// Duration of one buffer, fixed-point time
    pub buffer_duration: u64,
    /// Also send the channel localisation matrix with the next buffer
    pub encode_channel_localisation_data: bool,
    /// Also send the channel units matrix with the next buffer
    pub encode_channel_unit_data: bool,
}

impl AcquisitionInput {
    fn experiment_info(&self) -> ExperimentInfo {
        ExperimentInfo {
            subject_id: self.subject_id,
            subject_age: self.subject_age,
            subject_gender: self.subject_gender,
            ..Default::default()
        }
    }
}

/// Builds acquisition streams out of one encoder per sub-stream.
///
/// Each phase runs the same phase of every sub-encoder and relays their output into the
/// matching slot of the acquisition message. Localisation and units matrices change rarely,
/// so their buffers are only encoded when the input asks for it; their slot is empty
/// otherwise.
#[derive(Debug)]
pub struct MasterAcquisitionEncoder {
    experiment_info: Encoder<ExperimentInfoEncoder>,
    signal: Encoder<SignalEncoder>,
    stimulation: Encoder<StimulationEncoder>,
    channel_localisation: Encoder<DynamicMatrixEncoder>,
    channel_units: Encoder<DynamicMatrixEncoder>,
    acquisition: AcquisitionEncoder,
}

impl Default for MasterAcquisitionEncoder {
    fn default() -> Self {
        Self {
            experiment_info: Encoder::default(),
            signal: Encoder::default(),
            stimulation: Encoder::default(),
            channel_localisation: Encoder::new(DynamicMatrixEncoder::channel_localisation()),
            channel_units: Encoder::new(DynamicMatrixEncoder::channel_units()),
            acquisition: AcquisitionEncoder,
        }
    }
}

impl MasterAcquisitionEncoder {
    fn states(&self) -> [StreamState; 5] {
        [
            self.experiment_info.state(),
            self.signal.state(),
            self.stimulation.state(),
            self.channel_localisation.state(),
            self.channel_units.state(),
        ]
    }

    fn rewind(&mut self, states: [StreamState; 5]) {
        let [experiment_info, signal, stimulation, channel_localisation, channel_units] = states;
        self.experiment_info.rewind(experiment_info);
        self.signal.rewind(signal);
        self.stimulation.rewind(stimulation);
        self.channel_localisation.rewind(channel_localisation);
        self.channel_units.rewind(channel_units);
    }

    /// Run one phase over every sub-encoder. If any part fails, the sub-encoders go back to
    /// where they were so the whole message can be retried.
    fn all_or_nothing<F>(&mut self, phase: F) -> Result<(), CodecError>
    where
        F: FnOnce(&mut Self) -> Result<(), CodecError>,
    {
        let states = self.states();
        let result = phase(self);
        if result.is_err() {
            self.rewind(states);
        }
        result
    }

    fn header(
        &mut self,
        writer: &mut EbmlWriter,
        input: &AcquisitionInput,
    ) -> Result<(), CodecError> {
        let streams = AcquisitionStreams {
            buffer_duration: input.buffer_duration,
            channel_localisation: self
                .channel_localisation
                .encode_header(&input.channel_localisation)?,
            channel_units: self.channel_units.encode_header(&input.channel_units)?,
            stimulation: self.stimulation.encode_header(&input.stimulations)?,
            signal: self.signal.encode_header(&input.signal)?,
            experiment_info: self
                .experiment_info
                .encode_header(&input.experiment_info())?,
        };
        self.acquisition.write_header(writer, &streams)
    }

    fn buffer(
        &mut self,
        writer: &mut EbmlWriter,
        input: &AcquisitionInput,
    ) -> Result<(), CodecError> {
        let mut streams = AcquisitionStreams::default();
        if input.encode_channel_unit_data {
            streams.channel_units = self.channel_units.encode_buffer(&input.channel_units)?;
        }
        if input.encode_channel_localisation_data {
            streams.channel_localisation = self
                .channel_localisation
                .encode_buffer(&input.channel_localisation)?;
        }
        streams.stimulation = self.stimulation.encode_buffer(&input.stimulations)?;
        streams.signal = self.signal.encode_buffer(&input.signal)?;
        streams.experiment_info = self
            .experiment_info
            .encode_buffer(&input.experiment_info())?;
        self.acquisition.write_buffer(writer, &streams)
    }

    fn end(&mut self, writer: &mut EbmlWriter) -> Result<(), CodecError> {
        self.channel_units.encode_end()?;
        self.channel_localisation.encode_end()?;
        self.stimulation.encode_end()?;
        self.signal.encode_end()?;
        self.experiment_info.encode_end()?;
        self.acquisition.write_end(writer)
    }
}

impl StreamEncoder for MasterAcquisitionEncoder {
    type Input = AcquisitionInput;

    fn write_header(
        &mut self,
        writer: &mut EbmlWriter,
        input: &AcquisitionInput,
    ) -> Result<(), CodecError> {
        self.all_or_nothing(|encoder| encoder.header(writer, input))
    }

    fn write_buffer(
        &mut self,
        writer: &mut EbmlWriter,
        input: &AcquisitionInput,
    ) -> Result<(), CodecError> {
        self.all_or_nothing(|encoder| encoder.buffer(writer, input))
    }

    fn write_end(&mut self, writer: &mut EbmlWriter) -> Result<(), CodecError> {
        self.all_or_nothing(|encoder| encoder.end(writer))
    }
}
