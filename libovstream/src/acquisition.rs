use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::decode_uint;
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;

/// The five encoded sub-streams of an acquisition message, each an opaque byte sequence, plus
/// the buffer duration (fixed-point time) declared in the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionStreams {
    pub buffer_duration: u64,
    pub experiment_info: Vec<u8>,
    pub signal: Vec<u8>,
    pub stimulation: Vec<u8>,
    pub channel_localisation: Vec<u8>,
    pub channel_units: Vec<u8>,
}

impl AcquisitionStreams {
    fn clear_streams(&mut self) {
        self.experiment_info.clear();
        self.signal.clear();
        self.stimulation.clear();
        self.channel_localisation.clear();
        self.channel_units.clear();
    }

    fn stream_mut(&mut self, id: u64) -> Option<&mut Vec<u8>> {
        match id {
            NODE_ACQUISITION_HEADER_EXPERIMENT_INFO | NODE_ACQUISITION_BUFFER_EXPERIMENT_INFO => {
                Some(&mut self.experiment_info)
            }
            NODE_ACQUISITION_HEADER_SIGNAL | NODE_ACQUISITION_BUFFER_SIGNAL => {
                Some(&mut self.signal)
            }
            NODE_ACQUISITION_HEADER_STIMULATION | NODE_ACQUISITION_BUFFER_STIMULATION => {
                Some(&mut self.stimulation)
            }
            NODE_ACQUISITION_HEADER_CHANNEL_LOCALISATION
            | NODE_ACQUISITION_BUFFER_CHANNEL_LOCALISATION => Some(&mut self.channel_localisation),
            NODE_ACQUISITION_HEADER_CHANNEL_UNITS | NODE_ACQUISITION_BUFFER_CHANNEL_UNITS => {
                Some(&mut self.channel_units)
            }
            _ => None,
        }
    }
}

const HEADER_NODES: [u64; 6] = [
    NODE_ACQUISITION_HEADER_BUFFER_DURATION,
    NODE_ACQUISITION_HEADER_EXPERIMENT_INFO,
    NODE_ACQUISITION_HEADER_SIGNAL,
    NODE_ACQUISITION_HEADER_STIMULATION,
    NODE_ACQUISITION_HEADER_CHANNEL_LOCALISATION,
    NODE_ACQUISITION_HEADER_CHANNEL_UNITS,
];

const BUFFER_NODES: [u64; 5] = [
    NODE_ACQUISITION_BUFFER_EXPERIMENT_INFO,
    NODE_ACQUISITION_BUFFER_SIGNAL,
    NODE_ACQUISITION_BUFFER_STIMULATION,
    NODE_ACQUISITION_BUFFER_CHANNEL_LOCALISATION,
    NODE_ACQUISITION_BUFFER_CHANNEL_UNITS,
];

/// Encoder of acquisition streams: a container relaying already encoded sub-streams
#[derive(Debug, Default)]
pub struct AcquisitionEncoder;

impl StreamEncoder for AcquisitionEncoder {
    type Input = AcquisitionStreams;

    fn write_header(
        &mut self,
        writer: &mut EbmlWriter,
        input: &AcquisitionStreams,
    ) -> Result<(), CodecError> {
        writer.write_uint(NODE_ACQUISITION_HEADER_BUFFER_DURATION, input.buffer_duration)?;
        writer.write_binary(NODE_ACQUISITION_HEADER_EXPERIMENT_INFO, &input.experiment_info)?;
        writer.write_binary(NODE_ACQUISITION_HEADER_SIGNAL, &input.signal)?;
        writer.write_binary(NODE_ACQUISITION_HEADER_STIMULATION, &input.stimulation)?;
        writer.write_binary(
            NODE_ACQUISITION_HEADER_CHANNEL_LOCALISATION,
            &input.channel_localisation,
        )?;
        writer.write_binary(NODE_ACQUISITION_HEADER_CHANNEL_UNITS, &input.channel_units)?;
        Ok(())
    }

    fn write_buffer(
        &mut self,
        writer: &mut EbmlWriter,
        input: &AcquisitionStreams,
    ) -> Result<(), CodecError> {
        writer.write_binary(NODE_ACQUISITION_BUFFER_EXPERIMENT_INFO, &input.experiment_info)?;
        writer.write_binary(NODE_ACQUISITION_BUFFER_SIGNAL, &input.signal)?;
        writer.write_binary(NODE_ACQUISITION_BUFFER_STIMULATION, &input.stimulation)?;
        writer.write_binary(
            NODE_ACQUISITION_BUFFER_CHANNEL_LOCALISATION,
            &input.channel_localisation,
        )?;
        writer.write_binary(NODE_ACQUISITION_BUFFER_CHANNEL_UNITS, &input.channel_units)?;
        Ok(())
    }
}

/// Decoder of acquisition streams. The sub-stream bytes of each message are exposed as they
/// are, to be fed to the matching decoders.
#[derive(Debug, Default)]
pub struct AcquisitionDecoder {
    phase: Option<Phase>,
    streams: AcquisitionStreams,
}

impl StreamDecoder for AcquisitionDecoder {
    type Output = AcquisitionStreams;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        if HEADER_NODES.contains(&id) || BUFFER_NODES.contains(&id) {
            Some(false)
        } else {
            None
        }
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        let allowed = match self.phase {
            Some(Phase::Header) => HEADER_NODES.contains(&id),
            Some(Phase::Buffer) => BUFFER_NODES.contains(&id),
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(CodecError::UnexpectedNode {
                node: id,
                parent: match self.phase {
                    Some(Phase::Header) => NODE_HEADER,
                    Some(Phase::Buffer) => NODE_BUFFER,
                    _ => NODE_END,
                },
            })
        }
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        if id == NODE_ACQUISITION_HEADER_BUFFER_DURATION {
            self.streams.buffer_duration = decode_uint(data)?;
        } else if let Some(stream) = self.streams.stream_mut(id) {
            stream.extend_from_slice(data);
        }
        Ok(())
    }

    fn close_child(&mut self, _id: u64) -> Result<(), CodecError> {
        Ok(())
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.phase = Some(phase);
        self.streams.clear_streams();
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        self.phase = None;
        Ok(())
    }

    fn output(&self) -> &AcquisitionStreams {
        &self.streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};

    #[test]
    fn test_sub_streams_are_relayed() {
        let header = AcquisitionStreams {
            buffer_duration: 1 << 29,
            experiment_info: vec![1, 2, 3],
            signal: vec![4, 5],
            stimulation: vec![],
            channel_localisation: vec![6],
            channel_units: vec![7, 8, 9, 10],
        };
        let mut encoder = Encoder::new(AcquisitionEncoder);
        let mut decoder = Decoder::new(AcquisitionDecoder::default());
        decoder
            .decode(&encoder.encode_header(&header).unwrap())
            .unwrap();
        assert_eq!(decoder.output(), &header);

        let buffer = AcquisitionStreams {
            signal: vec![11],
            ..Default::default()
        };
        decoder
            .decode(&encoder.encode_buffer(&buffer).unwrap())
            .unwrap();
        // The buffer duration is a header field and survives the buffer
        assert_eq!(decoder.output().buffer_duration, 1 << 29);
        assert_eq!(decoder.output().signal, vec![11]);
        assert!(decoder.output().experiment_info.is_empty());
    }

    #[test]
    fn test_buffer_duration_only_in_header() {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_BUFFER).unwrap();
        writer
            .write_uint(NODE_ACQUISITION_HEADER_BUFFER_DURATION, 1)
            .unwrap();
        writer.close_child().unwrap();
        let buffer = writer.take_output().unwrap();

        let mut encoder = Encoder::new(AcquisitionEncoder);
        let mut decoder = Decoder::new(AcquisitionDecoder::default());
        decoder
            .decode(&encoder.encode_header(&AcquisitionStreams::default()).unwrap())
            .unwrap();
        assert!(decoder.decode(&buffer).is_err());
    }
}
