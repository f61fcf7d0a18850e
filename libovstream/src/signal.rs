use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::decode_uint;
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;
use super::matrix::Matrix;
use super::streamed_matrix::{MatrixLayer, StreamedMatrixEncoder};

/// A chunk of multichannel signal. Dimension 0 of the matrix is the channel, dimension 1 the
/// sample within the chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    pub matrix: Matrix,
    pub sampling_rate: u64,
}

impl Signal {
    pub fn new(matrix: Matrix, sampling_rate: u64) -> Self {
        Self {
            matrix,
            sampling_rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.matrix.dimension_size(0).unwrap_or(0)
    }

    pub fn samples_per_chunk(&self) -> usize {
        self.matrix.dimension_size(1).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct SignalEncoder {
    matrix: StreamedMatrixEncoder,
}

impl StreamEncoder for SignalEncoder {
    type Input = Signal;

    fn write_header(&mut self, writer: &mut EbmlWriter, input: &Signal) -> Result<(), CodecError> {
        writer.open_child(NODE_HEADER_SIGNAL)?;
        writer.write_uint(NODE_HEADER_SIGNAL_SAMPLING, input.sampling_rate)?;
        writer.close_child()?;
        self.matrix.header(writer, &input.matrix)
    }

    fn write_buffer(&mut self, writer: &mut EbmlWriter, input: &Signal) -> Result<(), CodecError> {
        self.matrix.buffer(writer, &input.matrix)
    }
}

#[derive(Debug, Default)]
pub struct SignalDecoder {
    matrix: MatrixLayer,
    in_signal: bool,
    signal: Signal,
}

impl StreamDecoder for SignalDecoder {
    type Output = Signal;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        match id {
            NODE_HEADER_SIGNAL => Some(true),
            NODE_HEADER_SIGNAL_SAMPLING => Some(false),
            _ => self.matrix.is_master_child(id),
        }
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_SIGNAL if !self.in_signal => {
                self.in_signal = true;
                Ok(())
            }
            NODE_HEADER_SIGNAL_SAMPLING if self.in_signal => Ok(()),
            NODE_HEADER_SIGNAL | NODE_HEADER_SIGNAL_SAMPLING => Err(CodecError::UnexpectedNode {
                node: id,
                parent: if self.in_signal {
                    NODE_HEADER_SIGNAL
                } else {
                    NODE_HEADER
                },
            }),
            _ => self.matrix.open_child(id),
        }
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_SIGNAL_SAMPLING => {
                self.signal.sampling_rate = decode_uint(data)?;
                Ok(())
            }
            _ => self
                .matrix
                .process_child_data(id, data, &mut self.signal.matrix),
        }
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_SIGNAL => {
                self.in_signal = false;
                Ok(())
            }
            NODE_HEADER_SIGNAL_SAMPLING => Ok(()),
            _ => self.matrix.close_child(id, &mut self.signal.matrix),
        }
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.in_signal = false;
        self.matrix.begin_phase(phase);
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        self.matrix.end_phase();
        Ok(())
    }

    fn output(&self) -> &Signal {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};

    #[test]
    fn test_signal_stream() {
        let mut matrix = Matrix::with_dimensions(&[2, 4]);
        matrix
            .set_dimension_labels(0, &["O1".to_string(), "O2".to_string()])
            .unwrap();
        for (i, v) in matrix.buffer_mut().iter_mut().enumerate() {
            *v = i as f64 * 0.5;
        }
        let signal = Signal::new(matrix, 512);

        let mut encoder = Encoder::new(SignalEncoder::default());
        let mut decoder = Decoder::new(SignalDecoder::default());
        decoder
            .decode(&encoder.encode_header(&signal).unwrap())
            .unwrap();
        assert_eq!(decoder.output().sampling_rate, 512);
        assert_eq!(decoder.output().channel_count(), 2);
        assert_eq!(decoder.output().samples_per_chunk(), 4);

        let phases = decoder
            .decode(&encoder.encode_buffer(&signal).unwrap())
            .unwrap();
        assert_eq!(phases, vec![Phase::Buffer]);
        assert_eq!(decoder.output(), &signal);
    }

    #[test]
    fn test_sampling_outside_signal_node() {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_HEADER).unwrap();
        writer.write_uint(NODE_HEADER_SIGNAL_SAMPLING, 8).unwrap();
        writer.close_child().unwrap();
        let header = writer.take_output().unwrap();

        let mut decoder = Decoder::new(SignalDecoder::default());
        assert_eq!(
            decoder.decode(&header),
            Err(CodecError::UnexpectedNode {
                node: NODE_HEADER_SIGNAL_SAMPLING,
                parent: NODE_HEADER
            })
        );
    }
}
