use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;
use super::matrix::Matrix;
use super::streamed_matrix::{StreamedMatrixDecoder, StreamedMatrixEncoder};

/// Feature vectors are streamed matrices with exactly one dimension
fn check_vector(matrix: &Matrix) -> Result<(), CodecError> {
    match matrix.dimension_count() {
        1 => Ok(()),
        n => Err(CodecError::FeatureVectorDimension(n)),
    }
}

#[derive(Debug, Default)]
pub struct FeatureVectorEncoder {
    matrix: StreamedMatrixEncoder,
}

impl StreamEncoder for FeatureVectorEncoder {
    type Input = Matrix;

    fn write_header(&mut self, writer: &mut EbmlWriter, input: &Matrix) -> Result<(), CodecError> {
        check_vector(input)?;
        self.matrix.header(writer, input)
    }

    fn write_buffer(&mut self, writer: &mut EbmlWriter, input: &Matrix) -> Result<(), CodecError> {
        check_vector(input)?;
        self.matrix.buffer(writer, input)
    }
}

#[derive(Debug, Default)]
pub struct FeatureVectorDecoder {
    matrix: StreamedMatrixDecoder,
}

impl StreamDecoder for FeatureVectorDecoder {
    type Output = Matrix;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        self.matrix.is_master_child(id)
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        self.matrix.open_child(id)
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        self.matrix.process_child_data(id, data)
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        self.matrix.close_child(id)
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.matrix.begin_phase(phase)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.matrix.end_phase(phase)?;
        if phase == Phase::Header {
            check_vector(self.matrix.output())?;
        }
        Ok(())
    }

    fn output(&self) -> &Matrix {
        self.matrix.output()
    }
}
