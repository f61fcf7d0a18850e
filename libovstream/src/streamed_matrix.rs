use byteorder::{ByteOrder, LittleEndian};

use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::{decode_str, decode_uint};
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;
use super::matrix::Matrix;

/// Size in bytes of one matrix element in a raw buffer
const ELEMENT_SIZE: usize = 8;

/// Writes the streamed matrix part of a stream. Shared by every matrix based encoder.
///
/// The shape written in the header is remembered so that every buffer can be checked against
/// it.
#[derive(Debug, Default)]
pub struct StreamedMatrixEncoder {
    element_count: usize,
}

impl StreamedMatrixEncoder {
    pub(crate) fn header(
        &mut self,
        writer: &mut EbmlWriter,
        matrix: &Matrix,
    ) -> Result<(), CodecError> {
        writer.open_child(NODE_HEADER_STREAMED_MATRIX)?;
        writer.write_uint(
            NODE_HEADER_STREAMED_MATRIX_DIMENSION_COUNT,
            matrix.dimension_count() as u64,
        )?;
        for (dimension, size) in matrix.dimension_sizes().iter().enumerate() {
            writer.open_child(NODE_HEADER_STREAMED_MATRIX_DIMENSION)?;
            writer.write_uint(NODE_HEADER_STREAMED_MATRIX_DIMENSION_SIZE, *size as u64)?;
            // Labels are only written for dimensions that have at least one
            if matrix.has_labels(dimension) {
                for label in matrix.dimension_labels(dimension).unwrap_or_default() {
                    writer.write_str(NODE_HEADER_STREAMED_MATRIX_DIMENSION_LABEL, label)?;
                }
            }
            writer.close_child()?;
        }
        writer.close_child()?;
        self.element_count = matrix.element_count();
        Ok(())
    }

    pub(crate) fn buffer(
        &mut self,
        writer: &mut EbmlWriter,
        matrix: &Matrix,
    ) -> Result<(), CodecError> {
        if matrix.element_count() != self.element_count {
            return Err(CodecError::RawBufferSize {
                expected: self.element_count * ELEMENT_SIZE,
                found: matrix.element_count() * ELEMENT_SIZE,
            });
        }
        let mut raw = vec![0u8; matrix.buffer().len() * ELEMENT_SIZE];
        LittleEndian::write_f64_into(matrix.buffer(), &mut raw);
        writer.open_child(NODE_BUFFER_STREAMED_MATRIX)?;
        writer.write_binary(NODE_BUFFER_STREAMED_MATRIX_RAW_BUFFER, &raw)?;
        writer.close_child()?;
        Ok(())
    }
}

impl StreamEncoder for StreamedMatrixEncoder {
    type Input = Matrix;

    fn write_header(&mut self, writer: &mut EbmlWriter, input: &Matrix) -> Result<(), CodecError> {
        self.header(writer, input)
    }

    fn write_buffer(&mut self, writer: &mut EbmlWriter, input: &Matrix) -> Result<(), CodecError> {
        self.buffer(writer, input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MatrixSection {
    #[default]
    Outside,
    Header,
    Dimension,
    Buffer,
}

/// Reads the streamed matrix part of a stream into a target matrix owned by the caller.
///
/// Legal node positions are tracked with an explicit section state: DimensionCount and
/// Dimension only inside the header matrix node, Size and Label only inside a Dimension,
/// RawBuffer only inside the buffer matrix node.
#[derive(Debug, Default)]
pub struct MatrixLayer {
    phase: Option<Phase>,
    section: MatrixSection,
    declared_count: usize,
    sizes: Vec<usize>,
    labels: Vec<Vec<String>>,
}

impl MatrixLayer {
    pub fn is_master_child(&self, id: u64) -> Option<bool> {
        match id {
            NODE_HEADER_STREAMED_MATRIX
            | NODE_HEADER_STREAMED_MATRIX_DIMENSION
            | NODE_BUFFER_STREAMED_MATRIX => Some(true),
            NODE_HEADER_STREAMED_MATRIX_DIMENSION_COUNT
            | NODE_HEADER_STREAMED_MATRIX_DIMENSION_SIZE
            | NODE_HEADER_STREAMED_MATRIX_DIMENSION_LABEL
            | NODE_BUFFER_STREAMED_MATRIX_RAW_BUFFER => Some(false),
            _ => None,
        }
    }

    pub fn begin_phase(&mut self, phase: Phase) {
        self.phase = Some(phase);
        self.section = MatrixSection::Outside;
    }

    pub fn end_phase(&mut self) {
        self.phase = None;
    }

    fn section_node(&self) -> u64 {
        match self.section {
            MatrixSection::Outside => match self.phase {
                Some(Phase::Header) => NODE_HEADER,
                Some(Phase::Buffer) => NODE_BUFFER,
                Some(Phase::End) => NODE_END,
                None => 0,
            },
            MatrixSection::Header => NODE_HEADER_STREAMED_MATRIX,
            MatrixSection::Dimension => NODE_HEADER_STREAMED_MATRIX_DIMENSION,
            MatrixSection::Buffer => NODE_BUFFER_STREAMED_MATRIX,
        }
    }

    pub fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        match (self.phase, self.section, id) {
            (Some(Phase::Header), MatrixSection::Outside, NODE_HEADER_STREAMED_MATRIX) => {
                self.declared_count = 0;
                self.sizes.clear();
                self.labels.clear();
                self.section = MatrixSection::Header;
            }
            (_, MatrixSection::Header, NODE_HEADER_STREAMED_MATRIX_DIMENSION_COUNT) => (),
            (_, MatrixSection::Header, NODE_HEADER_STREAMED_MATRIX_DIMENSION) => {
                self.sizes.push(0);
                self.labels.push(Vec::new());
                self.section = MatrixSection::Dimension;
            }
            (_, MatrixSection::Dimension, NODE_HEADER_STREAMED_MATRIX_DIMENSION_SIZE)
            | (_, MatrixSection::Dimension, NODE_HEADER_STREAMED_MATRIX_DIMENSION_LABEL) => (),
            (Some(Phase::Buffer), MatrixSection::Outside, NODE_BUFFER_STREAMED_MATRIX) => {
                self.section = MatrixSection::Buffer;
            }
            (_, MatrixSection::Buffer, NODE_BUFFER_STREAMED_MATRIX_RAW_BUFFER) => (),
            _ => {
                return Err(CodecError::UnexpectedNode {
                    node: id,
                    parent: self.section_node(),
                })
            }
        }
        Ok(())
    }

    pub fn process_child_data(
        &mut self,
        id: u64,
        data: &[u8],
        matrix: &mut Matrix,
    ) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_STREAMED_MATRIX_DIMENSION_COUNT => {
                self.declared_count = decode_uint(data)? as usize;
            }
            NODE_HEADER_STREAMED_MATRIX_DIMENSION_SIZE => {
                if let Some(size) = self.sizes.last_mut() {
                    *size = decode_uint(data)? as usize;
                }
            }
            NODE_HEADER_STREAMED_MATRIX_DIMENSION_LABEL => {
                if let Some(labels) = self.labels.last_mut() {
                    labels.push(decode_str(data));
                }
            }
            NODE_BUFFER_STREAMED_MATRIX_RAW_BUFFER => {
                let expected = matrix.element_count() * ELEMENT_SIZE;
                if data.len() != expected {
                    return Err(CodecError::RawBufferSize {
                        expected,
                        found: data.len(),
                    });
                }
                LittleEndian::read_f64_into(data, matrix.buffer_mut());
            }
            _ => return Err(CodecError::DataOnMaster(id)),
        }
        Ok(())
    }

    pub fn close_child(&mut self, id: u64, matrix: &mut Matrix) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_STREAMED_MATRIX => {
                if self.sizes.len() != self.declared_count {
                    return Err(CodecError::DimensionCountMismatch {
                        declared: self.declared_count,
                        found: self.sizes.len(),
                    });
                }
                matrix.resize(&self.sizes);
                for (dimension, labels) in self.labels.iter().enumerate() {
                    for (index, label) in labels.iter().enumerate() {
                        matrix.set_dimension_label(dimension, index, label)?;
                    }
                }
                self.section = MatrixSection::Outside;
            }
            NODE_HEADER_STREAMED_MATRIX_DIMENSION => self.section = MatrixSection::Header,
            NODE_BUFFER_STREAMED_MATRIX => self.section = MatrixSection::Outside,
            _ => (),
        }
        Ok(())
    }
}

/// Decoder of plain streamed matrix streams
#[derive(Debug, Default)]
pub struct StreamedMatrixDecoder {
    layer: MatrixLayer,
    matrix: Matrix,
}

impl StreamDecoder for StreamedMatrixDecoder {
    type Output = Matrix;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        self.layer.is_master_child(id)
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        self.layer.open_child(id)
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        self.layer.process_child_data(id, data, &mut self.matrix)
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        self.layer.close_child(id, &mut self.matrix)
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.layer.begin_phase(phase);
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        self.layer.end_phase();
        Ok(())
    }

    fn output(&self) -> &Matrix {
        &self.matrix
    }
}
