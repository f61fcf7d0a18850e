use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::decode_uint;
use super::ebml_writer::EbmlWriter;
use super::error::{CodecError, MatrixError};
use super::matrix::Matrix;
use super::streamed_matrix::{MatrixLayer, StreamedMatrixEncoder};

/// A per channel description matrix plus a flag telling whether it may change from one buffer
/// to the next. Used by both channel localisation and channel units streams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicMatrix {
    pub matrix: Matrix,
    pub dynamic: bool,
}

pub type ChannelLocalisation = DynamicMatrix;

impl DynamicMatrix {
    /// Channel positions: one row per channel, columns x, y and z
    pub fn channel_localisation(channel_names: &[String]) -> Result<Self, MatrixError> {
        Self::with_columns(channel_names, &["x", "y", "z"])
    }

    pub(crate) fn with_columns(
        channel_names: &[String],
        columns: &[&str],
    ) -> Result<Self, MatrixError> {
        let mut matrix = Matrix::with_dimensions(&[channel_names.len(), columns.len()]);
        matrix.set_dimension_labels(0, channel_names)?;
        for (index, column) in columns.iter().enumerate() {
            matrix.set_dimension_label(1, index, column)?;
        }
        Ok(Self {
            matrix,
            dynamic: false,
        })
    }
}

/// Identifiers of the type specific header node and its flag leaf
#[derive(Debug, Clone, Copy)]
pub(crate) struct DynamicNodes {
    master: u64,
    flag: u64,
}

impl DynamicNodes {
    pub(crate) const fn new(master: u64, flag: u64) -> Self {
        Self { master, flag }
    }
}

const LOCALISATION_NODES: DynamicNodes = DynamicNodes::new(
    NODE_HEADER_CHANNEL_LOCALISATION,
    NODE_HEADER_CHANNEL_LOCALISATION_DYNAMIC,
);

#[derive(Debug)]
pub struct DynamicMatrixEncoder {
    nodes: DynamicNodes,
    matrix: StreamedMatrixEncoder,
}

impl DynamicMatrixEncoder {
    pub(crate) fn with_nodes(nodes: DynamicNodes) -> Self {
        Self {
            nodes,
            matrix: StreamedMatrixEncoder::default(),
        }
    }

    pub fn channel_localisation() -> Self {
        Self::with_nodes(LOCALISATION_NODES)
    }
}

impl StreamEncoder for DynamicMatrixEncoder {
    type Input = DynamicMatrix;

    fn write_header(
        &mut self,
        writer: &mut EbmlWriter,
        input: &DynamicMatrix,
    ) -> Result<(), CodecError> {
        writer.open_child(self.nodes.master)?;
        writer.write_uint(self.nodes.flag, input.dynamic as u64)?;
        writer.close_child()?;
        self.matrix.header(writer, &input.matrix)
    }

    fn write_buffer(
        &mut self,
        writer: &mut EbmlWriter,
        input: &DynamicMatrix,
    ) -> Result<(), CodecError> {
        self.matrix.buffer(writer, &input.matrix)
    }
}

#[derive(Debug)]
pub struct DynamicMatrixDecoder {
    nodes: DynamicNodes,
    matrix: MatrixLayer,
    in_master: bool,
    value: DynamicMatrix,
}

impl DynamicMatrixDecoder {
    pub(crate) fn with_nodes(nodes: DynamicNodes) -> Self {
        Self {
            nodes,
            matrix: MatrixLayer::default(),
            in_master: false,
            value: DynamicMatrix::default(),
        }
    }

    pub fn channel_localisation() -> Self {
        Self::with_nodes(LOCALISATION_NODES)
    }
}

impl StreamDecoder for DynamicMatrixDecoder {
    type Output = DynamicMatrix;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        if id == self.nodes.master {
            Some(true)
        } else if id == self.nodes.flag {
            Some(false)
        } else {
            self.matrix.is_master_child(id)
        }
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        if id == self.nodes.master && !self.in_master {
            self.in_master = true;
            Ok(())
        } else if id == self.nodes.flag && self.in_master {
            Ok(())
        } else if id == self.nodes.master || id == self.nodes.flag {
            Err(CodecError::UnexpectedNode {
                node: id,
                parent: if self.in_master {
                    self.nodes.master
                } else {
                    NODE_HEADER
                },
            })
        } else {
            self.matrix.open_child(id)
        }
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        if id == self.nodes.flag {
            self.value.dynamic = decode_uint(data)? != 0;
            Ok(())
        } else {
            self.matrix
                .process_child_data(id, data, &mut self.value.matrix)
        }
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        if id == self.nodes.master {
            self.in_master = false;
            Ok(())
        } else if id == self.nodes.flag {
            Ok(())
        } else {
            self.matrix.close_child(id, &mut self.value.matrix)
        }
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.in_master = false;
        self.matrix.begin_phase(phase);
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        self.matrix.end_phase();
        Ok(())
    }

    fn output(&self) -> &DynamicMatrix {
        &self.value
    }
}
