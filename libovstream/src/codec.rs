//! Three phase lifecycle shared by every binary stream codec.
//!
//! A stream is a sequence of messages: exactly one Header, any number of Buffers, and an
//! optional End. Each message is one top level node of the binary tag format. Concrete codecs
//! only describe what goes inside the message nodes; the envelope and the ordering rules are
//! handled here by [`Encoder`] and [`Decoder`].
use super::constants::*;
use super::ebml::decode_uint;
use super::ebml_reader::{EbmlReader, ReaderCallback};
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;

/// The three message kinds of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Header,
    Buffer,
    End,
}

impl Phase {
    fn node(&self) -> u64 {
        match self {
            Self::Header => NODE_HEADER,
            Self::Buffer => NODE_BUFFER,
            Self::End => NODE_END,
        }
    }
}

/// Position of an encoder or decoder in the stream lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    HeaderDone,
    BufferDone,
    Ended,
}

impl StreamState {
    /// Check that a message of the given phase may follow, and return the resulting state
    fn advance(&self, phase: Phase) -> Result<Self, CodecError> {
        match (self, phase) {
            (Self::Ended, _) => Err(CodecError::StreamEnded),
            (Self::Idle, Phase::Header) => Ok(Self::HeaderDone),
            (_, Phase::Header) => Err(CodecError::DuplicateHeader),
            (Self::Idle, Phase::Buffer) => Err(CodecError::BufferBeforeHeader),
            (_, Phase::Buffer) => Ok(Self::BufferDone),
            (_, Phase::End) => Ok(Self::Ended),
        }
    }
}

/// The content side of an encoder. Each hook writes the inside of the corresponding message
/// node; the default implementations write nothing.
pub trait StreamEncoder {
    type Input;

    fn write_header(
        &mut self,
        _writer: &mut EbmlWriter,
        _input: &Self::Input,
    ) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_buffer(
        &mut self,
        _writer: &mut EbmlWriter,
        _input: &Self::Input,
    ) -> Result<(), CodecError> {
        Ok(())
    }

    fn write_end(&mut self, _writer: &mut EbmlWriter) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Encoder wraps a StreamEncoder with the stream envelope and the lifecycle checks.
///
/// Every `encode_*` call produces the bytes of one complete message.
#[derive(Debug, Default)]
pub struct Encoder<E: StreamEncoder> {
    inner: E,
    state: StreamState,
    writer: EbmlWriter,
}

impl<E: StreamEncoder> Encoder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            state: StreamState::Idle,
            writer: EbmlWriter::new(),
        }
    }

    pub fn encode_header(&mut self, input: &E::Input) -> Result<Vec<u8>, CodecError> {
        self.encode(Phase::Header, Some(input))
    }

    pub fn encode_buffer(&mut self, input: &E::Input) -> Result<Vec<u8>, CodecError> {
        self.encode(Phase::Buffer, Some(input))
    }

    pub fn encode_end(&mut self) -> Result<Vec<u8>, CodecError> {
        self.encode(Phase::End, None)
    }

    fn encode(&mut self, phase: Phase, input: Option<&E::Input>) -> Result<Vec<u8>, CodecError> {
        let next = self.state.advance(phase)?;
        match self.write_message(phase, input) {
            Ok(bytes) => {
                self.state = next;
                Ok(bytes)
            }
            Err(e) => {
                // Drop the half written nodes of the failed message
                self.writer.reset();
                Err(e)
            }
        }
    }

    fn write_message(
        &mut self,
        phase: Phase,
        input: Option<&E::Input>,
    ) -> Result<Vec<u8>, CodecError> {
        self.writer.open_child(phase.node())?;
        match (phase, input) {
            (Phase::Header, Some(input)) => {
                self.writer
                    .write_uint(NODE_HEADER_STREAM_TYPE, ENVELOPE_STREAM_TYPE)?;
                self.writer
                    .write_uint(NODE_HEADER_STREAM_VERSION, ENVELOPE_STREAM_VERSION)?;
                self.inner.write_header(&mut self.writer, input)?;
            }
            (Phase::Buffer, Some(input)) => self.inner.write_buffer(&mut self.writer, input)?,
            _ => self.inner.write_end(&mut self.writer)?,
        }
        self.writer.close_child()?;
        Ok(self.writer.take_output()?)
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Move the encoder back to an earlier position, used when a composite message fails
    /// after some of its parts were already encoded
    pub(crate) fn rewind(&mut self, state: StreamState) {
        self.state = state;
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }
}

/// The content side of a decoder: a visitor over the nodes found inside the message nodes.
///
/// `is_master_child` returns `None` for identifiers the decoder does not know; such nodes
/// are skipped as leaves and never reach the other methods. Phase hooks are called when a
/// message node opens and closes, which is where decoders reset and validate their output.
pub trait StreamDecoder {
    type Output;

    fn is_master_child(&self, id: u64) -> Option<bool>;
    fn open_child(&mut self, id: u64) -> Result<(), CodecError>;
    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError>;
    fn close_child(&mut self, id: u64) -> Result<(), CodecError>;

    fn begin_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        Ok(())
    }

    fn output(&self) -> &Self::Output;
}

/// Envelope bookkeeping of a Decoder, separated from the EbmlReader so both can be borrowed
/// at once
#[derive(Debug)]
struct DecoderState<D> {
    inner: D,
    state: StreamState,
    current: Option<Phase>,
    completed: Vec<Phase>,
}

impl<D: StreamDecoder> DecoderState<D> {
    fn is_known(&self, id: u64) -> bool {
        self.inner.is_master_child(id).is_some()
    }

    fn check_inside_message(&self, id: u64) -> Result<(), CodecError> {
        match self.current {
            Some(_) => Ok(()),
            None => Err(CodecError::UnexpectedNode {
                node: id,
                parent: 0,
            }),
        }
    }
}

impl<D: StreamDecoder> ReaderCallback for DecoderState<D> {
    type Error = CodecError;

    fn is_master_child(&mut self, id: u64) -> bool {
        match id {
            NODE_HEADER | NODE_BUFFER | NODE_END => true,
            NODE_HEADER_STREAM_TYPE | NODE_HEADER_STREAM_VERSION => false,
            _ => self.inner.is_master_child(id).unwrap_or(false),
        }
    }

    fn open_child(&mut self, id: u64) -> Result<(), Self::Error> {
        let phase = match id {
            NODE_HEADER => Phase::Header,
            NODE_BUFFER => Phase::Buffer,
            NODE_END => Phase::End,
            NODE_HEADER_STREAM_TYPE | NODE_HEADER_STREAM_VERSION => {
                return match self.current {
                    Some(Phase::Header) => Ok(()),
                    Some(p) => Err(CodecError::UnexpectedNode {
                        node: id,
                        parent: p.node(),
                    }),
                    None => self.check_inside_message(id),
                };
            }
            _ => {
                self.check_inside_message(id)?;
                if self.is_known(id) {
                    self.inner.open_child(id)?;
                }
                return Ok(());
            }
        };
        if let Some(open) = self.current {
            return Err(CodecError::UnexpectedNode {
                node: id,
                parent: open.node(),
            });
        }
        self.state = self.state.advance(phase)?;
        self.current = Some(phase);
        self.inner.begin_phase(phase)
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), Self::Error> {
        match id {
            NODE_HEADER_STREAM_TYPE | NODE_HEADER_STREAM_VERSION => {
                // Both are always 0; the value only has to be well formed
                decode_uint(data)?;
                Ok(())
            }
            _ if self.is_known(id) => self.inner.process_child_data(id, data),
            _ => Ok(()),
        }
    }

    fn close_child(&mut self, id: u64) -> Result<(), Self::Error> {
        match id {
            NODE_HEADER | NODE_BUFFER | NODE_END => {
                if let Some(phase) = self.current.take() {
                    self.inner.end_phase(phase)?;
                    self.completed.push(phase);
                }
                Ok(())
            }
            NODE_HEADER_STREAM_TYPE | NODE_HEADER_STREAM_VERSION => Ok(()),
            _ if self.is_known(id) => self.inner.close_child(id),
            _ => Ok(()),
        }
    }
}

/// Decoder wraps a StreamDecoder with an incremental EbmlReader, the envelope handling and the
/// lifecycle checks.
///
/// Bytes can be pushed in pieces of any size. Each call to `decode` returns the messages that
/// were completed by these bytes, in order; the decoded value of the last completed message is
/// available through `output`.
#[derive(Debug)]
pub struct Decoder<D: StreamDecoder> {
    reader: EbmlReader,
    state: DecoderState<D>,
}

impl<D: StreamDecoder + Default> Default for Decoder<D> {
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<D: StreamDecoder> Decoder<D> {
    pub fn new(inner: D) -> Self {
        Self {
            reader: EbmlReader::new(),
            state: DecoderState {
                inner,
                state: StreamState::Idle,
                current: None,
                completed: Vec::new(),
            },
        }
    }

    /// Push bytes into the decoder. Returns the phases of the messages completed by them.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Vec<Phase>, CodecError> {
        self.reader.process_data(bytes, &mut self.state)?;
        Ok(std::mem::take(&mut self.state.completed))
    }

    pub fn output(&self) -> &D::Output {
        self.state.inner.output()
    }

    pub fn state(&self) -> StreamState {
        self.state.state
    }

    pub fn inner(&self) -> &D {
        &self.state.inner
    }

    /// True when no message is partially decoded
    pub fn is_idle(&self) -> bool {
        self.reader.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal codec carrying a single counter leaf in each buffer
    #[derive(Debug, Default)]
    struct Counter {
        value: u64,
    }

    const NODE_COUNTER: u64 = 0x7001;

    impl StreamEncoder for Counter {
        type Input = u64;

        fn write_buffer(&mut self, writer: &mut EbmlWriter, input: &u64) -> Result<(), CodecError> {
            writer.write_uint(NODE_COUNTER, *input)?;
            Ok(())
        }
    }

    impl StreamDecoder for Counter {
        type Output = u64;

        fn is_master_child(&self, id: u64) -> Option<bool> {
            match id {
                NODE_COUNTER => Some(false),
                _ => None,
            }
        }
        fn open_child(&mut self, _id: u64) -> Result<(), CodecError> {
            Ok(())
        }
        fn process_child_data(&mut self, _id: u64, data: &[u8]) -> Result<(), CodecError> {
            self.value = decode_uint(data)?;
            Ok(())
        }
        fn close_child(&mut self, _id: u64) -> Result<(), CodecError> {
            Ok(())
        }
        fn output(&self) -> &u64 {
            &self.value
        }
    }

    #[test]
    fn test_encoder_lifecycle() {
        let mut encoder = Encoder::new(Counter::default());
        assert_eq!(encoder.encode_buffer(&1), Err(CodecError::BufferBeforeHeader));
        let header = encoder.encode_header(&0).unwrap();
        // Header [size 8] { StreamType [1] 0, StreamVersion [1] 0 }
        assert_eq!(
            header,
            vec![0x41, 0x01, 0x88, 0x41, 0x02, 0x81, 0x00, 0x41, 0x03, 0x81, 0x00]
        );
        assert_eq!(encoder.encode_header(&0), Err(CodecError::DuplicateHeader));
        encoder.encode_buffer(&7).unwrap();
        encoder.encode_end().unwrap();
        assert_eq!(encoder.state(), StreamState::Ended);
        assert_eq!(encoder.encode_buffer(&1), Err(CodecError::StreamEnded));
    }

    #[test]
    fn test_decoder_phases() {
        let mut encoder = Encoder::new(Counter::default());
        let mut bytes = encoder.encode_header(&0).unwrap();
        bytes.extend(encoder.encode_buffer(&42).unwrap());
        let end = encoder.encode_end().unwrap();

        let mut decoder = Decoder::new(Counter::default());
        let phases = decoder.decode(&bytes).unwrap();
        assert_eq!(phases, vec![Phase::Header, Phase::Buffer]);
        assert_eq!(*decoder.output(), 42);

        // End split across two calls
        assert!(decoder.decode(&end[..1]).unwrap().is_empty());
        assert_eq!(decoder.decode(&end[1..]).unwrap(), vec![Phase::End]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_rejects_misordered_messages() {
        let mut encoder = Encoder::new(Counter::default());
        let header = encoder.encode_header(&0).unwrap();
        let buffer = encoder.encode_buffer(&3).unwrap();

        let mut decoder = Decoder::new(Counter::default());
        assert_eq!(decoder.decode(&buffer), Err(CodecError::BufferBeforeHeader));

        let mut decoder = Decoder::new(Counter::default());
        decoder.decode(&header).unwrap();
        assert_eq!(decoder.decode(&header), Err(CodecError::DuplicateHeader));
    }

    #[test]
    fn test_unknown_nodes_are_skipped() {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_BUFFER).unwrap();
        writer.write_str(0x7FFF, "ignored").unwrap();
        writer.write_uint(NODE_COUNTER, 5).unwrap();
        writer.close_child().unwrap();
        let buffer = writer.take_output().unwrap();

        let mut encoder = Encoder::new(Counter::default());
        let mut decoder = Decoder::new(Counter::default());
        decoder.decode(&encoder.encode_header(&0).unwrap()).unwrap();
        assert_eq!(decoder.decode(&buffer).unwrap(), vec![Phase::Buffer]);
        assert_eq!(*decoder.output(), 5);
    }
}
