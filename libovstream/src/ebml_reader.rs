use super::ebml::read_vint;
use super::error::EbmlReaderError;

/// Receiver of the parse events of an EbmlReader.
///
/// The reader cannot know by itself whether a node holds children or a value, so it asks
/// through `is_master_child` as soon as the identifier is known. Events then arrive in strict
/// nesting order: `open_child`, zero or more nested events or exactly one
/// `process_child_data` for a leaf, then `close_child`.
pub trait ReaderCallback {
    type Error: From<EbmlReaderError>;

    fn is_master_child(&mut self, id: u64) -> bool;
    fn open_child(&mut self, id: u64) -> Result<(), Self::Error>;
    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), Self::Error>;
    fn close_child(&mut self, id: u64) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    FillingIdentifier,
    FillingContentSize { id: u64 },
    FillingContent { id: u64, size: usize },
}

#[derive(Debug)]
struct ReaderNode {
    id: u64,
    content_size: u64,
    read_size: u64,
}

/// EbmlReader is an incremental parser for nested tag/length/value documents.
///
/// Bytes are pushed with `process_data` in pieces of any size; whatever cannot be parsed yet is
/// kept until the next call. Leaf content is delivered in one piece once fully received. The
/// reader never holds more than the current incomplete element in memory.
#[derive(Debug)]
pub struct EbmlReader {
    state: ReaderState,
    stack: Vec<ReaderNode>,
    pending: Vec<u8>,
    total_bytes: u64,
}

impl Default for EbmlReader {
    fn default() -> Self {
        Self {
            state: ReaderState::FillingIdentifier,
            stack: Vec::new(),
            pending: Vec::new(),
            total_bytes: 0,
        }
    }
}

impl EbmlReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes to the reader, dispatching every completed parse event to the callback.
    ///
    /// On error the rest of the current document is dropped along with its open nodes, and
    /// the next bytes are parsed as the start of a new top level document.
    pub fn process_data<C: ReaderCallback>(
        &mut self,
        data: &[u8],
        callback: &mut C,
    ) -> Result<(), C::Error> {
        self.pending.extend_from_slice(data);
        let mut offset = 0;
        match self.consume(&mut offset, callback) {
            Ok(()) => {
                self.pending.drain(..offset);
                Ok(())
            }
            Err(e) => {
                self.abandon_document();
                Err(e)
            }
        }
    }

    fn abandon_document(&mut self) {
        self.state = ReaderState::FillingIdentifier;
        self.stack.clear();
        self.pending.clear();
    }

    fn consume<C: ReaderCallback>(
        &mut self,
        offset: &mut usize,
        callback: &mut C,
    ) -> Result<(), C::Error> {
        loop {
            match self.state {
                ReaderState::FillingIdentifier => {
                    let vint = match read_vint(&self.pending[*offset..])? {
                        Some(v) => v,
                        None => return Ok(()),
                    };
                    *offset += vint.length;
                    self.account(vint.value, vint.length as u64)?;
                    self.state = ReaderState::FillingContentSize { id: vint.value };
                }
                ReaderState::FillingContentSize { id } => {
                    let vint = match read_vint(&self.pending[*offset..])? {
                        Some(v) => v,
                        None => return Ok(()),
                    };
                    if vint.is_unknown {
                        return Err(EbmlReaderError::UnknownSize(id).into());
                    }
                    *offset += vint.length;
                    self.account(id, vint.length as u64)?;
                    self.check_fits(id, vint.value)?;
                    if callback.is_master_child(id) {
                        callback.open_child(id)?;
                        self.stack.push(ReaderNode {
                            id,
                            content_size: vint.value,
                            read_size: 0,
                        });
                        self.state = ReaderState::FillingIdentifier;
                        self.close_completed(callback)?;
                    } else {
                        self.state = ReaderState::FillingContent {
                            id,
                            size: vint.value as usize,
                        };
                    }
                }
                ReaderState::FillingContent { id, size } => {
                    let available = &self.pending[*offset..];
                    if available.len() < size {
                        return Ok(());
                    }
                    callback.open_child(id)?;
                    callback.process_child_data(id, &available[..size])?;
                    callback.close_child(id)?;
                    *offset += size;
                    self.account(id, size as u64)?;
                    self.state = ReaderState::FillingIdentifier;
                    self.close_completed(callback)?;
                }
            }
        }
    }

    /// Count consumed bytes against every open node
    fn account(&mut self, child: u64, bytes: u64) -> Result<(), EbmlReaderError> {
        self.total_bytes += bytes;
        for node in self.stack.iter_mut() {
            node.read_size += bytes;
            if node.read_size > node.content_size {
                return Err(EbmlReaderError::ChildOverrun {
                    child,
                    parent: node.id,
                });
            }
        }
        Ok(())
    }

    /// Check that a child of the given content size fits in what is left of its parent
    fn check_fits(&self, child: u64, content_size: u64) -> Result<(), EbmlReaderError> {
        if let Some(parent) = self.stack.last() {
            if content_size > parent.content_size - parent.read_size {
                return Err(EbmlReaderError::ChildOverrun {
                    child,
                    parent: parent.id,
                });
            }
        }
        Ok(())
    }

    /// Close every master node whose content has been completely read
    fn close_completed<C: ReaderCallback>(&mut self, callback: &mut C) -> Result<(), C::Error> {
        while let Some(top) = self.stack.last() {
            if top.read_size < top.content_size {
                break;
            }
            let id = top.id;
            self.stack.pop();
            callback.close_child(id)?;
        }
        Ok(())
    }

    /// True when the reader sits between two top level documents with nothing pending
    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
            && self.state == ReaderState::FillingIdentifier
            && self.pending.is_empty()
    }

    /// Total number of bytes parsed since creation or the last reset
    pub fn bytes_read(&self) -> u64 {
        self.total_bytes
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml_writer::EbmlWriter;

    #[derive(Debug, PartialEq)]
    enum Event {
        Open(u64),
        Data(u64, Vec<u8>),
        Close(u64),
    }

    struct Recorder {
        masters: Vec<u64>,
        events: Vec<Event>,
    }

    impl ReaderCallback for Recorder {
        type Error = EbmlReaderError;

        fn is_master_child(&mut self, id: u64) -> bool {
            self.masters.contains(&id)
        }
        fn open_child(&mut self, id: u64) -> Result<(), Self::Error> {
            self.events.push(Event::Open(id));
            Ok(())
        }
        fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), Self::Error> {
            self.events.push(Event::Data(id, data.to_vec()));
            Ok(())
        }
        fn close_child(&mut self, id: u64) -> Result<(), Self::Error> {
            self.events.push(Event::Close(id));
            Ok(())
        }
    }

    fn sample_document() -> Vec<u8> {
        let mut writer = EbmlWriter::new();
        writer.open_child(0x10).unwrap();
        writer.write_uint(0x11, 300).unwrap();
        writer.open_child(0x12).unwrap();
        writer.close_child().unwrap();
        writer.write_str(0x13, "label").unwrap();
        writer.close_child().unwrap();
        writer.take_output().unwrap()
    }

    fn expected_events() -> Vec<Event> {
        vec![
            Event::Open(0x10),
            Event::Open(0x11),
            Event::Data(0x11, vec![0x01, 0x2C]),
            Event::Close(0x11),
            Event::Open(0x12),
            Event::Close(0x12),
            Event::Open(0x13),
            Event::Data(0x13, b"label".to_vec()),
            Event::Close(0x13),
            Event::Close(0x10),
        ]
    }

    #[test]
    fn test_whole_document() {
        let mut recorder = Recorder {
            masters: vec![0x10, 0x12],
            events: Vec::new(),
        };
        let mut reader = EbmlReader::new();
        reader
            .process_data(&sample_document(), &mut recorder)
            .unwrap();
        assert_eq!(recorder.events, expected_events());
        assert!(reader.is_idle());
    }

    #[test]
    fn test_byte_by_byte() {
        let mut recorder = Recorder {
            masters: vec![0x10, 0x12],
            events: Vec::new(),
        };
        let mut reader = EbmlReader::new();
        let bytes = sample_document();
        for b in bytes.iter() {
            reader.process_data(&[*b], &mut recorder).unwrap();
        }
        assert_eq!(recorder.events, expected_events());
        assert_eq!(reader.bytes_read(), bytes.len() as u64);
    }

    #[test]
    fn test_overrun() {
        // Master 0x10 declares 2 bytes but holds a leaf of 3 bytes
        let bytes = vec![0x90, 0x82, 0x91, 0x83, 1, 2, 3];
        let mut recorder = Recorder {
            masters: vec![0x10],
            events: Vec::new(),
        };
        let mut reader = EbmlReader::new();
        match reader.process_data(&bytes, &mut recorder) {
            Err(EbmlReaderError::ChildOverrun { child, parent }) => {
                assert_eq!(child, 0x11);
                assert_eq!(parent, 0x10);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_unknown_size() {
        let bytes = vec![0x90, 0xFF];
        let mut recorder = Recorder {
            masters: vec![0x10],
            events: Vec::new(),
        };
        let mut reader = EbmlReader::new();
        assert_eq!(
            reader.process_data(&bytes, &mut recorder),
            Err(EbmlReaderError::UnknownSize(0x10))
        );
    }

    #[test]
    fn test_recovers_after_error() {
        let mut recorder = Recorder {
            masters: vec![0x10, 0x12],
            events: Vec::new(),
        };
        let mut reader = EbmlReader::new();
        assert!(reader
            .process_data(&[0x90, 0x82, 0x91, 0x83, 1, 2, 3], &mut recorder)
            .is_err());
        assert!(reader.is_idle());

        recorder.events.clear();
        reader
            .process_data(&sample_document(), &mut recorder)
            .unwrap();
        assert_eq!(recorder.events, expected_events());
        assert!(reader.is_idle());
    }
}
