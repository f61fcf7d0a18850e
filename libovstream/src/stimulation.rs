use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::decode_uint;
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;
use super::stimulation_set::StimulationSet;

/// Encoder of stimulation streams. The header is empty; each buffer carries one set.
#[derive(Debug, Default)]
pub struct StimulationEncoder;

impl StreamEncoder for StimulationEncoder {
    type Input = StimulationSet;

    fn write_buffer(
        &mut self,
        writer: &mut EbmlWriter,
        input: &StimulationSet,
    ) -> Result<(), CodecError> {
        writer.open_child(NODE_BUFFER_STIMULATION)?;
        writer.write_uint(
            NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS,
            input.len() as u64,
        )?;
        for stimulation in input.iter() {
            writer.open_child(NODE_BUFFER_STIMULATION_STIMULATION)?;
            writer.write_uint(NODE_BUFFER_STIMULATION_STIMULATION_ID, stimulation.identifier)?;
            writer.write_uint(NODE_BUFFER_STIMULATION_STIMULATION_DATE, stimulation.date)?;
            writer.write_uint(
                NODE_BUFFER_STIMULATION_STIMULATION_DURATION,
                stimulation.duration,
            )?;
            writer.close_child()?;
        }
        writer.close_child()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StimulationSection {
    #[default]
    Outside,
    Set,
    Entry,
}

/// Decoder of stimulation streams.
///
/// Entries are appended as they arrive, up to the announced count, and the set is only
/// published as the output when its enclosing node closes with exactly that many entries.
#[derive(Debug, Default)]
pub struct StimulationDecoder {
    phase: Option<Phase>,
    section: StimulationSection,
    count: usize,
    next_index: usize,
    pending: StimulationSet,
    set: StimulationSet,
}

impl StimulationDecoder {
    fn unexpected(&self, id: u64) -> CodecError {
        CodecError::UnexpectedNode {
            node: id,
            parent: match self.section {
                StimulationSection::Outside => NODE_BUFFER,
                StimulationSection::Set => NODE_BUFFER_STIMULATION,
                StimulationSection::Entry => NODE_BUFFER_STIMULATION_STIMULATION,
            },
        }
    }

    /// Index of the entry currently being filled
    fn current_index(&self) -> usize {
        self.next_index.saturating_sub(1)
    }
}

impl StreamDecoder for StimulationDecoder {
    type Output = StimulationSet;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        match id {
            NODE_BUFFER_STIMULATION | NODE_BUFFER_STIMULATION_STIMULATION => Some(true),
            NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS
            | NODE_BUFFER_STIMULATION_STIMULATION_ID
            | NODE_BUFFER_STIMULATION_STIMULATION_DATE
            | NODE_BUFFER_STIMULATION_STIMULATION_DURATION => Some(false),
            _ => None,
        }
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        match (self.phase, self.section, id) {
            (Some(Phase::Buffer), StimulationSection::Outside, NODE_BUFFER_STIMULATION) => {
                self.count = 0;
                self.next_index = 0;
                self.pending.clear();
                self.section = StimulationSection::Set;
            }
            (_, StimulationSection::Set, NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS) => (),
            (_, StimulationSection::Set, NODE_BUFFER_STIMULATION_STIMULATION) => {
                if self.next_index >= self.count {
                    return Err(CodecError::StimulationOverflow {
                        index: self.next_index,
                        count: self.count,
                    });
                }
                self.next_index += 1;
                self.pending.push(0, 0, 0);
                self.section = StimulationSection::Entry;
            }
            (_, StimulationSection::Entry, NODE_BUFFER_STIMULATION_STIMULATION_ID)
            | (_, StimulationSection::Entry, NODE_BUFFER_STIMULATION_STIMULATION_DATE)
            | (_, StimulationSection::Entry, NODE_BUFFER_STIMULATION_STIMULATION_DURATION) => (),
            _ => return Err(self.unexpected(id)),
        }
        Ok(())
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        let value = decode_uint(data)?;
        if id == NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS {
            self.count = usize::try_from(value).unwrap_or(usize::MAX);
            return Ok(());
        }
        let index = self.current_index();
        let entry = self
            .pending
            .get_mut(index)
            .ok_or(CodecError::StimulationOverflow {
                index,
                count: self.count,
            })?;
        match id {
            NODE_BUFFER_STIMULATION_STIMULATION_ID => entry.identifier = value,
            NODE_BUFFER_STIMULATION_STIMULATION_DATE => entry.date = value,
            NODE_BUFFER_STIMULATION_STIMULATION_DURATION => entry.duration = value,
            _ => return Err(CodecError::DataOnMaster(id)),
        }
        Ok(())
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        match id {
            NODE_BUFFER_STIMULATION => {
                if self.pending.len() != self.count {
                    return Err(CodecError::StimulationCount {
                        found: self.pending.len(),
                        count: self.count,
                    });
                }
                self.set = std::mem::take(&mut self.pending);
                self.section = StimulationSection::Outside;
            }
            NODE_BUFFER_STIMULATION_STIMULATION => self.section = StimulationSection::Set,
            _ => (),
        }
        Ok(())
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.phase = Some(phase);
        self.section = StimulationSection::Outside;
        if phase == Phase::Buffer {
            self.set.clear();
        }
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        self.phase = None;
        Ok(())
    }

    fn output(&self) -> &StimulationSet {
        &self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};
    use crate::stimulation_set::Stimulation;

    #[test]
    fn test_stimulation_stream() {
        let mut set = StimulationSet::new();
        set.push(0x8001, 1 << 30, 0);
        set.push(0x8002, 3 << 30, 1 << 28);

        let mut encoder = Encoder::new(StimulationEncoder);
        let mut decoder = Decoder::new(StimulationDecoder::default());
        decoder
            .decode(&encoder.encode_header(&StimulationSet::new()).unwrap())
            .unwrap();
        decoder.decode(&encoder.encode_buffer(&set).unwrap()).unwrap();
        assert_eq!(decoder.output(), &set);
        assert_eq!(
            decoder.output().get(1),
            Some(&Stimulation::new(0x8002, 3 << 30, 1 << 28))
        );

        // An empty buffer clears the previous set
        decoder
            .decode(&encoder.encode_buffer(&StimulationSet::new()).unwrap())
            .unwrap();
        assert!(decoder.output().is_empty());
    }

    #[test]
    fn test_more_entries_than_announced() {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_BUFFER).unwrap();
        writer.open_child(NODE_BUFFER_STIMULATION).unwrap();
        writer
            .write_uint(NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS, 1)
            .unwrap();
        for _ in 0..2 {
            writer
                .open_child(NODE_BUFFER_STIMULATION_STIMULATION)
                .unwrap();
            writer
                .write_uint(NODE_BUFFER_STIMULATION_STIMULATION_ID, 5)
                .unwrap();
            writer.close_child().unwrap();
        }
        writer.close_child().unwrap();
        writer.close_child().unwrap();
        let buffer = writer.take_output().unwrap();

        let mut encoder = Encoder::new(StimulationEncoder);
        let mut decoder = Decoder::new(StimulationDecoder::default());
        decoder
            .decode(&encoder.encode_header(&StimulationSet::new()).unwrap())
            .unwrap();
        assert_eq!(
            decoder.decode(&buffer),
            Err(CodecError::StimulationOverflow { index: 1, count: 1 })
        );
    }

    #[test]
    fn test_forged_count_is_rejected() {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_BUFFER).unwrap();
        writer.open_child(NODE_BUFFER_STIMULATION).unwrap();
        writer
            .write_uint(NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS, u64::MAX)
            .unwrap();
        writer
            .open_child(NODE_BUFFER_STIMULATION_STIMULATION)
            .unwrap();
        writer
            .write_uint(NODE_BUFFER_STIMULATION_STIMULATION_ID, 5)
            .unwrap();
        writer.close_child().unwrap();
        writer.close_child().unwrap();
        writer.close_child().unwrap();
        let buffer = writer.take_output().unwrap();

        let mut encoder = Encoder::new(StimulationEncoder);
        let mut decoder = Decoder::new(StimulationDecoder::default());
        decoder
            .decode(&encoder.encode_header(&StimulationSet::new()).unwrap())
            .unwrap();
        assert_eq!(
            decoder.decode(&buffer),
            Err(CodecError::StimulationCount {
                found: 1,
                count: usize::try_from(u64::MAX).unwrap_or(usize::MAX),
            })
        );
        assert!(decoder.output().is_empty());
    }
}
