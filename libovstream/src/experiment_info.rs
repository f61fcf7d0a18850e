use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::{decode_str, decode_uint};
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;

/// Description of an experiment session: the experiment, the subject and the recording
/// context. Carried in the header only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentInfo {
    pub experiment_id: u64,
    pub experiment_date: String,
    pub subject_id: u64,
    pub subject_name: String,
    pub subject_age: u64,
    pub subject_gender: u64,
    pub laboratory_id: u64,
    pub laboratory_name: String,
    pub technician_id: u64,
    pub technician_name: String,
}

#[derive(Debug, Default)]
pub struct ExperimentInfoEncoder;

impl StreamEncoder for ExperimentInfoEncoder {
    type Input = ExperimentInfo;

    fn write_header(
        &mut self,
        writer: &mut EbmlWriter,
        input: &ExperimentInfo,
    ) -> Result<(), CodecError> {
        writer.open_child(NODE_HEADER_EXPERIMENT_INFO)?;

        writer.open_child(NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT)?;
        writer.write_uint(NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_ID, input.experiment_id)?;
        writer.write_str(
            NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_DATE,
            &input.experiment_date,
        )?;
        writer.close_child()?;

        writer.open_child(NODE_HEADER_EXPERIMENT_INFO_SUBJECT)?;
        writer.write_uint(NODE_HEADER_EXPERIMENT_INFO_SUBJECT_ID, input.subject_id)?;
        writer.write_str(NODE_HEADER_EXPERIMENT_INFO_SUBJECT_NAME, &input.subject_name)?;
        writer.write_uint(NODE_HEADER_EXPERIMENT_INFO_SUBJECT_AGE, input.subject_age)?;
        writer.write_uint(
            NODE_HEADER_EXPERIMENT_INFO_SUBJECT_GENDER,
            input.subject_gender,
        )?;
        writer.close_child()?;

        writer.open_child(NODE_HEADER_EXPERIMENT_INFO_CONTEXT)?;
        writer.write_uint(
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_ID,
            input.laboratory_id,
        )?;
        writer.write_str(
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_NAME,
            &input.laboratory_name,
        )?;
        writer.write_uint(
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_ID,
            input.technician_id,
        )?;
        writer.write_str(
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_NAME,
            &input.technician_name,
        )?;
        writer.close_child()?;

        writer.close_child()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum InfoSection {
    #[default]
    Outside,
    Info,
    Experiment,
    Subject,
    Context,
}

impl InfoSection {
    fn node(&self) -> u64 {
        match self {
            Self::Outside => NODE_HEADER,
            Self::Info => NODE_HEADER_EXPERIMENT_INFO,
            Self::Experiment => NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT,
            Self::Subject => NODE_HEADER_EXPERIMENT_INFO_SUBJECT,
            Self::Context => NODE_HEADER_EXPERIMENT_INFO_CONTEXT,
        }
    }
}

/// Every node of the stream with the section it must appear in. Master nodes open the section
/// named in the last column.
const NODE_TABLE: [(u64, InfoSection, Option<InfoSection>); 14] = [
    (NODE_HEADER_EXPERIMENT_INFO, InfoSection::Outside, Some(InfoSection::Info)),
    (NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT, InfoSection::Info, Some(InfoSection::Experiment)),
    (NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_ID, InfoSection::Experiment, None),
    (NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_DATE, InfoSection::Experiment, None),
    (NODE_HEADER_EXPERIMENT_INFO_SUBJECT, InfoSection::Info, Some(InfoSection::Subject)),
    (NODE_HEADER_EXPERIMENT_INFO_SUBJECT_ID, InfoSection::Subject, None),
    (NODE_HEADER_EXPERIMENT_INFO_SUBJECT_NAME, InfoSection::Subject, None),
    (NODE_HEADER_EXPERIMENT_INFO_SUBJECT_AGE, InfoSection::Subject, None),
    (NODE_HEADER_EXPERIMENT_INFO_SUBJECT_GENDER, InfoSection::Subject, None),
    (NODE_HEADER_EXPERIMENT_INFO_CONTEXT, InfoSection::Info, Some(InfoSection::Context)),
    (NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_ID, InfoSection::Context, None),
    (NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_NAME, InfoSection::Context, None),
    (NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_ID, InfoSection::Context, None),
    (NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_NAME, InfoSection::Context, None),
];

fn lookup(id: u64) -> Option<(InfoSection, Option<InfoSection>)> {
    NODE_TABLE
        .iter()
        .find(|(node, _, _)| *node == id)
        .map(|(_, parent, opens)| (*parent, *opens))
}

#[derive(Debug, Default)]
pub struct ExperimentInfoDecoder {
    phase: Option<Phase>,
    section: InfoSection,
    info: ExperimentInfo,
}

impl StreamDecoder for ExperimentInfoDecoder {
    type Output = ExperimentInfo;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        lookup(id).map(|(_, opens)| opens.is_some())
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        let (parent, opens) = match lookup(id) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        if parent != self.section || self.phase != Some(Phase::Header) {
            return Err(CodecError::UnexpectedNode {
                node: id,
                parent: self.section.node(),
            });
        }
        if let Some(section) = opens {
            self.section = section;
        }
        Ok(())
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        let info = &mut self.info;
        match id {
            NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_ID => info.experiment_id = decode_uint(data)?,
            NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_DATE => info.experiment_date = decode_str(data),
            NODE_HEADER_EXPERIMENT_INFO_SUBJECT_ID => info.subject_id = decode_uint(data)?,
            NODE_HEADER_EXPERIMENT_INFO_SUBJECT_NAME => info.subject_name = decode_str(data),
            NODE_HEADER_EXPERIMENT_INFO_SUBJECT_AGE => info.subject_age = decode_uint(data)?,
            NODE_HEADER_EXPERIMENT_INFO_SUBJECT_GENDER => info.subject_gender = decode_uint(data)?,
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_ID => {
                info.laboratory_id = decode_uint(data)?
            }
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_NAME => {
                info.laboratory_name = decode_str(data)
            }
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_ID => {
                info.technician_id = decode_uint(data)?
            }
            NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_NAME => {
                info.technician_name = decode_str(data)
            }
            _ => return Err(CodecError::DataOnMaster(id)),
        }
        Ok(())
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        if let Some((parent, Some(_))) = lookup(id) {
            self.section = parent;
        }
        Ok(())
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.phase = Some(phase);
        self.section = InfoSection::Outside;
        if phase == Phase::Header {
            self.info = ExperimentInfo::default();
        }
        Ok(())
    }

    fn end_phase(&mut self, _phase: Phase) -> Result<(), CodecError> {
        self.phase = None;
        Ok(())
    }

    fn output(&self) -> &ExperimentInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};

    #[test]
    fn test_experiment_info_stream() {
        let info = ExperimentInfo {
            experiment_id: 12,
            experiment_date: "2024-03-01".to_string(),
            subject_id: 7,
            subject_name: "anonymous".to_string(),
            subject_age: 31,
            subject_gender: 2,
            laboratory_id: 1,
            laboratory_name: "Lab".to_string(),
            technician_id: 3,
            technician_name: "Tech".to_string(),
        };
        let mut encoder = Encoder::new(ExperimentInfoEncoder);
        let mut decoder = Decoder::new(ExperimentInfoDecoder::default());
        decoder
            .decode(&encoder.encode_header(&info).unwrap())
            .unwrap();
        assert_eq!(decoder.output(), &info);

        // Buffers of an experiment information stream are empty
        let phases = decoder
            .decode(&encoder.encode_buffer(&info).unwrap())
            .unwrap();
        assert_eq!(phases, vec![Phase::Buffer]);
        assert_eq!(decoder.output(), &info);
    }

    #[test]
    fn test_misplaced_leaf() {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_HEADER).unwrap();
        writer.open_child(NODE_HEADER_EXPERIMENT_INFO).unwrap();
        writer
            .write_uint(NODE_HEADER_EXPERIMENT_INFO_SUBJECT_AGE, 40)
            .unwrap();
        writer.close_child().unwrap();
        writer.close_child().unwrap();

        let mut decoder = Decoder::new(ExperimentInfoDecoder::default());
        assert_eq!(
            decoder.decode(&writer.take_output().unwrap()),
            Err(CodecError::UnexpectedNode {
                node: NODE_HEADER_EXPERIMENT_INFO_SUBJECT_AGE,
                parent: NODE_HEADER_EXPERIMENT_INFO
            })
        );
    }
}
