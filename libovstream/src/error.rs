use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EbmlWriterError {
    #[error("EbmlWriter tried to close a child while no child was open")]
    NoOpenChild,
    #[error("EbmlWriter tried to set a value while no child was open")]
    NoCurrentNode,
    #[error("EbmlWriter tried to set a value on node {0:#x} which already has children")]
    ValueOnMaster(u64),
    #[error("EbmlWriter tried to set a second value on node {0:#x}")]
    ValueAlreadySet(u64),
    #[error("EbmlWriter tried to open a child under node {0:#x} which already holds a value")]
    ChildOnLeaf(u64),
    #[error("EbmlWriter output was requested while {0} children are still open")]
    UnclosedChildren(usize),
    #[error("Value {0} is too large to be coded as an EBML variable size integer")]
    VintOverflow(u64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EbmlReaderError {
    #[error("EbmlReader found an invalid variable size integer (leading zero byte)")]
    InvalidVint,
    #[error("EbmlReader found node {0:#x} with an unknown size, which is not supported")]
    UnknownSize(u64),
    #[error("EbmlReader found node {child:#x} overrunning the declared size of its parent {parent:#x}")]
    ChildOverrun { child: u64, parent: u64 },
    #[error("EbmlReader found an unsigned integer leaf of {0} bytes; at most 8 are allowed")]
    UIntTooLong(usize),
    #[error("EbmlReader found a floating point leaf of {0} bytes; expected 0, 4 or 8")]
    BadDoubleSize(usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("Matrix dimension {dimension} does not exist; matrix has {count} dimensions")]
    BadDimension { dimension: usize, count: usize },
    #[error("Matrix index {index} is out of range for dimension {dimension} of size {size}")]
    BadIndex {
        dimension: usize,
        index: usize,
        size: usize,
    },
    #[error("Matrix buffer has {found} elements but its dimensions require {expected}")]
    BufferSize { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("Codec failed due to EbmlWriter error: {0}")]
    WriterError(#[from] EbmlWriterError),
    #[error("Codec failed due to EbmlReader error: {0}")]
    ReaderError(#[from] EbmlReaderError),
    #[error("Codec failed due to Matrix error: {0}")]
    MatrixError(#[from] MatrixError),
    #[error("Codec received a buffer before any header")]
    BufferBeforeHeader,
    #[error("Codec received a second header for the same stream")]
    DuplicateHeader,
    #[error("Codec was used after the end of the stream")]
    StreamEnded,
    #[error("Codec found node {node:#x} where it is not allowed (inside {parent:#x})")]
    UnexpectedNode { node: u64, parent: u64 },
    #[error("Codec received leaf data for master node {0:#x}")]
    DataOnMaster(u64),
    #[error("Raw buffer holds {found} bytes but the declared dimensions require {expected}")]
    RawBufferSize { expected: usize, found: usize },
    #[error("Stream declares {declared} dimensions but carried {found}")]
    DimensionCountMismatch { declared: usize, found: usize },
    #[error("Feature vectors must have exactly 1 dimension; found {0}")]
    FeatureVectorDimension(usize),
    #[error("Spectrum has {abscissas} frequency abscissas for {bins} frequency bins")]
    AbscissaCount { abscissas: usize, bins: usize },
    #[error("Stimulation {index} exceeds the announced count of {count}")]
    StimulationOverflow { index: usize, count: usize },
    #[error("Stimulation set holds {found} entries but announced {count}")]
    StimulationCount { found: usize, count: usize },
}

/// Fixed error codes of the CSV handler. The integer value of each code is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsvErrorCode {
    #[error("Wrong stream type")]
    WrongStreamType,
    #[error("Header not read")]
    HeaderNotRead,
    #[error("Missing data")]
    MissingData,
    #[error("Wrong parameters")]
    WrongParameters,
    #[error("Error while writing")]
    ErrorWhileWriting,
    #[error("Can't write header")]
    CantWriteHeader,
    #[error("Invalid argument")]
    InvalidArgumentException,
    #[error("Value out of range")]
    OutOfRangeException,
    #[error("Dimension count is zero")]
    DimensionCountZero,
    #[error("Wrong dimension size")]
    WrongDimensionSize,
    #[error("Empty column")]
    EmptyColumn,
    #[error("Wrong stimulation size")]
    StimulationSize,
    #[error("Invalid stimulation argument")]
    InvalidStimulationArgument,
    #[error("Wrong sample date")]
    WrongSampleDate,
    #[error("Negative stimulation")]
    NegativeStimulation,
    #[error("Not enough lines")]
    NotEnoughLines,
    #[error("Sample is not empty")]
    SampleNotEmpty,
    #[error("Wrong line size")]
    WrongLineSize,
    #[error("Wrong header")]
    WrongHeader,
    #[error("Wrong input type")]
    WrongInputType,
    #[error("Information can only be set once")]
    SetInfoOnce,
    #[error("No channel names")]
    NoChannelsName,
    #[error("Dimension sizes are empty")]
    DimensionSizeEmpty,
    #[error("A dimension size is zero")]
    DimensionSizeZero,
    #[error("Matrix is empty")]
    MatrixEmpty,
    #[error("Wrong matrix size")]
    WrongMatrixSize,
    #[error("No matrix labels")]
    NoMatrixLabels,
    #[error("No sample")]
    NoSample,
    #[error("Date error")]
    DateError,
    #[error("Duration error")]
    DurationError,
    #[error("Can't open file")]
    CantOpenFile,
    #[error("No file defined")]
    NoFileDefined,
    #[error("Error while closing")]
    ErrorWhileClosing,
    #[error("No error")]
    NoError,
}

impl CsvErrorCode {
    /// Stable integer value of the code; NoError is 0 and every failure is negative
    pub fn value(&self) -> i32 {
        match self {
            Self::WrongStreamType => -33,
            Self::HeaderNotRead => -32,
            Self::MissingData => -31,
            Self::WrongParameters => -30,
            Self::ErrorWhileWriting => -29,
            Self::CantWriteHeader => -28,
            Self::InvalidArgumentException => -27,
            Self::OutOfRangeException => -26,
            Self::DimensionCountZero => -25,
            Self::WrongDimensionSize => -24,
            Self::EmptyColumn => -23,
            Self::StimulationSize => -22,
            Self::InvalidStimulationArgument => -21,
            Self::WrongSampleDate => -20,
            Self::NegativeStimulation => -19,
            Self::NotEnoughLines => -18,
            Self::SampleNotEmpty => -17,
            Self::WrongLineSize => -16,
            Self::WrongHeader => -15,
            Self::WrongInputType => -14,
            Self::SetInfoOnce => -13,
            Self::NoChannelsName => -12,
            Self::DimensionSizeEmpty => -11,
            Self::DimensionSizeZero => -10,
            Self::MatrixEmpty => -9,
            Self::WrongMatrixSize => -8,
            Self::NoMatrixLabels => -7,
            Self::NoSample => -6,
            Self::DateError => -5,
            Self::DurationError => -4,
            Self::CantOpenFile => -3,
            Self::NoFileDefined => -2,
            Self::ErrorWhileClosing => -1,
            Self::NoError => 0,
        }
    }

    /// Human readable message for the code, suitable for a log line
    pub fn log_message(&self) -> String {
        self.to_string()
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

/// Failure of a CsvHandler operation: one of the fixed codes plus an optional detail string
#[derive(Debug, Clone, PartialEq, Error)]
#[error("CsvHandler failed with error {code} ({}){}", .code.value(), detail_suffix(.detail))]
pub struct CsvError {
    pub code: CsvErrorCode,
    pub detail: String,
}

impl CsvError {
    pub fn new(code: CsvErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamFileError {
    #[error("StreamFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("StreamFile failed due to EbmlReader error: {0}")]
    ReaderError(#[from] EbmlReaderError),
    #[error("StreamFile failed due to EbmlWriter error: {0}")]
    WriterError(#[from] EbmlWriterError),
    #[error("Could not open StreamFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("StreamFile does not start with a stream file header")]
    MissingHeader,
    #[error("StreamFile found node {0:#x} at a position where it is not allowed")]
    UnexpectedNode(u64),
    #[error("StreamFile ended in the middle of a chunk")]
    TruncatedChunk,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Converter failed due to CSV error: {0}")]
    CsvError(#[from] CsvError),
    #[error("Converter failed due to codec error: {0}")]
    CodecError(#[from] CodecError),
    #[error("Converter failed due to Matrix error: {0}")]
    MatrixError(#[from] MatrixError),
    #[error("Converter expects a signal matrix with 2 dimensions; found {0}")]
    SignalShape(usize),
    #[error("Converter cannot handle stream type {0}")]
    UnsupportedStreamType(String),
    #[error("Converter expected a {expected} stream file; found {found}")]
    StreamTypeMismatch { expected: String, found: String },
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Converter error: {0}")]
    ConverterError(#[from] ConverterError),
    #[error("Processor failed due to StreamFile error: {0}")]
    StreamFileError(#[from] StreamFileError),
    #[error("Processor failed due to Codec error: {0}")]
    CodecError(#[from] CodecError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
