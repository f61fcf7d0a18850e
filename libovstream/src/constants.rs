// Node identifiers of the binary stream format.
//
// The content type of a node (master or leaf, and the leaf value type) is implied by its
// identifier alone; the stream carries no schema. Identifiers are grouped by stream family,
// one block of 0x100 per family.

// Envelope common to every stream
pub const NODE_HEADER: u64 = 0x0101;
pub const NODE_HEADER_STREAM_TYPE: u64 = 0x0102;
pub const NODE_HEADER_STREAM_VERSION: u64 = 0x0103;
pub const NODE_BUFFER: u64 = 0x0104;
pub const NODE_END: u64 = 0x0105;

// Streamed matrix
pub const NODE_HEADER_STREAMED_MATRIX: u64 = 0x0201;
pub const NODE_HEADER_STREAMED_MATRIX_DIMENSION_COUNT: u64 = 0x0202;
pub const NODE_HEADER_STREAMED_MATRIX_DIMENSION: u64 = 0x0203;
pub const NODE_HEADER_STREAMED_MATRIX_DIMENSION_SIZE: u64 = 0x0204;
pub const NODE_HEADER_STREAMED_MATRIX_DIMENSION_LABEL: u64 = 0x0205;
pub const NODE_BUFFER_STREAMED_MATRIX: u64 = 0x0206;
pub const NODE_BUFFER_STREAMED_MATRIX_RAW_BUFFER: u64 = 0x0207;

// Signal
pub const NODE_HEADER_SIGNAL: u64 = 0x0301;
pub const NODE_HEADER_SIGNAL_SAMPLING: u64 = 0x0302;

// Spectrum. The frequency band nodes are the legacy encoding, only ever read.
pub const NODE_HEADER_SPECTRUM: u64 = 0x0401;
pub const NODE_HEADER_SPECTRUM_SAMPLING: u64 = 0x0402;
pub const NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA: u64 = 0x0403;
pub const NODE_HEADER_SPECTRUM_FREQUENCY_BAND: u64 = 0x0404;
pub const NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START: u64 = 0x0405;
pub const NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP: u64 = 0x0406;

// Channel localisation / channel units
pub const NODE_HEADER_CHANNEL_LOCALISATION: u64 = 0x0501;
pub const NODE_HEADER_CHANNEL_LOCALISATION_DYNAMIC: u64 = 0x0502;
pub const NODE_HEADER_CHANNEL_UNITS: u64 = 0x0601;
pub const NODE_HEADER_CHANNEL_UNITS_DYNAMIC: u64 = 0x0602;

// Experiment information
pub const NODE_HEADER_EXPERIMENT_INFO: u64 = 0x0701;
pub const NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT: u64 = 0x0702;
pub const NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_ID: u64 = 0x0703;
pub const NODE_HEADER_EXPERIMENT_INFO_EXPERIMENT_DATE: u64 = 0x0704;
pub const NODE_HEADER_EXPERIMENT_INFO_SUBJECT: u64 = 0x0705;
pub const NODE_HEADER_EXPERIMENT_INFO_SUBJECT_ID: u64 = 0x0706;
pub const NODE_HEADER_EXPERIMENT_INFO_SUBJECT_NAME: u64 = 0x0707;
pub const NODE_HEADER_EXPERIMENT_INFO_SUBJECT_AGE: u64 = 0x0708;
pub const NODE_HEADER_EXPERIMENT_INFO_SUBJECT_GENDER: u64 = 0x0709;
pub const NODE_HEADER_EXPERIMENT_INFO_CONTEXT: u64 = 0x070A;
pub const NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_ID: u64 = 0x070B;
pub const NODE_HEADER_EXPERIMENT_INFO_CONTEXT_LABORATORY_NAME: u64 = 0x070C;
pub const NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_ID: u64 = 0x070D;
pub const NODE_HEADER_EXPERIMENT_INFO_CONTEXT_TECHNICIAN_NAME: u64 = 0x070E;

// Stimulations
pub const NODE_BUFFER_STIMULATION: u64 = 0x0801;
pub const NODE_BUFFER_STIMULATION_NUMBER_OF_STIMULATIONS: u64 = 0x0802;
pub const NODE_BUFFER_STIMULATION_STIMULATION: u64 = 0x0803;
pub const NODE_BUFFER_STIMULATION_STIMULATION_ID: u64 = 0x0804;
pub const NODE_BUFFER_STIMULATION_STIMULATION_DATE: u64 = 0x0805;
pub const NODE_BUFFER_STIMULATION_STIMULATION_DURATION: u64 = 0x0806;

// Acquisition (container of sub-streams)
pub const NODE_ACQUISITION_HEADER_BUFFER_DURATION: u64 = 0x0901;
pub const NODE_ACQUISITION_HEADER_EXPERIMENT_INFO: u64 = 0x0902;
pub const NODE_ACQUISITION_HEADER_SIGNAL: u64 = 0x0903;
pub const NODE_ACQUISITION_HEADER_STIMULATION: u64 = 0x0904;
pub const NODE_ACQUISITION_HEADER_CHANNEL_LOCALISATION: u64 = 0x0905;
pub const NODE_ACQUISITION_HEADER_CHANNEL_UNITS: u64 = 0x0906;
pub const NODE_ACQUISITION_BUFFER_EXPERIMENT_INFO: u64 = 0x0907;
pub const NODE_ACQUISITION_BUFFER_SIGNAL: u64 = 0x0908;
pub const NODE_ACQUISITION_BUFFER_STIMULATION: u64 = 0x0909;
pub const NODE_ACQUISITION_BUFFER_CHANNEL_LOCALISATION: u64 = 0x090A;
pub const NODE_ACQUISITION_BUFFER_CHANNEL_UNITS: u64 = 0x090B;

// Stream file container
pub const NODE_FILE_HEADER: u64 = 0x0A01;
pub const NODE_FILE_HEADER_VERSION: u64 = 0x0A02;
pub const NODE_FILE_HEADER_STREAM_TYPE: u64 = 0x0A03;
pub const NODE_FILE_CHUNK: u64 = 0x0A04;
pub const NODE_FILE_CHUNK_START_TIME: u64 = 0x0A05;
pub const NODE_FILE_CHUNK_END_TIME: u64 = 0x0A06;
pub const NODE_FILE_CHUNK_CONTENT: u64 = 0x0A07;
pub const NODE_FILE_HEADER_CREATION_TIME: u64 = 0x0A08;

/// Value of the stream type and stream version leaves of the envelope. The real stream type
/// is implied by the decoder in use.
pub const ENVELOPE_STREAM_TYPE: u64 = 0;
pub const ENVELOPE_STREAM_VERSION: u64 = 0;

/// Version of the stream file container format
pub const STREAM_FILE_VERSION: u64 = 1;

/// Default number of fractional digits written to CSV files
pub const DEFAULT_CSV_PRECISION: usize = 10;
/// Default CSV column separator
pub const DEFAULT_CSV_SEPARATOR: char = ',';
/// Rows grouped in one chunk when reading a legacy signal file, which does not record it
pub const DEFAULT_LEGACY_SAMPLES_PER_BUFFER: usize = 32;
/// Default number of chunks pulled from a CSV file per read
pub const DEFAULT_ROWS_PER_READ: usize = 32;
