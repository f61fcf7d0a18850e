//! # libovstream
//!
//! libovstream reads and writes the streams exchanged between the processing boxes of a
//! brain-computer interface pipeline, and converts them to and from CSV files. It contains
//! the binary tag (EBML) reader and writer, one three phase codec per stream type, the CSV
//! handler used by the CSV file boxes, and a small stream file container so that encoded
//! streams can be stored on disk.
//!
//! ## Streams
//!
//! Every stream is a sequence of messages: one header, any number of buffers, one end.
//! Messages are self-contained EBML documents. The supported stream types are
//!
//! - StreamedMatrix: an n-dimensional labelled matrix of `f64`
//! - FeatureVector: a one dimensional matrix
//! - Signal: a `[channels, samples]` matrix with a sampling rate
//! - Spectrum: a `[channels, bins]` matrix with the frequency abscissa of each bin and the
//! sampling rate of the original signal. Headers written with frequency bands (older
//! writers) are still accepted.
//! - ChannelLocalisation and ChannelUnits: per channel description matrices with a dynamic
//! flag
//! - ExperimentInfo: experiment, subject, laboratory and technician metadata
//! - Stimulation: sets of `(identifier, date, duration)` events
//! - Acquisition: an envelope carrying the messages of five sub-streams at once (see
//! [`master_acquisition`])
//!
//! Times in streams are 32.32 fixed-point seconds (see [`time_arith`]).
//!
//! ## CSV files
//!
//! The CSV layout of a stream starts with a header row describing the stream type and
//! shape. Every following row carries the time of the row, the values, and the events that
//! fall inside the time window of the row:
//!
//! ```csv
//! Time:256Hz,Epoch,O1,O2,Event Id,Event Date,Event Duration
//! 0.0000000000,0,-1.2000000000,3.4000000000,,,
//! 0.0039062500,0,-1.1000000000,3.5000000000,33025,0.0039062500,0.0000000000
//! ```
//!
//! Files written by older versions (`Time (s)` first column) can still be read.
//!
//! ## Conversion
//!
//! The [`process`] module converts in three directions:
//!
//! - CsvToStream: a CSV file becomes a stream file holding the data stream. When the CSV
//! file carries events, they are written to a second stream file named after the first
//! with a `.stimulations` extension.
//! - CsvToAcquisition: a signal CSV file and its events become a single acquisition stream
//! file, with the subject metadata of the configuration.
//! - StreamToCsv: a stream file (and its `.stimulations` companion, if present) becomes a
//! CSV file.
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_path: /data/run_0001.csv
//! output_path: /data/run_0001.ovs
//! direction: CsvToStream
//! stream_type: Undefined
//! separator: ','
//! precision: 10
//! append: false
//! last_matrix_only: false
//! rows_per_read: 32
//! legacy_samples_per_buffer: 32
//! subject_id: 0
//! subject_age: 0
//! subject_gender: 0
//! ```
//!
//! `stream_type` only matters when converting to CSV: if it is not `Undefined`, the input
//! stream file must declare that type. `legacy_samples_per_buffer` sets the buffer size
//! used when reading older signal files, which do not record it.
pub mod acquisition;
pub mod channel_localisation;
pub mod channel_units;
pub mod codec;
pub mod config;
pub mod constants;
pub mod csv_handler;
pub mod csv_header;
pub mod csv_reader_box;
pub mod csv_writer_box;
pub mod ebml;
pub mod ebml_reader;
pub mod ebml_writer;
pub mod error;
pub mod experiment_info;
pub mod feature_vector;
pub mod master_acquisition;
pub mod matrix;
pub mod process;
pub mod signal;
pub mod spectrum;
pub mod stimulation;
pub mod stimulation_set;
pub mod stream_file;
pub mod streamed_matrix;
pub mod time_arith;
pub mod worker_status;
