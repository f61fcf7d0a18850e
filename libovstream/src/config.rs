use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{
    DEFAULT_CSV_PRECISION, DEFAULT_CSV_SEPARATOR, DEFAULT_LEGACY_SAMPLES_PER_BUFFER,
    DEFAULT_ROWS_PER_READ,
};
use super::csv_header::StreamType;
use super::error::ConfigError;

/// Extension appended to a data stream file name for the stimulations stream next to it
pub const STIMULATION_FILE_EXTENSION: &str = "stimulations";

/// Which way a conversion goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    CsvToStream,
    /// Wrap a signal CSV file and its events into a single acquisition stream
    CsvToAcquisition,
    StreamToCsv,
}

/// Structure representing the converter configuration. Contains pathing and CSV layout
/// information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub direction: Direction,
    /// Type expected in the input stream file when converting to CSV. Undefined accepts
    /// whatever the file declares.
    pub stream_type: StreamType,
    pub separator: char,
    pub precision: usize,
    pub append: bool,
    pub last_matrix_only: bool,
    pub rows_per_read: usize,
    pub legacy_samples_per_buffer: usize,
    pub subject_id: u64,
    pub subject_age: u64,
    pub subject_gender: u64,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            direction: Direction::CsvToStream,
            stream_type: StreamType::Undefined,
            separator: DEFAULT_CSV_SEPARATOR,
            precision: DEFAULT_CSV_PRECISION,
            append: false,
            last_matrix_only: false,
            rows_per_read: DEFAULT_ROWS_PER_READ,
            legacy_samples_per_buffer: DEFAULT_LEGACY_SAMPLES_PER_BUFFER,
            subject_id: 0,
            subject_age: 0,
            subject_gender: 0,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Get the path to the input file, checking that it exists
    pub fn get_input_path(&self) -> Result<&Path, ConfigError> {
        if self.input_path.exists() {
            Ok(&self.input_path)
        } else {
            Err(ConfigError::BadFilePath(self.input_path.clone()))
        }
    }

    /// Get the path to the output file, checking that its directory exists
    pub fn get_output_path(&self) -> Result<&Path, ConfigError> {
        match self.output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                Err(ConfigError::BadFilePath(parent.to_path_buf()))
            }
            _ => Ok(&self.output_path),
        }
    }

    /// Path of the stimulations stream file paired with a data stream file
    pub fn stimulation_path(stream_path: &Path) -> PathBuf {
        let mut name = stream_path.as_os_str().to_os_string();
        name.push(".");
        name.push(STIMULATION_FILE_EXTENSION);
        PathBuf::from(name)
    }

    pub fn is_rows_per_read_valid(&self) -> bool {
        self.rows_per_read >= 1
    }

    pub fn is_separator_valid(&self) -> bool {
        // These characters are part of the column names themselves
        !matches!(self.separator, ':' | 'x' | '.' | '\n' | '\r') && !self.separator.is_ascii_digit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = Config {
            input_path: PathBuf::from("/data/signal.csv"),
            direction: Direction::StreamToCsv,
            stream_type: StreamType::Signal,
            separator: ';',
            ..Default::default()
        };
        config.write_config_file(&path).unwrap();

        let read = Config::read_config_file(&path).unwrap();
        assert_eq!(read.input_path, PathBuf::from("/data/signal.csv"));
        assert_eq!(read.direction, Direction::StreamToCsv);
        assert_eq!(read.stream_type, StreamType::Signal);
        assert_eq!(read.separator, ';');
        assert_eq!(read.precision, DEFAULT_CSV_PRECISION);
        assert!(read.is_rows_per_read_valid());
        assert!(read.is_separator_valid());
    }

    #[test]
    fn test_missing_config() {
        match Config::read_config_file(Path::new("/does/not/exist.yml")) {
            Err(ConfigError::BadFilePath(_)) => (),
            _ => panic!("A missing file must be reported"),
        }
    }

    #[test]
    fn test_stimulation_path() {
        assert_eq!(
            Config::stimulation_path(Path::new("out/run.ovs")),
            PathBuf::from("out/run.ovs.stimulations")
        );
    }
}
