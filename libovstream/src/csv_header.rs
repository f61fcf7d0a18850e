//! Classification of CSV header rows.
//!
//! A header row is tokenized on the column separator and matched against the known column
//! layouts, in a fixed order: the current layouts first (signal, matrix, vector, spectrum,
//! stimulations), then the legacy ones written by older tools (`Time (s)` first column).
//! Everything here works on strings only; file access lives in the handler.
use fxhash::FxHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{CsvError, CsvErrorCode};

/// Separator between the parts of a single column (labels of a matrix cell, several events
/// in one row)
pub const DATA_SEPARATOR: char = ':';
/// Separator between dimension sizes in the time column of a matrix header
pub const DIMENSION_SEPARATOR: char = 'x';

/// Columns before the data: time and epoch (or end time)
pub const PRE_DATA_COLUMNS: usize = 2;
/// Columns after the data: event id, date and duration
pub const POST_DATA_COLUMNS: usize = 3;

pub const EVENT_ID_COLUMN: &str = "Event Id";
pub const EVENT_DATE_COLUMN: &str = "Event Date";
pub const EVENT_DURATION_COLUMN: &str = "Event Duration";

const LEGACY_TIME_COLUMN: &str = "Time (s)";
const LEGACY_SAMPLING_COLUMN: &str = "Sampling Rate";
const LEGACY_MIN_BAND_COLUMN: &str = "Min frequency band";
const LEGACY_MAX_BAND_COLUMN: &str = "Max frequency band";
const LEGACY_STIMULATION_COLUMNS: [&str; 3] = [LEGACY_TIME_COLUMN, "Identifier", "Duration"];

/// Kind of stream held by a CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamType {
    StreamedMatrix,
    FeatureVector,
    Signal,
    Spectrum,
    CovarianceMatrix,
    Stimulations,
    #[default]
    Undefined,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamedMatrix => "StreamedMatrix",
            Self::FeatureVector => "FeatureVector",
            Self::Signal => "Signal",
            Self::Spectrum => "Spectrum",
            Self::CovarianceMatrix => "CovarianceMatrix",
            Self::Stimulations => "Stimulations",
            Self::Undefined => "Undefined",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::StreamedMatrix,
            Self::FeatureVector,
            Self::Signal,
            Self::Spectrum,
            Self::CovarianceMatrix,
            Self::Stimulations,
            Self::Undefined,
        ]
        .into_iter()
        .find(|t| t.as_str() == name)
    }

    /// Types stored as one matrix per row with an end time column
    pub fn is_matrix_like(&self) -> bool {
        matches!(
            self,
            Self::StreamedMatrix | Self::CovarianceMatrix | Self::FeatureVector
        )
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generation of the column layout a file was written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Current,
    Legacy,
}

/// Everything a header row tells about the rows below it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderLayout {
    pub stream_type: StreamType,
    pub dialect: Dialect,
    pub column_count: usize,
    pub dimension_sizes: Vec<usize>,
    pub labels: Vec<String>,
    /// Sampling rate of a signal, or the original sample count of a spectrum
    pub sampling: u64,
    pub frequency_abscissa: Vec<f64>,
}

/// Split a row into its columns. No quoting is supported.
pub fn split_columns(line: &str, separator: char) -> Vec<&str> {
    line.split(separator).collect()
}

/// Step a row-major position (last dimension fastest) to the next cell. Returns false once
/// every cell has been visited, leaving the position back at the origin.
pub fn next_position(position: &mut [usize], sizes: &[usize]) -> bool {
    for index in (0..position.len()).rev() {
        position[index] += 1;
        if position[index] < sizes[index] {
            return true;
        }
        position[index] = 0;
    }
    false
}

/// Labels of every matrix cell, in row-major order, as written in a matrix header: the label
/// of each dimension joined with the data separator. `labels` holds the labels of all
/// dimensions one after the other.
pub fn matrix_column_labels(sizes: &[usize], labels: &[String]) -> Vec<String> {
    if sizes.is_empty() || sizes.contains(&0) || labels.len() != sizes.iter().sum::<usize>() {
        return vec![];
    }
    let offsets: Vec<usize> = sizes
        .iter()
        .scan(0, |acc, size| {
            let offset = *acc;
            *acc += size;
            Some(offset)
        })
        .collect();
    let mut position = vec![0; sizes.len()];
    let mut columns = vec![];
    loop {
        let column: Vec<&str> = position
            .iter()
            .zip(&offsets)
            .map(|(index, offset)| labels[offset + index].as_str())
            .collect();
        columns.push(column.join(&DATA_SEPARATOR.to_string()));
        if !next_position(&mut position, sizes) {
            break;
        }
    }
    columns
}

pub(crate) fn wrong_header(detail: impl Into<String>) -> CsvError {
    CsvError::new(CsvErrorCode::WrongHeader, detail)
}

/// Compiled patterns of the current header layouts for one column separator
#[derive(Debug, Clone)]
pub struct HeaderClassifier {
    separator: char,
    signal: Regex,
    matrix: Regex,
    vector: Regex,
    spectrum: Regex,
    stimulations: Regex,
}

impl HeaderClassifier {
    pub fn new(separator: char) -> Result<Self, CsvError> {
        let s = regex::escape(&separator.to_string());
        let events = format!("Event Id{s}Event Date{s}Event Duration");
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| CsvError::new(CsvErrorCode::WrongParameters, e.to_string()))
        };
        Ok(Self {
            separator,
            signal: compile(format!(r"^Time:\d+Hz{s}Epoch{s}([\w\s]*{s})+{events}$"))?,
            matrix: compile(format!(
                r"^Time:\d+(x\d+)+{s}End Time{s}(([\w\s]*(:[\w\s]*)+)*{s})+{events}$"
            ))?,
            vector: compile(format!(r"^Time:\d+{s}End Time{s}([\w\s]*{s})+{events}$"))?,
            spectrum: compile(format!(
                r"^Time:\d+x\d+:\d+{s}End Time{s}([\w\s]+:(\d+|\d+\.\d+){s})+{events}$"
            ))?,
            stimulations: compile(format!("^{events}$"))?,
        })
    }

    /// Stream type and dialect of a header row, `Undefined` when no layout matches
    pub fn classify(&self, line: &str) -> (StreamType, Dialect) {
        if self.signal.is_match(line) {
            (StreamType::Signal, Dialect::Current)
        } else if self.matrix.is_match(line) {
            (StreamType::StreamedMatrix, Dialect::Current)
        } else if self.vector.is_match(line) {
            (StreamType::FeatureVector, Dialect::Current)
        } else if self.spectrum.is_match(line) {
            (StreamType::Spectrum, Dialect::Current)
        } else if self.stimulations.is_match(line) {
            (StreamType::Stimulations, Dialect::Current)
        } else {
            (classify_legacy(&split_columns(line, self.separator)), Dialect::Legacy)
        }
    }

    /// Classify a header row and extract its layout.
    ///
    /// Legacy signal and spectrum layouts keep part of their description in the data rows
    /// (sampling rate, frequency bands); the returned layout leaves those fields empty.
    pub fn parse(&self, line: &str) -> Result<HeaderLayout, CsvError> {
        let columns = split_columns(line, self.separator);
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(CsvError::new(
                CsvErrorCode::EmptyColumn,
                "No header in the file or file empty",
            ));
        }
        let (stream_type, dialect) = self.classify(line);
        let mut layout = match (stream_type, dialect) {
            (StreamType::Undefined, _) => {
                return Err(wrong_header(format!(
                    "Header \"{line}\" does not match any known layout"
                )))
            }
            (StreamType::Stimulations, _) => HeaderLayout::default(),
            (StreamType::Signal, Dialect::Current) => parse_signal(&columns)?,
            (StreamType::Spectrum, Dialect::Current) => parse_spectrum(&columns)?,
            (_, Dialect::Current) => parse_matrix(&columns)?,
            (StreamType::Signal, Dialect::Legacy) => HeaderLayout {
                dimension_sizes: vec![columns.len() - 2],
                labels: owned(&columns[1..columns.len() - 1]),
                ..Default::default()
            },
            (StreamType::Spectrum, Dialect::Legacy) => HeaderLayout {
                labels: owned(&columns[1..columns.len() - 2]),
                ..Default::default()
            },
            (_, Dialect::Legacy) => parse_legacy_matrix(&columns)?,
        };
        layout.stream_type = stream_type;
        layout.dialect = dialect;
        layout.column_count = columns.len();
        Ok(layout)
    }
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn classify_legacy(columns: &[&str]) -> StreamType {
    let count = columns.len();
    if columns.first() != Some(&LEGACY_TIME_COLUMN) || count < 2 {
        StreamType::Undefined
    } else if columns == LEGACY_STIMULATION_COLUMNS {
        StreamType::Stimulations
    } else if count >= 3 && columns[count - 1] == LEGACY_SAMPLING_COLUMN {
        StreamType::Signal
    } else if count >= 4
        && columns[count - 2] == LEGACY_MIN_BAND_COLUMN
        && columns[count - 1] == LEGACY_MAX_BAND_COLUMN
    {
        StreamType::Spectrum
    } else if columns[1..].iter().any(|c| c.contains(DATA_SEPARATOR)) {
        StreamType::StreamedMatrix
    } else {
        StreamType::FeatureVector
    }
}

fn data_columns<'a>(columns: &'a [&'a str]) -> &'a [&'a str] {
    &columns[PRE_DATA_COLUMNS..columns.len() - POST_DATA_COLUMNS]
}

fn parse_signal(columns: &[&str]) -> Result<HeaderLayout, CsvError> {
    let time = columns[0];
    let sampling = time
        .strip_prefix("Time:")
        .and_then(|rest| rest.strip_suffix("Hz"))
        .ok_or_else(|| wrong_header(format!("First column ({time}) is not well formed")))?;
    let sampling: u64 = sampling
        .parse()
        .map_err(|e| wrong_header(format!("On entry \"{sampling}\": {e}")))?;
    if columns[1] != "Epoch" {
        return Err(wrong_header(format!(
            "Second column ({}) must be Epoch column",
            columns[1]
        )));
    }
    let labels = owned(data_columns(columns));
    Ok(HeaderLayout {
        dimension_sizes: vec![labels.len()],
        labels,
        sampling,
        ..Default::default()
    })
}

fn parse_size(entry: &str, missing: &str, time: &str) -> Result<usize, CsvError> {
    if entry.is_empty() {
        return Err(wrong_header(format!(
            "First column ({time}) is not well formed, missing {missing}"
        )));
    }
    entry
        .parse()
        .map_err(|e| wrong_header(format!("On entry \"{entry}\": {e}")))
}

fn parse_spectrum(columns: &[&str]) -> Result<HeaderLayout, CsvError> {
    let time = columns[0];
    let sizes = time
        .strip_prefix("Time:")
        .ok_or_else(|| wrong_header(format!("First column ({time}) is not well formed")))?;
    let (channels, rest) = sizes.split_once(DIMENSION_SEPARATOR).unwrap_or((sizes, ""));
    let (bins, original) = rest.split_once(DATA_SEPARATOR).unwrap_or((rest, ""));
    let channels = parse_size(channels, "channels number", time)?;
    let bins = parse_size(bins, "number frequencies per channel", time)?;
    let original = parse_size(original, "original number of samples", time)?;
    if channels == 0 || bins == 0 {
        return Err(wrong_header("Dimension size must be only positive"));
    }
    if columns[1] != "End Time" {
        return Err(wrong_header(format!(
            "Second column ({}) must be End Time Column",
            columns[1]
        )));
    }
    let data = data_columns(columns);
    if data.len() != channels * bins {
        return Err(wrong_header(format!(
            "Header announces {channels}x{bins} values but has {} data columns",
            data.len()
        )));
    }

    let mut labels = vec![];
    let mut abscissa: Vec<f64> = vec![];
    for (channel, cells) in data.chunks(bins).enumerate() {
        let mut previous = f64::NEG_INFINITY;
        for (bin, cell) in cells.iter().enumerate() {
            let (name, frequency) = match cell.split(DATA_SEPARATOR).collect::<Vec<_>>()[..] {
                [name, frequency] => (name, frequency),
                _ => return Err(wrong_header(format!("Spectrum channel is invalid: {cell}"))),
            };
            if bin == 0 {
                labels.push(name.to_string());
            } else if labels[channel] != name {
                return Err(wrong_header(format!(
                    "Channel name must be the same during {bins} columns (number of frequencies per channel)"
                )));
            }
            let frequency: f64 = frequency
                .parse()
                .map_err(|e| wrong_header(format!("On entry \"{frequency}\": {e}")))?;
            if frequency < previous {
                return Err(wrong_header("Frequencies must be in ascending order"));
            }
            previous = frequency;
            if channel == 0 {
                abscissa.push(frequency);
            } else if (frequency - abscissa[bin]).abs() >= f64::EPSILON {
                return Err(wrong_header("Channels must have the same frequency bands"));
            }
        }
    }

    Ok(HeaderLayout {
        dimension_sizes: vec![channels, bins],
        labels,
        sampling: original as u64,
        frequency_abscissa: abscissa,
        ..Default::default()
    })
}

fn parse_matrix(columns: &[&str]) -> Result<HeaderLayout, CsvError> {
    let time = columns[0];
    let sizes = time
        .strip_prefix("Time:")
        .ok_or_else(|| wrong_header(format!("First column {time} is not well formed")))?;
    let mut dimension_sizes = vec![];
    for size in sizes.split(DIMENSION_SEPARATOR) {
        let size: usize = size
            .parse()
            .map_err(|e| wrong_header(format!("Error on a dimension size: {e}")))?;
        if size == 0 {
            return Err(wrong_header("A dimension size must be strictly positive"));
        }
        dimension_sizes.push(size);
    }
    let cell_count: usize = dimension_sizes.iter().product();
    if cell_count + PRE_DATA_COLUMNS + POST_DATA_COLUMNS != columns.len() {
        return Err(wrong_header(format!(
            "Every line must have {} columns",
            cell_count + PRE_DATA_COLUMNS + POST_DATA_COLUMNS
        )));
    }

    // Every cell repeats the labels of its row and column; they must agree everywhere
    let dimension_count = dimension_sizes.len();
    let mut labels: Vec<Vec<Option<String>>> =
        dimension_sizes.iter().map(|size| vec![None; *size]).collect();
    let mut position = vec![0; dimension_count];
    for (index, cell) in data_columns(columns).iter().enumerate() {
        let parts: Vec<&str> = cell.split(DATA_SEPARATOR).collect();
        if parts.len() != dimension_count {
            return Err(wrong_header(format!(
                "On column {} ({cell}), there is {} label instead of {dimension_count}",
                index + PRE_DATA_COLUMNS,
                parts.len()
            )));
        }
        for (dimension, part) in parts.iter().enumerate() {
            match &labels[dimension][position[dimension]] {
                Some(existing) if existing != part => {
                    return Err(wrong_header(format!(
                        "Error at column {} for the label \"{part}\" in dimension {}: label was already set to \"{existing}\"",
                        index + 1,
                        dimension + 1
                    )))
                }
                Some(_) => (),
                None => labels[dimension][position[dimension]] = Some(part.to_string()),
            }
        }
        next_position(&mut position, &dimension_sizes);
    }

    Ok(HeaderLayout {
        dimension_sizes,
        labels: labels.into_iter().flatten().map(Option::unwrap_or_default).collect(),
        ..Default::default()
    })
}

/// Legacy matrices only name their cells (`A:X`, `A:Y`, `B:X`...), the sizes are inferred
/// from the distinct labels of each dimension in order of appearance
fn parse_legacy_matrix(columns: &[&str]) -> Result<HeaderLayout, CsvError> {
    let cells = &columns[1..];
    if !cells.iter().any(|c| c.contains(DATA_SEPARATOR)) {
        return Ok(HeaderLayout {
            dimension_sizes: vec![cells.len()],
            labels: owned(cells),
            ..Default::default()
        });
    }

    let parts: Vec<Vec<&str>> = cells
        .iter()
        .map(|c| c.split(DATA_SEPARATOR).collect())
        .collect();
    let dimension_count = parts[0].len();
    if parts.iter().any(|p| p.len() != dimension_count) {
        return Err(wrong_header(
            "Every column must carry the same number of labels",
        ));
    }

    let mut seen: Vec<FxHashMap<&str, usize>> = vec![FxHashMap::default(); dimension_count];
    let mut dimension_labels: Vec<Vec<String>> = vec![vec![]; dimension_count];
    for cell in parts.iter() {
        for (dimension, label) in cell.iter().enumerate() {
            if !seen[dimension].contains_key(label) {
                seen[dimension].insert(label, dimension_labels[dimension].len());
                dimension_labels[dimension].push(label.to_string());
            }
        }
    }
    let dimension_sizes: Vec<usize> = dimension_labels.iter().map(Vec::len).collect();
    let labels: Vec<String> = dimension_labels.into_iter().flatten().collect();

    if matrix_column_labels(&dimension_sizes, &labels) != cells {
        return Err(wrong_header(format!(
            "Labels do not describe a complete {} matrix",
            dimension_sizes
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join("x")
        )));
    }

    Ok(HeaderLayout {
        dimension_sizes,
        labels,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HeaderClassifier {
        HeaderClassifier::new(',').unwrap()
    }

    #[test]
    fn test_classify_current_layouts() {
        let c = classifier();
        let cases = [
            (
                "Time:8Hz,Epoch,O1,O2,Event Id,Event Date,Event Duration",
                StreamType::Signal,
            ),
            (
                "Time:2x2,End Time,A:X,A:Y,B:X,B:Y,Event Id,Event Date,Event Duration",
                StreamType::StreamedMatrix,
            ),
            (
                "Time:3,End Time,F1,F2,F3,Event Id,Event Date,Event Duration",
                StreamType::FeatureVector,
            ),
            (
                "Time:1x2:128,End Time,O1:0.000000,O1:1.000000,Event Id,Event Date,Event Duration",
                StreamType::Spectrum,
            ),
            ("Event Id,Event Date,Event Duration", StreamType::Stimulations),
        ];
        for (line, expected) in cases {
            assert_eq!(c.classify(line), (expected, Dialect::Current), "{line}");
        }
        assert_eq!(
            c.classify("Time:8Hz,O1,O2").0,
            StreamType::Undefined
        );
    }

    #[test]
    fn test_classify_legacy_layouts() {
        let c = classifier();
        assert_eq!(
            c.classify("Time (s),C3,C4,Sampling Rate"),
            (StreamType::Signal, Dialect::Legacy)
        );
        assert_eq!(
            c.classify("Time (s),C3,Min frequency band,Max frequency band"),
            (StreamType::Spectrum, Dialect::Legacy)
        );
        assert_eq!(
            c.classify("Time (s),Identifier,Duration"),
            (StreamType::Stimulations, Dialect::Legacy)
        );
        assert_eq!(
            c.classify("Time (s),L1:A,L1:B"),
            (StreamType::StreamedMatrix, Dialect::Legacy)
        );
        assert_eq!(
            c.classify("Time (s),F1,F2"),
            (StreamType::FeatureVector, Dialect::Legacy)
        );
    }

    #[test]
    fn test_matrix_labels() {
        let layout = classifier()
            .parse("Time:2x2x2,End Time,LA:1:X,LA:1:Y,LA:2:X,LA:2:Y,LB:1:X,LB:1:Y,LB:2:X,LB:2:Y,Event Id,Event Date,Event Duration")
            .unwrap();
        assert_eq!(layout.dimension_sizes, vec![2, 2, 2]);
        assert_eq!(layout.labels, vec!["LA", "LB", "1", "2", "X", "Y"]);
        assert_eq!(layout.column_count, 13);

        let layout = classifier()
            .parse("Time:2x2,End Time,:,:,:,:,Event Id,Event Date,Event Duration")
            .unwrap();
        assert_eq!(layout.labels, vec!["", "", "", ""]);
    }

    #[test]
    fn test_matrix_label_reset() {
        match classifier().parse("Time:1x2,End Time,A:X,B:Y,Event Id,Event Date,Event Duration") {
            Err(e) => assert_eq!(e.code, CsvErrorCode::WrongHeader),
            Ok(_) => panic!("Conflicting labels were accepted"),
        }
    }

    #[test]
    fn test_spectrum_header() {
        let layout = classifier()
            .parse("Time:2x2:128,End Time,O1:0.000000,O1:2.500000,O2:0.000000,O2:2.500000,Event Id,Event Date,Event Duration")
            .unwrap();
        assert_eq!(layout.dimension_sizes, vec![2, 2]);
        assert_eq!(layout.labels, vec!["O1", "O2"]);
        assert_eq!(layout.frequency_abscissa, vec![0.0, 2.5]);
        assert_eq!(layout.sampling, 128);

        assert!(classifier()
            .parse("Time:2x2:128,End Time,O1:0.000000,O1:2.500000,O2:0.000000,O2:3.000000,Event Id,Event Date,Event Duration")
            .is_err());
    }

    #[test]
    fn test_legacy_matrix_sizes_are_inferred() {
        let layout = classifier().parse("Time (s),L1:A,L1:B,L1:C,L1:D").unwrap();
        assert_eq!(layout.stream_type, StreamType::StreamedMatrix);
        assert_eq!(layout.dialect, Dialect::Legacy);
        assert_eq!(layout.dimension_sizes, vec![1, 4]);
        assert_eq!(layout.labels, vec!["L1", "A", "B", "C", "D"]);

        // A label repeated beyond what the inferred sizes allow
        assert!(classifier().parse("Time (s),L1:A,L1:B,L2:A,L1:A").is_err());
    }

    #[test]
    fn test_column_labels_round_trip_positions() {
        let labels: Vec<String> = ["A", "B", "X", "Y", "Z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            matrix_column_labels(&[2, 3], &labels),
            vec!["A:X", "A:Y", "A:Z", "B:X", "B:Y", "B:Z"]
        );
    }

    #[test]
    fn test_other_separator() {
        let c = HeaderClassifier::new(';').unwrap();
        assert_eq!(
            c.classify("Time:8Hz;Epoch;O1;Event Id;Event Date;Event Duration").0,
            StreamType::Signal
        );
    }
}
