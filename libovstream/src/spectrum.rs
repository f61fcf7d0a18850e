use super::codec::{Phase, StreamDecoder, StreamEncoder};
use super::constants::*;
use super::ebml::{decode_double, decode_uint};
use super::ebml_writer::EbmlWriter;
use super::error::CodecError;
use super::matrix::Matrix;
use super::streamed_matrix::{MatrixLayer, StreamedMatrixEncoder};

/// A spectrum: dimension 0 of the matrix is the channel, dimension 1 the frequency bin. Each
/// bin has one frequency abscissa (Hz).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub matrix: Matrix,
    pub sampling_rate: u64,
    pub frequency_abscissa: Vec<f64>,
}

impl Spectrum {
    pub fn new(matrix: Matrix, sampling_rate: u64, frequency_abscissa: Vec<f64>) -> Self {
        Self {
            matrix,
            sampling_rate,
            frequency_abscissa,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.matrix.dimension_size(1).unwrap_or(0)
    }
}

/// Representative abscissa of each of the legacy (lower, upper) frequency bands.
///
/// Abscissas are spread linearly from the lower bound of the first band to the upper bound of
/// the last one.
pub fn abscissa_from_bands(bands: &[(f64, f64)]) -> Vec<f64> {
    let (first, last) = match (bands.first(), bands.last()) {
        (Some(first), Some(last)) => (first.0, last.1),
        _ => return Vec::new(),
    };
    if bands.len() == 1 {
        return vec![first];
    }
    let step = (last - first) / (bands.len() - 1) as f64;
    (0..bands.len()).map(|k| first + k as f64 * step).collect()
}

#[derive(Debug, Default)]
pub struct SpectrumEncoder {
    matrix: StreamedMatrixEncoder,
}

impl StreamEncoder for SpectrumEncoder {
    type Input = Spectrum;

    fn write_header(
        &mut self,
        writer: &mut EbmlWriter,
        input: &Spectrum,
    ) -> Result<(), CodecError> {
        if input.frequency_abscissa.len() != input.bin_count() {
            return Err(CodecError::AbscissaCount {
                abscissas: input.frequency_abscissa.len(),
                bins: input.bin_count(),
            });
        }
        writer.open_child(NODE_HEADER_SPECTRUM)?;
        writer.write_uint(NODE_HEADER_SPECTRUM_SAMPLING, input.sampling_rate)?;
        for abscissa in input.frequency_abscissa.iter() {
            writer.write_double(NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA, *abscissa)?;
        }
        writer.close_child()?;
        self.matrix.header(writer, &input.matrix)
    }

    fn write_buffer(
        &mut self,
        writer: &mut EbmlWriter,
        input: &Spectrum,
    ) -> Result<(), CodecError> {
        self.matrix.buffer(writer, &input.matrix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SpectrumSection {
    #[default]
    Outside,
    Spectrum,
    Band,
}

/// Decoder of spectrum streams. Accepts both the abscissa encoding and the legacy frequency
/// band encoding of the bins.
#[derive(Debug, Default)]
pub struct SpectrumDecoder {
    matrix: MatrixLayer,
    section: SpectrumSection,
    sampling_seen: bool,
    bands: Vec<(f64, f64)>,
    spectrum: Spectrum,
}

impl SpectrumDecoder {
    fn unexpected(&self, id: u64) -> CodecError {
        CodecError::UnexpectedNode {
            node: id,
            parent: match self.section {
                SpectrumSection::Outside => NODE_HEADER,
                SpectrumSection::Spectrum => NODE_HEADER_SPECTRUM,
                SpectrumSection::Band => NODE_HEADER_SPECTRUM_FREQUENCY_BAND,
            },
        }
    }

    /// Turn legacy bands into abscissas and check the bin count
    fn finish_header(&mut self) -> Result<(), CodecError> {
        if !self.bands.is_empty() && self.spectrum.frequency_abscissa.is_empty() {
            spdlog::debug!(
                "Spectrum stream uses legacy frequency bands; rebuilding {} abscissas",
                self.bands.len()
            );
            self.spectrum.frequency_abscissa = abscissa_from_bands(&self.bands);
            if !self.sampling_seen {
                let last_upper = self.bands.last().map(|b| b.1).unwrap_or(0.0);
                self.spectrum.sampling_rate = (last_upper * 2.0).round() as u64;
            }
        }
        let bins = self.spectrum.bin_count();
        if self.spectrum.frequency_abscissa.len() != bins {
            return Err(CodecError::AbscissaCount {
                abscissas: self.spectrum.frequency_abscissa.len(),
                bins,
            });
        }
        Ok(())
    }
}

impl StreamDecoder for SpectrumDecoder {
    type Output = Spectrum;

    fn is_master_child(&self, id: u64) -> Option<bool> {
        match id {
            NODE_HEADER_SPECTRUM | NODE_HEADER_SPECTRUM_FREQUENCY_BAND => Some(true),
            NODE_HEADER_SPECTRUM_SAMPLING
            | NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA
            | NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START
            | NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP => Some(false),
            _ => self.matrix.is_master_child(id),
        }
    }

    fn open_child(&mut self, id: u64) -> Result<(), CodecError> {
        match (self.section, id) {
            (SpectrumSection::Outside, NODE_HEADER_SPECTRUM) => {
                self.section = SpectrumSection::Spectrum
            }
            (SpectrumSection::Spectrum, NODE_HEADER_SPECTRUM_SAMPLING)
            | (SpectrumSection::Spectrum, NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA) => (),
            (SpectrumSection::Spectrum, NODE_HEADER_SPECTRUM_FREQUENCY_BAND) => {
                self.bands.push((0.0, 0.0));
                self.section = SpectrumSection::Band;
            }
            (SpectrumSection::Band, NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START)
            | (SpectrumSection::Band, NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP) => (),
            (
                _,
                NODE_HEADER_SPECTRUM
                | NODE_HEADER_SPECTRUM_SAMPLING
                | NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA
                | NODE_HEADER_SPECTRUM_FREQUENCY_BAND
                | NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START
                | NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP,
            ) => return Err(self.unexpected(id)),
            _ => return self.matrix.open_child(id),
        }
        Ok(())
    }

    fn process_child_data(&mut self, id: u64, data: &[u8]) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_SPECTRUM_SAMPLING => {
                self.spectrum.sampling_rate = decode_uint(data)?;
                self.sampling_seen = true;
            }
            NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA => {
                self.spectrum.frequency_abscissa.push(decode_double(data)?);
            }
            NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START => {
                if let Some(band) = self.bands.last_mut() {
                    band.0 = decode_double(data)?;
                }
            }
            NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP => {
                if let Some(band) = self.bands.last_mut() {
                    band.1 = decode_double(data)?;
                }
            }
            _ => {
                return self
                    .matrix
                    .process_child_data(id, data, &mut self.spectrum.matrix)
            }
        }
        Ok(())
    }

    fn close_child(&mut self, id: u64) -> Result<(), CodecError> {
        match id {
            NODE_HEADER_SPECTRUM => self.section = SpectrumSection::Outside,
            NODE_HEADER_SPECTRUM_FREQUENCY_BAND => self.section = SpectrumSection::Spectrum,
            NODE_HEADER_SPECTRUM_SAMPLING
            | NODE_HEADER_SPECTRUM_FREQUENCY_ABSCISSA
            | NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START
            | NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP => (),
            _ => return self.matrix.close_child(id, &mut self.spectrum.matrix),
        }
        Ok(())
    }

    fn begin_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.section = SpectrumSection::Outside;
        if phase == Phase::Header {
            self.sampling_seen = false;
            self.bands.clear();
            self.spectrum.frequency_abscissa.clear();
        }
        self.matrix.begin_phase(phase);
        Ok(())
    }

    fn end_phase(&mut self, phase: Phase) -> Result<(), CodecError> {
        self.matrix.end_phase();
        if phase == Phase::Header {
            self.finish_header()?;
        }
        Ok(())
    }

    fn output(&self) -> &Spectrum {
        &self.spectrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};

    fn spectrum() -> Spectrum {
        let mut matrix = Matrix::with_dimensions(&[2, 3]);
        matrix
            .set_dimension_labels(0, &["C3".to_string(), "C4".to_string()])
            .unwrap();
        Spectrum::new(matrix, 256, vec![0.0, 64.0, 128.0])
    }

    /// Header written with the legacy band encoding of the same three bins
    fn legacy_header(with_sampling: bool) -> Vec<u8> {
        let mut writer = EbmlWriter::new();
        writer.open_child(NODE_HEADER).unwrap();
        writer.open_child(NODE_HEADER_SPECTRUM).unwrap();
        if with_sampling {
            writer.write_uint(NODE_HEADER_SPECTRUM_SAMPLING, 256).unwrap();
        }
        for (start, stop) in [(0.0, 40.0), (40.0, 90.0), (90.0, 128.0)] {
            writer.open_child(NODE_HEADER_SPECTRUM_FREQUENCY_BAND).unwrap();
            writer
                .write_double(NODE_HEADER_SPECTRUM_FREQUENCY_BAND_START, start)
                .unwrap();
            writer
                .write_double(NODE_HEADER_SPECTRUM_FREQUENCY_BAND_STOP, stop)
                .unwrap();
            writer.close_child().unwrap();
        }
        writer.close_child().unwrap();
        StreamedMatrixEncoder::default()
            .header(&mut writer, &spectrum().matrix)
            .unwrap();
        writer.close_child().unwrap();
        writer.take_output().unwrap()
    }

    #[test]
    fn test_spectrum_stream() {
        let spectrum = spectrum();
        let mut encoder = Encoder::new(SpectrumEncoder::default());
        let mut decoder = Decoder::new(SpectrumDecoder::default());
        decoder
            .decode(&encoder.encode_header(&spectrum).unwrap())
            .unwrap();
        decoder
            .decode(&encoder.encode_buffer(&spectrum).unwrap())
            .unwrap();
        assert_eq!(decoder.output(), &spectrum);
    }

    #[test]
    fn test_legacy_bands_match_abscissas() {
        let mut decoder = Decoder::new(SpectrumDecoder::default());
        decoder.decode(&legacy_header(true)).unwrap();
        let decoded = decoder.output();
        assert_eq!(decoded.sampling_rate, 256);
        for (found, expected) in decoded
            .frequency_abscissa
            .iter()
            .zip(spectrum().frequency_abscissa.iter())
        {
            assert!((found - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_legacy_sampling_from_last_band() {
        let mut decoder = Decoder::new(SpectrumDecoder::default());
        decoder.decode(&legacy_header(false)).unwrap();
        assert_eq!(decoder.output().sampling_rate, 256);
        assert_eq!(decoder.output().frequency_abscissa.len(), 3);
    }

    #[test]
    fn test_abscissa_count_checked() {
        let mut bad = spectrum();
        bad.frequency_abscissa.pop();
        let mut encoder = Encoder::new(SpectrumEncoder::default());
        assert_eq!(
            encoder.encode_header(&bad),
            Err(CodecError::AbscissaCount {
                abscissas: 2,
                bins: 3
            })
        );
    }

    #[test]
    fn test_abscissa_from_single_band() {
        assert_eq!(abscissa_from_bands(&[(8.0, 12.0)]), vec![8.0]);
        assert!(abscissa_from_bands(&[]).is_empty());
    }
}
