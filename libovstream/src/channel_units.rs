use super::channel_localisation::{
    DynamicMatrix, DynamicMatrixDecoder, DynamicMatrixEncoder, DynamicNodes,
};
use super::constants::*;
use super::error::MatrixError;

pub type ChannelUnits = DynamicMatrix;

const UNITS_NODES: DynamicNodes = DynamicNodes::new(
    NODE_HEADER_CHANNEL_UNITS,
    NODE_HEADER_CHANNEL_UNITS_DYNAMIC,
);

impl DynamicMatrix {
    /// Channel units: one row per channel, columns unit and factor
    pub fn channel_units(channel_names: &[String]) -> Result<Self, MatrixError> {
        Self::with_columns(channel_names, &["Unit", "Factor"])
    }
}

impl DynamicMatrixEncoder {
    pub fn channel_units() -> Self {
        Self::with_nodes(UNITS_NODES)
    }
}

impl DynamicMatrixDecoder {
    pub fn channel_units() -> Self {
        Self::with_nodes(UNITS_NODES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};
    use crate::error::CodecError;

    #[test]
    fn test_channel_units_stream() {
        let names = vec!["EMG".to_string()];
        let mut units = DynamicMatrix::channel_units(&names).unwrap();
        units.matrix.set_buffer(&[1.0, -6.0]).unwrap();

        let mut encoder = Encoder::new(DynamicMatrixEncoder::channel_units());
        let mut decoder = Decoder::new(DynamicMatrixDecoder::channel_units());
        decoder
            .decode(&encoder.encode_header(&units).unwrap())
            .unwrap();
        decoder
            .decode(&encoder.encode_buffer(&units).unwrap())
            .unwrap();
        assert_eq!(decoder.output(), &units);
        assert!(!decoder.output().dynamic);
    }

    #[test]
    fn test_units_and_localisation_are_distinct() {
        let units = DynamicMatrix::channel_units(&["EMG".to_string()]).unwrap();
        let mut encoder = Encoder::new(DynamicMatrixEncoder::channel_units());
        let header = encoder.encode_header(&units).unwrap();

        // The units node is unknown to a localisation decoder and skipped, so the flag is
        // never seen; the shared matrix part still decodes
        let mut decoder = Decoder::new(DynamicMatrixDecoder::channel_localisation());
        let result: Result<_, CodecError> = decoder.decode(&header);
        assert!(result.is_ok());
        assert_eq!(decoder.output().matrix.dimension_sizes(), &[1, 2]);
    }
}
