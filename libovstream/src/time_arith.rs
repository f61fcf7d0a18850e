//! Fixed-point time used by binary streams: unsigned 64 bit values where the upper 32 bits
//! are whole seconds and the lower 32 bits the fraction of a second.

const ONE_SECOND: u64 = 1 << 32;

/// Convert seconds to fixed-point time. Negative and NaN inputs saturate to 0.
pub fn seconds_to_time(seconds: f64) -> u64 {
    if seconds.is_nan() || seconds <= 0.0 {
        return 0;
    }
    (seconds * ONE_SECOND as f64).round() as u64
}

pub fn time_to_seconds(time: u64) -> f64 {
    time as f64 / ONE_SECOND as f64
}

/// Time at which the sample of the given index starts
pub fn sample_count_to_time(sampling_rate: u64, sample_count: u64) -> u64 {
    if sampling_rate == 0 {
        return 0;
    }
    ((sample_count as u128 * ONE_SECOND as u128) / sampling_rate as u128) as u64
}

/// Number of whole samples elapsed at the given time
pub fn time_to_sample_count(sampling_rate: u64, time: u64) -> u64 {
    ((time as u128 * sampling_rate as u128) / ONE_SECOND as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(seconds_to_time(1.0), 1 << 32);
        assert_eq!(seconds_to_time(0.5), 1 << 31);
        assert_eq!(seconds_to_time(-3.0), 0);
        assert_eq!(time_to_seconds(3 << 31), 1.5);
    }

    #[test]
    fn test_sample_conversion() {
        assert_eq!(sample_count_to_time(8, 8), 1 << 32);
        assert_eq!(sample_count_to_time(8, 2), 1 << 30);
        assert_eq!(time_to_sample_count(512, 1 << 32), 512);
        assert_eq!(sample_count_to_time(0, 10), 0);
    }
}
