use std::{
    ops::Sub,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Seconds between 01.01.1900 (NTP era 0) and 01.01.1970
const UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// Wall clock time in the 32.32 fixed point format used by RTCP sender reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    pub const ZERO: Self = Self(0);

    pub fn now() -> Self {
        let since_unix_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self::from_duration(since_unix_epoch + Duration::from_secs(UNIX_OFFSET_SECS))
    }

    fn from_duration(duration: Duration) -> Self {
        let fraction = (u64::from(duration.subsec_nanos()) << 32) / 1_000_000_000;

        Self((duration.as_secs() << 32) | fraction)
    }

    pub fn as_seconds_f64(self) -> f64 {
        self.0 as f64 / (1u64 << 32) as f64
    }

    pub fn to_fixed_u64(self) -> u64 {
        self.0
    }

    pub fn from_fixed_u64(fixed: u64) -> Self {
        Self(fixed)
    }

    /// Middle 32 bits, the compact form used for LSR & DLSR in report blocks
    pub fn to_fixed_u32(self) -> u32 {
        (self.0 >> 16) as u32
    }

    pub fn from_fixed_u32(compact: u32) -> Self {
        Self(u64::from(compact) << 16)
    }
}

impl Sub for NtpTimestamp {
    type Output = time::Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        let units = i128::from(self.0) - i128::from(rhs.0);

        time::Duration::nanoseconds(((units * 1_000_000_000) >> 32) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_conversion() {
        let ts = NtpTimestamp::from_fixed_u64((3_900_000_000 << 32) | 0x8000_0000);
        assert!((ts.as_seconds_f64() - 3_900_000_000.5).abs() < 0.001);

        let compact = ts.to_fixed_u32();
        assert_eq!(compact, ((3_900_000_000u32 & 0xFFFF) << 16) | 0x8000);
        assert_eq!(NtpTimestamp::from_fixed_u32(compact).to_fixed_u32(), compact);
    }

    #[test]
    fn difference() {
        let a = NtpTimestamp::from_fixed_u64(10 << 32);
        let b = NtpTimestamp::from_fixed_u64((11 << 32) | 0x8000_0000);

        assert_eq!(b - a, time::Duration::milliseconds(1500));
        assert_eq!(a - b, time::Duration::milliseconds(-1500));
        assert_eq!(a - NtpTimestamp::ZERO, time::Duration::seconds(10));
    }

    #[test]
    fn now_is_after_2020() {
        // 2020-01-01 in NTP seconds
        assert!(NtpTimestamp::now().as_seconds_f64() > 3_786_825_600.0);
    }
}
