use std::fmt;
use std::time::Duration;

/// Capture timestamp, microseconds since the Unix epoch.
///
/// Assembly clocks are driven by these values rather than wall-clock time so
/// offline captures reprocess deterministically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    /// Builds a timestamp from the seconds/microseconds pair capture
    /// headers carry.
    pub const fn from_parts(secs: u32, micros: u32) -> Self {
        Self((secs as u64) * 1_000_000 + micros as u64)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }

    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PacketMetadata {
    pub timestamp: Timestamp,
    /// Length of the packet on the wire; may exceed the captured bytes.
    pub wire_length: Option<usize>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Timestamp;

    #[test]
    fn timestamp_arithmetic_saturates() {
        let ts = Timestamp::from_parts(10, 250_000);
        assert_eq!(ts.as_micros(), 10_250_000);
        assert_eq!(ts.to_string(), "10.250000");

        let later = ts.saturating_add(Duration::from_millis(750));
        assert_eq!(later, Timestamp::from_secs(11));
        assert_eq!(later.saturating_since(ts), Duration::from_millis(750));
        assert_eq!(ts.saturating_since(later), Duration::ZERO);
        assert_eq!(
            Timestamp::from_micros(u64::MAX).saturating_add(Duration::from_secs(1)),
            Timestamp::from_micros(u64::MAX)
        );
    }
}
