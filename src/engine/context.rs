#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound on protocol headers per scan, payload record excluded.
    pub max_headers: usize,
    /// Append a payload pseudo-record for bytes no binding claimed.
    pub emit_payload: bool,
}

/// Header instances are numbered with a `u16`, so no scan commits more
/// headers than this.
pub const MAX_HEADERS: usize = u16::MAX as usize;

impl ScanConfig {
    /// `max_headers`, capped at [`MAX_HEADERS`].
    pub fn header_limit(&self) -> usize {
        self.max_headers.min(MAX_HEADERS)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_headers: 32,
            emit_payload: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_HEADERS, ScanConfig};

    #[test]
    fn header_limit_fits_instance_numbers() {
        assert_eq!(ScanConfig::default().header_limit(), 32);

        let unbounded = ScanConfig {
            max_headers: usize::MAX,
            ..ScanConfig::default()
        };
        assert_eq!(unbounded.header_limit(), MAX_HEADERS);
        assert!(u16::try_from(unbounded.header_limit() - 1).is_ok());
    }
}
