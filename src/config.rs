use std::path::PathBuf;
use std::time::Duration;

/// Immutable service configuration, constructed once at startup. Tests
/// build their own values instead of mutating a global.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub root_dir: PathBuf,
    /// Upload sessions older than this are expired by the reaper.
    pub upload_timeout: Duration,
    /// Interval between reaper sweeps.
    pub cleanup_interval: Duration,
    /// Blobs younger than this survive a GC sweep even when unreferenced.
    pub gc_min_age: Duration,
    pub pagination: Pagination,
}

#[derive(Clone, Copy, Debug)]
pub struct Pagination {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 15000,
            root_dir: PathBuf::from("./data"),
            upload_timeout: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            gc_min_age: Duration::from_secs(3600),
            pagination: Pagination::default(),
        }
    }
}

impl Pagination {
    /// Resolves a client-supplied `n`: invalid or non-positive values fall
    /// back to the default, oversized values clamp to the maximum.
    pub fn resolve_limit(&self, n: Option<&str>) -> usize {
        n.and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .map(|v| v.min(self.max_limit))
            .unwrap_or(self.default_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::absent(None, 100)]
    #[case::normal(Some("25"), 25)]
    #[case::zero(Some("0"), 100)]
    #[case::negative(Some("-3"), 100)]
    #[case::garbage(Some("lots"), 100)]
    #[case::clamped(Some("5000"), 1000)]
    fn limit_resolution(#[case] n: Option<&str>, #[case] expected: usize) {
        assert_eq!(Pagination::default().resolve_limit(n), expected);
    }
}
