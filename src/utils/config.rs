use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use crate::utils::error::{Error, Result};

/// Construction-time parameters threaded through every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Width of the identifier space; ids live in `[0, 2^m)`.
    pub m: u32,
    /// Number of replicas kept beyond the primary copy.
    pub replication: usize,
    /// Recency cache capacity.
    pub cache_size: usize,
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
    pub check_predecessor_interval: Duration,
    pub replicate_interval: Duration,
    /// Upper bound on dialing a peer and on a single cross-node call.
    pub call_timeout: Duration,
    /// Directory holding the per-node snapshot files.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            m: 32,
            replication: 2,
            cache_size: 5,
            stabilize_interval: Duration::from_secs(1),
            fix_fingers_interval: Duration::from_secs(1),
            check_predecessor_interval: Duration::from_secs(1),
            replicate_interval: Duration::from_secs(5),
            call_timeout: Duration::from_secs(2),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Loads overrides from an INI file; keys not present keep their
    /// defaults.
    pub fn from_ini(path: &Path) -> Result<Config> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Config::default();

        if let Some(ring) = ini.section(Some("ring")) {
            if let Some(value) = ring.get("m") {
                config.m = parse(value, "ring.m")?;
            }
            if let Some(value) = ring.get("replication") {
                config.replication = parse(value, "ring.replication")?;
            }
        }
        if let Some(cache) = ini.section(Some("cache")) {
            if let Some(value) = cache.get("size") {
                config.cache_size = parse(value, "cache.size")?;
            }
        }
        if let Some(timing) = ini.section(Some("timing")) {
            if let Some(value) = timing.get("stabilize_ms") {
                config.stabilize_interval = Duration::from_millis(parse(value, "timing.stabilize_ms")?);
            }
            if let Some(value) = timing.get("fix_fingers_ms") {
                config.fix_fingers_interval =
                    Duration::from_millis(parse(value, "timing.fix_fingers_ms")?);
            }
            if let Some(value) = timing.get("check_predecessor_ms") {
                config.check_predecessor_interval =
                    Duration::from_millis(parse(value, "timing.check_predecessor_ms")?);
            }
            if let Some(value) = timing.get("replicate_ms") {
                config.replicate_interval = Duration::from_millis(parse(value, "timing.replicate_ms")?);
            }
            if let Some(value) = timing.get("call_timeout_ms") {
                config.call_timeout = Duration::from_millis(parse(value, "timing.call_timeout_ms")?);
            }
        }
        if let Some(storage) = ini.section(Some("storage")) {
            if let Some(dir) = storage.get("data_dir") {
                config.data_dir = PathBuf::from(dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// The arithmetic holds `id + 2^(m-1)` in a u64, which caps m at 63.
    pub fn validate(&self) -> Result<()> {
        if self.m == 0 || self.m > 63 {
            return Err(Error::Config(format!("ring width m={} outside 1..=63", self.m)));
        }
        Ok(())
    }

    /// 2^m, the size of the identifier space.
    pub fn ring_size(&self) -> u64 {
        1u64 << self.m
    }
}

fn parse<T: FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, key)))
}
