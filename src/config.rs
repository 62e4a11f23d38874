//! Fabric configuration.
//!
//! This module holds the parameters of a k-ary-n-tree, the YAML loader for
//! them, and the validation that has to pass before a topology is built.

use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Max ports per switch in the generated topology.
///
/// OmniPath switches offer up to 48 ports, Oracle EDR switches 38 and
/// Mellanox switches 36. Anything that needs more is not buildable.
pub const MAX_SWITCH_PORTS: u32 = 48;

/// Highest supported oversubscription ratio
pub const MAX_OVERSUBSCRIPTION: u32 = 4;

/// Link speed label written on every port line unless configured otherwise
pub const DEFAULT_LINK_SPEED: &str = "4xEDR";

/// Node GUID of the first host adapter
pub const HCA_GUID_BASE: u64 = 0x100_0000;
/// Port GUID of the first host adapter port
pub const PORT_GUID_BASE: u64 = HCA_GUID_BASE + GUID_RANGE_SIZE;
/// Node GUID of the first switch
pub const SWITCH_GUID_BASE: u64 = PORT_GUID_BASE + GUID_RANGE_SIZE;
/// Width of each GUID range; no kind may allocate more entities than this
pub const GUID_RANGE_SIZE: u64 = 0x100_0000;

/// Match: "4xEDR", "1xSDR", "12xFDR10"
static LINK_SPEED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(1|4|8|12)x(SDR|DDR|QDR|FDR10|FDR|EDR|HDR|NDR)$")
        .expect("Invalid link speed regex")
});

/// Errors raised while assembling or validating a fabric configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid log level: {0}. Log level must be one of CRITICAL, ERROR, WARNING, INFO, DEBUG")]
    InvalidLogLevel(String),

    #[error("{required} ports are needed per switch, but the max allowed ports per switch are {max}")]
    TooManyPorts { required: u64, max: u32 },

    #[error("k (half the ports of each switch) must be at least 1, got {0}")]
    InvalidHalfPorts(u32),

    #[error("n (number of tree levels) must be at least 1, got {0}")]
    InvalidLevels(u32),

    #[error("Oversubscription must be between 1 and {max}, got {value}")]
    InvalidOversubscription { value: u32, max: u32 },

    #[error("Fully connected root switches need at least 2 tree levels, got {0}")]
    RootDoublingNeedsLevels(u32),

    #[error("Topology is too large: {0}")]
    TooLarge(String),

    #[error("Invalid link speed '{0}', expected something like 4xEDR")]
    InvalidLinkSpeed(String),

    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Parameters of a k-ary-n-tree fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Half the number of ports of each switch
    #[serde(default)]
    pub k: u32,
    /// Number of levels in the tree
    #[serde(default)]
    pub n: u32,
    /// Host-facing to up-facing port ratio on the leaf switches
    #[serde(default = "default_oversubscription")]
    pub oversubscription: u32,
    /// Mirror a second subtree onto the free ports of the root switches
    #[serde(default)]
    pub fully_connected_roots: bool,
    /// Label written at the end of every port line
    #[serde(default = "default_link_speed")]
    pub link_speed: String,
}

fn default_oversubscription() -> u32 {
    1
}

fn default_link_speed() -> String {
    DEFAULT_LINK_SPEED.to_string()
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            k: 0,
            n: 0,
            oversubscription: default_oversubscription(),
            fully_connected_roots: false,
            link_speed: default_link_speed(),
        }
    }
}

/// Values given on the command line, applied on top of a loaded file
#[derive(Debug, Clone, Default)]
pub struct FabricOverrides {
    pub k: Option<u32>,
    pub n: Option<u32>,
    pub oversubscription: Option<u32>,
    pub fully_connected_roots: bool,
    pub link_speed: Option<String>,
}

/// Quantities derived from a validated [`FabricConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FabricDimensions {
    /// Switches on each tree level, `k^(n-1)`
    pub switches_per_row: usize,
    /// Number of switch rows, `n` or `2n - 1` with root doubling
    pub total_rows: usize,
    pub total_switches: usize,
    pub total_hosts: usize,
    /// `k + k * oversubscription`
    pub ports_per_switch: usize,
}

impl FabricConfig {
    /// Create a configuration with the default link speed
    pub fn new(k: u32, n: u32, oversubscription: u32, fully_connected_roots: bool) -> Self {
        Self {
            k,
            n,
            oversubscription,
            fully_connected_roots,
            link_speed: default_link_speed(),
        }
    }

    /// Load a configuration from a YAML file.
    ///
    /// Missing fields take their defaults; `k` and `n` default to 0 so that
    /// validation rejects them unless the command line supplies them.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        info!("Loading fabric configuration from: {:?}", path);

        let file = File::open(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: FabricConfig =
            serde_yaml::from_reader(file).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Apply command-line values on top of this configuration
    pub fn apply_overrides(&mut self, overrides: &FabricOverrides) {
        if let Some(k) = overrides.k {
            self.k = k;
        }
        if let Some(n) = overrides.n {
            self.n = n;
        }
        if let Some(oversubscription) = overrides.oversubscription {
            self.oversubscription = oversubscription;
        }
        // A flag can only switch root doubling on
        if overrides.fully_connected_roots {
            self.fully_connected_roots = true;
        }
        if let Some(link_speed) = &overrides.link_speed {
            self.link_speed = link_speed.clone();
        }
    }

    /// Ports each switch needs: k going up and `k * oversubscription` going down
    pub fn ports_per_switch(&self) -> u64 {
        u64::from(self.k) + u64::from(self.k) * u64::from(self.oversubscription)
    }

    /// Check every parameter and return the derived fabric dimensions.
    ///
    /// This is the single gate in front of the builder: if it passes, every
    /// index the wiring algorithm computes fits in `usize` and every GUID
    /// stays inside its range.
    pub fn validate(&self) -> Result<FabricDimensions, ConfigurationError> {
        if self.k < 1 {
            return Err(ConfigurationError::InvalidHalfPorts(self.k));
        }
        if self.n < 1 {
            return Err(ConfigurationError::InvalidLevels(self.n));
        }
        if !(1..=MAX_OVERSUBSCRIPTION).contains(&self.oversubscription) {
            return Err(ConfigurationError::InvalidOversubscription {
                value: self.oversubscription,
                max: MAX_OVERSUBSCRIPTION,
            });
        }

        let ports_per_switch = self.ports_per_switch();
        if ports_per_switch > u64::from(MAX_SWITCH_PORTS) {
            return Err(ConfigurationError::TooManyPorts {
                required: ports_per_switch,
                max: MAX_SWITCH_PORTS,
            });
        }

        if self.fully_connected_roots && self.n < 2 {
            return Err(ConfigurationError::RootDoublingNeedsLevels(self.n));
        }

        if !LINK_SPEED_PATTERN.is_match(&self.link_speed) {
            return Err(ConfigurationError::InvalidLinkSpeed(self.link_speed.clone()));
        }

        self.dimensions()
    }

    /// Compute the closed-form switch and host counts.
    ///
    /// Plain trees have `k^(n-1) * n` switches and `k^n * oversubscription`
    /// hosts; root doubling gives `k^(n-1) * (2n - 1)` switches and twice the
    /// hosts.
    pub fn dimensions(&self) -> Result<FabricDimensions, ConfigurationError> {
        let k = u64::from(self.k);
        let n = u64::from(self.n);
        let oversub = u64::from(self.oversubscription);

        let too_large = || {
            ConfigurationError::TooLarge(format!(
                "k = {}, n = {} overflows the node counters",
                self.k, self.n
            ))
        };

        let switches_per_row = k
            .checked_pow(self.n.saturating_sub(1))
            .ok_or_else(too_large)?;
        let hosts_per_tree = k
            .checked_pow(self.n)
            .and_then(|hosts| hosts.checked_mul(oversub))
            .ok_or_else(too_large)?;

        let (total_rows, total_hosts) = if self.fully_connected_roots {
            (n * 2 - 1, hosts_per_tree.checked_mul(2).ok_or_else(too_large)?)
        } else {
            (n, hosts_per_tree)
        };
        let total_switches = switches_per_row
            .checked_mul(total_rows)
            .ok_or_else(too_large)?;

        if total_switches > GUID_RANGE_SIZE {
            return Err(ConfigurationError::TooLarge(format!(
                "{} switches do not fit in the switch GUID range of {} entries",
                total_switches, GUID_RANGE_SIZE
            )));
        }
        if total_hosts > GUID_RANGE_SIZE {
            return Err(ConfigurationError::TooLarge(format!(
                "{} HCAs do not fit in the HCA GUID range of {} entries",
                total_hosts, GUID_RANGE_SIZE
            )));
        }

        // Bounded by GUID_RANGE_SIZE above, so these fit in usize
        Ok(FabricDimensions {
            switches_per_row: switches_per_row as usize,
            total_rows: total_rows as usize,
            total_switches: total_switches as usize,
            total_hosts: total_hosts as usize,
            ports_per_switch: self.ports_per_switch() as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_dimensions_plain_tree() {
        let dims = FabricConfig::new(2, 2, 1, false).validate().unwrap();
        assert_eq!(dims.switches_per_row, 2);
        assert_eq!(dims.total_rows, 2);
        assert_eq!(dims.total_switches, 4);
        assert_eq!(dims.total_hosts, 4);
        assert_eq!(dims.ports_per_switch, 4);
    }

    #[test]
    fn test_dimensions_with_root_doubling() {
        let dims = FabricConfig::new(4, 3, 2, true).validate().unwrap();
        assert_eq!(dims.switches_per_row, 16);
        assert_eq!(dims.total_rows, 5);
        assert_eq!(dims.total_switches, 16 * 5);
        assert_eq!(dims.total_hosts, 64 * 2 * 2);
        assert_eq!(dims.ports_per_switch, 12);
    }

    #[test]
    fn test_port_ceiling() {
        let err = FabricConfig::new(40, 2, 2, false).validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::TooManyPorts { required: 120, max: 48 }
        ));

        // Exactly at the ceiling is fine
        assert!(FabricConfig::new(24, 2, 1, false).validate().is_ok());
        assert!(FabricConfig::new(12, 2, 3, false).validate().is_ok());
    }

    #[test]
    fn test_rejects_degenerate_parameters() {
        assert!(matches!(
            FabricConfig::new(0, 2, 1, false).validate(),
            Err(ConfigurationError::InvalidHalfPorts(0))
        ));
        assert!(matches!(
            FabricConfig::new(2, 0, 1, false).validate(),
            Err(ConfigurationError::InvalidLevels(0))
        ));
        assert!(matches!(
            FabricConfig::new(2, 2, 5, false).validate(),
            Err(ConfigurationError::InvalidOversubscription { value: 5, .. })
        ));
        assert!(matches!(
            FabricConfig::new(2, 2, 0, false).validate(),
            Err(ConfigurationError::InvalidOversubscription { value: 0, .. })
        ));
        assert!(matches!(
            FabricConfig::new(2, 1, 1, true).validate(),
            Err(ConfigurationError::RootDoublingNeedsLevels(1))
        ));
    }

    #[test]
    fn test_single_level_tree_is_allowed() {
        let dims = FabricConfig::new(3, 1, 2, false).validate().unwrap();
        assert_eq!(dims.switches_per_row, 1);
        assert_eq!(dims.total_switches, 1);
        assert_eq!(dims.total_hosts, 6);
    }

    #[test]
    fn test_oversized_topology_is_rejected() {
        // 24^5 * 6 switches blows through the switch GUID range
        let err = FabricConfig::new(24, 6, 1, false).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::TooLarge(_)));

        // 2^64 does not even fit the counters
        let err = FabricConfig::new(2, 65, 1, false).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::TooLarge(_)));
    }

    #[test]
    fn test_link_speed_validation() {
        let mut config = FabricConfig::new(2, 2, 1, false);
        for speed in ["4xEDR", "1xSDR", "12xFDR10", "8xHDR"] {
            config.link_speed = speed.to_string();
            assert!(config.validate().is_ok(), "{} should be accepted", speed);
        }
        for speed in ["EDR", "4xedr", "3xEDR", "4xEDR ", ""] {
            config.link_speed = speed.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigurationError::InvalidLinkSpeed(_))),
                "{:?} should be rejected",
                speed
            );
        }
    }

    #[test]
    fn test_load_config_with_defaults() {
        let yaml = r#"
k: 4
n: 3
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = FabricConfig::load(temp_file.path()).unwrap();
        assert_eq!(config, FabricConfig::new(4, 3, 1, false));
    }

    #[test]
    fn test_load_config_all_fields() {
        let yaml = r#"
k: 2
n: 4
oversubscription: 3
fully_connected_roots: true
link_speed: "4xHDR"
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = FabricConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.oversubscription, 3);
        assert!(config.fully_connected_roots);
        assert_eq!(config.link_speed, "4xHDR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_errors() {
        let missing = FabricConfig::load(Path::new("/nonexistent/fabric.yaml"));
        assert!(matches!(missing, Err(ConfigurationError::Io { .. })));

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "k: [not, a, number]").unwrap();
        let malformed = FabricConfig::load(temp_file.path());
        assert!(matches!(malformed, Err(ConfigurationError::Parse { .. })));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = FabricConfig::new(4, 3, 1, false);
        config.apply_overrides(&FabricOverrides {
            k: Some(2),
            n: None,
            oversubscription: Some(2),
            fully_connected_roots: true,
            link_speed: Some("4xQDR".to_string()),
        });

        assert_eq!(config.k, 2);
        assert_eq!(config.n, 3);
        assert_eq!(config.oversubscription, 2);
        assert!(config.fully_connected_roots);
        assert_eq!(config.link_speed, "4xQDR");

        // An absent flag leaves a file setting alone
        config.apply_overrides(&FabricOverrides::default());
        assert!(config.fully_connected_roots);
    }
}
