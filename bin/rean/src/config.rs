//! Genesis and validator-assignment configuration loaders.

use serde::Deserialize;
use thiserror::Error;

use rean_types::{
    signature::{PUBKEY_SIZE, Pubkey},
    state::Validator,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("GENESIS_VALIDATORS must not be empty")]
    EmptyValidators,
    #[error("invalid pubkey hex at index {index}")]
    InvalidPubkeyHex { index: usize },
    #[error("pubkey at index {index} is {len} bytes, want {PUBKEY_SIZE}")]
    WrongPubkeyLength { index: usize, len: usize },
    #[error("validator {validator} in {node} out of range (genesis has {genesis})")]
    ValidatorOutOfRange {
        validator: u64,
        node: String,
        genesis: u64,
    },
    #[error("validator {validator} assigned to both {first} and {second}")]
    DuplicateAssignment {
        validator: u64,
        first: String,
        second: String,
    },
}

/// The parsed genesis config.
#[derive(Debug)]
pub struct GenesisConfig {
    pub genesis_time: u64,
    pub validators: Vec<Validator>,
}

/// On-disk YAML shape of the genesis config.
#[derive(Debug, Deserialize)]
struct RawGenesisConfig {
    #[serde(rename = "GENESIS_TIME")]
    genesis_time: u64,
    #[serde(rename = "GENESIS_VALIDATORS")]
    genesis_validators: Vec<String>,
}

/// Load and parse a genesis config YAML file.
pub fn load_genesis_config(path: &str) -> Result<GenesisConfig, ConfigError> {
    parse_genesis_config(&std::fs::read_to_string(path)?)
}

fn parse_genesis_config(yaml: &str) -> Result<GenesisConfig, ConfigError> {
    let raw: RawGenesisConfig = serde_yaml::from_str(yaml)?;

    if raw.genesis_validators.is_empty() {
        return Err(ConfigError::EmptyValidators);
    }

    let validators = raw
        .genesis_validators
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let bytes = hex::decode(entry.trim_start_matches("0x"))
                .map_err(|_| ConfigError::InvalidPubkeyHex { index })?;
            if bytes.len() != PUBKEY_SIZE {
                return Err(ConfigError::WrongPubkeyLength {
                    index,
                    len: bytes.len(),
                });
            }
            Ok(Validator {
                pubkey: Pubkey::new(bytes).expect("length checked above"),
                index: index as u64,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GenesisConfig {
        genesis_time: raw.genesis_time,
        validators,
    })
}

/// One node's validator assignment.
#[derive(Debug, Deserialize)]
pub struct ValidatorAssignment {
    pub node_name: String,
    pub validators: Vec<u64>,
}

/// The parsed validators.yaml.
#[derive(Debug, Deserialize)]
pub struct ValidatorRegistry {
    pub assignments: Vec<ValidatorAssignment>,
}

/// Load and parse a validator assignment YAML file.
pub fn load_validators(path: &str) -> Result<ValidatorRegistry, ConfigError> {
    Ok(serde_yaml::from_str(&std::fs::read_to_string(path)?)?)
}

impl ValidatorRegistry {
    /// Reject overlapping assignments and out-of-range indices.
    pub fn validate(&self, num_genesis_validators: u64) -> Result<(), ConfigError> {
        let mut seen: std::collections::HashMap<u64, &str> = std::collections::HashMap::new();
        for assignment in &self.assignments {
            for validator in &assignment.validators {
                if *validator >= num_genesis_validators {
                    return Err(ConfigError::ValidatorOutOfRange {
                        validator: *validator,
                        node: assignment.node_name.clone(),
                        genesis: num_genesis_validators,
                    });
                }
                if let Some(first) = seen.insert(*validator, &assignment.node_name) {
                    return Err(ConfigError::DuplicateAssignment {
                        validator: *validator,
                        first: first.to_string(),
                        second: assignment.node_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The validator indices assigned to a node, empty if unknown.
    pub fn indices_for(&self, node_name: &str) -> Vec<u64> {
        self.assignments
            .iter()
            .find(|assignment| assignment.node_name == node_name)
            .map(|assignment| assignment.validators.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_genesis_config() {
        let pubkey_hex = format!("0x{}", "ab".repeat(PUBKEY_SIZE));
        let yaml = format!("GENESIS_TIME: 1000\nGENESIS_VALIDATORS:\n  - \"{pubkey_hex}\"\n");
        let config = parse_genesis_config(&yaml).unwrap();
        assert_eq!(config.genesis_time, 1000);
        assert_eq!(config.validators.len(), 1);
        assert_eq!(config.validators[0].index, 0);
    }

    #[test]
    fn rejects_empty_validator_set() {
        let yaml = "GENESIS_TIME: 1000\nGENESIS_VALIDATORS: []\n";
        assert!(matches!(
            parse_genesis_config(yaml),
            Err(ConfigError::EmptyValidators)
        ));
    }

    #[test]
    fn rejects_short_pubkey() {
        let yaml = "GENESIS_TIME: 1000\nGENESIS_VALIDATORS:\n  - \"0xabcd\"\n";
        assert!(matches!(
            parse_genesis_config(yaml),
            Err(ConfigError::WrongPubkeyLength { index: 0, len: 2 })
        ));
    }

    #[test]
    fn rejects_bad_hex() {
        let yaml = "GENESIS_TIME: 1000\nGENESIS_VALIDATORS:\n  - \"0xzz\"\n";
        assert!(matches!(
            parse_genesis_config(yaml),
            Err(ConfigError::InvalidPubkeyHex { index: 0 })
        ));
    }

    fn registry(yaml: &str) -> ValidatorRegistry {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn validates_assignments() {
        let reg = registry(
            "assignments:\n  - node_name: a\n    validators: [0, 1]\n  - node_name: b\n    validators: [2]\n",
        );
        reg.validate(3).unwrap();
        assert_eq!(reg.indices_for("a"), vec![0, 1]);
        assert_eq!(reg.indices_for("b"), vec![2]);
        assert!(reg.indices_for("missing").is_empty());
    }

    #[test]
    fn rejects_duplicate_assignment() {
        let reg = registry(
            "assignments:\n  - node_name: a\n    validators: [0]\n  - node_name: b\n    validators: [0]\n",
        );
        assert!(matches!(
            reg.validate(3),
            Err(ConfigError::DuplicateAssignment { validator: 0, .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_assignment() {
        let reg = registry("assignments:\n  - node_name: a\n    validators: [9]\n");
        assert!(matches!(
            reg.validate(3),
            Err(ConfigError::ValidatorOutOfRange { validator: 9, .. })
        ));
    }
}
