//! Rules document management for gnc-rules
//!
//! This module handles loading and validation of the YAML rules document
//! and flattens its destination → triggers mapping into a lookup table.

pub mod error;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub use error::ConfigError;
pub use error::ConfigResult;

/// Key holding the list of accounts to scan
pub const ACCOUNTS_TO_SCAN_KEY: &str = "Accounts to scan";

/// Key holding the destination → triggers mapping
pub const RULES_KEY: &str = "Rules";

/// Separator between account path components
pub const ACCOUNT_SEPARATOR: char = ':';

// ==================== Document Types ====================

/// One destination account with the descriptions that route to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Colon-delimited destination account path
    pub destination: String,
    /// Transaction descriptions that trigger the move
    pub triggers: Vec<String>,
}

/// Ordered destination → triggers mapping, as written in the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet(Vec<RuleEntry>);

impl RuleSet {
    pub fn new(entries: Vec<RuleEntry>) -> Self {
        RuleSet(entries)
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct RuleSetVisitor;

impl<'de> Visitor<'de> for RuleSetVisitor {
    type Value = RuleSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of destination account to a list of descriptions")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::new();
        while let Some(destination) = map.next_key::<String>()? {
            // An empty entry (`Expenses:Misc:` with nothing below) has no triggers
            let triggers = map.next_value::<Option<Vec<String>>>()?.unwrap_or_default();
            entries.push(RuleEntry { destination, triggers });
        }
        Ok(RuleSet(entries))
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RuleSetVisitor)
    }
}

/// Document shape before required keys are checked
#[derive(Debug, Deserialize)]
struct RawRulesDocument {
    #[serde(rename = "Accounts to scan", default)]
    accounts_to_scan: Option<Vec<String>>,
    #[serde(rename = "Rules", default)]
    rules: Option<RuleSet>,
}

// ==================== Rule Table ====================

/// A single trigger → destination rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub trigger: String,
    pub destination: String,
}

/// Flattened trigger → destination table.
///
/// Iteration follows the position of each trigger's first insertion. A
/// repeated trigger keeps that position but takes the latest destination.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, returning the destination it replaced (if any)
    pub fn insert(&mut self, trigger: &str, destination: &str) -> Option<String> {
        if let Some(&pos) = self.index.get(trigger) {
            let previous = std::mem::replace(&mut self.rules[pos].destination, destination.to_string());
            return Some(previous);
        }
        self.index.insert(trigger.to_string(), self.rules.len());
        self.rules.push(Rule {
            trigger: trigger.to_string(),
            destination: destination.to_string(),
        });
        None
    }

    /// Destination for an exact description, if one is configured
    pub fn destination(&self, trigger: &str) -> Option<&str> {
        self.index.get(trigger).map(|&pos| self.rules[pos].destination.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Distinct destinations in first-use order
    pub fn destinations(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.destination.as_str()) {
                seen.push(rule.destination.as_str());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ==================== Rules Document ====================

/// Validated rules document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesConfig {
    /// Accounts whose transactions are examined
    pub accounts_to_scan: Vec<String>,
    /// Destination → triggers mapping
    pub rules: RuleSet,
}

impl RulesConfig {
    /// Load the rules document from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::IoError {
                path: path.display().to_string(),
                message: e.to_string(),
            },
        })?;

        let config = Self::from_yaml(&content)?;
        log::debug!(
            "Loaded rules from {}: {} account(s) to scan, {} destination(s)",
            path.display(),
            config.accounts_to_scan.len(),
            config.rules.len()
        );
        Ok(config)
    }

    /// Parse and validate a rules document held in memory
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let raw: RawRulesDocument = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::InvalidYaml { message: e.to_string() })?;

        let accounts_to_scan = raw.accounts_to_scan.ok_or_else(|| ConfigError::MissingField {
            field: ACCOUNTS_TO_SCAN_KEY.to_string(),
        })?;
        let rules = raw.rules.ok_or_else(|| ConfigError::MissingField {
            field: RULES_KEY.to_string(),
        })?;

        let config = RulesConfig { accounts_to_scan, rules };
        config.validate()?;
        Ok(config)
    }

    /// Validate account paths in both sections
    pub fn validate(&self) -> ConfigResult<()> {
        for (i, path) in self.accounts_to_scan.iter().enumerate() {
            validate_account_path(&format!("{}[{}]", ACCOUNTS_TO_SCAN_KEY, i), path)?;
        }

        for entry in self.rules.entries() {
            validate_account_path(&format!("{}.{}", RULES_KEY, entry.destination), &entry.destination)?;
            if let Some(i) = entry.triggers.iter().position(|t| t.is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.{}[{}]", RULES_KEY, entry.destination, i),
                    reason: "Trigger description must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Flatten the destination → triggers mapping into a trigger lookup table
    pub fn rule_table(&self) -> RuleTable {
        let mut table = RuleTable::new();
        for entry in self.rules.entries() {
            for trigger in &entry.triggers {
                if let Some(previous) = table.insert(trigger, &entry.destination) {
                    if previous != entry.destination {
                        log::warn!(
                            "Trigger '{}' is listed under both '{}' and '{}', using '{}'",
                            trigger, previous, entry.destination, entry.destination
                        );
                    }
                }
            }
        }
        table
    }
}

/// Check that a colon-delimited account path has no empty components
pub fn validate_account_path(field: &str, path: &str) -> ConfigResult<()> {
    if path.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "Account path must not be empty".to_string(),
        });
    }
    if path.split(ACCOUNT_SEPARATOR).any(|component| component.is_empty()) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("Account path '{}' contains an empty component", path),
        });
    }
    Ok(())
}

// ==================== Tests ====================
