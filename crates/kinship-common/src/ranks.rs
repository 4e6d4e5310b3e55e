//! Rank decoration capability.
//!
//! Display prefixes and suffixes come from whatever permission system the
//! world runs. Kinship only consumes the capability; the provider is picked
//! once at startup from `ranks.provider`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{RankEntry, RanksConfig};
use crate::error::{KinshipError, KinshipResult};
use crate::models::Identity;

pub trait RankProvider: Send + Sync {
    fn prefix(&self, player: &Identity) -> Option<String>;
    fn suffix(&self, player: &Identity) -> Option<String>;
    fn primary_group(&self, player: &Identity) -> Option<String>;

    /// Name wrapped in prefix and suffix, if any.
    fn decorate(&self, player: &Identity) -> String {
        let mut out = String::new();
        if let Some(prefix) = self.prefix(player) {
            out.push_str(&prefix);
            out.push(' ');
        }
        out.push_str(&player.name);
        if let Some(suffix) = self.suffix(player) {
            out.push(' ');
            out.push_str(&suffix);
        }
        out
    }
}

/// No decoration.
#[derive(Debug, Default)]
pub struct NoRanks;

impl RankProvider for NoRanks {
    fn prefix(&self, _: &Identity) -> Option<String> {
        None
    }

    fn suffix(&self, _: &Identity) -> Option<String> {
        None
    }

    fn primary_group(&self, _: &Identity) -> Option<String> {
        None
    }
}

/// Fixed rank table from configuration, keyed by lower-cased player name.
#[derive(Debug, Default)]
pub struct StaticRanks {
    entries: HashMap<String, RankEntry>,
}

impl StaticRanks {
    pub fn new(entries: &HashMap<String, RankEntry>) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, entry)| (name.to_lowercase(), entry.clone()))
                .collect(),
        }
    }

    fn entry(&self, player: &Identity) -> Option<&RankEntry> {
        self.entries.get(&player.name.to_lowercase())
    }
}

impl RankProvider for StaticRanks {
    fn prefix(&self, player: &Identity) -> Option<String> {
        self.entry(player)?.prefix.clone()
    }

    fn suffix(&self, player: &Identity) -> Option<String> {
        self.entry(player)?.suffix.clone()
    }

    fn primary_group(&self, player: &Identity) -> Option<String> {
        self.entry(player)?.group.clone()
    }
}

/// Build the provider named in configuration.
pub fn select(config: &RanksConfig) -> KinshipResult<Arc<dyn RankProvider>> {
    match config.provider.to_ascii_lowercase().as_str() {
        "none" => Ok(Arc::new(NoRanks)),
        "static" => {
            tracing::info!(entries = config.entries.len(), "Using static rank table");
            Ok(Arc::new(StaticRanks::new(&config.entries)))
        }
        other => Err(KinshipError::validation(format!(
            "unknown rank provider '{other}'"
        ))),
    }
}
