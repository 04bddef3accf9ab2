//! Machine configuration: symbols, reels, prizes, fallback policy, reset schedule.
//!
//! RULE: validate() runs once at load time. Everything downstream of
//! DispenserConfig assumes a structurally valid machine and never re-checks.

use crate::{
    clock::ResetZone,
    error::{DispenserError, DispenserResult},
    types::{PrizeId, SymbolId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const CONFIG_VERSION: u32 = 2;
pub const MIN_REELS: usize = 3;
pub const MIN_COMBO_SYMBOLS: usize = 2;

/// Category of visible result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    #[serde(rename = "TWO_OF_A_KIND")]
    PairMatch,
    #[serde(rename = "THREE_OF_A_KIND")]
    TripleMatch,
    #[serde(rename = "SPECIAL_COMBO")]
    FixedCombination,
    #[serde(rename = "NONE")]
    NoWin,
}

impl OutcomeClass {
    /// Planner priority. Higher is tried first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::FixedCombination => 3,
            Self::TripleMatch      => 2,
            Self::PairMatch        => 1,
            Self::NoWin            => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PairMatch        => "pair_match",
            Self::TripleMatch      => "triple_match",
            Self::FixedCombination => "fixed_combination",
            Self::NoWin            => "no_win",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolConfig {
    pub id: SymbolId,
    pub name: String,
    #[serde(default)]
    pub asset_path: String,
    /// Only meaningful to external reel generators.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 { 1.0 }

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchMode {
    /// Each required symbol on a distinct reel, reel order irrelevant.
    #[default]
    #[serde(rename = "ANY_ORDER")]
    AnyOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialCombo {
    pub symbols: Vec<SymbolId>,
    #[serde(default)]
    pub match_mode: MatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrizeConfig {
    pub id: PrizeId,
    pub label: String,
    #[serde(rename = "type")]
    pub outcome: OutcomeClass,
    pub daily_max: u32,
    /// Required for SPECIAL_COMBO, ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<SpecialCombo>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FallbackPreference {
    #[serde(rename = "TWO_OF_A_KIND")]
    PairMatch,
    #[serde(rename = "NONE")]
    NoWin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_prefer")]
    pub prefer: FallbackPreference,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { enabled: true, prefer: FallbackPreference::PairMatch }
    }
}

fn default_true() -> bool { true }
fn default_prefer() -> FallbackPreference { FallbackPreference::PairMatch }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// "HH:MM", 24h clock, evaluated in `timezone`.
    #[serde(default = "default_reset_time")]
    pub daily_reset_time: String,
    /// Fire on the first poll after the target time if today's reset was missed.
    #[serde(default)]
    pub catch_up_missed: bool,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            daily_reset_time: default_reset_time(),
            catch_up_missed: false,
        }
    }
}

fn default_timezone() -> String { "local".into() }
fn default_reset_time() -> String { "04:00".into() }

impl ResetConfig {
    /// Parse `daily_reset_time` into (hour, minute).
    pub fn target(&self) -> DispenserResult<(u32, u32)> {
        parse_hh_mm(&self.daily_reset_time).ok_or_else(|| {
            DispenserError::invalid_config(format!(
                "reset.daily_reset_time must be HH:MM, got '{}'",
                self.daily_reset_time
            ))
        })
    }
}

fn parse_hh_mm(raw: &str) -> Option<(u32, u32)> {
    let (h, m) = raw.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispenserConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub symbols: Vec<SymbolConfig>,
    /// One ordered list of symbol ids per physical reel.
    pub reels: Vec<Vec<SymbolId>>,
    pub prizes: Vec<PrizeConfig>,
    /// "Are there losing spins?" Enables the no-win tier of the fallback chain.
    #[serde(default = "default_true")]
    pub allow_losers: bool,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub reset: ResetConfig,
}

fn default_version() -> u32 { CONFIG_VERSION }

impl DispenserConfig {
    /// Load and validate a JSON machine file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config = Self::from_json(&content)?;
        log::info!(
            "loaded machine config from {path}: {} reels, {} symbols, {} prizes",
            config.reels.len(),
            config.symbols.len(),
            config.prizes.len()
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> DispenserResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject structurally invalid machines before they reach the planner.
    pub fn validate(&self) -> DispenserResult<()> {
        if self.version != CONFIG_VERSION {
            return Err(DispenserError::invalid_config(format!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }

        let mut symbol_ids = HashSet::new();
        for symbol in &self.symbols {
            if !symbol_ids.insert(symbol.id.as_str()) {
                return Err(DispenserError::invalid_config(format!(
                    "duplicate symbol id '{}'", symbol.id
                )));
            }
        }

        if self.reels.len() < MIN_REELS {
            return Err(DispenserError::invalid_config(format!(
                "at least {MIN_REELS} reels required, got {}",
                self.reels.len()
            )));
        }
        for (i, reel) in self.reels.iter().enumerate() {
            if reel.is_empty() {
                return Err(DispenserError::invalid_config(format!("reel {i} is empty")));
            }
            if let Some(unknown) = reel.iter().find(|s| !symbol_ids.contains(s.as_str())) {
                return Err(DispenserError::invalid_config(format!(
                    "reel {i} references undeclared symbol '{unknown}'"
                )));
            }
        }

        let mut prize_ids = HashSet::new();
        for prize in &self.prizes {
            if !prize_ids.insert(prize.id.as_str()) {
                return Err(DispenserError::invalid_config(format!(
                    "duplicate prize id '{}'", prize.id
                )));
            }
            if prize.outcome != OutcomeClass::FixedCombination {
                continue;
            }
            let required = prize.special.as_ref().map(|s| s.symbols.as_slice()).unwrap_or(&[]);
            if required.len() < MIN_COMBO_SYMBOLS {
                return Err(DispenserError::invalid_config(format!(
                    "prize '{}' needs at least {MIN_COMBO_SYMBOLS} required symbols",
                    prize.id
                )));
            }
            if let Some(unknown) = required.iter().find(|s| !symbol_ids.contains(s.as_str())) {
                return Err(DispenserError::invalid_config(format!(
                    "prize '{}' requires undeclared symbol '{unknown}'",
                    prize.id
                )));
            }
        }

        self.reset.target()?;
        ResetZone::parse(&self.reset.timezone)?;
        Ok(())
    }

    /// The stock 3-reel machine shipped with the dispenser.
    pub fn default_machine() -> Self {
        let symbol = |id: &str, name: &str, weight: f64| SymbolConfig {
            id: id.into(),
            name: name.into(),
            asset_path: format!("assets/{id}.png"),
            weight,
        };
        let reel = |ids: [&str; 6]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            version: CONFIG_VERSION,
            symbols: vec![
                symbol("cherry", "Cherry", 3.0),
                symbol("lemon",  "Lemon",  3.0),
                symbol("orange", "Orange", 3.0),
                symbol("bell",   "Bell",   2.0),
                symbol("bar",    "BAR",    2.0),
                symbol("seven",  "Seven",  1.0),
            ],
            reels: vec![
                reel(["cherry", "lemon", "orange", "bell", "bar", "seven"]),
                reel(["lemon", "orange", "cherry", "bell", "bar", "seven"]),
                reel(["orange", "cherry", "lemon", "bell", "bar", "seven"]),
            ],
            prizes: vec![
                PrizeConfig {
                    id: "p-two".into(),
                    label: "Two alike".into(),
                    outcome: OutcomeClass::PairMatch,
                    daily_max: 100,
                    special: None,
                },
                PrizeConfig {
                    id: "p-three".into(),
                    label: "Three alike".into(),
                    outcome: OutcomeClass::TripleMatch,
                    daily_max: 20,
                    special: None,
                },
                PrizeConfig {
                    id: "p-combo".into(),
                    label: "Combo: Bell+BAR+Seven".into(),
                    outcome: OutcomeClass::FixedCombination,
                    daily_max: 5,
                    special: Some(SpecialCombo {
                        symbols: vec!["bell".into(), "bar".into(), "seven".into()],
                        match_mode: MatchMode::AnyOrder,
                    }),
                },
            ],
            allow_losers: true,
            fallback: FallbackConfig::default(),
            reset: ResetConfig::default(),
        }
    }

    /// Minimal fixture: three identical cherry/bell reels, one triple prize.
    pub fn default_test() -> Self {
        let reel = || vec!["cherry".to_string(), "bell".to_string()];
        Self {
            version: CONFIG_VERSION,
            symbols: vec![
                SymbolConfig { id: "cherry".into(), name: "Cherry".into(), asset_path: String::new(), weight: 1.0 },
                SymbolConfig { id: "bell".into(),   name: "Bell".into(),   asset_path: String::new(), weight: 1.0 },
            ],
            reels: vec![reel(), reel(), reel()],
            prizes: vec![PrizeConfig {
                id: "triple-cherry".into(),
                label: "Triple cherry".into(),
                outcome: OutcomeClass::TripleMatch,
                daily_max: 1,
                special: None,
            }],
            allow_losers: true,
            fallback: FallbackConfig::default(),
            reset: ResetConfig {
                timezone: "UTC".into(),
                daily_reset_time: "04:00".into(),
                catch_up_missed: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_machine_and_fixture_validate() {
        DispenserConfig::default_machine().validate().unwrap();
        DispenserConfig::default_test().validate().unwrap();
    }

    #[test]
    fn rejects_fewer_than_three_reels() {
        let mut cfg = DispenserConfig::default_test();
        cfg.reels.pop();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at least 3 reels"), "{err}");
    }

    #[test]
    fn rejects_combo_with_single_symbol() {
        let mut cfg = DispenserConfig::default_machine();
        cfg.prizes[2].special = Some(SpecialCombo {
            symbols: vec!["bell".into()],
            match_mode: MatchMode::AnyOrder,
        });
        assert!(matches!(cfg.validate(), Err(DispenserError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_undeclared_reel_symbol() {
        let mut cfg = DispenserConfig::default_test();
        cfg.reels[1].push("plum".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_malformed_reset_time() {
        for bad in ["4:00", "24:00", "12:60", "noon"] {
            let mut cfg = DispenserConfig::default_test();
            cfg.reset.daily_reset_time = bad.into();
            assert!(cfg.validate().is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut cfg = DispenserConfig::default_test();
        cfg.reset.timezone = "Atlantis/Capital".into();
        assert!(matches!(cfg.validate(), Err(DispenserError::InvalidConfig { .. })));
        cfg.reset.timezone = "America/New_York".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn parses_wire_names_and_defaults() {
        let json = r#"{
            "symbols": [
                {"id": "a", "name": "A"}, {"id": "b", "name": "B"}
            ],
            "reels": [["a","b"],["a","b"],["b","a"]],
            "prizes": [
                {"id": "c", "label": "Combo", "type": "SPECIAL_COMBO", "daily_max": 2,
                 "special": {"symbols": ["a","b"]}}
            ]
        }"#;
        let cfg = DispenserConfig::from_json(json).unwrap();
        assert_eq!(cfg.prizes[0].outcome, OutcomeClass::FixedCombination);
        assert_eq!(cfg.prizes[0].special.as_ref().unwrap().match_mode, MatchMode::AnyOrder);
        assert!(cfg.allow_losers);
        assert_eq!(cfg.fallback.prefer, FallbackPreference::PairMatch);
        assert_eq!(cfg.reset.daily_reset_time, "04:00");
        assert_eq!(cfg.symbols[0].weight, 1.0);
    }

    #[test]
    fn bundled_machine_file_matches_stock_machine() {
        let cfg = DispenserConfig::from_json(include_str!("../../data/machine.json")).unwrap();
        cfg.validate().unwrap();
        let stock = DispenserConfig::default_machine();
        assert_eq!(cfg.symbols, stock.symbols);
        assert_eq!(cfg.reels, stock.reels);
        assert_eq!(cfg.prizes, stock.prizes);
        assert_eq!(cfg.reset.timezone, "Europe/Berlin");
    }
}
