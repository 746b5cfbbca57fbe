//! Game settings
//!
//! Rules, AI tuning and update cadences. Stored as JSON next to the binary;
//! every field has a default so partial files load fine.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{ARENA_HEIGHT, ARENA_WIDTH, GRID_SIZE};

/// Difficulty preset; only changes enemy health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "normal" | "medium" => Some(Difficulty::Normal),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Health of regular enemies
    pub fn ai_health(&self) -> i32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Normal => 2,
            Difficulty::Hard => 3,
        }
    }

    /// Health of boss-class enemies
    pub fn boss_health(&self) -> i32 {
        match self {
            Difficulty::Easy => 3,
            Difficulty::Normal => 4,
            Difficulty::Hard => 8,
        }
    }
}

/// Enemy AI knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiTuning {
    /// Max off-axis offset still counted as lined up
    pub los_tolerance: f32,
    /// Sample spacing along a line-of-sight segment
    pub los_step: f32,
    /// Chance per AI tick of a random dodge
    pub dodge_chance: f64,
    pub dodge_duration_ms: f64,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            los_tolerance: 12.0,
            los_step: 16.0,
            dodge_chance: 0.1,
            dodge_duration_ms: 1000.0,
        }
    }
}

/// Throttle periods in frames. A pass runs when `frame % period == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cadence {
    pub ai: u64,
    pub retarget: u64,
    pub physics: u64,
    pub non_critical_collisions: u64,
    pub stale_refs: u64,
    pub spawn: u64,
    pub conditions: u64,
    pub cleanup: u64,
    pub ui: u64,
    pub network: u64,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            ai: 3,
            retarget: 9,
            physics: 2,
            non_critical_collisions: 2,
            stale_refs: 120,
            spawn: 3,
            conditions: 30,
            cleanup: 60,
            ui: 10,
            network: 6,
        }
    }
}

/// Game rules and tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub difficulty: Difficulty,

    // === Friendly fire ===
    /// Player bullets hurt other players
    pub friendly_fire_players: bool,
    /// Enemy bullets hurt other enemies
    pub friendly_fire_enemies: bool,

    /// Cheat: very fast player shots
    pub super_shooting: bool,

    // === Arena ===
    pub arena_width: f32,
    pub arena_height: f32,
    /// Collision grid cell size
    pub grid_size: f32,

    // === Spawning ===
    pub max_enemies: usize,
    pub enemies_to_win: u32,
    pub enemy_spawn_delay_ms: f64,
    pub power_up_interval_ms: f64,

    pub ai: AiTuning,
    pub cadence: Cadence,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Normal,

            friendly_fire_players: false,
            friendly_fire_enemies: false,

            super_shooting: false,

            arena_width: ARENA_WIDTH,
            arena_height: ARENA_HEIGHT,
            grid_size: GRID_SIZE,

            max_enemies: 4,
            enemies_to_win: 20,
            enemy_spawn_delay_ms: 3000.0,
            power_up_interval_ms: 25_000.0,

            ai: AiTuning::default(),
            cadence: Cadence::default(),
        }
    }
}

/// Failure loading or saving settings
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "settings io error: {err}"),
            Self::Parse(err) => write!(f, "settings parse error: {err}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                log::info!("Using default settings ({err})");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Player fire rate and bullet speed, honouring super shooting
    pub fn player_gun(&self) -> Option<(f64, f32)> {
        self.super_shooting.then_some((50.0, 600.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let mut settings = Settings::default();
        settings.difficulty = Difficulty::Hard;
        settings.friendly_fire_players = true;
        settings.ai.dodge_chance = 0.0;

        let json = settings.to_json().expect("serialize");
        let back = Settings::from_json(&json).expect("deserialize");
        assert_eq!(back, settings);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json(r#"{"difficulty":"easy","ai":{"los_step":8.0}}"#).expect("parse");
        assert_eq!(settings.difficulty, Difficulty::Easy);
        assert_eq!(settings.ai.los_step, 8.0);
        assert_eq!(settings.ai.los_tolerance, 12.0);
        assert_eq!(settings.cadence, Cadence::default());
        assert_eq!(settings.max_enemies, 4);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(Settings::from_json("{not json"), Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("tank-combat-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.enemies_to_win = 7;
        settings.save(&path).expect("save");

        let loaded = Settings::load(&path).expect("load");
        assert_eq!(loaded.enemies_to_win, 7);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_difficulty_table() {
        assert_eq!(Difficulty::from_str("HARD"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_str("bogus"), None);
        assert_eq!((Difficulty::Easy.ai_health(), Difficulty::Easy.boss_health()), (1, 3));
        assert_eq!((Difficulty::Normal.ai_health(), Difficulty::Normal.boss_health()), (2, 4));
        assert_eq!((Difficulty::Hard.ai_health(), Difficulty::Hard.boss_health()), (3, 8));
    }

    #[test]
    fn test_super_shooting_gun() {
        let mut settings = Settings::default();
        assert_eq!(settings.player_gun(), None);
        settings.super_shooting = true;
        assert_eq!(settings.player_gun(), Some((50.0, 600.0)));
    }
}
