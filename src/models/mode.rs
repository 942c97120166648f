use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DatasetError;

/// Data split a bundle of samples belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    Test,
    Val,
    OtherCountries,
    Custom,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Test => "test",
            Mode::Val => "val",
            Mode::OtherCountries => "other_countries",
            Mode::Custom => "custom",
        }
    }

    /// Label written next to each station when tagging tables by assignment
    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Train => "Training",
            Mode::Test => "Test",
            Mode::Val => "Validation",
            Mode::OtherCountries => "other_countries",
            Mode::Custom => "custom",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            "val" => Ok(Mode::Val),
            "other_countries" => Ok(Mode::OtherCountries),
            "custom" => Ok(Mode::Custom),
            _ => Err(DatasetError::Config(format!("Unknown mode: {}", s))),
        }
    }
}

/// Holdout split mode. Only test and validation carry their own cutoff, seed and station list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldoutMode {
    Test,
    Val,
}

impl HoldoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldoutMode::Test => "test",
            HoldoutMode::Val => "val",
        }
    }
}

impl std::fmt::Display for HoldoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    Time,
    Space,
    TimeAndSpace,
    Random,
    Country,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::Time => "time",
            SplitStrategy::Space => "space",
            SplitStrategy::TimeAndSpace => "time_and_space",
            SplitStrategy::Random => "random",
            SplitStrategy::Country => "country",
        }
    }

    /// Strategies that hold out whole stations
    pub fn is_space_based(&self) -> bool {
        matches!(self, SplitStrategy::Space | SplitStrategy::TimeAndSpace)
    }
}

impl std::fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SplitStrategy {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(SplitStrategy::Time),
            "space" => Ok(SplitStrategy::Space),
            "time_and_space" => Ok(SplitStrategy::TimeAndSpace),
            "random" => Ok(SplitStrategy::Random),
            "country" => Ok(SplitStrategy::Country),
            _ => Err(DatasetError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Terrain derivative stored in the tile backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    Topos,
    Aspect,
    TanSlope,
    Tpi300,
    Tpi600,
}

impl TerrainKind {
    pub const ALL: [TerrainKind; 5] = [
        TerrainKind::Topos,
        TerrainKind::Aspect,
        TerrainKind::TanSlope,
        TerrainKind::Tpi300,
        TerrainKind::Tpi600,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TerrainKind::Topos => "topos",
            TerrainKind::Aspect => "aspect",
            TerrainKind::TanSlope => "tan_slope",
            TerrainKind::Tpi300 => "tpi_300",
            TerrainKind::Tpi600 => "tpi_600",
        }
    }
}

impl std::fmt::Display for TerrainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TerrainKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TerrainKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| DatasetError::Config(format!("Unknown terrain kind: {}", s)))
    }
}
