//! Engine configuration and parameter metadata
//!
//! [`EngineConfig`] carries the tunables of a [`StructureEngine`](crate::StructureEngine).
//! Parameter metadata makes the configuration discoverable for sweeps:
//!
//! ```rust
//! use std::collections::HashMap;
//! use trc_engine::config::EngineConfig;
//!
//! for param in EngineConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("max_retest_bars", 10.0);
//! let config = EngineConfig::with_params(&params).unwrap();
//! assert_eq!(config.max_retest_bars.get(), 10);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Period, Result, ValidationError};

/// Default retest time-to-live, in bars
pub const DEFAULT_MAX_RETEST_BARS: usize = 20;

// ============================================================
// ENGINE CONFIG
// ============================================================

/// Configuration of a structure engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Bars a retest zone stays armed after the CHOCH that created it
  pub max_retest_bars: Period,
  /// CHOCH requires a close beyond the pivot; when false a wick is enough
  pub require_close_beyond_structure: bool,
  /// Validate bars in the replay helpers before feeding them
  pub validate_bars: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_retest_bars: Period::new_const(DEFAULT_MAX_RETEST_BARS),
      require_close_beyond_structure: true,
      validate_bars: true,
    }
  }
}

static PARAMS: [ParamMeta; 2] = [
  ParamMeta::period(
    "max_retest_bars",
    DEFAULT_MAX_RETEST_BARS as f64,
    (5.0, 60.0, 5.0),
    "Bars a retest zone stays armed after an aligned CHOCH",
  ),
  ParamMeta::flag(
    "require_close_beyond_structure",
    1.0,
    "CHOCH on close beyond the pivot (1) or on the wick (0)",
  ),
];

impl EngineConfig {
  /// Metadata for all tunable parameters
  pub fn param_meta() -> &'static [ParamMeta] {
    &PARAMS
  }

  /// Build a config from a parameter map.
  ///
  /// Missing parameters use their default values; unknown names are rejected.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    if let Some(unknown) = params.keys().find(|k| !PARAMS.iter().any(|p| p.name == **k)) {
      return Err(ValidationError::InvalidConfig(format!("unknown parameter `{unknown}`")));
    }

    Ok(Self {
      max_retest_bars: get_period(params, "max_retest_bars", DEFAULT_MAX_RETEST_BARS)?,
      require_close_beyond_structure: get_flag(params, "require_close_beyond_structure", true)?,
      ..Self::default()
    })
  }
}

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Positive integer
  Period,
  /// Boolean encoded as 0.0 / 1.0
  Flag,
}

/// Metadata for a single engine parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn flag(name: &'static str, default: f64, description: &'static str) -> Self {
    Self { name, param_type: ParamType::Flag, default, range: (0.0, 1.0, 1.0), description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value against the sweep range and the parameter type
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(ValidationError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(ValidationError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Flag => {
        if value != 0.0 && value != 1.0 {
          return Err(ValidationError::InvalidValue("Flag must be 0 or 1"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
    return Err(ValidationError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Get a boolean flag (0.0 / 1.0) from params with default fallback
pub fn get_flag(params: &HashMap<&str, f64>, key: &str, default: bool) -> Result<bool> {
  match params.get(key).copied() {
    None => Ok(default),
    Some(v) if v == 0.0 => Ok(false),
    Some(v) if v == 1.0 => Ok(true),
    Some(_) => Err(ValidationError::InvalidValue("Flag must be 0 or 1")),
  }
}

// ============================================================
// TESTS
// ============================================================
