// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Carver settings
//!
//! Everything a caller can tune, in one serde structure so that a
//! front end can keep it in a JSON file.  Missing keys take their
//! defaults.

use crate::energy::EnergyFunction;
use crate::error::{CarverError, Result};
use crate::seamcarver::{Interpolation, ResizeOrder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarverConfig {
    /// Largest sideways move of a seam between two rows.
    pub max_step: u32,
    /// Global cost of sideways moves.
    pub rigidity: f32,
    pub resize_order: ResizeOrder,
    /// Number of times the tie-break side flips while one map is built.
    pub side_switch_frequency: u32,
    /// Largest enlargement per pass, as a factor of the width; in (1, 2].
    pub enl_step: f32,
    /// Keep one brightness value per pixel instead of recomputing.
    pub use_cache: bool,
    pub energy: EnergyFunction,
    /// When set, a structure-tensor term smoothed with this sigma is
    /// added to the energy.
    pub blur_sigma: Option<f32>,
    pub interpolation: Interpolation,
    /// Keep a visibility map snapshot after every pass.
    pub dump_vmaps: bool,
}

impl Default for CarverConfig {
    fn default() -> Self {
        CarverConfig {
            max_step: 1,
            rigidity: 0.0,
            resize_order: ResizeOrder::default(),
            side_switch_frequency: 0,
            enl_step: 2.0,
            use_cache: true,
            energy: EnergyFunction::default(),
            blur_sigma: None,
            interpolation: Interpolation::default(),
            dump_vmaps: false,
        }
    }
}

fn invalid<T>(what: String) -> Result<T> {
    Err(CarverError::InvalidConfig(what))
}

impl CarverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_step == 0 {
            return invalid("max_step must be at least 1".to_string());
        }
        if !self.rigidity.is_finite() || self.rigidity < 0.0 {
            return invalid(format!("rigidity {} is not a non-negative number", self.rigidity));
        }
        if !(self.enl_step > 1.0 && self.enl_step <= 2.0) {
            return invalid(format!("enl_step {} is outside (1, 2]", self.enl_step));
        }
        if let Some(sigma) = self.blur_sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return invalid(format!("blur_sigma {} must be positive", sigma));
            }
        }
        self.resize_order.validate()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: CarverConfig =
            serde_json::from_str(text).map_err(|e| CarverError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CarverError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        CarverConfig::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CarverError::InvalidConfig(e.to_string()))
    }
}
