// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Autolevelling parameters.

use serde::{Deserialize, Serialize};

use crate::interp::{ProgramInfo, Units};

/// Parameters written into the generated preamble.  All lengths are in the
/// program's units, speeds in units per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutolevelConfig {
    /// Nominal probing grid cell size.
    pub grid_size: f64,
    /// Cutting depth below the probed surface (`#3`).
    pub engraving_depth: f64,
    /// Height for moves between probe points (`#2`).
    pub traverse_height: f64,
    /// Deepest Z a probe move may reach (`#4`).
    pub probe_max_depth: f64,
    pub traverse_speed: f64,
    pub probe_speed: f64,
    /// Safe height before and after probing (`#1`).
    pub clearance_height: f64,
    /// Relative depth of the initial Z zeroing probe.
    pub initial_probe_z: f64,
}

impl AutolevelConfig {
    /// Defaults for a program in the given units.  The engraving depth is
    /// taken from the deepest milling move, if there is one.
    pub fn for_units(units: Units, info: &ProgramInfo) -> Self {
        let engraving_depth = info.mill_depth.unwrap_or(0.0);
        match units {
            Units::Inches => AutolevelConfig {
                grid_size: 0.2,
                engraving_depth,
                traverse_height: 0.02,
                probe_max_depth: -0.039,
                traverse_speed: 15.7,
                probe_speed: 2.4,
                clearance_height: 0.47244,
                initial_probe_z: -0.1969,
            },
            Units::Millimeters => AutolevelConfig {
                grid_size: 5.0,
                engraving_depth,
                traverse_height: 0.5,
                probe_max_depth: -1.0,
                traverse_speed: 400.0,
                probe_speed: 60.0,
                clearance_height: 12.0,
                initial_probe_z: -5.0,
            },
        }
    }

    /// Defaults for a loaded program.
    pub fn for_program(info: &ProgramInfo) -> Self {
        Self::for_units(info.units, info)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        let fields = [
            (&mut self.grid_size, overrides.grid_size),
            (&mut self.engraving_depth, overrides.engraving_depth),
            (&mut self.traverse_height, overrides.traverse_height),
            (&mut self.probe_max_depth, overrides.probe_max_depth),
            (&mut self.traverse_speed, overrides.traverse_speed),
            (&mut self.probe_speed, overrides.probe_speed),
            (&mut self.clearance_height, overrides.clearance_height),
            (&mut self.initial_probe_z, overrides.initial_probe_z),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

impl Default for AutolevelConfig {
    fn default() -> Self {
        Self::for_units(Units::Millimeters, &ProgramInfo::default())
    }
}

/// A partial configuration, as read from a JSON file or the command line.
/// Unset fields keep the unit defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub grid_size: Option<f64>,
    pub engraving_depth: Option<f64>,
    pub traverse_height: Option<f64>,
    pub probe_max_depth: Option<f64>,
    pub traverse_speed: Option<f64>,
    pub probe_speed: Option<f64>,
    pub clearance_height: Option<f64>,
    pub initial_probe_z: Option<f64>,
}

impl ConfigOverrides {
    /// Fields set in `other` win over fields set in `self`.
    pub fn merge(self, other: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            grid_size: other.grid_size.or(self.grid_size),
            engraving_depth: other.engraving_depth.or(self.engraving_depth),
            traverse_height: other.traverse_height.or(self.traverse_height),
            probe_max_depth: other.probe_max_depth.or(self.probe_max_depth),
            traverse_speed: other.traverse_speed.or(self.traverse_speed),
            probe_speed: other.probe_speed.or(self.probe_speed),
            clearance_height: other.clearance_height.or(self.clearance_height),
            initial_probe_z: other.initial_probe_z.or(self.initial_probe_z),
        }
    }
}
