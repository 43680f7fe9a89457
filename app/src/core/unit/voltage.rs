use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::Percent;

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilliVolt(pub f64);

impl MilliVolt {
    //Linear between 0 and the full charge voltage, not clamped
    pub fn share_of(self, full: MilliVolt) -> Percent {
        Percent(100.0 / full.0 * self.0)
    }
}

impl Display for MilliVolt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} mV", self.0)
    }
}
