use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lux(pub f64);

impl Lux {
    pub fn at_least(self, min: Lux) -> Self {
        Self(self.0.max(min.0))
    }
}

impl Display for Lux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} lux", self.0)
    }
}
