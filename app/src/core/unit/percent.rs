use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(pub f64);

impl Percent {
    pub fn clamp(self) -> Self {
        Self(self.0.clamp(0.0, 100.0))
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0} %", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(Percent(120.0).clamp(), Percent(100.0));
        assert_eq!(Percent(-3.0).clamp(), Percent(0.0));
        assert_eq!(Percent(42.5).clamp(), Percent(42.5));
    }
}
