//! Dynamic marking to MIDI velocity mapping.

use crate::error::{Error, Result};
use crate::score::Dynamic;
use serde::{Deserialize, Serialize};

/// Velocities for `ppp` through `fff`, strictly increasing.
///
/// The default table scales the 0.0–1.0 loudness levels of the notation
/// (0.15, 0.25, 0.4, 0.55, 0.7, 0.85, 0.95, 1.0) to 127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u8; 8]", into = "[u8; 8]")]
pub struct VelocityTable([u8; 8]);

impl VelocityTable {
    /// Builds a table, rejecting values outside 1-127 or that fail to rise
    /// strictly from `ppp` to `fff`.
    pub fn new(velocities: [u8; 8]) -> Result<Self> {
        if let Some(v) = velocities.iter().find(|v| !(1..=127).contains(*v)) {
            return Err(Error::InvalidVelocityTable(format!(
                "velocity {} is outside 1..=127",
                v
            )));
        }
        if let Some(pair) = velocities.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidVelocityTable(format!(
                "velocities must rise strictly, found {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self(velocities))
    }

    /// Velocity for a dynamic.
    pub fn velocity(&self, dynamic: Dynamic) -> u8 {
        self.0[dynamic.index()]
    }
}

impl Default for VelocityTable {
    fn default() -> Self {
        Self([19, 31, 50, 69, 88, 107, 120, 127])
    }
}

impl TryFrom<[u8; 8]> for VelocityTable {
    type Error = Error;

    fn try_from(velocities: [u8; 8]) -> Result<Self> {
        Self::new(velocities)
    }
}

impl From<VelocityTable> for [u8; 8] {
    fn from(table: VelocityTable) -> Self {
        table.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_strictly_increasing() {
        let table = VelocityTable::default();
        let velocities: Vec<u8> = Dynamic::ALL.iter().map(|d| table.velocity(*d)).collect();
        assert!(velocities.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table.velocity(Dynamic::Mf), 88);
        assert_eq!(table.velocity(Dynamic::Fff), 127);
        assert!(VelocityTable::new(velocities.try_into().unwrap()).is_ok());
    }

    #[test]
    fn test_rejects_bad_tables() {
        assert!(VelocityTable::new([10, 20, 30, 40, 40, 60, 70, 80]).is_err());
        assert!(VelocityTable::new([0, 20, 30, 40, 50, 60, 70, 80]).is_err());
        assert!(VelocityTable::new([10, 20, 30, 40, 50, 60, 70, 128]).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let table: VelocityTable = serde_json::from_str("[1,2,3,4,5,6,7,8]").unwrap();
        assert_eq!(table.velocity(Dynamic::Ppp), 1);
        assert!(serde_json::from_str::<VelocityTable>("[8,7,6,5,4,3,2,1]").is_err());
    }
}
