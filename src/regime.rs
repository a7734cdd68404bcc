use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Operating regime of a thermostatically cycled load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Idle,
    Cooling,
}

impl Regime {
    pub const ALL: [Regime; 2] = [Regime::Idle, Regime::Cooling];

    /// Split-point classification used during bootstrap. Ties go to cooling.
    pub fn classify(power: f64, threshold: f64) -> Self {
        if power >= threshold {
            Regime::Cooling
        } else {
            Regime::Idle
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Regime::Idle => "idle",
            Regime::Cooling => "cooling",
        }
    }

    fn slot(self) -> usize {
        match self {
            Regime::Idle => 0,
            Regime::Cooling => 1,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per regime, indexed by [`Regime`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimeMap<T> {
    slots: [T; 2],
}

impl<T> RegimeMap<T> {
    pub fn new(idle: T, cooling: T) -> Self {
        Self { slots: [idle, cooling] }
    }

    pub fn from_fn(mut f: impl FnMut(Regime) -> T) -> Self {
        Self::new(f(Regime::Idle), f(Regime::Cooling))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Regime, &T)> {
        Regime::ALL.into_iter().zip(self.slots.iter())
    }
}

impl<T> Index<Regime> for RegimeMap<T> {
    type Output = T;

    fn index(&self, regime: Regime) -> &T {
        &self.slots[regime.slot()]
    }
}

impl<T> IndexMut<Regime> for RegimeMap<T> {
    fn index_mut(&mut self, regime: Regime) -> &mut T {
        &mut self.slots[regime.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ties_to_cooling() {
        assert_eq!(Regime::classify(10.0, 10.0), Regime::Cooling);
        assert_eq!(Regime::classify(9.99, 10.0), Regime::Idle);
        assert_eq!(Regime::classify(50.0, 10.0), Regime::Cooling);
    }

    #[test]
    fn test_regime_map_indexing() {
        let mut map = RegimeMap::new(1.0, 2.0);
        assert_eq!(map[Regime::Idle], 1.0);
        assert_eq!(map[Regime::Cooling], 2.0);
        map[Regime::Idle] = 3.0;
        let collected: Vec<_> = map.iter().map(|(r, v)| (r, *v)).collect();
        assert_eq!(collected, vec![(Regime::Idle, 3.0), (Regime::Cooling, 2.0)]);
    }
}
