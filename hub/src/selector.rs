use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::guardian::GuardianStyle;

/// Chooses the style of each guardian spawned on growth.
pub trait StyleSelector: Send + Sync {
    /// Next style to spawn.
    fn select(&mut self) -> GuardianStyle;
}

/// Uniform choice over the three styles.
#[derive(Debug, Clone)]
pub struct RandomStyleSelector {
    rng: SmallRng,
}

impl RandomStyleSelector {
    /// Reproducible sequence for a given seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Seeded when a seed is given, entropy otherwise.
    #[must_use]
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }
}

impl Default for RandomStyleSelector {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl StyleSelector for RandomStyleSelector {
    fn select(&mut self) -> GuardianStyle {
        GuardianStyle::ALL[self.rng.gen_range(0..GuardianStyle::ALL.len())]
    }
}
