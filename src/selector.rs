use rand::Rng;

use crate::error::{ConfigError, ConfigResult};
use crate::rng::RandomSource;

/// Picks an index from a static weight table with probability
/// `weight / total_weight`. Zero-weight entries are never picked.
///
/// The cumulative table is built once and only read afterwards, so a selector
/// can be shared across any number of concurrent callers.
#[derive(Debug)]
pub struct WeightedSelector {
    /// `(index, cumulative weight)`, strictly increasing in the second field.
    cumulative: Vec<(usize, u64)>,
    total_weight: u64,
    rng: RandomSource,
}

impl WeightedSelector {
    pub fn new(weights: impl IntoIterator<Item = u64>, rng: RandomSource) -> ConfigResult<Self> {
        let mut cumulative = Vec::new();
        let mut total_weight: u64 = 0;
        for (index, weight) in weights.into_iter().enumerate() {
            if weight == 0 {
                continue;
            }
            total_weight = total_weight.saturating_add(weight);
            cumulative.push((index, total_weight));
        }
        if total_weight == 0 {
            return Err(ConfigError::NoSelectableTasks);
        }
        Ok(Self {
            cumulative,
            total_weight,
            rng,
        })
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn select(&self) -> usize {
        let r = self.rng.with_rng(|rng| rng.gen_range(0..self.total_weight));
        self.index_for(r)
    }

    /// Index owning draw `r`: the first entry whose cumulative boundary
    /// exceeds `r`.
    fn index_for(&self, r: u64) -> usize {
        let pos = self.cumulative.partition_point(|&(_, boundary)| boundary <= r);
        self.cumulative[pos.min(self.cumulative.len() - 1)].0
    }
}
