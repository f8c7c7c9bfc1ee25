// Session bookkeeping shared across components: atomic counters, tick
// timing history and the CSV summary export.

pub mod export;
pub mod metrics;
