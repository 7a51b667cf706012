use commonware_brin::{Config, Index};
use commonware_runtime::Metrics;
use prometheus_client::registry::Metric;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Clone)]
pub struct DummyMetrics;

impl Metrics for DummyMetrics {
    fn label(&self) -> String {
        "".to_string()
    }

    fn with_label(&self, _: &str) -> Self {
        Self
    }

    fn encode(&self) -> String {
        "".to_string()
    }

    fn register<N: Into<String>, H: Into<String>>(&self, _: N, _: H, _: impl Metric) {}
}

/// Generate `items` keys in the given order ("ascending", "descending", or "random").
pub fn keys(items: usize, order: &str) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..items as u64).collect();
    match order {
        "ascending" => {}
        "descending" => keys.reverse(),
        "random" => keys.shuffle(&mut StdRng::seed_from_u64(0)),
        _ => unreachable!("unknown order: {order}"),
    }
    keys
}

/// Create an index populated with `keys`, using each key as its own value.
pub fn populate(capacity: usize, keys: &[u64]) -> Index<u64, u64> {
    let index = Index::init(DummyMetrics, Config { capacity }).unwrap();
    for key in keys {
        index.put(*key, *key);
    }
    index
}
