use rand::Rng;

/// A declared request target. For scheduling purposes only `name` and
/// `weight` matter — everything else an executor needs (URL, method,
/// payload template) lives outside the core engine's concern.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub weight: u32,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// The implicit endpoint used when none are declared.
    pub fn default_unnamed() -> Self {
        Self {
            name: String::new(),
            weight: 1,
        }
    }
}

/// Precomputed cumulative-weight selector (Design Notes §9: "precompute a
/// cumulative weight array; binary search on each permit").
#[derive(Debug, Clone)]
pub struct WeightedPicker {
    endpoints: Vec<Endpoint>,
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl WeightedPicker {
    /// Builds a picker over `endpoints`. An empty list falls back to the
    /// implicit default endpoint. A zero total weight is treated as
    /// uniform among the declared endpoints.
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        if endpoints.is_empty() {
            endpoints.push(Endpoint::default_unnamed());
        }

        let raw_total: u64 = endpoints.iter().map(|e| e.weight as u64).sum();
        let effective_weights: Vec<u64> = if raw_total == 0 {
            vec![1; endpoints.len()]
        } else {
            endpoints.iter().map(|e| e.weight as u64).collect()
        };

        let mut cumulative = Vec::with_capacity(endpoints.len());
        let mut running = 0u64;
        for w in &effective_weights {
            running += w;
            cumulative.push(running);
        }

        Self {
            endpoints,
            cumulative,
            total_weight: running,
        }
    }

    /// Draws one endpoint, weighted by its relative share.
    pub fn pick(&self, rng: &mut impl Rng) -> &Endpoint {
        if self.endpoints.len() == 1 {
            return &self.endpoints[0];
        }
        let draw = rng.gen_range(0..self.total_weight);
        let idx = match self.cumulative.binary_search(&draw) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        let idx = idx.min(self.endpoints.len() - 1);
        &self.endpoints[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    #[test]
    fn empty_list_falls_back_to_default() {
        let picker = WeightedPicker::new(vec![]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(picker.pick(&mut rng).name, "");
    }

    #[test]
    fn zero_total_weight_is_uniform() {
        let picker = WeightedPicker::new(vec![
            Endpoint::new("a", 0),
            Endpoint::new("b", 0),
        ]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..2000 {
            *counts.entry(picker.pick(&mut rng).name.clone()).or_default() += 1;
        }
        let a = *counts.get("a").unwrap() as f64;
        let b = *counts.get("b").unwrap() as f64;
        assert!((a / b - 1.0).abs() < 0.2, "a={a} b={b}");
    }

    #[test]
    fn weighted_draw_matches_ratio() {
        let picker = WeightedPicker::new(vec![
            Endpoint::new("A", 3),
            Endpoint::new("B", 1),
        ]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..4000 {
            *counts.entry(picker.pick(&mut rng).name.clone()).or_default() += 1;
        }
        let a = *counts.get("A").unwrap() as f64 / 4000.0;
        let b = *counts.get("B").unwrap() as f64 / 4000.0;
        assert!((a - 0.75).abs() < 0.05, "a={a}");
        assert!((b - 0.25).abs() < 0.05, "b={b}");
    }
}
