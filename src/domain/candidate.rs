use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a candidate came to exist. Serialized tags are stable because they
/// end up in candidate ids and persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorMethod {
    Random,
    Mutation,
    Crossover,
    Learned,
}

impl GeneratorMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            GeneratorMethod::Random => "random",
            GeneratorMethod::Mutation => "mutation",
            GeneratorMethod::Crossover => "crossover",
            GeneratorMethod::Learned => "learned",
        }
    }
}

impl fmt::Display for GeneratorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Ordered name -> value map. BTreeMap so serialized snapshots and ids are
/// deterministic across runs.
pub type StrategyParams = BTreeMap<String, f64>;

/// Semantic class of a parameter, which decides how mutation perturbs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Discrete lookback length; jitters by whole units.
    Period,
    /// Bounded 0..=100 oscillator level; additive jitter, hard-clamped to
    /// the documented range.
    Percent,
    /// Continuous positive ratio; multiplicative jitter with a floor > 0.
    Ratio,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParameterDomain {
    pub kind: ParameterKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParameterDomain {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// The tunable parameter space of the oscillator strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDomains {
    domains: BTreeMap<String, ParameterDomain>,
}

impl Default for ParameterDomains {
    fn default() -> Self {
        let mut domains = BTreeMap::new();
        domains.insert(
            "osc_period".to_string(),
            ParameterDomain {
                kind: ParameterKind::Period,
                min: 2.0,
                max: 50.0,
                default: 14.0,
            },
        );
        domains.insert(
            "buy_threshold".to_string(),
            ParameterDomain {
                kind: ParameterKind::Percent,
                min: 0.0,
                max: 100.0,
                default: 25.0,
            },
        );
        domains.insert(
            "sell_threshold".to_string(),
            ParameterDomain {
                kind: ParameterKind::Percent,
                min: 0.0,
                max: 100.0,
                default: 75.0,
            },
        );
        domains.insert(
            "risk_fraction".to_string(),
            ParameterDomain {
                kind: ParameterKind::Ratio,
                min: 0.05,
                max: 1.0,
                default: 0.9,
            },
        );
        Self { domains }
    }
}

impl ParameterDomains {
    pub fn get(&self, name: &str) -> Option<&ParameterDomain> {
        self.domains.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterDomain)> {
        self.domains.iter()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn defaults(&self) -> StrategyParams {
        self.domains
            .iter()
            .map(|(name, d)| (name.clone(), d.default))
            .collect()
    }

    /// Clamp every known parameter into its documented range. Unknown
    /// parameters pass through untouched.
    pub fn clamp_all(&self, params: &mut StrategyParams) {
        for (name, value) in params.iter_mut() {
            if let Some(domain) = self.domains.get(name) {
                *value = domain.clamp(*value);
            }
        }
    }
}

/// One parameterization of the trading strategy under test.
///
/// Immutable after creation; superseded, never mutated, when the population
/// advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub id: String,
    pub name: String,
    pub parameters: StrategyParams,
    pub generator_method: GeneratorMethod,
    pub parent_ids: Vec<String>,
    pub generation: u32,
    pub created_at: DateTime<Utc>,
}

impl StrategyCandidate {
    pub fn new(
        generation: u32,
        method: GeneratorMethod,
        index: usize,
        parameters: StrategyParams,
        parent_ids: Vec<String>,
    ) -> Self {
        debug_assert!(parent_ids.len() <= 2);
        let id = format!("gen{:03}-{}-{:02}", generation, method.tag(), index);
        Self {
            name: format!("osc-{}", id),
            id,
            parameters,
            generator_method: method,
            parent_ids,
            generation,
            created_at: Utc::now(),
        }
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }
}
