//! Name-to-factory registry for acquisition strategies
//!
//! The registry is an ordinary value: build it once at startup (usually with
//! [`AcquisitionRegistry::with_defaults`]) and hand it to the loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::strategy::AcquisitionStrategy;
use crate::error::{PboError, PboResult};

/// Keyword parameters for a strategy factory
pub type AcquisitionParams = BTreeMap<String, f64>;

/// Builds a configured strategy from keyword parameters
pub type AcquisitionFactory =
    Arc<dyn Fn(&AcquisitionParams) -> PboResult<AcquisitionStrategy> + Send + Sync>;

/// Registry of acquisition strategies by name
#[derive(Clone, Default)]
pub struct AcquisitionRegistry {
    factories: BTreeMap<String, AcquisitionFactory>,
}

impl fmt::Debug for AcquisitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionRegistry")
            .field("names", &self.list_available())
            .finish()
    }
}

impl AcquisitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies and their aliases
    ///
    /// | Name | Parameters |
    /// |---|---|
    /// | `random` | none |
    /// | `thompson_sampling`, `ts` | none |
    /// | `ucb` | `beta` (2.0) |
    /// | `expected_improvement`, `ei` | `xi` (0.01) |
    /// | `variance` | `max_pair_evaluations` (20000) |
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("random", |params| {
            expect_keys("random", params, &[])?;
            Ok(AcquisitionStrategy::Random)
        });

        let thompson = |params: &AcquisitionParams| -> PboResult<AcquisitionStrategy> {
            expect_keys("thompson_sampling", params, &[])?;
            Ok(AcquisitionStrategy::ThompsonSampling)
        };
        registry.register("thompson_sampling", thompson);
        registry.register("ts", thompson);

        registry.register("ucb", |params| {
            expect_keys("ucb", params, &["beta"])?;
            let beta = non_negative("beta", params.get("beta").copied().unwrap_or(2.0))?;
            Ok(AcquisitionStrategy::ucb(beta))
        });

        let ei = |params: &AcquisitionParams| -> PboResult<AcquisitionStrategy> {
            expect_keys("expected_improvement", params, &["xi"])?;
            let xi = params.get("xi").copied().unwrap_or(0.01);
            if !xi.is_finite() {
                return Err(PboError::Configuration(format!("xi must be finite, got {}", xi)));
            }
            Ok(AcquisitionStrategy::expected_improvement(xi))
        };
        registry.register("expected_improvement", ei);
        registry.register("ei", ei);

        registry.register("variance", |params| {
            expect_keys("variance", params, &["max_pair_evaluations"])?;
            let cap = params
                .get("max_pair_evaluations")
                .copied()
                .unwrap_or(20_000.0);
            if !(cap.is_finite() && cap >= 1.0 && cap.fract() == 0.0) {
                return Err(PboError::Configuration(format!(
                    "max_pair_evaluations must be a positive integer, got {}",
                    cap
                )));
            }
            Ok(AcquisitionStrategy::variance(cap as usize))
        });

        registry
    }

    /// Register (or replace) a factory under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AcquisitionParams) -> PboResult<AcquisitionStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registered names, sorted
    pub fn list_available(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Returns true if `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the strategy registered under `name`
    pub fn get(&self, name: &str, params: &AcquisitionParams) -> PboResult<AcquisitionStrategy> {
        let factory = self.factories.get(name).ok_or_else(|| {
            PboError::Configuration(format!(
                "unknown acquisition strategy '{}' (available: {})",
                name,
                self.list_available().join(", ")
            ))
        })?;
        factory(params)
    }
}

fn expect_keys(strategy: &str, params: &AcquisitionParams, allowed: &[&str]) -> PboResult<()> {
    if let Some(key) = params.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(PboError::Configuration(format!(
            "unknown parameter '{}' for {}",
            key, strategy
        )));
    }
    Ok(())
}

fn non_negative(name: &str, value: f64) -> PboResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(PboError::Configuration(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}
