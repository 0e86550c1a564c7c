//! # Accumulator Pool
//!
//! A single pooled resource (e.g. a settlement-wide power reserve) fed by many
//! generators and drained by consumers.
//!
//! ## Tick Order
//!
//! ```text
//! tick(dt):
//!   1. generation_rate = multiplier * sum(clamp(rate, min, max) for active generators)
//!   2. current += accepted(generation_rate * dt)     (capped at max if enforced)
//!   3. pending requests are attempted in posting order
//! ```
//!
//! ## Request Inbox
//!
//! Callers that cannot call [`AccumulatorPool::try_consume`] directly post a
//! request instead. The pool marks it `fulfilled` once it can be paid in full.
//! The pool never deletes requests: the poster reads the result and removes
//! the record with [`AccumulatorPool::remove_request`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{EconomyError, EconomyResult};

/// Pool tuning, usually loaded from TOML.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on `current` when `enforce_cap` is set.
    pub max: f64,
    /// Whether generation stops at `max`. When off, the pool may overfill.
    pub enforce_cap: bool,
    /// Lowest rate a single active generator contributes.
    pub generator_min_rate: f64,
    /// Highest rate a single active generator contributes.
    pub generator_max_rate: f64,
    /// Global scale applied to the summed rate.
    pub rate_multiplier: f64,
}

impl PoolConfig {
    /// Parses a pool configuration from TOML. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` for malformed TOML and `InvalidConfig` for a
    /// negative `max` or an empty generator band.
    pub fn from_toml_str(source: &str) -> EconomyResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EconomyError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the pool cannot honor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the problem.
    pub fn validate(&self) -> EconomyResult<()> {
        if self.max.is_nan() || self.max < 0.0 {
            return Err(EconomyError::InvalidConfig(format!(
                "pool max must be non-negative, got {}",
                self.max
            )));
        }
        if self.generator_min_rate.is_nan()
            || self.generator_max_rate.is_nan()
            || self.generator_min_rate > self.generator_max_rate
        {
            return Err(EconomyError::InvalidConfig(format!(
                "generator band [{}, {}] is empty",
                self.generator_min_rate, self.generator_max_rate
            )));
        }
        if self.rate_multiplier.is_nan() {
            return Err(EconomyError::InvalidConfig(
                "rate multiplier must be a number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 1000.0,
            enforce_cap: true,
            generator_min_rate: 0.0,
            generator_max_rate: f64::INFINITY,
            rate_multiplier: 1.0,
        }
    }
}

/// Handle to a registered generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeneratorId(u32);

/// Handle to a posted consumption request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// A producer feeding the pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Generator {
    /// Nominal output per unit of time.
    pub rate: f64,
    /// Inactive generators contribute nothing.
    pub active: bool,
}

/// A deferred draw on the pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConsumptionRequest {
    /// Amount to draw.
    pub amount: f64,
    /// Set by the pool once the amount was paid.
    pub fulfilled: bool,
}

/// Summary of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Amount added to the pool this tick.
    pub generated: f64,
    /// Requests fulfilled this tick.
    pub fulfilled: usize,
    /// Requests still waiting after this tick.
    pub pending: usize,
}

/// Pays `amount` out of `current` if it is fully covered.
#[inline]
fn draw(current: &mut f64, total_consumed: &mut f64, amount: f64) -> bool {
    if amount.is_nan() || amount <= 0.0 || amount > *current {
        return false;
    }
    *current -= amount;
    *total_consumed += amount;
    true
}

/// A rate-driven shared reserve.
#[derive(Clone, Debug)]
pub struct AccumulatorPool {
    config: PoolConfig,
    current: f64,
    generation_rate: f64,
    total_generated: f64,
    total_consumed: f64,
    /// Ordered by id so rate sums are reproducible.
    generators: BTreeMap<GeneratorId, Generator>,
    /// Ordered by id, which is posting order.
    requests: BTreeMap<RequestId, ConsumptionRequest>,
    next_generator: u32,
    next_request: u64,
}

impl AccumulatorPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self::with_current(config, 0.0)
    }

    /// Creates a pool holding `current` units.
    #[must_use]
    pub fn with_current(config: PoolConfig, current: f64) -> Self {
        Self {
            config,
            current: if current.is_nan() { 0.0 } else { current.max(0.0) },
            generation_rate: 0.0,
            total_generated: 0.0,
            total_consumed: 0.0,
            generators: BTreeMap::new(),
            requests: BTreeMap::new(),
            next_generator: 0,
            next_request: 0,
        }
    }

    /// Current stock.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> f64 {
        self.current
    }

    /// Configured cap.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.config.max
    }

    /// Rate computed on the last tick or `recompute_rate` call.
    #[inline]
    #[must_use]
    pub const fn generation_rate(&self) -> f64 {
        self.generation_rate
    }

    /// Everything ever added by generation.
    #[inline]
    #[must_use]
    pub const fn total_generated(&self) -> f64 {
        self.total_generated
    }

    /// Everything ever paid out.
    #[inline]
    #[must_use]
    pub const fn total_consumed(&self) -> f64 {
        self.total_consumed
    }

    /// The pool's configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Changes the global rate multiplier. Takes effect on the next tick.
    pub fn set_rate_multiplier(&mut self, multiplier: f64) {
        self.config.rate_multiplier = multiplier;
    }

    // =========================================================================
    // Generators
    // =========================================================================

    /// Registers an active generator.
    pub fn add_generator(&mut self, rate: f64) -> GeneratorId {
        let id = GeneratorId(self.next_generator);
        self.next_generator += 1;
        self.generators.insert(id, Generator { rate, active: true });
        id
    }

    /// Switches a generator on or off. Returns false for unknown ids.
    pub fn set_generator_active(&mut self, id: GeneratorId, active: bool) -> bool {
        self.generators
            .get_mut(&id)
            .map(|g| g.active = active)
            .is_some()
    }

    /// Changes a generator's nominal rate. Returns false for unknown ids.
    pub fn set_generator_rate(&mut self, id: GeneratorId, rate: f64) -> bool {
        self.generators
            .get_mut(&id)
            .map(|g| g.rate = rate)
            .is_some()
    }

    /// Unregisters a generator.
    pub fn remove_generator(&mut self, id: GeneratorId) -> Option<Generator> {
        self.generators.remove(&id)
    }

    /// Looks up a generator.
    #[must_use]
    pub fn generator(&self, id: GeneratorId) -> Option<&Generator> {
        self.generators.get(&id)
    }

    /// Recomputes `generation_rate` from the active generators.
    ///
    /// Each active rate is clamped into the configured band before summing;
    /// the sum is scaled by the global multiplier.
    pub fn recompute_rate(&mut self) -> f64 {
        let (min, max) = (self.config.generator_min_rate, self.config.generator_max_rate);
        let sum: f64 = self
            .generators
            .values()
            .filter(|g| g.active)
            .map(|g| g.rate.max(min).min(max))
            .sum();
        self.generation_rate = sum * self.config.rate_multiplier;
        self.generation_rate
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advances the pool by `delta_time`.
    ///
    /// Generation that would push `current` past `max` is discarded when the
    /// cap is enforced. Non-positive or NaN generation adds nothing.
    pub fn tick(&mut self, delta_time: f64) -> TickReport {
        let rate = self.recompute_rate();
        let to_add = rate * delta_time;

        let accepted = if to_add.is_nan() || to_add <= 0.0 {
            0.0
        } else if self.config.enforce_cap {
            to_add.min((self.config.max - self.current).max(0.0))
        } else {
            to_add
        };
        self.current += accepted;
        self.total_generated += accepted;

        let mut fulfilled = 0;
        let mut pending = 0;
        for request in self.requests.values_mut().filter(|r| !r.fulfilled) {
            if draw(&mut self.current, &mut self.total_consumed, request.amount) {
                request.fulfilled = true;
                fulfilled += 1;
            } else {
                pending += 1;
            }
        }

        trace!(
            generated = accepted,
            current = self.current,
            fulfilled,
            pending,
            "pool tick"
        );

        TickReport {
            generated: accepted,
            fulfilled,
            pending,
        }
    }

    /// Draws `amount` immediately if the pool holds at least that much.
    ///
    /// Returns false, without changing anything, for non-positive amounts or
    /// when `amount > current`.
    pub fn try_consume(&mut self, amount: f64) -> bool {
        draw(&mut self.current, &mut self.total_consumed, amount)
    }

    // =========================================================================
    // Request inbox
    // =========================================================================

    /// Posts a deferred draw, attempted on every tick until fulfilled.
    ///
    /// Requests for non-positive amounts are kept but never fulfilled.
    pub fn post_request(&mut self, amount: f64) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.requests.insert(
            id,
            ConsumptionRequest {
                amount,
                fulfilled: false,
            },
        );
        id
    }

    /// Reads a request record.
    #[must_use]
    pub fn request(&self, id: RequestId) -> Option<&ConsumptionRequest> {
        self.requests.get(&id)
    }

    /// Removes a request record. This is the poster's job, fulfilled or not.
    pub fn remove_request(&mut self, id: RequestId) -> Option<ConsumptionRequest> {
        self.requests.remove(&id)
    }

    /// Iterates over all request records in posting order.
    pub fn requests(&self) -> impl Iterator<Item = (RequestId, &ConsumptionRequest)> {
        self.requests.iter().map(|(&id, r)| (id, r))
    }

    /// Number of requests still waiting.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.values().filter(|r| !r.fulfilled).count()
    }
}
