//! Ordered fallback tiers.
//!
//! A [`FallbackChain`] holds named attempts that are tried in order until one
//! succeeds. Failures of earlier tiers are kept so callers can report which
//! tiers were skipped and why.

use std::fmt;

type Attempt<I, O, E> = Box<dyn Fn(&I) -> Result<O, E> + Send + Sync>;

/// A tier that did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub struct TierFailure<E> {
    pub tier: &'static str,
    pub error: E,
}

/// The value produced by the first successful tier.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<O, E> {
    /// Name of the tier that succeeded.
    pub tier: &'static str,
    /// Position of that tier in the chain.
    pub index: usize,
    pub value: O,
    /// Earlier tiers that failed, in order.
    pub failures: Vec<TierFailure<E>>,
}

/// Named attempts evaluated in order with early exit.
pub struct FallbackChain<I: ?Sized, O, E> {
    tiers: Vec<(&'static str, Attempt<I, O, E>)>,
}

impl<I: ?Sized, O, E> FallbackChain<I, O, E> {
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    /// Append a tier.
    pub fn tier<F>(mut self, name: &'static str, attempt: F) -> Self
    where
        F: Fn(&I) -> Result<O, E> + Send + Sync + 'static,
    {
        self.tiers.push((name, Box::new(attempt)));
        self
    }

    /// Tier names, in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|(name, _)| *name).collect()
    }

    /// Try each tier in order and stop at the first success. Returns every
    /// failure if no tier succeeds.
    pub fn run(&self, input: &I) -> Result<Resolved<O, E>, Vec<TierFailure<E>>> {
        let mut failures = Vec::new();
        for (index, (tier, attempt)) in self.tiers.iter().enumerate() {
            match attempt(input) {
                Ok(value) => {
                    return Ok(Resolved {
                        tier: *tier,
                        index,
                        value,
                        failures,
                    })
                }
                Err(error) => failures.push(TierFailure { tier: *tier, error }),
            }
        }
        Err(failures)
    }
}

impl<I: ?Sized, O, E> Default for FallbackChain<I, O, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized, O, E> fmt::Debug for FallbackChain<I, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("tiers", &self.names())
            .finish()
    }
}
