//! # The Decision Oracle
//!
//! Resolves one decision per (choice kind, site) and keeps every decision it
//! ever made, so that repeated passes in one process and later processes
//! seeded with a control string agree on every site.
//!
//! ## Resolution
//! Each call to [`DecisionOracle::resolve`]:
//! 1. assigns the owning function its global ordinal on first sight,
//! 2. takes the next position in the (kind, function) stream. The counter
//!    advances on *every* lookup, cached or not, and is never reset between
//!    instances, so positions mirror traversal order exactly. A consumer
//!    that walks sites in a different order than the producer silently
//!    reads other sites' decisions,
//! 3. applies the precedence *position slot → name cache → default*,
//!    backfilling whichever layer was empty,
//! 4. returns the 0-based choice.
//!
//! Stored decisions are 1-based; 0 marks an unresolved slot.

pub mod functions;
pub mod instance;
pub mod site;

pub use functions::FunctionTable;
pub use instance::InstanceCoordinator;
pub use site::Site;

use codec::{CodecError, SeededChoice};
use common::{AnnotatorConfig, ChoiceKind, ChoiceRecord, Origin};
use std::collections::HashMap;

/// Fatal resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("{kind}: zero cardinality requested for site {site:?}")]
    ZeroCardinality { kind: ChoiceKind, site: String },
    #[error("{kind}: site {site:?} has no owning function")]
    UnknownOwner { kind: ChoiceKind, site: String },
    #[error("{kind}: unnamed site in function {function:?}")]
    UnnamedSite { kind: ChoiceKind, function: String },
    #[error("invalid control input: {0}")]
    Codec(#[from] CodecError),
}

/// Oracle policy knobs, a subset of [`AnnotatorConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleConfig {
    pub default_optimistic: bool,
    /// `None` = unlimited.
    pub run_limit: Option<u32>,
    /// Record every resolution.
    pub print_choices: bool,
    /// Record default-path resolutions of the last eligible instance.
    pub print_opportunities: bool,
}

impl From<&AnnotatorConfig> for OracleConfig {
    fn from(config: &AnnotatorConfig) -> Self {
        Self {
            default_optimistic: config.default_optimistic,
            run_limit: config.run_limit(),
            print_choices: config.print_choices,
            print_opportunities: config.print_opportunities,
        }
    }
}

/// Process-wide decision state. Construct one per process (or per test).
#[derive(Debug, Default)]
pub struct DecisionOracle {
    config: OracleConfig,
    functions: FunctionTable,
    choice_maps: HashMap<(ChoiceKind, u32), Vec<u32>>,
    positions: HashMap<(ChoiceKind, u32), u32>,
    name_cache: HashMap<ChoiceKind, HashMap<String, u32>>,
    instances: InstanceCoordinator,
    trace: Vec<ChoiceRecord>,
}

impl DecisionOracle {
    pub fn new(config: OracleConfig) -> Self {
        let instances = InstanceCoordinator::new(config.run_limit);
        Self {
            config,
            instances,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn instances(&self) -> &InstanceCoordinator {
        &self.instances
    }

    /// Starts a pass instance; `None` if the run limit is exhausted.
    pub fn begin_instance(&mut self) -> Option<u32> {
        let instance = self.instances.begin();
        tracing::info!(
            instance = ?instance,
            started = self.instances.started(),
            limit = ?self.instances.limit(),
            "begin annotation instance"
        );
        instance
    }

    /// Global ordinal of `function`, assigned on first sight.
    pub fn function_ordinal(&mut self, function: &str) -> u32 {
        self.functions.ordinal(function)
    }

    /// Appends seeds to their (kind, function) streams at the next unused slot.
    pub fn seed(&mut self, seeds: &[SeededChoice]) {
        for seed in seeds {
            self.choice_maps
                .entry((seed.kind, seed.function))
                .or_default()
                .push(u32::from(seed.decision));
        }
    }

    /// Decodes and seeds the global control string. Returns the number of decisions.
    pub fn seed_global(&mut self, control: &str) -> Result<usize, OracleError> {
        let seeds = codec::decode_global(control)?;
        self.seed(&seeds);
        tracing::info!(decisions = seeds.len(), "seeded global control string");
        Ok(seeds.len())
    }

    /// Decodes and seeds data embedded for `function`.
    pub fn seed_embedded(&mut self, function: &str, data: &str) -> Result<usize, OracleError> {
        let ordinal = self.functions.ordinal(function);
        let seeds = codec::decode_embedded(data, ordinal)?;
        self.seed(&seeds);
        tracing::info!(function, ordinal, decisions = seeds.len(), "seeded embedded choices");
        Ok(seeds.len())
    }

    /// Resolves the decision for `site` under `kind` and returns the 0-based choice.
    ///
    /// # Errors
    /// Zero cardinality, an empty owner or an empty site name are fatal.
    pub fn resolve(
        &mut self,
        kind: ChoiceKind,
        site: &Site<'_>,
        cardinality: u32,
    ) -> Result<u32, OracleError> {
        let owner = site.owner();
        let name = site.name();
        if owner.is_empty() {
            return Err(OracleError::UnknownOwner {
                kind,
                site: name.to_string(),
            });
        }
        if name.is_empty() {
            return Err(OracleError::UnnamedSite {
                kind,
                function: owner.to_string(),
            });
        }
        if cardinality == 0 {
            return Err(OracleError::ZeroCardinality {
                kind,
                site: name.to_string(),
            });
        }

        let function = self.functions.ordinal(owner);
        let counter = self.positions.entry((kind, function)).or_insert(0);
        let index = *counter as usize;
        *counter += 1;

        let map = self.choice_maps.entry((kind, function)).or_default();
        if map.len() <= index {
            map.resize(index + 1, 0);
        }
        let slot = &mut map[index];
        let cache = self.name_cache.entry(kind).or_default();
        let cached = cache.get(name).copied().unwrap_or(0);

        let (decision, origin) = if *slot > 0 {
            let decision = saturate(kind, name, *slot, cardinality);
            cache.insert(name.to_string(), decision);
            (decision, Origin::Slot)
        } else if cached > 0 {
            let decision = saturate(kind, name, cached, cardinality);
            *slot = decision;
            (decision, Origin::Cache)
        } else {
            let decision = if self.config.default_optimistic {
                cardinality
            } else {
                1
            };
            *slot = decision;
            cache.insert(name.to_string(), decision);
            (decision, Origin::Default)
        };

        let choice = decision - 1;
        let position = index as u32 + 1;
        tracing::debug!(%kind, function, position, site = name, choice, ?origin, "resolved");

        let opportunity = origin == Origin::Default
            && self.config.print_opportunities
            && self.instances.is_last_eligible();
        if self.config.print_choices || opportunity {
            self.trace.push(ChoiceRecord {
                cardinality,
                choice,
                kind,
                function,
                position,
                site: name.to_string(),
                function_name: owner.to_string(),
                origin,
            });
        }
        Ok(choice)
    }

    /// Stored 1-based decision at a 1-based position, `0` if unresolved.
    pub fn slot(&self, kind: ChoiceKind, function: u32, position: u32) -> Option<u32> {
        let index = position.checked_sub(1)? as usize;
        self.choice_maps.get(&(kind, function))?.get(index).copied()
    }

    /// Whole (kind, function) stream of 1-based decisions.
    pub fn choice_map(&self, kind: ChoiceKind, function: u32) -> &[u32] {
        self.choice_maps
            .get(&(kind, function))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Name-cache entry (1-based) for `name` under `kind`.
    pub fn cached(&self, kind: ChoiceKind, name: &str) -> Option<u32> {
        self.name_cache.get(&kind)?.get(name).copied()
    }

    /// Number of lookups made so far for (kind, function).
    pub fn lookups(&self, kind: ChoiceKind, function: u32) -> u32 {
        self.positions.get(&(kind, function)).copied().unwrap_or(0)
    }

    pub fn trace(&self) -> &[ChoiceRecord] {
        &self.trace
    }

    /// Hands the recorded choice lines to the caller.
    pub fn take_trace(&mut self) -> Vec<ChoiceRecord> {
        std::mem::take(&mut self.trace)
    }

    /// Forgets every decision, ordinal and instance; keeps the configuration.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

/// Decisions wider than the site's cardinality select its highest choice.
fn saturate(kind: ChoiceKind, site: &str, decision: u32, cardinality: u32) -> u32 {
    if decision > cardinality {
        tracing::warn!(%kind, site, decision, cardinality, "decision exceeds cardinality, using highest choice");
        cardinality
    } else {
        decision
    }
}
