#![forbid(unsafe_code)]
//! Deterministic multi-replica convergence harness for ChronoTree.
//!
//! A [`Simulator`] drives N replicas over one shared in-memory store. Each
//! round every replica publishes a post replying to a randomly chosen known
//! Content node (or a fresh root), then every ordered pair folds the other's
//! current digest in. After every round the oracle requires full observable
//! convergence. A seed determines the entire run.

pub mod oracle;
pub mod rng;

use anyhow::{Result, bail, ensure};
use chronotree_core::{ChronoTree, Hash, MemoryStore, Node};
use serde::{Deserialize, Serialize};

use crate::oracle::{ConvergenceOracle, ConvergenceReport};
use crate::rng::DeterministicRng;

/// Top-level simulation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// RNG seed controlling all nondeterminism.
    pub seed: u64,
    /// Number of replicas gossiping through the shared store.
    pub replica_count: usize,
    /// Number of add-then-merge rounds.
    pub rounds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            replica_count: 3,
            rounds: 100,
        }
    }
}

/// Oracle verdict for one completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    /// The round index, starting at 0.
    pub round: u64,
    /// Convergence check after the round's merges.
    pub report: ConvergenceReport,
}

/// Completed simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    /// Per-round oracle verdicts. Stops at the first divergent round.
    pub rounds: Vec<RoundReport>,
    /// Whether every round converged.
    pub converged: bool,
    /// The fleet's agreed digest after the final round.
    pub final_bitter_end: Option<Hash>,
}

/// Deterministic replica fleet driver.
pub struct Simulator {
    config: SimulationConfig,
    store: MemoryStore,
    replicas: Vec<ChronoTree<MemoryStore>>,
    rng: DeterministicRng,
}

impl Simulator {
    /// Build a simulator from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a replica cannot
    /// be constructed.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.replica_count == 0 {
            bail!("replica_count must be > 0");
        }
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }

        let store = MemoryStore::new();
        let mut replicas = Vec::with_capacity(config.replica_count);
        for index in 0..config.replica_count {
            let name = format!("replica-{index}");
            replicas.push(ChronoTree::new(store.clone(), Some(&name))?);
        }

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            store,
            replicas,
            config,
        })
    }

    /// The shared store the fleet gossips through.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Execute all rounds, stopping early on divergence.
    ///
    /// # Errors
    ///
    /// Propagates engine and oracle failures.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut rounds = Vec::with_capacity(usize::try_from(self.config.rounds).unwrap_or(0));

        for round in 0..self.config.rounds {
            for index in 0..self.replicas.len() {
                let parent = self.pick_parent(index);
                let payload = format!("replica-{index} round-{round}").into_bytes();
                self.replicas[index].add(Node::content(payload, parent))?;
            }

            for source in 0..self.replicas.len() {
                for target in 0..self.replicas.len() {
                    if source == target {
                        continue;
                    }
                    let digest = self.replicas[target].bitter_end().clone();
                    self.replicas[source].merge(&digest)?;
                }
            }

            let report = ConvergenceOracle::evaluate(&self.replicas)?;
            let converged = report.converged;
            rounds.push(RoundReport { round, report });
            if !converged {
                return Ok(SimulationResult {
                    rounds,
                    converged: false,
                    final_bitter_end: None,
                });
            }
        }

        let final_bitter_end = rounds
            .last()
            .and_then(|last| last.report.bitter_end.clone());
        Ok(SimulationResult {
            rounds,
            converged: true,
            final_bitter_end,
        })
    }

    /// Choose a parent for the next post: a uniformly random known Content
    /// hash, or `None` (a fresh root) while the replica knows none.
    fn pick_parent(&mut self, index: usize) -> Option<Hash> {
        let content: Vec<Hash> = self.replicas[index]
            .known_nodes()
            .into_iter()
            .filter(|(_, node)| node.is_content())
            .map(|(hash, _)| hash.clone())
            .collect();
        self.rng.pick(&content).cloned()
    }
}

/// Run one simulation and require convergence at every round.
///
/// # Errors
///
/// Returns an error on invalid config, engine failure, or divergence.
pub fn run_converging(config: SimulationConfig) -> Result<SimulationResult> {
    let mut simulator = Simulator::new(config)?;
    let result = simulator.run()?;
    ensure!(
        result.converged,
        "replicas diverged at round {}",
        result
            .rounds
            .last()
            .map_or(0, |round_report| round_report.round)
    );
    Ok(result)
}
