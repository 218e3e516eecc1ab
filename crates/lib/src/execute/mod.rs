//! Scheduler/Executor.
//!
//! Runs a [`BuildGraph`] under bounded concurrency:
//! - a node becomes ready once every predecessor is Succeeded or UpToDate
//! - ready nodes are dispatched in topological rank order
//! - each node is fingerprinted and skipped if up to date
//! - stale nodes take a permit from their scope's semaphore, then run
//! - a failure skips everything downstream of it and nothing else
//!
//! The coordinator owns all node state. Workers only compute fingerprints
//! and run processes; their outcomes come back through a [`JoinSet`], so a
//! node can never be dispatched twice.

mod process;
mod types;

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::consts::STDERR_TAIL_LINES;
use crate::deps::VcsFetcher;
use crate::graph::{Action, BuildGraph, BuildUnit, NodeId, Scope};
use crate::stale::{
  DigestCache, FingerprintRecord, FingerprintStore, Staleness, StalenessPolicy, StoreError, fingerprint,
};
use crate::util::hash::{ContentHash, FieldHasher};

pub use process::{ProcessExecutor, ProcessOutput, ShellExecutor, tail};
pub use types::{
  BuildReport, CancelFlag, ExecuteConfig, FailureKind, NodeFailure, SkipCause, SkippedNode, default_jobs,
};

/// How a worker left a node.
#[derive(Debug)]
enum Outcome {
  UpToDate(Stamp),
  Succeeded(Stamp),
  Failed(NodeFailure),
  /// Stale, but the run was cancelled before it started.
  Cancelled,
}

/// A finished node's fingerprint, plus the commit a fetch node checked out.
#[derive(Debug, Clone)]
struct Stamp {
  fingerprint: ContentHash,
  revision: Option<String>,
}

impl Stamp {
  fn new(fingerprint: ContentHash) -> Self {
    Self {
      fingerprint,
      revision: None,
    }
  }

  /// The digest dependents fold into their own fingerprints.
  ///
  /// A fetch node's own fingerprint only covers source and version; the
  /// checked-out commit is what changes when upstream moves.
  fn downstream(&self) -> ContentHash {
    let Some(revision) = &self.revision else {
      return self.fingerprint.clone();
    };
    let mut hasher = FieldHasher::new();
    hasher
      .field("fingerprint", &self.fingerprint.0)
      .field("revision", revision);
    hasher.finish()
  }
}

/// What every worker needs. Cloned into tasks behind an `Arc`.
struct Worker {
  executor: Arc<dyn ProcessExecutor>,
  fetcher: Arc<dyn VcsFetcher>,
  store: Arc<FingerprintStore>,
  cache: DigestCache,
  policy: StalenessPolicy,
  cancel: CancelFlag,
}

/// Executes build graphs against one fingerprint store.
pub struct Scheduler {
  executor: Arc<dyn ProcessExecutor>,
  fetcher: Arc<dyn VcsFetcher>,
  store: Arc<FingerprintStore>,
}

impl Scheduler {
  /// # Arguments
  ///
  /// * `executor` - Runs compile, link, rule and dependency-build commands
  /// * `fetcher` - Provides remote dependency checkouts
  /// * `store` - Fingerprints from previous runs, updated as nodes finish
  pub fn new(executor: Arc<dyn ProcessExecutor>, fetcher: Arc<dyn VcsFetcher>, store: Arc<FingerprintStore>) -> Self {
    Self {
      executor,
      fetcher,
      store,
    }
  }

  pub fn store(&self) -> &FingerprintStore {
    &self.store
  }

  /// Run every node of `graph` to a terminal state and flush the store.
  ///
  /// Node failures never abort the run; they are collected in the report
  /// along with the nodes skipped because of them. On cancellation the
  /// scheduler stops dispatching, waits for in-flight nodes, and marks
  /// everything else skipped.
  ///
  /// # Errors
  ///
  /// Only if the fingerprint store cannot be written at the end.
  pub async fn run(&self, graph: &BuildGraph, config: &ExecuteConfig) -> Result<BuildReport, StoreError> {
    let jobs = config.jobs.max(1);
    let worker = Arc::new(Worker {
      executor: self.executor.clone(),
      fetcher: self.fetcher.clone(),
      store: self.store.clone(),
      cache: DigestCache::new(),
      policy: StalenessPolicy {
        triggers: config.triggers.clone(),
        force_fetch: config.force_fetch,
      },
      cancel: config.cancel.clone(),
    });

    let global = Arc::new(Semaphore::new(jobs));
    let mut capped: HashMap<String, Arc<Semaphore>> = HashMap::new();
    for unit in graph.units() {
      if let Scope::Capped { subproject, jobs } = &unit.scope {
        capped
          .entry(subproject.clone())
          .or_insert_with(|| Arc::new(Semaphore::new((*jobs).max(1))));
      }
    }

    info!(nodes = graph.len(), jobs, capped_scopes = capped.len(), "starting build");

    let mut state = RunState::new(graph, &self.store);
    let mut tasks = JoinSet::new();
    let mut in_flight: HashMap<task::Id, NodeIndex> = HashMap::new();

    loop {
      while !config.cancel.is_cancelled()
        && let Some(idx) = state.pop_ready()
      {
        let unit = graph.unit(idx);
        let predecessors = state.predecessor_fingerprints(idx);

        if let Action::Flags { failure, .. } = &unit.action {
          let outcome = match failure {
            Some(message) => Outcome::Failed(failure_of(unit, None, message.clone())),
            None => Outcome::UpToDate(Stamp::new(fingerprint(unit, &predecessors, &worker.cache))),
          };
          state.complete(idx, outcome);
          continue;
        }

        let semaphore = match &unit.scope {
          Scope::Global => global.clone(),
          Scope::Capped { subproject, .. } => capped.get(subproject).cloned().unwrap_or_else(|| global.clone()),
        };
        debug!(node = %unit.id, "dispatching");
        let handle = tasks.spawn(run_node(worker.clone(), unit.clone(), predecessors, semaphore));
        in_flight.insert(handle.id(), idx);
      }

      let Some(joined) = tasks.join_next_with_id().await else {
        break;
      };
      match joined {
        Ok((id, outcome)) => {
          if let Some(idx) = in_flight.remove(&id) {
            state.complete(idx, outcome);
          }
        }
        Err(e) => {
          if let Some(idx) = in_flight.remove(&e.id()) {
            let unit = graph.unit(idx);
            state.complete(idx, Outcome::Failed(failure_of(unit, None, format!("worker panicked: {e}"))));
          }
        }
      }
    }

    let mut report = state.finish(config.cancel.is_cancelled());
    self.store.flush()?;

    info!(
      succeeded = report.succeeded.len(),
      up_to_date = report.up_to_date.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      cancelled = report.cancelled,
      "build complete"
    );
    report.failed.sort_by(|a, b| a.node.cmp(&b.node));
    Ok(report)
  }
}

/// Coordinator-side node state.
struct RunState<'a> {
  graph: &'a BuildGraph,
  store: &'a FingerprintStore,
  rank: HashMap<NodeIndex, usize>,
  waiting_on: HashMap<NodeIndex, usize>,
  ready: BTreeSet<(usize, NodeIndex)>,
  fingerprints: HashMap<NodeIndex, ContentHash>,
  done: Vec<bool>,
  report: BuildReport,
}

impl<'a> RunState<'a> {
  fn new(graph: &'a BuildGraph, store: &'a FingerprintStore) -> Self {
    let rank: HashMap<NodeIndex, usize> = graph
      .topo_order()
      .iter()
      .enumerate()
      .map(|(rank, &idx)| (idx, rank))
      .collect();
    let waiting_on: HashMap<NodeIndex, usize> = graph
      .topo_order()
      .iter()
      .map(|&idx| (idx, graph.predecessors(idx).len()))
      .collect();
    let ready = waiting_on
      .iter()
      .filter(|(_, count)| **count == 0)
      .map(|(&idx, _)| (rank[&idx], idx))
      .collect();
    let done = vec![false; graph.len()];

    Self {
      graph,
      store,
      rank,
      waiting_on,
      ready,
      fingerprints: HashMap::new(),
      done,
      report: BuildReport::default(),
    }
  }

  fn pop_ready(&mut self) -> Option<NodeIndex> {
    self.ready.pop_first().map(|(_, idx)| idx)
  }

  /// Fingerprints of `idx`'s predecessors, all of which are terminal.
  fn predecessor_fingerprints(&self, idx: NodeIndex) -> Vec<(NodeId, ContentHash)> {
    self
      .graph
      .predecessors(idx)
      .into_iter()
      .filter_map(|p| {
        self
          .fingerprints
          .get(&p)
          .map(|fp| (self.graph.unit(p).id.clone(), fp.clone()))
      })
      .collect()
  }

  fn complete(&mut self, idx: NodeIndex, outcome: Outcome) {
    let graph = self.graph;
    let unit = graph.unit(idx);
    self.done[idx.index()] = true;

    match outcome {
      Outcome::UpToDate(stamp) => {
        debug!(node = %unit.id, "up to date");
        self.record(unit, &stamp);
        self.fingerprints.insert(idx, stamp.downstream());
        self.report.up_to_date.push(unit.id.clone());
        self.release(idx);
      }
      Outcome::Succeeded(stamp) => {
        info!(node = %unit.id, "built");
        self.record(unit, &stamp);
        self.fingerprints.insert(idx, stamp.downstream());
        self.report.succeeded.push(unit.id.clone());
        self.release(idx);
      }
      Outcome::Failed(failure) => {
        error!(node = %unit.id, exit_code = ?failure.exit_code, "{}", failure.message);
        self.store.forget(&unit.id);
        self.report.failed.push(failure);
        self.skip_dependents(idx, &unit.id);
      }
      Outcome::Cancelled => {
        self.report.skipped.push(SkippedNode {
          node: unit.id.clone(),
          cause: SkipCause::Cancelled,
        });
      }
    }
  }

  fn record(&self, unit: &BuildUnit, stamp: &Stamp) {
    self.store.record(
      unit.id.clone(),
      FingerprintRecord {
        fingerprint: stamp.fingerprint.clone(),
        outputs: unit.outputs.clone(),
        revision: stamp.revision.clone(),
      },
    );
  }

  fn release(&mut self, idx: NodeIndex) {
    for next in self.graph.dependents(idx) {
      if let Some(count) = self.waiting_on.get_mut(&next) {
        *count = count.saturating_sub(1);
        if *count == 0 && !self.done[next.index()] {
          self.ready.insert((self.rank[&next], next));
        }
      }
    }
  }

  /// Mark every transitive dependent of a failed node skipped.
  fn skip_dependents(&mut self, failed: NodeIndex, root: &NodeId) {
    let graph = self.graph;
    let mut stack = graph.dependents(failed);
    while let Some(idx) = stack.pop() {
      if self.done[idx.index()] {
        continue;
      }
      self.done[idx.index()] = true;
      let unit = graph.unit(idx);
      warn!(node = %unit.id, failed_dependency = %root, "skipping");
      self.report.skipped.push(SkippedNode {
        node: unit.id.clone(),
        cause: SkipCause::FailedDependency(root.clone()),
      });
      stack.extend(graph.dependents(idx));
    }
  }

  fn finish(mut self, cancelled: bool) -> BuildReport {
    for &idx in self.graph.topo_order() {
      if !self.done[idx.index()] {
        self.report.skipped.push(SkippedNode {
          node: self.graph.unit(idx).id.clone(),
          cause: SkipCause::Cancelled,
        });
      }
    }
    self.report.cancelled = cancelled;
    self.report
  }
}

/// Fingerprint, assess, and if stale run one node.
async fn run_node(
  worker: Arc<Worker>,
  unit: BuildUnit,
  predecessors: Vec<(NodeId, ContentHash)>,
  semaphore: Arc<Semaphore>,
) -> Outcome {
  let id = unit.id.clone();
  let kind = FailureKind::from(unit.kind);
  let panicked = move |id: NodeId, e: task::JoinError| {
    Outcome::Failed(NodeFailure {
      node: id,
      kind,
      command: String::new(),
      exit_code: None,
      message: format!("worker panicked: {e}"),
    })
  };

  let assessing = worker.clone();
  let assessed = task::spawn_blocking(move || {
    let fp = fingerprint(&unit, &predecessors, &assessing.cache);
    let recorded = assessing.store.get(&unit.id);
    let staleness = assessing.policy.assess(&unit, &fp, recorded.as_ref());
    let revision = recorded.and_then(|record| record.revision);
    (unit, fp, revision, staleness)
  })
  .await;

  let (unit, fp, reason) = match assessed {
    Ok((_, fp, revision, Staleness::UpToDate)) => {
      return Outcome::UpToDate(Stamp {
        fingerprint: fp,
        revision,
      });
    }
    Ok((unit, fp, _, Staleness::Stale(reason))) => (unit, fp, reason),
    Err(e) => return panicked(id, e),
  };

  let Ok(_permit) = semaphore.acquire().await else {
    return Outcome::Cancelled;
  };
  if worker.cancel.is_cancelled() {
    return Outcome::Cancelled;
  }

  debug!(node = %unit.id, reason = %reason, "running");
  let running = worker.clone();
  match task::spawn_blocking(move || execute(&running, &unit, fp)).await {
    Ok(outcome) => outcome,
    Err(e) => panicked(id, e),
  }
}

fn execute(worker: &Worker, unit: &BuildUnit, fp: ContentHash) -> Outcome {
  match &unit.action {
    Action::Run { invocation, workdir } => {
      for output in &unit.outputs {
        if let Some(parent) = output.parent()
          && let Err(e) = fs::create_dir_all(parent)
        {
          return Outcome::Failed(failure_of(
            unit,
            None,
            format!("cannot create {}: {e}", parent.display()),
          ));
        }
      }

      match worker.executor.execute(invocation, workdir) {
        Ok(output) if output.success() => Outcome::Succeeded(Stamp::new(fp)),
        Ok(output) => {
          // some tools report errors on stdout only
          let diagnostics = if output.stderr.trim().is_empty() {
            &output.stdout
          } else {
            &output.stderr
          };
          Outcome::Failed(failure_of(unit, output.exit_code, tail(diagnostics, STDERR_TAIL_LINES)))
        }
        Err(e) => Outcome::Failed(failure_of(unit, None, format!("failed to start: {e}"))),
      }
    }
    Action::Fetch(step) => match worker.fetcher.ensure_checkout(step, worker.policy.force_fetch) {
      Ok(revision) => Outcome::Succeeded(Stamp {
        fingerprint: fp,
        revision: Some(revision),
      }),
      Err(e) => Outcome::Failed(failure_of(unit, None, e.to_string())),
    },
    Action::Flags { failure: Some(message), .. } => Outcome::Failed(failure_of(unit, None, message.clone())),
    Action::Flags { failure: None, .. } => Outcome::UpToDate(Stamp::new(fp)),
  }
}

fn failure_of(unit: &BuildUnit, exit_code: Option<i32>, message: String) -> NodeFailure {
  NodeFailure {
    node: unit.id.clone(),
    kind: unit.kind.into(),
    command: unit.action.describe(),
    exit_code,
    message,
  }
}
