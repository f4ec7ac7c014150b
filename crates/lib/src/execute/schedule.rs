//! Job ordering and sequential execution.
//!
//! Jobs form a graph with an edge from every job named in `needs` to the job
//! declaring it. The graph is ordered with Kahn's algorithm; among jobs that
//! become ready together the one declared first runs first.
//!
//! All step text is resolved before the first command runs, so an undefined
//! variable or a cycle never leaves a half-run build behind.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use super::cmd::{CommandExecutor, split_commands};
use super::types::{PreparedJob, PreparedStep, RunReport, ScheduleError};
use crate::vars::VarStore;
use crate::workflow::Jobs;

/// Dependency graph over a workflow's jobs.
pub struct JobGraph<'a> {
  jobs: &'a Jobs,
  graph: DiGraph<usize, ()>,
}

impl<'a> JobGraph<'a> {
  /// Build the graph. Fails if a job needs an undeclared job.
  pub fn new(jobs: &'a Jobs) -> Result<Self, ScheduleError> {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for (index, name) in jobs.keys().enumerate() {
      nodes.insert(name, graph.add_node(index));
    }

    for (name, job) in jobs.iter() {
      let to = nodes[name];
      for need in &job.needs {
        let from = nodes.get(need.as_str()).ok_or_else(|| ScheduleError::UnknownNeed {
          job: name.to_string(),
          need: need.clone(),
        })?;
        graph.add_edge(*from, to, ());
      }
    }

    Ok(Self { jobs, graph })
  }

  /// Job names in execution order.
  pub fn order(&self) -> Result<Vec<String>, ScheduleError> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
      .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .enumerate()
      .filter(|(_, deg)| **deg == 0)
      .map(|(idx, _)| Reverse(idx))
      .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(idx)) = ready.pop() {
      order.push(idx);
      for next in self.graph.neighbors_directed(NodeIndex::new(idx), Direction::Outgoing) {
        let deg = &mut in_degree[next.index()];
        *deg -= 1;
        if *deg == 0 {
          ready.push(Reverse(next.index()));
        }
      }
    }

    let names: Vec<&str> = self.jobs.keys().collect();
    if order.len() < names.len() {
      let jobs = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg > 0)
        .map(|(idx, _)| names[idx].to_string())
        .collect();
      return Err(ScheduleError::Cycle { jobs });
    }

    Ok(order.into_iter().map(|idx| names[idx].to_string()).collect())
  }
}

/// Order the jobs and resolve every step against `vars`.
///
/// Skipped steps are not resolved.
pub fn prepare(jobs: &Jobs, vars: &VarStore) -> Result<Vec<PreparedJob>, ScheduleError> {
  let order = JobGraph::new(jobs)?.order()?;
  debug!(order = %order.join(", "), "workflow job order");

  let mut prepared = Vec::with_capacity(order.len());
  for name in order {
    let Some(job) = jobs.get(&name) else {
      continue;
    };

    let mut steps = Vec::with_capacity(job.steps.len());
    for (index, step) in job.steps.iter().enumerate() {
      let unresolved = |source| ScheduleError::Unresolved {
        job: name.clone(),
        step: index,
        source,
      };

      let skip = match &step.ignore {
        Some(cond) => vars.is_truthy(cond).map_err(unresolved)?,
        None => false,
      };

      let commands = if skip {
        Vec::new()
      } else {
        split_commands(&step.run)
          .iter()
          .map(|cmd| vars.resolve_text(cmd))
          .collect::<Result<Vec<_>, _>>()
          .map_err(unresolved)?
      };

      steps.push(PreparedStep {
        index,
        name: step.name.clone(),
        skip,
        commands,
      });
    }

    prepared.push(PreparedJob { name, steps });
  }

  Ok(prepared)
}

/// Run prepared jobs in order. The first failing step stops the run.
pub async fn run(jobs: &[PreparedJob], exec: &mut CommandExecutor) -> Result<RunReport, ScheduleError> {
  let mut report = RunReport::default();

  for job in jobs {
    info!(job = %job.name, "run job");

    for step in &job.steps {
      if step.skip {
        debug!(job = %job.name, step = step.index, name = %step.name, "skipping step");
        report.steps_skipped += 1;
        continue;
      }

      debug!(job = %job.name, step = step.index, name = %step.name, "run step");
      for command in &step.commands {
        exec.exec(command).await.map_err(|source| ScheduleError::Step {
          job: job.name.clone(),
          step: step.index,
          source,
        })?;
        report.commands_run += 1;
      }
      report.steps_run += 1;
    }

    report.jobs.push(job.name.clone());
  }

  Ok(report)
}
