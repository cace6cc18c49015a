//! Execution plan - an ordered DAG of guarded actions

use crate::error::PlanError;
use crate::types::{ActionId, PlannedAction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A plan of guarded actions with dependency edges
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Actions in insertion order
    pub actions: Vec<PlannedAction>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Add an action to the plan
    ///
    /// Actions with the same id are the same action: adding one whose id is
    /// already planned is a no-op and returns `false`.
    pub fn add(&mut self, action: PlannedAction) -> bool {
        if self.contains(&action.id) {
            return false;
        }
        self.actions.push(action);
        true
    }

    /// Add every action, skipping ids already planned
    pub fn extend<I: IntoIterator<Item = PlannedAction>>(&mut self, actions: I) {
        for action in actions {
            self.add(action);
        }
    }

    pub fn get(&self, id: &ActionId) -> Option<&PlannedAction> {
        self.actions.iter().find(|a| &a.id == id)
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.actions.iter().any(|a| &a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter()
    }

    /// Total number of actions in the plan
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Dependencies that name no action in this plan
    ///
    /// These belong to the hosting platform (for example a package index
    /// refresh) and are considered satisfied when the plan runs.
    pub fn external_requirements(&self) -> BTreeSet<ActionId> {
        let known: HashSet<&ActionId> = self.actions.iter().map(|a| &a.id).collect();
        self.actions
            .iter()
            .flat_map(|a| a.depends_on.iter())
            .filter(|d| !known.contains(d))
            .cloned()
            .collect()
    }

    /// Check the plan is safe to execute
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(&action.id) {
                return Err(PlanError::DuplicateId(action.id.clone()));
            }
            if action.kind.is_mutating() && action.guard.is_none() {
                return Err(PlanError::MissingGuard(action.id.clone()));
            }
        }
        self.waves().map(|_| ())
    }

    /// Group actions into waves: every action's in-plan dependencies sit in
    /// earlier waves. Insertion order is kept within a wave.
    pub fn waves(&self) -> Result<Vec<Vec<&PlannedAction>>, PlanError> {
        let index: HashMap<&ActionId, usize> = self
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| (&a.id, i))
            .collect();

        let mut pending: Vec<usize> = self
            .actions
            .iter()
            .map(|a| a.depends_on.iter().filter(|d| index.contains_key(d)).count())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.actions.len()];
        for (i, action) in self.actions.iter().enumerate() {
            for dep in &action.depends_on {
                if let Some(&d) = index.get(dep) {
                    dependents[d].push(i);
                }
            }
        }

        let mut waves = Vec::new();
        let mut done = vec![false; self.actions.len()];
        let mut current: Vec<usize> = (0..self.actions.len())
            .filter(|&i| pending[i] == 0)
            .collect();
        let mut placed = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for &i in &current {
                done[i] = true;
                for &j in &dependents[i] {
                    pending[j] -= 1;
                    if pending[j] == 0 {
                        next.push(j);
                    }
                }
            }
            placed += current.len();
            next.sort_unstable();
            waves.push(current.iter().map(|&i| &self.actions[i]).collect());
            current = next;
        }

        if placed < self.actions.len() {
            let stuck = done.iter().position(|d| !d).unwrap_or_default();
            return Err(PlanError::Cycle(self.actions[stuck].id.clone()));
        }

        Ok(waves)
    }

    /// Filter plan to only include actions matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlannedAction) -> bool,
    {
        Self {
            actions: self.actions.into_iter().filter(|a| predicate(a)).collect(),
        }
    }

    /// Filter plan to the actions matching a target pattern, plus every
    /// in-plan action they transitively depend on
    ///
    /// Target format: "type" or "type.name", e.g. `package`, `plugin`,
    /// `plugin.logstash-output-s3`. Only dependencies that were never in the
    /// plan stay external requirements.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        let Some(t) = target else {
            return self;
        };
        let (resource_type, name) = parse_target(t);
        let mut keep: HashSet<ActionId> = self
            .actions
            .iter()
            .filter(|a| matches_filter(a, &resource_type, name.as_deref()))
            .map(|a| a.id.clone())
            .collect();

        let mut queue: Vec<ActionId> = keep.iter().cloned().collect();
        while let Some(id) = queue.pop() {
            let Some(action) = self.get(&id) else {
                continue;
            };
            for dep in &action.depends_on {
                if self.contains(dep) && keep.insert(dep.clone()) {
                    queue.push(dep.clone());
                }
            }
        }

        self.filter(|a| keep.contains(&a.id))
    }
}

/// Parse a target string like "type.name" into (type, name)
fn parse_target(target: &str) -> (String, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) => (kind.to_string(), Some(name.to_string())),
        None => (target.to_string(), None),
    }
}

/// Check if an action matches the filter criteria
fn matches_filter(action: &PlannedAction, resource_type: &str, name: Option<&str>) -> bool {
    // Allow plural aliases
    let prefix = match resource_type {
        "packages" => "package",
        "plugins" => "plugin",
        other => other,
    };

    let id = action.id.as_str();
    match name {
        None => id.starts_with(prefix),
        Some(n) => id.starts_with(&format!("{}:{}:", prefix, n)) || id == format!("{}:{}", prefix, n),
    }
}
