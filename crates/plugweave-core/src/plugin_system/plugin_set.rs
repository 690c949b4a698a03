//! Dependency graph construction and the resulting ordered plugin set.
//!
//! [`DependencyGraphBuilder`] takes the aggregated descriptors and decides, for each,
//! whether it ends up enabled. Decisions go through [`transition`], a pure function
//! over a node's current [`NodeState`] and a newly established [`Fact`]. The output
//! [`PluginSet`] lists enabled descriptors in an order where every descriptor comes
//! after its dependencies.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::classloader::ClassLoaderHandle;
use crate::kernel::constants::{ALL_MODULES_MARKER, CORE_PLUGIN_ID, MODULE_DEPENDENCY_PREFIX};
use crate::plugin_system::dependency::DependencyError;
use crate::plugin_system::descriptor::Descriptor;
use crate::plugin_system::error::{LoadError, PluginSystemError};

/// Why a descriptor ended up disabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableReason {
    ExplicitlyDisabled,
    Incompatible(String),
    Broken,
    NotSelected,
    MissingDependency(String),
    DuplicateDependency(String),
    DisabledDependency(String),
    IncompatibleDependency { dependency: String, reason: String },
    Cycle(Vec<String>),
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisableReason::ExplicitlyDisabled => write!(f, "disabled by the user"),
            DisableReason::Incompatible(reason) => write!(f, "incompatible: {}", reason),
            DisableReason::Broken => write!(f, "marked as broken"),
            DisableReason::NotSelected => write!(f, "not selected for loading"),
            DisableReason::MissingDependency(id) => write!(f, "{}", DependencyError::MissingPlugin(id.clone())),
            DisableReason::DuplicateDependency(id) => write!(f, "{}", DependencyError::AmbiguousPlugin(id.clone())),
            DisableReason::DisabledDependency(id) => write!(f, "required plugin '{}' is disabled", id),
            DisableReason::IncompatibleDependency { dependency, reason } => write!(
                f,
                "{}",
                DependencyError::IncompatiblePlugin {
                    dependency: dependency.clone(),
                    reason: reason.clone(),
                }
            ),
            DisableReason::Cycle(chain) => write!(f, "{}", DependencyError::CyclicDependency(chain.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Unvisited,
    Enabled,
    Disabled(DisableReason),
}

impl NodeState {
    pub fn is_disabled(&self) -> bool {
        matches!(self, NodeState::Disabled(_))
    }
}

/// Something learned about a node while building the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    /// Every check passed
    Satisfied,
    ExplicitlyDisabled,
    Incompatible(String),
    Broken,
    NotSelected,
    MissingDependency(String),
    /// A required id is claimed by more than one descriptor
    DuplicateDependency(String),
    DisabledDependency(String),
    IncompatibleDependency { dependency: String, reason: String },
    CycleMember(Vec<String>),
}

/// The enablement state machine. A disabled node keeps its first reason.
pub fn transition(state: &NodeState, fact: Fact) -> NodeState {
    let reason = match (state, fact) {
        (NodeState::Disabled(reason), _) => return NodeState::Disabled(reason.clone()),
        (_, Fact::Satisfied) => return NodeState::Enabled,
        (_, Fact::ExplicitlyDisabled) => DisableReason::ExplicitlyDisabled,
        (_, Fact::Incompatible(reason)) => DisableReason::Incompatible(reason),
        (_, Fact::Broken) => DisableReason::Broken,
        (_, Fact::NotSelected) => DisableReason::NotSelected,
        (_, Fact::MissingDependency(id)) => DisableReason::MissingDependency(id),
        (_, Fact::DuplicateDependency(id)) => DisableReason::DuplicateDependency(id),
        (_, Fact::DisabledDependency(id)) => DisableReason::DisabledDependency(id),
        (_, Fact::IncompatibleDependency { dependency, reason }) => {
            DisableReason::IncompatibleDependency { dependency, reason }
        }
        (_, Fact::CycleMember(chain)) => DisableReason::Cycle(chain),
    };
    NodeState::Disabled(reason)
}

/// Which descriptors a load is restricted to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Ids(BTreeSet<String>),
    Category(String),
}

/// Maps dependency ids onto descriptor indices
struct Targets<'a> {
    ids: HashMap<&'a str, usize>,
    modules: HashMap<&'a str, usize>,
    contested: &'a BTreeSet<String>,
    all_modules_owner: Option<usize>,
}

impl<'a> Targets<'a> {
    /// Rejected descriptors are not targets; contested ids resolve to nothing.
    fn new(
        descriptors: &'a [Descriptor],
        core_plugin_id: &str,
        contested: &'a BTreeSet<String>,
        rejected: &BTreeMap<String, Fact>,
    ) -> Self {
        let ids: HashMap<&str, usize> = descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| !rejected.contains_key(&d.id))
            .map(|(i, d)| (d.id.as_str(), i))
            .collect();
        let mut modules = HashMap::new();
        let mut all_modules_owner = None;
        for (i, descriptor) in descriptors.iter().enumerate() {
            if rejected.contains_key(&descriptor.id) {
                continue;
            }
            for module in &descriptor.content {
                modules.entry(module.name.as_str()).or_insert(i);
            }
            for module in &descriptor.modules {
                modules.entry(module.as_str()).or_insert(i);
            }
            if descriptor.id == core_plugin_id && descriptor.modules.iter().any(|m| m == ALL_MODULES_MARKER) {
                all_modules_owner = Some(i);
            }
        }
        Self {
            ids,
            modules,
            contested,
            all_modules_owner,
        }
    }

    fn resolve(&self, id: &str) -> Option<usize> {
        if self.contested.contains(id) {
            return None;
        }
        self.ids
            .get(id)
            .or_else(|| self.modules.get(id))
            .copied()
            .or_else(|| {
                if id.starts_with(MODULE_DEPENDENCY_PREFIX) {
                    self.all_modules_owner
                } else {
                    None
                }
            })
    }
}

/// Ids claimed by more than one descriptor: a module declared by two plugins, or a
/// module named like another plugin.
fn contested_ids<'a>(descriptors: impl Iterator<Item = &'a Descriptor> + Clone) -> BTreeSet<String> {
    let mut claims: HashMap<String, &str> = descriptors.clone().map(|d| (d.id.clone(), d.id.as_str())).collect();
    let mut contested = BTreeSet::new();
    for descriptor in descriptors {
        for module in descriptor.provided_module_ids() {
            match claims.get(module.as_str()) {
                Some(owner) if *owner != descriptor.id => {
                    contested.insert(module);
                }
                Some(_) => {}
                None => {
                    claims.insert(module, descriptor.id.as_str());
                }
            }
        }
    }
    contested
}

/// Builds a [`PluginSet`] from aggregated descriptors
pub struct DependencyGraphBuilder {
    descriptors: Vec<Descriptor>,
    rejected: Vec<(Descriptor, Fact)>,
    duplicates: BTreeSet<String>,
    unavailable: BTreeMap<String, String>,
    essential: BTreeSet<String>,
    selection: Selection,
    core_plugin_id: String,
}

impl DependencyGraphBuilder {
    pub fn new(descriptors: Vec<Descriptor>) -> Self {
        Self {
            descriptors,
            rejected: Vec::new(),
            duplicates: BTreeSet::new(),
            unavailable: BTreeMap::new(),
            essential: BTreeSet::new(),
            selection: Selection::All,
            core_plugin_id: CORE_PLUGIN_ID.to_string(),
        }
    }

    /// Descriptors rejected during aggregation. They end up disabled with the given fact
    /// and never satisfy a dependency.
    pub fn rejected(mut self, rejected: Vec<(Descriptor, Fact)>) -> Self {
        self.rejected = rejected;
        self
    }

    /// Ids claimed by more than one descriptor during aggregation
    pub fn duplicates<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.duplicates.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Ids that were rejected during aggregation, with the reason
    pub fn unavailable(mut self, unavailable: BTreeMap<String, String>) -> Self {
        self.unavailable = unavailable;
        self
    }

    pub fn essential<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.essential.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn core_plugin_id(mut self, id: &str) -> Self {
        self.core_plugin_id = id.to_string();
        self
    }

    pub fn build(mut self) -> PluginSet {
        let mut rejected: BTreeMap<String, Fact> = BTreeMap::new();
        for (descriptor, fact) in std::mem::take(&mut self.rejected) {
            if rejected.contains_key(&descriptor.id) || self.descriptors.iter().any(|d| d.id == descriptor.id) {
                continue;
            }
            rejected.insert(descriptor.id.clone(), fact);
            self.descriptors.push(descriptor);
        }
        self.descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        let count = self.descriptors.len();

        let mut contested = std::mem::take(&mut self.duplicates);
        contested.extend(contested_ids(
            self.descriptors.iter().filter(|d| !rejected.contains_key(&d.id)),
        ));
        for id in &contested {
            log::warn!("Id '{}' is claimed by more than one plugin and cannot be depended on", id);
        }

        // Adjacency; edges point from a descriptor to what it depends on.
        let (hard, soft, missing) = {
            let targets = Targets::new(&self.descriptors, &self.core_plugin_id, &contested, &rejected);
            let mut hard = vec![BTreeSet::new(); count];
            let mut soft = vec![BTreeSet::new(); count];
            let mut missing: Vec<Vec<String>> = vec![Vec::new(); count];
            for (i, descriptor) in self.descriptors.iter().enumerate() {
                for dependency in &descriptor.dependencies {
                    match targets.resolve(&dependency.id) {
                        Some(t) if t == i => {}
                        Some(t) if dependency.optional => {
                            soft[i].insert(t);
                        }
                        Some(t) => {
                            hard[i].insert(t);
                        }
                        None if dependency.optional => {}
                        None => missing[i].push(dependency.id.clone()),
                    }
                    if let Some(sub) = &dependency.sub_descriptor {
                        for nested in &sub.dependencies {
                            if let Some(t) = targets.resolve(&nested.id).filter(|t| *t != i) {
                                soft[i].insert(t);
                            }
                        }
                    }
                }
                for module in &descriptor.content {
                    let Some(module_descriptor) = &module.descriptor else { continue };
                    for dependency in &module_descriptor.dependencies {
                        if let Some(t) = targets.resolve(&dependency.id).filter(|t| *t != i) {
                            soft[i].insert(t);
                        }
                    }
                }
            }
            (hard, soft, missing)
        };

        let mut states = vec![NodeState::Unvisited; count];
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if let Some(fact) = rejected.get(&descriptor.id) {
                states[i] = transition(&states[i], fact.clone());
            }
        }

        // Selection closure runs on the unrestricted graph.
        if let Some(selected) = self.selected(&hard) {
            for (i, state) in states.iter_mut().enumerate() {
                if !selected.contains(&i) {
                    *state = transition(state, Fact::NotSelected);
                }
            }
        }

        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if !descriptor.enabled {
                states[i] = transition(&states[i], Fact::ExplicitlyDisabled);
            }
        }

        let cycles = detect_cycles(&hard, &states, &self.descriptors);
        for chain in &cycles {
            for id in chain {
                if let Some(i) = self.descriptors.iter().position(|d| &d.id == id) {
                    states[i] = transition(&states[i], Fact::CycleMember(chain.clone()));
                }
            }
            log::error!("Dependency cycle: {}", chain.join(" -> "));
        }

        for (i, targets) in missing.iter().enumerate() {
            for target in targets {
                if contested.contains(target) {
                    states[i] = transition(&states[i], Fact::DuplicateDependency(target.clone()));
                    continue;
                }
                let unavailable = self.unavailable.get(target).cloned().or_else(|| {
                    rejected.get(target).map(|fact| match fact {
                        Fact::Incompatible(reason) => reason.clone(),
                        _ => DisableReason::Broken.to_string(),
                    })
                });
                let fact = match unavailable {
                    Some(reason) => Fact::IncompatibleDependency {
                        dependency: target.clone(),
                        reason,
                    },
                    None => Fact::MissingDependency(target.clone()),
                };
                states[i] = transition(&states[i], fact);
            }
        }

        // Propagate to dependents until nothing changes.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, deps) in hard.iter().enumerate() {
            for &t in deps {
                dependents[t].push(i);
            }
        }
        let mut worklist: Vec<usize> = (0..count).filter(|&i| states[i].is_disabled()).collect();
        while let Some(node) = worklist.pop() {
            for &dependent in &dependents[node] {
                if states[dependent].is_disabled() {
                    continue;
                }
                let fact = Fact::DisabledDependency(self.descriptors[node].id.clone());
                states[dependent] = transition(&states[dependent], fact);
                worklist.push(dependent);
            }
        }

        for state in states.iter_mut() {
            *state = transition(state, Fact::Satisfied);
        }

        self.mark_unavailable_sub_descriptors(&states, &contested, &rejected);

        let order = order_enabled(&hard, &soft, &states);
        log::debug!("Plugin order: {:?}", order.iter().map(|&i| &self.descriptors[i].id).collect::<Vec<_>>());

        let mut slots: Vec<Option<Descriptor>> = self.descriptors.into_iter().map(Some).collect();
        let mut enabled = Vec::with_capacity(order.len());
        for i in order {
            if let Some(descriptor) = slots[i].take() {
                enabled.push(descriptor);
            }
        }
        let mut disabled = Vec::new();
        let mut disabled_reasons = BTreeMap::new();
        for (slot, state) in slots.into_iter().zip(states) {
            let Some(mut descriptor) = slot else { continue };
            if let NodeState::Disabled(reason) = state {
                log::info!("Plugin '{}' is disabled: {}", descriptor.id, reason);
                descriptor.enabled = false;
                disabled_reasons.insert(descriptor.id.clone(), reason);
                disabled.push(descriptor);
            }
        }

        PluginSet::new(enabled, disabled, disabled_reasons, cycles, contested, &self.core_plugin_id)
    }

    /// Indices kept by the selection, closed over hard dependencies; `None` when unrestricted
    fn selected(&self, hard: &[BTreeSet<usize>]) -> Option<BTreeSet<usize>> {
        let seeds: Vec<usize> = match &self.selection {
            Selection::All => return None,
            Selection::Ids(ids) => self
                .descriptors
                .iter()
                .enumerate()
                .filter(|(_, d)| ids.contains(&d.id))
                .map(|(i, _)| i)
                .collect(),
            Selection::Category(category) => self
                .descriptors
                .iter()
                .enumerate()
                .filter(|(_, d)| d.category.as_deref() == Some(category.as_str()))
                .map(|(i, _)| i)
                .collect(),
        };
        let mut selected = BTreeSet::new();
        let mut pending: Vec<usize> = seeds;
        pending.extend(
            self.descriptors
                .iter()
                .enumerate()
                .filter(|(_, d)| d.id == self.core_plugin_id || self.essential.contains(&d.id))
                .map(|(i, _)| i),
        );
        while let Some(node) = pending.pop() {
            if selected.insert(node) {
                pending.extend(hard[node].iter().copied());
            }
        }
        Some(selected)
    }

    /// Flags sub-descriptors and module descriptors whose targets are unavailable.
    fn mark_unavailable_sub_descriptors(
        &mut self,
        states: &[NodeState],
        contested: &BTreeSet<String>,
        rejected: &BTreeMap<String, Fact>,
    ) {
        let available: BTreeSet<String> = {
            let targets = Targets::new(&self.descriptors, &self.core_plugin_id, contested, rejected);
            let mut ids = BTreeSet::new();
            for descriptor in &self.descriptors {
                for dependency in descriptor.dependencies.iter().chain(
                    descriptor
                        .content
                        .iter()
                        .filter_map(|m| m.descriptor.as_ref())
                        .flat_map(|m| m.dependencies.iter()),
                ) {
                    let ids_to_check = std::iter::once(dependency.id.as_str()).chain(
                        dependency
                            .sub_descriptor
                            .iter()
                            .flat_map(|s| s.dependencies.iter().map(|d| d.id.as_str())),
                    );
                    for id in ids_to_check {
                        if targets.resolve(id).is_some_and(|t| !states[t].is_disabled()) {
                            ids.insert(id.to_string());
                        }
                    }
                }
            }
            ids
        };

        for (descriptor, state) in self.descriptors.iter_mut().zip(states) {
            if state.is_disabled() {
                continue;
            }
            let owner = descriptor.id.clone();
            for dependency in descriptor.dependencies.iter_mut().filter(|d| d.optional) {
                let Some(sub) = dependency.sub_descriptor.as_deref_mut() else { continue };
                let target_ok = available.contains(&dependency.id);
                let nested_ok = sub.hard_dependencies().all(|d| available.contains(&d.id));
                if !(target_ok && nested_ok) {
                    log::info!(
                        "Optional part of '{}' depending on '{}' is not loaded",
                        owner,
                        dependency.id
                    );
                    sub.is_disabled_or_broken = true;
                }
            }
            for module in descriptor.content.iter_mut() {
                let Some(module_descriptor) = module.descriptor.as_deref_mut() else { continue };
                if !module_descriptor.hard_dependencies().all(|d| available.contains(&d.id)) {
                    log::info!("Content module '{}' of '{}' is not loaded", module.name, owner);
                    module_descriptor.is_disabled_or_broken = true;
                }
            }
        }
    }
}

/// DFS over hard edges of nodes that are not already disabled. Every back edge yields
/// one cycle, reported in traversal order starting at the first node reached.
fn detect_cycles(hard: &[BTreeSet<usize>], states: &[NodeState], descriptors: &[Descriptor]) -> Vec<Vec<String>> {
    fn detect_cycle_dfs(
        node: usize,
        hard: &[BTreeSet<usize>],
        states: &[NodeState],
        visiting: &mut Vec<bool>,
        visited: &mut Vec<bool>,
        path: &mut Vec<usize>,
        found: &mut Vec<Vec<usize>>,
    ) {
        visiting[node] = true;
        path.push(node);
        for &dep in &hard[node] {
            if states[dep].is_disabled() {
                continue;
            }
            if visiting[dep] {
                if let Some(start) = path.iter().position(|&p| p == dep) {
                    found.push(path[start..].to_vec());
                }
            } else if !visited[dep] {
                detect_cycle_dfs(dep, hard, states, visiting, visited, path, found);
            }
        }
        path.pop();
        visiting[node] = false;
        visited[node] = true;
    }

    let count = hard.len();
    let mut visiting = vec![false; count];
    let mut visited = vec![false; count];
    let mut found = Vec::new();
    for node in 0..count {
        if !visited[node] && !states[node].is_disabled() {
            let mut path = Vec::new();
            detect_cycle_dfs(node, hard, states, &mut visiting, &mut visited, &mut path, &mut found);
        }
    }
    found
        .into_iter()
        .map(|cycle| cycle.into_iter().map(|i| descriptors[i].id.clone()).collect())
        .collect()
}

/// Kahn's algorithm over enabled nodes. Soft edges order optional dependencies first and
/// are dropped, smallest index first, when only they keep the queue from progressing.
fn order_enabled(hard: &[BTreeSet<usize>], soft: &[BTreeSet<usize>], states: &[NodeState]) -> Vec<usize> {
    let count = hard.len();
    let enabled = |i: usize| states[i] == NodeState::Enabled;

    let mut hard_pending = vec![0usize; count];
    let mut soft_pending = vec![0usize; count];
    let mut hard_dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut soft_dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for i in (0..count).filter(|&i| enabled(i)) {
        for &t in hard[i].iter().filter(|&&t| enabled(t)) {
            hard_pending[i] += 1;
            hard_dependents[t].push(i);
        }
        for &t in soft[i].iter().filter(|&&t| enabled(t) && !hard[i].contains(&t)) {
            soft_pending[i] += 1;
            soft_dependents[t].push(i);
        }
    }

    let mut remaining: BTreeSet<usize> = (0..count).filter(|&i| enabled(i)).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .copied()
        .filter(|&i| hard_pending[i] == 0 && soft_pending[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = match ready.pop_first() {
            Some(node) => node,
            None => match remaining.iter().copied().find(|&i| hard_pending[i] == 0) {
                Some(node) => {
                    log::debug!("Ignoring optional ordering constraints of node {} to break a cycle", node);
                    soft_pending[node] = 0;
                    node
                }
                None => break,
            },
        };
        if !remaining.remove(&next) {
            continue;
        }
        order.push(next);
        for &dependent in &hard_dependents[next] {
            hard_pending[dependent] -= 1;
            if hard_pending[dependent] == 0 && soft_pending[dependent] == 0 && remaining.contains(&dependent) {
                ready.insert(dependent);
            }
        }
        for &dependent in &soft_dependents[next] {
            soft_pending[dependent] = soft_pending[dependent].saturating_sub(1);
            if hard_pending[dependent] == 0 && soft_pending[dependent] == 0 && remaining.contains(&dependent) {
                ready.insert(dependent);
            }
        }
    }
    order
}

/// The outcome of graph building: enabled descriptors in dependency order plus the
/// disabled ones with their reasons.
#[derive(Debug, Default)]
pub struct PluginSet {
    enabled: Vec<Descriptor>,
    disabled: Vec<Descriptor>,
    disabled_reasons: BTreeMap<String, DisableReason>,
    cycles: Vec<Vec<String>>,
    contested: BTreeSet<String>,
    module_owners: BTreeMap<String, String>,
    positions: HashMap<String, usize>,
    core_plugin_id: String,
}

impl PluginSet {
    fn new(
        enabled: Vec<Descriptor>,
        disabled: Vec<Descriptor>,
        disabled_reasons: BTreeMap<String, DisableReason>,
        cycles: Vec<Vec<String>>,
        contested: BTreeSet<String>,
        core_plugin_id: &str,
    ) -> Self {
        let mut set = Self {
            enabled,
            disabled,
            disabled_reasons,
            cycles,
            contested,
            module_owners: BTreeMap::new(),
            positions: HashMap::new(),
            core_plugin_id: core_plugin_id.to_string(),
        };
        set.reindex();
        set
    }

    fn reindex(&mut self) {
        self.positions = self
            .enabled
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        self.module_owners.clear();
        for descriptor in self.enabled.iter().chain(self.disabled.iter()) {
            for module in descriptor.provided_module_ids() {
                if self.contested.contains(&module) {
                    continue;
                }
                self.module_owners
                    .entry(module)
                    .or_insert_with(|| descriptor.id.clone());
            }
        }
    }

    pub fn core_plugin_id(&self) -> &str {
        &self.core_plugin_id
    }

    /// Enabled descriptors, dependencies first
    pub fn enabled(&self) -> &[Descriptor] {
        &self.enabled
    }

    pub(crate) fn enabled_mut(&mut self) -> &mut [Descriptor] {
        &mut self.enabled
    }

    /// Disabled descriptors, sorted by id
    pub fn disabled(&self) -> &[Descriptor] {
        &self.disabled
    }

    pub fn disabled_reasons(&self) -> &BTreeMap<String, DisableReason> {
        &self.disabled_reasons
    }

    pub fn disable_reason(&self, id: &str) -> Option<&DisableReason> {
        self.disabled_reasons.get(id)
    }

    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Whether an id is claimed by more than one descriptor and therefore resolves to nothing
    pub fn is_contested(&self, id: &str) -> bool {
        self.contested.contains(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.enabled.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Enabled descriptor by id
    pub fn get(&self, id: &str) -> Option<&Descriptor> {
        self.position(id).map(|i| &self.enabled[i])
    }

    /// Plugin owning a module id, enabled or not
    pub fn module_owner(&self, module: &str) -> Option<&str> {
        self.module_owners.get(module).map(String::as_str)
    }

    /// The enabled descriptor a dependency id resolves to: the plugin with that id, the
    /// owner of a module with that id, or the core plugin for platform modules it covers.
    pub fn resolve_dependency(&self, id: &str) -> Option<&Descriptor> {
        if self.is_contested(id) {
            return None;
        }
        if let Some(descriptor) = self.get(id) {
            return Some(descriptor);
        }
        if let Some(owner) = self.module_owner(id) {
            return self.get(owner);
        }
        if id.starts_with(MODULE_DEPENDENCY_PREFIX) {
            return self
                .get(&self.core_plugin_id)
                .filter(|core| core.modules.iter().any(|m| m == ALL_MODULES_MARKER));
        }
        None
    }

    /// Loader assigned to an id: a content module's own loader when it has one,
    /// otherwise the loader of the owning plugin.
    pub fn class_loader(&self, id: &str) -> Option<ClassLoaderHandle> {
        if let Some(descriptor) = self.get(id) {
            return descriptor.class_loader().cloned();
        }
        let owner = self.get(self.module_owner(id)?)?;
        let module = owner.content_module(id);
        module
            .and_then(|m| m.descriptor.as_ref())
            .and_then(|d| d.class_loader().cloned())
            .or_else(|| owner.class_loader().cloned())
    }

    /// Every assigned loader by plugin or content module id
    pub fn class_loaders(&self) -> BTreeMap<String, ClassLoaderHandle> {
        let mut loaders = BTreeMap::new();
        for descriptor in &self.enabled {
            if let Some(loader) = descriptor.class_loader() {
                loaders.insert(descriptor.id.clone(), loader.clone());
            }
            for module in &descriptor.content {
                if let Some(loader) = module.descriptor.as_ref().and_then(|d| d.class_loader()) {
                    loaders.insert(module.name.clone(), loader.clone());
                }
            }
        }
        loaders
    }

    /// One warning per disabled descriptor, for the load report
    pub fn errors(&self) -> Vec<LoadError> {
        self.disabled_reasons
            .iter()
            .filter(|(_, reason)| !matches!(reason, DisableReason::ExplicitlyDisabled | DisableReason::NotSelected))
            .map(|(id, reason)| match reason {
                DisableReason::Cycle(_)
                | DisableReason::MissingDependency(_)
                | DisableReason::DuplicateDependency(_) => LoadError::error(id, reason.to_string()),
                _ => LoadError::warning(id, reason.to_string()),
            })
            .collect()
    }

    /// Re-enables a disabled descriptor whose hard dependencies are all enabled. It is
    /// appended to the order; loaders are assigned on the next configuration pass.
    pub fn enable_plugin(&mut self, id: &str) -> Result<(), PluginSystemError> {
        if self.is_enabled(id) {
            return Ok(());
        }
        let index = self
            .disabled
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| PluginSystemError::Dependency {
                plugin_id: id.to_string(),
                source: DependencyError::MissingPlugin(id.to_string()),
            })?;

        if let Some(reason) = self
            .disabled_reasons
            .get(id)
            .filter(|reason| matches!(reason, DisableReason::Incompatible(_) | DisableReason::Broken))
        {
            return Err(PluginSystemError::Incompatible {
                plugin_id: id.to_string(),
                reason: reason.to_string(),
            });
        }

        for dependency in self.disabled[index].hard_dependencies() {
            if self.resolve_dependency(&dependency.id).is_some() {
                continue;
            }
            let source = if self.module_owner(&dependency.id).is_some()
                || self.disabled.iter().any(|d| d.id == dependency.id)
            {
                DependencyError::DisabledPlugin {
                    dependency: dependency.id.clone(),
                    reason: self
                        .disabled_reasons
                        .get(&dependency.id)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "disabled".to_string()),
                }
            } else {
                DependencyError::MissingPlugin(dependency.id.clone())
            };
            return Err(PluginSystemError::Dependency {
                plugin_id: id.to_string(),
                source,
            });
        }

        let mut descriptor = self.disabled.remove(index);
        descriptor.enabled = true;
        self.disabled_reasons.remove(id);
        log::info!("Plugin '{}' enabled", id);
        self.enabled.push(descriptor);
        self.reindex();
        Ok(())
    }
}
