//! Dependency resolution
//!
//! Validates package specs into a [`BuildGraph`] and computes the build
//! order. Ties between independent packages are broken by input order, so a
//! given spec list always plans the same way.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::core::package::PackageSpec;
use crate::error::PlanError;

/// Validated set of package specs with derived adjacency
#[derive(Debug)]
pub struct BuildGraph {
    specs: Vec<PackageSpec>,
    index: HashMap<String, usize>,
    /// package -> its dependencies (deduplicated, declaration order)
    dependencies: Vec<Vec<usize>>,
    /// package -> packages depending on it (input order)
    dependents: Vec<Vec<usize>>,
}

impl BuildGraph {
    /// Build the graph, rejecting duplicate names and unknown dependencies
    pub fn new(specs: Vec<PackageSpec>) -> Result<Self, PlanError> {
        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name().to_string(), i).is_some() {
                return Err(PlanError::DuplicatePackage {
                    name: spec.name().to_string(),
                });
            }
        }

        let mut dependencies = vec![Vec::new(); specs.len()];
        let mut dependents = vec![Vec::new(); specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            for dep in spec.depends() {
                let Some(&d) = index.get(dep) else {
                    return Err(PlanError::UnknownDependency {
                        package: spec.name().to_string(),
                        dependency: dep.clone(),
                    });
                };
                if !dependencies[i].contains(&d) {
                    dependencies[i].push(d);
                    dependents[d].push(i);
                }
            }
        }

        Ok(Self {
            specs,
            index,
            dependencies,
            dependents,
        })
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the graph has no packages
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Spec at `idx`
    pub fn spec(&self, idx: usize) -> &PackageSpec {
        &self.specs[idx]
    }

    /// All specs in input order
    pub fn specs(&self) -> &[PackageSpec] {
        &self.specs
    }

    /// Index of a package by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Direct dependencies of `idx`
    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Direct dependents of `idx`
    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// All transitive dependencies of `idx`, nearest first
    pub fn transitive_dependencies(&self, idx: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<usize> = self.dependencies[idx].iter().copied().collect();

        while let Some(d) = queue.pop_front() {
            if d == idx || !seen.insert(d) {
                continue;
            }
            result.push(d);
            queue.extend(self.dependencies[d].iter().copied());
        }

        result
    }

    /// Compute topological sort (build order)
    ///
    /// Returns indices such that dependencies come before dependents.
    fn topological_order(&self) -> Result<Vec<usize>, PlanError> {
        let mut waiting: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = waiting
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &d in &self.dependents[i] {
                waiting[d] -= 1;
                if waiting[d] == 0 {
                    ready.push(Reverse(d));
                }
            }
        }

        if order.len() < self.len() {
            return Err(PlanError::CyclicDependency {
                cycle: self.find_cycle(&waiting),
            });
        }

        Ok(order)
    }

    /// Name one cycle among the packages left unordered.
    ///
    /// Every such package still waits on at least one other unordered
    /// package, so following those edges must revisit a node.
    fn find_cycle(&self, waiting: &[usize]) -> Vec<String> {
        let unresolved = |i: usize| waiting[i] > 0;
        let Some(start) = (0..self.len()).find(|&i| unresolved(i)) else {
            return Vec::new();
        };

        let mut cycle_path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut node = start;

        loop {
            if let Some(&pos) = position.get(&node) {
                let mut cycle: Vec<String> = cycle_path[pos..]
                    .iter()
                    .map(|&i| self.specs[i].name().to_string())
                    .collect();
                cycle.push(self.specs[node].name().to_string());
                return cycle;
            }
            position.insert(node, cycle_path.len());
            cycle_path.push(node);

            match self.dependencies[node].iter().copied().find(|&d| unresolved(d)) {
                Some(next) => node = next,
                None => return Vec::new(),
            }
        }
    }
}

/// A validated graph plus its build order
#[derive(Debug)]
pub struct BuildPlan {
    graph: BuildGraph,
    order: Vec<usize>,
}

impl BuildPlan {
    /// Underlying graph
    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    /// Build order as graph indices
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Build order as package names
    pub fn names(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.graph.spec(i).name())
            .collect()
    }

    /// Number of planned packages
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is planned
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Validate specs and compute their build order
pub fn plan(specs: Vec<PackageSpec>) -> Result<BuildPlan, PlanError> {
    let graph = BuildGraph::new(specs)?;
    let order = graph.topological_order()?;
    tracing::debug!("Planned {} packages", order.len());
    Ok(BuildPlan { graph, order })
}

/// Plan only `targets` and everything they transitively depend on.
///
/// An empty target list plans every spec.
pub fn plan_for(specs: Vec<PackageSpec>, targets: &[String]) -> Result<BuildPlan, PlanError> {
    if targets.is_empty() {
        return plan(specs);
    }

    let mut by_name: HashMap<&str, &PackageSpec> = HashMap::with_capacity(specs.len());
    for spec in &specs {
        if by_name.insert(spec.name(), spec).is_some() {
            return Err(PlanError::DuplicatePackage {
                name: spec.name().to_string(),
            });
        }
    }

    let mut wanted: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for target in targets {
        if !by_name.contains_key(target.as_str()) {
            return Err(PlanError::UnknownPackage {
                name: target.clone(),
            });
        }
        queue.push_back(target.as_str());
    }
    while let Some(name) = queue.pop_front() {
        if !wanted.insert(name.to_string()) {
            continue;
        }
        // Unknown names fall through to BuildGraph::new, which reports the referrer
        if let Some(spec) = by_name.get(name) {
            queue.extend(spec.depends().iter().map(String::as_str));
        }
    }

    let selected = specs
        .into_iter()
        .filter(|s| wanted.contains(s.name()))
        .collect();

    plan(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package::BuildOutput;
    use crate::test_utils::generators::{dag, DagShape};
    use proptest::prelude::*;

    fn spec(name: &str, deps: &[&str]) -> PackageSpec {
        PackageSpec::from_fn(name, |_| Ok(BuildOutput::default()))
            .with_depends(deps.iter().copied())
    }

    fn pos(order: &[&str], name: &str) -> usize {
        order.iter().position(|x| *x == name).unwrap()
    }

    #[test]
    fn test_simple_dependency_order() {
        let plan = plan(vec![spec("app", &["lib"]), spec("lib", &[])]).unwrap();
        let order = plan.names();

        assert!(pos(&order, "lib") < pos(&order, "app"), "lib should be built before app");
    }

    #[test]
    fn test_ties_broken_by_input_order() {
        let plan = plan(vec![
            spec("zlib", &[]),
            spec("gettext", &[]),
            spec("libiconv", &[]),
            spec("macgpg2", &["libiconv", "gettext", "zlib"]),
        ])
        .unwrap();

        assert_eq!(plan.names(), ["zlib", "gettext", "libiconv", "macgpg2"]);
    }

    #[test]
    fn test_dependency_listed_after_dependent() {
        let plan = plan(vec![
            spec("libassuan", &["libgpg-error"]),
            spec("pth", &[]),
            spec("libgpg-error", &[]),
        ])
        .unwrap();

        assert_eq!(plan.names(), ["pth", "libgpg-error", "libassuan"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let err = plan(vec![
            spec("a", &["b"]),
            spec("b", &["c"]),
            spec("c", &["a"]),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            PlanError::CyclicDependency {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_cycle_downstream_of_acyclic_part() {
        let err = plan(vec![
            spec("root", &[]),
            spec("x", &["root", "y"]),
            spec("y", &["x"]),
            spec("tail", &["y"]),
        ])
        .unwrap_err();

        let PlanError::CyclicDependency { cycle } = err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(cycle, ["x", "y", "x"]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = plan(vec![spec("pth", &["pth"])]).unwrap_err();
        assert_eq!(
            err,
            PlanError::CyclicDependency {
                cycle: vec!["pth".into(), "pth".into()]
            }
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let err = plan(vec![spec("gnutls", &["nettle"])]).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownDependency {
                package: "gnutls".into(),
                dependency: "nettle".into()
            }
        );
    }

    #[test]
    fn test_duplicate_package() {
        let err = plan(vec![spec("zlib", &[]), spec("zlib", &[])]).unwrap_err();
        assert!(matches!(err, PlanError::DuplicatePackage { name } if name == "zlib"));
    }

    #[test]
    fn test_duplicate_dependency_entries_collapse() {
        let plan = plan(vec![spec("a", &[]), spec("b", &["a", "a"])]).unwrap();
        let graph = plan.graph();
        assert_eq!(graph.dependencies(1), [0]);
        assert_eq!(graph.dependents(0), [1]);
    }

    #[test]
    fn test_transitive_dependencies_nearest_first() {
        let plan = plan(vec![
            spec("libgpg-error", &[]),
            spec("libgcrypt", &["libgpg-error"]),
            spec("libassuan", &["libgpg-error"]),
            spec("gnupg", &["libgcrypt", "libassuan"]),
        ])
        .unwrap();
        let graph = plan.graph();
        let gnupg = graph.index_of("gnupg").unwrap();
        let names: Vec<&str> = graph
            .transitive_dependencies(gnupg)
            .into_iter()
            .map(|i| graph.spec(i).name())
            .collect();

        assert_eq!(names, ["libgcrypt", "libassuan", "libgpg-error"]);
    }

    #[test]
    fn test_plan_for_restricts_to_closure() {
        let specs = vec![
            spec("zlib", &[]),
            spec("libgpg-error", &[]),
            spec("libassuan", &["libgpg-error"]),
            spec("curl", &["zlib"]),
        ];
        let plan = plan_for(specs, &["libassuan".to_string()]).unwrap();
        assert_eq!(plan.names(), ["libgpg-error", "libassuan"]);
    }

    #[test]
    fn test_plan_for_unknown_target() {
        let err = plan_for(vec![spec("zlib", &[])], &["curl".to_string()]).unwrap_err();
        assert_eq!(err, PlanError::UnknownPackage { name: "curl".into() });
    }

    #[test]
    fn test_plan_for_unknown_dependency_in_closure() {
        let err = plan_for(
            vec![spec("gnutls", &["nettle"]), spec("zlib", &[])],
            &["gnutls".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency { .. }));
    }

    #[test]
    fn test_plan_for_empty_targets_plans_everything() {
        let plan = plan_for(vec![spec("a", &[]), spec("b", &[])], &[]).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan(Vec::new()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.graph().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every dependency precedes its dependent
        #[test]
        fn prop_dependencies_precede_dependents(shape in dag(12)) {
            let specs = shape.specs(|_| Ok(BuildOutput::default()));
            let plan = plan(specs).unwrap();
            let names = plan.names();
            prop_assert_eq!(names.len(), shape.len());

            for (i, deps) in shape.edges.iter().enumerate() {
                let me = pos(&names, &DagShape::name(i));
                for &d in deps {
                    prop_assert!(pos(&names, &DagShape::name(d)) < me);
                }
            }
        }

        /// Planning is deterministic
        #[test]
        fn prop_plan_is_deterministic(shape in dag(12)) {
            let first = plan(shape.specs(|_| Ok(BuildOutput::default()))).unwrap();
            let second = plan(shape.specs(|_| Ok(BuildOutput::default()))).unwrap();
            prop_assert_eq!(first.names(), second.names());
        }

        /// Closing any DAG path into a loop is always reported as a cycle
        #[test]
        fn prop_back_edge_creates_cycle(shape in dag(12)) {
            // Pick any edge i -> d (i depends on d) and add d -> i
            let edge = shape
                .edges
                .iter()
                .enumerate()
                .find_map(|(i, deps)| deps.first().map(|&d| (i, d)));
            prop_assume!(edge.is_some());
            let (i, d) = edge.unwrap();

            let mut cyclic = shape.clone();
            cyclic.edges[d].push(i);
            let result = plan(cyclic.specs(|_| Ok(BuildOutput::default())));
            let is_cycle = matches!(result, Err(PlanError::CyclicDependency { .. }));
            prop_assert!(is_cycle);
        }
    }
}
