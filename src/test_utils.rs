//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    use crate::core::package::{BuildContext, BuildOutput, PackageSpec};
    use crate::error::ActionError;

    /// Shape of a random acyclic dependency graph.
    ///
    /// `edges[i]` lists the dependencies of package `i`; they always have a
    /// lower index. Specs are emitted in `emit_order`, so input order is not
    /// already topological.
    #[derive(Debug, Clone)]
    pub struct DagShape {
        /// Dependencies per package
        pub edges: Vec<Vec<usize>>,
        /// Order in which specs are handed to the planner
        pub emit_order: Vec<usize>,
    }

    impl DagShape {
        /// Name of package `i`
        pub fn name(i: usize) -> String {
            format!("pkg{i}")
        }

        /// Number of packages
        pub fn len(&self) -> usize {
            self.edges.len()
        }

        /// Build specs sharing one action
        pub fn specs<F>(&self, action: F) -> Vec<PackageSpec>
        where
            F: Fn(&BuildContext<'_>) -> Result<BuildOutput, ActionError>
                + Send
                + Sync
                + Clone
                + 'static,
        {
            self.emit_order
                .iter()
                .map(|&i| {
                    PackageSpec::from_fn(Self::name(i), action.clone())
                        .with_depends(self.edges[i].iter().map(|&d| Self::name(d)))
                })
                .collect()
        }
    }

    /// Generate a random DAG with 1 to `max` packages
    pub fn dag(max: usize) -> impl Strategy<Value = DagShape> {
        (1..=max).prop_flat_map(|n| {
            let edges: Vec<_> = (0..n)
                .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i.min(3)))
                .collect();
            let emit_order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
            (edges, emit_order).prop_map(|(edges, emit_order)| DagShape { edges, emit_order })
        })
    }

    /// Generate a valid package name (formula style)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9+._-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a valid SHA256 hash (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_dag_edges_point_backwards(shape in dag(10)) {
            prop_assert_eq!(shape.emit_order.len(), shape.len());
            for (i, deps) in shape.edges.iter().enumerate() {
                for &d in deps {
                    prop_assert!(d < i);
                }
            }
        }

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().next().unwrap().is_ascii_lowercase());
        }

        #[test]
        fn test_sha256_hash_generator(hash in sha256_hash()) {
            prop_assert_eq!(hash.len(), 64);
            prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
