//! Dependency resolution between plugins.
//!
//! Builds a graph with an edge from each dependency to its dependent and
//! topologically sorts it by repeatedly taking the zero-in-degree node with
//! the smallest name. Ties are always broken the same way, so the same
//! manifest set always produces the same [`ResolvedOrder`].
//!
//! Version checks use strict semantic versioning (`semver::VersionReq`).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::ResolutionError;

use super::types::PluginManifest;

/// Plugin names ordered so every dependency precedes its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedOrder {
    names: Vec<String>,
}

impl ResolvedOrder {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Compute an activation order for `manifests`.
///
/// All-or-nothing: any missing dependency, version mismatch or cycle fails the
/// whole set. Checks run in that order, manifests visited by name and
/// dependencies in declaration order, so the reported error is stable too.
pub fn resolve(manifests: &[PluginManifest]) -> Result<ResolvedOrder, ResolutionError> {
    let mut by_name: BTreeMap<&str, &PluginManifest> = BTreeMap::new();
    for manifest in manifests {
        if by_name.contains_key(manifest.name.as_str()) {
            warn!(plugin = %manifest.name, "Duplicate manifest ignored during resolution");
            continue;
        }
        by_name.insert(manifest.name.as_str(), manifest);
    }

    for manifest in by_name.values() {
        for dep in &manifest.dependencies {
            let target = by_name.get(dep.name.as_str()).ok_or_else(|| {
                ResolutionError::MissingDependency {
                    plugin: manifest.name.clone(),
                    dependency: dep.name.clone(),
                }
            })?;
            if !dep.requirement.matches(&target.version) {
                return Err(ResolutionError::VersionMismatch {
                    plugin: manifest.name.clone(),
                    dependency: dep.name.clone(),
                    required: dep.requirement.to_string(),
                    found: target.version.to_string(),
                });
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, manifest) in &by_name {
        let mut deps: Vec<&str> = manifest.dependency_names().collect();
        deps.sort_unstable();
        deps.dedup();
        in_degree.insert(*name, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(*name);
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut names = Vec::with_capacity(by_name.len());

    while let Some(name) = ready.pop_first() {
        names.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if names.len() < by_name.len() {
        let remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(name, _)| *name)
            .collect();
        let cycle = find_cycle(&by_name, &remaining);
        return Err(ResolutionError::Cycle { cycle });
    }

    debug!(order = ?names, "Resolved activation order");
    Ok(ResolvedOrder { names })
}

/// Extract one cycle from the nodes left over after the topological sort.
///
/// Every remaining node has at least one remaining dependency, so following
/// dependencies from any of them must revisit a node. Nodes merely downstream
/// of a cycle are not part of the result.
fn find_cycle<'a>(
    by_name: &BTreeMap<&'a str, &'a PluginManifest>,
    remaining: &BTreeSet<&'a str>,
) -> Vec<String> {
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&pos) = seen.get(current) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            if let Some(min_pos) = cycle
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(i, _)| i)
            {
                cycle.rotate_left(min_pos);
            }
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);

        let next = by_name.get(current).and_then(|manifest| {
            manifest
                .dependency_names()
                .filter(|dep| remaining.contains(dep))
                .min()
        });
        match next {
            Some(next) => current = next,
            None => return path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::{Version, VersionReq};

    fn manifest(name: &str, version: &str, deps: &[(&str, &str)]) -> PluginManifest {
        let mut m = PluginManifest::new(
            name,
            Version::parse(version).unwrap(),
            format!("builtin:{}", name),
        );
        for (dep, req) in deps {
            m = m.depends_on(*dep, VersionReq::parse(req).unwrap());
        }
        m
    }

    fn assert_valid_order(manifests: &[PluginManifest], order: &ResolvedOrder) {
        assert_eq!(order.len(), manifests.len());
        for m in manifests {
            let own = order.position(&m.name).unwrap();
            for dep in m.dependency_names() {
                assert!(order.position(dep).unwrap() < own, "{} before {}", dep, m.name);
            }
        }
    }

    #[test]
    fn test_linear_chain() {
        let manifests = vec![
            manifest("c", "1.0.0", &[("b", ">=1.0")]),
            manifest("a", "1.0.0", &[]),
            manifest("b", "1.0.0", &[("a", ">=1.0")]),
        ];
        let order = resolve(&manifests).unwrap();
        assert_eq!(order.names(), &["a", "b", "c"]);
    }

    #[test]
    fn test_ties_broken_by_name() {
        let manifests = vec![
            manifest("zulu", "1.0.0", &[]),
            manifest("mike", "1.0.0", &[("zulu", "*")]),
            manifest("alpha", "1.0.0", &[]),
            manifest("bravo", "1.0.0", &[("alpha", "*")]),
        ];
        let order = resolve(&manifests).unwrap();
        assert_eq!(order.names(), &["alpha", "bravo", "zulu", "mike"]);
    }

    #[test]
    fn test_diamond_is_valid_and_deterministic() {
        let manifests = vec![
            manifest("app", "1.0.0", &[("left", "*"), ("right", "*")]),
            manifest("left", "1.0.0", &[("base", "^1")]),
            manifest("right", "1.0.0", &[("base", "^1")]),
            manifest("base", "1.3.0", &[]),
        ];
        let first = resolve(&manifests).unwrap();
        assert_valid_order(&manifests, &first);

        let mut shuffled = manifests.clone();
        shuffled.reverse();
        assert_eq!(resolve(&shuffled).unwrap(), first);
        assert_eq!(resolve(&manifests).unwrap(), first);
    }

    #[test]
    fn test_empty_set() {
        assert!(resolve(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_dependency() {
        let manifests = vec![manifest("b", "1.0.0", &[("a", "*")])];
        assert_eq!(
            resolve(&manifests).unwrap_err(),
            ResolutionError::MissingDependency {
                plugin: "b".into(),
                dependency: "a".into(),
            }
        );
    }

    #[test]
    fn test_version_mismatch() {
        let manifests = vec![
            manifest("a", "0.9.0", &[]),
            manifest("b", "1.0.0", &[("a", ">=1.0")]),
        ];
        match resolve(&manifests).unwrap_err() {
            ResolutionError::VersionMismatch {
                plugin,
                dependency,
                required,
                found,
            } => {
                assert_eq!(plugin, "b");
                assert_eq!(dependency, "a");
                assert_eq!(required, ">=1.0");
                assert_eq!(found, "0.9.0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_strict_semver_excludes_prerelease() {
        let manifests = vec![
            manifest("a", "2.0.0-beta.1", &[]),
            manifest("b", "1.0.0", &[("a", ">=1.0")]),
        ];
        assert!(matches!(
            resolve(&manifests),
            Err(ResolutionError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_cycle_reports_exact_nodes() {
        // a -> c -> b -> a, with d hanging off the cycle.
        let manifests = vec![
            manifest("a", "1.0.0", &[("c", "*")]),
            manifest("b", "1.0.0", &[("a", "*")]),
            manifest("c", "1.0.0", &[("b", "*")]),
            manifest("d", "1.0.0", &[("a", "*")]),
            manifest("e", "1.0.0", &[]),
        ];
        match resolve(&manifests).unwrap_err() {
            ResolutionError::Cycle { cycle } => assert_eq!(cycle, vec!["a", "c", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_found_from_downstream_start() {
        let manifests = vec![
            manifest("app", "1.0.0", &[("x", "*")]),
            manifest("x", "1.0.0", &[("y", "*")]),
            manifest("y", "1.0.0", &[("x", "*")]),
        ];
        match resolve(&manifests).unwrap_err() {
            ResolutionError::Cycle { cycle } => assert_eq!(cycle, vec!["x", "y"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_cycle() {
        let manifests = vec![manifest("solo", "1.0.0", &[("solo", "*")])];
        assert_eq!(
            resolve(&manifests).unwrap_err(),
            ResolutionError::Cycle {
                cycle: vec!["solo".into()]
            }
        );
    }

    #[test]
    fn test_reduced_set_resolves_after_removal() {
        let mut manifests = vec![
            manifest("a", "1.0.0", &[]),
            manifest("b", "1.0.0", &[("a", "*")]),
            manifest("broken", "1.0.0", &[("ghost", "*")]),
        ];
        assert!(resolve(&manifests).is_err());

        manifests.retain(|m| m.name != "broken");
        assert_eq!(resolve(&manifests).unwrap().names(), &["a", "b"]);
    }

    #[test]
    fn test_iter_reverses() {
        let manifests = vec![
            manifest("a", "1.0.0", &[]),
            manifest("b", "1.0.0", &[("a", "*")]),
        ];
        let order = resolve(&manifests).unwrap();
        assert_eq!(order.iter().rev().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
