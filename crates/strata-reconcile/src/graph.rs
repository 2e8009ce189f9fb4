//! Component dependency graph.
//!
//! Apply walks components in topological order; ties are broken by
//! declaration order, so the result is deterministic. Teardown is the
//! exact reverse.

use std::collections::{BTreeSet, HashMap};

use strata_builder::components::{self as c};
use strata_builder::{BuildResult, InfraObject, ObjectRef};
use strata_core::ClusterConfig;
use thiserror::Error;

use crate::backend::ObservedObject;

pub type BuildFn = fn(&ClusterConfig) -> BuildResult<Vec<InfraObject>>;

/// How many replicas of the readiness object must be ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyWhen {
    /// The object exists.
    Exists,
    MinReplicas(u32),
    /// A strict majority of the desired replicas.
    Quorum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub object: ObjectRef,
    pub ready_when: ReadyWhen,
}

impl Readiness {
    pub fn is_satisfied(&self, observed: Option<&ObservedObject>) -> bool {
        let Some(observed) = observed else {
            return false;
        };
        match self.ready_when {
            ReadyWhen::Exists => true,
            ReadyWhen::MinReplicas(n) => observed.ready_replicas >= n,
            ReadyWhen::Quorum => {
                let desired = observed.replicas.unwrap_or(1);
                observed.ready_replicas >= desired / 2 + 1
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub name: &'static str,
    pub prerequisites: &'static [&'static str],
    /// Objects the component owns, in creation order.
    pub objects: &'static [ObjectRef],
    pub build: BuildFn,
    pub readiness: Readiness,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate component {0}")]
    Duplicate(&'static str),

    #[error("component {component} depends on unknown component {prerequisite}")]
    UnknownPrerequisite {
        component: &'static str,
        prerequisite: &'static str,
    },

    #[error("dependency cycle among: {}", .0.join(", "))]
    Cycle(Vec<&'static str>),
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    components: Vec<ComponentDescriptor>,
    /// Indices into `components`, prerequisites first.
    order: Vec<usize>,
}

impl DependencyGraph {
    pub fn new(components: Vec<ComponentDescriptor>) -> Result<Self, GraphError> {
        let mut index = HashMap::new();
        for (i, comp) in components.iter().enumerate() {
            if index.insert(comp.name, i).is_some() {
                return Err(GraphError::Duplicate(comp.name));
            }
        }

        let mut indegree = vec![0usize; components.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        for (i, comp) in components.iter().enumerate() {
            for prereq in comp.prerequisites {
                let Some(&p) = index.get(prereq) else {
                    return Err(GraphError::UnknownPrerequisite {
                        component: comp.name,
                        prerequisite: prereq,
                    });
                };
                indegree[i] += 1;
                dependents[p].push(i);
            }
        }

        // Kahn's algorithm, always taking the lowest declaration index.
        let mut ready: BTreeSet<usize> = (0..components.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(components.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() != components.len() {
            let stuck = (0..components.len())
                .filter(|i| indegree[*i] > 0)
                .map(|i| components[i].name)
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(Self { components, order })
    }

    /// The storage cluster: credentials, broker, safekeepers, control
    /// plane, page servers, compute.
    pub fn cluster() -> Result<Self, GraphError> {
        Self::new(cluster_components())
    }

    pub fn apply_order(&self) -> impl DoubleEndedIterator<Item = &ComponentDescriptor> {
        self.order.iter().map(|&i| &self.components[i])
    }

    pub fn teardown_order(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.apply_order().rev()
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.apply_order().map(|c| c.name).collect()
    }
}

pub fn cluster_components() -> Vec<ComponentDescriptor> {
    use strata_builder::ObjectKind::*;

    vec![
        ComponentDescriptor {
            name: c::STORAGE_CREDENTIALS,
            prerequisites: &[],
            objects: c::STORAGE_CREDENTIALS_OBJECTS,
            build: c::storage_credentials,
            readiness: Readiness {
                object: ObjectRef::new(Secret, c::CREDENTIALS_SECRET),
                ready_when: ReadyWhen::Exists,
            },
        },
        ComponentDescriptor {
            name: c::STORAGE_BROKER,
            prerequisites: &[c::STORAGE_CREDENTIALS],
            objects: c::STORAGE_BROKER_OBJECTS,
            build: c::storage_broker,
            readiness: Readiness {
                object: ObjectRef::new(Deployment, c::STORAGE_BROKER),
                ready_when: ReadyWhen::MinReplicas(1),
            },
        },
        ComponentDescriptor {
            name: c::SAFEKEEPER,
            prerequisites: &[c::STORAGE_CREDENTIALS, c::STORAGE_BROKER],
            objects: c::SAFEKEEPER_OBJECTS,
            build: c::safekeeper,
            readiness: Readiness {
                object: ObjectRef::new(StatefulSet, c::SAFEKEEPER),
                ready_when: ReadyWhen::Quorum,
            },
        },
        ComponentDescriptor {
            name: c::CONTROL_PLANE,
            prerequisites: &[c::SAFEKEEPER],
            objects: c::CONTROL_PLANE_OBJECTS,
            build: c::control_plane,
            readiness: Readiness {
                object: ObjectRef::new(StatefulSet, c::CONTROL_PLANE),
                ready_when: ReadyWhen::MinReplicas(1),
            },
        },
        ComponentDescriptor {
            name: c::PAGESERVER,
            prerequisites: &[
                c::STORAGE_CREDENTIALS,
                c::STORAGE_BROKER,
                c::SAFEKEEPER,
                c::CONTROL_PLANE,
            ],
            objects: c::PAGESERVER_OBJECTS,
            build: c::pageserver,
            readiness: Readiness {
                object: ObjectRef::new(StatefulSet, c::PAGESERVER),
                ready_when: ReadyWhen::MinReplicas(1),
            },
        },
        ComponentDescriptor {
            name: c::COMPUTE_NODE,
            prerequisites: &[c::PAGESERVER, c::SAFEKEEPER, c::CONTROL_PLANE],
            objects: c::COMPUTE_NODE_OBJECTS,
            build: c::compute_node,
            readiness: Readiness {
                object: ObjectRef::new(Deployment, c::COMPUTE_NODE),
                ready_when: ReadyWhen::MinReplicas(1),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &'static str, prerequisites: &'static [&'static str]) -> ComponentDescriptor {
        let mut d = cluster_components().remove(0);
        d.name = name;
        d.prerequisites = prerequisites;
        d
    }

    #[test]
    fn cluster_order_respects_dependencies() {
        let graph = DependencyGraph::cluster().unwrap();
        assert_eq!(
            graph.names(),
            vec![
                "storage-credentials",
                "storage-broker",
                "safekeeper",
                "control-plane",
                "pageserver",
                "compute-node",
            ]
        );
        let teardown: Vec<_> = graph.teardown_order().map(|c| c.name).collect();
        let mut reversed = graph.names();
        reversed.reverse();
        assert_eq!(teardown, reversed);
    }

    #[test]
    fn order_independent_of_declaration_permutation() {
        // Every rotation of the declaration list still yields an order in
        // which each component follows all its prerequisites.
        let base = cluster_components();
        for shift in 0..base.len() {
            let mut components = base.clone();
            components.rotate_left(shift);
            let graph = DependencyGraph::new(components).unwrap();
            let names = graph.names();
            for comp in graph.apply_order() {
                let pos = names.iter().position(|n| *n == comp.name).unwrap();
                for prereq in comp.prerequisites {
                    let ppos = names.iter().position(|n| n == prereq).unwrap();
                    assert!(ppos < pos, "{prereq} must precede {}", comp.name);
                }
            }
        }
    }

    #[test]
    fn ties_follow_declaration_order() {
        let graph = DependencyGraph::new(vec![
            named("b", &[]),
            named("a", &[]),
            named("c", &["a"]),
        ])
        .unwrap();
        assert_eq!(graph.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn rejects_cycles() {
        let err = DependencyGraph::new(vec![
            named("a", &["b"]),
            named("b", &["a"]),
            named("c", &[]),
        ])
        .unwrap_err();
        assert_eq!(err, GraphError::Cycle(vec!["a", "b"]));
    }

    #[test]
    fn rejects_unknown_and_duplicate() {
        assert_eq!(
            DependencyGraph::new(vec![named("a", &["ghost"])]).unwrap_err(),
            GraphError::UnknownPrerequisite {
                component: "a",
                prerequisite: "ghost"
            }
        );
        assert_eq!(
            DependencyGraph::new(vec![named("a", &[]), named("a", &[])]).unwrap_err(),
            GraphError::Duplicate("a")
        );
    }

    #[test]
    fn quorum_needs_majority() {
        let r = Readiness {
            object: c::SAFEKEEPER_OBJECTS[0],
            ready_when: ReadyWhen::Quorum,
        };
        let observed = |ready| ObservedObject {
            replicas: Some(3),
            ready_replicas: ready,
        };
        assert!(!r.is_satisfied(None));
        assert!(!r.is_satisfied(Some(&observed(1))));
        assert!(r.is_satisfied(Some(&observed(2))));
    }

    #[test]
    fn exists_ignores_replicas() {
        let r = Readiness {
            object: c::STORAGE_CREDENTIALS_OBJECTS[0],
            ready_when: ReadyWhen::Exists,
        };
        assert!(r.is_satisfied(Some(&ObservedObject::default())));
    }
}
