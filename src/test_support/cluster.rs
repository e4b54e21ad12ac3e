//! In-memory control plane and volume catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::cluster::{
    CLAIM_BOUND, ClaimVolumeSource, ClusterError, ClusterFuture, Container, ControlPlane,
    ObjectMeta, POD_RUNNING, PersistentVolumeClaim, PersistentVolumeClaimSpec, PhaseStatus, Pod,
    PodSpec, PodVolume, Resource, Volume, VolumeCatalog, VolumeMount, VolumeState,
};

use super::lock;

/// A call observed by [`InMemoryCluster`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClusterCall {
    /// `get` of one object.
    Get {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },
    /// `create` of one object.
    Create {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },
    /// `list` of a kind.
    List {
        /// Object kind.
        kind: String,
    },
    /// `delete` of one object.
    Delete {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },
    /// Longhorn volume listing.
    ListVolumes,
}

type ObjectKey = (String, Option<String>, String);

#[derive(Debug, Default)]
struct ClusterState {
    objects: BTreeMap<ObjectKey, Value>,
    volumes: Vec<Volume>,
    calls: Vec<ClusterCall>,
    manual_readiness: bool,
    pod_start_polls: Option<u32>,
    pending_pods: BTreeMap<String, u32>,
    racing_creates: BTreeSet<String>,
    failing_gets: BTreeSet<String>,
    failing_lists: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    failing_creates: BTreeSet<String>,
    volume_listing_fails: bool,
}

/// Control plane double that stores objects in memory.
///
/// By default created claims report `Bound` and created pods report
/// `Running` immediately. Locks are never held across an await.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

fn key<T: Resource>(namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if T::NAMESPACED {
        namespace.map(str::to_owned)
    } else {
        None
    };
    (T::KIND.to_owned(), namespace, name.to_owned())
}

fn simulated(action: &str, name: &str) -> ClusterError {
    ClusterError::CommandFailure {
        program: String::from("kubectl"),
        action: format!("{action} {name}"),
        status: Some(1),
        status_text: String::from("1"),
        stderr: String::from("simulated failure"),
    }
}

fn decode<T: Resource>(value: &Value) -> Result<T, ClusterError> {
    serde_json::from_value(value.clone()).map_err(|err| ClusterError::Parse {
        resource: T::PLURAL.to_owned(),
        message: err.to_string(),
    })
}

fn encode<T: Resource>(object: &T) -> Result<Value, ClusterError> {
    serde_json::to_value(object).map_err(|err| ClusterError::Parse {
        resource: T::PLURAL.to_owned(),
        message: err.to_string(),
    })
}

fn set_phase(value: &mut Value, phase: &str) {
    if let Value::Object(map) = value {
        map.insert(String::from("status"), json!({ "phase": phase }));
    }
}

fn matches_selector(value: &Value, selector: Option<&str>) -> bool {
    let Some((label, expected)) = selector.and_then(|sel| sel.split_once('=')) else {
        return true;
    };
    value["metadata"]["labels"][label].as_str() == Some(expected)
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves created claims and pods without a phase until
    /// [`InMemoryCluster::set_phase`] changes them.
    #[must_use]
    pub fn with_manual_readiness(self) -> Self {
        lock(&self.state).manual_readiness = true;
        self
    }

    /// Makes created pods report `Pending` for `polls` reads before `Running`.
    #[must_use]
    pub fn with_pod_start_polls(self, polls: u32) -> Self {
        lock(&self.state).pod_start_polls = Some(polls);
        self
    }

    /// Registers a Longhorn volume.
    pub fn add_volume(&self, name: &str, size: Option<&str>, pv_name: Option<&str>) {
        lock(&self.state).volumes.push(Volume {
            name: name.to_owned(),
            size: size.map(str::to_owned),
            state: if pv_name.is_some() {
                VolumeState::Attached
            } else {
                VolumeState::Detached
            },
            pv_name: pv_name.map(str::to_owned),
        });
    }

    /// Stores `object` as if it already existed.
    pub fn insert<T: Resource>(&self, object: &T) {
        let Ok(value) = encode(object) else {
            return;
        };
        let metadata = object.metadata();
        lock(&self.state).objects.insert(
            key::<T>(metadata.namespace.as_deref(), &metadata.name),
            value,
        );
    }

    /// Adds a bound claim for `persistent_volume` and a running pod that
    /// mounts it in `container` at `mount_path`.
    pub fn add_workload(
        &self,
        namespace: &str,
        persistent_volume: &str,
        claim: &str,
        pod: &str,
        container: &str,
        mount_path: &str,
    ) {
        self.insert(&PersistentVolumeClaim {
            metadata: ObjectMeta::new(claim, Some(namespace), BTreeMap::new()),
            spec: PersistentVolumeClaimSpec {
                volume_name: Some(persistent_volume.to_owned()),
                ..PersistentVolumeClaimSpec::default()
            },
            status: Some(PhaseStatus::with_phase(CLAIM_BOUND)),
        });
        self.insert(&Pod {
            metadata: ObjectMeta::new(pod, Some(namespace), BTreeMap::new()),
            spec: PodSpec {
                containers: vec![Container {
                    name: container.to_owned(),
                    image: Some(String::from("postgres:16")),
                    command: Vec::new(),
                    volume_mounts: vec![VolumeMount {
                        name: String::from("data"),
                        mount_path: mount_path.to_owned(),
                    }],
                }],
                volumes: vec![PodVolume {
                    name: String::from("data"),
                    persistent_volume_claim: Some(ClaimVolumeSource {
                        claim_name: claim.to_owned(),
                    }),
                }],
                restart_policy: None,
            },
            status: Some(PhaseStatus::with_phase(POD_RUNNING)),
        });
    }

    /// Overrides the phase of a stored object.
    pub fn set_phase<T: Resource>(&self, namespace: Option<&str>, name: &str, phase: &str) {
        if let Some(value) = lock(&self.state).objects.get_mut(&key::<T>(namespace, name)) {
            set_phase(value, phase);
        }
    }

    /// Makes the next create of `name` lose a race to a concurrent creator.
    pub fn race_on_create(&self, name: &str) {
        lock(&self.state).racing_creates.insert(name.to_owned());
    }

    /// Makes every get of `name` fail.
    pub fn fail_get(&self, name: &str) {
        lock(&self.state).failing_gets.insert(name.to_owned());
    }

    /// Makes every create of `name` fail.
    pub fn fail_create(&self, name: &str) {
        lock(&self.state).failing_creates.insert(name.to_owned());
    }

    /// Makes every list of kind `T` fail.
    pub fn fail_list<T: Resource>(&self) {
        lock(&self.state).failing_lists.insert(T::KIND.to_owned());
    }

    /// Makes every delete of `name` fail.
    pub fn fail_delete(&self, name: &str) {
        lock(&self.state).failing_deletes.insert(name.to_owned());
    }

    /// Makes the Longhorn volume listing fail.
    pub fn fail_volume_listing(&self) {
        lock(&self.state).volume_listing_fails = true;
    }

    /// Returns the stored object, if any.
    #[must_use]
    pub fn object<T: Resource>(&self, namespace: Option<&str>, name: &str) -> Option<T> {
        let state = lock(&self.state);
        state
            .objects
            .get(&key::<T>(namespace, name))
            .and_then(|value| decode(value).ok())
    }

    /// Returns `true` when the object exists.
    #[must_use]
    pub fn contains<T: Resource>(&self, namespace: Option<&str>, name: &str) -> bool {
        lock(&self.state)
            .objects
            .contains_key(&key::<T>(namespace, name))
    }

    /// Names of every stored object of kind `T`.
    #[must_use]
    pub fn names<T: Resource>(&self) -> Vec<String> {
        lock(&self.state)
            .objects
            .keys()
            .filter(|(kind, _, _)| kind == T::KIND)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Snapshot of observed calls.
    #[must_use]
    pub fn calls(&self) -> Vec<ClusterCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of successful or attempted creates.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ClusterCall::Create { .. }))
            .count()
    }

    fn do_get<T: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<T>, ClusterError> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.calls.push(ClusterCall::Get {
            kind: T::KIND.to_owned(),
            name: name.to_owned(),
        });
        if state.failing_gets.contains(name) {
            return Err(simulated("get", name));
        }

        let object_key = key::<T>(namespace, name);
        if T::KIND == Pod::KIND
            && let Some(remaining) = state.pending_pods.get_mut(name)
        {
            if *remaining == 0 {
                state.pending_pods.remove(name);
                if let Some(value) = state.objects.get_mut(&object_key) {
                    set_phase(value, POD_RUNNING);
                }
            } else {
                *remaining -= 1;
            }
        }

        state.objects.get(&object_key).map(decode).transpose()
    }

    fn do_create<T: Resource>(&self, object: &T) -> Result<T, ClusterError> {
        let mut value = encode(object)?;
        let name = object.name().to_owned();
        let object_key = key::<T>(object.metadata().namespace.as_deref(), &name);
        let mut state = lock(&self.state);
        state.calls.push(ClusterCall::Create {
            kind: T::KIND.to_owned(),
            name: name.clone(),
        });
        if state.failing_creates.contains(&name) {
            return Err(simulated("create", &name));
        }

        let exists = state.objects.contains_key(&object_key);
        let racing = state.racing_creates.remove(&name);
        if exists && !racing {
            return Err(ClusterError::AlreadyExists {
                kind: T::KIND.to_owned(),
                name,
            });
        }

        if !state.manual_readiness {
            if T::KIND == Pod::KIND {
                match state.pod_start_polls {
                    Some(polls) if !racing => {
                        set_phase(&mut value, "Pending");
                        state.pending_pods.insert(name.clone(), polls);
                    }
                    _ => set_phase(&mut value, POD_RUNNING),
                }
            } else {
                set_phase(&mut value, CLAIM_BOUND);
            }
        }

        state.objects.insert(object_key, value.clone());
        if racing {
            return Err(ClusterError::AlreadyExists {
                kind: T::KIND.to_owned(),
                name,
            });
        }
        decode(&value)
    }

    fn do_list<T: Resource>(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<T>, ClusterError> {
        let mut state = lock(&self.state);
        state.calls.push(ClusterCall::List {
            kind: T::KIND.to_owned(),
        });
        if state.failing_lists.contains(T::KIND) {
            return Err(simulated("list", T::PLURAL));
        }
        let scope = if T::NAMESPACED { namespace } else { None };
        state
            .objects
            .iter()
            .filter(|((kind, ns, _), value)| {
                kind == T::KIND
                    && (scope.is_none() || ns.as_deref() == scope)
                    && matches_selector(value, selector)
            })
            .map(|(_, value)| decode(value))
            .collect()
    }

    fn do_delete<T: Resource>(&self, namespace: Option<&str>, name: &str) -> Result<(), ClusterError> {
        let mut state = lock(&self.state);
        state.calls.push(ClusterCall::Delete {
            kind: T::KIND.to_owned(),
            name: name.to_owned(),
        });
        if state.failing_deletes.contains(name) {
            return Err(simulated("delete", name));
        }
        state
            .objects
            .remove(&key::<T>(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound {
                kind: T::KIND.to_owned(),
                name: name.to_owned(),
            })
    }
}

impl ControlPlane for InMemoryCluster {
    fn get<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<T>> {
        Box::pin(std::future::ready(self.do_get(namespace, name)))
    }

    fn create<'a, T: Resource>(&'a self, object: &'a T) -> ClusterFuture<'a, T> {
        Box::pin(std::future::ready(self.do_create(object)))
    }

    fn list<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        selector: Option<&'a str>,
    ) -> ClusterFuture<'a, Vec<T>> {
        Box::pin(std::future::ready(self.do_list(namespace, selector)))
    }

    fn delete<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(std::future::ready(self.do_delete::<T>(namespace, name)))
    }
}

impl VolumeCatalog for InMemoryCluster {
    fn list_volumes(&self) -> ClusterFuture<'_, Vec<Volume>> {
        let mut state = lock(&self.state);
        state.calls.push(ClusterCall::ListVolumes);
        let result = if state.volume_listing_fails {
            Err(simulated("get", "volumes.longhorn.io"))
        } else {
            Ok(state.volumes.clone())
        };
        Box::pin(std::future::ready(result))
    }
}
