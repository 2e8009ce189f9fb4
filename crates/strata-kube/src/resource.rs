//! Helpers shared by the watch loops: owner links, finalizers and status.

use std::fmt::Debug;

use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use strata_core::crd::FINALIZER;
use strata_core::{OwnerLink, ResourceStatus};

use crate::backend::FIELD_MANAGER;
use crate::error::{KubeError, KubeResult};

/// Back-reference stamped on every object created for `obj`.
pub fn owner_link<K>(obj: &K) -> KubeResult<OwnerLink>
where
    K: Resource<DynamicType = ()>,
{
    Ok(OwnerLink {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: obj.name_any(),
        namespace: obj
            .namespace()
            .ok_or(KubeError::MissingMetadata("namespace"))?,
        uid: obj.uid().ok_or(KubeError::MissingMetadata("uid"))?,
    })
}

pub fn has_finalizer<K: Resource>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == FINALIZER)
}

pub async fn add_finalizer<K>(api: &Api<K>, obj: &K) -> KubeResult<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    if has_finalizer(obj) {
        return Ok(());
    }
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    patch_finalizers(api, &obj.name_any(), finalizers).await
}

pub async fn remove_finalizer<K>(api: &Api<K>, obj: &K) -> KubeResult<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    patch_finalizers(api, &obj.name_any(), finalizers).await
}

async fn patch_finalizers<K>(api: &Api<K>, name: &str, finalizers: Vec<String>) -> KubeResult<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Write `status` to the status subresource, stamped with the generation
/// of the object it was computed from.
pub async fn patch_status<K>(api: &Api<K>, obj: &K, status: &ResourceStatus) -> KubeResult<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let mut status = status.clone();
    status.observed_generation = obj.meta().generation;
    let patch = json!({ "status": status });
    api.patch_status(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
