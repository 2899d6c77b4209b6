//! `OrgSecurityEnricher`: the one enricher that doesn't write
//! a per-record block. It enumerates the tenant's global security
//! entities once per run (three list queries: profiles, permission sets,
//! roles) and then fetches a label for each profile and permission set
//! as a separate per-entity call, since the list query only names them.
//! Because this detail fan-out is per-entity rather than per-working-set
//! ref, it goes through `RemoteClient` directly rather than the
//! coalescer, bounded by the same worker-pool idiom as the Describer.
//! This is the most common quota-wall target, so every per-entity call is
//! a real, budget-governed remote call rather than a local computation.

use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crm_core::PipelineError;
use crm_model::{OrgSecurityModel, PermissionSet, Profile, Role};

use crate::remote::RemoteClient;

#[derive(Deserialize)]
struct NameRow {
    name: String,
}

#[derive(Deserialize)]
struct RoleRow {
    name: String,
    label: String,
    #[serde(default)]
    parent_role: Option<String>,
}

#[derive(Deserialize)]
struct LabelResponse {
    label: String,
}

pub struct OrgSecurityEnricher {
    remote: RemoteClient,
    pool_size: usize,
}

impl OrgSecurityEnricher {
    pub fn new(remote: RemoteClient, pool_size: usize) -> Self {
        Self { remote, pool_size }
    }

    /// Enumerates and labels every profile, permission set, and role in
    /// the org, returning the failures encountered along the way rather
    /// than aborting the whole model on a partial fetch.
    pub async fn enrich(
        &self,
    ) -> (OrgSecurityModel, Vec<(String, PipelineError<Infallible>)>) {
        let mut failed = Vec::new();

        let profile_names = match self.list("profiles").await {
            Ok(names) => names,
            Err(e) => {
                failed.push(("profiles".to_string(), e));
                Vec::new()
            }
        };
        let permission_set_names = match self.list("permission_sets").await {
            Ok(names) => names,
            Err(e) => {
                failed.push(("permission_sets".to_string(), e));
                Vec::new()
            }
        };
        let roles = match self.list_roles().await {
            Ok(roles) => roles,
            Err(e) => {
                failed.push(("roles".to_string(), e));
                Vec::new()
            }
        };

        let (profiles, profile_failures) = self
            .label_all(profile_names, "profile")
            .await;
        let (permission_sets, permission_set_failures) = self
            .label_all(permission_set_names, "permission_set")
            .await;
        failed.extend(profile_failures);
        failed.extend(permission_set_failures);

        let profiles = profiles.into_iter().map(|(name, label)| Profile { name, label }).collect();
        let permission_sets = permission_sets
            .into_iter()
            .map(|(name, label)| PermissionSet { name, label })
            .collect();

        (
            OrgSecurityModel {
                profiles,
                permission_sets,
                roles,
            },
            failed,
        )
    }

    async fn list(&self, kind: &str) -> Result<Vec<String>, PipelineError<Infallible>> {
        let value = self.remote.invoke_json(&["list", kind], None).await?;
        let rows = value
            .get(kind)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let names = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<NameRow>(row).ok())
            .map(|row| row.name)
            .collect();
        Ok(names)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, PipelineError<Infallible>> {
        let value = self.remote.invoke_json(&["list", "roles"], None).await?;
        let rows = value
            .get("roles")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let roles = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<RoleRow>(row).ok())
            .map(|row| Role {
                name: row.name,
                label: row.label,
                parent_role: row.parent_role,
            })
            .collect();
        Ok(roles)
    }

    async fn label_all(
        &self,
        names: Vec<String>,
        entity_kind: &'static str,
    ) -> (Vec<(String, String)>, Vec<(String, PipelineError<Infallible>)>) {
        let semaphore = Arc::new(Semaphore::new(self.pool_size.max(1)));
        let mut tasks = JoinSet::new();

        for name in names {
            let semaphore = Arc::clone(&semaphore);
            let remote = self.remote.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("org security enricher semaphore never closes");
                let result = remote
                    .invoke_json(&["describe", entity_kind, name.as_str()], None)
                    .await
                    .and_then(|value| {
                        serde_json::from_value::<LabelResponse>(value).map_err(|_| {
                            PipelineError::Consistency {
                                detail: format!("malformed {entity_kind} detail for {name}"),
                            }
                        })
                    });
                (name, result)
            });
        }

        let mut labeled = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((name, result)) = joined {
                match result {
                    Ok(response) => labeled.push((name, response.label)),
                    Err(e) => failed.push((name, e)),
                }
            }
        }
        (labeled, failed)
    }
}
