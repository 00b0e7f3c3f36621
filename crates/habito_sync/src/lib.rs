use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use habito_domain::cache::CacheStore;
use habito_domain::service::Snapshot;
use habito_domain::{HabitService, HabitServiceBuilder};

pub mod backend;

pub use backend::MemoryBackend;

/// Immutable description of one persistence source the client mirrors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRoot {
    pub id: String,
    pub backend: StorageBackend,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Rest(RestBinding),
}

/// Endpoint and credential for the hosted habit API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestBinding {
    pub base_url: String,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Default)]
pub struct HabitSyncService {
    roots: Vec<SyncRoot>,
    pending_jobs: VecDeque<SyncJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncJob {
    pub root_id: String,
    pub job_kind: SyncJobKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncJobKind {
    InitialLoad,
    RemoteRefresh,
    ConflictResolution,
}

impl HabitSyncService {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self))]
    pub fn register_root(&mut self, root: SyncRoot) -> Result<()> {
        if self.roots.iter().any(|existing| existing.id == root.id) {
            return Ok(());
        }
        if let StorageBackend::Rest(binding) = &root.backend {
            anyhow::ensure!(
                !binding.base_url.trim().is_empty(),
                "sync root `{}` has an empty endpoint",
                root.id
            );
        }
        self.pending_jobs.push_back(SyncJob {
            root_id: root.id.clone(),
            job_kind: SyncJobKind::InitialLoad,
        });
        self.roots.push(root);
        Ok(())
    }

    pub fn list_roots(&self) -> &[SyncRoot] {
        &self.roots
    }

    pub fn dequeue_job(&mut self) -> Option<SyncJob> {
        self.pending_jobs.pop_front()
    }

    pub fn schedule_refresh(&mut self, root_id: &str) {
        self.pending_jobs.push_back(SyncJob {
            root_id: root_id.to_string(),
            job_kind: SyncJobKind::RemoteRefresh,
        });
    }

    pub fn perform_job(
        &mut self,
        job: SyncJob,
        make_service: impl FnOnce(&SyncRoot) -> Result<HabitService>,
    ) -> Result<SyncReport> {
        let root = self
            .roots
            .iter()
            .find(|candidate| candidate.id == job.root_id)
            .with_context(|| format!("unknown sync root `{}`", job.root_id))?;

        let service = make_service(root)?;
        match job.job_kind {
            SyncJobKind::InitialLoad | SyncJobKind::RemoteRefresh => {
                let snapshot = service.refresh_all();
                Ok(SyncReport::refreshed(root.id.clone()).with_snapshot(snapshot))
            }
            SyncJobKind::ConflictResolution => Ok(SyncReport::noop(root.id.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub root_id: String,
    pub snapshot: Option<Snapshot>,
}

impl SyncReport {
    pub fn refreshed(root_id: String) -> Self {
        Self {
            root_id,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn noop(root_id: String) -> Self {
        Self {
            root_id,
            snapshot: None,
        }
    }
}

/// Builds the snapshot service for a root. The REST transport lives in the
/// host application; roots bound to it come up cache-only here.
pub fn build_habit_service(root: &SyncRoot, cache_dir: Option<&Path>) -> Result<HabitService> {
    let mut builder = HabitServiceBuilder::new();
    match &root.backend {
        StorageBackend::Memory => {
            builder = builder.with_backend(Box::new(MemoryBackend::new()));
        }
        StorageBackend::Rest(binding) => {
            tracing::debug!(endpoint = %binding.base_url, "REST transport is provided by the host");
        }
    }
    if let Some(dir) = cache_dir {
        builder = builder.with_cache(CacheStore::open(dir.join(format!("{}.json", root.id))));
    }
    Ok(builder.build())
}
