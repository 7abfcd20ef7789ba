use ph_db::{VpsStatus, VpsUpdate};
use ph_infra::types::{ContainerState, RuntimeHandle};
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, Result};
use crate::orchestrator::Orchestrator;

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub corrected: usize,
    pub missing: usize,
    pub failed: usize,
}

impl Orchestrator {
    /// Re-derive one record's status from the runtime.
    ///
    /// Returns the new status when it changed. A container missing from the
    /// runtime is reported as `NotFoundInRuntime` and the record is left as is.
    pub async fn reconcile(&self, vps_id: &str) -> Result<Option<VpsStatus>> {
        let _guard = self.locks.lock(vps_id).await;
        let Some(vps) = self.registry.find_by_id(vps_id).await? else {
            return Ok(None);
        };

        let handle = RuntimeHandle(vps.runtime_handle);
        let observed = match self.runtime.inspect(&handle).await {
            Ok(ContainerState::Running) => VpsStatus::Running,
            Ok(ContainerState::Stopped) => VpsStatus::Stopped,
            Err(e) if e.is_not_found() => {
                return Err(LifecycleError::NotFoundInRuntime {
                    vps_id: vps_id.to_string(),
                    handle: handle.0,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if observed == vps.status {
            return Ok(None);
        }

        self.registry
            .update(vps_id, &VpsUpdate::status(observed))
            .await?;
        info!(vps_id, from = %vps.status, to = %observed, "reconciled vps status");
        Ok(Some(observed))
    }

    /// Reconcile every record, one at a time.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for vps in self.registry.list_all().await? {
            report.checked += 1;
            match self.reconcile(&vps.vps_id).await {
                Ok(Some(_)) => report.corrected += 1,
                Ok(None) => {}
                Err(LifecycleError::NotFoundInRuntime { vps_id, handle }) => {
                    report.missing += 1;
                    warn!(vps_id = %vps_id, handle = %handle, "registry references a container the runtime does not have");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(vps_id = %vps.vps_id, error = %e, "reconcile failed");
                }
            }
        }

        debug!(?report, "reconcile pass finished");
        Ok(report)
    }
}
