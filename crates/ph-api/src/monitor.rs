use std::time::Duration;

use ph_core::Orchestrator;

/// Spawn the background reconciler. An interval of 0 disables it.
pub fn spawn_reconciler(orchestrator: Orchestrator, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("reconciler disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match orchestrator.reconcile_all().await {
                Ok(report) if report.corrected > 0 || report.missing > 0 => {
                    tracing::info!(
                        checked = report.checked,
                        corrected = report.corrected,
                        missing = report.missing,
                        failed = report.failed,
                        "reconcile pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "reconcile pass failed"),
            }
        }
    });
}
