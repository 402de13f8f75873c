use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use studymate_core::keyed_lock::KeyedLock;
use studymate_core::retry::{RetryPolicy, retry};

use crate::domain::projection::{
    DrainReport, EntityKind, KindReport, MirrorWrite, ReconcileReport, SyncOp, SyncOutcome,
};
use crate::domain::repository::{MirrorStore, ProjectionSource, Projector, SyncOutbox};
use crate::error::StudyMateError;

/// Outbox rows are abandoned to reconciliation after this many failed drains.
pub const MAX_OUTBOX_ATTEMPTS: i32 = 10;

/// Backoff between outbox drain attempts: 30s doubling, capped at one hour.
pub const OUTBOX_BACKOFF: RetryPolicy = RetryPolicy {
    max_attempts: MAX_OUTBOX_ATTEMPTS as u32,
    base_delay: Duration::from_secs(30),
    max_delay: Duration::from_secs(3600),
};

/// How a projection treats a mirror copy whose version is higher than the record's.
#[derive(Debug, Clone, Copy)]
enum MirrorWriteMode {
    /// Live change: the newer copy is kept.
    Guarded,
    /// Replay of the current record: the entity store wins.
    Authoritative,
}

/// Keeps the mirror store consistent with entity store writes.
///
/// Projections of one entity are serialized and always read the current authoritative
/// state, so a late projection can only ever write the newest version.
pub struct SyncCoordinator<S: ProjectionSource, M: MirrorStore, O: SyncOutbox> {
    pub source: S,
    pub mirror: M,
    pub outbox: O,
    pub retry: RetryPolicy,
    locks: KeyedLock<(EntityKind, Uuid)>,
}

impl<S: ProjectionSource, M: MirrorStore, O: SyncOutbox> SyncCoordinator<S, M, O> {
    pub fn new(source: S, mirror: M, outbox: O, retry: RetryPolicy) -> Self {
        Self {
            source,
            mirror,
            outbox,
            retry,
            locks: KeyedLock::new(),
        }
    }

    /// Project one entity change. Failures are logged, queued in the outbox and reported
    /// as `Degraded`; they never propagate to the caller.
    pub async fn project(&self, kind: EntityKind, id: Uuid, op: SyncOp) -> SyncOutcome {
        self.project_with(kind, id, op, MirrorWriteMode::Guarded).await
    }

    /// Like `project` with `Upsert`, but the current record replaces the mirror copy even
    /// when the copy claims a newer version.
    pub async fn converge(&self, kind: EntityKind, id: Uuid) -> SyncOutcome {
        self.project_with(kind, id, SyncOp::Upsert, MirrorWriteMode::Authoritative)
            .await
    }

    async fn project_with(
        &self,
        kind: EntityKind,
        id: Uuid,
        op: SyncOp,
        mode: MirrorWriteMode,
    ) -> SyncOutcome {
        let _guard = self.locks.lock((kind, id)).await;
        match self.apply(kind, id, op, mode).await {
            Ok(outcome) => {
                debug!(kind = %kind, entity_id = %id, op = %op, ?outcome, "projected");
                outcome
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(kind = %kind, entity_id = %id, op = %op, error = %reason, "sync degraded");
                if let Err(oe) = self.outbox.enqueue(kind, id, op, &reason).await {
                    error!(kind = %kind, entity_id = %id, error = %oe, "failed to enqueue sync retry");
                }
                SyncOutcome::Degraded { reason }
            }
        }
    }

    /// Caller must hold the entity's lock.
    async fn apply(
        &self,
        kind: EntityKind,
        id: Uuid,
        op: SyncOp,
        mode: MirrorWriteMode,
    ) -> anyhow::Result<SyncOutcome> {
        let doc = match op {
            SyncOp::Upsert => self.source.load(kind, id).await?,
            SyncOp::Delete => None,
        };
        let mirror = &self.mirror;
        match doc {
            Some(doc) => {
                let write = retry(&self.retry, "mirror upsert", || mirror.upsert(&doc)).await?;
                match (write, mode) {
                    (MirrorWrite::Written, _) => Ok(SyncOutcome::Applied),
                    (MirrorWrite::Stale, MirrorWriteMode::Guarded) => Ok(SyncOutcome::Skipped),
                    (MirrorWrite::Stale, MirrorWriteMode::Authoritative) => {
                        retry(&self.retry, "mirror replace", || mirror.replace(&doc)).await?;
                        warn!(
                            kind = %kind,
                            entity_id = %id,
                            version = doc.version,
                            "mirror copy was ahead of its record; replaced"
                        );
                        Ok(SyncOutcome::Corrected)
                    }
                }
            }
            // Upsert of a record that no longer exists removes its copy.
            None => {
                retry(&self.retry, "mirror remove", || mirror.remove(kind, id)).await?;
                Ok(SyncOutcome::Applied)
            }
        }
    }

    /// Replay every authoritative record into the mirror and drop mirror documents whose
    /// record is gone. Copies that claim a newer version than their record are replaced.
    /// Idempotent; safe to run alongside live traffic.
    ///
    /// Entity store failures abort the sweep. A mirror that cannot be listed yields
    /// `SyncDegraded` after the upsert pass has run.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, StudyMateError> {
        let users = self.reconcile_kind(EntityKind::User).await?;
        let materials = self.reconcile_kind(EntityKind::Material).await?;
        let report = ReconcileReport { users, materials };
        info!(?report, "reconciliation finished");
        Ok(report)
    }

    async fn reconcile_kind(&self, kind: EntityKind) -> Result<KindReport, StudyMateError> {
        let mut report = KindReport::default();

        let ids = self.source.ids(kind).await?;
        let live: HashSet<Uuid> = ids.iter().copied().collect();
        for id in ids {
            match self.converge(kind, id).await {
                SyncOutcome::Applied | SyncOutcome::Skipped => report.projected += 1,
                SyncOutcome::Corrected => report.corrected += 1,
                SyncOutcome::Degraded { .. } => report.failed += 1,
            }
        }

        let mirror = &self.mirror;
        let mirrored = retry(&self.retry, "mirror list", || mirror.source_ids(kind))
            .await
            .map_err(|e| StudyMateError::SyncDegraded(e.into()))?;
        for id in mirrored.into_iter().filter(|id| !live.contains(id)) {
            // Re-reads the entity store, so a record created since the listing is kept.
            match self.converge(kind, id).await {
                SyncOutcome::Applied | SyncOutcome::Skipped => report.removed += 1,
                SyncOutcome::Corrected => report.corrected += 1,
                SyncOutcome::Degraded { .. } => report.failed += 1,
            }
        }
        Ok(report)
    }

    /// Apply up to `limit` due outbox rows.
    ///
    /// Each row replays the entity's current state rather than the recorded op, so a
    /// retried delete cannot remove a record that exists again and vice versa.
    pub async fn drain_outbox(&self, limit: u64) -> Result<DrainReport, StudyMateError> {
        let mut report = DrainReport::default();
        for entry in self.outbox.due(Utc::now(), limit).await? {
            // Held until the row is settled so a concurrent re-enqueue is not lost.
            let _guard = self.locks.lock((entry.kind, entry.entity_id)).await;
            match self
                .apply(
                    entry.kind,
                    entry.entity_id,
                    SyncOp::Upsert,
                    MirrorWriteMode::Authoritative,
                )
                .await
            {
                Ok(_) => {
                    self.outbox.complete(entry.id).await?;
                    report.applied += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    let reason = format!("{e:#}");
                    let next = (attempts < MAX_OUTBOX_ATTEMPTS).then(|| {
                        let delay = OUTBOX_BACKOFF.delay_after(attempts as u32);
                        Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::hours(1))
                    });
                    self.outbox
                        .reschedule(entry.id, attempts, &reason, next)
                        .await?;
                    if next.is_some() {
                        report.rescheduled += 1;
                    } else {
                        warn!(
                            kind = %entry.kind,
                            entity_id = %entry.entity_id,
                            attempts,
                            error = %reason,
                            "sync retry abandoned; left for reconciliation"
                        );
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(report)
    }
}

impl<S: ProjectionSource, M: MirrorStore, O: SyncOutbox> Projector for SyncCoordinator<S, M, O> {
    async fn project(&self, kind: EntityKind, id: Uuid, op: SyncOp) -> SyncOutcome {
        SyncCoordinator::project(self, kind, id, op).await
    }
}
