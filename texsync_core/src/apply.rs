//! Change detection and application of snapshots to a render resource.
//!
//! Authority and follower both go through `StateApplier`, so "apply state to
//! the renderable" has exactly one code path regardless of role.

use crate::render::RenderTarget;
use crate::state::SharedState;
use tracing::{debug, warn};

/// Result of offering a snapshot to the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The payload was uploaded and the version recorded
    Applied,
    
    /// Same version as the last applied snapshot; nothing done
    Unchanged,
    
    /// Payload dimensions differ from the render target; nothing written
    Rejected,
}

/// Tracks the last applied version and uploads only on change.
#[derive(Debug, Clone, Default)]
pub struct StateApplier {
    /// `None` until the first snapshot is applied, so any first version
    /// (including 0) is accepted.
    last_applied: Option<u64>,
    
    applied: u64,
    rejected: u64,
}

impl StateApplier {
    /// Creates an applier that has applied nothing yet.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Version of the last applied snapshot.
    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }
    
    /// Number of successful applications.
    pub fn applied_count(&self) -> u64 {
        self.applied
    }
    
    /// Number of snapshots refused for a dimension mismatch.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
    
    /// Uploads `snapshot.payload` into `target` if its version is new.
    ///
    /// "New" means different from the last applied version, not greater:
    /// a reset on the authority legitimately restarts versions at 0.
    pub fn apply<T: RenderTarget + ?Sized>(
        &mut self,
        snapshot: &SharedState,
        target: &mut T,
    ) -> ApplyOutcome {
        if self.last_applied == Some(snapshot.version) {
            return ApplyOutcome::Unchanged;
        }
        
        let incoming = snapshot.payload.dimensions();
        if incoming != target.dimensions() {
            self.rejected += 1;
            warn!(
                version = snapshot.version,
                incoming = %incoming,
                target = %target.dimensions(),
                "rejecting snapshot with mismatched dimensions"
            );
            return ApplyOutcome::Rejected;
        }
        
        target.upload(&snapshot.payload);
        self.last_applied = Some(snapshot.version);
        self.applied += 1;
        
        debug!(
            version = snapshot.version,
            time = snapshot.time,
            angle = snapshot.angle,
            "updated texture"
        );
        ApplyOutcome::Applied
    }
}
