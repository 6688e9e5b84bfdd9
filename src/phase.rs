use kube_runtime::controller::Action;
use std::{fmt, str::FromStr, time::Duration};

/// Lifecycle states of an AlertScale, persisted as `status.scaleStatus.status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalePhase {
    Pending,
    Approvaling,
    Approved,
    Rejected,
    Scaling,
    Scaled,
    Completed,
    Failed,
    Archived,
}

impl ScalePhase {
    pub const ALL: [ScalePhase; 9] = [
        ScalePhase::Pending,
        ScalePhase::Approvaling,
        ScalePhase::Approved,
        ScalePhase::Rejected,
        ScalePhase::Scaling,
        ScalePhase::Scaled,
        ScalePhase::Completed,
        ScalePhase::Failed,
        ScalePhase::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalePhase::Pending => "Pending",
            ScalePhase::Approvaling => "Approvaling",
            ScalePhase::Approved => "Approved",
            ScalePhase::Rejected => "Rejected",
            ScalePhase::Scaling => "Scaling",
            ScalePhase::Scaled => "Scaled",
            ScalePhase::Completed => "Completed",
            ScalePhase::Failed => "Failed",
            ScalePhase::Archived => "Archived",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScalePhase::Failed | ScalePhase::Archived)
    }
}

impl fmt::Display for ScalePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalePhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalePhase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or(())
    }
}

/// When the scheduler should call back for this resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Work continues on the next tick.
    Immediate,
    After(Duration),
    /// Nothing left to do until the object changes.
    Never,
}

impl Requeue {
    /// Requeue at a deadline `remaining` away, or right away if it already passed.
    pub fn at_deadline(remaining: chrono::Duration) -> Requeue {
        match remaining.to_std() {
            Ok(d) if !d.is_zero() => Requeue::After(d),
            _ => Requeue::Immediate,
        }
    }
}

/// Longest delay handed to the scheduler. Its timer wheel rejects delays of
/// a couple of years; a longer wait is simply re-evaluated after this.
pub const MAX_REQUEUE: Duration = Duration::from_secs(24 * 60 * 60);

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Action {
        match requeue {
            Requeue::Immediate => Action::requeue(Duration::ZERO),
            Requeue::After(d) => Action::requeue(d.min(MAX_REQUEUE)),
            Requeue::Never => Action::await_change(),
        }
    }
}
