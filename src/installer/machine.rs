//! Two-strategy install state machine.
//!
//! ```text
//! NotStarted -> CheckingExisting -> AlreadyInstalled -> Completed
//!                                 -> PackageManager -> VerifyPackageManager -> Completed
//!                                 -> FallingBack -> DirectDownload -> VerifyDirect -> Completed
//! ```
//!
//! Any failure in the package-manager branch leads to `FallingBack`; any
//! failure in the direct branch, or a fallback with no direct strategy,
//! leads to `Failed`. `Aborted` (cancellation) fails from anywhere.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotStarted,
    CheckingExisting,
    AlreadyInstalled,
    PackageManager,
    VerifyPackageManager,
    FallingBack,
    DirectDownload,
    VerifyDirect,
    Completed,
    Failed,
}

impl InstallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallState::Completed | InstallState::Failed)
    }
}

/// Result of running the work associated with a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Move on; used by states that do no fallible work
    Proceed,
    /// Target command already present
    Present,
    /// Target command absent
    Absent { package_manager: bool },
    Succeeded,
    Failed,
    /// Cancellation; never falls back
    Aborted,
}

/// Next state. `has_direct` says whether the component has a
/// direct-download strategy.
pub fn transition(state: InstallState, outcome: Outcome, has_direct: bool) -> InstallState {
    use InstallState::*;

    if state.is_terminal() {
        return state;
    }
    if outcome == Outcome::Aborted {
        return Failed;
    }

    match (state, outcome) {
        (NotStarted, Outcome::Proceed) => CheckingExisting,

        (CheckingExisting, Outcome::Present) => AlreadyInstalled,
        (CheckingExisting, Outcome::Absent { package_manager: true }) => PackageManager,
        (CheckingExisting, Outcome::Absent { package_manager: false }) => FallingBack,

        (AlreadyInstalled, _) => Completed,

        (PackageManager, Outcome::Succeeded) => VerifyPackageManager,
        (PackageManager, Outcome::Failed) => FallingBack,

        (VerifyPackageManager, Outcome::Succeeded) => Completed,
        (VerifyPackageManager, Outcome::Failed) => FallingBack,

        (FallingBack, _) if has_direct => DirectDownload,
        (FallingBack, _) => Failed,

        (DirectDownload, Outcome::Succeeded) => VerifyDirect,
        (VerifyDirect, Outcome::Succeeded) => Completed,

        _ => Failed,
    }
}
