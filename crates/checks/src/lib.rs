pub mod analysis;
pub mod lifecycle;
pub mod router;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod working_copy;

pub use lifecycle::{CheckRunContext, CheckRunLifecycle, LifecycleSettings, RemediationOutcome};
pub use router::{Route, route};
