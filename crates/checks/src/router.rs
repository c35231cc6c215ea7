/// Lifecycle handler selected for an event.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Route {
    CreateCheckRun,
    InitiateCheckRun,
    TakeRequestedAction,
}

/// Dispatch table keyed by event type and action.
///
/// `None` means the event is acknowledged without further work.
pub fn route(event_type: &str, action: Option<&str>) -> Option<Route> {
    match (event_type, action?) {
        ("check_suite", "requested" | "rerequested") => Some(Route::CreateCheckRun),
        ("check_run", "created") => Some(Route::InitiateCheckRun),
        ("check_run", "rerequested") => Some(Route::CreateCheckRun),
        ("check_run", "requested_action") => Some(Route::TakeRequestedAction),
        _ => None,
    }
}
