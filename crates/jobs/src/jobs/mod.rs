mod initiate_check_run;
mod requested_action;

pub use initiate_check_run::{InitiateCheckRunJob, process_initiate_check_run_job};
pub use requested_action::{RequestedActionJob, process_requested_action_job};
