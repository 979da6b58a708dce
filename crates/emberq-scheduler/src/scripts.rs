//! Server-side transactional operations over the store.
//!
//! Each script executes as a single indivisible unit, which is what gives the
//! scheduler its atomicity contract: the schedule advance and the instance
//! enqueue either both happen or neither does. Scripts are loaded once per
//! scheduler and invoked by SHA thereafter.

use redis::Script;

const ADD_JOB_SCHEDULER: &str = include_str!("lua/add_job_scheduler.lua");
const UPDATE_SCHEDULER_NEXT: &str = include_str!("lua/update_scheduler_next.lua");
const GET_JOB_SCHEDULER: &str = include_str!("lua/get_job_scheduler.lua");
const REMOVE_JOB_SCHEDULER: &str = include_str!("lua/remove_job_scheduler.lua");

pub(crate) struct SchedulerScripts {
    pub add: Script,
    pub update_next: Script,
    pub get: Script,
    pub remove: Script,
}

impl SchedulerScripts {
    pub fn new() -> Self {
        Self {
            add: Script::new(ADD_JOB_SCHEDULER),
            update_next: Script::new(UPDATE_SCHEDULER_NEXT),
            get: Script::new(GET_JOB_SCHEDULER),
            remove: Script::new(REMOVE_JOB_SCHEDULER),
        }
    }
}
