//! HTTP request handlers.

mod health;
mod task_hosts;

pub use health::{health_check, metrics_handler};
pub use task_hosts::{
    create_task_host, get_task_host, host_counts, list_host_status, list_task_hosts,
    list_waiting_hosts, mark_done, run_task_hosts, update_output, upsert_task_hosts,
};
