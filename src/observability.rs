use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::command::{CallbackAction, TextCommand};
use crate::transport::UpdateKind;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: inbound updates handled. Labels: command, status.
pub const UPDATES_TOTAL: &str = "lunchbox_updates_total";

/// Histogram: time spent inside one queued update, in seconds. Labels: command.
pub const UPDATE_DURATION_SECONDS: &str = "lunchbox_update_duration_seconds";

/// Counter: reservation mutations. Labels: kind, outcome.
pub const MUTATIONS_TOTAL: &str = "lunchbox_mutations_total";

/// Counter: days skipped by bulk selection because they were past cutoff.
pub const BULK_SKIPPED_TOTAL: &str = "lunchbox_bulk_skipped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: seconds a unit of work waited for its identity's slot.
pub const QUEUE_WAIT_SECONDS: &str = "lunchbox_queue_wait_seconds";

/// Gauge: identities with a queue gate.
pub const QUEUE_IDENTITIES: &str = "lunchbox_queue_identities";

/// Gauge: session entries held, stale ones included.
pub const SESSION_ENTRIES: &str = "lunchbox_session_entries";

/// Counter: session entries evicted by the sweeper.
pub const SESSION_EVICTED_TOTAL: &str = "lunchbox_session_evicted_total";

/// Gauge: active gateway connections.
pub const CONNECTIONS_ACTIVE: &str = "lunchbox_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "lunchbox_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "lunchbox_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lunchbox_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lunchbox_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an update, for metrics.
pub fn command_label(kind: &UpdateKind) -> &'static str {
    match kind {
        UpdateKind::Message { text, .. } => match TextCommand::parse(text) {
            Some(TextCommand::Start) => "start",
            Some(TextCommand::Help) => "help",
            Some(TextCommand::Select) => "select",
            Some(TextCommand::Setting) => "setting",
            Some(TextCommand::SetList) => "set_list",
            Some(TextCommand::GetCounts) => "get_counts",
            Some(TextCommand::GetReserves) => "get_reserves",
            None => "text",
        },
        UpdateKind::Callback { data, .. } => match CallbackAction::parse(data) {
            Ok(CallbackAction::Bulk(_)) => "bulk",
            Ok(CallbackAction::Toggle { .. }) => "toggle",
            Ok(CallbackAction::Standing(_)) => "standing",
            Ok(CallbackAction::EditMenu { .. }) => "edit_menu",
            Ok(CallbackAction::DayLabel(_) | CallbackAction::Noop) => "noop",
            Err(_) => "malformed",
        },
    }
}
