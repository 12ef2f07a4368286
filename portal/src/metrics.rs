//! Portal metric descriptions.
//!
//! Counters are recorded where the work happens; this module only gives them
//! help text for the Prometheus exporter.

use ::metrics::describe_counter;

/// Describe every portal counter.
///
/// Call once after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        "portal.lifecycle.transitions",
        "Lifecycle commands, labelled by action and outcome (committed, conflict, capacity_exceeded, refused, failed)"
    );
    describe_counter!(
        "portal.notifications.failed",
        "Status notifications that could not be delivered"
    );
    describe_counter!(
        "portal.archive.swept",
        "Records archived by the background sweep, labelled by kind"
    );
    describe_counter!("portal.qr.issued", "Pickup tokens issued");
    describe_counter!(
        "portal.qr.verifications",
        "Pickup token verifications, labelled by outcome (verified, offline or an error code)"
    );
}
