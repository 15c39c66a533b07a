// Wait-Time Estimator

/// Default minutes spent per customer at the service station
pub const DEFAULT_AVERAGE_SERVICE_MINUTES: u32 = 10;

/// Expected wait for the entry at `position`.
///
/// `max(0, position - 1) * average_service_minutes`; the head of the queue waits 0.
pub fn estimate(position: u32, average_service_minutes: u32) -> u32 {
    position
        .saturating_sub(1)
        .saturating_mul(average_service_minutes)
}
