// Coordinator and background task defaults (no magic values)
use std::time::Duration;

/// Max wait for a business's exclusive section (5s)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Max duration of one store round trip inside the exclusive section (5s)
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often idle businesses are evicted from memory (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
