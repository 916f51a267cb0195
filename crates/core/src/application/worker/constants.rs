// Worker constants (No magic values)
use std::time::Duration;

/// Default visibility timeout for leases taken by a Worker (30s)
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// How long one blocking lease waits before the loop re-checks shutdown (1s)
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Sleep duration after a store error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default interval between light_clean sweeps (30s)
pub const DEFAULT_CLEAN_INTERVAL: Duration = Duration::from_secs(30);

/// Scale requests an AutoScaler holds down-scaling against (8 ticks)
pub const DEFAULT_SLOWDOWN_WINDOW: usize = 8;

/// Fast workers above this count are requested as spot workers instead
pub const DEFAULT_MAX_FAST: i32 = 96;
