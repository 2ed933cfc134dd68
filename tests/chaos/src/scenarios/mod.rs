//! Chaos test scenarios for faultline.
//!
//! Organized by the component under stress:
//!
//! - `breaker` - Circuit breaker trips, rejects and recovers
//! - `pool` - Bounded pool queues, times out and hands off FIFO
//! - `backoff` - Retry delays grow and ride out transient outages
//! - `engine` - Scheduler activation, expiry, cooldown and cleanup guarantees
//! - `faults` - Each fault injector applied and undone
//! - `end_to_end` - Full runs assembled from run files
//!
//! | Module | Clock | Requirements |
//! |--------|-------|--------------|
//! | breaker | paused | none |
//! | pool | paused | none |
//! | backoff | paused | none |
//! | engine | paused | none |
//! | faults | paused / real | CPU and memory injectors run real threads and allocations |
//! | end_to_end | paused | none |

pub mod backoff;
pub mod breaker;
pub mod end_to_end;
pub mod pool;
