/// Expected seconds between blocks (60 minutes).
pub const TARGET_BLOCK_TIME: u64 = 3600;

/// Number of trailing blocks averaged when retargeting difficulty.
pub const DIFFICULTY_WINDOW: u64 = 24;

/// How far ahead of local wall-clock a block timestamp may be.
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 3600;
