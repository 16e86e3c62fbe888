use crate::model::Ms;

pub const MAX_RESOURCES: usize = 100_000;
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 1_000_000;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;

/// Largest quantity a single hold may request.
pub const MAX_HOLD_QUANTITY: u32 = 10_000;

/// How long a hold stays valid without confirmation.
pub const DEFAULT_HOLD_TTL_MS: Ms = 5 * 60_000;

/// How often the bundled sweeper runs. Independent of the hold TTL.
pub const DEFAULT_SWEEP_INTERVAL_MS: Ms = 60_000;

/// WAL appends since the last compaction before the compactor rewrites the log.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;
