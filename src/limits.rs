// Hard caps enforced at the mutation and query boundaries.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CODE_LEN: usize = 64;

pub const MAX_TEACHERS: usize = 10_000;
pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS: usize = 1_000_000;
pub const MAX_RECORDS: usize = 1_000_000;

/// Longest allowed booking date range (about ten years).
pub const MAX_SLOT_SPAN_DAYS: i64 = 3_660;

/// Largest teacher plus room pool a single availability call may resolve.
pub const MAX_POOL_SIZE: usize = MAX_TEACHERS + MAX_ROOMS;
