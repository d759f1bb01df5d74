/// Max theatres in the catalog.
pub const MAX_THEATRES: usize = 10_000;

/// Max bookings (any status) kept on a single theatre.
pub const MAX_BOOKINGS_PER_THEATRE: usize = 100_000;

/// Max length of a theatre name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of a surgery type label, in bytes.
pub const MAX_LABEL_LEN: usize = 256;

/// Max theatre capacity (people in the room).
pub const MAX_CAPACITY: u32 = 1_000;
