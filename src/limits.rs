/// Maximum label length, counted in Unicode scalar values after trimming.
pub const MAX_LABEL_CHARS: usize = 120;

/// Maximum `userId` length in bytes after trimming.
pub const MAX_USER_ID_LEN: usize = 256;

/// Maximum `blockId` length in bytes after trimming.
pub const MAX_BLOCK_ID_LEN: usize = 64;

/// Maximum size of one request line on the wire.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Minutes in a day; valid minute offsets are `[0, MINUTES_PER_DAY)`.
pub const MINUTES_PER_DAY: u16 = 24 * 60;
