/// Progress update interval (tick every N lines)
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// Rows per multi-row INSERT statement.
///
/// PostgreSQL caps a statement at 65535 bind parameters; the widest relation
/// (review, 6 bound columns) stays well below that at this size.
pub const INSERT_CHUNK_ROWS: usize = 5_000;

/// Smallest pool a load accepts. After the product barrier three branches each
/// hold a connection for their whole transaction; with fewer connections a
/// waiting branch hits the acquire timeout and its collection fails.
pub const MIN_LOAD_CONNECTIONS: u32 = 3;

/// Pool size for the load
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

const _: () = assert!(DEFAULT_MAX_CONNECTIONS >= MIN_LOAD_CONNECTIONS);

/// Seconds to wait for a pooled connection before giving up. Only reached when
/// the pool is smaller than [`MIN_LOAD_CONNECTIONS`].
pub const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Buffer size for CSV writers
pub const CSV_BUFFER_SIZE: usize = 128 * 1024;

/// Buffer size for reading the dump
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Key of the attribute carrying the product identifier
pub const IDENTIFIER_KEY: &str = "asin";

