/// The maximum time-to-live value allowed.
///
/// The IP `ttl` is an u8 (0..255) but since a `ttl` of zero isn't useful we only allow 254 distinct
/// hops (1..255).
pub const MAX_TTL: u8 = 254;

/// The maximum echo payload size allowed.
///
/// Replies are read into a fixed buffer of this size, so a larger echoed payload would be truncated.
pub const MAX_PAYLOAD_SIZE: u16 = 512;

/// The maximum number of concurrent probes per ttl.
pub const MAX_PARALLEL_REQUESTS: u8 = 32;
