use std::num::NonZeroUsize;

/// `TimeToLive` (ttl) newtype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct TimeToLive(pub u8);

/// `MaxRounds` newtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd)]
pub struct MaxRounds(pub NonZeroUsize);

/// `PayloadSize` newtype, the number of bytes carried by an echo request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd)]
pub struct PayloadSize(pub u16);

/// `ParallelRequests` newtype, the number of concurrent probes per ttl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd)]
pub struct ParallelRequests(pub u8);

/// `RoundId` newtype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd)]
pub struct RoundId(pub usize);
