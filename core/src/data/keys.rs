/// Keys predefined for persistance:
/// Raw, unhashed key of the current authority set
pub const GRANDPA_AUTHORITIES_KEY: &[u8] = b":grandpa_authorities";
/// Storage prefix of the GRANDPA module
pub const GRANDPA_PREFIX: &str = "Grandpa";
pub const CURRENT_SET_ID_ITEM: &str = "CurrentSetId";
pub const STALLED_ITEM: &str = "Stalled";
pub const PENDING_CHANGE_ITEM: &str = "PendingChange";
pub const STATE_ITEM: &str = "State";
pub const NEXT_FORCED_ITEM: &str = "NextForced";
pub const SET_ID_SESSION_ITEM: &str = "SetIdSession";
/// Storage prefix of the block context
pub const SYSTEM_PREFIX: &str = "System";
pub const NUMBER_ITEM: &str = "Number";
pub const EVENTS_ITEM: &str = "Events";
pub const DIGEST_ITEM: &str = "Digest";
/// Storage prefix of the historical session records
pub const HISTORICAL_PREFIX: &str = "Historical";
pub const HISTORICAL_SESSIONS_ITEM: &str = "HistoricalSessions";
pub const HISTORICAL_VALIDATORS_ITEM: &str = "HistoricalValidators";
pub const STORED_RANGE_ITEM: &str = "StoredRange";
/// Storage prefix of the offence reports
pub const OFFENCES_PREFIX: &str = "Offences";
pub const REPORTS_ITEM: &str = "Reports";
