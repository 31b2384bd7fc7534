//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

// Entity identifiers
pub const FIELD_ELEMENT_ID: &str = "element_id";
pub const FIELD_LOCATION_KEY: &str = "location_key";
pub const FIELD_REACTION: &str = "reaction";

// Propagation
pub const FIELD_BATCH_LEN: &str = "batch_len";
pub const FIELD_PASS: &str = "pass";
pub const FIELD_PRODUCED_LEN: &str = "produced_len";
pub const FIELD_MODE: &str = "mode";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
