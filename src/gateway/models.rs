//! Model fallback policy — a static priority table and the pure function
//! that turns a preferred starting model into an ordered candidate chain.

/// Candidate models in fallback priority order, highest capability first.
pub const MODEL_PRIORITY: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
];

/// Default starting model when the user has not picked one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Ordered candidate chain starting at `preferred`.
///
/// Locates `preferred` in the priority table and returns the suffix from
/// that position to the end. An unrecognized name yields the full table —
/// a stale settings value must not leave the user with no candidates.
/// Pure and deterministic; no I/O.
pub fn chain_from(preferred: &str) -> Vec<String> {
    let start = MODEL_PRIORITY
        .iter()
        .position(|m| *m == preferred)
        .unwrap_or(0);
    MODEL_PRIORITY[start..]
        .iter()
        .map(|m| m.to_string())
        .collect()
}
