//! Human-readable id allocation and ordering
//!
//! Format: `{TYPE_UPPER}_{AAA}{000}`
//! - TYPE: uppercase entity name
//! - AAA: base-26 letters A-Z, advancing when the numeric suffix wraps
//! - 000-999: numeric suffix
//!
//! HRIDs are allocated per `(user_id, type)`. The allocator keeps its
//! counters and the `hrid <-> id` maps in memory; persistence rides on the
//! graph node properties, so a restarted process re-seeds a counter by
//! observing the ids already stored for that `(user, type)` pair.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::{MnemonError, Result};

static HRID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<type>[A-Z0-9_]+?)_(?P<alpha>[A-Z]{3})(?P<num>\d{3})$").unwrap());

const ALPHA_SPACE: u64 = 26 * 26 * 26;

/// Parse an HRID into `(type, alpha, num)`. Case-insensitive input.
pub fn parse_hrid(hrid: &str) -> Result<(String, String, u32)> {
    let normalized = hrid.trim().to_uppercase();
    let caps = HRID_RE
        .captures(&normalized)
        .ok_or_else(|| MnemonError::InvalidInput(format!("Invalid HRID format: {hrid}")))?;
    Ok((
        caps["type"].to_string(),
        caps["alpha"].to_string(),
        caps["num"].parse().expect("regex guarantees three digits"),
    ))
}

/// Entity type encoded in an HRID prefix, lowercased
pub fn hrid_type(hrid: &str) -> Result<String> {
    parse_hrid(hrid).map(|(memory_type, _, _)| memory_type.to_lowercase())
}

fn alpha_to_idx(alpha: &str) -> u64 {
    alpha
        .bytes()
        .fold(0u64, |idx, c| idx * 26 + u64::from(c - b'A'))
}

fn idx_to_alpha(mut idx: u64) -> String {
    let mut chars = [0u8; 3];
    for slot in chars.iter_mut().rev() {
        *slot = b'A' + (idx % 26) as u8;
        idx /= 26;
    }
    String::from_utf8_lossy(&chars).into_owned()
}

/// Deterministic numeric key for a type name: first 8 chars in base-37
/// (A-Z = 1..26, 0-9 = 27..36, others 0).
fn type_key(memory_type: &str) -> u64 {
    memory_type
        .to_uppercase()
        .bytes()
        .take(8)
        .fold(0u64, |key, c| {
            let v = match c {
                b'A'..=b'Z' => 1 + u64::from(c - b'A'),
                b'0'..=b'9' => 27 + u64::from(c - b'0'),
                _ => 0,
            };
            key * 37 + v
        })
}

/// Collapse an HRID into one integer for stable cross-type ordering.
/// The type key occupies the high bits; `alpha * 1000 + num` needs 25 bits.
pub fn hrid_to_index(hrid: &str) -> Result<u64> {
    let (memory_type, alpha, num) = parse_hrid(hrid)?;
    let intra = alpha_to_idx(&alpha) * 1000 + u64::from(num);
    Ok((type_key(&memory_type) << 25) | intra)
}

#[derive(Debug, Default)]
struct UserSpace {
    /// (alpha_idx, num) of the last emitted HRID per type
    counters: HashMap<String, (u64, u32)>,
    hrid_to_id: HashMap<String, String>,
    id_to_hrid: HashMap<String, String>,
    /// Types whose counters were seeded from persisted state
    seeded: HashMap<String, bool>,
}

/// Per-user HRID allocator with bidirectional `hrid <-> id` maps
#[derive(Debug, Default)]
pub struct HridAllocator {
    spaces: Mutex<HashMap<String, UserSpace>>,
}

impl HridAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `next` for this `(user, type)` still needs a bootstrap scan
    pub fn needs_bootstrap(&self, user_id: &str, memory_type: &str) -> bool {
        let spaces = self.spaces.lock();
        let key = memory_type.to_lowercase();
        !spaces
            .get(user_id)
            .map(|space| space.seeded.get(&key).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    /// Seed counters and maps from persisted `(hrid, id)` pairs for one
    /// `(user, type)`. Runs inside the allocation critical section.
    pub fn bootstrap<I>(&self, user_id: &str, memory_type: &str, existing: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut spaces = self.spaces.lock();
        let space = spaces.entry(user_id.to_string()).or_default();
        let type_upper = memory_type.to_uppercase();
        let type_key = memory_type.to_lowercase();

        for (hrid, id) in existing {
            let Ok((hrid_type, alpha, num)) = parse_hrid(&hrid) else {
                continue;
            };
            if hrid_type != type_upper {
                continue;
            }
            let candidate = (alpha_to_idx(&alpha), num);
            let counter = space.counters.entry(type_key.clone()).or_insert(candidate);
            if candidate > *counter {
                *counter = candidate;
            }
            space.hrid_to_id.insert(hrid.clone(), id.clone());
            space.id_to_hrid.insert(id, hrid);
        }
        space.seeded.insert(type_key, true);
    }

    /// Emit the next HRID for `(user, type)` and bind it to `id`
    pub fn next(&self, memory_type: &str, user_id: &str, id: &str) -> Result<String> {
        let mut spaces = self.spaces.lock();
        let space = spaces.entry(user_id.to_string()).or_default();
        let type_key = memory_type.to_lowercase();
        let type_upper = memory_type.to_uppercase();

        let next = match space.counters.get(&type_key) {
            None => (0, 0),
            Some(&(alpha_idx, num)) if num < 999 => (alpha_idx, num + 1),
            Some(&(alpha_idx, _)) => {
                if alpha_idx + 1 >= ALPHA_SPACE {
                    return Err(MnemonError::ResourceExhausted {
                        user_id: user_id.to_string(),
                        memory_type: type_key,
                    });
                }
                (alpha_idx + 1, 0)
            }
        };
        space.counters.insert(type_key.clone(), next);
        space.seeded.insert(type_key, true);

        let hrid = format!("{}_{}{:03}", type_upper, idx_to_alpha(next.0), next.1);
        space.hrid_to_id.insert(hrid.clone(), id.to_string());
        space.id_to_hrid.insert(id.to_string(), hrid.clone());
        Ok(hrid)
    }

    /// Bind an existing HRID to an internal id (restore path)
    pub fn assign(&self, hrid: &str, id: &str, user_id: &str) -> Result<()> {
        let (_, alpha, num) = parse_hrid(hrid)?;
        let normalized = hrid.trim().to_uppercase();
        let mut spaces = self.spaces.lock();
        let space = spaces.entry(user_id.to_string()).or_default();
        let type_key = hrid_type(&normalized)?;
        let candidate = (alpha_to_idx(&alpha), num);
        let counter = space.counters.entry(type_key).or_insert(candidate);
        if candidate > *counter {
            *counter = candidate;
        }
        space.hrid_to_id.insert(normalized.clone(), id.to_string());
        space.id_to_hrid.insert(id.to_string(), normalized);
        Ok(())
    }

    /// Resolve an HRID to its internal id within the user scope
    pub fn resolve(&self, hrid: &str, user_id: &str) -> Option<String> {
        let normalized = hrid.trim().to_uppercase();
        let spaces = self.spaces.lock();
        spaces
            .get(user_id)
            .and_then(|space| space.hrid_to_id.get(&normalized))
            .cloned()
    }

    /// Inverse lookup: internal id to HRID
    pub fn hrid_of(&self, id: &str, user_id: &str) -> Option<String> {
        let spaces = self.spaces.lock();
        spaces
            .get(user_id)
            .and_then(|space| space.id_to_hrid.get(id))
            .cloned()
    }

    /// Drop the mapping for a deleted memory. Idempotent.
    pub fn forget(&self, hrid: &str, user_id: &str) {
        let normalized = hrid.trim().to_uppercase();
        let mut spaces = self.spaces.lock();
        if let Some(space) = spaces.get_mut(user_id) {
            if let Some(id) = space.hrid_to_id.remove(&normalized) {
                space.id_to_hrid.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let (memory_type, alpha, num) = parse_hrid("TASK_AAB007").unwrap();
        assert_eq!(memory_type, "TASK");
        assert_eq!(alpha, "AAB");
        assert_eq!(num, 7);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_hrid("TASK-AAA001").is_err());
        assert!(parse_hrid("TASK_AA001").is_err());
        assert!(parse_hrid("task").is_err());
    }

    #[test]
    fn test_sequence_and_wrap() {
        let allocator = HridAllocator::new();
        assert_eq!(allocator.next("task", "u1", "id0").unwrap(), "TASK_AAA000");
        assert_eq!(allocator.next("task", "u1", "id1").unwrap(), "TASK_AAA001");

        // Push the counter to the wrap boundary
        allocator.assign("TASK_AAA999", "id-last", "u1").unwrap();
        assert_eq!(allocator.next("task", "u1", "id2").unwrap(), "TASK_AAB000");
    }

    #[test]
    fn test_per_user_isolation() {
        let allocator = HridAllocator::new();
        assert_eq!(allocator.next("note", "u1", "a").unwrap(), "NOTE_AAA000");
        assert_eq!(allocator.next("note", "u2", "b").unwrap(), "NOTE_AAA000");
    }

    #[test]
    fn test_resolve_and_forget() {
        let allocator = HridAllocator::new();
        let hrid = allocator.next("note", "u1", "some-id").unwrap();
        assert_eq!(allocator.resolve(&hrid, "u1").unwrap(), "some-id");
        assert_eq!(allocator.hrid_of("some-id", "u1").unwrap(), hrid);
        assert!(allocator.resolve(&hrid, "u2").is_none());

        allocator.forget(&hrid, "u1");
        assert!(allocator.resolve(&hrid, "u1").is_none());
        // Forgetting again is a no-op
        allocator.forget(&hrid, "u1");
    }

    #[test]
    fn test_bootstrap_resumes_counter() {
        let allocator = HridAllocator::new();
        allocator.bootstrap(
            "u1",
            "task",
            vec![
                ("TASK_AAA004".to_string(), "w".to_string()),
                ("TASK_AAA009".to_string(), "x".to_string()),
                ("TASK_AAA002".to_string(), "y".to_string()),
            ],
        );
        assert!(!allocator.needs_bootstrap("u1", "task"));
        assert_eq!(allocator.next("task", "u1", "z").unwrap(), "TASK_AAA010");
        assert_eq!(allocator.resolve("TASK_AAA004", "u1").unwrap(), "w");
    }

    #[test]
    fn test_exhaustion() {
        let allocator = HridAllocator::new();
        allocator.assign("TASK_ZZZ999", "last", "u1").unwrap();
        let err = allocator.next("task", "u1", "overflow").unwrap_err();
        assert_eq!(err.kind(), "resource_exhausted");
    }

    #[test]
    fn test_index_orders_within_type() {
        let a = hrid_to_index("TASK_AAA000").unwrap();
        let b = hrid_to_index("TASK_AAA001").unwrap();
        let c = hrid_to_index("TASK_AAB000").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_index_separates_types() {
        let note = hrid_to_index("NOTE_ZZZ999").unwrap();
        let task = hrid_to_index("TASK_AAA000").unwrap();
        // Different type keys dominate the intra-type counter
        assert_ne!(note >> 25, task >> 25);
    }
}
