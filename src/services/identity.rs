//! Random identifiers and display identities.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, seq::IndexedRandom};
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const EVENT_ID_LEN: usize = 9;

const ADJECTIVES: [&str; 10] = [
    "Happy", "Clever", "Brave", "Gentle", "Swift", "Bright", "Calm", "Bold", "Kind", "Wise",
];
const NOUNS: [&str; 10] = [
    "Tiger", "Eagle", "Wolf", "Bear", "Fox", "Lion", "Owl", "Deer", "Hawk", "Panda",
];
const AVATARS: [&str; 10] = ["🐱", "🐶", "🦊", "🐻", "🐼", "🦁", "🐯", "🐸", "🐵", "🦄"];

static PARTICIPANT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Nine random base-36 characters.
pub fn generate_event_id() -> String {
    let mut rng = rand::rng();
    (0..EVENT_ID_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}

/// Six digit PIN, never starting with zero.
pub fn generate_pin() -> String {
    rand::rng().random_range(100_000..=999_999u32).to_string()
}

/// Participant id unique within the process and very likely across devices:
/// wall-clock millis, a process counter and two random words, base-36 and
/// dash separated.
pub fn generate_participant_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    let counter = PARTICIPANT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut rng = rand::rng();
    let (first, second): (u32, u32) = (rng.random(), rng.random());

    format!(
        "{}-{}-{}{}",
        to_base36(millis),
        to_base36(counter),
        to_base36(u64::from(first)),
        to_base36(u64::from(second))
    )
}

/// Display name and avatar for a new participant.
pub fn generate_participant_identity() -> (String, String) {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or(ADJECTIVES[0]);
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or(NOUNS[0]);
    let avatar = AVATARS.choose(&mut rng).copied().unwrap_or(AVATARS[0]);
    (format!("{adjective} {noun}"), avatar.to_owned())
}

/// Opaque device identifier handed to clients without one.
pub fn generate_device_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn event_ids_are_nine_base36_chars() {
        for _ in 0..100 {
            let id = generate_event_id();
            assert_eq!(id.len(), 9);
            assert!(id.bytes().all(|b| BASE36.contains(&b)));
        }
    }

    #[test]
    fn pins_are_six_digits() {
        for _ in 0..500 {
            let pin: u32 = generate_pin().parse().unwrap();
            assert!((100_000..=999_999).contains(&pin));
        }
    }

    #[test]
    fn participant_ids_do_not_repeat() {
        let ids: HashSet<_> = (0..1_000).map(|_| generate_participant_id()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn identities_come_from_fixed_lists() {
        let (name, avatar) = generate_participant_identity();
        let (adjective, noun) = name.split_once(' ').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(NOUNS.contains(&noun));
        assert!(AVATARS.contains(&avatar.as_str()));
    }

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
