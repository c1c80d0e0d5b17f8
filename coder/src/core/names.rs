//! Human-friendly request identifiers (`adjective_surname_suffix`).

use rand::seq::SliceRandom;
use rand::{Rng, distributions::Alphanumeric};

const SUFFIX_LEN: usize = 6;

const ADJECTIVES: &[&str] = &[
    "admiring", "bold", "brave", "busy", "calm", "clever", "crisp", "eager", "elegant", "focused",
    "gentle", "happy", "keen", "kind", "lucid", "modest", "nimble", "patient", "quiet", "quirky",
    "serene", "sharp", "steady", "sweet", "tender", "upbeat", "vibrant", "wise", "witty", "zealous",
];

const SURNAMES: &[&str] = &[
    "babbage", "backus", "bartik", "dijkstra", "engelbart", "hamilton", "hoare", "hopper",
    "kernighan", "knuth", "lamport", "liskov", "lovelace", "mccarthy", "minsky", "naur", "pike",
    "ritchie", "shannon", "sutherland", "thompson", "torvalds", "turing", "wirth", "wozniak",
];

/// Generate an id such as `brave_hopper_k3x9qa`.
///
/// The name part is for people reading the audit log; the lowercase
/// alphanumeric suffix keeps ids from colliding.
pub fn request_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("eager");
    let surname = SURNAMES.choose(rng).copied().unwrap_or("hopper");
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(SUFFIX_LEN)
        .collect::<String>()
        .to_lowercase();
    format!("{adjective}_{surname}_{suffix}")
}
