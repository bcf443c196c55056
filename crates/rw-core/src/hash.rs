//! Rule-group fingerprints
//!
//! The page-side applier must never apply an identical rule group twice
//! within one page lifetime. Groups are identified by a stable xxHash64
//! fingerprint over the category tag and the ordered rule content.
//!
//! Entries are length-prefixed before hashing so that `["ab","c"]` and
//! `["a","bc"]` never collide.

use std::hash::Hasher;

use twox_hash::XxHash64;

const FINGERPRINT_SEED: u64 = 0x52_57_46_50; // "RWFP"

/// Fingerprint one rule group (one category's entries).
pub fn fingerprint_group(category: &str, entries: &[String]) -> u64 {
    let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
    write_item(&mut hasher, category);
    for entry in entries {
        write_item(&mut hasher, entry);
    }
    hasher.finish()
}

/// Fingerprint a whole rule set, covering every category in order.
pub fn fingerprint_ruleset(set: &crate::types::RuleSet) -> u64 {
    let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
    for (category, entries) in [
        ("cssInject", &set.css_inject),
        ("cssExtended", &set.css_extended),
        ("scripts", &set.scripts),
    ] {
        write_item(&mut hasher, category);
        for entry in entries {
            write_item(&mut hasher, entry);
        }
    }
    write_item(&mut hasher, "scriptlets");
    for inv in &set.scriptlets {
        write_item(&mut hasher, &inv.name);
        for arg in &inv.args {
            write_item(&mut hasher, arg);
        }
    }
    hasher.finish()
}

#[inline]
fn write_item(hasher: &mut XxHash64, item: &str) {
    hasher.write_u64(item.len() as u64);
    hasher.write(item.as_bytes());
}
