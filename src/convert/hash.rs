//! Deterministic string -> i64 identifier hashing

/// Seed of the rolling hash; also the result for an absent or empty identifier.
pub const HASH_SEED: i64 = 1_125_899_906_842_597;

/// Map a producer identifier onto a 64-bit store identifier.
///
/// Polynomial rolling hash (`h = 31 * h + unit`) over UTF-16 code units with
/// 64-bit wraparound, so ids agree with collectors that hash Java strings.
pub fn hash_id(id: Option<&str>) -> i64 {
    let Some(id) = id else {
        return HASH_SEED;
    };

    id.encode_utf16().fold(HASH_SEED, |h, unit| {
        h.wrapping_mul(31).wrapping_add(i64::from(unit))
    })
}
