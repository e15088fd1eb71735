use rand::Rng;

/// Number of discrete buckets a subject can land in.
pub const BUCKET_COUNT: u32 = 100;

/// Maps subjects onto the bucket space `[0, 100)`.
pub trait Bucketer: Send + Sync {
    /// Deterministic bucket for a subject key.
    fn bucket(&self, subject_key: &str) -> u32;

    /// Uniformly random bucket, used when no stable subject is available.
    fn random_bucket(&self) -> u32;
}

/// Consistent hashing for percentage rollout.
///
/// The hash walks the UTF-16 code units of the key with 32-bit signed
/// wraparound (`hash * 31 + c`), so a subject buckets identically in every
/// client that implements the same recurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashBucketer;

impl HashBucketer {
    pub fn hash(subject_key: &str) -> i32 {
        subject_key.encode_utf16().fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        })
    }
}

impl Bucketer for HashBucketer {
    fn bucket(&self, subject_key: &str) -> u32 {
        // unsigned_abs keeps i32::MIN in range
        Self::hash(subject_key).unsigned_abs() % BUCKET_COUNT
    }

    fn random_bucket(&self) -> u32 {
        rand::thread_rng().gen_range(0..BUCKET_COUNT)
    }
}
