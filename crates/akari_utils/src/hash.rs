//! Hashing primitives shared by the render crates.
//!
//! Two families live here:
//! - [`NoHashMap`], for in-memory maps whose keys are already hashes,
//! - [`StructuralHasher`], a CityHash64 based combiner used to build the content
//!   addresses of pipeline objects. Its output only depends on the bytes fed to it
//!   and the order of the `combine*` calls.

use std::collections::HashMap;
use std::hash::Hasher as OtherHasher;

pub type BuildNoHashHasher<T> = nohash_hasher::BuildNoHashHasher<T>;
pub type NoHashHasher<T> = nohash_hasher::NoHashHasher<T>;
pub use nohash_hasher::IsEnabled;

pub type NoHashMap<K, V> = HashMap<K, V, BuildNoHashHasher<K>>;

const K0: u64 = 0xc3a5_c85c_97cb_3127;
const K1: u64 = 0xb492_b66f_be98_f273;
const K2: u64 = 0x9ae1_6a3b_2f90_404f;
const K_MUL: u64 = 0x9ddf_ea08_eb38_2d69;

/// Initial value of every [`StructuralHasher`].
pub const STRUCTURAL_HASH_SEED: u64 = 0xc949_d7c7_509e_6557;

#[inline]
fn fetch64(s: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&s[at..at + 8]);
    u64::from_le_bytes(word)
}

#[inline]
fn fetch32(s: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&s[at..at + 4]);
    u32::from_le_bytes(word) as u64
}

#[inline]
fn shift_mix(v: u64) -> u64 {
    v ^ (v >> 47)
}

#[inline]
fn hash_len16_mul(u: u64, v: u64, mul: u64) -> u64 {
    let mut a = (u ^ v).wrapping_mul(mul);
    a ^= a >> 47;
    let mut b = (v ^ a).wrapping_mul(mul);
    b ^= b >> 47;
    b.wrapping_mul(mul)
}

/// Hashes 128 input bits down to 64 bits of output.
#[inline]
pub fn hash_128_to_64(low: u64, high: u64) -> u64 {
    hash_len16_mul(low, high, K_MUL)
}

fn hash_len0to16(s: &[u8]) -> u64 {
    let len = s.len();
    if len >= 8 {
        let mul = K2.wrapping_add(len as u64 * 2);
        let a = fetch64(s, 0).wrapping_add(K2);
        let b = fetch64(s, len - 8);
        let c = b.rotate_right(37).wrapping_mul(mul).wrapping_add(a);
        let d = a.rotate_right(25).wrapping_add(b).wrapping_mul(mul);
        return hash_len16_mul(c, d, mul);
    }
    if len >= 4 {
        let mul = K2.wrapping_add(len as u64 * 2);
        let a = fetch32(s, 0);
        return hash_len16_mul((len as u64).wrapping_add(a << 3), fetch32(s, len - 4), mul);
    }
    if len > 0 {
        let a = s[0] as u32;
        let b = s[len >> 1] as u32;
        let c = s[len - 1] as u32;
        let y = a.wrapping_add(b << 8) as u64;
        let z = (len as u32).wrapping_add(c << 2) as u64;
        return shift_mix(y.wrapping_mul(K2) ^ z.wrapping_mul(K0)).wrapping_mul(K2);
    }

    K2
}

fn hash_len17to32(s: &[u8]) -> u64 {
    let len = s.len();
    let mul = K2.wrapping_add(len as u64 * 2);
    let a = fetch64(s, 0).wrapping_mul(K1);
    let b = fetch64(s, 8);
    let c = fetch64(s, len - 8).wrapping_mul(mul);
    let d = fetch64(s, len - 16).wrapping_mul(K2);

    hash_len16_mul(
        a.wrapping_add(b)
            .rotate_right(43)
            .wrapping_add(c.rotate_right(30))
            .wrapping_add(d),
        a.wrapping_add(b.wrapping_add(K2).rotate_right(18))
            .wrapping_add(c),
        mul,
    )
}

#[inline]
fn weak_hash_len32_with_seeds(s: &[u8], at: usize, mut a: u64, mut b: u64) -> (u64, u64) {
    let w = fetch64(s, at);
    let x = fetch64(s, at + 8);
    let y = fetch64(s, at + 16);
    let z = fetch64(s, at + 24);

    a = a.wrapping_add(w);
    b = b.wrapping_add(a).wrapping_add(z).rotate_right(21);
    let c = a;
    a = a.wrapping_add(x).wrapping_add(y);
    b = b.wrapping_add(a.rotate_right(44));

    (a.wrapping_add(z), b.wrapping_add(c))
}

fn hash_len33to64(s: &[u8]) -> u64 {
    let len = s.len();
    let mul = K2.wrapping_add(len as u64 * 2);
    let mut a = fetch64(s, 0).wrapping_mul(K2);
    let mut b = fetch64(s, 8);
    let c = fetch64(s, len - 24);
    let d = fetch64(s, len - 32);
    let e = fetch64(s, 16).wrapping_mul(K2);
    let f = fetch64(s, 24).wrapping_mul(9);
    let g = fetch64(s, len - 8);
    let h = fetch64(s, len - 16).wrapping_mul(mul);

    let u = a
        .wrapping_add(g)
        .rotate_right(43)
        .wrapping_add(b.rotate_right(30).wrapping_add(c).wrapping_mul(9));
    let v = (a.wrapping_add(g) ^ d).wrapping_add(f).wrapping_add(1);
    let w = u
        .wrapping_add(v)
        .wrapping_mul(mul)
        .swap_bytes()
        .wrapping_add(h);
    let x = e.wrapping_add(f).rotate_right(42).wrapping_add(c);
    let y = v
        .wrapping_add(w)
        .wrapping_mul(mul)
        .swap_bytes()
        .wrapping_add(g)
        .wrapping_mul(mul);
    let z = e.wrapping_add(f).wrapping_add(c);
    a = x
        .wrapping_add(z)
        .wrapping_mul(mul)
        .wrapping_add(y)
        .swap_bytes()
        .wrapping_add(b);
    b = shift_mix(
        z.wrapping_add(a)
            .wrapping_mul(mul)
            .wrapping_add(d)
            .wrapping_add(h),
    )
    .wrapping_mul(mul);

    b.wrapping_add(x)
}

/// CityHash64 of a byte buffer.
pub fn city_hash64(s: &[u8]) -> u64 {
    let len = s.len();
    if len <= 16 {
        return hash_len0to16(s);
    }
    if len <= 32 {
        return hash_len17to32(s);
    }
    if len <= 64 {
        return hash_len33to64(s);
    }

    let mut x = fetch64(s, len - 40);
    let mut y = fetch64(s, len - 16).wrapping_add(fetch64(s, len - 56));
    let mut z = hash_128_to_64(
        fetch64(s, len - 48).wrapping_add(len as u64),
        fetch64(s, len - 24),
    );
    let mut v = weak_hash_len32_with_seeds(s, len - 64, len as u64, z);
    let mut w = weak_hash_len32_with_seeds(s, len - 32, y.wrapping_add(K1), x);
    x = x.wrapping_mul(K1).wrapping_add(fetch64(s, 0));

    let mut remaining = (len - 1) & !63usize;
    let mut at = 0;
    loop {
        x = x
            .wrapping_add(y)
            .wrapping_add(v.0)
            .wrapping_add(fetch64(s, at + 8))
            .rotate_right(37)
            .wrapping_mul(K1);
        y = y
            .wrapping_add(v.1)
            .wrapping_add(fetch64(s, at + 48))
            .rotate_right(42)
            .wrapping_mul(K1);
        x ^= w.1;
        y = y.wrapping_add(v.0).wrapping_add(fetch64(s, at + 40));
        z = z.wrapping_add(w.0).rotate_right(33).wrapping_mul(K1);
        v = weak_hash_len32_with_seeds(s, at, v.1.wrapping_mul(K1), x.wrapping_add(w.0));
        w = weak_hash_len32_with_seeds(
            s,
            at + 32,
            z.wrapping_add(w.1),
            y.wrapping_add(fetch64(s, at + 16)),
        );
        std::mem::swap(&mut z, &mut x);

        at += 64;
        remaining -= 64;
        if remaining == 0 {
            break;
        }
    }

    hash_128_to_64(
        hash_128_to_64(v.0, w.0)
            .wrapping_add(shift_mix(y).wrapping_mul(K1))
            .wrapping_add(z),
        hash_128_to_64(v.1, w.1).wrapping_add(x),
    )
}

/// Collects the bytes a `Hash` implementation writes so that a whole record can be
/// hashed in one go.
#[derive(Default)]
pub struct RecordWriter {
    bytes: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl OtherHasher for RecordWriter {
    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
    fn finish(&self) -> u64 {
        city_hash64(&self.bytes)
    }
}

/// Order-sensitive combiner of records and record arrays.
///
/// Every `combine*` call hashes its input with [`city_hash64`] and folds the result
/// into the running value with [`hash_128_to_64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralHasher {
    value: u64,
}

impl Default for StructuralHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralHasher {
    pub const fn new() -> Self {
        Self {
            value: STRUCTURAL_HASH_SEED,
        }
    }
    pub const fn with_value(value: u64) -> Self {
        Self { value }
    }
    #[inline]
    pub const fn value(&self) -> u64 {
        self.value
    }
    /// Folds an already computed 64 bit hash.
    #[inline]
    pub fn combine_hash(&mut self, hash: u64) -> &mut Self {
        self.value = hash_128_to_64(self.value, hash);
        self
    }
    /// Folds a raw byte buffer.
    pub fn combine_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.combine_hash(city_hash64(bytes))
    }
    /// Folds a single fixed-size record.
    pub fn combine<T: std::hash::Hash + ?Sized>(&mut self, record: &T) -> &mut Self {
        let mut writer = RecordWriter::new();
        record.hash(&mut writer);
        self.combine_hash(writer.finish())
    }
    /// Folds a contiguous run of records as one buffer. Empty runs are skipped.
    pub fn combine_array<T: std::hash::Hash>(&mut self, records: &[T]) -> &mut Self {
        if records.is_empty() {
            return self;
        }

        let mut writer = RecordWriter::new();
        for record in records {
            record.hash(&mut writer);
        }
        self.combine_hash(writer.finish())
    }
    #[inline]
    pub fn finish(&self) -> u64 {
        self.value
    }
}

impl From<StructuralHasher> for u64 {
    fn from(hasher: StructuralHasher) -> Self {
        hasher.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn empty_input_is_k2() {
        assert_eq!(city_hash64(&[]), K2);
    }

    #[test]
    fn city_hash_is_deterministic_for_every_length_class() {
        for len in [0, 1, 3, 4, 7, 8, 16, 17, 32, 33, 64, 65, 128, 129, 300] {
            let data = bytes(len);
            assert_eq!(city_hash64(&data), city_hash64(&data), "len {}", len);
        }
    }

    #[test]
    fn city_hash_sees_a_single_flipped_bit() {
        for len in [1, 5, 12, 20, 40, 100, 257] {
            let data = bytes(len);
            let mut flipped = data.clone();
            flipped[len / 2] ^= 0x10;
            assert_ne!(city_hash64(&data), city_hash64(&flipped), "len {}", len);
        }
    }

    #[derive(Hash)]
    struct Record {
        a: u32,
        b: u32,
    }

    #[test]
    fn combine_is_order_sensitive() {
        let mut first = StructuralHasher::new();
        first.combine(&Record { a: 1, b: 2 }).combine(&Record { a: 3, b: 4 });

        let mut second = StructuralHasher::new();
        second.combine(&Record { a: 3, b: 4 }).combine(&Record { a: 1, b: 2 });

        assert_ne!(first.finish(), second.finish());
    }

    #[test]
    fn combine_array_matches_itself_and_skips_empty() {
        let records = [Record { a: 1, b: 2 }, Record { a: 5, b: 6 }];

        let mut first = StructuralHasher::new();
        first.combine_array(&records);
        let mut second = StructuralHasher::new();
        second.combine_array(&records);
        assert_eq!(first.finish(), second.finish());

        let mut untouched = StructuralHasher::new();
        untouched.combine_array::<Record>(&[]);
        assert_eq!(untouched.finish(), STRUCTURAL_HASH_SEED);
    }

    #[test]
    fn array_split_differs_from_array_whole() {
        let records = [Record { a: 1, b: 2 }, Record { a: 5, b: 6 }];

        let mut whole = StructuralHasher::new();
        whole.combine_array(&records);

        let mut split = StructuralHasher::new();
        split.combine_array(&records[..1]).combine_array(&records[1..]);

        assert_ne!(whole.finish(), split.finish());
    }
}
