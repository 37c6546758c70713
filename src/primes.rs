//! Prime bucket counts for `ChainedHashMap`.
//!
//! Each entry is roughly 1.5x the previous one. Bucket counts are always
//! taken from this table so `hash % capacity` does not amplify regular
//! patterns in weak hash functions.

const PRIMES: [usize; 51] = [
    2, 5, 11, 17, 29, 47, 71, 107, 163, 251, 379, 569, 857, 1289, 1949, 2927, 4391, 6599, 9901,
    14867, 22303, 33457, 50207, 75323, 112997, 169501, 254257, 381389, 572087, 858149, 1287233,
    1930879, 2896319, 4344479, 6516739, 9775111, 14662727, 21994111, 32991187, 49486793, 74230231,
    111345347, 167018021, 250527047, 375790601, 563685907, 845528867, 1268293309, 1902439967,
    2853659981, 4280489981,
];

// Entries past u32::MAX only exist where usize can hold them.
#[cfg(target_pointer_width = "64")]
const WIDE_PRIMES: [usize; 2] = [6420734989, 9631102487];
#[cfg(not(target_pointer_width = "64"))]
const WIDE_PRIMES: [usize; 0] = [];

fn table() -> impl Iterator<Item = usize> {
    PRIMES.iter().chain(WIDE_PRIMES.iter()).copied()
}

/// Smallest table prime `>= min`, or `None` when the table is exhausted.
pub fn prime_at_least(min: usize) -> Option<usize> {
    table().find(|&p| p >= min)
}

/// Smallest table prime strictly greater than `n`.
pub fn prime_above(n: usize) -> Option<usize> {
    table().find(|&p| p > n)
}

/// Largest capacity a map can be created with on this target.
pub fn max_capacity() -> usize {
    table().last().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_ascending() {
        let v: Vec<usize> = table().collect();
        assert!(v.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn every_entry_is_prime() {
        fn is_prime(n: usize) -> bool {
            if n < 2 {
                return false;
            }
            let mut d = 2usize;
            while d * d <= n {
                if n % d == 0 {
                    return false;
                }
                d += 1;
            }
            true
        }
        // Trial division on the large entries is slow; the small ones suffice.
        for p in table().filter(|&p| p < 10_000_000) {
            assert!(is_prime(p), "{p} is not prime");
        }
    }

    #[test]
    fn lookups() {
        assert_eq!(prime_at_least(0), Some(2));
        assert_eq!(prime_at_least(30), Some(47));
        assert_eq!(prime_at_least(47), Some(47));
        assert_eq!(prime_above(47), Some(71));
        assert_eq!(prime_at_least(usize::MAX), None);
        assert_eq!(prime_above(max_capacity()), None);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn wide_entries_on_64_bit() {
        assert_eq!(max_capacity(), 9631102487);
        assert_eq!(prime_above(4280489981), Some(6420734989));
    }
}
