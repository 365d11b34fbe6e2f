//! Prime capacities for the double-hashing probe sequence.
//!
//! A table whose length is prime lets every probe step in `[1, capacity - 1]`
//! generate a permutation of all slots, so a probe always reaches an empty
//! cell when one exists.

use crate::error::CapacityError;

/// Checks whether `n` is prime.
///
/// Trial division over divisors of the form `6k ± 1`, stopping once the
/// divisor squared exceeds `n`.
///
/// # Examples
///
/// ```rust
/// use prime_probe::primes::is_prime;
///
/// assert!(is_prime(2));
/// assert!(is_prime(11));
/// assert!(!is_prime(25));
/// ```
pub fn is_prime(n: u64) -> bool {
    if n == 2 || n == 3 {
        return true;
    }
    if n < 2 || n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    let mut divisor: u64 = 5;
    // `checked_mul` fails only once the square passes u64::MAX, which is
    // already past every possible `n`.
    while let Some(square) = divisor.checked_mul(divisor) {
        if square > n {
            break;
        }
        if n % divisor == 0 || n % (divisor + 2) == 0 {
            return false;
        }
        divisor += 6;
    }

    true
}

/// Returns the smallest prime greater than or equal to `n`, or `None` if no
/// such prime fits in a `u64`.
///
/// Values below 2 map to 2.
///
/// # Examples
///
/// ```rust
/// use prime_probe::primes::next_prime;
///
/// assert_eq!(next_prime(0), Some(2));
/// assert_eq!(next_prime(10), Some(11));
/// assert_eq!(next_prime(22), Some(23));
/// assert_eq!(next_prime(u64::MAX), None);
/// ```
pub fn next_prime(n: u64) -> Option<u64> {
    if n < 2 {
        return Some(2);
    }
    if is_prime(n) {
        return Some(n);
    }

    // Snap onto the 6k ± 1 sequence: anything else is a multiple of 2 or 3.
    let mut candidate = n;
    let mut residue = n % 6;
    if residue == 0 {
        candidate = candidate.checked_add(1)?;
        if is_prime(candidate) {
            return Some(candidate);
        }
        residue = 1;
    }
    if residue < 5 {
        candidate = candidate.checked_add(5 - residue)?;
    }

    // From 6k + 5, alternate +2 (to 6k + 7) and +4 (to 6k + 11).
    let mut step = 2;
    loop {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_add(step)?;
        step = 6 - step;
    }
}

/// Returns the prime slot count for a table asked to hold at least `slots`
/// cells.
///
/// Fails with [`CapacityError::Overflow`] when no such prime is representable
/// as a `usize`.
pub fn next_prime_capacity(slots: usize) -> Result<usize, CapacityError> {
    let overflow = CapacityError::Overflow { requested: slots };

    let requested = u64::try_from(slots).map_err(|_| overflow.clone())?;
    let prime = next_prime(requested).ok_or_else(|| overflow.clone())?;
    usize::try_from(prime).map_err(|_| overflow)
}
