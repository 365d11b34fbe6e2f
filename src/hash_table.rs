//! A raw open-addressing table using double hashing over prime capacities.
//!
//! [`HashTable`] stores values of type `V` and leaves hashing and equality to
//! the caller: every operation takes the value's `u64` digest and a predicate
//! that recognizes the value being looked for. [`HashMap`] and [`HashSet`]
//! are built on top of it.
//!
//! [`HashMap`]: crate::HashMap
//! [`HashSet`]: crate::HashSet
//!
//! ## Probing
//!
//! The table length `c` is always prime. A digest `h` starts at `h mod c` and
//! advances with `i -> (i + 1 + h mod (c - 1)) mod c`. The stride lies in
//! `[1, c - 1]` and is therefore coprime with `c`, so the probe visits every
//! slot before repeating.
//!
//! ## Deletion and compaction
//!
//! Removing a value leaves a tombstone that keeps longer probe chains intact.
//! Tombstones count against the load factor until the next rehash drops them.
//! A mutable lookup that meets a tombstone before finding its value swaps the
//! value into the tombstone's slot, shortening that value's future probes.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem;

use log::debug;
use log::trace;

use crate::error::CapacityError;
use crate::primes::next_prime_capacity;

/// Growth is triggered once `filled / capacity` reaches
/// `MAX_LOAD_NUMERATOR / MAX_LOAD_DENOMINATOR`.
const MAX_LOAD_NUMERATOR: u128 = 7;
const MAX_LOAD_DENOMINATOR: u128 = 10;

#[inline(always)]
fn at_max_load(filled: usize, capacity: usize) -> bool {
    filled as u128 * MAX_LOAD_DENOMINATOR >= capacity as u128 * MAX_LOAD_NUMERATOR
}

/// Smallest slot count that holds `entries` cells below the maximum load.
#[inline]
fn slots_for(entries: usize) -> usize {
    let slots = entries as u128 * MAX_LOAD_DENOMINATOR / MAX_LOAD_NUMERATOR + 1;
    usize::try_from(slots).unwrap_or(usize::MAX)
}

#[inline(always)]
fn home_slot(hash: u64, capacity: usize) -> usize {
    (hash % capacity as u64) as usize
}

#[inline(always)]
fn next_slot(hash: u64, index: usize, capacity: usize) -> usize {
    let capacity = capacity as u64;
    // index + 1 + stride < 2 * capacity, and capacity never exceeds isize::MAX.
    ((index as u64 + 1 + hash % (capacity - 1)) % capacity) as usize
}

/// One slot of the backing array.
#[derive(Clone)]
enum Bucket<V> {
    Empty,
    Occupied { hash: u64, value: V },
    Tombstone,
}

impl<V> Bucket<V> {
    #[inline(always)]
    fn holds(&self, hash: u64, eq: &impl Fn(&V) -> bool) -> bool {
        match self {
            Bucket::Occupied { hash: stored, value } => *stored == hash && eq(value),
            _ => false,
        }
    }

    fn value(&self) -> &V {
        match self {
            Bucket::Occupied { value, .. } => value,
            _ => unreachable!("bucket has no value"),
        }
    }

    fn value_mut(&mut self) -> &mut V {
        match self {
            Bucket::Occupied { value, .. } => value,
            _ => unreachable!("bucket has no value"),
        }
    }
}

/// Result of a compacting probe.
enum Located {
    Found(usize),
    Vacant { index: usize, tombstone: bool },
}

fn alloc_buckets<V>(capacity: usize) -> Result<Box<[Bucket<V>]>, CapacityError> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(capacity)
        .map_err(|_| CapacityError::Alloc { capacity })?;
    buckets.resize_with(capacity, || Bucket::Empty);
    Ok(buckets.into_boxed_slice())
}

fn alloc_prime_buckets<V>(slots: usize) -> Result<Box<[Bucket<V>]>, CapacityError> {
    alloc_buckets(next_prime_capacity(slots)?)
}

/// Debug statistics for hash table analysis.
///
/// Available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of values currently in the table
    pub populated: usize,
    /// Number of tombstoned slots
    pub tombstones: usize,
    /// Number of slots that are occupied or tombstoned
    pub filled: usize,
    /// Total number of slots (always prime)
    pub capacity: usize,
    /// Load factor (filled / capacity)
    pub load_factor: f64,
    /// Longest probe sequence of any stored value
    pub max_probe_length: usize,
    /// Mean probe sequence length over stored values
    pub mean_probe_length: f64,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {} values, {} tombstones in {} slots",
            self.populated, self.tombstones, self.capacity
        );
        println!(
            "Load: {}/{} ({:.2}% load factor)",
            self.filled,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Probes: max {}, mean {:.3}",
            self.max_probe_length, self.mean_probe_length
        );
    }
}

/// Probe length histogram: `counts()[n]` is the number of values found `n`
/// steps after their home slot.
///
/// Available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    counts: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Counts per probe length.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Total number of values counted.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Pretty-prints the histogram horizontally using stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.total());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = match units % 8 {
                0 => None,
                1 => Some('▏'),
                2 => Some('▎'),
                3 => Some('▍'),
                4 => Some('▌'),
                5 => Some('▋'),
                6 => Some('▊'),
                _ => Some('▉'),
            };
            bar.extend(partial);
            bar
        };

        for (length, &count) in self.counts.iter().enumerate() {
            println!("{:>3} | {} ({})", length, make_bar(count), count);
        }
    }
}

/// An open-addressing hash table using double hashing.
///
/// `HashTable<V>` stores values of type `V`. Like a raw table, it requires you
/// to provide both the hash value and an equality predicate for each
/// operation. The caller must hash equal values to equal digests.
///
/// The capacity is always a prime number of slots. The table grows to the
/// next prime at or above twice its capacity once occupied and tombstoned
/// slots reach 70% of the capacity.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use prime_probe::hash_table::Entry;
/// # use prime_probe::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::with_capacity(10);
/// assert_eq!(table.capacity(), 11);
///
/// let hash = hash_id(123);
/// match table.entry(hash, |p: &Person| p.id == 123) {
///     Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     Entry::Occupied(_) => {
///         println!("Person already exists");
///     }
/// }
/// assert_eq!(table.find(hash, |p| p.id == 123).unwrap().name, "Alice");
/// ```
#[derive(Clone)]
pub struct HashTable<V> {
    buckets: Box<[Bucket<V>]>,
    populated: usize,
    filled: usize,
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;

        f.debug_struct("HashTable")
            .field(
                "buckets",
                &self
                    .buckets
                    .iter()
                    .map(|bucket| match bucket {
                        Bucket::Empty => String::from(".."),
                        Bucket::Tombstone => String::from("xx"),
                        Bucket::Occupied { hash, .. } => format!("{:02x}", hash & 0xff),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            )
            .field("populated", &self.populated)
            .field("filled", &self.filled)
            .field("capacity", &self.buckets.len())
            .finish()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with `next_prime(slots)` slots.
    ///
    /// Unlike most collections, the argument counts slots rather than values:
    /// a table created with `with_capacity(n)` grows once about `0.7 * n`
    /// slots are in use.
    ///
    /// # Panics
    ///
    /// Panics if no prime capacity can be represented or allocated. Use
    /// [`try_with_capacity`](Self::try_with_capacity) to handle that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 101);
    /// ```
    pub fn with_capacity(slots: usize) -> Self {
        Self::try_with_capacity(slots).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Creates an empty table with `next_prime(slots)` slots, reporting
    /// capacity overflow or allocation failure as an error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::CapacityError;
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let table = HashTable::<u64>::try_with_capacity(0).unwrap();
    /// assert_eq!(table.capacity(), 2);
    ///
    /// let err = HashTable::<u64>::try_with_capacity(usize::MAX).unwrap_err();
    /// assert!(matches!(err, CapacityError::Overflow { .. }));
    /// ```
    pub fn try_with_capacity(slots: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            buckets: alloc_prime_buckets(slots)?,
            populated: 0,
            filled: 0,
        })
    }

    /// Returns the number of values in the table.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table contains no values.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots in the table. This is always a prime.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(10);
    /// assert_eq!(table.capacity(), 11);
    ///
    /// for n in 0..8u64 {
    ///     table.entry(n, |&v| v == n).or_insert(n);
    /// }
    /// // The eighth value brought the load to 8/11 and the table grew.
    /// assert_eq!(table.capacity(), 23);
    /// ```
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns an iterator over all values in the table, in slot order.
    ///
    /// The order is not meaningful and changes when the table is rehashed.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            buckets: self.buckets.iter(),
            remaining: self.populated,
        }
    }

    /// Returns an iterator yielding mutable references to all values, in
    /// slot order.
    ///
    /// Mutating a value in a way that changes its hash or equality leaves it
    /// unreachable by lookups.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            buckets: self.buckets.iter_mut(),
            remaining: self.populated,
        }
    }

    /// Returns an iterator that removes and yields all values from the table.
    ///
    /// The table keeps its capacity. Once the iterator is dropped every slot
    /// is empty, including former tombstones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(10);
    /// table.entry(1, |&v| v == 1).or_insert(1);
    /// table.entry(2, |&v| v == 2).or_insert(2);
    ///
    /// let mut values: Vec<u64> = table.drain().collect();
    /// values.sort();
    /// assert_eq!(values, [1, 2]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Removes all values, keeping the current capacity.
    ///
    /// Tombstones are dropped along with the values.
    pub fn clear(&mut self) {
        self.buckets
            .iter_mut()
            .for_each(|bucket| *bucket = Bucket::Empty);
        self.populated = 0;
        self.filled = 0;
    }

    /// Removes all values and reallocates the table with `next_prime(slots)`
    /// slots.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity cannot be represented or allocated. Use
    /// [`try_clear_with_capacity`](Self::try_clear_with_capacity) to handle
    /// that case.
    pub fn clear_with_capacity(&mut self, slots: usize) {
        self.try_clear_with_capacity(slots)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Removes all values and reallocates the table with `next_prime(slots)`
    /// slots.
    ///
    /// The new array is allocated before the old one is released, so on error
    /// the table keeps all of its values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(100);
    /// table.entry(7, |&v| v == 7).or_insert(7);
    ///
    /// table.try_clear_with_capacity(4).unwrap();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 5);
    /// ```
    pub fn try_clear_with_capacity(&mut self, slots: usize) -> Result<(), CapacityError> {
        let buckets = alloc_prime_buckets(slots)?;
        debug!(
            "clearing {} values from {} slots, reallocating to {} slots",
            self.populated,
            self.buckets.len(),
            buckets.len()
        );

        self.buckets = buckets;
        self.populated = 0;
        self.filled = 0;
        Ok(())
    }

    /// Reserves room for at least `additional` more values before the next
    /// growth.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity cannot be represented or allocated.
    pub fn reserve(&mut self, additional: usize) {
        self.try_reserve(additional)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Reserves room for at least `additional` more values before the next
    /// growth, reporting failure as an error.
    ///
    /// If tombstones are what stands in the way, the table is rehashed without
    /// them. The capacity never shrinks.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(0);
    /// table.try_reserve(100).unwrap();
    /// let capacity = table.capacity();
    ///
    /// for n in 0..100u64 {
    ///     table.entry(n, |&v| v == n).or_insert(n);
    /// }
    /// assert_eq!(table.capacity(), capacity);
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), CapacityError> {
        let capacity = self.buckets.len();
        if !at_max_load(self.filled.saturating_add(additional), capacity) {
            trace!("reserve({additional}) fits in {capacity} slots");
            return Ok(());
        }

        let required = self.populated.saturating_add(additional);
        let buckets = alloc_prime_buckets(slots_for(required).max(capacity))?;
        self.rehash_into(buckets, None);
        Ok(())
    }

    /// Shrinks the table to the smallest prime capacity that holds its
    /// values below the maximum load, dropping tombstones.
    ///
    /// If the smaller array cannot be allocated the table is left unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(1000);
    /// table.entry(42, |&v| v == 42).or_insert(42);
    /// table.entry(123, |&v| v == 123).or_insert(123);
    ///
    /// table.shrink_to_fit();
    /// assert_eq!(table.capacity(), 3);
    /// assert_eq!(table.find(42, |&v| v == 42), Some(&42));
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let target = match next_prime_capacity(slots_for(self.populated)) {
            Ok(target) => target,
            Err(err) => {
                debug!("shrink_to_fit skipped: {err}");
                return;
            }
        };

        let capacity = self.buckets.len();
        if target > capacity || (target == capacity && self.filled == self.populated) {
            return;
        }

        match alloc_buckets(target) {
            Ok(buckets) => {
                self.rehash_into(buckets, None);
            }
            Err(err) => debug!("shrink_to_fit skipped: {err}"),
        }
    }

    /// Keeps only the values for which `f` returns `true`.
    ///
    /// Rejected values are dropped and their slots tombstoned.
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool) {
        for bucket in self.buckets.iter_mut() {
            if let Bucket::Occupied { value, .. } = bucket {
                if !f(value) {
                    *bucket = Bucket::Tombstone;
                    self.populated -= 1;
                }
            }
        }
    }

    /// Removes and returns a value from the table.
    ///
    /// The probe skips tombstones and stops at the value or at the first
    /// empty slot. The value's slot becomes a tombstone; the table never
    /// shrinks here. Removing a missing value is a no-op that returns `None`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(10);
    /// table.entry(42, |&n| n == 42).or_insert(42);
    ///
    /// assert_eq!(table.remove(42, |&n| n == 42), Some(42));
    /// assert!(table.is_empty());
    /// assert_eq!(table.remove(42, |&n| n == 42), None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        if self.populated == 0 {
            return None;
        }

        let index = self.locate_existing(hash, &eq)?;
        Some(self.take(index))
    }

    /// Finds a value without moving anything in the table.
    ///
    /// Tombstones are stepped over; the probe ends at the value or at the
    /// first empty slot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(10);
    /// table.entry(42, |&n| n == 42).or_insert(42);
    ///
    /// assert_eq!(table.find(42, |&n| n == 42), Some(&42));
    /// assert_eq!(table.find(99, |&n| n == 99), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.populated == 0 {
            return None;
        }

        self.locate_existing(hash, &eq)
            .map(|index| self.buckets[index].value())
    }

    /// Finds a value, returning a mutable reference.
    ///
    /// Logically this is a read, but physically it may move the value: if
    /// the probe passes a tombstone before reaching it, the value is swapped
    /// into the tombstone's slot so later lookups stop earlier.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.populated == 0 {
            return None;
        }

        match self.locate(hash, &eq) {
            Located::Found(index) => Some(self.buckets[index].value_mut()),
            Located::Vacant { .. } => None,
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// The lookup compacts the probe chain like [`find_mut`](Self::find_mut).
    ///
    /// # Panics
    ///
    /// Panics if inserting into the entry would require growth and the grown
    /// table cannot be represented or allocated. Use
    /// [`try_entry`](Self::try_entry) to handle that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use prime_probe::hash_table::Entry;
    /// # use prime_probe::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<(u64, &str)> = HashTable::with_capacity(10);
    ///
    /// match table.entry(7, |&(k, _)| k == 7) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert((7, "seven"));
    ///     }
    ///     Entry::Occupied(mut entry) => {
    ///         entry.get_mut().1 = "updated";
    ///     }
    /// }
    ///
    /// table.entry(7, |&(k, _)| k == 7).or_insert((7, "ignored"));
    /// assert_eq!(table.find(7, |&(k, _)| k == 7), Some(&(7, "seven")));
    /// ```
    #[inline]
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V> {
        self.try_entry(hash, eq)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Gets an entry for the given hash and equality predicate, reporting
    /// growth failure as an error.
    ///
    /// When the entry is vacant and filling it would reach the maximum load,
    /// the grown array is allocated here, before anything is written. On
    /// error the table is unchanged.
    pub fn try_entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
    ) -> Result<Entry<'_, V>, CapacityError> {
        match self.locate(hash, &eq) {
            Located::Found(index) => Ok(Entry::Occupied(OccupiedEntry { table: self, index })),
            Located::Vacant { index, tombstone } => {
                let grown = if !tombstone && at_max_load(self.filled + 1, self.buckets.len()) {
                    Some(alloc_prime_buckets(self.buckets.len().saturating_mul(2))?)
                } else {
                    None
                };

                Ok(Entry::Vacant(VacantEntry {
                    table: self,
                    hash,
                    index,
                    tombstone,
                    grown,
                }))
            }
        }
    }

    /// Probes for `hash` and returns either the slot holding the matching
    /// value or the slot an insertion should use.
    ///
    /// The probe stops at the first empty slot, the first tombstone, or the
    /// match. Stopping at a tombstone continues the search past further
    /// tombstones; if the value turns up it is swapped back into the
    /// tombstone's slot.
    fn locate(&mut self, hash: u64, eq: &impl Fn(&V) -> bool) -> Located {
        let capacity = self.buckets.len();
        let mut index = home_slot(hash, capacity);
        loop {
            match &self.buckets[index] {
                Bucket::Empty => {
                    return Located::Vacant {
                        index,
                        tombstone: false,
                    };
                }
                Bucket::Tombstone => break,
                bucket if bucket.holds(hash, eq) => return Located::Found(index),
                Bucket::Occupied { .. } => index = next_slot(hash, index, capacity),
            }
        }

        let mut probe = next_slot(hash, index, capacity);
        loop {
            match &self.buckets[probe] {
                Bucket::Empty => {
                    return Located::Vacant {
                        index,
                        tombstone: true,
                    };
                }
                bucket if bucket.holds(hash, eq) => {
                    self.buckets.swap(index, probe);
                    return Located::Found(index);
                }
                _ => probe = next_slot(hash, probe, capacity),
            }
        }
    }

    /// Probes for `hash` stepping over tombstones, without moving anything.
    fn locate_existing(&self, hash: u64, eq: &impl Fn(&V) -> bool) -> Option<usize> {
        let capacity = self.buckets.len();
        let mut index = home_slot(hash, capacity);
        loop {
            match &self.buckets[index] {
                Bucket::Empty => return None,
                bucket if bucket.holds(hash, eq) => return Some(index),
                _ => index = next_slot(hash, index, capacity),
            }
        }
    }

    /// Moves the value out of an occupied slot, leaving a tombstone.
    fn take(&mut self, index: usize) -> V {
        match mem::replace(&mut self.buckets[index], Bucket::Tombstone) {
            Bucket::Occupied { value, .. } => {
                self.populated -= 1;
                value
            }
            _ => unreachable!("take from a bucket without a value"),
        }
    }

    /// Moves every value into `buckets` and drops the tombstones.
    ///
    /// Returns the new slot of the value that was at `track`, if any.
    fn rehash_into(&mut self, buckets: Box<[Bucket<V>]>, track: Option<usize>) -> Option<usize> {
        let old = mem::replace(&mut self.buckets, buckets);
        let capacity = self.buckets.len();
        debug_assert!(self.populated < capacity);
        debug_assert!(crate::primes::is_prime(capacity as u64));
        debug!(
            "rehashing {} values from {} to {} slots, dropping {} tombstones",
            self.populated,
            old.len(),
            capacity,
            self.filled - self.populated
        );

        let mut tracked = None;
        for (old_index, bucket) in old.into_vec().into_iter().enumerate() {
            if let Bucket::Occupied { hash, value } = bucket {
                let mut index = home_slot(hash, capacity);
                while !matches!(self.buckets[index], Bucket::Empty) {
                    index = next_slot(hash, index, capacity);
                }
                if track == Some(old_index) {
                    tracked = Some(index);
                }
                self.buckets[index] = Bucket::Occupied { hash, value };
            }
        }

        self.filled = self.populated;
        tracked
    }

    /// Computes a histogram of probe lengths for the current table state.
    ///
    /// The probe length of a value is the number of steps from its home slot
    /// to the slot it occupies.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let capacity = self.buckets.len();
        let mut counts = alloc::vec![0usize; 1];

        for (index, bucket) in self.buckets.iter().enumerate() {
            if let Bucket::Occupied { hash, .. } = bucket {
                let mut probe = home_slot(*hash, capacity);
                let mut length = 0;
                while probe != index {
                    probe = next_slot(*hash, probe, capacity);
                    length += 1;
                }
                if counts.len() <= length {
                    counts.resize(length + 1, 0);
                }
                counts[length] += 1;
            }
        }

        ProbeHistogram { counts }
    }

    /// Returns load and probe-length statistics for debugging.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let histogram = self.probe_histogram();
        let probe_total: usize = histogram
            .counts()
            .iter()
            .enumerate()
            .map(|(length, count)| length * count)
            .sum();

        DebugStats {
            populated: self.populated,
            tombstones: self.filled - self.populated,
            filled: self.filled,
            capacity: self.buckets.len(),
            load_factor: self.filled as f64 / self.buckets.len() as f64,
            max_probe_length: histogram.counts().len() - 1,
            mean_probe_length: if self.populated == 0 {
                0.0
            } else {
                probe_total as f64 / self.populated as f64
            },
        }
    }
}

/// A view into a single entry in the hash table, which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, V> {
    /// A vacant entry - no matching value is present in the table
    Vacant(VacantEntry<'a, V>),
    /// An occupied entry - a matching value is present in the table
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value in the entry.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant and returns a
    /// mutable reference to the value in the entry.
    ///
    /// The closure is not called for an occupied entry.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value of an occupied entry and returns it; returns
    /// `None` for a vacant entry without inserting anything.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant and returns a mutable
    /// reference to the value in the entry.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the hash table.
///
/// Holds the slot chosen by the probe and, when filling it reaches the
/// maximum load, the already allocated array the table will grow into.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    hash: u64,
    index: usize,
    tombstone: bool,
    grown: Option<Box<[Bucket<V>]>>,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts a value into the vacant entry and returns a mutable reference
    /// to it.
    ///
    /// Filling an empty slot may grow the table; the returned reference
    /// points at the value's slot after growth.
    pub fn insert(self, value: V) -> &'a mut V {
        let VacantEntry {
            table,
            hash,
            index,
            tombstone,
            grown,
        } = self;

        if !tombstone {
            table.filled += 1;
        }
        table.populated += 1;
        table.buckets[index] = Bucket::Occupied { hash, value };

        let index = match grown {
            Some(buckets) => table.rehash_into(buckets, Some(index)).unwrap_or(index),
            None => index,
        };
        debug_assert!(!at_max_load(table.filled, table.buckets.len()));

        table.buckets[index].value_mut()
    }
}

/// A view into an occupied entry in the hash table.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.table.buckets[self.index].value()
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        self.table.buckets[self.index].value_mut()
    }

    /// Converts the entry into a mutable reference to the value, bound to
    /// the lifetime of the table.
    pub fn into_mut(self) -> &'a mut V {
        let OccupiedEntry { table, index } = self;
        table.buckets[index].value_mut()
    }

    /// Replaces the value in the entry, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        mem::replace(self.get_mut(), value)
    }

    /// Removes the value from the table, leaving a tombstone in its slot.
    pub fn remove(self) -> V {
        let OccupiedEntry { table, index } = self;
        table.take(index)
    }
}

/// An iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`iter`] method on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, V> {
    buckets: core::slice::Iter<'a, Bucket<V>>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.buckets.find_map(|bucket| match bucket {
            Bucket::Occupied { value, .. } => {
                self.remaining -= 1;
                Some(value)
            }
            _ => None,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

/// A mutable iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, V> {
    buckets: core::slice::IterMut<'a, Bucket<V>>,
    remaining: usize,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.buckets.find_map(|bucket| match bucket {
            Bucket::Occupied { value, .. } => {
                self.remaining -= 1;
                Some(value)
            }
            _ => None,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

/// An owning iterator over the values in a [`HashTable`].
///
/// This struct is created by the `into_iter` method on [`HashTable`].
pub struct IntoIter<V> {
    buckets: alloc::vec::IntoIter<Bucket<V>>,
    remaining: usize,
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.buckets.find_map(|bucket| match bucket {
            Bucket::Occupied { value, .. } => {
                self.remaining -= 1;
                Some(value)
            }
            _ => None,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IntoIter<V> {}

impl<V> IntoIterator for HashTable<V> {
    type IntoIter = IntoIter<V>;
    type Item = V;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            buckets: self.buckets.into_vec().into_iter(),
            remaining: self.populated,
        }
    }
}

/// A draining iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`].
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
        self.table.clear();
    }
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        // Drained slots become tombstones so the remaining values stay
        // reachable if the iterator is leaked; `drop` empties them.
        while self.table.populated > 0 && self.index < self.table.buckets.len() {
            let index = self.index;
            self.index += 1;
            if matches!(self.table.buckets[index], Bucket::Occupied { .. }) {
                return Some(self.table.take(index));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::cell::Cell;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::primes::is_prime;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    fn insert_item(table: &mut HashTable<Item>, hash: u64, key: u64, value: i32) {
        match table.entry(hash, |v| v.key == key) {
            Entry::Vacant(v) => {
                v.insert(Item { key, value });
            }
            Entry::Occupied(_) => panic!("unexpected occupied for {key}: {table:#?}"),
        }
    }

    fn slot_of(table: &HashTable<Item>, key: u64) -> Option<usize> {
        table.buckets.iter().position(|bucket| match bucket {
            Bucket::Occupied { value, .. } => value.key == key,
            _ => false,
        })
    }

    fn assert_invariants<V>(table: &HashTable<V>) {
        let occupied = table
            .buckets
            .iter()
            .filter(|b| matches!(b, Bucket::Occupied { .. }))
            .count();
        let tombstones = table
            .buckets
            .iter()
            .filter(|b| matches!(b, Bucket::Tombstone))
            .count();
        assert_eq!(occupied, table.populated);
        assert_eq!(occupied + tombstones, table.filled);
        assert!(table.filled < table.capacity());
        assert!(!at_max_load(table.filled, table.capacity()));
        assert!(is_prime(table.capacity() as u64));
    }

    #[test]
    fn probe_visits_every_slot() {
        for capacity in [2usize, 3, 5, 11, 23, 97] {
            for hash in [0u64, 1, 3, 113, 1 << 40, u64::MAX] {
                let mut seen = vec![false; capacity];
                let mut index = home_slot(hash, capacity);
                for _ in 0..capacity {
                    assert!(!seen[index], "slot {index} repeated for hash {hash}");
                    seen[index] = true;
                    index = next_slot(hash, index, capacity);
                }
                assert!(seen.iter().all(|&s| s));
            }
        }
    }

    #[test]
    fn initial_capacity_is_next_prime() {
        assert_eq!(HashTable::<Item>::with_capacity(0).capacity(), 2);
        assert_eq!(HashTable::<Item>::with_capacity(1).capacity(), 2);
        assert_eq!(HashTable::<Item>::with_capacity(10).capacity(), 11);
        assert_eq!(HashTable::<Item>::with_capacity(11).capacity(), 11);
        assert_eq!(HashTable::<Item>::with_capacity(100).capacity(), 101);
    }

    #[test]
    fn capacity_overflow_is_reported() {
        assert_eq!(
            HashTable::<Item>::try_with_capacity(usize::MAX).unwrap_err(),
            CapacityError::Overflow {
                requested: usize::MAX
            }
        );
    }

    #[test]
    fn grows_on_eighth_insert_into_eleven_slots() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(10);
        assert_eq!(table.capacity(), 11);

        for k in 0..7u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        assert_eq!(table.capacity(), 11);
        assert_eq!(table.filled, 7);

        insert_item(&mut table, hash_key(&state, 7), 7, 7);
        assert_eq!(table.capacity(), 23);
        assert_eq!(table.filled, 8);
        assert_eq!(table.len(), 8);
        assert_invariants(&table);

        for k in 0..8u64 {
            assert_eq!(
                table.find(hash_key(&state, k), |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: k as i32
                })
            );
        }
    }

    #[test]
    fn compaction_moves_value_into_tombstone() {
        let mut table: HashTable<Item> = HashTable::with_capacity(10);
        // 3 mod 11 = 3; 113 mod 11 = 3 and 113 mod 10 = 3, so the second
        // probe lands on (3 + 1 + 3) mod 11 = 7.
        insert_item(&mut table, 3, 1, 10);
        insert_item(&mut table, 113, 2, 20);
        assert_eq!(slot_of(&table, 1), Some(3));
        assert_eq!(slot_of(&table, 2), Some(7));

        assert_eq!(table.remove(3, |v| v.key == 1).map(|v| v.value), Some(10));
        assert!(matches!(table.buckets[3], Bucket::Tombstone));
        assert_eq!(table.len(), 1);
        assert_eq!(table.filled, 2);

        // A shared lookup finds it without moving anything.
        assert_eq!(table.find(113, |v| v.key == 2).map(|v| v.value), Some(20));
        assert_eq!(slot_of(&table, 2), Some(7));

        // A mutable lookup migrates it into the tombstone.
        assert_eq!(
            table.find_mut(113, |v| v.key == 2).map(|v| v.value),
            Some(20)
        );
        assert_eq!(slot_of(&table, 2), Some(3));
        assert!(matches!(table.buckets[7], Bucket::Tombstone));
        assert_eq!(table.len(), 1);
        assert_eq!(table.filled, 2);
        assert_invariants(&table);
    }

    #[test]
    fn insert_reuses_tombstone_without_growing_filled() {
        let mut table: HashTable<Item> = HashTable::with_capacity(10);
        insert_item(&mut table, 3, 1, 10);
        insert_item(&mut table, 113, 2, 20);
        table.remove(3, |v| v.key == 1);

        // Key 1 again: the probe stops at the tombstone in slot 3, scans on
        // to an empty slot without finding it, and inserts at slot 3.
        insert_item(&mut table, 3, 1, 11);
        assert_eq!(slot_of(&table, 1), Some(3));
        assert_eq!(table.filled, 2);
        assert_eq!(table.len(), 2);
        assert_invariants(&table);
    }

    #[test]
    fn remove_steps_over_tombstones() {
        let mut table: HashTable<Item> = HashTable::with_capacity(23);
        for k in 0..5u64 {
            insert_item(&mut table, 0, k, k as i32);
        }
        for k in 0..4u64 {
            assert!(table.remove(0, |v| v.key == k).is_some());
        }
        assert_eq!(table.remove(0, |v| v.key == 4).map(|v| v.value), Some(4));
        assert!(table.is_empty());
        assert_eq!(table.filled, 5);
        assert_invariants(&table);
    }

    #[test]
    fn removing_missing_value_changes_nothing() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(10);
        for k in 0..5u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        table.remove(hash_key(&state, 2), |v| v.key == 2);

        let before: Vec<Option<u64>> = table
            .buckets
            .iter()
            .map(|b| match b {
                Bucket::Occupied { value, .. } => Some(value.key),
                _ => None,
            })
            .collect();
        let (len, filled) = (table.len(), table.filled);

        assert!(table.remove(hash_key(&state, 99), |v| v.key == 99).is_none());
        assert!(table.remove(hash_key(&state, 2), |v| v.key == 2).is_none());

        let after: Vec<Option<u64>> = table
            .buckets
            .iter()
            .map(|b| match b {
                Bucket::Occupied { value, .. } => Some(value.key),
                _ => None,
            })
            .collect();
        assert_eq!(before, after);
        assert_eq!((table.len(), table.filled), (len, filled));
    }

    #[test]
    fn churn_on_one_key_accumulates_tombstones_until_growth() {
        let mut table: HashTable<Item> = HashTable::with_capacity(10);
        let mut capacities = vec![table.capacity()];
        for round in 0..20u64 {
            // Each round uses a different home slot so fresh slots fill up.
            insert_item(&mut table, round, round, 0);
            table.remove(round, |v| v.key == round);
            assert!(table.is_empty());
            assert_invariants(&table);
            if capacities.last() != Some(&table.capacity()) {
                capacities.push(table.capacity());
            }
        }
        // Only tombstones ever filled the table, yet it grew.
        assert!(capacities.len() > 1, "{capacities:?}");
        assert_eq!(capacities[1], 23);
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            insert_item(&mut table, hash, k, (k as i32) * 2);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
            assert_invariants(&table);
        }
        assert_eq!(table.len(), 32);

        let miss_hash = hash_key(&state, 999);
        assert!(table.find(miss_hash, |v| v.key == 999).is_none());
    }

    #[test]
    fn duplicate_entry_is_occupied() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        let k = 42u64;
        let hash = hash_key(&state, k);

        insert_item(&mut table, hash, k, 7);

        match table.entry(hash, |v| v.key == k) {
            Entry::Occupied(mut occ) => {
                let prev = occ.insert(Item { key: k, value: 11 });
                assert_eq!(prev.value, 7);
            }
            Entry::Vacant(_) => panic!("should be occupied: {k}#{hash:02X} in {table:#?}"),
        }
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(hash, |v| v.key == k).unwrap().value, 11);
    }

    #[test]
    fn find_mut_and_modify() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..5u64 {
            insert_item(&mut table, hash_key(&state, k), k, 1);
        }

        for k in 0..5u64 {
            if let Some(v) = table.find_mut(hash_key(&state, k), |v| v.key == k) {
                v.value += 9;
            }
        }
        for k in 0..5u64 {
            let v = table.find(hash_key(&state, k), |v| v.key == k).unwrap();
            assert_eq!(v.value, 10);
        }
    }

    #[test]
    fn remove_items() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..8u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        assert_eq!(table.len(), 8);
        for k in [0u64, 3, 7] {
            let removed = table
                .remove(hash_key(&state, k), |v| v.key == k)
                .expect("should remove");
            assert_eq!(removed.key, k);
        }
        assert_eq!(table.len(), 5);
        assert_invariants(&table);

        assert!(table.remove(hash_key(&state, 1000), |v| v.key == 1000).is_none());
    }

    #[test]
    fn reinsert_after_remove_across_tombstones() {
        let mut table: HashTable<Item> = HashTable::with_capacity(97);
        // One collision chain: every key starts at slot 0 with the same stride.
        for k in 0..30u64 {
            insert_item(&mut table, 0, k, k as i32);
        }
        for k in 0..29u64 {
            table.remove(0, |v| v.key == k);
        }
        assert!(table.find(0, |v| v.key == 29).is_some());

        insert_item(&mut table, 0, 5, 500);
        assert_eq!(table.find(0, |v| v.key == 5).map(|v| v.value), Some(500));
        assert_eq!(table.find(0, |v| v.key == 29).map(|v| v.value), Some(29));
        assert_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            insert_item(&mut table, hash, k, k as i32);
            assert!(!at_max_load(table.filled, table.capacity()));
        }

        assert_eq!(table.len(), 100000);
        assert_invariants(&table);
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: k as i32
                })
            );
        }
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        let hash = 0;
        for k in 0..65u64 {
            insert_item(&mut table, hash, k, k as i32);
        }

        assert_eq!(table.len(), 65);
        for k in 0..65u64 {
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: k as i32
                }),
                "{:#?}",
                table
            );
        }
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 10..20u64 {
            insert_item(&mut table, hash_key(&state, k), k, (k as i32) + 1);
        }
        table.remove(hash_key(&state, 15), |v| v.key == 15);

        let collected: Vec<u64> = table.iter().map(|v| v.key).collect();
        assert_eq!(collected.len(), 9, "{:#?}", table);
        assert_eq!(table.iter().len(), 9);
        for k in (10..20u64).filter(|&k| k != 15) {
            assert!(collected.contains(&k));
        }

        for v in table.iter_mut() {
            v.value = -v.value;
        }
        assert!(table.iter().all(|v| v.value < 0));

        let capacity = table.capacity();
        let drained: Vec<Item> = table.drain().collect();
        assert_eq!(drained.len(), 9);
        assert_eq!(table.len(), 0);
        assert_eq!(table.filled, 0);
        assert_eq!(table.capacity(), capacity);

        for k in 10..20u64 {
            assert!(table.find(hash_key(&state, k), |v| v.key == k).is_none());
        }
    }

    #[test]
    fn into_iter_yields_every_value() {
        let mut table: HashTable<u64> = HashTable::with_capacity(0);
        for n in 0..30u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }
        table.remove(7, |&v| v == 7);

        let iter = table.into_iter();
        assert_eq!(iter.len(), 29);
        let mut values: Vec<u64> = iter.collect();
        values.sort_unstable();
        assert_eq!(values, (0..30u64).filter(|&n| n != 7).collect::<Vec<_>>());
    }

    #[test]
    fn partial_drain_empties_table() {
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..10u64 {
            insert_item(&mut table, k, k, 0);
        }

        let mut drain = table.drain();
        assert!(drain.next().is_some());
        drop(drain);

        assert!(table.is_empty());
        assert_invariants(&table);
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct StringItem {
        key: String,
        value: i32,
    }

    fn hash_string_key(state: &HashState, key: &str) -> u64 {
        let mut h = state.build_hasher();
        h.write(key.as_bytes());
        h.finish()
    }

    #[test]
    fn insert_and_find_string_keys() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::with_capacity(0);
        let keys = ["hello", "world", "foo", "bar", "baz"];

        for (i, k) in keys.iter().enumerate() {
            let hash = hash_string_key(&state, k);
            table
                .entry(hash, |v: &StringItem| v.key == *k)
                .or_insert(StringItem {
                    key: k.to_string(),
                    value: i as i32,
                });
        }

        assert_eq!(table.len(), keys.len());

        for (i, k) in keys.iter().enumerate() {
            let hash = hash_string_key(&state, k);
            assert_eq!(
                table.find(hash, |v| v.key == *k),
                Some(&StringItem {
                    key: k.to_string(),
                    value: i as i32
                })
            );
        }

        let hash_c = hash_string_key(&state, "foo");
        let removed = table.remove(hash_c, |v| v.key == "foo").unwrap();
        assert_eq!(removed.value, 2);
        assert!(table.find(hash_c, |v| v.key == "foo").is_none());
    }

    #[test]
    fn entry_or_insert_with() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::with_capacity(0);
        let key = "unique_key";
        let hash = hash_string_key(&state, key);

        let value_ref = table
            .entry(hash, |v| v.key == key)
            .or_insert_with(|| StringItem {
                key: key.to_string(),
                value: 42,
            });
        assert_eq!(value_ref.value, 42);

        let existing_ref = table
            .entry(hash, |v| v.key == key)
            .or_insert_with(|| panic!("should not be called"));
        assert_eq!(existing_ref.value, 42);

        assert_eq!(
            table
                .entry(hash, |v| v.key == key)
                .and_modify(|v| v.value += 1)
                .map(|v| v.value),
            Some(43)
        );
        assert!(
            table
                .entry(0, |v| v.key == "absent")
                .and_modify(|v| v.value += 1)
                .is_none()
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entry_insert_returns_reference_after_growth() {
        let mut table: HashTable<u64> = HashTable::with_capacity(0);
        for n in 0..50u64 {
            let value = table.entry(n, |&v| v == n).or_insert(n);
            assert_eq!(*value, n);
            *value += 1000;
        }
        for n in 0..50u64 {
            assert_eq!(table.find(n, |&v| v == n + 1000), Some(&(n + 1000)));
        }
    }

    #[test]
    fn occupied_entry_remove_leaves_tombstone() {
        let mut table: HashTable<u64> = HashTable::with_capacity(10);
        table.entry(4, |&v| v == 4).or_insert(4);

        match table.entry(4, |&v| v == 4) {
            Entry::Occupied(entry) => assert_eq!(entry.remove(), 4),
            Entry::Vacant(_) => unreachable!(),
        }
        assert!(table.is_empty());
        assert_eq!(table.filled, 1);
        assert!(matches!(table.buckets[4], Bucket::Tombstone));
    }

    #[test]
    fn clear_keeps_capacity_and_drops_tombstones() {
        let mut table: HashTable<u64> = HashTable::with_capacity(10);
        for n in 0..5u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }
        table.remove(1, |&v| v == 1);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 11);
        assert_eq!(table.filled, 0);
        assert_invariants(&table);
    }

    #[test]
    fn clear_with_capacity_reallocates_at_prime() {
        let mut table: HashTable<u64> = HashTable::with_capacity(10);
        for n in 0..5u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }

        table.clear_with_capacity(50);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 53);
        assert_invariants(&table);

        table.entry(3, |&v| v == 3).or_insert(3);
        let err = table.try_clear_with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(err, CapacityError::Overflow { .. }));
        assert_eq!(table.len(), 1);
        assert_eq!(table.capacity(), 53);
    }

    #[test]
    fn reserve_avoids_growth() {
        let mut table: HashTable<u64> = HashTable::with_capacity(0);
        table.reserve(1000);
        let capacity = table.capacity();
        assert!(is_prime(capacity as u64));
        for n in 0..1000u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }
        assert_eq!(table.capacity(), capacity);
        assert_invariants(&table);
    }

    #[test]
    fn reserve_drops_tombstones_before_growing() {
        let mut table: HashTable<u64> = HashTable::with_capacity(100);
        for n in 0..60u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }
        for n in 0..50u64 {
            table.remove(n, |&v| v == n);
        }
        assert_eq!(table.filled, 60);

        table.reserve(20);
        assert_eq!(table.capacity(), 101);
        assert_eq!(table.filled, 10);
        assert_invariants(&table);
    }

    #[test]
    fn shrink_to_fit() {
        let mut table: HashTable<u64> = HashTable::with_capacity(1000);
        for n in 0..10u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }
        table.remove(0, |&v| v == 0);

        table.shrink_to_fit();
        // 9 values need more than 9 / 0.7 slots: 13 is the next prime.
        assert_eq!(table.capacity(), 13);
        assert_eq!(table.filled, 9);
        assert_invariants(&table);
        for n in 1..10u64 {
            assert_eq!(table.find(n, |&v| v == n), Some(&n));
        }

        let mut empty: HashTable<u64> = HashTable::with_capacity(1000);
        empty.shrink_to_fit();
        assert_eq!(empty.capacity(), 2);
    }

    #[test]
    fn retain_tombstones_rejected_values() {
        let mut table: HashTable<u64> = HashTable::with_capacity(0);
        for n in 0..20u64 {
            table.entry(n, |&v| v == n).or_insert(n);
        }
        table.retain(|v| *v % 2 == 0);

        assert_eq!(table.len(), 10);
        assert_eq!(table.filled, 20);
        assert_invariants(&table);
        for n in 0..20u64 {
            assert_eq!(table.find(n, |&v| v == n).is_some(), n % 2 == 0);
        }
    }

    struct Tracked {
        key: u64,
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn values_are_dropped_exactly_once() {
        let drops = Rc::new(Cell::new(0));
        let tracked = |key| Tracked {
            key,
            drops: drops.clone(),
        };

        let mut table: HashTable<Tracked> = HashTable::with_capacity(0);
        for k in 0..40u64 {
            table.entry(k, |t| t.key == k).or_insert(tracked(k));
        }
        assert_eq!(drops.get(), 0, "growth must move values, not drop them");

        // Overwrite drops the previous value once.
        match table.entry(3, |t| t.key == 3) {
            Entry::Occupied(mut entry) => drop(entry.insert(tracked(3))),
            Entry::Vacant(_) => unreachable!(),
        }
        assert_eq!(drops.get(), 1);

        drop(table.remove(4, |t| t.key == 4));
        assert_eq!(drops.get(), 2);

        table.retain(|t| t.key != 5);
        assert_eq!(drops.get(), 3);

        // 3 dropped so far plus the 38 still live.
        table.clear_with_capacity(10);
        assert_eq!(drops.get(), 41);

        for k in 0..5u64 {
            table.entry(k, |t| t.key == k).or_insert(tracked(k));
        }
        drop(table);
        assert_eq!(drops.get(), 46);
    }

    #[test]
    fn test_clone() {
        let state = HashState::default();
        let mut original: HashTable<StringItem> = HashTable::with_capacity(10);
        for (i, key) in ["hello", "world", "rust"].iter().enumerate() {
            original
                .entry(hash_string_key(&state, key), |v| v.key == *key)
                .or_insert(StringItem {
                    key: key.to_string(),
                    value: i as i32,
                });
        }
        original.remove(hash_string_key(&state, "world"), |v| v.key == "world");

        let mut cloned = original.clone();
        assert_eq!(cloned.len(), original.len());
        assert_eq!(cloned.filled, original.filled);

        cloned
            .find_mut(hash_string_key(&state, "rust"), |v| v.key == "rust")
            .unwrap()
            .value = 100;
        assert_eq!(
            original
                .find(hash_string_key(&state, "rust"), |v| v.key == "rust")
                .unwrap()
                .value,
            2
        );
    }

    #[test]
    fn probe_histogram_counts_every_value() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..500u64 {
            insert_item(&mut table, hash_key(&state, k), k, 0);
        }

        let histogram = table.probe_histogram();
        assert_eq!(histogram.total(), 500);

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 500);
        assert_eq!(stats.tombstones, 0);
        assert!(stats.load_factor < 0.7);
        assert_eq!(stats.max_probe_length + 1, histogram.counts().len());
    }

    #[test]
    fn colliding_chain_has_linear_probe_lengths() {
        let mut table: HashTable<Item> = HashTable::with_capacity(23);
        for k in 0..4u64 {
            insert_item(&mut table, 0, k, 0);
        }
        assert_eq!(table.probe_histogram().counts(), &[1, 1, 1, 1]);
    }
}
