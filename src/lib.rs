#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// The error returned when a table cannot be given a new cell array.
pub mod error;

/// A HashMap implementation on top of the double-hashing table.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

/// A hash set implementation on top of the double-hashing table.
///
/// This module provides a `HashSet` that wraps the `HashTable` and provides
/// a standard set interface with configurable hashers.
pub mod hash_set;

pub mod hash_table;

pub mod primes;

pub use error::CapacityError;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use hash_table::HashTable;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by `HashMap` and `HashSet` when none is
        /// given.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by `HashMap` and `HashSet` when none is
        /// given.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder for the default hasher builder when neither the
        /// `foldhash` nor the `std` feature is enabled.
        ///
        /// It has no values, so maps and sets must be constructed with an
        /// explicit hasher builder.
        #[derive(Clone, Copy, Debug)]
        pub enum DefaultHashBuilder {}

        impl core::hash::BuildHasher for DefaultHashBuilder {
            type Hasher = NoHasher;

            fn build_hasher(&self) -> Self::Hasher {
                match *self {}
            }
        }

        /// The hasher of the uninhabited [`DefaultHashBuilder`].
        #[derive(Clone, Copy, Debug)]
        pub enum NoHasher {}

        impl core::hash::Hasher for NoHasher {
            fn finish(&self) -> u64 {
                match *self {}
            }

            fn write(&mut self, _bytes: &[u8]) {
                match *self {}
            }
        }
    }
}
