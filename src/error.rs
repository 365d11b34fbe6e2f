use thiserror::Error;

/// The error type for operations that allocate a new cell array.
///
/// When one of these is returned the table is left exactly as it was before
/// the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// No prime slot count at or above `requested` fits in a `usize`.
    #[error("no prime capacity >= {requested} is representable")]
    Overflow {
        /// The slot count that was asked for.
        requested: usize,
    },
    /// The allocator could not provide an array of `capacity` cells.
    #[error("failed to allocate {capacity} cells")]
    Alloc {
        /// The prime slot count that could not be allocated.
        capacity: usize,
    },
}
