//! Helpers for tests of code that stores datasets.
//!
//! - **Assertions**: compare read-back arrays with what was written
//! - **Fixtures**: datasets that exercise string offsets, mixed types and
//!   uneven splits
//!
//! ```
//! use ironshard::testing::*;
//!
//! let data = dict_columns(10);
//! assert_eq!(data.len(), 4);
//! assert_same_collection(&data, &dict_columns(10));
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
