//! Read-only access to Jet 3 / Jet 4 / ACE desktop database files.
//!
//! The whole file is held in memory and decoded page by page:
//!
//! ```no_run
//! let db = jet_reader::Database::open("rental.mdb")?;
//! for name in db.table_names() {
//!     let table = db.table(name)?;
//!     println!("{name}: {:?}", table.column_names());
//! }
//! # Ok::<(), jet_reader::JetError>(())
//! ```

mod bytes;
mod column;
mod database;
mod error;
mod format;
mod pages;
mod record;
mod table;
mod text;
mod value;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use column::{Column, ColumnType};
pub use database::Database;
pub use error::{JetError, Result};
pub use format::JetVersion;
pub use table::{Rows, Table};
pub use value::Value;
