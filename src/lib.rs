//! Marrow binds statically typed records to the untyped, name/ordinal
//! addressed parameter and result-set protocol of SQL commands.
//!
//! Declare a [`Record`] mapping once, let the [`Context`] compile and cache
//! its [`RowAccessor`], then move data through commands with
//! [`RowAccessor::write_parameters`], [`RecordReader`] and the key-based
//! entity operations.

pub use marrow_core::*;
