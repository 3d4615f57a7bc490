use crate::{DbType, Direction, Result, Size, Value};
use futures::executor::block_on;
use std::{future::Future, sync::Arc};

/// How the statement text of a command is interpreted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// A plain statement batch.
    Text,
    /// The name of a stored routine.
    StoredProcedure,
}

/// One bound parameter of a command: the name/type/size/direction quadruple
/// derived from a column descriptor plus the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub db_type: DbType,
    pub size: Option<Size>,
    pub direction: Direction,
    pub value: Value,
}

/// Shared reference-counted column name list of a result record.
pub type RowNames = Arc<[String]>;
/// Owned value slice aligned with a `RowNames` by index.
pub type Row = Box<[Value]>;

/// A result record with its column labels.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

/// The command boundary implemented by database backends.
///
/// A command owns its statement text, kind and bound-parameter collection.
/// The engine drives it through a fixed protocol: parameters are bound once,
/// written before every execution, and output values are read back after the
/// execution completes (for record-returning executions: after the cursor is
/// released, since backends do not materialize output parameters while a read
/// cursor is open).
///
/// Every I/O method has an async form and a `_blocking` counterpart; the
/// blocking forms simply drive the future to completion on the current
/// thread. Cancellation is the ordinary drop of the in-flight future; this
/// layer adds no cancellation state of its own.
pub trait Command: Send {
    type Cursor: Cursor;

    fn text(&self) -> &str;
    fn kind(&self) -> StatementKind;

    /// Append a parameter to the bound collection.
    fn add_parameter(&mut self, parameter: Parameter) -> Result<()>;
    /// Current value of a bound parameter.
    fn parameter_value(&self, name: &str) -> Result<Value>;
    /// Set the value of a bound parameter.
    fn set_parameter(&mut self, name: &str, value: Value) -> Result<()>;

    /// Non-query execution; returns the affected row count.
    fn execute(&mut self) -> impl Future<Output = Result<u64>> + Send;
    /// Scalar execution; returns the first value of the first record.
    fn execute_scalar(&mut self) -> impl Future<Output = Result<Value>> + Send;
    /// Record-returning execution; opens a read cursor.
    fn execute_reader(&mut self) -> impl Future<Output = Result<Self::Cursor>> + Send;

    fn execute_blocking(&mut self) -> Result<u64> {
        block_on(self.execute())
    }
    fn execute_scalar_blocking(&mut self) -> Result<Value> {
        block_on(self.execute_scalar())
    }
    fn execute_reader_blocking(&mut self) -> Result<Self::Cursor> {
        block_on(self.execute_reader())
    }
}

/// An open read cursor over an ordered, finite sequence of result sets.
///
/// Owned exclusively by its consumer and not restartable. `close` must be
/// called (the reader layer guarantees it) so the backend can materialize
/// output parameters.
pub trait Cursor: Send {
    /// Next record of the current result set, `None` when it is exhausted.
    fn next_record(&mut self) -> impl Future<Output = Result<Option<RowLabeled>>> + Send;
    /// Advance to the next result set; `false` when there is none.
    fn next_result(&mut self) -> impl Future<Output = Result<bool>> + Send;
    /// Release the cursor. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn next_record_blocking(&mut self) -> Result<Option<RowLabeled>> {
        block_on(self.next_record())
    }
    fn next_result_blocking(&mut self) -> Result<bool> {
        block_on(self.next_result())
    }
    fn close_blocking(&mut self) -> Result<()> {
        block_on(self.close())
    }
}

/// The connection boundary implemented by database backends.
///
/// The engine never parallelizes work over one connection: a connection
/// processes one command/cursor at a time, and callers needing parallelism
/// use independent connections.
pub trait Connection: Send {
    type Command: Command;

    /// Create a command over this connection.
    fn command(&mut self, text: &str, kind: StatementKind) -> Result<Self::Command>;

    /// Establish an inner rollback boundary inside the ambient transaction.
    fn savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    /// Undo everything since the named savepoint, leaving the ambient
    /// transaction usable.
    fn rollback_to(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    /// Discard the named savepoint, keeping its effects.
    fn release_savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    fn savepoint_blocking(&mut self, name: &str) -> Result<()> {
        block_on(self.savepoint(name))
    }
    fn rollback_to_blocking(&mut self, name: &str) -> Result<()> {
        block_on(self.rollback_to(name))
    }
    fn release_savepoint_blocking(&mut self, name: &str) -> Result<()> {
        block_on(self.release_savepoint(name))
    }
}
