use crate::{Command, Cursor, Error, Record, Result, RowAccessor};
use async_stream::try_stream;
use futures::{Stream, executor::block_on};
use std::sync::Arc;

/// Reader over the result sets of one record-returning execution.
///
/// The reader owns the open cursor and walks an ordered, finite sequence of
/// result sets; it is not restartable. It starts on result set 0 with
/// [`has_more_results`](Self::has_more_results) true; when the rows of the
/// current set are naturally exhausted it advances the cursor, and
/// `has_more_results` reflects whether the advance found another set.
/// Requesting rows once it did not is an [`Error::InvalidOperation`].
///
/// Output parameters are not materialized by backends while a cursor is
/// open, so the parameter commit of the execution is deferred: it happens
/// exactly once, inside [`release`](Self::release). Release is mandatory and
/// idempotent; nothing commits after it. Prefer [`with_reader`], which
/// guarantees release on every path; a reader dropped without release logs a
/// warning and loses its output parameters.
pub struct RecordReader<'c, C: Command, P> {
    command: &'c mut C,
    params: Arc<RowAccessor<P>>,
    cursor: Option<C::Cursor>,
    result_index: usize,
    has_more: bool,
    released: bool,
}

impl<'c, C: Command, P: 'static> RecordReader<'c, C, P> {
    /// Write the input parameters of `instance` and open the cursor.
    pub async fn open(
        command: &'c mut C,
        params: &Arc<RowAccessor<P>>,
        instance: &P,
    ) -> Result<RecordReader<'c, C, P>> {
        params.write_parameters(command, instance)?;
        let cursor = command.execute_reader().await?;
        Ok(Self {
            command,
            params: params.clone(),
            cursor: Some(cursor),
            result_index: 0,
            has_more: true,
            released: false,
        })
    }

    pub fn open_blocking(
        command: &'c mut C,
        params: &Arc<RowAccessor<P>>,
        instance: &P,
    ) -> Result<RecordReader<'c, C, P>> {
        block_on(Self::open(command, params, instance))
    }

    /// Whether a result set is still available.
    pub fn has_more_results(&self) -> bool {
        self.has_more
    }

    /// Index of the current result set, starting at 0.
    pub fn result_index(&self) -> usize {
        self.result_index
    }

    fn ensure_active(&self) -> Result<()> {
        if self.released {
            Err(Error::invalid_operation(
                "the reader has been released and cannot produce rows",
            ))
        } else if !self.has_more || self.cursor.is_none() {
            Err(Error::invalid_operation(
                "the reader is exhausted: every result set has been consumed",
            ))
        } else {
            Ok(())
        }
    }

    async fn advance(&mut self) -> Result<()> {
        if let Some(cursor) = self.cursor.as_mut() {
            self.has_more = cursor.next_result().await?;
            if self.has_more {
                self.result_index += 1;
            }
        }
        Ok(())
    }

    /// Read the next record of the current result set into `instance`.
    /// Returns `false` (after advancing the cursor to the next result set)
    /// when the current set is exhausted.
    async fn fetch_into<Q: 'static>(&mut self, accessor: &RowAccessor<Q>, instance: &mut Q) -> Result<bool> {
        self.ensure_active()?;
        let record = match self.cursor.as_mut() {
            Some(cursor) => cursor.next_record().await?,
            None => None,
        };
        match record {
            Some(record) => {
                accessor.read_record(&record, instance)?;
                Ok(true)
            }
            None => {
                self.advance().await?;
                Ok(false)
            }
        }
    }

    /// Pull one row of the current result set, or `None` when the set is
    /// exhausted (auto-advancing to the next one).
    pub async fn next_row<Q: Record + Default>(
        &mut self,
        accessor: &RowAccessor<Q>,
    ) -> Result<Option<Q>> {
        let mut instance = Q::default();
        Ok(self
            .fetch_into(accessor, &mut instance)
            .await?
            .then_some(instance))
    }

    pub fn next_row_blocking<Q: Record + Default>(
        &mut self,
        accessor: &RowAccessor<Q>,
    ) -> Result<Option<Q>> {
        block_on(self.next_row(accessor))
    }

    /// The lazy row sequence of the current result set.
    pub fn rows<'r, Q: Record + Default>(
        &'r mut self,
        accessor: &'r RowAccessor<Q>,
    ) -> impl Stream<Item = Result<Q>> + Send + 'r
    where
        P: Send,
    {
        try_stream! {
            while let Some(row) = self.next_row(accessor).await? {
                yield row;
            }
        }
    }

    /// Push-based consumption of the current result set, one callback per
    /// row. Returns the number of rows visited.
    ///
    /// With `reuse` a single instance is reassigned for every row, an
    /// explicit performance opt-in: the callback must not retain data past
    /// its synchronous extent, and fields missing from a record keep the
    /// previous row's values.
    pub async fn for_each<Q: Record + Default>(
        &mut self,
        accessor: &RowAccessor<Q>,
        reuse: bool,
        mut callback: impl FnMut(&Q) -> Result<()>,
    ) -> Result<u64> {
        let mut visited = 0;
        let mut shared = Q::default();
        loop {
            if reuse {
                if !self.fetch_into(accessor, &mut shared).await? {
                    break;
                }
                callback(&shared)?;
            } else {
                let Some(row) = self.next_row(accessor).await? else {
                    break;
                };
                callback(&row)?;
            }
            visited += 1;
        }
        Ok(visited)
    }

    pub fn for_each_blocking<Q: Record + Default>(
        &mut self,
        accessor: &RowAccessor<Q>,
        reuse: bool,
        callback: impl FnMut(&Q) -> Result<()>,
    ) -> Result<u64> {
        block_on(self.for_each(accessor, reuse, callback))
    }

    /// Close the cursor and run the deferred output-parameter commit into
    /// `instance`. Idempotent: only the first call commits.
    pub async fn release(&mut self, instance: &mut P) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.has_more = false;
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close().await?;
        }
        self.params.read_parameters(self.command, instance)
    }

    pub fn release_blocking(&mut self, instance: &mut P) -> Result<()> {
        block_on(self.release(instance))
    }
}

impl<C: Command, P> Drop for RecordReader<'_, C, P> {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "record reader dropped without release: output parameters were not committed",
            );
        }
    }
}

/// Scoped record-returning execution: opens a reader, hands it to `scope` and
/// releases it on both the success and the error path, so the deferred
/// parameter commit is never skipped.
pub async fn with_reader<'c, C: Command, P: 'static, T>(
    command: &'c mut C,
    params: &Arc<RowAccessor<P>>,
    instance: &mut P,
    scope: impl AsyncFnOnce(&mut RecordReader<'c, C, P>) -> Result<T>,
) -> Result<T> {
    let mut reader = RecordReader::open(command, params, &*instance).await?;
    let result = scope(&mut reader).await;
    let released = reader.release(instance).await;
    let value = result?;
    released?;
    Ok(value)
}

/// Blocking form of [`with_reader`]; the scope uses the `_blocking` methods
/// of the reader.
pub fn with_reader_blocking<'c, C: Command, P: 'static, T>(
    command: &'c mut C,
    params: &Arc<RowAccessor<P>>,
    instance: &mut P,
    scope: impl FnOnce(&mut RecordReader<'c, C, P>) -> Result<T>,
) -> Result<T> {
    let mut reader = RecordReader::open_blocking(command, params, &*instance)?;
    let result = scope(&mut reader);
    let released = reader.release_blocking(instance);
    let value = result?;
    released?;
    Ok(value)
}
