use crate::{
    Column, Command, Connection, Cursor, Error, Result, RowAccessor, StatementKind, sql,
};
use futures::executor::block_on;
use std::sync::Arc;

/// Name of the rollback boundary every key-addressed update/delete takes
/// before its statement, so an ambiguous match can be undone without
/// aborting the ambient transaction.
const KEY_GUARD: &str = "marrow_key_guard";

fn require_keyed<R: 'static>(accessor: &RowAccessor<R>) -> Result<()> {
    if accessor.table().is_none() {
        return Err(Error::configuration(
            "entity operations require a table identity",
        ));
    }
    if accessor.keys().is_empty() {
        return Err(Error::configuration(
            "entity operations require declared key columns",
        ));
    }
    Ok(())
}

fn write_values<'a, R: 'static, C: Command>(
    command: &mut C,
    columns: impl IntoIterator<Item = &'a Arc<Column<R>>>,
    instance: &R,
) -> Result<()> {
    for column in columns {
        command.set_parameter(column.name(), column.to_db(instance)?)?;
    }
    Ok(())
}

impl<R: 'static> RowAccessor<R> {
    /// Prepare a reusable select-by-key operation.
    pub fn select_by_key<C: Connection>(
        self: &Arc<Self>,
        connection: &mut C,
    ) -> Result<SelectByKey<R, C::Command>> {
        require_keyed(self)?;
        if self.columns().len() == self.keys().len() {
            return Err(Error::configuration(
                "select by key needs at least one non-key column to transfer",
            ));
        }
        let mut text = String::with_capacity(256);
        sql::write_select_by_key(&mut text, self);
        let mut command = connection.command(&text, StatementKind::Text)?;
        for column in self.key_columns() {
            command.add_parameter(column.parameter())?;
        }
        Ok(SelectByKey {
            accessor: self.clone(),
            command,
        })
    }

    /// Prepare a reusable insert operation. Computed columns are never sent.
    pub fn insert<C: Connection>(
        self: &Arc<Self>,
        connection: &mut C,
    ) -> Result<Insert<R, C::Command>> {
        if self.table().is_none() {
            return Err(Error::configuration(
                "entity operations require a table identity",
            ));
        }
        let mut text = String::with_capacity(256);
        sql::write_insert(&mut text, self);
        let mut command = connection.command(&text, StatementKind::Text)?;
        for column in self.columns().iter().filter(|v| !v.descriptor().computed) {
            command.add_parameter(column.parameter())?;
        }
        Ok(Insert {
            accessor: self.clone(),
            command,
        })
    }

    /// Prepare a reusable update-by-key operation.
    pub fn update_by_key<C: Connection>(
        self: &Arc<Self>,
        connection: &mut C,
    ) -> Result<UpdateByKey<R, C::Command>> {
        require_keyed(self)?;
        if !self
            .columns()
            .iter()
            .any(|v| !v.descriptor().computed && !self.is_key(v.descriptor().member))
        {
            return Err(Error::configuration(
                "update by key needs at least one settable non-key column",
            ));
        }
        let mut text = String::with_capacity(256);
        sql::write_update_by_key(&mut text, self);
        let mut command = connection.command(&text, StatementKind::Text)?;
        for column in self.columns().iter().filter(|v| !v.descriptor().computed) {
            command.add_parameter(column.parameter())?;
        }
        Ok(UpdateByKey {
            accessor: self.clone(),
            command,
        })
    }

    /// Prepare a reusable delete-by-key operation.
    pub fn delete_by_key<C: Connection>(
        self: &Arc<Self>,
        connection: &mut C,
    ) -> Result<DeleteByKey<R, C::Command>> {
        require_keyed(self)?;
        let mut text = String::with_capacity(128);
        sql::write_delete_by_key(&mut text, self);
        let mut command = connection.command(&text, StatementKind::Text)?;
        for column in self.key_columns() {
            command.add_parameter(column.parameter())?;
        }
        Ok(DeleteByKey {
            accessor: self.clone(),
            command,
        })
    }
}

/// Prepared `SELECT ... WHERE <key>` bound to one accessor. Executed
/// repeatedly with different instances.
pub struct SelectByKey<R, C: Command> {
    accessor: Arc<RowAccessor<R>>,
    command: C,
}

impl<R: 'static, C: Command> std::fmt::Debug for SelectByKey<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectByKey")
            .field("accessor", &self.accessor)
            .finish_non_exhaustive()
    }
}

impl<R: 'static, C: Command> SelectByKey<R, C> {
    /// Filter on the instance's key values and transfer the matched non-key
    /// values into it. Returns whether a row was found; zero matches is
    /// `false`, not an error.
    pub async fn execute(&mut self, instance: &mut R) -> Result<bool> {
        write_values(&mut self.command, self.accessor.key_columns(), instance)?;
        let mut cursor = self.command.execute_reader().await?;
        let record = match cursor.next_record().await {
            Ok(v) => v,
            Err(e) => {
                let _ = cursor.close().await;
                return Err(e);
            }
        };
        cursor.close().await?;
        match record {
            Some(record) => {
                self.accessor.read_record(&record, instance)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn execute_blocking(&mut self, instance: &mut R) -> Result<bool> {
        block_on(self.execute(instance))
    }
}

/// Prepared `INSERT` of every non-computed column.
pub struct Insert<R, C: Command> {
    accessor: Arc<RowAccessor<R>>,
    command: C,
}

impl<R: 'static, C: Command> Insert<R, C> {
    pub async fn execute(&mut self, instance: &R) -> Result<u64> {
        write_values(
            &mut self.command,
            self.accessor.columns().iter().filter(|v| !v.descriptor().computed),
            instance,
        )?;
        self.command.execute().await
    }

    pub fn execute_blocking(&mut self, instance: &R) -> Result<u64> {
        block_on(self.execute(instance))
    }
}

/// Prepared `UPDATE ... WHERE <key>` with the ambiguous-match guard.
pub struct UpdateByKey<R, C: Command> {
    accessor: Arc<RowAccessor<R>>,
    command: C,
}

impl<R: 'static, Cmd: Command> UpdateByKey<R, Cmd> {
    /// Update the row addressed by the instance's key. Returns whether a row
    /// was applied. An affected count other than 0 or 1 raises
    /// [`Error::AmbiguousKey`] after rolling the statement back, leaving the
    /// ambient transaction usable.
    pub async fn execute<C>(&mut self, connection: &mut C, instance: &R) -> Result<bool>
    where
        C: Connection<Command = Cmd>,
    {
        write_values(
            &mut self.command,
            self.accessor.columns().iter().filter(|v| !v.descriptor().computed),
            instance,
        )?;
        guarded_execute(connection, &mut self.command).await
    }

    pub fn execute_blocking<C>(&mut self, connection: &mut C, instance: &R) -> Result<bool>
    where
        C: Connection<Command = Cmd>,
    {
        block_on(self.execute(connection, instance))
    }
}

/// Prepared `DELETE ... WHERE <key>` with the ambiguous-match guard.
pub struct DeleteByKey<R, C: Command> {
    accessor: Arc<RowAccessor<R>>,
    command: C,
}

impl<R: 'static, C: Command> std::fmt::Debug for DeleteByKey<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteByKey")
            .field("accessor", &self.accessor)
            .finish_non_exhaustive()
    }
}

impl<R: 'static, Cmd: Command> DeleteByKey<R, Cmd> {
    /// Delete the row addressed by the instance's key; same contract as
    /// [`UpdateByKey::execute`].
    pub async fn execute<C>(&mut self, connection: &mut C, instance: &R) -> Result<bool>
    where
        C: Connection<Command = Cmd>,
    {
        write_values(&mut self.command, self.accessor.key_columns(), instance)?;
        guarded_execute(connection, &mut self.command).await
    }

    pub fn execute_blocking<C>(&mut self, connection: &mut C, instance: &R) -> Result<bool>
    where
        C: Connection<Command = Cmd>,
    {
        block_on(self.execute(connection, instance))
    }
}

/// Run a key-addressed statement inside its own rollback boundary and map
/// the affected count to found/not-found, undoing the statement when the key
/// filter matched more than one row.
async fn guarded_execute<C: Connection>(
    connection: &mut C,
    command: &mut C::Command,
) -> Result<bool> {
    connection.savepoint(KEY_GUARD).await?;
    let affected = command.execute().await;
    match affected {
        Ok(0) => {
            connection.release_savepoint(KEY_GUARD).await?;
            Ok(false)
        }
        Ok(1) => {
            connection.release_savepoint(KEY_GUARD).await?;
            Ok(true)
        }
        Ok(affected) => {
            connection.rollback_to(KEY_GUARD).await?;
            let error = Error::AmbiguousKey { affected };
            log::error!("{error}; the statement was rolled back to its savepoint");
            Err(error)
        }
        Err(error) => {
            let _ = connection.rollback_to(KEY_GUARD).await;
            Err(error)
        }
    }
}
