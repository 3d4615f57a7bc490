use crate::{
    Column, ColumnOptions, Command, Convert, DbType, DbValue, Direction, Error, Result, RowLabeled,
    Value,
    context::ContextInner,
    convert::{Bridged, Direct, ErasedConvert},
    descriptor::resolve,
};
use std::{any, collections::HashSet, sync::Arc};

/// A row type registered with the engine.
///
/// `mapping` is the explicit declaration step: it names the table identity,
/// the key members and every column of the type. It runs at most once per
/// process, when the [`Context`](crate::Context) first compiles the accessor.
pub trait Record: Send + Sized + 'static {
    fn mapping() -> RowMapping<Self>;
}

type Pending<R> = Box<dyn FnOnce(&mut ContextInner) -> Result<Column<R>> + Send>;

/// Declaration builder of a row type: table identity, key members, structured
/// type name and the column registrations.
///
/// Column registration comes in families. `column`/`column_opt` bind members
/// whose type is a primitive database value, `convert`/`convert_opt` bind
/// through an explicit [`Convert`] implementation, `mapped`/`mapped_opt` pick
/// up the converter registered for the member type in the context, `readonly`
/// binds a member that can be read but not assigned, and `table_valued`
/// encodes a sequence of records as one structured parameter.
pub struct RowMapping<R> {
    table: Option<&'static str>,
    keys: Vec<&'static str>,
    structured: Option<&'static str>,
    pending: Vec<Pending<R>>,
}

impl<R: Send + 'static> RowMapping<R> {
    pub fn new() -> Self {
        Self {
            table: None,
            keys: Vec::new(),
            structured: None,
            pending: Vec::new(),
        }
    }

    /// Qualified table or view identity, e.g. `"dbo.users"`.
    pub fn table(mut self, name: &'static str) -> Self {
        self.table = Some(name);
        self
    }

    /// Key member names. Only valid together with a table identity.
    pub fn keys(mut self, keys: &[&'static str]) -> Self {
        self.keys = keys.to_vec();
        self
    }

    /// Structured type name, required to use the row type as the element of a
    /// table-valued parameter.
    pub fn structured(mut self, type_name: &'static str) -> Self {
        self.structured = Some(type_name);
        self
    }

    pub fn column<M: DbValue>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> M + Send + Sync + 'static,
        set: impl Fn(&mut R, M) + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |_| {
            let descriptor = resolve(member, false, &options, M::compatible(), None)?;
            Ok(Column::compile(
                descriptor,
                Arc::new(Direct::<M>::new()),
                move |instance| Some(get(instance)),
                Some(Box::new(move |instance, value| {
                    // The pipeline filters NULL before reaching a non nullable setter.
                    if let Some(value) = value {
                        set(instance, value);
                    }
                })),
            ))
        }));
        self
    }

    pub fn column_opt<M: DbValue>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> Option<M> + Send + Sync + 'static,
        set: impl Fn(&mut R, Option<M>) + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |_| {
            let descriptor = resolve(member, true, &options, M::compatible(), None)?;
            Ok(Column::compile(
                descriptor,
                Arc::new(Direct::<M>::new()),
                get,
                Some(Box::new(set)),
            ))
        }));
        self
    }

    /// A column whose member cannot be assigned: it supports the to-database
    /// pipeline only.
    pub fn readonly<M: DbValue>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> M + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |_| {
            let descriptor = resolve(member, false, &options, M::compatible(), None)?;
            Ok(Column::compile(
                descriptor,
                Arc::new(Direct::<M>::new()),
                move |instance| Some(get(instance)),
                None,
            ))
        }));
        self
    }

    pub fn convert<C: Convert>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> C::Member + Send + Sync + 'static,
        set: impl Fn(&mut R, C::Member) + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |inner| {
            let descriptor = resolve(
                member,
                false,
                &options,
                <C::Stored as DbValue>::compatible(),
                C::DB_TYPE,
            )?;
            Ok(Column::compile(
                descriptor,
                Arc::new(Bridged(inner.converter::<C>())),
                move |instance| Some(get(instance)),
                Some(Box::new(move |instance, value| {
                    if let Some(value) = value {
                        set(instance, value);
                    }
                })),
            ))
        }));
        self
    }

    pub fn convert_opt<C: Convert>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> Option<C::Member> + Send + Sync + 'static,
        set: impl Fn(&mut R, Option<C::Member>) + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |inner| {
            let descriptor = resolve(
                member,
                true,
                &options,
                <C::Stored as DbValue>::compatible(),
                C::DB_TYPE,
            )?;
            Ok(Column::compile(
                descriptor,
                Arc::new(Bridged(inner.converter::<C>())),
                get,
                Some(Box::new(set)),
            ))
        }));
        self
    }

    /// Bind through the converter registered for `M` in the context. Fails at
    /// construction when no mapping exists for the member type.
    pub fn mapped<M: Clone + Send + Sync + 'static>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> M + Send + Sync + 'static,
        set: impl Fn(&mut R, M) + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |inner| {
            let convert = registered_converter::<M>(inner, member)?;
            let descriptor = resolve(
                member,
                false,
                &options,
                convert.compatible(),
                convert.declared_db_type(),
            )?;
            Ok(Column::compile(
                descriptor,
                convert,
                move |instance| Some(get(instance)),
                Some(Box::new(move |instance, value| {
                    if let Some(value) = value {
                        set(instance, value);
                    }
                })),
            ))
        }));
        self
    }

    pub fn mapped_opt<M: Clone + Send + Sync + 'static>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl Fn(&R) -> Option<M> + Send + Sync + 'static,
        set: impl Fn(&mut R, Option<M>) + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |inner| {
            let convert = registered_converter::<M>(inner, member)?;
            let descriptor = resolve(
                member,
                true,
                &options,
                convert.compatible(),
                convert.declared_db_type(),
            )?;
            Ok(Column::compile(descriptor, convert, get, Some(Box::new(set))))
        }));
        self
    }

    /// Encode a sequence of `E` records as one structured parameter.
    ///
    /// `E` must declare a structured type name and contiguous ordinals
    /// starting at 0; both are validated here, at construction. Structured
    /// columns are input only and carry no converter.
    pub fn table_valued<E: Record>(
        mut self,
        member: &'static str,
        options: ColumnOptions,
        get: impl for<'a> Fn(&'a R) -> Option<&'a [E]> + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |inner| {
            if options.direction != Direction::Input {
                return Err(Error::configuration(format!(
                    "structured column `{member}` must be an input parameter",
                )));
            }
            if options.db_type.is_some_and(|v| v != DbType::Structured) {
                return Err(Error::configuration(format!(
                    "`{member}` carries a sequence of records and can only be Structured",
                )));
            }
            if options.size.is_some() {
                return Err(Error::configuration(format!(
                    "structured column `{member}` must not declare a size",
                )));
            }
            let element = inner.accessor::<E>()?;
            // Validates the structured type name and the ordinal layout.
            element.structured_columns()?;
            let descriptor = crate::ColumnDescriptor {
                member,
                name: options.name.unwrap_or(member),
                db_type: DbType::Structured,
                size: None,
                nullable: true,
                direction: Direction::Input,
                ordinal: options.ordinal,
                computed: options.computed,
            };
            let to_db: Box<dyn Fn(&R) -> Result<Value> + Send + Sync> =
                Box::new(move |instance| match get(instance) {
                    None => Ok(Value::Table(None)),
                    Some(rows) => element
                        .table_value(rows.iter().map(Some))
                        .map(|table| Value::Table(Some(table))),
                });
            let to_member: Box<dyn Fn(&mut R, Value) -> Result<()> + Send + Sync> =
                Box::new(|_, _| {
                    Err(Error::unsupported(
                        "structured parameters are input only and cannot be read back",
                    ))
                });
            Ok(Column::from_parts(
                descriptor,
                Value::Table(None),
                to_db,
                Some(to_member),
            ))
        }));
        self
    }

    /// Run every pending registration and validate the aggregate. Called by
    /// the context, under its lock.
    pub(crate) fn build(self, inner: &mut ContextInner) -> Result<RowAccessor<R>> {
        let mut columns = Vec::with_capacity(self.pending.len());
        for pending in self.pending {
            columns.push(Arc::new(pending(inner)?));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name()) {
                return Err(Error::configuration(format!(
                    "duplicate column name `{}` in {}",
                    column.name(),
                    any::type_name::<R>(),
                )));
            }
        }
        if !self.keys.is_empty() {
            if self.table.is_none() {
                return Err(Error::configuration(format!(
                    "{} declares key members but no table identity",
                    any::type_name::<R>(),
                )));
            }
            for key in &self.keys {
                if !columns.iter().any(|v| v.descriptor().member == *key) {
                    return Err(Error::configuration(format!(
                        "key member `{key}` does not match any column of {}",
                        any::type_name::<R>(),
                    )));
                }
            }
        }
        Ok(RowAccessor {
            table: self.table,
            keys: self.keys.into(),
            structured: self.structured,
            columns: columns.into(),
        })
    }
}

fn registered_converter<M: Clone + Send + Sync + 'static>(
    inner: &mut ContextInner,
    member: &'static str,
) -> Result<Arc<dyn ErasedConvert<M>>> {
    inner.registered_converter::<M>().ok_or_else(|| {
        Error::configuration(format!(
            "no database mapping for member `{member}` of type {}: it is not a primitive \
             database value and no converter is declared or registered",
            any::type_name::<M>(),
        ))
    })
}

/// The compiled column set of one row type.
///
/// Built once per type by the [`Context`](crate::Context), immutable, and
/// shared by reference across threads; concurrent calls are safe as long as
/// each uses a distinct command/instance pair.
pub struct RowAccessor<R> {
    table: Option<&'static str>,
    keys: Box<[&'static str]>,
    structured: Option<&'static str>,
    columns: Box<[Arc<Column<R>>]>,
}

impl<R: 'static> std::fmt::Debug for RowAccessor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowAccessor")
            .field("table", &self.table)
            .field("keys", &self.keys)
            .field("structured", &self.structured)
            .field(
                "columns",
                &self
                    .columns
                    .iter()
                    .map(|v| v.descriptor())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<R: 'static> RowAccessor<R> {
    pub fn table(&self) -> Option<&'static str> {
        self.table
    }

    /// Key member names, empty when the type declares none.
    pub fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    pub fn structured_type(&self) -> Option<&'static str> {
        self.structured
    }

    pub fn columns(&self) -> &[Arc<Column<R>>] {
        &self.columns
    }

    /// Find a column by its external name.
    pub fn column(&self, name: &str) -> Option<&Arc<Column<R>>> {
        self.columns.iter().find(|v| v.name() == name)
    }

    pub fn is_key(&self, member: &str) -> bool {
        self.keys.contains(&member)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &Arc<Column<R>>> {
        self.columns
            .iter()
            .filter(|v| self.is_key(v.descriptor().member))
    }

    /// A derived accessor limited to the selected members, sharing the same
    /// compiled columns and converters by reference.
    ///
    /// With `include_key` the key columns are appended to the selection (when
    /// not already part of it) and the key set is retained; without it the
    /// projection carries no key set.
    pub fn project(&self, members: &[&str], include_key: bool) -> Result<Arc<RowAccessor<R>>> {
        let mut selected = Vec::with_capacity(members.len() + self.keys.len());
        for member in members {
            let column = self
                .columns
                .iter()
                .find(|v| v.descriptor().member == *member)
                .ok_or_else(|| {
                    Error::configuration(format!("cannot project unknown member `{member}`"))
                })?;
            selected.push(column.clone());
        }
        if include_key {
            for column in self.key_columns() {
                if !selected.iter().any(|v| v.name() == column.name()) {
                    selected.push(column.clone());
                }
            }
        }
        if selected.is_empty() {
            return Err(Error::configuration("cannot project an empty column set"));
        }
        Ok(Arc::new(RowAccessor {
            table: self.table,
            keys: if include_key {
                self.keys.clone()
            } else {
                Box::new([])
            },
            structured: self.structured,
            columns: selected.into(),
        }))
    }

    /// Build the command's bound-parameter collection from the columns: one
    /// parameter per column with its name, type, size and direction.
    pub fn bind_parameters<C: Command>(&self, command: &mut C) -> Result<()> {
        for column in &self.columns {
            command.add_parameter(column.parameter())?;
        }
        Ok(())
    }

    /// Write every input-flagged column of the instance into the command.
    pub fn write_parameters<C: Command>(&self, command: &mut C, instance: &R) -> Result<()> {
        for column in self.columns.iter().filter(|v| v.direction().is_input()) {
            command.set_parameter(column.name(), column.to_db(instance)?)?;
        }
        Ok(())
    }

    /// Read every output-flagged column (output, input-output, return value)
    /// back from the command into the instance.
    pub fn read_parameters<C: Command>(&self, command: &C, instance: &mut R) -> Result<()> {
        for column in self.columns.iter().filter(|v| v.direction().is_output()) {
            column.to_member(instance, command.parameter_value(column.name())?)?;
        }
        Ok(())
    }

    /// Assign every record field that matches a column by exact external
    /// name; the record may be a subset or a superset of the accessor.
    /// Returns the number of values transferred.
    pub fn read_record(&self, record: &RowLabeled, instance: &mut R) -> Result<usize> {
        let mut transferred = 0;
        for (label, value) in record.labels.iter().zip(record.values.iter()) {
            if let Some(column) = self.column(label) {
                column.to_member(instance, value.clone())?;
                transferred += 1;
            }
        }
        Ok(transferred)
    }

    /// Non-query execution: write parameters, execute, then immediately
    /// commit the output parameters back into the instance.
    pub async fn execute<C: Command>(&self, command: &mut C, instance: &mut R) -> Result<u64> {
        self.write_parameters(command, instance)?;
        let affected = command.execute().await?;
        self.read_parameters(command, instance)?;
        Ok(affected)
    }

    /// Scalar execution with the same immediate output-parameter commit.
    pub async fn execute_scalar<C: Command>(
        &self,
        command: &mut C,
        instance: &mut R,
    ) -> Result<Value> {
        self.write_parameters(command, instance)?;
        let value = command.execute_scalar().await?;
        self.read_parameters(command, instance)?;
        Ok(value)
    }

    pub fn execute_blocking<C: Command>(&self, command: &mut C, instance: &mut R) -> Result<u64> {
        futures::executor::block_on(self.execute(command, instance))
    }

    pub fn execute_scalar_blocking<C: Command>(
        &self,
        command: &mut C,
        instance: &mut R,
    ) -> Result<Value> {
        futures::executor::block_on(self.execute_scalar(command, instance))
    }
}
