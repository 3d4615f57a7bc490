use crate::{Column, DbType, Error, Result, RowAccessor, Size, Value};
use std::sync::Arc;

/// Schema of one column of a structured (table-valued) parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    pub name: &'static str,
    pub db_type: DbType,
    pub size: Option<Size>,
}

/// A sequence of rows encoded as one structured parameter value.
///
/// The schema is derived once from the element type's accessor; row values
/// are laid out by declared ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    pub type_name: &'static str,
    pub columns: Box<[TableColumn]>,
    pub rows: Vec<Box<[Value]>>,
}

impl<R: 'static> RowAccessor<R> {
    /// The columns of this accessor in ordinal order, validated for use as a
    /// structured parameter schema: a structured type name must be declared
    /// and the ordinals must be contiguous, gap free and duplicate free,
    /// starting at 0.
    pub(crate) fn structured_columns(&self) -> Result<Vec<&Arc<Column<R>>>> {
        let type_name = self.structured_type().ok_or_else(|| {
            Error::configuration(
                "the row type does not declare a structured type name and cannot be \
                 used as a table-valued parameter",
            )
        })?;
        let mut columns = Vec::with_capacity(self.columns().len());
        for column in self.columns() {
            if column.descriptor().ordinal.is_none() {
                return Err(Error::configuration(format!(
                    "member `{}` of structured type {type_name} declares no ordinal",
                    column.descriptor().member,
                )));
            }
            columns.push(column);
        }
        columns.sort_by_key(|v| v.descriptor().ordinal);
        for (expected, column) in columns.iter().enumerate() {
            let ordinal = column.descriptor().ordinal.unwrap_or_default() as usize;
            if ordinal != expected {
                return Err(Error::configuration(format!(
                    "ordinals of structured type {type_name} are not contiguous from 0: \
                     found {ordinal} where {expected} was expected",
                )));
            }
        }
        Ok(columns)
    }

    /// Encode a sequence of instances as one [`TableValue`], one row per
    /// element with values placed at their declared ordinals. A missing
    /// element is an [`Error::InvalidValue`]: structured parameters carry no
    /// null rows.
    pub fn table_value<'a>(
        &self,
        rows: impl IntoIterator<Item = Option<&'a R>>,
    ) -> Result<TableValue>
    where
        R: 'a,
    {
        let columns = self.structured_columns()?;
        let schema = columns
            .iter()
            .map(|v| TableColumn {
                name: v.name(),
                db_type: v.descriptor().db_type,
                size: v.descriptor().size,
            })
            .collect();
        let mut encoded = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let Some(row) = row else {
                return Err(Error::invalid_value(
                    self.structured_type().unwrap_or_default(),
                    format!("element {index} of the sequence is missing"),
                ));
            };
            encoded.push(
                columns
                    .iter()
                    .map(|column| column.to_db(row))
                    .collect::<Result<Box<[Value]>>>()?,
            );
        }
        Ok(TableValue {
            type_name: self.structured_type().unwrap_or_default(),
            columns: schema,
            rows: encoded,
        })
    }
}
