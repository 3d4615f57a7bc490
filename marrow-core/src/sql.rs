//! Statement text generation for the key-based entity operations.
//!
//! Deliberately minimal: double-quoted identifiers, `@name` parameter
//! markers, equality-only key filters. Anything richer is developer-authored
//! statement text, outside this engine.

use crate::{Column, RowAccessor, separated_by};
use std::sync::Arc;

fn write_ident(out: &mut String, name: &str) {
    out.push('"');
    for c in name.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

fn write_table(out: &mut String, qualified: &str) {
    separated_by(out, qualified.split('.'), |out, v| write_ident(out, v), ".");
}

fn write_key_filter<R: 'static>(out: &mut String, accessor: &RowAccessor<R>) {
    out.push_str(" WHERE ");
    separated_by(
        out,
        accessor.key_columns(),
        |out, column| {
            write_ident(out, column.name());
            out.push_str(" = @");
            out.push_str(column.name());
        },
        " AND ",
    );
}

fn write_columns<'a, R: 'static>(
    out: &mut String,
    columns: impl IntoIterator<Item = &'a Arc<Column<R>>>,
) {
    separated_by(out, columns, |out, v| write_ident(out, v.name()), ", ");
}

pub(crate) fn write_select_by_key<R: 'static>(out: &mut String, accessor: &RowAccessor<R>) {
    out.push_str("SELECT ");
    write_columns(
        out,
        accessor
            .columns()
            .iter()
            .filter(|v| !accessor.is_key(v.descriptor().member)),
    );
    out.push_str(" FROM ");
    write_table(out, accessor.table().unwrap_or_default());
    write_key_filter(out, accessor);
}

pub(crate) fn write_insert<R: 'static>(out: &mut String, accessor: &RowAccessor<R>) {
    let inserted = || accessor.columns().iter().filter(|v| !v.descriptor().computed);
    out.push_str("INSERT INTO ");
    write_table(out, accessor.table().unwrap_or_default());
    out.push_str(" (");
    write_columns(out, inserted());
    out.push_str(") VALUES (");
    separated_by(
        out,
        inserted(),
        |out, column| {
            out.push('@');
            out.push_str(column.name());
        },
        ", ",
    );
    out.push(')');
}

pub(crate) fn write_update_by_key<R: 'static>(out: &mut String, accessor: &RowAccessor<R>) {
    out.push_str("UPDATE ");
    write_table(out, accessor.table().unwrap_or_default());
    out.push_str(" SET ");
    separated_by(
        out,
        accessor.columns().iter().filter(|v| {
            !v.descriptor().computed && !accessor.is_key(v.descriptor().member)
        }),
        |out, column| {
            write_ident(out, column.name());
            out.push_str(" = @");
            out.push_str(column.name());
        },
        ", ",
    );
    write_key_filter(out, accessor);
}

pub(crate) fn write_delete_by_key<R: 'static>(out: &mut String, accessor: &RowAccessor<R>) {
    out.push_str("DELETE FROM ");
    write_table(out, accessor.table().unwrap_or_default());
    write_key_filter(out, accessor);
}
