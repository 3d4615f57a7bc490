use marrow::{ColumnOptions, DbType, Record, RowMapping};
use rust_decimal::Decimal;
use time::Date;

/// Keyed row fixture covering the primitive, optional and computed column
/// shapes.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub age: Option<u8>,
    pub balance: Decimal,
    pub signup: Option<Date>,
    pub full_name: Option<String>,
}

impl Record for User {
    fn mapping() -> RowMapping<Self> {
        RowMapping::new()
            .table("users")
            .keys(&["id"])
            .column(
                "id",
                ColumnOptions::new(),
                |v: &User| v.id,
                |v, x| v.id = x,
            )
            .column(
                "name",
                ColumnOptions::new().db_type(DbType::NVarChar).size(50),
                |v: &User| v.name.clone(),
                |v, x| v.name = x,
            )
            .column_opt(
                "age",
                ColumnOptions::new(),
                |v: &User| v.age,
                |v, x| v.age = x,
            )
            .column(
                "balance",
                ColumnOptions::new().db_type(DbType::Money),
                |v: &User| v.balance,
                |v, x| v.balance = x,
            )
            .column_opt(
                "signup",
                ColumnOptions::new(),
                |v: &User| v.signup,
                |v, x| v.signup = x,
            )
            .column_opt(
                "full_name",
                ColumnOptions::new()
                    .db_type(DbType::NVarChar)
                    .size(120)
                    .computed(),
                |v: &User| v.full_name.clone(),
                |v, x| v.full_name = x,
            )
    }
}
