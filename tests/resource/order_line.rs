use marrow::{ColumnOptions, DbType, Record, RowMapping};
use uuid::Uuid;

/// Structured-type fixture: declared out of ordinal order on purpose, the
/// encoded layout must follow the ordinals.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub line_id: Option<Uuid>,
    pub sku: String,
    pub quantity: i32,
}

impl Record for OrderLine {
    fn mapping() -> RowMapping<Self> {
        RowMapping::new()
            .structured("dbo.OrderLineList")
            .column(
                "quantity",
                ColumnOptions::new().ordinal(2),
                |v: &OrderLine| v.quantity,
                |v, x| v.quantity = x,
            )
            .column(
                "sku",
                ColumnOptions::new()
                    .db_type(DbType::NVarChar)
                    .size(20)
                    .ordinal(1),
                |v: &OrderLine| v.sku.clone(),
                |v, x| v.sku = x,
            )
            .column_opt(
                "line_id",
                ColumnOptions::new().ordinal(0),
                |v: &OrderLine| v.line_id,
                |v, x| v.line_id = x,
            )
    }
}
