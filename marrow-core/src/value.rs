use crate::{Error, Result, TableValue};
use rust_decimal::Decimal;
use std::any;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// The closed set of database type tags a column can resolve to.
///
/// Sized members of the set (character and binary families) additionally
/// require a declared [`Size`](crate::Size); every other member forbids one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Money,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Binary,
    VarBinary,
    Date,
    Time,
    DateTime,
    DateTime2,
    DateTimeOffset,
    UniqueIdentifier,
    Structured,
}

impl DbType {
    /// Whether the type belongs to the sized character/binary family.
    pub fn is_sized(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::VarChar
                | Self::NChar
                | Self::NVarChar
                | Self::Binary
                | Self::VarBinary
        )
    }
}

/// Dynamically typed value travelling through parameters and result records.
///
/// Every variant carries an `Option`: the `None` payload is the typed null
/// marker for that column shape, so a NULL still knows which primitive family
/// it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(Option<bool>),
    UInt8(Option<u8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    Table(Option<TableValue>),
}

impl Value {
    /// True when the payload is the null marker, whichever the variant.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Boolean(v) => v.is_none(),
            Self::UInt8(v) => v.is_none(),
            Self::Int16(v) => v.is_none(),
            Self::Int32(v) => v.is_none(),
            Self::Int64(v) => v.is_none(),
            Self::Float32(v) => v.is_none(),
            Self::Float64(v) => v.is_none(),
            Self::Decimal(v) => v.is_none(),
            Self::Varchar(v) => v.is_none(),
            Self::Blob(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Time(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::TimestampWithTimezone(v) => v.is_none(),
            Self::Uuid(v) => v.is_none(),
            Self::Table(v) => v.is_none(),
        }
    }

    /// Length in characters (text) or bytes (binary), for the variants the
    /// sized type family can produce. `None` for everything else.
    pub fn length(&self) -> Option<usize> {
        match self {
            Self::Varchar(Some(v)) => Some(v.chars().count()),
            Self::Blob(Some(v)) => Some(v.len()),
            _ => None,
        }
    }
}

/// Conversion between a native Rust member type and its [`Value`]
/// representation, together with the fixed set of database types the member
/// may bind to.
///
/// The compatible set is a closed table: when it has a single element the
/// resolver picks it implicitly, otherwise the declaration must name the tag
/// explicitly.
pub trait DbValue: Clone + Send + Sync + 'static {
    /// Database types this Rust type may bind to.
    fn compatible() -> &'static [DbType];
    /// The typed null marker for this type.
    fn empty_value() -> Value;
    fn into_value(self) -> Value;
    /// Strict reverse mapping; fails on any other variant and on the null
    /// marker (null is handled before this is reached).
    fn try_from_value(value: Value) -> Result<Self>;
}

macro_rules! impl_db_value {
    ($source:ty, $variant:path, [$($db:ident),+ $(,)?]) => {
        impl DbValue for $source {
            fn compatible() -> &'static [DbType] {
                &[$(DbType::$db),+]
            }
            fn empty_value() -> Value {
                $variant(None)
            }
            fn into_value(self) -> Value {
                $variant(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $variant(Some(v)) => Ok(v),
                    other => Err(Error::conversion(format!(
                        "cannot read a {} out of {:?}",
                        any::type_name::<Self>(),
                        other,
                    ))),
                }
            }
        }
    };
}

impl_db_value!(bool, Value::Boolean, [Bit]);
impl_db_value!(u8, Value::UInt8, [TinyInt]);
impl_db_value!(i16, Value::Int16, [SmallInt]);
impl_db_value!(i32, Value::Int32, [Int]);
impl_db_value!(i64, Value::Int64, [BigInt]);
impl_db_value!(f32, Value::Float32, [Real]);
impl_db_value!(f64, Value::Float64, [Float]);
impl_db_value!(Decimal, Value::Decimal, [Decimal, Money]);
impl_db_value!(String, Value::Varchar, [NVarChar, NChar, VarChar, Char]);
impl_db_value!(Box<[u8]>, Value::Blob, [VarBinary, Binary]);
impl_db_value!(Date, Value::Date, [Date]);
impl_db_value!(Time, Value::Time, [Time]);
impl_db_value!(PrimitiveDateTime, Value::Timestamp, [DateTime2, DateTime]);
impl_db_value!(OffsetDateTime, Value::TimestampWithTimezone, [DateTimeOffset]);
impl_db_value!(Uuid, Value::Uuid, [UniqueIdentifier]);

impl DbValue for Vec<u8> {
    fn compatible() -> &'static [DbType] {
        <Box<[u8]>>::compatible()
    }
    fn empty_value() -> Value {
        Value::Blob(None)
    }
    fn into_value(self) -> Value {
        Value::Blob(Some(self.into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        <Box<[u8]>>::try_from_value(value).map(Into::into)
    }
}
