use crate::{DbType, DbValue, Result, Value};
use std::sync::Arc;

/// Stateless bidirectional mapping between a member type and one primitive
/// database type.
///
/// A converter is identified by its implementing type: the context builds a
/// single `Default` instance per type and caches it for the process lifetime.
/// `Stored` is constrained to the primitive [`DbValue`] family, which makes
/// converter chaining unrepresentable.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct FlagCode;
/// impl Convert for FlagCode {
///     type Member = Flag;
///     type Stored = String;
///     const DB_TYPE: Option<DbType> = Some(DbType::Char);
///     fn to_db(&self, member: &Flag) -> Result<String> { ... }
///     fn to_member(&self, stored: String) -> Result<Flag> { ... }
/// }
/// ```
pub trait Convert: Default + Send + Sync + 'static {
    type Member: Clone + Send + Sync + 'static;
    type Stored: DbValue;

    /// Database type tag declared by the converter itself. Mandatory when the
    /// compatible set of `Stored` has more than one element and the column
    /// declaration does not name a tag; when present it must belong to that
    /// set.
    const DB_TYPE: Option<DbType> = None;

    fn to_db(&self, member: &Self::Member) -> Result<Self::Stored>;
    fn to_member(&self, stored: Self::Stored) -> Result<Self::Member>;
}

/// Object-safe view of a converter, with the primitive side erased to
/// [`Value`]. Columns store one of these, resolved once at construction.
pub(crate) trait ErasedConvert<M>: Send + Sync {
    fn compatible(&self) -> &'static [DbType];
    fn declared_db_type(&self) -> Option<DbType>;
    fn null_value(&self) -> Value;
    fn to_db(&self, member: &M) -> Result<Value>;
    fn to_member(&self, value: Value) -> Result<M>;
}

/// Identity pipeline for members that already are primitive database values.
pub(crate) struct Direct<M>(std::marker::PhantomData<M>);

impl<M> Direct<M> {
    pub(crate) fn new() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<M: DbValue> ErasedConvert<M> for Direct<M> {
    fn compatible(&self) -> &'static [DbType] {
        M::compatible()
    }
    fn declared_db_type(&self) -> Option<DbType> {
        None
    }
    fn null_value(&self) -> Value {
        M::empty_value()
    }
    fn to_db(&self, member: &M) -> Result<Value> {
        Ok(member.clone().into_value())
    }
    fn to_member(&self, value: Value) -> Result<M> {
        M::try_from_value(value)
    }
}

/// Adapter running a shared [`Convert`] singleton behind the erased interface.
pub(crate) struct Bridged<C: Convert>(pub(crate) Arc<C>);

impl<C: Convert> ErasedConvert<C::Member> for Bridged<C> {
    fn compatible(&self) -> &'static [DbType] {
        <C::Stored as DbValue>::compatible()
    }
    fn declared_db_type(&self) -> Option<DbType> {
        C::DB_TYPE
    }
    fn null_value(&self) -> Value {
        <C::Stored as DbValue>::empty_value()
    }
    fn to_db(&self, member: &C::Member) -> Result<Value> {
        Ok(self.0.to_db(member)?.into_value())
    }
    fn to_member(&self, value: Value) -> Result<C::Member> {
        let stored = <C::Stored as DbValue>::try_from_value(value)?;
        self.0.to_member(stored)
    }
}
