use crate::{
    ColumnDescriptor, Direction, Error, Parameter, Result, Size, Value, convert::ErasedConvert,
};
use std::sync::Arc;

type ToDb<R> = Box<dyn Fn(&R) -> Result<Value> + Send + Sync>;
type ToMember<R> = Box<dyn Fn(&mut R, Value) -> Result<()> + Send + Sync>;

/// One member of a row type bound to its descriptor, with the bidirectional
/// pipelines compiled at construction.
///
/// The pipelines are pure functions of `(instance, value)` with no shared
/// mutable state: a column is safe for unbounded concurrent use once built.
pub struct Column<R> {
    descriptor: ColumnDescriptor,
    null: Value,
    to_db: ToDb<R>,
    to_member: Option<ToMember<R>>,
}

impl<R: 'static> Column<R> {
    pub(crate) fn from_parts(
        descriptor: ColumnDescriptor,
        null: Value,
        to_db: ToDb<R>,
        to_member: Option<ToMember<R>>,
    ) -> Self {
        Self {
            descriptor,
            null,
            to_db,
            to_member,
        }
    }

    /// Compile the pipelines of an ordinary (non structured) column.
    ///
    /// `get` yields `None` for an absent member; `set` receives `None` for
    /// the null marker. Non-nullable registrations wrap their accessors so
    /// the `None` arm is unreachable on their side.
    pub(crate) fn compile<M: Send + Sync + 'static>(
        descriptor: ColumnDescriptor,
        convert: Arc<dyn ErasedConvert<M>>,
        get: impl Fn(&R) -> Option<M> + Send + Sync + 'static,
        set: Option<Box<dyn Fn(&mut R, Option<M>) + Send + Sync>>,
    ) -> Self {
        let null = convert.null_value();
        let to_db: ToDb<R> = {
            let convert = convert.clone();
            let name = descriptor.name;
            let size = descriptor.size;
            let null = null.clone();
            Box::new(move |instance| {
                let Some(member) = get(instance) else {
                    // Absent member: emit the null marker, converter not invoked.
                    return Ok(null.clone());
                };
                let value = convert.to_db(&member)?;
                if let Some(Size::Fixed(limit)) = size {
                    if let Some(length) = value.length() {
                        if length > limit as usize {
                            return Err(Error::invalid_value(
                                name,
                                format!("length {length} exceeds the declared size {limit}"),
                            ));
                        }
                    }
                }
                Ok(value)
            })
        };
        let to_member = set.map(|set| {
            let member = descriptor.member;
            let nullable = descriptor.nullable;
            let pipeline: ToMember<R> = Box::new(move |instance, value| {
                if value.is_null() {
                    if !nullable {
                        return Err(Error::conversion(format!(
                            "NULL value for the non nullable member `{member}`",
                        )));
                    }
                    set(instance, None);
                    return Ok(());
                }
                set(instance, Some(convert.to_member(value)?));
                Ok(())
            });
            pipeline
        });
        Self::from_parts(descriptor, null, to_db, to_member)
    }

    pub fn descriptor(&self) -> &ColumnDescriptor {
        &self.descriptor
    }

    /// External name of the column.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn direction(&self) -> Direction {
        self.descriptor.direction
    }

    /// The typed null marker of this column.
    pub fn null_value(&self) -> Value {
        self.null.clone()
    }

    /// A fresh bound parameter for this column, initialized to NULL.
    pub fn parameter(&self) -> Parameter {
        Parameter {
            name: self.descriptor.name.into(),
            db_type: self.descriptor.db_type,
            size: self.descriptor.size,
            direction: self.descriptor.direction,
            value: self.null.clone(),
        }
    }

    /// Run the to-database pipeline against an instance.
    pub fn to_db(&self, instance: &R) -> Result<Value> {
        (self.to_db)(instance)
    }

    /// Whether the member can be assigned from a raw value.
    pub fn is_writable(&self) -> bool {
        self.to_member.is_some()
    }

    /// Run the to-member pipeline, assigning a raw value to the instance.
    pub fn to_member(&self, instance: &mut R, value: Value) -> Result<()> {
        match &self.to_member {
            Some(pipeline) => pipeline(instance, value),
            None => Err(Error::configuration(format!(
                "member `{}` is not writable",
                self.descriptor.member,
            ))),
        }
    }
}
