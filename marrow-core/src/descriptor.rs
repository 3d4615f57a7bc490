use crate::{DbType, Error, Result};

/// How a column participates in the command's parameter protocol.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl Direction {
    /// Written before execution.
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
    /// Read back after execution.
    pub fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::InputOutput | Self::ReturnValue)
    }
}

/// Declared capacity of a sized character or binary column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Fixed(u32),
    /// Unlimited; length checks are skipped.
    Max,
}

/// Declaration options of one column, consumed by the resolver.
///
/// Built with chained overrides over the defaults:
///
/// ```rust,ignore
/// ColumnOptions::new().db_type(DbType::NVarChar).size(50)
/// ```
#[derive(Default, Debug, Clone)]
pub struct ColumnOptions {
    pub db_type: Option<DbType>,
    pub size: Option<Size>,
    pub direction: Direction,
    pub name: Option<&'static str>,
    pub ordinal: Option<u16>,
    pub computed: bool,
}

impl ColumnOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn db_type(mut self, db_type: DbType) -> Self {
        self.db_type = Some(db_type);
        self
    }
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(Size::Fixed(size));
        self
    }
    pub fn max_size(mut self) -> Self {
        self.size = Some(Size::Max);
        self
    }
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
    /// External name override; defaults to the member name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }
    pub fn ordinal(mut self, ordinal: u16) -> Self {
        self.ordinal = Some(ordinal);
        self
    }
    /// Computed columns are readable but never sent on insert or update.
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

/// Fully resolved metadata of one column. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Member name inside the row type.
    pub member: &'static str,
    /// External (parameter / result column) name.
    pub name: &'static str,
    pub db_type: DbType,
    pub size: Option<Size>,
    pub nullable: bool,
    pub direction: Direction,
    pub ordinal: Option<u16>,
    pub computed: bool,
}

/// Derive the descriptor of one column from its declaration and the
/// compatible-type set of its (converter-resolved) primitive type.
///
/// Every check here is construction time and fatal to the row type; the only
/// validation deferred to invocation time is the size overflow check of the
/// compiled pipeline.
pub(crate) fn resolve(
    member: &'static str,
    nullable: bool,
    options: &ColumnOptions,
    compatible: &'static [DbType],
    converter_tag: Option<DbType>,
) -> Result<ColumnDescriptor> {
    if let Some(tag) = converter_tag {
        if !compatible.contains(&tag) {
            return Err(Error::configuration(format!(
                "converter of `{member}` declares {tag:?} which is not valid for its primitive type ({compatible:?})",
            )));
        }
    }
    if let Some(tag) = options.db_type {
        if !compatible.contains(&tag) {
            return Err(Error::configuration(format!(
                "`{member}` declares {tag:?} which is not compatible with its member type ({compatible:?})",
            )));
        }
        if let Some(declared) = converter_tag {
            if declared != tag {
                return Err(Error::configuration(format!(
                    "`{member}` declares {tag:?} but its converter declares {declared:?}",
                )));
            }
        }
    }
    let db_type = match options.db_type.or(converter_tag) {
        Some(v) => v,
        None if compatible.len() == 1 => compatible[0],
        None => {
            return Err(Error::configuration(format!(
                "ambiguous mapping for `{member}`: declare one of {compatible:?} explicitly",
            )));
        }
    };
    match options.size {
        Some(Size::Fixed(0)) => {
            return Err(Error::configuration(format!(
                "`{member}` declares a zero size",
            )));
        }
        Some(_) if !db_type.is_sized() => {
            return Err(Error::configuration(format!(
                "`{member}` declares a size but {db_type:?} is not a sized type",
            )));
        }
        None if db_type.is_sized() => {
            return Err(Error::configuration(format!(
                "`{member}` resolves to the sized type {db_type:?} and must declare a size",
            )));
        }
        _ => {}
    }
    Ok(ColumnDescriptor {
        member,
        name: options.name.unwrap_or(member),
        db_type,
        size: options.size,
        nullable,
        direction: options.direction,
        ordinal: options.ordinal,
        computed: options.computed,
    })
}
