mod accessor;
mod column;
mod command;
mod context;
mod convert;
mod descriptor;
mod entity;
mod error;
mod reader;
mod sql;
mod tabular;
mod util;
mod value;

pub use accessor::*;
pub use column::*;
pub use command::*;
pub use context::Context;
pub use convert::Convert;
pub use descriptor::*;
pub use entity::*;
pub use error::*;
pub use reader::*;
pub use tabular::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;
