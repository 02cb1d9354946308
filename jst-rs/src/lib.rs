//! Embedded script host and template precompiler.
//!
//! | Layer     | Module                        | Role                                   |
//! |-----------|-------------------------------|----------------------------------------|
//! | engines   | [`engine`]                    | QuickJS / Lua backends behind a trait  |
//! | host      | [`session`], [`handle`], [`site`] | start, parse, invoke, error mailbox |
//! | templates | [`compiler`], [`embedded`]    | `compile` / `setTemplateSettings`      |
//! | output    | [`bundle`], [`task`]          | one JavaScript file from many templates |
//! | front end | [`cli`], [`config`]           | flags and `.jstrc`                     |

pub mod bundle;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod embedded;
pub mod engine;
pub mod error;
pub mod handle;
pub mod session;
pub mod site;
pub mod task;
pub mod value;

pub use compiler::{TemplateCompiler, TemplateSettings};
pub use error::{HostError, ScriptFault};
pub use handle::ParsedHandle;
pub use session::{eval_once, InterpreterSession, ParseMode, Parsed};
pub use value::{HostFn, Value};
