//! Script engine and base interpreter.
//!
//! - [`value`]: the dynamically typed [`Value`]
//! - [`engine`]: the expression evaluator and the [`Scope`] seam
//! - [`object`]: identifier descriptors and script objects
//! - [`builtins`] / [`registry`]: engine functions and host functions
//! - [`stmt`]: the statement compiler
//! - [`interp`]: the [`Interpreter`] running compiled programs
//!
//! # Quick start
//!
//! ```rust
//! use sf::script::{ExecMode, Interpreter};
//!
//! let mut interp = Interpreter::<()>::default();
//! assert!(interp.compile("int x; x = 6; print(x*7);"));
//! interp.execute(ExecMode::Init);
//! interp.execute(ExecMode::Run);
//! assert_eq!(interp.output(), ["42"]);
//! ```

pub mod builtins;
pub mod calc;
pub mod engine;
pub mod error;
pub mod interp;
pub mod object;
pub mod registry;
pub mod stmt;
pub mod value;

pub use engine::{NoScope, Scope, ScriptEngine};
pub use error::{ErrorKind, ScriptError};
pub use interp::{Core, ExecMode, ExitCode, Extension, Interpreter, State};
pub use object::{IdInfo, IdKind, ObjectHandle, Owner, ScriptObject};
pub use registry::FunctionRegistry;
pub use value::{Value, ValueType};
