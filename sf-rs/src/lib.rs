//! sf: dynamic values, a right-recursive expression engine, a small
//! statement interpreter and the binding layer that connects scripts to
//! host variables and result data.

pub mod binding;
pub mod cli;
pub mod config;
pub mod hook;
pub mod host;
pub mod script;
