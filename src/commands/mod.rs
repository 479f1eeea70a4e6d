pub mod absorb;
pub mod common;
pub mod create;
pub mod delete;
pub mod diff;
pub mod fetch;
pub mod list;
pub mod rename;
pub mod select;
pub mod show;
