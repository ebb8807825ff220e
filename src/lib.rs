#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod bootstrap;
pub mod cli;
pub mod client;
pub mod config;
pub mod create;
pub mod error;
pub mod render;
pub mod session;
pub mod soap;
pub mod templates;
pub mod value;
