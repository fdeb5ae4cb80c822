//! Configuration constants
//!
//! Built-in defaults that apply when neither `cdu.toml` nor the command line
//! overrides a value. Project configuration loading lives in
//! [`crate::core::settings`].

pub mod defaults;
