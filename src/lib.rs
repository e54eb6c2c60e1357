//! Resolve AWS named profiles into shell environment variables, assuming IAM
//! roles through STS and reusing the resulting session across invocations.

pub mod aws;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod shell;

pub use error::{AwsenvError, Result};
