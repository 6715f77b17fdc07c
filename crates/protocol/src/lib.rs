//! Wire types shared by the session controller and the spawned job.
//!
//! - [`ConnectionInfo`] - validated connection parameters and the line payload
//! - [`ConnFormat`] - presentation formats (payload text, JNLP, URL, JSON)
//! - [`PayloadError`] - the payload failed its required-field contract
//! - [`FormatError`] - the connection cannot be shown in a format

pub mod conn_info;
pub mod format;

pub use conn_info::{ConnectionInfo, Field, PayloadError};
pub use format::{ConnFormat, FormatError};
