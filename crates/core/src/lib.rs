//! vnc: launch batch-scheduled VNC sessions and receive their connection handoff.
//!
//! A session is described by [`SessionOptions`], validated into a
//! [`SessionRequest`] against a [`ConfigCatalog`], rendered into a job script by
//! a [`TemplateRenderer`], and handed to a [`Scheduler`]. Once the job starts
//! it reports its host, port, display and password back over a
//! [`handoff`] channel, either by connecting to a TCP listener or by writing a
//! record to the shared output directory.
//!
//! ```ignore
//! use vnc::{SessionOptions, Submitter};
//!
//! let submitter = Submitter::new(my_scheduler);
//! let info = submitter
//!     .launch(SessionOptions::new("/home/me/xstartup").cluster("oakley").walltime("01:00:00"))
//!     .await?;
//! println!("{}", info.to_payload());
//! ```

pub mod config;
pub mod error;
pub mod handoff;
pub mod request;
pub mod scheduler;
pub mod submitter;
pub mod template;

pub use config::{ConfigCatalog, ConfigTable, ResolvedContext};
pub use error::{Error, Result, ValidationError};
pub use handoff::{
	CancelHandle, CancelSignal, HandoffChannel, HandoffMode, HandoffSettings, ListenerChannel, PollChannel,
	cancellation, read_record,
};
pub use request::{SessionKeys, SessionOptions, SessionRequest};
pub use scheduler::{JobId, Scheduler};
pub use submitter::{Session, Submitter};
pub use template::{EmbeddedTemplates, TemplateRenderer};
pub use vnc_protocol::{ConnFormat, ConnectionInfo, Field, FormatError, PayloadError};
