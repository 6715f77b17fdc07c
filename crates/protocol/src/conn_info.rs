//! Connection information reported back by a spawned session job.
//!
//! The job reports four labelled lines, in any order, possibly surrounded by
//! unrelated output:
//!
//! ```text
//! Host: node01
//! Port: 5901
//! Display: :1
//! Pass: secret
//! ```
//!
//! Labels are case-sensitive and separated from their value by `": "`.
//! [`ConnectionInfo::parse`] takes the first line carrying each label.
//! Host, port and display must be non-empty; the password may be empty but its
//! line must still be present.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// A required field of the handoff payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
	Host,
	Port,
	Display,
	Password,
}

impl Field {
	/// Every required field, in wire order.
	pub const ALL: [Field; 4] = [Field::Host, Field::Port, Field::Display, Field::Password];

	/// Label used on the wire. The password travels as `Pass`.
	pub fn label(self) -> &'static str {
		match self {
			Field::Host => "Host",
			Field::Port => "Port",
			Field::Display => "Display",
			Field::Password => "Pass",
		}
	}

	/// Lowercase field name, as used in JSON output and error codes.
	pub fn name(self) -> &'static str {
		match self {
			Field::Host => "host",
			Field::Port => "port",
			Field::Display => "display",
			Field::Password => "password",
		}
	}

	/// Whether an empty value satisfies the payload contract.
	pub fn allows_empty(self) -> bool {
		matches!(self, Field::Password)
	}
}

impl fmt::Display for Field {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// A payload that failed the required-field contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
	/// No line carried the field's label.
	#[error("{} not specified by batch job", .0.label())]
	Missing(Field),
	/// The label was present but its value was empty.
	#[error("{} specified with an empty value", .0.label())]
	Empty(Field),
	/// The value contains a line break and could not travel on the wire.
	#[error("{} contains a line break", .0.label())]
	LineBreak(Field),
}

impl PayloadError {
	/// The field that violated the contract.
	pub fn field(&self) -> Field {
		match self {
			PayloadError::Missing(field) | PayloadError::Empty(field) | PayloadError::LineBreak(field) => *field,
		}
	}
}

/// Validated connection parameters of a running session.
///
/// Immutable once constructed; every instance satisfies the same rules
/// [`parse`](Self::parse) enforces, so `parse(info.to_payload()) == info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
	host: String,
	port: String,
	display: String,
	password: String,
}

impl ConnectionInfo {
	/// Builds connection info from already-known values.
	pub fn new(
		host: impl Into<String>,
		port: impl Into<String>,
		display: impl Into<String>,
		password: impl Into<String>,
	) -> Result<Self, PayloadError> {
		let info = Self {
			host: host.into(),
			port: port.into(),
			display: display.into(),
			password: password.into(),
		};
		for field in Field::ALL {
			check_value(field, info.get(field))?;
		}
		Ok(info)
	}

	/// Parses a line-oriented handoff payload.
	///
	/// # Errors
	///
	/// Returns the first field, in [`Field::ALL`] order, that is missing or
	/// carries an empty value where one is not allowed.
	pub fn parse(text: &str) -> Result<Self, PayloadError> {
		let host = extract(text, Field::Host)?;
		let port = extract(text, Field::Port)?;
		let display = extract(text, Field::Display)?;
		let password = extract(text, Field::Password)?;
		Ok(Self {
			host: host.to_string(),
			port: port.to_string(),
			display: display.to_string(),
			password: password.to_string(),
		})
	}

	/// Serializes to the wire payload, one `Label: value` line per field.
	pub fn to_payload(&self) -> String {
		let mut out = String::new();
		for field in Field::ALL {
			out.push_str(field.label());
			out.push_str(": ");
			out.push_str(self.get(field));
			out.push('\n');
		}
		out
	}

	/// Returns the value of `field`.
	pub fn get(&self, field: Field) -> &str {
		match field {
			Field::Host => &self.host,
			Field::Port => &self.port,
			Field::Display => &self.display,
			Field::Password => &self.password,
		}
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> &str {
		&self.port
	}

	/// Port parsed as a TCP port number, if it is one.
	pub fn port_number(&self) -> Option<u16> {
		self.port.parse().ok()
	}

	pub fn display(&self) -> &str {
		&self.display
	}

	pub fn password(&self) -> &str {
		&self.password
	}
}

impl FromStr for ConnectionInfo {
	type Err = PayloadError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

fn extract(text: &str, field: Field) -> Result<&str, PayloadError> {
	let prefix = format!("{}: ", field.label());
	let value = text
		.lines()
		.find_map(|line| line.strip_prefix(prefix.as_str()))
		.ok_or(PayloadError::Missing(field))?;
	check_value(field, value)?;
	Ok(value)
}

fn check_value(field: Field, value: &str) -> Result<(), PayloadError> {
	if value.contains(['\n', '\r']) {
		return Err(PayloadError::LineBreak(field));
	}
	if value.is_empty() && !field.allows_empty() {
		return Err(PayloadError::Empty(field));
	}
	Ok(())
}
