//! The flattened key/value mapping a job script is rendered from.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Key selecting phone-home (TCP connect-back) handoff.
pub const PHONE_HOME_KEY: &str = "tcp_server";
/// Key selecting the script template.
pub const TEMPLATE_KEY: &str = "template";
/// Template used when the context names none.
pub const DEFAULT_TEMPLATE: &str = "vnc";

/// Result of the tiered config merge, with every value coerced to a string.
///
/// Keys are ordered, so iteration and derived environments are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedContext {
	values: BTreeMap<String, String>,
}

impl ResolvedContext {
	pub(crate) fn from_values(values: BTreeMap<String, String>) -> Self {
		Self { values }
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.values.get(key).map(String::as_str)
	}

	/// Returns the value for `key`, or `default` when it is absent.
	pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
		self.get(key).unwrap_or(default)
	}

	/// True when `key` coerced to exactly `"true"`.
	pub fn flag(&self, key: &str) -> bool {
		self.get(key) == Some("true")
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	/// Whether the job phones home over TCP instead of writing a file.
	pub fn phone_home(&self) -> bool {
		self.flag(PHONE_HOME_KEY)
	}

	/// Whether the batch server runs jobs on shared nodes.
	pub fn is_shared(&self) -> bool {
		self.get("batch_type") == Some("shared")
	}

	/// Whether the batch server offers more than one cluster.
	pub fn is_multicluster(&self) -> bool {
		self.flag("multicluster")
	}

	/// Comma-delimited font path for the VNC server.
	pub fn fonts(&self) -> Option<&str> {
		self.get("fonts")
	}

	/// Shell command that loads the TurboVNC module.
	pub fn load_turbovnc(&self) -> Option<&str> {
		self.get("load_turbovnc")
	}

	pub fn template_id(&self) -> &str {
		self.get_or(TEMPLATE_KEY, DEFAULT_TEMPLATE)
	}

	pub fn walltime(&self) -> Option<&str> {
		self.get("walltime")
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn as_map(&self) -> &BTreeMap<String, String> {
		&self.values
	}

	/// Exposes every key to the job as one environment variable, uppercased.
	pub fn to_env(&self) -> BTreeMap<String, String> {
		self.values
			.iter()
			.map(|(k, v)| (k.to_ascii_uppercase(), v.clone()))
			.collect()
	}
}

/// Coerces a config value to the string substituted into templates.
///
/// Strings pass through; booleans become `true`/`false`; numbers use their JSON
/// decimal form; `null` becomes the empty string; arrays join their coerced
/// elements with `,`; objects become compact JSON.
pub fn coerce(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::Bool(b) => b.to_string(),
		Value::Number(n) => n.to_string(),
		Value::String(s) => s.clone(),
		Value::Array(items) => items.iter().map(coerce).collect::<Vec<_>>().join(","),
		Value::Object(_) => value.to_string(),
	}
}
