//! Presentation formats for [`ConnectionInfo`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::conn_info::ConnectionInfo;

/// A connection that cannot be expressed in the requested format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
	#[error("cannot build viewer URL for {host}:{port}: {source}")]
	Url {
		host: String,
		port: String,
		#[source]
		source: url::ParseError,
	},
}

/// How connection information is presented to a user or a viewer program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnFormat {
	/// The wire payload itself.
	#[default]
	Text,
	/// Java Web Start launcher for the TightVNC viewer.
	Jnlp,
	/// noVNC browser URL.
	Url,
	/// Pretty-printed JSON object.
	Json,
}

impl FromStr for ConnFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"text" | "txt" => Ok(ConnFormat::Text),
			"jnlp" => Ok(ConnFormat::Jnlp),
			"url" => Ok(ConnFormat::Url),
			"json" => Ok(ConnFormat::Json),
			_ => Err(format!("unknown connection format: {s}")),
		}
	}
}

impl fmt::Display for ConnFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnFormat::Text => write!(f, "text"),
			ConnFormat::Jnlp => write!(f, "jnlp"),
			ConnFormat::Url => write!(f, "url"),
			ConnFormat::Json => write!(f, "json"),
		}
	}
}

const JNLP_CODEBASE: &str = "http://mirror.osc.edu/mirror";

impl ConnectionInfo {
	/// Renders this connection in the requested format.
	///
	/// # Errors
	///
	/// [`FormatError::Url`] when `Url` is requested and the host or port
	/// cannot form a URL authority.
	pub fn render(&self, format: ConnFormat) -> Result<String, FormatError> {
		Ok(match format {
			ConnFormat::Text => self.to_payload(),
			ConnFormat::Jnlp => self.to_jnlp(),
			ConnFormat::Url => self.to_url()?.into(),
			ConnFormat::Json => {
				let value = serde_json::json!({
					"host": self.host(),
					"port": self.port(),
					"display": self.display(),
					"password": self.password(),
				});
				format!("{value:#}")
			}
		})
	}

	/// noVNC auto-connect URL, with the password form-encoded into the query.
	pub fn to_url(&self) -> Result<Url, FormatError> {
		let mut url = Url::parse(&format!("http://{}:{}/vnc_auto.html", self.host(), self.port())).map_err(
			|source| FormatError::Url {
				host: self.host().to_string(),
				port: self.port().to_string(),
				source,
			},
		)?;
		url.query_pairs_mut().append_pair("password", self.password());
		Ok(url)
	}

	/// TightVNC viewer launcher document.
	pub fn to_jnlp(&self) -> String {
		format!(
			r#"<?xml version="1.0" encoding="UTF-8"?>
<jnlp spec="1.0+" codebase="{codebase}" >
    <information>
        <title>TightVnc Viewer</title>
        <vendor>GlavSoft LLC.</vendor>
        <offline-allowed/>
    </information>
    <security>
        <all-permissions/>
    </security>
    <resources>
        <j2se version="1.6+"/>
        <jar href="TightVncViewerSigned.jar" main="true"/>
    </resources>
    <application-desc main-class="com.tightvnc.vncviewer.VncViewer">
        <argument>HOST</argument>
        <argument>{host}</argument>
        <argument>PORT</argument>
        <argument>{port}</argument>
        <argument>PASSWORD</argument>
        <argument>{password}</argument>
    </application-desc>
</jnlp>
"#,
			codebase = JNLP_CODEBASE,
			host = xml_escape(self.host()),
			port = xml_escape(self.port()),
			password = xml_escape(self.password()),
		)
	}
}

fn xml_escape(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&apos;"),
			_ => out.push(c),
		}
	}
	out
}
