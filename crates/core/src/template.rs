//! Rendering job scripts from a resolved context.
//!
//! Templates use a small mustache subset:
//!
//! - `{{key}}` - the context value, or nothing when the key is absent
//! - `{{#key}}...{{/key}}` - kept when the value is truthy
//! - `{{^key}}...{{/key}}` - kept when the value is not truthy
//!
//! A value is truthy when it is non-empty and not `false`. A newline directly
//! after a section tag is dropped so sections can sit on their own lines.

use std::collections::BTreeMap;

use crate::config::ResolvedContext;
use crate::error::{Error, Result};

/// Produces a job script for a template id.
pub trait TemplateRenderer: Send + Sync {
	fn render(&self, template_id: &str, context: &ResolvedContext) -> Result<String>;
}

const VNC_TEMPLATE: &str = r#"#!/bin/bash
# VNC session for {{batch}} on {{cluster}}
umask 077

export OUTDIR="{{outdir}}"
export XSTARTUP_DIR="{{xstartup_dir}}"
CONN_FILE="${OUTDIR}/${PBS_JOBID}.conn"

{{#load_turbovnc}}
{{load_turbovnc}}
{{/load_turbovnc}}
VNCSERVER="{{vncserver}}"
VNCSERVER="${VNCSERVER:-vncserver}"

PASSWD_FILE="$(mktemp)"
PASSWORD="$(head -c 32 /dev/urandom | tr -dc 'A-Za-z0-9' | head -c 8)"
echo "${PASSWORD}" | vncpasswd -f > "${PASSWD_FILE}"

VNC_ARGS="$(printf '%s' "${VNC_ARGS:-}" | tr ',' ' ')"
VNC_OUT="$("${VNCSERVER}" -log "${OUTDIR}/${PBS_JOBID}.vnc.log" -rfbauth "${PASSWD_FILE}" \
	-geometry {{geometry}} -dpi {{dpi}} {{#fonts}}-fp "{{fonts}}" {{/fonts}}${VNC_ARGS} 2>&1)"
DISPLAY_NUM="$(echo "${VNC_OUT}" | sed -n 's/^New .* desktop is [^:]*\(:[0-9]\+\).*$/\1/p')"
if [ -z "${DISPLAY_NUM}" ]; then
	echo "vncserver failed to start:" >&2
	echo "${VNC_OUT}" >&2
	exit 1
fi
PORT=$((5900 + ${DISPLAY_NUM#:}))
HOST="$(hostname)"

payload() {
	printf 'Host: %s\nPort: %s\nDisplay: %s\nPass: %s\n' "${HOST}" "${PORT}" "${DISPLAY_NUM}" "${PASSWORD}"
}

{{#tcp_server}}
payload > "/dev/tcp/${LISTEN_HOST}/${LISTEN_PORT}"
{{/tcp_server}}
{{^tcp_server}}
payload > "${CONN_FILE}.part"
mv "${CONN_FILE}.part" "${CONN_FILE}"
{{/tcp_server}}

export DISPLAY="${DISPLAY_NUM}"
"{{xstartup}}"

{{#xlogout}}
"{{xlogout}}"
{{/xlogout}}
"${VNCSERVER}" -kill "${DISPLAY_NUM}"
rm -f "${PASSWD_FILE}"
"#;

const SERVER_TEMPLATE: &str = r#"#!/bin/bash
# Server session for {{batch}} on {{cluster}}
umask 077

export OUTDIR="{{outdir}}"
export XSTARTUP_DIR="{{xstartup_dir}}"
CONN_FILE="${OUTDIR}/${PBS_JOBID}.conn"
SERVER_OUT="${OUTDIR}/${PBS_JOBID}.server.log"

# The startup script reports its own Host/Port/Display/Pass lines on stdout.
"{{xstartup}}" > "${SERVER_OUT}" 2>&1 &
SERVER_PID=$!

for _ in $(seq 1 120); do
	grep -q '^Pass: ' "${SERVER_OUT}" && break
	kill -0 "${SERVER_PID}" 2> /dev/null || exit 1
	sleep 1
done

{{#tcp_server}}
grep -E '^(Host|Port|Display|Pass): ' "${SERVER_OUT}" > "/dev/tcp/${LISTEN_HOST}/${LISTEN_PORT}"
{{/tcp_server}}
{{^tcp_server}}
grep -E '^(Host|Port|Display|Pass): ' "${SERVER_OUT}" > "${CONN_FILE}.part"
mv "${CONN_FILE}.part" "${CONN_FILE}"
{{/tcp_server}}

wait "${SERVER_PID}"
{{#xlogout}}
"{{xlogout}}"
{{/xlogout}}
"#;

/// Templates compiled into the crate, keyed by id.
///
/// Ships `vnc` and `server`; more can be registered with
/// [`insert`](Self::insert).
#[derive(Debug, Clone)]
pub struct EmbeddedTemplates {
	templates: BTreeMap<String, String>,
}

impl Default for EmbeddedTemplates {
	fn default() -> Self {
		Self::new()
	}
}

impl EmbeddedTemplates {
	pub fn new() -> Self {
		let templates = [("vnc", VNC_TEMPLATE), ("server", SERVER_TEMPLATE)]
			.into_iter()
			.map(|(id, body)| (id.to_string(), body.to_string()))
			.collect();
		Self { templates }
	}

	/// Adds or replaces a template.
	pub fn insert(&mut self, id: impl Into<String>, body: impl Into<String>) {
		self.templates.insert(id.into(), body.into());
	}

	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.templates.keys().map(String::as_str)
	}
}

impl TemplateRenderer for EmbeddedTemplates {
	fn render(&self, template_id: &str, context: &ResolvedContext) -> Result<String> {
		let body = self
			.templates
			.get(template_id)
			.ok_or_else(|| Error::Render(format!("unknown template '{template_id}'")))?;
		render_str(body, context).map_err(|msg| Error::Render(format!("template '{template_id}': {msg}")))
	}
}

fn truthy(value: Option<&str>) -> bool {
	matches!(value, Some(v) if !v.is_empty() && v != "false")
}

fn skip_newline(text: &str) -> &str {
	text.strip_prefix("\r\n")
		.or_else(|| text.strip_prefix('\n'))
		.unwrap_or(text)
}

fn render_str(template: &str, context: &ResolvedContext) -> std::result::Result<String, String> {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(open) = rest.find("{{") {
		out.push_str(&rest[..open]);
		let after = &rest[open + 2..];
		let close = after.find("}}").ok_or("unclosed tag")?;
		let tag = after[..close].trim();
		rest = &after[close + 2..];

		if let Some(name) = tag.strip_prefix('/') {
			return Err(format!("unexpected closing tag '{}'", name.trim()));
		}

		let section = tag
			.strip_prefix('#')
			.map(|name| (name.trim(), true))
			.or_else(|| tag.strip_prefix('^').map(|name| (name.trim(), false)));

		match section {
			Some((name, keep_if_truthy)) => {
				let end_tag = format!("{{{{/{name}}}}}");
				let body = skip_newline(rest);
				let end = body.find(&end_tag).ok_or_else(|| format!("section '{name}' is never closed"))?;
				if truthy(context.get(name)) == keep_if_truthy {
					out.push_str(&render_str(&body[..end], context)?);
				}
				rest = skip_newline(&body[end + end_tag.len()..]);
			}
			None => out.push_str(context.get(tag).unwrap_or_default()),
		}
	}

	out.push_str(rest);
	Ok(out)
}
