//! Native messaging host for the app's browser extension.
//!
//! Messages in both directions are a native-endian `u32` byte length followed
//! by that many bytes of UTF-8 JSON. The host answers `version` requests with
//! the app's identity and opens `url` requests in the user's default browser.

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use ssb_engine::{launch_services_path, read_url_handler};
use tracing::{debug, warn};

use crate::AppIdentityArgs;

/// Largest request accepted from the browser.
pub(crate) const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

const OPEN: &str = "/usr/bin/open";
const CHROME_BUNDLE_ID: &str = "com.google.chrome";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct HostIdentity {
    pub version: String,
    #[serde(rename = "ssbID")]
    pub id: String,
    #[serde(rename = "ssbName")]
    pub name: String,
    #[serde(rename = "ssbShortName")]
    pub short_name: String,
}

impl HostIdentity {
    pub(crate) fn from_args(
        identity: &AppIdentityArgs,
        display_name: Option<String>,
        short_name: Option<String>,
    ) -> Result<Self> {
        let id = identity
            .id
            .clone()
            .context("no app identifier; pass --app-id or set SSBIdentifier")?;
        let version = identity
            .version
            .clone()
            .context("no app version; pass --app-version or set SSBVersion")?;
        let short_name = short_name
            .or_else(|| identity.name.clone())
            .unwrap_or_else(|| id.clone());
        Ok(Self {
            version,
            id,
            name: display_name.unwrap_or_else(|| short_name.clone()),
            short_name,
        })
    }
}

/// Reads one framed message. `None` once the browser closes the pipe.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err).context("failed to read message length"),
    }
    let length = u32::from_ne_bytes(header);
    if length > MAX_MESSAGE_BYTES {
        bail!("message of {length} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit");
    }
    let mut body = vec![0u8; length as usize];
    reader
        .read_exact(&mut body)
        .with_context(|| format!("message ended before its {length} bytes"))?;
    Ok(Some(body))
}

pub(crate) fn write_message<W: Write>(writer: &mut W, message: &Value) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    let length = u32::try_from(body.len()).context("message is too large to frame")?;
    writer.write_all(&length.to_ne_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    debug!(message = %message, "sent message to extension");
    Ok(())
}

/// Opens a URL, optionally with a specific application.
pub(crate) trait UrlOpener {
    fn open(&self, url: &str, handler: Option<&str>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str, handler: Option<&str>) -> Result<()> {
        let mut command = Command::new(OPEN);
        if let Some(handler) = handler {
            command.arg("-b").arg(handler);
        }
        let status = command
            .arg(url)
            .status()
            .with_context(|| format!("failed to run {OPEN}"))?;
        if !status.success() {
            bail!("{OPEN} could not open {url}: {status}");
        }
        Ok(())
    }
}

/// The default browser to name explicitly when opening links.
///
/// An app built on Chrome shares Chrome's bundle id, so a plain `open` of a
/// link could land back in the app itself. Only then is the handler pinned.
pub(crate) fn pinned_url_handler(home: &Path) -> Option<String> {
    let prefs = launch_services_path(home);
    if !prefs.is_file() {
        return None;
    }
    match read_url_handler(&prefs, "http") {
        Ok(Some(handler)) if handler.eq_ignore_ascii_case(CHROME_BUNDLE_ID) => Some(handler),
        Ok(_) => None,
        Err(err) => {
            warn!("failed to read the default browser: {err:#}");
            None
        }
    }
}

pub(crate) struct NativeHost<'a> {
    pub identity: HostIdentity,
    pub opener: &'a dyn UrlOpener,
    pub pinned_handler: Option<String>,
}

impl NativeHost<'_> {
    /// Answers messages until the browser closes the pipe. Returns how many
    /// messages were read.
    #[tracing::instrument(skip_all, fields(app = %self.identity.id))]
    pub(crate) fn serve<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<usize> {
        debug!("native messaging host running");
        let mut handled = 0;
        while let Some(frame) = read_frame(reader)? {
            handled += 1;
            let message: Value = match serde_json::from_slice(&frame) {
                Ok(message) => message,
                Err(err) => {
                    warn!("ignoring malformed message: {err}");
                    continue;
                }
            };
            debug!(message = %message, "received message from extension");
            for reply in self.respond(&message)? {
                write_message(writer, &reply)?;
            }
        }
        Ok(handled)
    }

    fn respond(&self, message: &Value) -> Result<Vec<Value>> {
        let mut replies = Vec::new();
        if message.get("version").is_some() {
            replies.push(serde_json::to_value(&self.identity)?);
        }
        if let Some(url) = message.get("url") {
            let opened = url
                .as_str()
                .ok_or_else(|| anyhow!("url is not a string"))
                .and_then(|url| self.opener.open(url, self.pinned_handler.as_deref()));
            let result = match opened {
                Ok(()) => "success",
                Err(err) => {
                    warn!(url = %url, "failed to open link: {err:#}");
                    "error"
                }
            };
            replies.push(json!({ "result": result, "url": url }));
        }
        Ok(replies)
    }
}
