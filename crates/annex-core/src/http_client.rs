//! Blocking HTTP client: one Agent for connection reuse, fixed per-request timeout.
//!
//! There is no retry loop here. A request either completes within the
//! timeout or surfaces as [`AnnexError::Transport`].

use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;

use crate::error::{AnnexError, AnnexResult};

/// Per-request timeout used when configuration does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Result of a GET that reached the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fetch {
    /// Body written; byte count.
    Found(u64),
    /// Server answered 404.
    Missing,
}

#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }

    /// GET `url` and stream the raw body into `out`.
    pub fn fetch(&self, url: &str, out: &mut dyn Write) -> AnnexResult<Fetch> {
        let transport = |reason: String| AnnexError::Transport {
            target: url.to_string(),
            reason,
        };
        debug!("GET {}", url);
        let resp = match self.agent.get(url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(404, _)) => return Ok(Fetch::Missing),
            Err(ureq::Error::Status(code, _)) => return Err(transport(format!("HTTP {}", code))),
            Err(e) => return Err(transport(e.to_string())),
        };
        let status = resp.status();
        if !(200..300).contains(&status) {
            return Err(transport(format!("HTTP {}", status)));
        }
        let mut reader = resp.into_reader();
        let n = io::copy(&mut reader, out).map_err(|e| transport(e.to_string()))?;
        Ok(Fetch::Found(n))
    }
}
