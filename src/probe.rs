//! Liveness probes.
//!
//! A probe answers one question per call: is this channel broadcasting right
//! now? Three heuristics are available and none is treated as authoritative;
//! the deployment picks one through `Settings::probe`. Any transport failure
//! or unexpected response reads as offline and is logged. Probes never cache
//! or retry; the next poll cycle is the retry.

use crate::error::Error;
use crate::settings::{ProbeStrategy, Settings};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("livealert/", env!("CARGO_PKG_VERSION"));

/// Result of a single GET after redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    /// URL that finally answered, which differs from the request on redirect.
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outbound HTTP seam shared by probes and the speech synthesizer.
pub trait HttpFetch: Send + Sync {
    fn get(&self, url: &str) -> Result<FetchedPage, Error>;
}

/// Blocking reqwest transport.
pub struct ReqwestFetch {
    client: reqwest::blocking::Client,
}

impl ReqwestFetch {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| Error::Transport {
                url: String::new(),
                source,
            })?;
        Ok(ReqwestFetch { client })
    }
}

impl HttpFetch for ReqwestFetch {
    fn get(&self, url: &str) -> Result<FetchedPage, Error> {
        let transport = |source| Error::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.bytes().map_err(transport)?.to_vec();
        Ok(FetchedPage {
            status,
            final_url,
            body,
        })
    }
}

/// Capability: a single liveness check.
pub trait StatusProbe: Send + Sync {
    fn probe(&self, channel: &str) -> bool;
}

/// Substitute the channel into a `{channel}` URL template.
pub fn fill_template(template: &str, channel: &str) -> String {
    template.replace("{channel}", channel)
}

/// Channel page contains a marker string only while live.
pub struct PageKeywordProbe {
    fetch: Arc<dyn HttpFetch>,
    template: String,
    marker: String,
}

impl PageKeywordProbe {
    pub fn new(fetch: Arc<dyn HttpFetch>, template: &str, marker: &str) -> Self {
        PageKeywordProbe {
            fetch,
            template: template.to_string(),
            marker: marker.to_string(),
        }
    }
}

impl StatusProbe for PageKeywordProbe {
    fn probe(&self, channel: &str) -> bool {
        let url = fill_template(&self.template, channel);
        match fetch_success(self.fetch.as_ref(), &url, channel) {
            Some(page) => page.text().contains(&self.marker),
            None => false,
        }
    }
}

/// Uptime endpoint answers with text that mentions "offline" when down.
pub struct UptimeTextProbe {
    fetch: Arc<dyn HttpFetch>,
    template: String,
}

impl UptimeTextProbe {
    pub fn new(fetch: Arc<dyn HttpFetch>, template: &str) -> Self {
        UptimeTextProbe {
            fetch,
            template: template.to_string(),
        }
    }
}

impl StatusProbe for UptimeTextProbe {
    fn probe(&self, channel: &str) -> bool {
        let url = fill_template(&self.template, channel);
        match fetch_success(self.fetch.as_ref(), &url, channel) {
            Some(page) => {
                let text = page.text();
                let text = text.trim();
                !text.is_empty() && !text.to_lowercase().contains("offline")
            }
            None => false,
        }
    }
}

/// Preview thumbnail only exists while live; otherwise the CDN answers 404
/// or redirects to a placeholder image.
pub struct ThumbnailProbe {
    fetch: Arc<dyn HttpFetch>,
    template: String,
}

impl ThumbnailProbe {
    pub fn new(fetch: Arc<dyn HttpFetch>, template: &str) -> Self {
        ThumbnailProbe {
            fetch,
            template: template.to_string(),
        }
    }
}

impl StatusProbe for ThumbnailProbe {
    fn probe(&self, channel: &str) -> bool {
        let url = fill_template(&self.template, channel);
        match self.fetch.get(&url) {
            Ok(page) if page.status == 404 => false,
            Ok(page) if !same_url(&page.final_url, &url) || page.final_url.contains("404") => {
                debug!(channel, "thumbnail redirected to {}", page.final_url);
                false
            }
            Ok(page) if page.is_success() => true,
            Ok(page) => {
                warn!(channel, "probe {} answered HTTP {}", url, page.status);
                false
            }
            Err(e) => {
                warn!(channel, "probe failed: {}", e);
                false
            }
        }
    }
}

/// Compare URLs after normalization, since the transport reports the final
/// URL in its serialized form.
fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn fetch_success(fetch: &dyn HttpFetch, url: &str, channel: &str) -> Option<FetchedPage> {
    match fetch.get(url) {
        Ok(page) if page.is_success() => Some(page),
        Ok(page) => {
            warn!(channel, "probe {} answered HTTP {}", url, page.status);
            None
        }
        Err(e) => {
            warn!(channel, "probe failed: {}", e);
            None
        }
    }
}

/// Build the probe selected in settings.
pub fn build_probe(settings: &Settings, fetch: Arc<dyn HttpFetch>) -> Box<dyn StatusProbe> {
    let template = settings.probe_template();
    match settings.probe {
        ProbeStrategy::PageKeyword => {
            Box::new(PageKeywordProbe::new(fetch, template, &settings.page_marker))
        }
        ProbeStrategy::UptimeText => Box::new(UptimeTextProbe::new(fetch, template)),
        ProbeStrategy::Thumbnail => Box::new(ThumbnailProbe::new(fetch, template)),
    }
}
