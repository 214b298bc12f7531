use crate::error::Error;
use crate::probe::HttpFetch;
use reqwest::Url;
use std::sync::Arc;

/// Capability: turn text into encoded audio bytes.
pub trait SpeechSynth: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, Error>;
}

/// Announcement spoken for a channel.
pub fn announcement_text(channel: &str) -> String {
    format!("{} is now live.", channel)
}

/// Text-to-speech over a GET endpoint taking `voice` and `text` query
/// parameters and answering with raw MP3 bytes.
pub struct HttpSpeech {
    fetch: Arc<dyn HttpFetch>,
    endpoint: String,
    voice: String,
}

impl HttpSpeech {
    pub fn new(fetch: Arc<dyn HttpFetch>, endpoint: &str, voice: &str) -> Self {
        HttpSpeech {
            fetch,
            endpoint: endpoint.to_string(),
            voice: voice.to_string(),
        }
    }

    /// Request URL with the text escaped.
    pub fn request_url(&self, text: &str) -> Result<String, Error> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::InvalidSettings(format!("speech endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("voice", &self.voice)
            .append_pair("text", text);
        Ok(url.to_string())
    }
}

impl SpeechSynth for HttpSpeech {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, Error> {
        let url = self.request_url(text)?;
        let page = self.fetch.get(&url)?;
        if !page.is_success() {
            return Err(Error::HttpStatus {
                url,
                status: page.status,
            });
        }
        if page.body.is_empty() {
            return Err(Error::EmptyPayload);
        }
        Ok(page.body)
    }
}
