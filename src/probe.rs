use log::debug;
use reqwest::Client;

/// Length-discovery request, distinct from the actual transfer request.
pub struct LengthProbe {
    client: Client,
}

impl LengthProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Plain (no-range) GET against `url`. Returns the declared content
    /// length, or `None` on transport error, non-success status, or an
    /// absent/zero length header. A zero-length declaration is
    /// indistinguishable from a missing header, so it counts as unknown.
    /// No retries at this layer.
    pub async fn probe(&self, url: &str) -> Option<i64> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("length probe for {} failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("length probe for {} got HTTP {}", url, response.status());
            return None;
        }
        match response.content_length() {
            Some(len) if len > 0 => Some(len as i64),
            _ => None,
        }
    }
}
