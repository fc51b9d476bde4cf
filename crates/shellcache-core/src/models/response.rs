use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::fetch::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// A 200 response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Status in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into the matching `FetchError`.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_ok() {
            Ok(self)
        } else {
            let body = String::from_utf8_lossy(&self.body);
            Err(FetchError::from_status(self.status, &body))
        }
    }
}

/// A response as stored in a blob cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Request key the entry was stored under.
    pub url: String,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, response: Response) -> Self {
        Self {
            url: url.into(),
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
