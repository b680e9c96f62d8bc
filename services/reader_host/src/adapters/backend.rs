//! services/reader_host/src/adapters/backend.rs
//!
//! This module contains the adapter for the notes REST backend.
//! It implements the `NoteBackend` port from the `core` crate using `reqwest`.

use async_trait::async_trait;
use note_access_core::domain::{Note, NoteAccessGrant, NoteId};
use note_access_core::ports::{NoteBackend, PortError, PortResult};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `NoteBackend` port over HTTP.
#[derive(Clone)]
pub struct HttpNoteBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpNoteBackend {
    /// Creates a new `HttpNoteBackend`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn note_url(&self, note_id: NoteId) -> String {
        format!("{}/notes/{}/", self.base_url, note_id)
    }

    fn access_url(&self, note_id: NoteId) -> String {
        format!("{}/notes/{}/request-access/", self.base_url, note_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        response: reqwest::Response,
    ) -> PortResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| PortError::Unexpected(format!("Malformed {} response: {}", what, e)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, what, &body))
    }
}

/// Translates a non-success HTTP status into the matching port error.
fn map_status(status: StatusCode, what: &str, body: &str) -> PortError {
    match status {
        StatusCode::NOT_FOUND => PortError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        _ => PortError::Unexpected(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}

//=========================================================================================
// `NoteBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl NoteBackend for HttpNoteBackend {
    async fn get_note(&self, note_id: NoteId) -> PortResult<Note> {
        let url = self.note_url(note_id);
        debug!(%url, "Fetching note metadata.");
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.parse_response(&format!("Note {}", note_id), response).await
    }

    async fn request_access(&self, note_id: NoteId) -> PortResult<NoteAccessGrant> {
        let url = self.access_url(note_id);
        debug!(%url, "Requesting note access.");
        let response = self
            .authorize(self.client.post(url))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let grant: NoteAccessGrant = self
            .parse_response(&format!("Access grant for note {}", note_id), response)
            .await?;
        if grant.note_id != note_id {
            return Err(PortError::Unexpected(format!(
                "Backend granted note {} when note {} was requested",
                grant.note_id, note_id
            )));
        }
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_the_backend_layout() {
        let backend =
            HttpNoteBackend::new("https://api.example.com/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(backend.note_url(NoteId(42)), "https://api.example.com/api/notes/42/");
        assert_eq!(
            backend.access_url(NoteId(42)),
            "https://api.example.com/api/notes/42/request-access/"
        );
    }

    #[test]
    fn statuses_map_to_port_errors() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "Note 1", ""),
            PortError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "Note 1", ""),
            PortError::Unauthorized
        ));
        match map_status(StatusCode::BAD_GATEWAY, "Note 1", "upstream down") {
            PortError::Unexpected(message) => assert_eq!(message, "HTTP 502: upstream down"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
