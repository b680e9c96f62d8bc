//! crates/note_access_core/src/domain.rs
//!
//! Defines the pure, core data structures for the note access flow.
//! These structs are independent of any storage backend or transport.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a note as issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of document attached to a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Pdf,
    Doc,
    Docx,
}

impl DocumentType {
    pub fn is_pdf(self) -> bool {
        matches!(self, DocumentType::Pdf)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Pdf => "PDF",
            DocumentType::Doc => "DOC",
            DocumentType::Docx => "DOCX",
        }
    }
}

/// Note metadata needed to open the reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title_en: String,
    #[serde(default)]
    pub title_np: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub file_name: String,
}

impl Note {
    /// Title in the requested language, falling back to English when the
    /// Nepali title is blank.
    pub fn localized_title(&self, nepali: bool) -> &str {
        if nepali && !self.title_np.trim().is_empty() {
            &self.title_np
        } else {
            &self.title_en
        }
    }
}

/// Backend response to an access request: a short-lived signed viewer URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteAccessGrant {
    pub note_id: NoteId,
    pub viewer_url: String,
    pub expires_in_seconds: i64,
}

/// Process-wide access state, persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessState {
    pub is_premium: bool,
    /// Local calendar day on which a view-unlock ad was last watched.
    pub last_view_ad_date: Option<NaiveDate>,
    /// Notes permanently unlocked through a download reward. Append-only.
    pub downloaded_note_ids: BTreeSet<NoteId>,
    pub practice_session_count: u32,
}

impl AccessState {
    pub fn is_downloaded(&self, note_id: NoteId) -> bool {
        self.downloaded_note_ids.contains(&note_id)
    }

    /// Returns `true` if the note was newly inserted.
    pub fn mark_downloaded(&mut self, note_id: NoteId) -> bool {
        self.downloaded_note_ids.insert(note_id)
    }
}

/// A viewer session opened from a single access grant. Lives only as long
/// as the reader screen that requested it.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    pub grant: NoteAccessGrant,
    pub document_type: DocumentType,
    pub opened_at: DateTime<Utc>,
}

impl ViewerSession {
    pub fn new(grant: NoteAccessGrant, document_type: DocumentType, opened_at: DateTime<Utc>) -> Self {
        Self {
            grant,
            document_type,
            opened_at,
        }
    }

    /// Saturates at the latest representable instant when the backend's TTL
    /// does not fit.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.grant.expires_in_seconds.max(0))
            .and_then(|ttl| self.opened_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time left before the signed URL expires, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let left = self.expires_at() - now;
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grant(expires: i64) -> NoteAccessGrant {
        NoteAccessGrant {
            note_id: NoteId(7),
            viewer_url: "https://files.example/signed?sig=abc".to_string(),
            expires_in_seconds: expires,
        }
    }

    #[test]
    fn viewer_session_counts_down_to_zero() {
        let opened = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let session = ViewerSession::new(grant(300), DocumentType::Pdf, opened);

        assert_eq!(session.remaining(opened), Duration::seconds(300));
        assert_eq!(
            session.remaining(opened + Duration::seconds(120)),
            Duration::seconds(180)
        );
        assert!(!session.is_expired(opened + Duration::seconds(299)));
        assert!(session.is_expired(opened + Duration::seconds(300)));
        assert_eq!(session.remaining(opened + Duration::hours(1)), Duration::zero());
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_overflowing() {
        let opened = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let session = ViewerSession::new(grant(i64::MAX), DocumentType::Pdf, opened);

        assert_eq!(session.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!session.is_expired(opened + Duration::days(365)));
        assert!(session.remaining(opened) > Duration::days(365));

        let negative = ViewerSession::new(grant(i64::MIN), DocumentType::Pdf, opened);
        assert!(negative.is_expired(opened));
        assert_eq!(negative.remaining(opened), Duration::zero());
    }

    #[test]
    fn downloaded_set_is_deduplicated() {
        let mut state = AccessState::default();
        assert!(state.mark_downloaded(NoteId(3)));
        assert!(!state.mark_downloaded(NoteId(3)));
        assert_eq!(state.downloaded_note_ids.len(), 1);
        assert!(state.is_downloaded(NoteId(3)));
    }

    #[test]
    fn grant_uses_backend_field_names() {
        let json = r#"{"note_id":42,"viewer_url":"https://x/y","expires_in_seconds":600}"#;
        let parsed: NoteAccessGrant = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.note_id, NoteId(42));
        assert_eq!(parsed.expires_in_seconds, 600);
    }

    #[test]
    fn document_type_reads_upper_case_tags() {
        let note: Note = serde_json::from_str(
            r#"{"id":1,"title_en":"Polity","title_np":"","document_type":"DOCX","file_name":"a.docx"}"#,
        )
        .unwrap();
        assert_eq!(note.document_type, DocumentType::Docx);
        assert_eq!(note.localized_title(true), "Polity");
    }
}
