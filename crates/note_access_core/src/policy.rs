//! crates/note_access_core/src/policy.rs
//!
//! Pure access decisions. Nothing here touches storage or the clock; the
//! caller supplies the current state and "today".

use chrono::NaiveDate;
use crate::domain::{AccessState, NoteId};

/// Number of completed practice sessions between two interstitial ads.
pub const PRACTICE_SESSIONS_PER_AD: u32 = 2;

/// Whether a note may be viewed without watching a reward ad first.
///
/// Premium users and downloaded notes are always open. Otherwise one
/// watched ad per calendar day unlocks viewing for every note.
pub fn decide_view_access(note_id: NoteId, state: &AccessState, today: NaiveDate) -> bool {
    if decide_download_access(note_id, state) {
        return true;
    }
    state.last_view_ad_date == Some(today)
}

/// Whether a note may be downloaded without watching a reward ad first.
/// There is no daily pass for downloads.
pub fn decide_download_access(note_id: NoteId, state: &AccessState) -> bool {
    state.is_premium || state.is_downloaded(note_id)
}

/// Given the practice counter *after* recording the session that just
/// finished, decides whether an interstitial is due.
pub fn should_show_practice_interstitial(completed_sessions: u32) -> bool {
    completed_sessions % PRACTICE_SESSIONS_PER_AD == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn premium_opens_everything() {
        let state = AccessState {
            is_premium: true,
            ..Default::default()
        };
        assert!(decide_view_access(NoteId(1), &state, day(1)));
        assert!(decide_download_access(NoteId(1), &state));
    }

    #[test]
    fn downloaded_notes_skip_both_gates() {
        let mut state = AccessState::default();
        state.mark_downloaded(NoteId(5));
        assert!(decide_view_access(NoteId(5), &state, day(9)));
        assert!(decide_download_access(NoteId(5), &state));
        assert!(!decide_download_access(NoteId(6), &state));
    }

    #[test]
    fn daily_pass_only_covers_the_same_day_and_only_viewing() {
        let state = AccessState {
            last_view_ad_date: Some(day(4)),
            ..Default::default()
        };
        assert!(decide_view_access(NoteId(10), &state, day(4)));
        assert!(decide_view_access(NoteId(11), &state, day(4)));
        assert!(!decide_view_access(NoteId(10), &state, day(5)));
        assert!(!decide_download_access(NoteId(10), &state));
    }

    #[test]
    fn fresh_state_requires_an_ad() {
        let state = AccessState::default();
        assert!(!decide_view_access(NoteId(42), &state, day(1)));
        assert!(!decide_download_access(NoteId(42), &state));
    }

    #[test]
    fn practice_interstitial_every_second_session() {
        let due: Vec<bool> = (1..=5).map(should_show_practice_interstitial).collect();
        assert_eq!(due, vec![false, true, false, true, false]);
    }
}
