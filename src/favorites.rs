// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A joke somebody chose to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Favorite {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) image: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

/// The body of a create request, before validation.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Candidate {
    pub(crate) id: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) image: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum Invalid {
    #[error("invalid input: `id` is required")]
    MissingId,

    #[error("invalid input: `text` is required")]
    MissingText,

    #[error("invalid input: malformed request body")]
    Malformed,

    #[error("invalid input: malformed `id` in path")]
    MalformedId,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Candidate {
    /// Validates the candidate and stamps it with the next creation time.
    pub(crate) fn favorite(self, clock: &Clock) -> Result<Favorite, Invalid> {
        let id = present(self.id).ok_or(Invalid::MissingId)?;
        let text = present(self.text).ok_or(Invalid::MissingText)?;
        let image = self.image.filter(|image| !image.is_empty());

        Ok(Favorite {
            id,
            text,
            image,
            created_at: clock.now(),
        })
    }
}

/// Hands out strictly increasing creation times at microsecond precision.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        let next = match *last {
            Some(previous) if now <= previous => previous + TimeDelta::microseconds(1),
            _ => now,
        };
        *last = Some(next);

        next
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use test_log::test;

    use super::{Candidate, Clock, Invalid};

    fn candidate(id: Option<&str>, text: Option<&str>, image: Option<&str>) -> Candidate {
        Candidate {
            id: id.map(str::to_string),
            text: text.map(str::to_string),
            image: image.map(str::to_string),
        }
    }

    #[test]
    fn valid_candidate() {
        let clock = Clock::default();
        let favorite = candidate(Some("1"), Some("a joke"), Some("http://x/img.png"))
            .favorite(&clock)
            .unwrap();

        assert_eq!(favorite.id, "1");
        assert_eq!(favorite.text, "a joke");
        assert_eq!(favorite.image.as_deref(), Some("http://x/img.png"));
    }

    #[test]
    fn missing_fields() {
        let clock = Clock::default();

        assert_eq!(
            candidate(None, Some("a joke"), None).favorite(&clock),
            Err(Invalid::MissingId)
        );
        assert_eq!(
            candidate(Some(""), Some("a joke"), None).favorite(&clock),
            Err(Invalid::MissingId)
        );
        assert_eq!(
            candidate(Some("1"), None, None).favorite(&clock),
            Err(Invalid::MissingText)
        );
        assert_eq!(
            candidate(Some("1"), Some(" \t"), None).favorite(&clock),
            Err(Invalid::MissingText)
        );
    }

    #[test]
    fn empty_image_is_absent() {
        let favorite = candidate(Some("1"), Some("a joke"), Some(""))
            .favorite(&Clock::default())
            .unwrap();

        assert_eq!(favorite.image, None);
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = Clock::default();
        let mut previous = clock.now();

        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > previous);
            assert_eq!(next.timestamp_subsec_nanos() % 1000, 0);
            previous = next;
        }
    }

    #[test]
    fn wire_format() {
        let favorite = candidate(Some("1"), Some("a joke"), None)
            .favorite(&Clock::default())
            .unwrap();
        let value = serde_json::to_value(&favorite).unwrap();

        assert_eq!(value["id"], json!("1"));
        assert_eq!(value["text"], json!("a joke"));
        assert_eq!(value["image"], json!(null));
        assert!(value["createdAt"].is_string());
        assert!(value.get("created_at").is_none());
    }
}
