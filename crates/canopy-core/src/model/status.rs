use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Publish state derived from the publish window. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// `published` has not been set (unsaved drafts only).
    Unknown,
    /// Not published, or published without a publish date.
    Draft,
    /// Published with a publish date in the future.
    Scheduled,
    /// Published and inside the publish window.
    Live,
    /// The unpublish date has passed.
    Expired,
}

impl Status {
    /// Derive the status from the publish attributes as of `now`.
    ///
    /// Rules are evaluated top to bottom:
    /// 1. `published` unset → `Unknown`
    /// 2. `published == false` or no `publish_at` → `Draft`
    /// 3. `publish_at > now` → `Scheduled`
    /// 4. `unpublish_at < now` → `Expired`
    /// 5. otherwise → `Live`
    #[must_use]
    pub fn derive(
        published: Option<bool>,
        publish_at: Option<DateTime<Utc>>,
        unpublish_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(published) = published else {
            return Self::Unknown;
        };
        let Some(publish_at) = publish_at.filter(|_| published) else {
            return Self::Draft;
        };
        if publish_at > now {
            return Self::Scheduled;
        }
        if unpublish_at.is_some_and(|until| until < now) {
            return Self::Expired;
        }
        Self::Live
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "live" | "published" => Ok(Self::Live),
            "expired" | "outdated" => Ok(Self::Expired),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Status;
    use chrono::{Duration, Utc};

    #[test]
    fn status_table() {
        let now = Utc::now();
        let day = Duration::days(1);

        assert_eq!(Status::derive(None, None, None, now), Status::Unknown);
        assert_eq!(Status::derive(Some(false), None, None, now), Status::Draft);
        assert_eq!(
            Status::derive(Some(false), Some(now - day), None, now),
            Status::Draft
        );
        assert_eq!(Status::derive(Some(true), None, None, now), Status::Draft);
        assert_eq!(
            Status::derive(Some(true), Some(now - day), None, now),
            Status::Live
        );
        assert_eq!(
            Status::derive(Some(true), Some(now + day), None, now),
            Status::Scheduled
        );
        assert_eq!(
            Status::derive(Some(true), Some(now - day * 10), Some(now - day), now),
            Status::Expired
        );
    }

    #[test]
    fn window_edges() {
        let now = Utc::now();
        // publish_at == now is live; unpublish_at == now is still live.
        assert_eq!(Status::derive(Some(true), Some(now), None, now), Status::Live);
        assert_eq!(
            Status::derive(Some(true), Some(now), Some(now), now),
            Status::Live
        );
        // A future unpublish date does not affect a live entity.
        assert_eq!(
            Status::derive(
                Some(true),
                Some(now - Duration::hours(1)),
                Some(now + Duration::hours(1)),
                now
            ),
            Status::Live
        );
    }

    #[test]
    fn parse_accepts_legacy_names() {
        assert_eq!("published".parse::<Status>(), Ok(Status::Live));
        assert_eq!("outdated".parse::<Status>(), Ok(Status::Expired));
        assert_eq!("Draft".parse::<Status>(), Ok(Status::Draft));
        assert!("gone".parse::<Status>().is_err());
    }
}
