// ── Subscription selectors ──
//
// What a client asked for. Every session is currently served the full
// subscriber tree; the requested paths are kept for logging and the
// session registry.

use chrono::{DateTime, Utc};

use crate::model::UpdateBatch;
use crate::store::Snapshot;

/// Paths a subscription requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// The whole tree (no paths, or the root path).
    #[default]
    All,
    /// Specific paths below the subscribers container.
    Paths(Vec<String>),
}

impl Selector {
    /// Build a selector from raw request paths.
    ///
    /// Blank entries are dropped; an empty list or a root path (`""`, `"/"`)
    /// selects everything.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = Vec::new();
        for path in paths {
            let trimmed = path.as_ref().trim().trim_matches('/');
            if trimmed.is_empty() {
                return Self::All;
            }
            kept.push(trimmed.to_owned());
        }
        if kept.is_empty() {
            Self::All
        } else {
            Self::Paths(kept)
        }
    }

    pub fn paths(&self) -> &[String] {
        match self {
            Self::All => &[],
            Self::Paths(p) => p,
        }
    }

    /// Build the batch this selector is served for one generation.
    ///
    /// Narrower selectors still receive the full tree.
    pub fn batch(&self, snapshot: &Snapshot, timestamp: DateTime<Utc>) -> UpdateBatch {
        snapshot.to_batch(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_selects_everything() {
        assert_eq!(Selector::from_paths(Vec::<String>::new()), Selector::All);
        assert_eq!(Selector::from_paths(["/"]), Selector::All);
        assert_eq!(Selector::from_paths(["subscriber", ""]), Selector::All);
    }

    #[test]
    fn paths_are_normalized() {
        let sel = Selector::from_paths(["/subscriber/statistics/", " state "]);
        assert_eq!(sel.paths(), ["subscriber/statistics", "state"]);
    }
}
