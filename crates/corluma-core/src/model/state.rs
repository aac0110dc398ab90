// ── Aggregate discovery state ──
//
// Coarse classification of an engine's buckets, consumed by the CLI (and
// any other front end) instead of per-device errors.

use serde::Serialize;
use strum::{Display, EnumIter};

/// What an engine has to show for itself right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryState {
    /// Every known device is connected.
    AllConnected,
    /// Some devices are connected, others are still pending.
    SomeConnected,
    /// Previously paired devices have not been reached yet.
    LookingForPrevious,
    /// Only unidentified candidates have been seen.
    UnknownFound,
    /// Nothing at all so far.
    NothingFound,
    /// The broadcast listener could not start and there is nothing to show.
    ConnectionError,
}

impl DiscoveryState {
    /// Short human description for status lines.
    pub fn describe(self) -> &'static str {
        match self {
            Self::AllConnected => "all devices connected",
            Self::SomeConnected => "some devices connected",
            Self::LookingForPrevious => "looking for previously paired devices",
            Self::UnknownFound => "found devices that need pairing",
            Self::NothingFound => "nothing found yet",
            Self::ConnectionError => "cannot listen for broadcasts",
        }
    }
}

/// Bucket populations fed to [`reduce_state`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub found: usize,
    pub not_found: usize,
    pub unknown: usize,
}

impl BucketCounts {
    pub fn total(self) -> usize {
        self.found + self.not_found + self.unknown
    }
}

/// Map bucket populations to a [`DiscoveryState`].
///
/// Precedence: found only → all connected; found plus anything else →
/// some connected; any not-found → looking for previous; nothing at all
/// → nothing found (or connection error if the listener failed); only
/// unknown → unknown found.
pub fn reduce_state(counts: BucketCounts, connection_error: bool) -> DiscoveryState {
    let BucketCounts {
        found,
        not_found,
        unknown,
    } = counts;

    if found > 0 {
        if not_found == 0 && unknown == 0 {
            DiscoveryState::AllConnected
        } else {
            DiscoveryState::SomeConnected
        }
    } else if not_found > 0 {
        DiscoveryState::LookingForPrevious
    } else if unknown == 0 {
        if connection_error {
            DiscoveryState::ConnectionError
        } else {
            DiscoveryState::NothingFound
        }
    } else {
        DiscoveryState::UnknownFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(found: usize, not_found: usize, unknown: usize) -> BucketCounts {
        BucketCounts {
            found,
            not_found,
            unknown,
        }
    }

    #[test]
    fn precedence_over_small_grid() {
        for found in 0..3 {
            for not_found in 0..3 {
                for unknown in 0..3 {
                    let state = reduce_state(counts(found, not_found, unknown), false);
                    let expected = if found > 0 && not_found == 0 && unknown == 0 {
                        DiscoveryState::AllConnected
                    } else if found > 0 {
                        DiscoveryState::SomeConnected
                    } else if not_found > 0 {
                        DiscoveryState::LookingForPrevious
                    } else if unknown == 0 {
                        DiscoveryState::NothingFound
                    } else {
                        DiscoveryState::UnknownFound
                    };
                    assert_eq!(state, expected, "{found}/{not_found}/{unknown}");
                }
            }
        }
    }

    #[test]
    fn connection_error_only_when_empty() {
        assert_eq!(
            reduce_state(counts(0, 0, 0), true),
            DiscoveryState::ConnectionError
        );
        assert_eq!(
            reduce_state(counts(0, 0, 1), true),
            DiscoveryState::UnknownFound
        );
        assert_eq!(
            reduce_state(counts(0, 1, 0), true),
            DiscoveryState::LookingForPrevious
        );
    }

    #[test]
    fn displays_snake_case() {
        assert_eq!(
            DiscoveryState::LookingForPrevious.to_string(),
            "looking_for_previous"
        );
    }
}
