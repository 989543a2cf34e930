//! Redundant-stream failover and gap alerting.

// Copyright 2024 Logan Wemyss
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;

use tracing::warn;

/// Health of one primary URI.
#[derive(Debug, Clone, PartialEq)]
pub enum FailoverState {
    Healthy,

    /// Serving from the backup at this 0-based index.
    Failed {
        active_backup: usize,
        failed_at: f64,
    },

    /// The primary is being retried; falls back to `Failed` on another
    /// failure report.
    Recovering {
        deadline: f64,
        last_backup: usize,
    },
}

struct FailoverEntry {
    backups: Vec<String>,
    state: FailoverState,
}

/// Tracks which of a set of redundant URIs should currently be served.
///
/// After `primary_recovery_delay` seconds in a failed state with no
/// further failures, the primary is retried.
pub struct FailoverCoordinator {
    primary_recovery_delay: f64,
    entries: HashMap<String, FailoverEntry>,
}

impl FailoverCoordinator {
    #[must_use]
    pub fn new(primary_recovery_delay: f64) -> Self {
        Self {
            primary_recovery_delay,
            entries: HashMap::new(),
        }
    }

    /// Registers a primary URI and its ordered backups.
    pub fn register(&mut self, primary: impl Into<String>, backups: Vec<String>) {
        self.entries.insert(
            primary.into(),
            FailoverEntry {
                backups,
                state: FailoverState::Healthy,
            },
        );
    }

    #[must_use]
    pub fn state(&self, primary: &str) -> Option<&FailoverState> {
        self.entries.get(primary).map(|entry| &entry.state)
    }

    /// Records a failure of the currently active URI at time `now`
    /// (seconds on the caller's clock).
    pub fn report_failure(&mut self, primary: &str, now: f64) {
        let Some(entry) = self.entries.get_mut(primary) else {
            return;
        };

        entry.state = match &entry.state {
            FailoverState::Healthy => {
                warn!(primary, "primary failed, switching to first backup");
                FailoverState::Failed {
                    active_backup: 0,
                    failed_at: now,
                }
            }
            FailoverState::Failed { active_backup, .. } => {
                let next = if active_backup + 1 < entry.backups.len() {
                    active_backup + 1
                } else {
                    // Every backup is exhausted; stay on the last one.
                    *active_backup
                };
                warn!(primary, backup = next, "backup failed, advancing");
                FailoverState::Failed {
                    active_backup: next,
                    failed_at: now,
                }
            }
            FailoverState::Recovering { last_backup, .. } => FailoverState::Failed {
                active_backup: *last_backup,
                failed_at: now,
            },
        };
    }

    /// Records that the primary is healthy again.
    pub fn report_recovery(&mut self, primary: &str) {
        if let Some(entry) = self.entries.get_mut(primary) {
            entry.state = FailoverState::Healthy;
        }
    }

    /// Moves failed entries whose recovery delay has elapsed into the
    /// recovering state, where the primary is retried.
    pub fn tick(&mut self, now: f64) {
        for entry in self.entries.values_mut() {
            if let FailoverState::Failed {
                active_backup,
                failed_at,
            } = entry.state
            {
                if now - failed_at >= self.primary_recovery_delay {
                    entry.state = FailoverState::Recovering {
                        deadline: now,
                        last_backup: active_backup,
                    };
                }
            }
        }
    }

    /// The URI that should currently be served for `primary`: the
    /// primary itself when healthy or recovering, otherwise the active
    /// backup.
    #[must_use]
    pub fn active_uri<'a>(&'a self, primary: &'a str) -> &'a str {
        let Some(entry) = self.entries.get(primary) else {
            return primary;
        };

        match &entry.state {
            FailoverState::Healthy | FailoverState::Recovering { .. } => primary,
            FailoverState::Failed { active_backup, .. } => entry
                .backups
                .get(*active_backup)
                .map_or(primary, String::as_str),
        }
    }
}

/// Remembers which segment indices were gaps and raises an alert when
/// too many arrive in a row.
pub struct GapTracker {
    max_consecutive_gaps: u64,
    flags: HashMap<u64, bool>,
}

impl GapTracker {
    #[must_use]
    pub fn new(max_consecutive_gaps: u64) -> Self {
        Self {
            max_consecutive_gaps: max_consecutive_gaps.max(1),
            flags: HashMap::new(),
        }
    }

    pub fn mark(&mut self, segment_index: u64, is_gap: bool) {
        self.flags.insert(segment_index, is_gap);
    }

    /// True when the `max_consecutive_gaps` indices ending at
    /// `current_index` (inclusive) are all gaps.
    #[must_use]
    pub fn has_consecutive_gap_alert(&self, current_index: u64) -> bool {
        if current_index + 1 < self.max_consecutive_gaps {
            return false;
        }
        (0..self.max_consecutive_gaps).all(|back| {
            self.flags
                .get(&(current_index - back))
                .copied()
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    fn coordinator() -> FailoverCoordinator {
        let mut coordinator = FailoverCoordinator::new(30.0);
        coordinator.register(
            "https://primary/v.m3u8",
            vec![
                "https://backup-a/v.m3u8".to_owned(),
                "https://backup-b/v.m3u8".to_owned(),
            ],
        );
        coordinator
    }

    #[rstest]
    fn failures_walk_the_backup_list_and_stick_at_the_end() {
        let mut coordinator = coordinator();
        let primary = "https://primary/v.m3u8";

        assert_eq!(coordinator.active_uri(primary), primary);

        coordinator.report_failure(primary, 0.0);
        assert_eq!(coordinator.active_uri(primary), "https://backup-a/v.m3u8");

        coordinator.report_failure(primary, 1.0);
        assert_eq!(coordinator.active_uri(primary), "https://backup-b/v.m3u8");

        // All backups exhausted: the last one stays active.
        coordinator.report_failure(primary, 2.0);
        assert_eq!(coordinator.active_uri(primary), "https://backup-b/v.m3u8");
    }

    #[rstest]
    fn recovery_restores_the_primary() {
        let mut coordinator = coordinator();
        let primary = "https://primary/v.m3u8";

        coordinator.report_failure(primary, 0.0);
        coordinator.report_recovery(primary);
        assert_eq!(coordinator.state(primary), Some(&FailoverState::Healthy));
        assert_eq!(coordinator.active_uri(primary), primary);
    }

    #[rstest]
    fn recovery_delay_leads_to_a_primary_retry() {
        let mut coordinator = coordinator();
        let primary = "https://primary/v.m3u8";

        coordinator.report_failure(primary, 0.0);
        coordinator.tick(10.0);
        assert!(matches!(
            coordinator.state(primary),
            Some(FailoverState::Failed { .. })
        ));

        coordinator.tick(31.0);
        assert!(matches!(
            coordinator.state(primary),
            Some(FailoverState::Recovering { .. })
        ));
        assert_eq!(coordinator.active_uri(primary), primary);

        // The retry fails: straight back to the same backup.
        coordinator.report_failure(primary, 32.0);
        assert_eq!(coordinator.active_uri(primary), "https://backup-a/v.m3u8");
    }

    #[rstest]
    fn unknown_primaries_pass_through() {
        let coordinator = coordinator();
        assert_eq!(coordinator.active_uri("https://other"), "https://other");
    }

    #[rstest]
    fn gap_alert_requires_a_full_run() {
        let mut tracker = GapTracker::new(3);

        tracker.mark(0, false);
        tracker.mark(1, true);
        tracker.mark(2, true);
        assert!(!tracker.has_consecutive_gap_alert(2));

        tracker.mark(3, true);
        assert!(tracker.has_consecutive_gap_alert(3));

        tracker.mark(4, false);
        assert!(!tracker.has_consecutive_gap_alert(4));
    }

    #[rstest]
    fn short_streams_never_alert() {
        let mut tracker = GapTracker::new(3);
        tracker.mark(0, true);
        tracker.mark(1, true);
        assert!(!tracker.has_consecutive_gap_alert(1));
    }
}
