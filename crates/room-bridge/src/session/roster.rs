//! Roster Reconciler.
//!
//! Full-replace merge of an incoming participant list into the snapshot
//! roster. Source order is kept as given (local participant first, then
//! remotes in the source's order); nothing is re-sorted.

use super::events::{ParticipantLevel, ParticipantReport};
use super::snapshot::Participant;
use crate::adapter::levels::{clamp_level, displayed_level};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Build the new roster from `incoming`.
///
/// - Entries with a blank identity are dropped.
/// - A repeated identity keeps its first occurrence.
/// - A reported raw level is mapped to its displayed level. When absent, a
///   known participant keeps its previous level and a new one starts at 0.
#[must_use]
pub fn reconcile(current: &[Participant], incoming: &[ParticipantReport]) -> Vec<Participant> {
    let mut seen = HashSet::with_capacity(incoming.len());
    let mut roster = Vec::with_capacity(incoming.len());

    for report in incoming {
        let identity = report.identity.trim();
        if identity.is_empty() {
            debug!(target: "bridge.session", "Dropping roster entry without identity");
            continue;
        }
        if !seen.insert(identity) {
            debug!(target: "bridge.session", identity = %identity, "Dropping duplicate roster entry");
            continue;
        }

        let audio_level = match report.audio_level {
            Some(raw) => displayed_level(raw),
            None => current
                .iter()
                .find(|p| p.identity == identity)
                .map_or(0.0, |p| p.audio_level),
        };

        roster.push(Participant {
            identity: identity.to_string(),
            is_local: report.is_local,
            is_speaking: report.is_speaking,
            audio_level,
        });
    }

    let local_count = roster.iter().filter(|p| p.is_local).count();
    if !roster.is_empty() && local_count != 1 {
        warn!(
            target: "bridge.session",
            local_count,
            roster_size = roster.len(),
            "Roster does not contain exactly one local participant"
        );
    }

    roster
}

/// Apply sampled displayed levels to matching roster entries. Identities not
/// in the roster are ignored. Returns whether anything changed.
pub fn apply_levels(roster: &mut [Participant], levels: &[ParticipantLevel]) -> bool {
    let mut changed = false;
    for sample in levels {
        if let Some(participant) = roster.iter_mut().find(|p| p.identity == sample.identity) {
            let level = clamp_level(sample.level);
            if (participant.audio_level - level).abs() > f32::EPSILON {
                participant.audio_level = level;
                changed = true;
            }
        }
    }
    changed
}
