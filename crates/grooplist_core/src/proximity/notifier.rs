//! Proximity notification decisions.
//!
//! # Responsibility
//! - Partition candidates into in-range and out-of-range on every sample.
//! - Emit one event per point newly in range; drop exits silently.
//!
//! # Invariants
//! - After `observe`, the state equals exactly the in-range id set, so it
//!   never holds an id outside the current candidate list.
//! - At most one event per point id per sample.
//! - Leaving and re-entering range notifies again.

use crate::config::ConfigError;
use crate::model::geo::{Location, PointOfInterest};
use crate::model::notification::{NotificationDraft, NotificationKind};
use crate::proximity::distance::{distance, DistanceUnit};
use log::debug;
use std::collections::BTreeSet;

/// Default proximity threshold, in the default unit (miles).
pub const DEFAULT_PROXIMITY_THRESHOLD: f64 = 0.5;

/// Validated proximity threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityConfig {
    threshold: f64,
    unit: DistanceUnit,
}

impl ProximityConfig {
    /// # Errors
    /// - `ConfigError::InvalidThreshold` when `threshold` is zero, negative
    ///   or not finite.
    pub fn new(threshold: f64, unit: DistanceUnit) -> Result<Self, ConfigError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold, unit })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn unit(&self) -> DistanceUnit {
        self.unit
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PROXIMITY_THRESHOLD,
            unit: DistanceUnit::Miles,
        }
    }
}

/// A point of interest together with its distance from the sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyPoi {
    pub poi: PointOfInterest,
    pub distance: f64,
}

/// A point that just came into range.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityEvent {
    pub poi: PointOfInterest,
    pub distance: f64,
}

impl ProximityEvent {
    pub fn title(&self, member_name: &str) -> String {
        format!("{member_name} is near {}!", self.poi.name)
    }

    pub fn message(&self, member_name: &str) -> String {
        format!(
            "{member_name} is close to {}. Perfect time to coordinate shopping!",
            self.poi.name
        )
    }

    /// Renders the household notification announcing this event.
    pub fn to_draft(&self, member_id: &str, member_name: &str) -> NotificationDraft {
        NotificationDraft {
            kind: NotificationKind::Proximity,
            title: self.title(member_name),
            message: self.message(member_name),
            user_id: Some(member_id.to_string()),
            store_name: Some(self.poi.name.clone()),
        }
    }
}

/// Ids of points currently considered near.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProximityState {
    near: BTreeSet<String>,
}

impl ProximityState {
    pub fn contains(&self, poi_id: &str) -> bool {
        self.near.contains(poi_id)
    }

    pub fn len(&self) -> usize {
        self.near.len()
    }

    pub fn is_empty(&self) -> bool {
        self.near.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.near.iter().map(String::as_str)
    }
}

/// Stateful decision maker fed with one location sample at a time.
#[derive(Debug, Clone, Default)]
pub struct ProximityNotifier {
    config: ProximityConfig,
    state: ProximityState,
}

impl ProximityNotifier {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            state: ProximityState::default(),
        }
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    pub fn state(&self) -> &ProximityState {
        &self.state
    }

    /// Points within range of `location`, nearest first. Does not touch state.
    pub fn nearby(&self, location: &Location, candidates: &[PointOfInterest]) -> Vec<NearbyPoi> {
        let mut nearby = candidates
            .iter()
            .filter_map(|poi| {
                let d = distance(location, poi, self.config.unit());
                (d <= self.config.threshold()).then(|| NearbyPoi {
                    poi: poi.clone(),
                    distance: d,
                })
            })
            .collect::<Vec<_>>();
        nearby.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.poi.id.cmp(&b.poi.id))
        });
        nearby
    }

    /// Feeds one sample and returns the points that just entered range.
    pub fn observe(
        &mut self,
        location: &Location,
        candidates: &[PointOfInterest],
    ) -> Vec<ProximityEvent> {
        let mut within = BTreeSet::new();
        let mut events = Vec::new();

        for poi in candidates {
            let d = distance(location, poi, self.config.unit());
            if d > self.config.threshold() {
                continue;
            }
            if within.insert(poi.id.clone()) && !self.state.contains(&poi.id) {
                events.push(ProximityEvent {
                    poi: poi.clone(),
                    distance: d,
                });
            }
        }

        let exited = self.state.near.difference(&within).count();
        debug!(
            "event=proximity_observe module=proximity status=ok candidates={} within={} entered={} exited={}",
            candidates.len(),
            within.len(),
            events.len(),
            exited
        );

        self.state.near = within;
        events
    }

    /// Forgets every point; the next sample treats all in-range points as new.
    pub fn reset(&mut self) {
        self.state.near.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{ProximityConfig, ProximityNotifier};
    use crate::config::ConfigError;
    use crate::model::geo::{Location, PointOfInterest};
    use crate::proximity::distance::DistanceUnit;

    #[test]
    fn config_rejects_non_positive_and_non_finite_thresholds() {
        for bad in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let err = ProximityConfig::new(bad, DistanceUnit::Miles).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidThreshold(_)));
        }
    }

    #[test]
    fn duplicate_candidate_ids_emit_once() {
        let here = Location::new(10.0, 10.0, 0).unwrap();
        let poi = PointOfInterest::at("a", "A", &here);
        let mut notifier = ProximityNotifier::default();
        let events = notifier.observe(&here, &[poi.clone(), poi]);
        assert_eq!(events.len(), 1);
        assert_eq!(notifier.state().len(), 1);
    }

    #[test]
    fn event_copy_names_member_and_store() {
        let here = Location::new(10.0, 10.0, 0).unwrap();
        let poi = PointOfInterest::at("a", "Corner Shop", &here);
        let mut notifier = ProximityNotifier::default();
        let event = notifier.observe(&here, &[poi]).remove(0);
        let draft = event.to_draft("u1", "Ana");
        assert_eq!(draft.title, "Ana is near Corner Shop!");
        assert!(draft.message.starts_with("Ana is close to Corner Shop."));
        assert_eq!(draft.store_name.as_deref(), Some("Corner Shop"));
    }
}
