//! Location tracking and member location board.
//!
//! # Responsibility
//! - Sample the positioning sensor on the host's timer, recompute nearby
//!   stores, feed the proximity notifier and publish the member position.
//! - Mirror the household's member positions for the "last seen" view.
//!
//! # Invariants
//! - A sensor failure degrades the tracker; it never disables it. The next
//!   tick retries.
//! - The notifier only runs while the list has unfinished items. Skipped
//!   samples leave proximity state untouched.
//! - `disable` clears location, nearby stores, error and proximity state.

use crate::clock::Clock;
use crate::config::{ConfigError, CoreConfig};
use crate::error::{PositioningError, ReadError};
use crate::model::geo::{validate_coordinates, Location, PointOfInterest};
use crate::model::household::{HouseholdCode, LocationDocument, MemberLocation};
use crate::proximity::notifier::{NearbyPoi, ProximityEvent, ProximityNotifier, ProximityState};
use crate::service::notification_service::NotificationSink;
use crate::service::session_service::SessionContext;
use crate::store::{
    encode, CollectionPath, CollectionSnapshot, DocumentStore, SetMode, StoreResult, Subscription,
};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Options passed with every positioning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the sensor may return.
    pub max_staleness: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        CoreConfig::default().position_options()
    }
}

/// Device positioning sensor.
pub trait PositioningSensor {
    fn current_position(&self, options: &PositionOptions) -> Result<Location, PositioningError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerStatus {
    Disabled,
    Active,
    /// Last sample failed; tracking stays on and retries on the next tick.
    Degraded(String),
}

/// Drives periodic location samples for one device.
pub struct LocationTracker<S: PositioningSensor> {
    sensor: S,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    options: PositionOptions,
    interval: Duration,
    catalog: Vec<PointOfInterest>,
    notifier: ProximityNotifier,
    status: TrackerStatus,
    last_location: Option<Location>,
    nearby: Vec<NearbyPoi>,
}

impl<S: PositioningSensor> LocationTracker<S> {
    pub fn new(
        sensor: S,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &CoreConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sensor,
            store,
            clock,
            options: config.position_options(),
            interval: config.sample_interval(),
            catalog: config.stores.clone(),
            notifier: ProximityNotifier::new(config.proximity()?),
            status: TrackerStatus::Disabled,
            last_location: None,
            nearby: Vec::new(),
        })
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn status(&self) -> &TrackerStatus {
        &self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.status != TrackerStatus::Disabled
    }

    /// Interval at which the host should call `tick`.
    pub fn sample_interval(&self) -> Duration {
        self.interval
    }

    pub fn last_location(&self) -> Option<&Location> {
        self.last_location.as_ref()
    }

    /// Stores in range of the last sample, nearest first.
    pub fn nearby_stores(&self) -> &[NearbyPoi] {
        &self.nearby
    }

    pub fn proximity_state(&self) -> &ProximityState {
        self.notifier.state()
    }

    /// Turns tracking on and samples immediately.
    pub fn enable(
        &mut self,
        session: &SessionContext,
        unfinished_items: usize,
        sink: &dyn NotificationSink,
    ) -> Vec<ProximityEvent> {
        if !self.is_enabled() {
            self.status = TrackerStatus::Active;
            info!("event=location_enable module=location status=ok");
        }
        self.tick(session, unfinished_items, sink)
    }

    /// Takes one sample. Returns the stores that were just entered.
    pub fn tick(
        &mut self,
        session: &SessionContext,
        unfinished_items: usize,
        sink: &dyn NotificationSink,
    ) -> Vec<ProximityEvent> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let location = match self.sample() {
            Ok(location) => location,
            Err(err) => {
                warn!("event=location_sample module=location status=degraded error={err}");
                self.status = TrackerStatus::Degraded(err.to_string());
                return Vec::new();
            }
        };

        self.status = TrackerStatus::Active;
        self.last_location = Some(location);
        self.nearby = self.notifier.nearby(&location, &self.catalog);

        let mut events = Vec::new();
        if unfinished_items > 0 && session.household().is_some() {
            events = self.notifier.observe(&location, &self.catalog);
            for event in &events {
                let draft = event.to_draft(session.user_id(), session.member_name());
                if let Err(err) = sink.deliver(session, draft) {
                    warn!(
                        "event=proximity_deliver module=location status=error poi_id={} error={err}",
                        event.poi.id
                    );
                }
            }
        }

        self.publish(session, &location);
        debug!(
            "event=location_sample module=location status=ok nearby={} entered={}",
            self.nearby.len(),
            events.len()
        );
        events
    }

    /// Turns tracking off and forgets everything it observed.
    pub fn disable(&mut self) {
        self.status = TrackerStatus::Disabled;
        self.last_location = None;
        self.nearby.clear();
        self.notifier.reset();
        info!("event=location_disable module=location status=ok");
    }

    fn sample(&self) -> Result<Location, PositioningError> {
        let location = self.sensor.current_position(&self.options)?;
        validate_coordinates(location.latitude, location.longitude)?;
        let max_age = i64::try_from(self.options.max_staleness.as_millis()).unwrap_or(i64::MAX);
        if location.age_ms(self.clock.now_ms()) > max_age {
            return Err(PositioningError::Unavailable(
                "sample is older than the allowed staleness".to_string(),
            ));
        }
        Ok(location)
    }

    fn publish(&self, session: &SessionContext, location: &Location) {
        let Some(household) = session.household() else {
            return;
        };
        let document = LocationDocument {
            lat: location.latitude,
            lng: location.longitude,
            timestamp: Some(self.clock.now_ms()),
        };
        let result = CollectionPath::household_locations(&household.code)
            .doc(session.user_id())
            .and_then(|path| Ok((path, encode(&document)?)))
            .and_then(|(path, fields)| self.store.set(&path, fields, SetMode::Merge));
        if let Err(err) = result {
            warn!("event=location_publish module=location status=error error={err}");
        }
    }
}

#[derive(Debug, Default)]
struct BoardState {
    members: BTreeMap<String, MemberLocation>,
    error: Option<ReadError>,
}

/// Live mirror of `households/{code}/locations`.
#[derive(Clone)]
pub struct MemberLocationBoard {
    state: Arc<Mutex<BoardState>>,
    clock: Arc<dyn Clock>,
}

impl MemberLocationBoard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState::default())),
            clock,
        }
    }

    pub fn attach(
        &self,
        store: &dyn DocumentStore,
        code: &HouseholdCode,
    ) -> StoreResult<Subscription> {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        store.subscribe(
            &CollectionPath::household_locations(code),
            Box::new(move |delivery| {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match delivery {
                    Ok(snapshot) => {
                        state.members = decode_locations(snapshot, clock.now_ms());
                        state.error = None;
                    }
                    Err(err) => {
                        warn!("event=location_stream module=location status=error error={err}");
                        state.error = Some(ReadError::from(err.clone()));
                    }
                }
            }),
        )
    }

    /// Every published member position, ordered by user id.
    pub fn locations(&self) -> Result<Vec<MemberLocation>, ReadError> {
        let state = self.lock();
        match &state.error {
            Some(err) => Err(err.clone()),
            None => Ok(state.members.values().cloned().collect()),
        }
    }

    pub fn location_of(&self, user_id: &str) -> Option<MemberLocation> {
        self.lock().members.get(user_id).cloned()
    }

    /// "Last seen" label for one member.
    pub fn last_seen(&self, user_id: &str) -> String {
        let updated_at = self.location_of(user_id).map(|loc| loc.updated_at_ms);
        format_last_seen(updated_at, self.clock.now_ms())
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_locations(snapshot: &CollectionSnapshot, now_ms: i64) -> BTreeMap<String, MemberLocation> {
    snapshot
        .documents
        .iter()
        .filter_map(|document| match document.decode::<LocationDocument>() {
            Ok(decoded) => Some((
                document.id.clone(),
                MemberLocation {
                    user_id: document.id.clone(),
                    latitude: decoded.lat,
                    longitude: decoded.lng,
                    updated_at_ms: decoded.timestamp.unwrap_or(now_ms),
                },
            )),
            Err(err) => {
                warn!("event=location_decode module=location status=skipped error={err}");
                None
            }
        })
        .collect()
}

/// Human readable age of a timestamp, e.g. "5 mins ago".
pub fn format_last_seen(timestamp_ms: Option<i64>, now_ms: i64) -> String {
    let Some(timestamp_ms) = timestamp_ms else {
        return "unknown".to_string();
    };
    let mins = now_ms.saturating_sub(timestamp_ms).max(0) / 60_000;
    if mins < 1 {
        return "just now".to_string();
    }
    if mins == 1 {
        return "1 min ago".to_string();
    }
    if mins < 60 {
        return format!("{mins} mins ago");
    }
    let hrs = mins / 60;
    if hrs == 1 {
        return "1 hr ago".to_string();
    }
    if hrs < 24 {
        return format!("{hrs} hrs ago");
    }
    match hrs / 24 {
        1 => "1 day ago".to_string(),
        days => format!("{days} days ago"),
    }
}
