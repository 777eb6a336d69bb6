//! Household membership use-cases.
//!
//! # Responsibility
//! - Create, join, open and leave households.
//! - Keep the member record (`households/{code}/members/{uid}`) and the
//!   user index record (`users/{uid}/households/{code}`) in step.
//! - Mirror the household roster and the user's household index live.
//!
//! # Invariants
//! - A user is a member only when both records exist; readers treat the
//!   absence of either as "not a member".
//! - `ensure_membership` is an idempotent merge upsert and never demotes
//!   an owner.
//! - `leave_household` attempts both deletes and reports the first failure.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult, ReadError, WriteError};
use crate::model::household::{
    HouseholdCode, HouseholdDocument, HouseholdRef, MemberDocument, MemberRole, UserHousehold,
};
use crate::service::session_service::SessionContext;
use crate::store::{
    encode, CollectionPath, CollectionSnapshot, DocPath, DocumentStore, SetMode, StoreError,
    StoreResult, Subscription,
};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct MembershipService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl MembershipService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates a household owned by the session user.
    pub fn create_household(
        &self,
        session: &SessionContext,
        household_name: &str,
    ) -> CoreResult<HouseholdRef> {
        let name = household_name.trim();
        if name.is_empty() {
            return Err(CoreError::EmptyHouseholdName);
        }
        let code = HouseholdCode::generate();
        let now = self.clock.now_ms();

        let household = HouseholdDocument {
            name: name.to_string(),
            created_at: Some(now),
            created_by: Some(session.user_id().to_string()),
        };
        self.store
            .set(
                &DocPath::household(&code),
                encode(&household).map_err(write_err("create household"))?,
                SetMode::Replace,
            )
            .map_err(write_err("create household"))?;

        self.write_membership(session, &code, name, MemberRole::Owner, now, SetMode::Replace)?;
        info!("event=household_create module=membership status=ok code={code}");
        Ok(HouseholdRef {
            code,
            name: name.to_string(),
        })
    }

    /// Joins an existing household by its short code.
    pub fn join_household(
        &self,
        session: &SessionContext,
        raw_code: &str,
    ) -> CoreResult<HouseholdRef> {
        let code = HouseholdCode::parse(raw_code)?;
        let household = self.load_household(&code)?;
        let role = self
            .load_member(&code, session.user_id())?
            .map(|member| member.role)
            .unwrap_or(MemberRole::Member);

        let now = self.clock.now_ms();
        self.write_membership(session, &code, &household.name, role, now, SetMode::Merge)?;
        info!("event=household_join module=membership status=ok code={code}");
        Ok(HouseholdRef {
            code,
            name: household.name,
        })
    }

    /// Upserts the session user's member record before a household write.
    pub fn ensure_membership(&self, session: &SessionContext) -> CoreResult<()> {
        let household = session.require_household()?;
        let existing = self.load_member(&household.code, session.user_id())?;
        let member = MemberDocument {
            uid: session.user_id().to_string(),
            name: session.member_name().to_string(),
            role: existing
                .as_ref()
                .map(|member| member.role)
                .unwrap_or(MemberRole::Member),
            joined_at: existing
                .and_then(|member| member.joined_at)
                .or(Some(self.clock.now_ms())),
        };
        let path = CollectionPath::household_members(&household.code)
            .doc(session.user_id())
            .map_err(write_err("join household"))?;
        self.store
            .set(
                &path,
                encode(&member).map_err(write_err("join household"))?,
                SetMode::Merge,
            )
            .map_err(write_err("join household"))?;
        Ok(())
    }

    /// Removes the session user from its household.
    pub fn leave_household(&self, session: &SessionContext) -> CoreResult<()> {
        let household = session.require_household()?;
        let member = CollectionPath::household_members(&household.code)
            .doc(session.user_id())
            .and_then(|path| self.store.delete(&path));
        let index = CollectionPath::user_households(session.user_id())
            .and_then(|collection| collection.doc(household.code.as_str()))
            .and_then(|path| self.store.delete(&path));

        for result in [&member, &index] {
            if let Err(err) = result {
                warn!(
                    "event=household_leave module=membership status=error code={} error={err}",
                    household.code
                );
            }
        }
        member.and(index).map_err(write_err("leave household"))?;
        info!(
            "event=household_leave module=membership status=ok code={}",
            household.code
        );
        Ok(())
    }

    /// Resolves a household the user already belongs to.
    pub fn open_household(&self, user_id: &str, code: &HouseholdCode) -> CoreResult<HouseholdRef> {
        let household = self.load_household(code)?;
        if self.load_member(code, user_id)?.is_none() {
            return Err(CoreError::NotMember(code.clone()));
        }
        Ok(HouseholdRef {
            code: code.clone(),
            name: household.name,
        })
    }

    /// Households listed in the user's index that still have a member record,
    /// most recently joined first.
    pub fn list_user_households(&self, user_id: &str) -> CoreResult<Vec<UserHousehold>> {
        let collection = CollectionPath::user_households(user_id).map_err(read_err)?;
        let documents = self.store.list(&collection).map_err(read_err)?;

        let mut households = Vec::with_capacity(documents.len());
        for document in documents {
            let entry = match document.decode::<UserHousehold>() {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("event=household_list module=membership status=skipped error={err}");
                    continue;
                }
            };
            if self.load_member(&entry.household_id, user_id)?.is_some() {
                households.push(entry);
            }
        }
        sort_households(&mut households);
        Ok(households)
    }

    /// True when both membership records exist.
    pub fn is_member(&self, user_id: &str, code: &HouseholdCode) -> CoreResult<bool> {
        if self.load_member(code, user_id)?.is_none() {
            return Ok(false);
        }
        let index = CollectionPath::user_households(user_id)
            .and_then(|collection| collection.doc(code.as_str()))
            .map_err(read_err)?;
        Ok(self.store.get(&index).map_err(read_err)?.is_some())
    }

    fn write_membership(
        &self,
        session: &SessionContext,
        code: &HouseholdCode,
        household_name: &str,
        role: MemberRole,
        now: i64,
        mode: SetMode,
    ) -> CoreResult<()> {
        let operation = match role {
            MemberRole::Owner => "create household",
            MemberRole::Member => "join household",
        };
        let member = MemberDocument {
            uid: session.user_id().to_string(),
            name: session.member_name().to_string(),
            role,
            joined_at: Some(now),
        };
        let index = UserHousehold {
            household_id: code.clone(),
            name: household_name.to_string(),
            role,
            joined_at: Some(now),
            unread_count: 0,
        };

        let member_path = CollectionPath::household_members(code)
            .doc(session.user_id())
            .map_err(write_err(operation))?;
        let index_path = CollectionPath::user_households(session.user_id())
            .and_then(|collection| collection.doc(code.as_str()))
            .map_err(write_err(operation))?;

        self.store
            .set(
                &member_path,
                encode(&member).map_err(write_err(operation))?,
                mode,
            )
            .map_err(write_err(operation))?;
        self.store
            .set(&index_path, encode(&index).map_err(write_err(operation))?, mode)
            .map_err(write_err(operation))?;
        Ok(())
    }

    fn load_household(&self, code: &HouseholdCode) -> CoreResult<HouseholdDocument> {
        let document = self
            .store
            .get(&DocPath::household(code))
            .map_err(read_err)?
            .ok_or_else(|| CoreError::HouseholdNotFound(code.clone()))?;
        document.decode().map_err(read_err)
    }

    fn load_member(&self, code: &HouseholdCode, user_id: &str) -> CoreResult<Option<MemberDocument>> {
        let path = CollectionPath::household_members(code)
            .doc(user_id)
            .map_err(read_err)?;
        match self.store.get(&path).map_err(read_err)? {
            Some(document) => document.decode().map(Some).map_err(read_err),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Default)]
struct RosterState {
    members: BTreeMap<String, MemberDocument>,
    error: Option<ReadError>,
}

/// Live mirror of `households/{code}/members`.
#[derive(Clone, Default)]
pub struct MemberRoster {
    state: Arc<Mutex<RosterState>>,
}

impl MemberRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &self,
        store: &dyn DocumentStore,
        code: &HouseholdCode,
    ) -> StoreResult<Subscription> {
        let state = Arc::clone(&self.state);
        store.subscribe(
            &CollectionPath::household_members(code),
            Box::new(move |delivery| {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match delivery {
                    Ok(snapshot) => {
                        state.members = decode_members(snapshot);
                        state.error = None;
                    }
                    Err(err) => {
                        warn!("event=roster_stream module=membership status=error error={err}");
                        state.error = Some(ReadError::from(err.clone()));
                    }
                }
            }),
        )
    }

    /// Members in join order; ties and unknown join times by user id.
    pub fn members(&self) -> Result<Vec<MemberDocument>, ReadError> {
        let state = self.lock();
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        let mut members = state.members.values().cloned().collect::<Vec<_>>();
        members.sort_by(|a, b| {
            a.joined_at
                .unwrap_or(i64::MAX)
                .cmp(&b.joined_at.unwrap_or(i64::MAX))
                .then_with(|| a.uid.cmp(&b.uid))
        });
        Ok(members)
    }

    pub fn member(&self, user_id: &str) -> Option<MemberDocument> {
        self.lock().members.get(user_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, RosterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_members(snapshot: &CollectionSnapshot) -> BTreeMap<String, MemberDocument> {
    snapshot
        .documents
        .iter()
        .filter_map(|document| match document.decode::<MemberDocument>() {
            Ok(member) => Some((document.id.clone(), member)),
            Err(err) => {
                warn!("event=roster_decode module=membership status=skipped error={err}");
                None
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct IndexState {
    households: Vec<UserHousehold>,
    error: Option<ReadError>,
}

/// Live mirror of `users/{uid}/households`, the "Your Lists" view.
///
/// Entries whose member record is gone are dropped, like
/// `MembershipService::list_user_households`.
#[derive(Clone, Default)]
pub struct UserHouseholdsBoard {
    state: Arc<Mutex<IndexState>>,
}

impl UserHouseholdsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &self,
        store: Arc<dyn DocumentStore>,
        user_id: &str,
    ) -> StoreResult<Subscription> {
        let collection = CollectionPath::user_households(user_id)?;
        let state = Arc::clone(&self.state);
        let user_id = user_id.to_string();
        let reader = Arc::clone(&store);
        store.subscribe(
            &collection,
            Box::new(move |delivery| {
                let decoded = match delivery {
                    Ok(snapshot) => member_households(reader.as_ref(), &user_id, snapshot),
                    Err(err) => Err(err.clone()),
                };
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match decoded {
                    Ok(households) => {
                        state.households = households;
                        state.error = None;
                    }
                    Err(err) => {
                        warn!("event=household_stream module=membership status=error error={err}");
                        state.error = Some(ReadError::from(err));
                    }
                }
            }),
        )
    }

    /// Current households, most recently joined first.
    pub fn households(&self) -> Result<Vec<UserHousehold>, ReadError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.error {
            Some(err) => Err(err.clone()),
            None => Ok(state.households.clone()),
        }
    }
}

fn member_households(
    store: &dyn DocumentStore,
    user_id: &str,
    snapshot: &CollectionSnapshot,
) -> StoreResult<Vec<UserHousehold>> {
    let mut households = Vec::with_capacity(snapshot.documents.len());
    for document in &snapshot.documents {
        let entry = match document.decode::<UserHousehold>() {
            Ok(entry) => entry,
            Err(err) => {
                warn!("event=household_decode module=membership status=skipped error={err}");
                continue;
            }
        };
        let member = CollectionPath::household_members(&entry.household_id).doc(user_id)?;
        if store.get(&member)?.is_some() {
            households.push(entry);
        }
    }
    sort_households(&mut households);
    Ok(households)
}

fn sort_households(households: &mut [UserHousehold]) {
    households.sort_by(|a, b| {
        b.joined_at
            .cmp(&a.joined_at)
            .then_with(|| a.household_id.cmp(&b.household_id))
    });
}

fn write_err(operation: &'static str) -> impl Fn(StoreError) -> CoreError {
    move |source| CoreError::Write(WriteError::store(operation, source))
}

fn read_err(source: StoreError) -> CoreError {
    CoreError::Read(ReadError::from(source))
}
