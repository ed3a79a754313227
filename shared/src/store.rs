use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{ActivityApi, ApiError};
use crate::cache::EntityCache;
use crate::model::{Activity, ActivityDraft, ActivityId, ActivityRecord};
use crate::selection::Selection;
use crate::views::{self, DayGroup};

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Identifier generation
// ============================================================================

/// Source of client-side identifiers for new activities. The id chosen here
/// is final: the server stores the activity under it.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ActivityId;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> ActivityId {
        ActivityId::generate()
    }
}

// ============================================================================
// Observable state
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientFlags {
    pub loading: bool,
    /// A create or update is in flight.
    pub submitting: bool,
    pub deleting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Loading,
    Submitting,
    Deleting,
}

impl Flag {
    fn set(self, flags: &mut TransientFlags, value: bool) {
        match self {
            Self::Loading => flags.loading = value,
            Self::Submitting => flags.submitting = value,
            Self::Deleting => flags.deleting = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    LoadAll,
    LoadOne,
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadAll => "load_all",
            Self::LoadOne => "load_one",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// The last failure the store absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub operation: Operation,
    pub id: Option<ActivityId>,
    pub error: ApiError,
}

/// Emitted after every state change. Shells re-read whatever they render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreEvent {
    FlagsChanged(TransientFlags),
    Loaded { count: usize },
    Committed(ActivityId),
    Removed(ActivityId),
    SelectionChanged(Selection),
    Failed(OperationError),
    ErrorDismissed,
}

/// Consistent read of everything the presentation layer may depend on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub flags: TransientFlags,
    pub selection: Selection,
    pub selected: Option<Activity>,
    pub last_error: Option<OperationError>,
    pub activities_by_date: Vec<Activity>,
    pub grouped_activities: Vec<DayGroup>,
}

#[derive(Debug, Default)]
struct StoreState {
    cache: EntityCache,
    selection: Selection,
    flags: TransientFlags,
    last_error: Option<OperationError>,
}

impl StoreState {
    fn selected_activity(&self) -> Option<Activity> {
        self.selection
            .selected()
            .and_then(|id| self.cache.get(id))
            .cloned()
    }
}

struct FlagGuard<'a, A: ActivityApi, G: IdGenerator> {
    store: &'a ActivityStore<A, G>,
    flag: Flag,
}

impl<A: ActivityApi, G: IdGenerator> Drop for FlagGuard<'_, A, G> {
    fn drop(&mut self) {
        self.store.set_flag(self.flag, false);
    }
}

// ============================================================================
// Store
// ============================================================================

/// Owns the activity cache and keeps it in step with the remote API.
///
/// Mutations are pessimistic: the cache only changes after the API confirms.
/// No operation returns an error; failures are logged, kept as
/// [`ActivityStore::last_error`] and announced as [`StoreEvent::Failed`].
///
/// Conflicting operations on the same id are not serialized here. A delete
/// confirmed after a concurrent `load_all` re-populated the cache will still
/// remove the entry, and a `load_all` that started before a delete can bring
/// it back.
pub struct ActivityStore<A: ActivityApi, G: IdGenerator = UuidGenerator> {
    api: Arc<A>,
    ids: G,
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl<A: ActivityApi> ActivityStore<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::with_id_generator(api, UuidGenerator)
    }
}

impl<A: ActivityApi, G: IdGenerator> ActivityStore<A, G> {
    pub fn with_id_generator(api: Arc<A>, ids: G) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            ids,
            state: RwLock::new(StoreState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // The lock is never held across an await, and every write is a single
    // map or field update, so a poisoned lock still holds usable state.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // Err only means nobody is subscribed.
        let _ = self.events.send(event);
    }

    fn set_flag(&self, flag: Flag, value: bool) {
        let flags = {
            let mut state = self.write();
            flag.set(&mut state.flags, value);
            state.flags
        };
        self.emit(StoreEvent::FlagsChanged(flags));
    }

    /// Sets `flag` until the returned guard drops, so a caller that abandons
    /// the operation mid-flight still leaves the flag cleared.
    fn raise(&self, flag: Flag) -> FlagGuard<'_, A, G> {
        self.set_flag(flag, true);
        FlagGuard { store: self, flag }
    }

    fn record_failure(&self, operation: Operation, id: Option<ActivityId>, error: ApiError) {
        error!(
            operation = operation.as_str(),
            id = id.as_ref().map(ActivityId::as_str),
            code = error.code(),
            %error,
            "activity operation failed"
        );
        let failure = OperationError {
            operation,
            id,
            error,
        };
        self.write().last_error = Some(failure.clone());
        self.emit(StoreEvent::Failed(failure));
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Fetches every activity and merges it into the cache. Entries the
    /// server no longer returns are kept.
    #[instrument(skip(self))]
    pub async fn load_all(&self) {
        let _busy = self.raise(Flag::Loading);

        match self.api.list().await {
            Ok(records) => {
                let received = records.len();
                let mut activities = Vec::with_capacity(received);
                for record in records {
                    let raw_id = record.id.clone();
                    match Activity::try_from(record) {
                        Ok(activity) => activities.push(activity),
                        Err(e) => warn!(id = %raw_id, error = %e, "skipping malformed activity"),
                    }
                }

                let count = activities.len();
                {
                    let mut state = self.write();
                    for activity in activities {
                        state.cache.put(activity);
                    }
                }

                info!(count, skipped = received - count, "activities loaded");
                self.emit(StoreEvent::Loaded { count });
            }
            Err(error) => self.record_failure(Operation::LoadAll, None, error),
        }

    }

    /// Cache-first read that also selects the activity. A cached id never
    /// reaches the API; otherwise exactly one `details` call is made.
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn load_one(&self, id: &ActivityId) -> Option<Activity> {
        let hit = {
            let mut state = self.write();
            let cached = state.cache.get(id).cloned();
            if cached.is_some() {
                state.selection.select(id.clone());
            }
            cached.map(|activity| (activity, state.selection.clone()))
        };

        if let Some((activity, selection)) = hit {
            debug!("cache hit");
            self.emit(StoreEvent::SelectionChanged(selection));
            return Some(activity);
        }

        let _busy = self.raise(Flag::Loading);

        let fetched = self
            .api
            .details(id)
            .await
            .and_then(|record| Activity::try_from(record).map_err(ApiError::from));

        let loaded = match fetched {
            Ok(activity) => {
                let selection = {
                    let mut state = self.write();
                    state.cache.put(activity.clone());
                    state.selection.select(activity.id.clone());
                    state.selection.clone()
                };
                info!("activity loaded");
                self.emit(StoreEvent::Loaded { count: 1 });
                self.emit(StoreEvent::SelectionChanged(selection));
                Some(activity)
            }
            Err(error) => {
                self.record_failure(Operation::LoadOne, Some(id.clone()), error);
                None
            }
        };

        loaded
    }

    // ------------------------------------------------------------------------
    // Mutations (pessimistic commit)
    // ------------------------------------------------------------------------

    /// Assigns a fresh id, sends the create and only on success inserts,
    /// selects the new activity and closes the form. Returns the id when committed.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(&self, draft: ActivityDraft) -> Option<ActivityId> {
        let activity = draft.into_activity(self.ids.next_id());
        let id = activity.id.clone();

        let _busy = self.raise(Flag::Submitting);

        let committed = match self.api.create(&ActivityRecord::from(&activity)).await {
            Ok(()) => {
                self.commit(activity);
                info!(id = %id, "activity created");
                true
            }
            Err(error) => {
                self.record_failure(Operation::Create, Some(id.clone()), error);
                false
            }
        };

        committed.then_some(id)
    }

    /// Replaces the cached entry once the API accepts the change. The id must
    /// already be known to the server; that is not checked here.
    #[instrument(skip(self, activity), fields(id = %activity.id))]
    pub async fn update(&self, activity: Activity) -> bool {
        let _busy = self.raise(Flag::Submitting);

        let id = activity.id.clone();
        let committed = match self.api.update(&ActivityRecord::from(&activity)).await {
            Ok(()) => {
                self.commit(activity);
                info!("activity updated");
                true
            }
            Err(error) => {
                self.record_failure(Operation::Update, Some(id), error);
                false
            }
        };

        committed
    }

    fn commit(&self, activity: Activity) {
        let id = activity.id.clone();
        let selection = {
            let mut state = self.write();
            state.cache.put(activity);
            state.selection.select(id.clone());
            state.selection.close_form();
            state.selection.clone()
        };
        self.emit(StoreEvent::Committed(id));
        self.emit(StoreEvent::SelectionChanged(selection));
    }

    /// Removes the entry only after the API confirms; a failed delete leaves
    /// it untouched.
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn delete(&self, id: &ActivityId) -> bool {
        let _busy = self.raise(Flag::Deleting);

        let committed = match self.api.delete(id).await {
            Ok(()) => {
                let cleared = {
                    let mut state = self.write();
                    state.cache.remove(id);
                    state
                        .selection
                        .clear_if(id)
                        .then(|| state.selection.clone())
                };
                info!("activity deleted");
                self.emit(StoreEvent::Removed(id.clone()));
                if let Some(selection) = cleared {
                    self.emit(StoreEvent::SelectionChanged(selection));
                }
                true
            }
            Err(error) => {
                self.record_failure(Operation::Delete, Some(id.clone()), error);
                false
            }
        };

        committed
    }

    // ------------------------------------------------------------------------
    // Selection / form
    // ------------------------------------------------------------------------

    /// Selects a cached activity; an unknown id leaves nothing selected.
    pub fn select(&self, id: &ActivityId) -> Option<Activity> {
        let (activity, selection) = {
            let mut state = self.write();
            let activity = state.cache.get(id).cloned();
            match &activity {
                Some(_) => state.selection.select(id.clone()),
                None => state.selection.clear(),
            }
            (activity, state.selection.clone())
        };
        self.emit(StoreEvent::SelectionChanged(selection));
        activity
    }

    pub fn cancel_selection(&self) {
        let selection = {
            let mut state = self.write();
            state.selection.clear();
            state.selection.clone()
        };
        self.emit(StoreEvent::SelectionChanged(selection));
    }

    /// With an id: load (cache-first) and select it, then open the form for
    /// editing. Without: clear the selection and open the form for creating.
    /// If the activity cannot be loaded the form opens in create mode.
    #[instrument(skip(self))]
    pub async fn open_form(&self, id: Option<&ActivityId>) {
        let loaded = match id {
            Some(id) => self.load_one(id).await.is_some(),
            None => false,
        };

        let selection = {
            let mut state = self.write();
            if !loaded {
                state.selection.clear();
            }
            state.selection.open_form();
            state.selection.clone()
        };
        self.emit(StoreEvent::SelectionChanged(selection));
    }

    pub fn close_form(&self) {
        let selection = {
            let mut state = self.write();
            state.selection.close_form();
            state.selection.clone()
        };
        self.emit(StoreEvent::SelectionChanged(selection));
    }

    pub fn dismiss_error(&self) {
        self.write().last_error = None;
        self.emit(StoreEvent::ErrorDismissed);
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn flags(&self) -> TransientFlags {
        self.read().flags
    }

    pub fn selection(&self) -> Selection {
        self.read().selection.clone()
    }

    pub fn selected_activity(&self) -> Option<Activity> {
        self.read().selected_activity()
    }

    pub fn last_error(&self) -> Option<OperationError> {
        self.read().last_error.clone()
    }

    pub fn get(&self, id: &ActivityId) -> Option<Activity> {
        self.read().cache.get(id).cloned()
    }

    pub fn contains(&self, id: &ActivityId) -> bool {
        self.read().cache.contains(id)
    }

    pub fn len(&self) -> usize {
        self.read().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().cache.is_empty()
    }

    pub fn ids(&self) -> Vec<ActivityId> {
        self.read().cache.ids().cloned().collect()
    }

    pub fn activities_by_date(&self) -> Vec<Activity> {
        views::activities_by_date(self.read().cache.values())
    }

    pub fn grouped_activities(&self) -> Vec<DayGroup> {
        views::grouped_activities(self.read().cache.values())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.read();
        let activities_by_date = views::activities_by_date(state.cache.values());
        StoreSnapshot {
            flags: state.flags,
            selection: state.selection.clone(),
            selected: state.selected_activity(),
            last_error: state.last_error.clone(),
            grouped_activities: views::group_by_day(activities_by_date.clone()),
            activities_by_date,
        }
    }
}
