use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    Activity, ActivitySummary, Reservation, ReservationRequest, SkippedActivity, SummaryListing,
};
use crate::repository::{ActivityRepository, RepositoryError};
use crate::validation::ActivityValidator;

/// Identifier given to new activities until the repository assigns the real one.
const PROVISIONAL_ID: &str = " ";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    EntityNotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => {
                ServiceError::EntityNotFound(format!("activity not found: {id}"))
            }
            err @ RepositoryError::Conflict { .. } => ServiceError::Conflict(err.to_string()),
            other => ServiceError::Repository(other),
        }
    }
}

pub struct BookingService {
    repository: Arc<dyn ActivityRepository>,
    validator: Arc<dyn ActivityValidator>,
    reserve_attempts: u32,
}

impl BookingService {
    pub fn new(
        repository: Arc<dyn ActivityRepository>,
        validator: Arc<dyn ActivityValidator>,
        reserve_attempts: u32,
    ) -> Self {
        Self {
            repository,
            validator,
            reserve_attempts: reserve_attempts.max(1),
        }
    }

    fn validate(&self, activity: &Activity) -> Result<(), ServiceError> {
        // Only the first diagnostic is reported.
        match self.validator.validate(activity).into_iter().next() {
            Some(violation) => Err(ServiceError::InvalidArgument(format!(
                "activity does not conform to the schema: {}",
                violation.message
            ))),
            None => Ok(()),
        }
    }

    pub fn create(&self, mut activity: Activity) -> Result<String, ServiceError> {
        activity.id = PROVISIONAL_ID.to_string();
        activity.version = 0;
        self.validate(&activity)?;

        let id = self.repository.add(activity)?;
        info!(activity_id = %id, "activity created");
        Ok(id)
    }

    pub fn update(&self, activity: &Activity) -> Result<(), ServiceError> {
        self.validate(activity)?;
        self.repository.update(activity)?;
        info!(activity_id = %activity.id, "activity updated");
        Ok(())
    }

    pub fn get_activity(&self, id: &str) -> Result<Activity, ServiceError> {
        Ok(self.repository.get_by_id(id)?)
    }

    pub fn remove_activity(&self, id: &str) -> Result<(), ServiceError> {
        let activity = self.repository.get_by_id(id)?;
        self.repository.delete(&activity)?;
        info!(activity_id = %id, "activity removed");
        Ok(())
    }

    /// Claims a turn for a student.
    ///
    /// Returns `Ok(false)` when the turn is already taken. A write that loses a
    /// race against another reservation re-reads the activity and tries again,
    /// failing with [`ServiceError::Conflict`] once the attempts run out.
    pub fn reserve(&self, id: &str, request: &ReservationRequest) -> Result<bool, ServiceError> {
        let Some(date) = request.date else {
            return Err(ServiceError::InvalidArgument(
                "the date must be provided".into(),
            ));
        };
        if request.turn < 1 {
            return Err(ServiceError::InvalidArgument(
                "the first turn has index 1".into(),
            ));
        }
        // Blankness is only checked; the name and email are stored as given.
        let student = match request.student.as_deref() {
            Some(student) if !student.trim().is_empty() => student,
            _ => {
                return Err(ServiceError::InvalidArgument(
                    "the student name must not be blank".into(),
                ));
            }
        };
        let reservation = Reservation {
            student: student.to_string(),
            email: request.email.clone(),
        };

        for attempt in 1..=self.reserve_attempts {
            match self.try_reserve(id, date, request.turn, &reservation) {
                Err(ReserveStepError::Repository(RepositoryError::Conflict { .. })) => {
                    debug!(activity_id = %id, attempt, "reservation write lost a race, retrying");
                }
                other => return Ok(other?),
            }
        }

        warn!(activity_id = %id, %date, turn = request.turn, "reservation abandoned after repeated conflicts");
        Err(ServiceError::Conflict(format!(
            "activity {id} kept changing while reserving turn {} on {date}",
            request.turn
        )))
    }

    fn try_reserve(
        &self,
        id: &str,
        date: NaiveDate,
        index: i64,
        reservation: &Reservation,
    ) -> Result<bool, ReserveStepError> {
        let mut activity = self.repository.get_by_id(id)?;

        let day = activity.day_mut(date).ok_or_else(|| {
            ServiceError::InvalidArgument(format!("the date is not on the agenda: {date}"))
        })?;

        let position = usize::try_from(index - 1).unwrap_or(usize::MAX);
        let turn = day.turns.get_mut(position).ok_or_else(|| {
            ServiceError::InvalidArgument(format!("there is no turn {index} for the date {date}"))
        })?;

        if turn.reservation.is_some() {
            debug!(activity_id = %id, %date, turn = index, "turn already taken");
            return Ok(false);
        }
        turn.reservation = Some(reservation.clone());

        self.repository.update(&activity)?;
        info!(activity_id = %id, %date, turn = index, student = %reservation.student, "turn reserved");
        Ok(true)
    }

    /// Summaries of every stored activity. Identifiers that vanish between
    /// enumeration and lookup are reported in `skipped` rather than failing the
    /// whole listing.
    pub fn list_summaries(&self) -> Result<SummaryListing, ServiceError> {
        let mut listing = SummaryListing::default();

        for id in self.repository.ids()? {
            match self.repository.get_by_id(&id) {
                Ok(activity) => listing.summaries.push(ActivitySummary::from(&activity)),
                Err(err @ RepositoryError::NotFound(_)) => {
                    warn!(activity_id = %id, error = %err, "activity vanished while listing");
                    listing.skipped.push(SkippedActivity {
                        id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(listing)
    }
}

/// Outcome of one read-check-write cycle: either a final service error or a
/// repository error the retry loop inspects.
enum ReserveStepError {
    Service(ServiceError),
    Repository(RepositoryError),
}

impl From<ServiceError> for ReserveStepError {
    fn from(value: ServiceError) -> Self {
        ReserveStepError::Service(value)
    }
}

impl From<RepositoryError> for ReserveStepError {
    fn from(value: RepositoryError) -> Self {
        ReserveStepError::Repository(value)
    }
}

impl From<ReserveStepError> for ServiceError {
    fn from(value: ReserveStepError) -> Self {
        match value {
            ReserveStepError::Service(err) => err,
            ReserveStepError::Repository(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::{AgendaDay, Turn};
    use crate::repository::InMemoryActivityRepository;
    use crate::validation::SchemaValidator;

    fn may_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn sample_activity() -> Activity {
        Activity {
            id: String::new(),
            title: "Swimming".into(),
            instructor: "Jorge".into(),
            agenda: vec![AgendaDay::with_free_turns(may_first(), 2)],
            version: 0,
        }
    }

    fn service_with(repository: Arc<dyn ActivityRepository>) -> BookingService {
        BookingService::new(repository, Arc::new(SchemaValidator), 3)
    }

    fn service() -> BookingService {
        service_with(Arc::new(InMemoryActivityRepository::new()))
    }

    fn request(turn: i64, student: &str) -> ReservationRequest {
        ReservationRequest {
            date: Some(may_first()),
            turn,
            student: Some(student.into()),
            email: None,
        }
    }

    fn reservation_at(service: &BookingService, id: &str, turn: usize) -> Option<Reservation> {
        service.get_activity(id).unwrap().agenda[0].turns[turn].reservation.clone()
    }

    #[test]
    fn test_reserve_scenario() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();

        assert!(service.reserve(&id, &request(1, "Ana")).unwrap());
        assert!(!service.reserve(&id, &request(1, "Luis")).unwrap());
        assert!(service.reserve(&id, &request(2, "Luis")).unwrap());

        assert_eq!(reservation_at(&service, &id, 0).unwrap().student, "Ana");
        assert_eq!(reservation_at(&service, &id, 1).unwrap().student, "Luis");
    }

    #[test]
    fn test_reserve_stores_email() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        let mut req = request(2, "Ana");
        req.email = Some("ana@example.com".into());

        assert!(service.reserve(&id, &req).unwrap());
        assert_eq!(
            reservation_at(&service, &id, 1),
            Some(Reservation {
                student: "Ana".into(),
                email: Some("ana@example.com".into()),
            })
        );
    }

    #[test]
    fn test_reserve_stores_name_and_email_as_given() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        let mut req = request(1, " Ana ");
        req.email = Some("".into());

        assert!(service.reserve(&id, &req).unwrap());
        assert_eq!(
            reservation_at(&service, &id, 0),
            Some(Reservation {
                student: " Ana ".into(),
                email: Some("".into()),
            })
        );
    }

    #[test]
    fn test_reserve_without_email() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();

        assert!(service.reserve(&id, &request(2, "Luis")).unwrap());
        assert_eq!(reservation_at(&service, &id, 1).unwrap().email, None);
    }

    #[test]
    fn test_taken_turn_keeps_existing_reservation() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        service.reserve(&id, &request(1, "Ana")).unwrap();
        let before = service.get_activity(&id).unwrap();

        assert!(!service.reserve(&id, &request(1, "Luis")).unwrap());

        assert_eq!(service.get_activity(&id).unwrap(), before);
    }

    #[test]
    fn test_invalid_index() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();

        for turn in [0, -1, i64::MIN] {
            let err = service.reserve(&id, &request(turn, "Ana")).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidArgument(_)), "turn {turn}");
        }
        // Checked before the lookup, so a missing activity still reports the index.
        let err = service.reserve("missing", &request(0, "Ana")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn test_index_past_last_turn() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();

        let err = service.reserve(&id, &request(3, "Ana")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(msg) if msg.contains("no turn 3")));
    }

    #[test]
    fn test_date_not_on_agenda() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        let mut req = request(1, "Ana");
        req.date = NaiveDate::from_ymd_opt(2024, 5, 2);

        let err = service.reserve(&id, &req).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(msg) if msg.contains("not on the agenda")));
    }

    #[test]
    fn test_missing_date() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        let mut req = request(1, "Ana");
        req.date = None;

        assert!(matches!(
            service.reserve(&id, &req),
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_blank_student() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        let mut missing = request(1, "");
        missing.student = None;

        for req in [request(1, ""), request(1, "   "), missing] {
            assert!(matches!(
                service.reserve(&id, &req),
                Err(ServiceError::InvalidArgument(_))
            ));
        }
        assert!(reservation_at(&service, &id, 0).is_none());
    }

    #[test]
    fn test_reserve_unknown_activity() {
        let service = service();
        assert!(matches!(
            service.reserve("nope", &request(1, "Ana")),
            Err(ServiceError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_create_round_trip() {
        let service = service();
        let mut input = sample_activity();
        input.id = "client-chosen".into();

        let id = service.create(input.clone()).unwrap();
        let stored = service.get_activity(&id).unwrap();

        assert_ne!(id, "client-chosen");
        assert_eq!(stored, Activity { id: id.clone(), ..input });
    }

    #[test]
    fn test_create_reports_first_violation() {
        let service = service();
        let mut activity = sample_activity();
        activity.title.clear();
        activity.instructor.clear();

        let err = service.create(activity).unwrap_err();
        assert_eq!(
            err.to_string(),
            "activity does not conform to the schema: title must not be blank"
        );
    }

    #[test]
    fn test_update() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();
        let mut activity = service.get_activity(&id).unwrap();
        activity.agenda[0].turns.push(Turn::default());

        service.update(&activity).unwrap();
        assert!(service.reserve(&id, &request(3, "Ana")).unwrap());

        // `activity` still carries the version read before the two writes.
        assert!(matches!(
            service.update(&activity),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn test_update_unknown_activity() {
        let service = service();
        let mut activity = sample_activity();
        activity.id = "ghost".into();
        assert!(matches!(
            service.update(&activity),
            Err(ServiceError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_remove_activity() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();

        service.remove_activity(&id).unwrap();

        assert!(matches!(
            service.get_activity(&id),
            Err(ServiceError::EntityNotFound(_))
        ));
        assert!(matches!(
            service.remove_activity(&id),
            Err(ServiceError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_list_summaries() {
        let service = service();
        let id = service.create(sample_activity()).unwrap();

        let listing = service.list_summaries().unwrap();
        assert_eq!(
            listing.summaries,
            vec![ActivitySummary {
                id,
                title: "Swimming".into(),
                instructor: "Jorge".into(),
            }]
        );
        assert!(listing.skipped.is_empty());
    }

    /// Lists an identifier that no longer resolves.
    struct VanishingRepository {
        inner: InMemoryActivityRepository,
    }

    impl ActivityRepository for VanishingRepository {
        fn add(&self, activity: Activity) -> Result<String, RepositoryError> {
            self.inner.add(activity)
        }
        fn update(&self, activity: &Activity) -> Result<(), RepositoryError> {
            self.inner.update(activity)
        }
        fn get_by_id(&self, id: &str) -> Result<Activity, RepositoryError> {
            self.inner.get_by_id(id)
        }
        fn delete(&self, activity: &Activity) -> Result<(), RepositoryError> {
            self.inner.delete(activity)
        }
        fn ids(&self) -> Result<Vec<String>, RepositoryError> {
            let mut ids = self.inner.ids()?;
            ids.push("vanished".into());
            Ok(ids)
        }
    }

    #[test]
    fn test_list_summaries_reports_vanished_ids() {
        let service = service_with(Arc::new(VanishingRepository {
            inner: InMemoryActivityRepository::new(),
        }));
        service.create(sample_activity()).unwrap();

        let listing = service.list_summaries().unwrap();
        assert_eq!(listing.summaries.len(), 1);
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(listing.skipped[0].id, "vanished");
    }

    /// Lets a competing student claim `turn` right before each of the first
    /// `races` updates.
    struct RacingRepository {
        inner: InMemoryActivityRepository,
        competitor_turn: usize,
        races: usize,
        raced: AtomicUsize,
        competitors: Mutex<Vec<String>>,
    }

    impl RacingRepository {
        fn new(competitor_turn: usize, races: usize) -> Self {
            Self {
                inner: InMemoryActivityRepository::new(),
                competitor_turn,
                races,
                raced: AtomicUsize::new(0),
                competitors: Mutex::new(Vec::new()),
            }
        }
    }

    impl ActivityRepository for RacingRepository {
        fn add(&self, activity: Activity) -> Result<String, RepositoryError> {
            self.inner.add(activity)
        }
        fn update(&self, activity: &Activity) -> Result<(), RepositoryError> {
            if self.raced.fetch_add(1, Ordering::SeqCst) < self.races {
                let mut current = self.inner.get_by_id(&activity.id)?;
                let name = format!("Competitor {}", self.raced.load(Ordering::SeqCst));
                current.agenda[0].turns[self.competitor_turn].reservation = Some(Reservation {
                    student: name.clone(),
                    email: None,
                });
                self.inner.update(&current)?;
                self.competitors.lock().unwrap().push(name);
            }
            self.inner.update(activity)
        }
        fn get_by_id(&self, id: &str) -> Result<Activity, RepositoryError> {
            self.inner.get_by_id(id)
        }
        fn delete(&self, activity: &Activity) -> Result<(), RepositoryError> {
            self.inner.delete(activity)
        }
        fn ids(&self) -> Result<Vec<String>, RepositoryError> {
            self.inner.ids()
        }
    }

    /// Storage that breaks on one kind of call and counts updates.
    struct BrokenRepository {
        inner: InMemoryActivityRepository,
        broken: &'static str,
        updates: AtomicUsize,
    }

    impl BrokenRepository {
        fn new(broken: &'static str) -> Self {
            Self {
                inner: InMemoryActivityRepository::new(),
                broken,
                updates: AtomicUsize::new(0),
            }
        }

        fn check(&self, call: &str) -> Result<(), RepositoryError> {
            if self.broken == call {
                return Err(RepositoryError::Unavailable(format!("{call} failed")));
            }
            Ok(())
        }
    }

    impl ActivityRepository for BrokenRepository {
        fn add(&self, activity: Activity) -> Result<String, RepositoryError> {
            self.inner.add(activity)
        }
        fn update(&self, activity: &Activity) -> Result<(), RepositoryError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.check("update")?;
            self.inner.update(activity)
        }
        fn get_by_id(&self, id: &str) -> Result<Activity, RepositoryError> {
            self.check("get_by_id")?;
            self.inner.get_by_id(id)
        }
        fn delete(&self, activity: &Activity) -> Result<(), RepositoryError> {
            self.inner.delete(activity)
        }
        fn ids(&self) -> Result<Vec<String>, RepositoryError> {
            self.check("ids")?;
            self.inner.ids()
        }
    }

    #[test]
    fn test_reserve_storage_failure_is_not_retried() {
        let repository = Arc::new(BrokenRepository::new("update"));
        let service = service_with(repository.clone());
        let id = service.create(sample_activity()).unwrap();

        let err = service.reserve(&id, &request(1, "Ana")).unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Repository(RepositoryError::Unavailable(_))
        ));
        assert_eq!(repository.updates.load(Ordering::SeqCst), 1);
        assert!(repository.inner.get_by_id(&id).unwrap().agenda[0].turns[0].is_free());
    }

    #[test]
    fn test_list_summaries_propagates_storage_failure() {
        for broken in ["get_by_id", "ids"] {
            let service = service_with(Arc::new(BrokenRepository::new(broken)));
            service.create(sample_activity()).unwrap();

            assert!(
                matches!(
                    service.list_summaries(),
                    Err(ServiceError::Repository(RepositoryError::Unavailable(_)))
                ),
                "{broken}"
            );
        }
    }

    #[test]
    fn test_lost_race_on_same_turn_returns_false() {
        let repository = Arc::new(RacingRepository::new(0, 1));
        let service = service_with(repository.clone());
        let id = service.create(sample_activity()).unwrap();

        assert!(!service.reserve(&id, &request(1, "Ana")).unwrap());
        assert_eq!(
            reservation_at(&service, &id, 0).unwrap().student,
            "Competitor 1"
        );
    }

    #[test]
    fn test_lost_race_on_other_turn_retries() {
        let repository = Arc::new(RacingRepository::new(1, 1));
        let service = service_with(repository.clone());
        let id = service.create(sample_activity()).unwrap();

        assert!(service.reserve(&id, &request(1, "Ana")).unwrap());
        assert_eq!(reservation_at(&service, &id, 0).unwrap().student, "Ana");
        assert_eq!(repository.competitors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_after_exhausting_attempts() {
        let repository = Arc::new(RacingRepository::new(1, usize::MAX));
        let service = service_with(repository);
        let id = service.create(sample_activity()).unwrap();

        let err = service.reserve(&id, &request(1, "Ana")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(reservation_at(&service, &id, 0).is_none());
    }
}
