use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Activity {
    /// Assigned by the repository on creation; any value sent on create is discarded.
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub instructor: String,
    #[serde(default)]
    pub agenda: Vec<AgendaDay>,
    /// Bumped on every stored update. Updates carrying a stale version are rejected.
    #[serde(default)]
    pub version: u64,
}

impl Activity {
    pub fn day_mut(&mut self, date: NaiveDate) -> Option<&mut AgendaDay> {
        self.agenda.iter_mut().find(|day| day.date == date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AgendaDay {
    #[schema(value_type = String, format = "date", example = "2024-05-01")]
    pub date: NaiveDate,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

#[cfg(test)]
impl AgendaDay {
    /// A day with `count` free turns.
    pub(crate) fn with_free_turns(date: NaiveDate, count: usize) -> Self {
        Self {
            date,
            turns: vec![Turn::default(); count],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Turn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
}

impl Turn {
    pub fn is_free(&self) -> bool {
        self.reservation.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Reservation {
    pub student: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ActivitySummary {
    pub id: String,
    pub title: String,
    pub instructor: String,
}

impl From<&Activity> for ActivitySummary {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id.clone(),
            title: activity.title.clone(),
            instructor: activity.instructor.clone(),
        }
    }
}

/// An identifier that disappeared between enumeration and lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SkippedActivity {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SummaryListing {
    pub summaries: Vec<ActivitySummary>,
    pub skipped: Vec<SkippedActivity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReservationRequest {
    /// Absent, `null` and `""` all mean "no date".
    #[serde(default, deserialize_with = "blank_date_as_none")]
    #[schema(value_type = Option<String>, format = "date", example = "2024-05-01")]
    pub date: Option<NaiveDate>,
    /// 1-based position of the turn within the day. Absent means 0.
    #[serde(default)]
    pub turn: i64,
    pub student: Option<String>,
    pub email: Option<String>,
}

fn blank_date_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ReservationOutcome {
    pub reserved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CreatedActivity {
    pub id: String,
}
