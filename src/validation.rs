use std::collections::HashSet;

use crate::models::Activity;

/// A single schema diagnostic. `path` points at the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub trait ActivityValidator: Send + Sync {
    /// Returns every violation found; an empty vector means the activity is valid.
    fn validate(&self, activity: &Activity) -> Vec<SchemaViolation>;
}

#[derive(Debug, Clone, Default)]
pub struct SchemaValidator;

impl ActivityValidator for SchemaValidator {
    fn validate(&self, activity: &Activity) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();

        if activity.id.is_empty() {
            violations.push(SchemaViolation::new("id", "id is required"));
        }
        if activity.title.trim().is_empty() {
            violations.push(SchemaViolation::new("title", "title must not be blank"));
        }
        if activity.instructor.trim().is_empty() {
            violations.push(SchemaViolation::new(
                "instructor",
                "instructor must not be blank",
            ));
        }

        let mut seen = HashSet::new();
        for (i, day) in activity.agenda.iter().enumerate() {
            if !seen.insert(day.date) {
                violations.push(SchemaViolation::new(
                    format!("agenda[{i}].date"),
                    format!("date {} appears more than once in the agenda", day.date),
                ));
            }
            for (j, turn) in day.turns.iter().enumerate() {
                if let Some(reservation) = &turn.reservation
                    && reservation.student.trim().is_empty()
                {
                    violations.push(SchemaViolation::new(
                        format!("agenda[{i}].turns[{j}].reservation.student"),
                        "student must not be blank",
                    ));
                }
            }
        }

        violations
    }
}
