use icalendar::{Calendar, Component, Event, EventLike};

use crate::models::{Activity, Turn};

#[derive(Clone, Default)]
pub struct ICalExporter;

impl ICalExporter {
    pub fn new() -> Self {
        Self
    }

    /// One all-day event per agenda day, listing which turns are still free.
    pub fn generate(&self, activity: &Activity) -> Vec<u8> {
        if activity.agenda.is_empty() {
            return Vec::new();
        }

        let mut calendar = Calendar::new();
        calendar.name(&activity.title);

        for day in &activity.agenda {
            let free = day.turns.iter().filter(|turn| turn.is_free()).count();

            let mut event = Event::new();
            event.summary(&format!("{} ({})", activity.title, activity.instructor));
            event.all_day(day.date);
            event.description(&format!(
                "Instructor: {}\nFree turns: {free}/{}\n{}",
                activity.instructor,
                day.turns.len(),
                describe_turns(&day.turns)
            ));
            event.uid(&format!("{}-{}-bookle", activity.id, day.date.format("%Y%m%d")));
            calendar.push(event);
        }

        calendar.to_string().into_bytes()
    }
}

fn describe_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| match &turn.reservation {
            Some(reservation) => format!("Turn {}: reserved by {}", i + 1, reservation.student),
            None => format!("Turn {}: free", i + 1),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{AgendaDay, Reservation};

    #[test]
    fn test_generate_agenda() {
        let exporter = ICalExporter::new();
        let mut day = AgendaDay::with_free_turns(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 2);
        day.turns[0].reservation = Some(Reservation {
            student: "Ana".into(),
            email: None,
        });
        let activity = Activity {
            id: "a1".into(),
            title: "Swimming".into(),
            instructor: "Jorge".into(),
            agenda: vec![day],
            version: 0,
        };

        let body = String::from_utf8(exporter.generate(&activity)).unwrap();
        assert!(body.contains("BEGIN:VEVENT"));
        assert!(body.contains("Swimming (Jorge)"));
        assert!(body.contains("a1-20240501-bookle"));
        assert!(body.contains("20240501"));
    }

    #[test]
    fn test_generate_empty() {
        let exporter = ICalExporter::new();
        assert!(exporter.generate(&Activity::default()).is_empty());
    }

    #[test]
    fn test_describe_turns() {
        let turns = vec![
            Turn {
                reservation: Some(Reservation {
                    student: "Luis".into(),
                    email: None,
                }),
            },
            Turn::default(),
        ];
        assert_eq!(
            describe_turns(&turns),
            "Turn 1: reserved by Luis\nTurn 2: free"
        );
    }
}
