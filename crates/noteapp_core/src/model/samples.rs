//! Demonstration notes used to populate an empty cache.

use crate::model::note::{now_millis, Importance, Note};

/// Returns the demonstration note set.
///
/// Ids are unique and run `1..=12`; the first three notes are stamped with
/// the current time, the rest with fixed November 2024 instants.
pub fn sample_notes() -> Vec<Note> {
    let now = now_millis();
    let rows: [(&str, &str, Importance, i64); 12] = [
        (
            "Grocery List",
            "Buy milk, eggs, bread, and coffee.",
            Importance::Medium,
            now,
        ),
        (
            "Meeting Notes",
            "Discuss project timeline and assign tasks.",
            Importance::Urgent,
            now,
        ),
        (
            "To-Do List",
            "Finish Kotlin course, clean the house, and go to the gym.",
            Importance::Medium,
            now,
        ),
        (
            "Meeting Reminder",
            "Prepare agenda for 10 AM team meeting.",
            Importance::High,
            // 2024-11-10T09:00:00Z
            1_731_229_200_000,
        ),
        (
            "Dentist Appointment",
            "Dentist appointment on November 15th at 3 PM.",
            Importance::High,
            // 2024-11-10T12:45:00Z
            1_731_242_700_000,
        ),
        (
            "To-Do List",
            "Finish writing report, review email drafts, clean office.",
            Importance::Medium,
            // 2024-11-10T14:30:00Z
            1_731_249_000_000,
        ),
        (
            "Birthday Gift Idea",
            "Buy a gift for Sarah's birthday (something related to cooking).",
            Importance::Low,
            // 2024-11-10T16:00:00Z
            1_731_254_400_000,
        ),
        (
            "Car Maintenance",
            "Schedule oil change for the car this week.",
            Importance::Medium,
            // 2024-11-11T10:15:00Z
            1_731_320_100_000,
        ),
        (
            "Meeting with John",
            "Discuss project progress with John tomorrow at 2 PM.",
            Importance::High,
            // 2024-11-11T12:00:00Z
            1_731_326_400_000,
        ),
        (
            "Vacation Planning",
            "Research flight options for trip to Hawaii next summer.",
            Importance::Low,
            // 2024-11-11T13:30:00Z
            1_731_331_800_000,
        ),
        (
            "Work Anniversary",
            "Send congratulatory message to team for 5-year work anniversary.",
            Importance::Medium,
            // 2024-11-12T09:00:00Z
            1_731_402_000_000,
        ),
        (
            "Work Anniversary",
            "Send congratulatory message to team for 5-year work anniversary.",
            Importance::Medium,
            1_731_402_000_000,
        ),
    ];

    rows.into_iter()
        .zip(1..)
        .map(|((title, content, importance, timestamp), id)| Note {
            id,
            title: title.to_string(),
            content: content.to_string(),
            importance,
            timestamp,
        })
        .collect()
}
