use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Chat-platform account id. Sessions and the queue are keyed by it.
pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Meal {
    Lunch,
    Dinner,
}

impl Meal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Meal::Lunch => "lunch",
            Meal::Dinner => "dinner",
        }
    }
}

impl std::fmt::Display for Meal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: String,
    /// Standing preferences. Applied as an overlay, never copied into reservations.
    pub always_lunch: bool,
    pub always_dinner: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            name: name.into(),
            always_lunch: false,
            always_dinner: false,
        }
    }

    pub fn standing(&self, meal: Meal) -> bool {
        match meal {
            Meal::Lunch => self.always_lunch,
            Meal::Dinner => self.always_dinner,
        }
    }

    pub fn flip_standing(&mut self, meal: Meal) {
        match meal {
            Meal::Lunch => self.always_lunch = !self.always_lunch,
            Meal::Dinner => self.always_dinner = !self.always_dinner,
        }
    }
}

/// One row per (user, date). `date` carries no time component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: Ulid,
    pub date: NaiveDate,
    pub user_id: UserId,
    pub has_lunch: bool,
    pub has_dinner: bool,
    pub updated_at: DateTime<Utc>,
}

impl ReservationRecord {
    /// Zero-value record for a pair that has never been written.
    pub fn empty(user_id: UserId, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new(),
            date,
            user_id,
            has_lunch: false,
            has_dinner: false,
            updated_at: now,
        }
    }

    pub fn has(&self, meal: Meal) -> bool {
        match meal {
            Meal::Lunch => self.has_lunch,
            Meal::Dinner => self.has_dinner,
        }
    }

    pub fn set(&mut self, meal: Meal, value: bool) {
        match meal {
            Meal::Lunch => self.has_lunch = value,
            Meal::Dinner => self.has_dinner = value,
        }
    }

    pub fn state(&self) -> ReservationState {
        match (self.has_lunch, self.has_dinner) {
            (false, false) => ReservationState::Unset,
            (true, false) => ReservationState::LunchOnly,
            (false, true) => ReservationState::DinnerOnly,
            (true, true) => ReservationState::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Unset,
    LunchOnly,
    DinnerOnly,
    Both,
}

/// Decoded once at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    ToggleLunch,
    ToggleDinner,
    SetLunch,
    SetDinner,
    SetBoth,
}

impl Mutation {
    pub fn toggle(meal: Meal) -> Self {
        match meal {
            Meal::Lunch => Mutation::ToggleLunch,
            Meal::Dinner => Mutation::ToggleDinner,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mutation::ToggleLunch => "toggle_lunch",
            Mutation::ToggleDinner => "toggle_dinner",
            Mutation::SetLunch => "set_lunch",
            Mutation::SetDinner => "set_dinner",
            Mutation::SetBoth => "set_both",
        }
    }
}

/// Which meals a bulk selection turns on across the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkSelection {
    Lunch,
    Dinner,
    Both,
}

impl BulkSelection {
    pub fn mutation(&self) -> Mutation {
        match self {
            BulkSelection::Lunch => Mutation::SetLunch,
            BulkSelection::Dinner => Mutation::SetDinner,
            BulkSelection::Both => Mutation::SetBoth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    RejectedByCutoff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub applied: Vec<NaiveDate>,
    pub skipped: Vec<NaiveDate>,
}

/// Effective lunch/dinner state after the standing-preference overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub lunch: bool,
    pub dinner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySelection {
    pub date: NaiveDate,
    pub slot: u8,
    pub selection: Selection,
    pub editable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuDay {
    pub slot: u8,
    pub lunch: Option<String>,
    pub dinner: Option<String>,
}

impl MenuDay {
    pub fn name(&self, meal: Meal) -> Option<&str> {
        match meal {
            Meal::Lunch => self.lunch.as_deref(),
            Meal::Dinner => self.dinner.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub lunch: usize,
    pub dinner: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub date: NaiveDate,
    pub lunch: Vec<String>,
    pub dinner: Vec<String>,
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserSaved(User),
    ReservationSaved(ReservationRecord),
    MenuItemNamed { slot: u8, meal: Meal, name: String },
}
