use chrono::NaiveDate;
use dashmap::DashMap;

use crate::model::*;

/// In-memory view of everything the log has recorded.
pub struct MemoryState {
    users: DashMap<UserId, User>,
    /// Keyed by the (user, date) pair, never by record id.
    reservations: DashMap<(UserId, NaiveDate), ReservationRecord>,
    menu: DashMap<u8, MenuDay>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            reservations: DashMap::new(),
            menu: DashMap::new(),
        }
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    // ── Reservations ─────────────────────────────────────────

    pub fn reservation(&self, user_id: UserId, date: NaiveDate) -> Option<ReservationRecord> {
        self.reservations
            .get(&(user_id, date))
            .map(|e| e.value().clone())
    }

    pub fn reservations_on(&self, date: NaiveDate) -> Vec<ReservationRecord> {
        self.reservations
            .iter()
            .filter(|e| e.key().1 == date)
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Menu ─────────────────────────────────────────────────

    pub fn menu_day(&self, slot: u8) -> MenuDay {
        self.menu
            .get(&slot)
            .map(|e| e.value().clone())
            .unwrap_or(MenuDay {
                slot,
                ..MenuDay::default()
            })
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::UserSaved(user) => {
                self.users.insert(user.id, user.clone());
            }
            Event::ReservationSaved(record) => {
                self.reservations
                    .insert((record.user_id, record.date), record.clone());
            }
            Event::MenuItemNamed { slot, meal, name } => {
                let mut day = self.menu.entry(*slot).or_insert_with(|| MenuDay {
                    slot: *slot,
                    ..MenuDay::default()
                });
                match meal {
                    Meal::Lunch => day.lunch = Some(name.clone()),
                    Meal::Dinner => day.dinner = Some(name.clone()),
                }
            }
        }
    }

    /// Minimal event list that recreates the current state.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.users().into_iter().map(Event::UserSaved).collect();

        let mut records: Vec<ReservationRecord> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| (r.date, r.user_id));
        events.extend(records.into_iter().map(Event::ReservationSaved));

        let mut days: Vec<MenuDay> = self.menu.iter().map(|e| e.value().clone()).collect();
        days.sort_by_key(|d| d.slot);
        for day in days {
            for meal in [Meal::Lunch, Meal::Dinner] {
                if let Some(name) = day.name(meal) {
                    events.push(Event::MenuItemNamed {
                        slot: day.slot,
                        meal,
                        name: name.to_string(),
                    });
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn reservation_upsert_keeps_one_row_per_pair() {
        let state = MemoryState::new();
        let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let mut record = ReservationRecord::empty(1, date, Utc::now());
        state.apply_event(&Event::ReservationSaved(record.clone()));
        record.has_dinner = true;
        state.apply_event(&Event::ReservationSaved(record.clone()));

        assert_eq!(state.reservations_on(date).len(), 1);
        assert_eq!(state.reservation(1, date), Some(record));
    }

    #[test]
    fn menu_names_accumulate_per_slot() {
        let state = MemoryState::new();
        state.apply_event(&Event::MenuItemNamed {
            slot: 2,
            meal: Meal::Lunch,
            name: "Rice".into(),
        });
        state.apply_event(&Event::MenuItemNamed {
            slot: 2,
            meal: Meal::Dinner,
            name: "Soup".into(),
        });

        let day = state.menu_day(2);
        assert_eq!(day.name(Meal::Lunch), Some("Rice"));
        assert_eq!(day.name(Meal::Dinner), Some("Soup"));
        assert_eq!(state.menu_day(9).lunch, None);
    }

    #[test]
    fn snapshot_rebuilds_identical_state() {
        let state = MemoryState::new();
        let date = NaiveDate::from_ymd_opt(2025, 10, 16).unwrap();
        state.apply_event(&Event::UserSaved(User::new(5, "dee", "Dee")));
        state.apply_event(&Event::ReservationSaved(ReservationRecord::empty(5, date, Utc::now())));
        state.apply_event(&Event::MenuItemNamed {
            slot: 1,
            meal: Meal::Dinner,
            name: "Stew".into(),
        });

        let rebuilt = MemoryState::new();
        for event in state.snapshot_events() {
            rebuilt.apply_event(&event);
        }
        assert_eq!(rebuilt.users(), state.users());
        assert_eq!(rebuilt.reservation(5, date), state.reservation(5, date));
        assert_eq!(rebuilt.menu_day(1), state.menu_day(1));
    }
}
