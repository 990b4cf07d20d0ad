use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::calendar;
use crate::model::*;

use super::{Engine, EngineError};

/// Standing preferences win over the stored flags; nothing is materialized.
pub fn effective_selection(user: &User, record: Option<&ReservationRecord>) -> Selection {
    Selection {
        lunch: user.standing(Meal::Lunch) || record.is_some_and(|r| r.has(Meal::Lunch)),
        dinner: user.standing(Meal::Dinner) || record.is_some_and(|r| r.has(Meal::Dinner)),
    }
}

impl Engine {
    pub async fn user(&self, id: UserId) -> Result<Option<User>, EngineError> {
        Ok(self.repo.find_user(id).await?)
    }

    /// Effective selection for each day of the window, with its menu slot.
    pub async fn selection_window(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Vec<DaySelection>, EngineError> {
        let mut days = Vec::new();
        for date in self.policy.window(now) {
            let record = self.repo.find_reservation(user.id, date).await?;
            days.push(DaySelection {
                date,
                slot: calendar::menu_slot(date),
                selection: effective_selection(user, record.as_ref()),
                editable: self.policy.permits(now, date),
            });
        }
        Ok(days)
    }

    /// Every user with an effective lunch/dinner on `date`, by username.
    pub async fn roster(&self, date: NaiveDate) -> Result<Roster, EngineError> {
        let users = self.repo.users().await?;
        let records: HashMap<UserId, ReservationRecord> = self
            .repo
            .reservations_on(date)
            .await?
            .into_iter()
            .map(|r| (r.user_id, r))
            .collect();

        let mut roster = Roster {
            date,
            lunch: Vec::new(),
            dinner: Vec::new(),
        };
        for user in &users {
            let selection = effective_selection(user, records.get(&user.id));
            if selection.lunch {
                roster.lunch.push(user.username.clone());
            }
            if selection.dinner {
                roster.dinner.push(user.username.clone());
            }
        }
        Ok(roster)
    }

    pub async fn daily_count(&self, date: NaiveDate) -> Result<DailyCount, EngineError> {
        let roster = self.roster(date).await?;
        Ok(DailyCount {
            date,
            lunch: roster.lunch.len(),
            dinner: roster.dinner.len(),
        })
    }

    /// Rosters for the window starting at today.
    pub async fn upcoming_rosters(&self, now: DateTime<Utc>) -> Result<Vec<Roster>, EngineError> {
        let mut rosters = Vec::new();
        for date in self.policy.window(now) {
            rosters.push(self.roster(date).await?);
        }
        Ok(rosters)
    }

    pub async fn menu(&self) -> Result<Vec<MenuDay>, EngineError> {
        Ok(self.repo.menu().await?)
    }
}
