use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BULK_SKIPPED_TOTAL, MUTATIONS_TOTAL};

use super::{Engine, EngineError};

impl Mutation {
    /// Pure state transition. Does not touch `updated_at`.
    pub fn apply_to(&self, record: &mut ReservationRecord) {
        match self {
            Mutation::ToggleLunch => record.set(Meal::Lunch, !record.has(Meal::Lunch)),
            Mutation::ToggleDinner => record.set(Meal::Dinner, !record.has(Meal::Dinner)),
            Mutation::SetLunch => record.set(Meal::Lunch, true),
            Mutation::SetDinner => record.set(Meal::Dinner, true),
            Mutation::SetBoth => {
                record.set(Meal::Lunch, true);
                record.set(Meal::Dinner, true);
            }
        }
    }
}

impl Engine {
    /// Apply one mutation to the `(user, date)` reservation.
    ///
    /// Past the cutoff nothing is written and the current (or zero-value)
    /// record comes back with `Outcome::RejectedByCutoff`.
    pub async fn apply_mutation(
        &self,
        user: &User,
        date: NaiveDate,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> Result<(ReservationRecord, Outcome), EngineError> {
        let existing = self.repo.find_reservation(user.id, date).await?;
        let mut record = existing.unwrap_or_else(|| ReservationRecord::empty(user.id, date, now));

        if !self.policy.permits(now, date) {
            debug!(user = user.id, %date, kind = mutation.label(), "rejected by cutoff");
            metrics::counter!(MUTATIONS_TOTAL, "kind" => mutation.label(), "outcome" => "rejected_by_cutoff")
                .increment(1);
            return Ok((record, Outcome::RejectedByCutoff));
        }

        mutation.apply_to(&mut record);
        record.updated_at = now;
        self.repo.save_reservation(&record).await?;

        debug!(user = user.id, %date, kind = mutation.label(), state = ?record.state(), "applied");
        metrics::counter!(MUTATIONS_TOTAL, "kind" => mutation.label(), "outcome" => "applied")
            .increment(1);
        Ok((record, Outcome::Applied))
    }

    /// Turn meals on across the window, skipping days already past cutoff.
    pub async fn set_all(
        &self,
        user: &User,
        selection: BulkSelection,
        now: DateTime<Utc>,
    ) -> Result<BulkReport, EngineError> {
        let mutation = selection.mutation();
        let mut report = BulkReport::default();
        for date in self.policy.window(now) {
            match self.apply_mutation(user, date, mutation, now).await?.1 {
                Outcome::Applied => report.applied.push(date),
                Outcome::RejectedByCutoff => report.skipped.push(date),
            }
        }
        metrics::counter!(BULK_SKIPPED_TOTAL).increment(report.skipped.len() as u64);
        Ok(report)
    }

    /// Return the stored user, creating it on first contact.
    pub async fn register_user(
        &self,
        id: UserId,
        username: &str,
        name: &str,
    ) -> Result<User, EngineError> {
        if let Some(user) = self.repo.find_user(id).await? {
            return Ok(user);
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(EngineError::LimitExceeded("username too long"));
        }
        let user = User::new(id, username, name);
        self.repo.save_user(&user).await?;
        tracing::info!(user = id, username, "registered user");
        Ok(user)
    }

    /// Flip a standing "always lunch/dinner" preference.
    pub async fn toggle_standing(&self, user_id: UserId, meal: Meal) -> Result<User, EngineError> {
        let mut user = self
            .repo
            .find_user(user_id)
            .await?
            .ok_or(EngineError::UnknownUser(user_id))?;
        user.flip_standing(meal);
        self.repo.save_user(&user).await?;
        Ok(user)
    }

    pub async fn name_menu_item(&self, slot: u8, meal: Meal, name: &str) -> Result<(), EngineError> {
        if !(1..=MENU_SLOTS).contains(&slot) {
            return Err(EngineError::LimitExceeded("menu slot out of range"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::LimitExceeded("menu name empty"));
        }
        if name.chars().count() > MAX_MEAL_NAME_LEN {
            return Err(EngineError::LimitExceeded("menu name too long"));
        }
        self.repo.save_menu_item(slot, meal, name).await?;
        Ok(())
    }
}
