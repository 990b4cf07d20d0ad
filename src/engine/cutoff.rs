use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::limits::WINDOW_DAYS;

/// When a day's reservation freezes: the previous day at `cutoff` local time.
///
/// `now == max_edit_instant(date)` is still editable. Single-day toggles and
/// bulk selection both go through `permits`.
#[derive(Debug, Clone, Copy)]
pub struct CutoffPolicy {
    pub tz: Tz,
    pub cutoff: NaiveTime,
}

impl Default for CutoffPolicy {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Tehran,
            cutoff: NaiveTime::from_hms_opt(17, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl CutoffPolicy {
    pub fn new(tz: Tz, cutoff: NaiveTime) -> Self {
        Self { tz, cutoff }
    }

    pub fn max_edit_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        let eve = date.checked_sub_days(Days::new(1)).unwrap_or(date);
        self.local_to_utc(eve.and_time(self.cutoff))
    }

    pub fn permits(&self, now: DateTime<Utc>, date: NaiveDate) -> bool {
        now <= self.max_edit_instant(date)
    }

    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// `WINDOW_DAYS` consecutive local dates starting today.
    pub fn window(&self, now: DateTime<Utc>) -> impl Iterator<Item = NaiveDate> {
        let today = self.local_today(now);
        (0..WINDOW_DAYS as u64).filter_map(move |i| today.checked_add_days(Days::new(i)))
    }

    /// A wall-clock time skipped by a DST jump resolves with the offset in
    /// force just after the jump.
    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
            LocalResult::None => {
                let offset = self.tz.offset_from_utc_datetime(&local).fix();
                Utc.from_utc_datetime(&(local - offset))
            }
        }
    }
}
