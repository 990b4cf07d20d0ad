use std::fmt::Write;

use chrono::NaiveTime;

use crate::calendar;
use crate::command::CallbackAction;
use crate::model::*;
use crate::transport::{Button, OutgoingMessage};

pub const ACCESS_DENIED: &str = "Access denied.";
pub const TRY_AGAIN: &str = "Something went wrong, please try again.";
pub const MENU_UPDATED: &str = "Menu updated.";
pub const SETTING_CHANGED: &str = "Setting changed.";
pub const ALL_SELECTED: &str = "All open days selected.";
pub const DAY_CLOSED: &str = "Changes for this day are closed.";

/// Button caption: the meal name, ticked when selected.
pub fn button_text(label: &str, selected: bool) -> String {
    if selected {
        format!("✅ {label}")
    } else {
        label.to_string()
    }
}

pub fn help_text(is_admin: bool, cutoff: NaiveTime) -> String {
    let mut s = String::from("Help:\n");
    s.push_str("/select - choose meals\n");
    let _ = writeln!(
        s,
        "    Shows the next two weeks. Each day can be changed until {} the day before.",
        cutoff.format("%H:%M")
    );
    s.push_str("/setting - settings\n");
    s.push_str("    \"Always lunch\" or \"always dinner\" counts you in for that meal every day.\n");
    if is_admin {
        s.push_str("\nAdmin:\n");
        s.push_str("/setList - edit the two-week menu\n");
        s.push_str("/getCounts - today's totals\n");
        s.push_str("/getReserves - who eats what, next two weeks\n");
    }
    s
}

/// One row per day (label, lunch, dinner) and a bulk row at the bottom.
pub fn selection_form(days: &[DaySelection], menu: &[MenuDay]) -> OutgoingMessage {
    let mut rows = Vec::with_capacity(days.len() + 1);
    for day in days {
        let menu_day = menu.iter().find(|m| m.slot == day.slot);
        let name = |meal: Meal| {
            menu_day
                .and_then(|m| m.name(meal))
                .unwrap_or(default_meal_name(meal))
        };
        rows.push(vec![
            Button::new(
                calendar::day_label(day.date),
                CallbackAction::DayLabel(day.date).encode(),
            ),
            Button::new(
                button_text(name(Meal::Lunch), day.selection.lunch),
                CallbackAction::Toggle { date: day.date, meal: Meal::Lunch }.encode(),
            ),
            Button::new(
                button_text(name(Meal::Dinner), day.selection.dinner),
                CallbackAction::Toggle { date: day.date, meal: Meal::Dinner }.encode(),
            ),
        ]);
    }
    rows.push(vec![
        Button::new("All lunches", CallbackAction::Bulk(BulkSelection::Lunch).encode()),
        Button::new("All dinners", CallbackAction::Bulk(BulkSelection::Dinner).encode()),
        Button::new("*", CallbackAction::Bulk(BulkSelection::Both).encode()),
    ]);
    OutgoingMessage::with_keyboard("Please select your meals for each day.", rows)
}

pub fn settings_form(user: &User) -> OutgoingMessage {
    OutgoingMessage::with_keyboard(
        "Settings",
        vec![vec![
            Button::new(
                button_text("Always lunch", user.standing(Meal::Lunch)),
                CallbackAction::Standing(Meal::Lunch).encode(),
            ),
            Button::new(
                button_text("Always dinner", user.standing(Meal::Dinner)),
                CallbackAction::Standing(Meal::Dinner).encode(),
            ),
        ]],
    )
}

/// Admin view of the rotation: one row per slot, each name editable.
pub fn menu_form(menu: &[MenuDay]) -> OutgoingMessage {
    let rows = menu
        .iter()
        .map(|day| {
            let week = if day.slot > 7 { 2 } else { 1 };
            vec![
                Button::new(
                    format!("{} {week}", calendar::weekday_name(calendar::slot_weekday(day.slot))),
                    CallbackAction::Noop.encode(),
                ),
                Button::new(
                    day.name(Meal::Lunch).unwrap_or(default_meal_name(Meal::Lunch)),
                    CallbackAction::EditMenu { slot: day.slot, meal: Meal::Lunch }.encode(),
                ),
                Button::new(
                    day.name(Meal::Dinner).unwrap_or(default_meal_name(Meal::Dinner)),
                    CallbackAction::EditMenu { slot: day.slot, meal: Meal::Dinner }.encode(),
                ),
            ]
        })
        .collect();
    OutgoingMessage::with_keyboard("Choose an item to rename.", rows)
}

pub fn menu_prompt(slot: u8, meal: Meal) -> String {
    format!("Enter {meal} for day {slot}:")
}

pub fn toggled_text(date: chrono::NaiveDate) -> String {
    format!("{} changed", calendar::weekday_name(chrono::Datelike::weekday(&date)))
}

pub fn counts_text(count: &DailyCount) -> String {
    format!("Lunch: {}\nDinner: {}", count.lunch, count.dinner)
}

/// Each day headed by its local calendar date, then the usernames per meal.
pub fn rosters_text(rosters: &[Roster]) -> String {
    let mut s = String::new();
    for roster in rosters {
        let (y, m, d) = calendar::local_date(roster.date);
        let _ = writeln!(s, "{y}/{m}/{d}\n");
        let _ = writeln!(s, "lunch: {}", roster.lunch.len());
        for name in &roster.lunch {
            let _ = writeln!(s, "@{name}");
        }
        let _ = writeln!(s, "\ndinner: {}", roster.dinner.len());
        for name in &roster.dinner {
            let _ = writeln!(s, "@{name}");
        }
        s.push_str("\n----------\n");
    }
    s
}

fn default_meal_name(meal: Meal) -> &'static str {
    match meal {
        Meal::Lunch => "Lunch",
        Meal::Dinner => "Dinner",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn admin_help_lists_admin_commands() {
        let cutoff = NaiveTime::from_hms_opt(17, 30, 0).unwrap();
        assert!(!help_text(false, cutoff).contains("/getCounts"));
        let admin = help_text(true, cutoff);
        assert!(admin.contains("/getCounts"));
        assert!(admin.contains("17:30"));
    }

    #[test]
    fn selection_form_ticks_selected_meals() {
        let wed = date(2025, 10, 15);
        let days = [DaySelection {
            date: wed,
            slot: calendar::menu_slot(wed),
            selection: Selection { lunch: true, dinner: false },
            editable: true,
        }];
        let menu = [MenuDay {
            slot: calendar::menu_slot(wed),
            lunch: Some("Kebab".into()),
            dinner: None,
        }];

        let form = selection_form(&days, &menu);
        assert_eq!(form.keyboard.len(), 2);
        let row = &form.keyboard[0];
        assert_eq!(row[0].data, "2025-10-15");
        assert_eq!(row[1].text, "✅ Kebab");
        assert_eq!(row[1].data, "2025-10-15_lunch");
        assert_eq!(row[2].text, "Dinner");
        assert_eq!(form.keyboard[1][2].data, "all");
    }

    #[test]
    fn menu_form_has_one_row_per_slot() {
        let menu: Vec<MenuDay> = (1..=14)
            .map(|slot| MenuDay { slot, ..Default::default() })
            .collect();
        let form = menu_form(&menu);
        assert_eq!(form.keyboard.len(), 14);
        assert_eq!(form.keyboard[0][0].text, "Saturday 1");
        assert_eq!(form.keyboard[7][0].text, "Saturday 2");
        assert_eq!(form.keyboard[13][2].data, "set_dinner_14");
    }

    #[test]
    fn rosters_are_headed_by_local_date() {
        let text = rosters_text(&[Roster {
            date: date(2025, 10, 18),
            lunch: vec!["ana".into()],
            dinner: vec![],
        }]);
        assert!(text.starts_with("1404/7/26\n"));
        assert!(text.contains("lunch: 1\n@ana\n"));
        assert!(text.contains("dinner: 0\n"));
    }
}
