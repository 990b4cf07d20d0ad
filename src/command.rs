use chrono::NaiveDate;

use crate::limits::MENU_SLOTS;
use crate::model::{BulkSelection, Meal};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A slash command typed into the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCommand {
    Start,
    Help,
    Select,
    Setting,
    SetList,
    GetCounts,
    GetReserves,
}

impl TextCommand {
    /// `None` for free text and for slash commands nobody handles.
    ///
    /// Only the first word counts; a `@botname` suffix is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split_once('@').map_or(name, |(n, _)| n);
        match name {
            "start" => Some(TextCommand::Start),
            "help" => Some(TextCommand::Help),
            "select" => Some(TextCommand::Select),
            "setting" => Some(TextCommand::Setting),
            "setList" => Some(TextCommand::SetList),
            "getCounts" => Some(TextCommand::GetCounts),
            "getReserves" => Some(TextCommand::GetReserves),
            _ => None,
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            TextCommand::SetList | TextCommand::GetCounts | TextCommand::GetReserves
        )
    }
}

/// Decoded button data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// `all`, `all_lunch`, `all_dinner`.
    Bulk(BulkSelection),
    /// `YYYY-MM-DD_lunch`, `YYYY-MM-DD_dinner`.
    Toggle { date: NaiveDate, meal: Meal },
    /// `setting_always_lunch`, `setting_always_dinner`.
    Standing(Meal),
    /// `set_lunch_N`, `set_dinner_N`.
    EditMenu { slot: u8, meal: Meal },
    /// A row header carrying its date; pressing it does nothing.
    DayLabel(NaiveDate),
    /// `d`, a menu row header.
    Noop,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Result<Self, CommandError> {
        match data {
            "all" => return Ok(CallbackAction::Bulk(BulkSelection::Both)),
            "all_lunch" => return Ok(CallbackAction::Bulk(BulkSelection::Lunch)),
            "all_dinner" => return Ok(CallbackAction::Bulk(BulkSelection::Dinner)),
            "setting_always_lunch" => return Ok(CallbackAction::Standing(Meal::Lunch)),
            "setting_always_dinner" => return Ok(CallbackAction::Standing(Meal::Dinner)),
            "d" => return Ok(CallbackAction::Noop),
            _ => {}
        }

        if let Some(rest) = data.strip_prefix("set_") {
            let (meal, slot) = rest
                .split_once('_')
                .ok_or_else(|| CommandError::Unrecognized(data.to_string()))?;
            let meal = parse_meal(meal).ok_or_else(|| CommandError::Unrecognized(data.to_string()))?;
            let slot: u8 = slot
                .parse()
                .map_err(|_| CommandError::BadSlot(slot.to_string()))?;
            if !(1..=MENU_SLOTS).contains(&slot) {
                return Err(CommandError::BadSlot(slot.to_string()));
            }
            return Ok(CallbackAction::EditMenu { slot, meal });
        }

        match data.split_once('_') {
            Some((date, meal)) => {
                let meal = parse_meal(meal).ok_or_else(|| CommandError::Unrecognized(data.to_string()))?;
                Ok(CallbackAction::Toggle {
                    date: parse_date(date)?,
                    meal,
                })
            }
            None => Ok(CallbackAction::DayLabel(parse_date(data)?)),
        }
    }

    /// Button data that `parse` maps back to `self`.
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Bulk(BulkSelection::Both) => "all".into(),
            CallbackAction::Bulk(BulkSelection::Lunch) => "all_lunch".into(),
            CallbackAction::Bulk(BulkSelection::Dinner) => "all_dinner".into(),
            CallbackAction::Toggle { date, meal } => {
                format!("{}_{}", date.format(DATE_FORMAT), meal.as_str())
            }
            CallbackAction::Standing(meal) => format!("setting_always_{}", meal.as_str()),
            CallbackAction::EditMenu { slot, meal } => format!("set_{}_{slot}", meal.as_str()),
            CallbackAction::DayLabel(date) => date.format(DATE_FORMAT).to_string(),
            CallbackAction::Noop => "d".into(),
        }
    }
}

fn parse_meal(s: &str) -> Option<Meal> {
    match s {
        "lunch" => Some(Meal::Lunch),
        "dinner" => Some(Meal::Dinner),
        _ => None,
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| CommandError::BadDate(s.to_string()))
}

#[derive(Debug, PartialEq)]
pub enum CommandError {
    Unrecognized(String),
    BadDate(String),
    BadSlot(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Unrecognized(data) => write!(f, "unrecognized button data: {data:?}"),
            CommandError::BadDate(s) => write!(f, "invalid date in button data: {s:?}"),
            CommandError::BadSlot(s) => write!(f, "menu slot must be 1-{MENU_SLOTS}, got {s:?}"),
        }
    }
}

impl std::error::Error for CommandError {}
