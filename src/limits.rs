/// Days shown on the selection form and covered by bulk selection, today included.
pub const WINDOW_DAYS: u32 = 14;

/// Menu slots; the menu repeats every two weeks.
pub const MENU_SLOTS: u8 = 14;

pub const MAX_MEAL_NAME_LEN: usize = 50;

/// Longest accepted gateway line, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

pub const MAX_USERNAME_LEN: usize = 64;
