use std::collections::HashSet;

/// Usernames allowed to run admin commands and edit the menu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminList {
    usernames: HashSet<String>,
}

impl AdminList {
    pub fn new<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            usernames: usernames.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a JSON array of usernames, e.g. `["ana","bo"]`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let names: Vec<String> = serde_json::from_str(raw)?;
        Ok(Self::new(names))
    }

    /// An empty username is never an admin.
    pub fn is_admin(&self, username: &str) -> bool {
        !username.is_empty() && self.usernames.contains(username)
    }

    pub fn len(&self) -> usize {
        self.usernames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usernames.is_empty()
    }
}
