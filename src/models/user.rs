use serde::{Deserialize, Serialize};

/// A user record as served by the remote service.
///
/// `id` is unique within any cached list at all times, including provisional
/// ids assigned locally while a creation is still in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: Company,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
}

/// Form fields for a not-yet-created user, as entered in the add/edit dialog.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: Company,
}

impl UserDraft {
    /// Materialize the draft as a cached row under a locally assigned id.
    pub fn into_provisional(self, id: i64) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
        }
    }
}

impl From<&User> for UserDraft {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            company: user.company.clone(),
        }
    }
}
