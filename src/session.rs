//! Transient edit-session state shared between the list view and the form.

use crate::models::{User, UserDraft};

/// Which record, if any, the add/edit dialog is working on.
///
/// Created when the user opens the dialog, cleared on submit or cancel.
/// A session with no target is a create; a session with a target prefills
/// the form from that record.
#[derive(Debug, Clone, Default)]
pub struct EditSession {
    target: Option<User>,
    is_open: bool,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn target(&self) -> Option<&User> {
        self.target.as_ref()
    }

    /// Open the dialog for a new record.
    pub fn open_create(&mut self) {
        self.target = None;
        self.is_open = true;
    }

    /// Open the dialog prefilled from an existing record.
    pub fn open_edit(&mut self, user: User) {
        self.target = Some(user);
        self.is_open = true;
    }

    pub fn close(&mut self) {
        self.target = None;
        self.is_open = false;
    }

    /// Initial form contents for the current session.
    pub fn draft(&self) -> UserDraft {
        match &self.target {
            Some(user) => UserDraft::from(user),
            None => UserDraft::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Company;

    fn existing() -> User {
        User {
            id: 4,
            name: "Dora".to_string(),
            email: "dora@delta.io".to_string(),
            phone: "555-0104".to_string(),
            company: Company {
                name: "Delta".to_string(),
            },
        }
    }

    #[test]
    fn test_create_session_has_empty_draft() {
        let mut session = EditSession::new();
        assert!(!session.is_open());

        session.open_create();
        assert!(session.is_open());
        assert!(session.target().is_none());
        assert_eq!(session.draft(), UserDraft::default());
    }

    #[test]
    fn test_edit_session_prefills_draft() {
        let mut session = EditSession::new();
        session.open_edit(existing());

        assert!(session.is_open());
        let draft = session.draft();
        assert_eq!(draft.name, "Dora");
        assert_eq!(draft.company.name, "Delta");
    }

    #[test]
    fn test_close_clears_target() {
        let mut session = EditSession::new();
        session.open_edit(existing());
        session.close();

        assert!(!session.is_open());
        assert!(session.target().is_none());
    }
}
