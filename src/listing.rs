//! Pure derivation of the visible user list from cached data plus transient
//! filter state. No side effects; same inputs always yield the same output.

use std::collections::BTreeSet;

use crate::models::User;
use crate::utils::{cmp_ignore_case, contains_ignore_case};

/// Transient filter state as entered in the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub search_text: String,
    pub company: Option<String>,
    pub sort_ascending: bool,
}

impl ListFilter {
    pub fn new() -> Self {
        Self {
            search_text: String::new(),
            company: None,
            sort_ascending: true,
        }
    }
}

impl Default for ListFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply search, company filter, and email ordering to `data`.
///
/// Search is a case-insensitive substring match on `name` (empty keeps all);
/// the company filter is an exact match on `company.name`; rows are ordered
/// by `email`, ascending or descending per the filter. Ordering compares
/// lowercased Unicode codepoints, not locale-collated strings; for ASCII
/// emails the two agree.
pub fn derive(data: &[User], filter: &ListFilter) -> Vec<User> {
    let mut rows: Vec<&User> = data
        .iter()
        .filter(|u| contains_ignore_case(&u.name, &filter.search_text))
        .filter(|u| match &filter.company {
            Some(company) => &u.company.name == company,
            None => true,
        })
        .collect();

    rows.sort_by(|a, b| {
        let cmp = cmp_ignore_case(&a.email, &b.email);
        if filter.sort_ascending {
            cmp
        } else {
            cmp.reverse()
        }
    });

    rows.into_iter().cloned().collect()
}

/// Distinct company names across the *unfiltered* data set, for populating
/// the filter choices. Sorted for stable display.
pub fn company_choices(data: &[User]) -> Vec<String> {
    let set: BTreeSet<&str> = data.iter().map(|u| u.company.name.as_str()).collect();
    set.into_iter().map(str::to_string).collect()
}
