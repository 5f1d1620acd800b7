//! Column layout derived from a [`CourseProfile`].

use coursemail_core::config::CourseProfile;

/// Resolved view of a profile: required columns and activity display names.
#[derive(Debug, Clone)]
pub struct ProfileLayout {
    pub profile: CourseProfile,
    activity_names: Vec<String>,
}

impl ProfileLayout {
    pub fn new(profile: CourseProfile) -> Self {
        let activity_names = if profile.activity_names.len() == profile.activity_columns.len() {
            profile.activity_names.clone()
        } else {
            if !profile.activity_names.is_empty() {
                tracing::warn!(
                    "Profile '{}' has {} activity names for {} columns; deriving names from headers",
                    profile.id,
                    profile.activity_names.len(),
                    profile.activity_columns.len()
                );
            }
            profile
                .activity_columns
                .iter()
                .map(|c| activity_display_name(c))
                .collect()
        };
        Self {
            profile,
            activity_names,
        }
    }

    pub fn last_name_column(&self) -> Option<&str> {
        self.profile
            .last_name_column
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Columns that must exist in the export before anything is sent.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.profile.first_name_column.as_str()];
        cols.extend(self.last_name_column());
        cols.extend(self.profile.address_columns.iter().map(String::as_str));
        cols
    }

    /// (column header, display name) pairs in course order.
    pub fn activities(&self) -> impl Iterator<Item = (&str, &str)> {
        self.profile
            .activity_columns
            .iter()
            .map(String::as_str)
            .zip(self.activity_names.iter().map(String::as_str))
    }

    pub fn activity_count(&self) -> usize {
        self.profile.activity_columns.len()
    }
}

/// Derive a display name from a gradebook header such as
/// `Quiz:R1. Number systems (Real)` → `R1. Number systems`.
pub fn activity_display_name(header: &str) -> String {
    let mut name = header.trim();
    if let Some((prefix, rest)) = name.split_once(':')
        && !prefix.contains(' ')
    {
        name = rest.trim();
    }
    if let Some(stripped) = name.strip_suffix("(Real)") {
        name = stripped.trim_end();
    }
    name.to_string()
}
