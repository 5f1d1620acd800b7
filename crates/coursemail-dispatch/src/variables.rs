//! Per-recipient template variables.
//!
//! Layering, later wins: raw spreadsheet cells, shared run variables,
//! recipient-derived values.

use coursemail_core::{Category, Recipient};
use coursemail_templates::Variables;

use crate::dispatch::RunMode;

/// `1. A\n2. B`, or an empty string for no items.
pub fn numbered_list(items: &[&str]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the variable mapping for one recipient and return its category
/// (`None` in broadcast mode).
pub fn recipient_variables(
    recipient: &Recipient,
    mode: &RunMode,
    shared: &Variables,
) -> (Option<Category>, Variables) {
    let mut vars: Variables = recipient.attributes.clone();
    vars.extend(shared.iter().map(|(k, v)| (k.clone(), v.clone())));

    let progress = recipient.progress_count();
    vars.insert("name".into(), recipient.first_name.trim().to_string());
    vars.insert("full_name".into(), recipient.full_name());
    vars.insert("progress".into(), progress.to_string());
    vars.insert(
        "completed_activities".into(),
        numbered_list(&recipient.completed_activities()),
    );

    let category = match *mode {
        RunMode::Classified {
            required_count,
            list_all_missing,
        } => {
            let category = coursemail_roster::classify(progress, required_count);
            let window = if list_all_missing {
                recipient.activities.len()
            } else {
                required_count as usize
            };
            vars.insert("required".into(), required_count.to_string());
            vars.insert("category".into(), category.to_string());
            vars.insert(
                "missing_activities".into(),
                numbered_list(&recipient.missing_activities(window)),
            );
            Some(category)
        }
        RunMode::Broadcast => {
            vars.insert(
                "missing_activities".into(),
                numbered_list(&recipient.missing_activities(recipient.activities.len())),
            );
            None
        }
    };

    (category, vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursemail_core::ActivityMark;
    use std::collections::BTreeMap;

    fn recipient() -> Recipient {
        let marks = [("R1", true), ("R2", false), ("R3", false), ("R4", false)];
        Recipient {
            row: 1,
            first_name: "Bo".into(),
            last_name: Some("Li".into()),
            addresses: vec!["bo@school.edu".into()],
            rejected_addresses: vec![],
            attributes: BTreeMap::from([
                ("First name".to_string(), "Bo".to_string()),
                ("name".to_string(), "raw cell".to_string()),
                ("Group".to_string(), "B2".to_string()),
            ]),
            activities: marks
                .iter()
                .map(|(n, c)| ActivityMark {
                    name: n.to_string(),
                    completed: *c,
                })
                .collect(),
        }
    }

    #[test]
    fn test_numbered_list() {
        assert_eq!(numbered_list(&[]), "");
        assert_eq!(numbered_list(&["R2", "R3"]), "1. R2\n2. R3");
    }

    #[test]
    fn test_classified_variables() {
        let mode = RunMode::Classified {
            required_count: 3,
            list_all_missing: false,
        };
        let shared = Variables::from([
            ("module".to_string(), "Logic".to_string()),
            ("name".to_string(), "shared".to_string()),
            ("Group".to_string(), "override".to_string()),
        ]);
        let (category, vars) = recipient_variables(&recipient(), &mode, &shared);

        assert_eq!(category, Some(Category::Partial));
        assert_eq!(vars["name"], "Bo");
        assert_eq!(vars["full_name"], "Bo Li");
        assert_eq!(vars["module"], "Logic");
        assert_eq!(vars["Group"], "override");
        assert_eq!(vars["progress"], "1");
        assert_eq!(vars["required"], "3");
        assert_eq!(vars["category"], "partial");
        assert_eq!(vars["completed_activities"], "1. R1");
        assert_eq!(vars["missing_activities"], "1. R2\n2. R3");
    }

    #[test]
    fn test_list_all_missing_widens_window() {
        let mode = RunMode::Classified {
            required_count: 2,
            list_all_missing: true,
        };
        let (_, vars) = recipient_variables(&recipient(), &mode, &Variables::new());
        assert_eq!(vars["missing_activities"], "1. R2\n2. R3\n3. R4");
    }

    #[test]
    fn test_broadcast_has_no_category() {
        let (category, vars) =
            recipient_variables(&recipient(), &RunMode::Broadcast, &Variables::new());
        assert_eq!(category, None);
        assert!(!vars.contains_key("category"));
        assert_eq!(vars["First name"], "Bo");
    }
}
