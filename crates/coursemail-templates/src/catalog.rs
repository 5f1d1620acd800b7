//! Template catalog — built-in texts per kind, with stored overrides.
//!
//! Lookup order for (profile, kind, week):
//! 1. stored override `<kind>_week_<n>`
//! 2. stored override `<kind>`
//! 3. built-in text

use coursemail_core::error::Result;
use coursemail_core::{Category, Template};
use serde::{Deserialize, Serialize};

/// Which message a template is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Broadcast at course start; no classification.
    Welcome,
    /// Progress reached the threshold.
    Congratulations,
    /// Some activities pending.
    PendingWork,
    /// Nothing submitted yet.
    NoActivity,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Welcome,
        TemplateKind::Congratulations,
        TemplateKind::PendingWork,
        TemplateKind::NoActivity,
    ];

    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Complete => TemplateKind::Congratulations,
            Category::Partial => TemplateKind::PendingWork,
            Category::None => TemplateKind::NoActivity,
        }
    }

    /// Storage key.
    pub fn key(&self) -> &'static str {
        match self {
            TemplateKind::Welcome => "welcome",
            TemplateKind::Congratulations => "congratulations",
            TemplateKind::PendingWork => "pending_work",
            TemplateKind::NoActivity => "no_activity",
        }
    }

    /// Storage key of the week-specific variant.
    pub fn week_key(&self, week: u32) -> String {
        format!("{}_week_{week}", self.key())
    }

    pub fn builtin(&self) -> Template {
        match self {
            TemplateKind::Welcome => Template::new(
                "Welcome to the module",
                "Welcome to {module}",
                WELCOME_BODY,
            ),
            TemplateKind::Congratulations => Template::new(
                "Congratulations on your progress",
                "Great work in {module} - week {week}",
                CONGRATULATIONS_BODY,
            ),
            TemplateKind::PendingWork => Template::new(
                "Follow-up: pending activities",
                "Progress follow-up for {module} - week {week}",
                PENDING_WORK_BODY,
            ),
            TemplateKind::NoActivity => Template::new(
                "Follow-up: no activity yet",
                "Checking in about {module} - week {week}",
                NO_ACTIVITY_BODY,
            ),
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|k| k.key() == s.trim())
            .ok_or_else(|| {
                format!("unknown template kind '{s}' (welcome|congratulations|pending_work|no_activity)")
            })
    }
}

const WELCOME_BODY: &str = "Hello {name},

I will be your tutor for {module}. Welcome to the course!

As a first goal, try to hand in the first three activities before {goal_date}. If the topics come easily you are free to move at your own pace.

Our first live session is on {session_date} at {session_time}; the link is in the virtual classroom.

Please reply to confirm you received this message.

{sender_name}";

const CONGRATULATIONS_BODY: &str = "Hello {name},

Congratulations on your work this week in {module}. You are right on track.

Completed activities:
{completed_activities}

Keep it up, and remember to check the announcements board.

{sender_name}";

const PENDING_WORK_BODY: &str = "Hello {name},

We are starting week {week} of {module}. I noticed some activities are still pending:

{missing_activities}

If something is getting in the way, just reply to this message and we will work it out together. If you prefer your own pace, feel free to ignore this reminder.

{sender_name}";

const NO_ACTIVITY_BODY: &str = "Hello {name},

We are starting week {week} of {module} and I have not seen any submissions from you yet. There is still plenty of time to catch up.

Could you let me know if anything is preventing you from getting started? I am happy to help.

{sender_name}";

/// Source of operator-edited templates.
pub trait TemplateOverrides {
    fn get_override(&self, profile: &str, key: &str) -> Result<Option<Template>>;
}

/// No overrides; always the built-ins.
impl TemplateOverrides for () {
    fn get_override(&self, _profile: &str, _key: &str) -> Result<Option<Template>> {
        Ok(None)
    }
}

/// Resolves the template to use for a profile, kind, and week.
pub struct TemplateCatalog<'a, O: TemplateOverrides + ?Sized> {
    overrides: &'a O,
    profile: String,
}

impl<'a, O: TemplateOverrides + ?Sized> TemplateCatalog<'a, O> {
    pub fn new(overrides: &'a O, profile: &str) -> Self {
        Self {
            overrides,
            profile: profile.to_string(),
        }
    }

    pub fn resolve(&self, kind: TemplateKind, week: Option<u32>) -> Result<Template> {
        if let Some(week) = week
            && let Some(t) = self.overrides.get_override(&self.profile, &kind.week_key(week))?
        {
            tracing::debug!("Using week {week} override for {}/{kind}", self.profile);
            return Ok(t);
        }
        if let Some(t) = self.overrides.get_override(&self.profile, kind.key())? {
            tracing::debug!("Using stored override for {}/{kind}", self.profile);
            return Ok(t);
        }
        Ok(kind.builtin())
    }

    pub fn for_category(&self, category: Category, week: Option<u32>) -> Result<Template> {
        self.resolve(TemplateKind::for_category(category), week)
    }
}
