//! View models behind the dashboard and editor pages.

pub mod dashboard;
pub mod editor;

#[cfg(test)]
pub(crate) mod testing;

pub use dashboard::{delete_config, Confirmation, Dashboard, DashboardEntry, DeleteOutcome};
pub use editor::{
    parse_topics, EditorFields, EditorForm, EditorMode, FeatureRow, FEATURES, LENGTHS, TONES,
};
