use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tickview_core::{FilePreferenceStore, FollowMarketSetting, PreferenceStore};

use crate::cli::{FollowArgs, Toggle};
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Debug, Serialize)]
struct FollowOutput {
    follow_market: bool,
    path: String,
}

pub fn run(args: &FollowArgs, context: &Context) -> Result<(), CliError> {
    let current = apply(&context.config.preferences_path, args.state)?;
    output::render(&current, context.pretty)
}

/// Writes `state` to the preference file at `path` when given, then reports the stored value.
fn apply(path: &Path, state: Option<Toggle>) -> Result<FollowOutput, CliError> {
    let store: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(path));
    let mut setting = FollowMarketSetting::load(store)?;
    if let Some(state) = state {
        setting.set(state == Toggle::On)?;
    }
    Ok(FollowOutput {
        follow_market: setting.enabled(),
        path: path.display().to_string(),
    })
}
