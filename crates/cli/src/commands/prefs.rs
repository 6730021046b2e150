// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use kn_sync::SyncContext;

use crate::error::{Error, Result};

/// Prints one preference, or every preference as `key = value`.
pub fn get(ctx: &SyncContext, key: Option<&str>) -> Result<()> {
    let store = ctx.store();
    match key {
        Some(key) => {
            let value = store
                .get_preference(key)?
                .ok_or_else(|| Error::PreferenceNotFound(key.to_string()))?;
            println!("{value}");
        }
        None => {
            for (key, value) in store.list_preferences()? {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

pub fn set(ctx: &SyncContext, key: &str, value: &str) -> Result<()> {
    ctx.store().set_preference(key, &parse_value(value))?;
    Ok(())
}

pub fn unset(ctx: &SyncContext, key: &str) -> Result<()> {
    if !ctx.store().delete_preference(key)? {
        return Err(Error::PreferenceNotFound(key.to_string()));
    }
    Ok(())
}

/// JSON when it parses, otherwise the raw string.
pub(crate) fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
#[path = "prefs_tests.rs"]
mod tests;
