//! Hash a JSON document

use crate::util;
use anyhow::{Context, Result};
use digestkit_core::{hash_data, HashOptions, Value};
use std::path::Path;
use tracing::info;

pub fn run(file: Option<&Path>, options: &HashOptions) -> Result<()> {
    let text = util::read_input(file)?;
    let json: serde_json::Value =
        serde_json::from_str(&text).context("Input is not valid JSON")?;

    let value = Value::from_json(json);
    let digest = hash_data(&value, options).context("Failed to hash input")?;
    info!(hasher = %options.hasher, base = %options.base, "hashed document");

    println!("{}", digest);
    Ok(())
}
