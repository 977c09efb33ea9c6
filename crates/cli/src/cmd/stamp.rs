//! Freshness stamps for build products

use crate::settings::Settings;
use crate::StampArgs;
use anyhow::{Context, Result};
use digestkit_cache::{CacheStamp, ProductCheck};
use digestkit_core::{HashOptions, Value};
use owo_colors::OwoColorize;
use std::time::Duration;

fn build(args: &StampArgs, options: &HashOptions, settings: &Settings) -> Result<CacheStamp> {
    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => settings.stamp_dir()?,
    };
    let json: serde_json::Value = serde_json::from_str(&args.depends)
        .context("--depends is not valid JSON")?;
    let check = if args.size_only {
        ProductCheck::Size
    } else {
        ProductCheck::Hash
    };

    let mut stamp = CacheStamp::new(&args.name, dir, Value::from_json(json))
        .hasher(options.hasher)
        .product_check(check);
    for product in &args.products {
        stamp = stamp.product(product);
    }
    if let Some(secs) = args.expires {
        stamp = stamp.expires(Duration::from_secs(secs));
    }
    Ok(stamp)
}

/// Report freshness; returns whether the stamp is fresh
pub fn check(args: &StampArgs, options: &HashOptions, settings: &Settings) -> Result<bool> {
    let stamp = build(args, options, settings)?;
    let status = stamp.expired()?;

    if status.is_fresh() {
        println!("{} {}", "fresh".green(), args.name);
    } else {
        println!("{} {} ({})", "stale".yellow(), args.name, status);
    }
    Ok(status.is_fresh())
}

pub fn renew(args: &StampArgs, options: &HashOptions, settings: &Settings) -> Result<bool> {
    let stamp = build(args, options, settings)?;
    let cert = stamp
        .renew()?
        .context("Stamp is disabled")?;

    println!(
        "{} {} ({} products)",
        "renewed".green(),
        args.name,
        cert.products.len()
    );
    Ok(true)
}

pub fn clear(args: &StampArgs, options: &HashOptions, settings: &Settings) -> Result<bool> {
    let stamp = build(args, options, settings)?;
    stamp.clear()?;
    println!("{} {}", "cleared".green(), args.name);
    Ok(true)
}
