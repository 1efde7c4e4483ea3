//! Human-readable error descriptions and structured JSON error formatting.

use brew_core::error::{BrewError, BrewRejection, BuildError};

fn rejection(err: &eyre::Report) -> Option<BrewRejection> {
    if let Some(r) = err.downcast_ref::<BrewRejection>() {
        return Some(*r);
    }
    match err.downcast_ref::<BrewError>() {
        Some(BrewError::Rejected(r)) => Some(*r),
        _ => None,
    }
}

pub fn rejection_name(r: &BrewRejection) -> &'static str {
    match r {
        BrewRejection::Disabled => "Disabled",
        BrewRejection::AlreadyBrewing => "AlreadyBrewing",
        BrewRejection::Disconnected => "Disconnected",
        BrewRejection::InvalidTarget(_) => "InvalidTarget",
        BrewRejection::NotBrewing => "NotBrewing",
        BrewRejection::AlreadyStopping => "AlreadyStopping",
        BrewRejection::UnknownShot(_) => "UnknownShot",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingScale => {
                "What happened: No scale was provided to the brew controller.\nLikely causes: The scale link failed to initialize or was not wired into the builder.\nHow to fix: Ensure the scale link is created and passed via with_scale(...).".to_string()
            }
            BuildError::MissingMachine => {
                "What happened: No relay was provided to the brew controller.\nLikely causes: The relay output failed to initialize or was not wired into the builder.\nHow to fix: Check [pins] relay and pass the relay via with_relay(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in [brew], [safety] or [compensation].\nHow to fix: Edit the config file, then rerun `brew self-check`."
            ),
        };
    }

    if let Some(r) = rejection(err) {
        return match r {
            BrewRejection::Disabled => "What happened: Auto-brew is disabled.\nLikely causes: brew.enabled = false, or preferences saved with brewing turned off.\nHow to fix: Enable brewing in the preferences, then retry.".to_string(),
            BrewRejection::AlreadyBrewing => "What happened: A brew is already in progress.\nLikely causes: A button or another client started a shot.\nHow to fix: Stop the running shot or wait for it to finish.".to_string(),
            BrewRejection::Disconnected => "What happened: The scale is not connected.\nLikely causes: Scale switched off, out of range, or still connecting.\nHow to fix: Wake the scale, keep it near the controller and retry once it reports connected.".to_string(),
            BrewRejection::InvalidTarget(g) => format!(
                "What happened: Target weight {g} g was refused.\nLikely causes: Target is not positive or exceeds safety.max_target_g.\nHow to fix: Pick a target in range, e.g. `--grams 36`."
            ),
            BrewRejection::NotBrewing => "What happened: There is no brew to stop.\nLikely causes: The shot already finished.\nHow to fix: Nothing to do.".to_string(),
            BrewRejection::AlreadyStopping => "What happened: The brew is already stopping.\nLikely causes: The target was reached and the shot is waiting for drips.\nHow to fix: Wait for the shot to finalize.".to_string(),
            BrewRejection::UnknownShot(id) => format!(
                "What happened: No stored shot has id {id}.\nLikely causes: The shot was deleted, cleared, or aged out of the history.\nHow to fix: List stored shots with `brew shots` and use one of those ids."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BrewError>() {
        if matches!(be, BrewError::Timeout) {
            return "What happened: Hardware did not answer in time.\nLikely causes: Wiring, power, or a busy radio link.\nHow to fix: Check the relay and button wiring and the scale battery.".to_string();
        }
        return format!(
            "What happened: {be}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with the path to a readable TOML file."
        );
    }

    if lower.starts_with("parse config") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: A missing [scale] section, a typo, or an out-of-range value.\nHow to fix: Edit the TOML config and run `brew self-check`."
        );
    }

    if lower.contains("gpio") || lower.contains("pin") {
        return format!(
            "What happened: Failed to initialize hardware pins ({msg}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per rejection reason; everything else exits with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match rejection(err) {
        Some(BrewRejection::Disabled) => 3,
        Some(BrewRejection::Disconnected) => 4,
        Some(BrewRejection::InvalidTarget(_)) => 5,
        Some(BrewRejection::AlreadyBrewing | BrewRejection::AlreadyStopping) => 6,
        Some(BrewRejection::NotBrewing) => 7,
        Some(BrewRejection::UnknownShot(_)) => 8,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    match rejection(err) {
        Some(r @ BrewRejection::InvalidTarget(g)) => {
            json!({ "reason": rejection_name(&r), "details": { "target_g": g }, "message": msg })
        }
        Some(r @ BrewRejection::UnknownShot(id)) => {
            json!({ "reason": rejection_name(&r), "details": { "id": id }, "message": msg })
        }
        Some(r) => json!({ "reason": rejection_name(&r), "message": msg }),
        None => json!({ "reason": "Error", "message": msg }),
    }
    .to_string()
}
