//! Commands that work on the saved settings without brewing.

use brew_config::Config;
use brew_core::{BrewError, BrewPreferences, Profile, SettingsStore, ShotHistory};
use serde_json::json;

use crate::assemble;
use crate::cli::json_mode;

fn profile_arg(p: Option<u8>) -> Vec<Profile> {
    match p.and_then(|i| Profile::from_index(usize::from(i))) {
        Some(p) => vec![p],
        None => Profile::ALL.to_vec(),
    }
}

fn print_history(profile: Profile, compensation: f32, shots: &ShotHistory) {
    if json_mode() {
        println!(
            "{}",
            json!({ "profile": profile, "compensation": compensation, "shots": shots })
        );
        return;
    }
    println!(
        "{profile:?}: compensation {compensation:.3}, {} stored shots",
        shots.len()
    );
    for s in shots.as_slice() {
        println!(
            "  #{:<4} target {:>5.1} g  final {:>5.1} g  stop {:>5.1} g  drip {:>4.1} g  flow {:>4.2} g/s",
            s.id,
            s.target_weight_g,
            s.final_weight_g,
            s.stop_weight_g,
            s.drip_g(),
            s.last_flow_gps
        );
    }
}

fn print_states<P: brew_core::ScalePort>(ctrl: &brew_core::BrewController<P>, what: &str) {
    let [split, full] = ctrl.compensation().states();
    if json_mode() {
        println!("{}", json!({ "done": what, "compensation": { "split": split, "full": full } }));
    } else {
        println!("{what}: split {split:.3}, full {full:.3}");
    }
}

pub fn shots(cfg: &Config, profile: Option<u8>) -> eyre::Result<()> {
    let store = assemble::file_store(cfg);
    let Some(saved) = store.load()? else {
        if json_mode() {
            println!("{}", json!({ "shots": [] }));
        } else {
            println!("no saved shots in {}", store.path().display());
        }
        return Ok(());
    };
    for p in profile_arg(profile) {
        let shots = match p {
            Profile::Split => &saved.split_shots,
            Profile::Full => &saved.full_shots,
        };
        print_history(p, saved.compensation[p.index()], shots);
    }
    Ok(())
}

pub fn recompute(cfg: &Config) -> eyre::Result<()> {
    let mut ctrl = assemble::offline(cfg)?;
    ctrl.recalculate();
    print_states(&ctrl, "recomputed");
    Ok(())
}

pub fn clear(cfg: &Config) -> eyre::Result<()> {
    let mut ctrl = assemble::offline(cfg)?;
    ctrl.clear_shot_data();
    print_states(&ctrl, "cleared");
    Ok(())
}

pub fn delete(cfg: &Config, id: u32) -> eyre::Result<()> {
    let mut ctrl = assemble::offline(cfg)?;
    let profile = ctrl.delete_shot(id).map_err(BrewError::from)?;
    tracing::debug!(id, profile = ?profile, "deleted");
    print_states(&ctrl, &format!("deleted shot {id}"));
    Ok(())
}

fn print_prefs(p: &BrewPreferences) -> eyre::Result<()> {
    if json_mode() {
        println!("{}", serde_json::to_string(p)?);
        return Ok(());
    }
    println!("enabled            {}", p.enabled);
    println!("regular_preset_g   {:.1}", p.regular_preset_g);
    println!("decaf_preset_g     {:.1}", p.decaf_preset_g);
    println!("preinfusion_mode   {:?}", p.preinfusion_mode);
    println!("learning_rate      {:.2}", p.learning_rate);
    println!("history_length     {}", p.history_length);
    println!("system_lag_s       {:.2}", p.system_lag_s);
    println!("drip_settle_ms     {}", p.drip_settle_ms);
    match p.decaf_start_hour {
        Some(h) => println!("decaf_start_hour   {h}"),
        None => println!("decaf_start_hour   off"),
    }
    println!("timezone           {}", p.timezone);
    Ok(())
}

/// Saved preferences if any, else the config defaults.
pub fn prefs(cfg: &Config) -> eyre::Result<()> {
    let ctrl = assemble::offline(cfg)?;
    print_prefs(ctrl.prefs())
}

/// Config already loaded and validated by the time this runs; also open the
/// configured outputs so wiring mistakes show up before a brew.
pub fn self_check(cfg: &Config) -> eyre::Result<()> {
    let ctrl = assemble::offline(cfg)?;
    let backend = if cfg!(feature = "hardware") && cfg.pins.relay.is_some() {
        "gpio"
    } else {
        "sim"
    };
    let store = assemble::file_store(cfg);
    let saved = store.load()?.is_some();
    if json_mode() {
        println!(
            "{}",
            json!({
                "ok": true,
                "backend": backend,
                "store": store.path().display().to_string(),
                "saved_state": saved,
                "target_g": ctrl.base_target(),
            })
        );
    } else {
        println!(
            "ok: config valid, relay backend {backend}, store {} ({}), preset {:.1} g",
            store.path().display(),
            if saved { "saved state" } else { "no saved state" },
            ctrl.base_target()
        );
    }
    Ok(())
}
