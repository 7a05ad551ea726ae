//! `candor doctor` — environment checks before first serve.

use candor_domain::config::{Config, ConfigSeverity};

/// Run all checks; returns true when nothing failed.
pub async fn run(config: &Config) -> bool {
    let mut ok = true;

    // ── Config ────────────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => println!("warn  config: {issue}"),
            ConfigSeverity::Error => {
                ok = false;
                println!("FAIL  config: {issue}");
            }
        }
    }
    if issues.is_empty() {
        println!("ok    config");
    }

    // ── Storage root writable ─────────────────────────────────────
    let probe = config.storage.root.join(".doctor-probe");
    match std::fs::create_dir_all(&config.storage.root)
        .and_then(|_| std::fs::write(&probe, b"probe"))
    {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            println!("ok    storage root writable ({})", config.storage.root.display());
        }
        Err(e) => {
            ok = false;
            println!("FAIL  storage root not writable: {e}");
        }
    }

    // ── Media tooling ─────────────────────────────────────────────
    for bin in [&config.recording.ffmpeg_bin, &config.recording.ffprobe_bin] {
        match tokio::process::Command::new(bin)
            .arg("-version")
            .output()
            .await
        {
            Ok(out) if out.status.success() => println!("ok    {bin} available"),
            _ => {
                ok = false;
                println!("FAIL  {bin} not available — recording mux will fail");
            }
        }
    }

    // ── Provider credentials ──────────────────────────────────────
    for (name, env_var) in [
        ("llm", &config.llm.api_key_env),
        ("stt", &config.stt.api_key_env),
        ("tts", &config.tts.api_key_env),
    ] {
        if std::env::var(env_var).map(|v| !v.is_empty()).unwrap_or(false) {
            println!("ok    {name} credential present ({env_var})");
        } else {
            ok = false;
            println!("FAIL  {name} credential missing ({env_var})");
        }
    }

    // ── Signing keys ──────────────────────────────────────────────
    if config.access.hmac_keys.is_empty() {
        ok = false;
        println!("FAIL  no HMAC signing key (HMAC_SECRET)");
    } else {
        println!("ok    {} signing key(s) loaded", config.access.hmac_keys.len());
    }

    if ok {
        println!("\nall checks passed");
    }
    ok
}
