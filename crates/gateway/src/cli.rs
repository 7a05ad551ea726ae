//! CLI surface: `serve` plus an admin wrapper speaking to a running
//! gateway over HTTP.
//!
//! Exit codes: 0 success, 2 validation, 3 auth, 4 not-found,
//! 5 conflict, 1 internal.

use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use candor_domain::config::Config;

pub mod doctor;

#[derive(Parser)]
#[command(name = "candor", about = "AI interview runtime", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Gateway base URL for admin commands.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8740")]
    pub gateway: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Check config, storage, media tooling, and provider credentials.
    Doctor,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Slot administration.
    #[command(subcommand)]
    Slot(SlotCommand),
    /// Booking administration.
    #[command(subcommand)]
    Booking(BookingCommand),
    /// Interview administration.
    #[command(subcommand)]
    Interview(InterviewCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration and report issues.
    Validate,
    /// Print the effective configuration.
    Show,
}

#[derive(Subcommand)]
pub enum SlotCommand {
    /// Create one slot.
    Create {
        #[arg(long)]
        company: String,
        #[arg(long)]
        job: String,
        /// Slot date, `YYYY-MM-DD` (IST).
        #[arg(long)]
        date: String,
        /// Start time-of-day, `HH:MM` (IST).
        #[arg(long)]
        start: String,
        /// End time-of-day, `HH:MM` (IST); defaults to start + slot duration.
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value_t = 1)]
        capacity: u32,
        /// technical | behavioral | coding | system_design | general
        #[arg(long, default_value = "technical")]
        ai_type: String,
        #[arg(long, default_value = "medium")]
        difficulty: String,
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// List available slots.
    List {
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        ai_type: Option<String>,
    },
    /// Book a slot for an interview.
    Book {
        slot_id: Uuid,
        #[arg(long)]
        interview_id: Uuid,
        #[arg(long, default_value = "")]
        notes: String,
    },
}

#[derive(Subcommand)]
pub enum BookingCommand {
    /// Cancel a booking (releases the seat).
    Cancel { booking_id: Uuid },
}

#[derive(Subcommand)]
pub enum InterviewCommand {
    /// Issue the candidate access token/URL.
    Token { interview_id: Uuid },
    /// Fetch the final evaluation.
    Evaluation { interview_id: Uuid },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Load `candor.toml` (path from `CANDOR_CONFIG`, default `./candor.toml`;
/// a missing file yields defaults) and apply env overrides.
pub fn load_config() -> anyhow::Result<Config> {
    let path =
        std::env::var("CANDOR_CONFIG").unwrap_or_else(|_| "candor.toml".to_string());
    let mut config: Config = match std::fs::read_to_string(&path) {
        Ok(raw) => toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))?,
        Err(_) => Config::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin HTTP client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map an HTTP status onto the CLI exit-code contract.
pub fn exit_code_for_status(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400 => 2,
        401 | 403 => 3,
        404 => 4,
        409 => 5,
        _ => 1,
    }
}

struct AdminClient {
    base: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl AdminClient {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            token: std::env::var("CANDOR_ADMIN_TOKEN").ok(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Perform the request, print the JSON body, return the exit code.
    async fn call(&self, req: reqwest::RequestBuilder) -> i32 {
        match self.authed(req).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                match serde_json::from_str::<Value>(&body) {
                    Ok(json) => println!(
                        "{}",
                        serde_json::to_string_pretty(&json).unwrap_or(body)
                    ),
                    Err(_) => println!("{body}"),
                }
                exit_code_for_status(status)
            }
            Err(e) => {
                eprintln!("request failed: {e}");
                1
            }
        }
    }
}

/// Execute an admin command; returns the process exit code.
pub async fn run_admin(gateway: &str, command: Command) -> i32 {
    let admin = AdminClient::new(gateway);
    match command {
        Command::Slot(SlotCommand::Create {
            company,
            job,
            date,
            start,
            end,
            capacity,
            ai_type,
            difficulty,
            language,
        }) => {
            let mut body = serde_json::json!({
                "company": company,
                "job": job,
                "date": date,
                "start": format!("{start}:00"),
                "capacity": capacity,
                "ai_type": ai_type,
                "difficulty": difficulty,
                "language": language,
            });
            if let Some(end) = end {
                body["end"] = Value::String(format!("{end}:00"));
            }
            admin
                .call(admin.client.post(format!("{}/slots", admin.base)).json(&body))
                .await
        }
        Command::Slot(SlotCommand::List { company, ai_type }) => {
            let mut url = format!("{}/slots?", admin.base);
            if let Some(c) = company {
                url.push_str(&format!("company={c}&"));
            }
            if let Some(t) = ai_type {
                url.push_str(&format!("ai_type={t}&"));
            }
            admin.call(admin.client.get(url)).await
        }
        Command::Slot(SlotCommand::Book {
            slot_id,
            interview_id,
            notes,
        }) => {
            admin
                .call(
                    admin
                        .client
                        .post(format!("{}/slots/{slot_id}/book", admin.base))
                        .json(&serde_json::json!({
                            "interview_id": interview_id,
                            "notes": notes,
                        })),
                )
                .await
        }
        Command::Booking(BookingCommand::Cancel { booking_id }) => {
            admin
                .call(
                    admin
                        .client
                        .post(format!("{}/bookings/{booking_id}/cancel", admin.base)),
                )
                .await
        }
        Command::Interview(InterviewCommand::Token { interview_id }) => {
            admin
                .call(
                    admin
                        .client
                        .post(format!("{}/interviews/{interview_id}/access-token", admin.base)),
                )
                .await
        }
        Command::Interview(InterviewCommand::Evaluation { interview_id }) => {
            admin
                .call(
                    admin
                        .client
                        .get(format!("{}/interviews/{interview_id}/evaluation", admin.base)),
                )
                .await
        }
        _ => {
            eprintln!("not an admin command");
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(exit_code_for_status(200), 0);
        assert_eq!(exit_code_for_status(201), 0);
        assert_eq!(exit_code_for_status(400), 2);
        assert_eq!(exit_code_for_status(401), 3);
        assert_eq!(exit_code_for_status(403), 3);
        assert_eq!(exit_code_for_status(404), 4);
        assert_eq!(exit_code_for_status(409), 5);
        assert_eq!(exit_code_for_status(500), 1);
        assert_eq!(exit_code_for_status(503), 1);
    }
}
