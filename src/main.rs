use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use learnova::{
    auth::{UserId, issue_token},
    config::Config,
    proctor::{ProctorFeed, integrity::simulate_report},
    server,
    settings::{FileStore, PresentationState, SettingsStore, ThemeMode},
    store::ProctorSession,
    survey::{Advance, SurveyFlow},
    utils::{LogOutput, init_log, now_utc},
};
use rand::rng;
use time::format_description::well_known::Rfc3339;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::info;
use uuid::Uuid;

const DEFAULT_STORE: &str = ".learnova/local_storage.json";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the lesson, practice and recommendation functions over HTTP
    Serve {
        #[arg(short, long, default_value = "learnova.toml")]
        config: PathBuf,
    },
    /// Mint a bearer token signed with the configured JWT secret
    Token {
        #[arg(short, long, default_value = "learnova.toml")]
        config: PathBuf,
        /// Random when omitted
        #[arg(short, long)]
        user: Option<Uuid>,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Inspect or change locally stored learner settings
    Settings {
        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: PathBuf,
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Walk through the pre-lesson survey
    Survey {
        #[arg(short, long)]
        topic: String,
        #[arg(short, long, default_value = "en")]
        language: String,
    },
    /// Print simulated proctoring alerts, then the session's integrity report
    Proctor {
        #[arg(short, long, default_value_t = 5)]
        ticks: usize,
        #[arg(long, default_value_t = 5000)]
        period_ms: u64,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Theme {
        mode: ThemeMode,
        /// Platform dark-mode preference used by `system`
        #[arg(long)]
        prefers_dark: bool,
    },
    Toggle {
        #[arg(long)]
        prefers_dark: bool,
    },
    Name {
        name: String,
    },
}

impl Command {
    /// `serve` logs where its config says; the others print their result on
    /// stdout, so their logs go to stderr.
    fn log_output(&self) -> Option<LogOutput> {
        match self {
            Command::Serve { .. } => None,
            _ => Some(LogOutput::Stderr),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = cli.command.log_output().map(init_log).transpose()?;
    match cli.command {
        Command::Serve { config } => {
            let config = Config::load(config)?;
            let _guard = init_log(config.log_dir.clone().into())?;
            info!(?config, "starting learnova");
            server::serve(config).await
        }
        Command::Token {
            config,
            user,
            hours,
        } => {
            let config = Config::load(config)?;
            let secret = config
                .auth
                .jwt_secret
                .ok_or_else(|| anyhow::anyhow!("auth.jwt_secret (or JWT_SECRET) is not set"))?;
            let user = UserId(user.unwrap_or_else(Uuid::new_v4));
            let token = issue_token(secret.as_bytes(), user, time::Duration::hours(hours))?;
            println!("user:  {user}");
            println!("token: {token}");
            Ok(())
        }
        Command::Settings { store, action } => {
            settings(SettingsStore::new(FileStore::open(store)), action)
        }
        Command::Survey { topic, language } => survey(topic, language).await,
        Command::Proctor { ticks, period_ms } => {
            proctor(ticks, Duration::from_millis(period_ms)).await
        }
    }
}

fn settings(store: SettingsStore<FileStore>, action: SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&store.load())?);
            println!("name:   {}", store.display_name());
            println!("avatar: {}", store.avatar_url());
        }
        SettingsAction::Theme { mode, prefers_dark } => {
            let mut view = PresentationState {
                platform_prefers_dark: prefers_dark,
                dark: false,
            };
            store.apply_theme(mode, &mut view);
            let mut settings = store.load();
            settings.appearance.theme = mode;
            store.save(&settings)?;
            println!("dark: {}", view.dark);
        }
        SettingsAction::Toggle { prefers_dark } => {
            let mut view = PresentationState {
                platform_prefers_dark: prefers_dark,
                dark: false,
            };
            let theme = store.toggle_theme(&mut view);
            println!("theme: {}", theme.as_str());
        }
        SettingsAction::Name { name } => {
            store.set_display_name(&name)?;
            println!("name: {}", store.display_name());
        }
    }
    Ok(())
}

async fn survey(topic: String, language: String) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut flow = SurveyFlow::new(topic.clone());
    loop {
        let (position, total) = flow.progress();
        println!("\n[{position}/{total}] {}", flow.prompt());
        for (i, option) in flow.current().options.iter().enumerate() {
            let mark = if flow.current_answer() == Some(option.value) { '*' } else { ' ' };
            println!(" {mark} {}. {}", i + 1, option.label);
        }
        println!("(number or value to answer, empty line to continue, 'b' to go back)");
        let Some(line) = lines.next_line().await? else {
            anyhow::bail!("survey aborted");
        };
        match line.trim() {
            "b" => {
                flow.retreat();
                continue;
            }
            "" => {}
            input => {
                let value = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| flow.current().options.get(i))
                    .map(|o| o.value)
                    .unwrap_or(input);
                if let Err(e) = flow.answer(value) {
                    println!("{e}");
                    continue;
                }
            }
        }
        flow = match flow.advance() {
            Advance::Next(flow) => flow,
            Advance::Blocked(flow) => {
                println!("pick an answer first");
                flow
            }
            Advance::Complete(answers) => {
                println!("{}", serde_json::to_string_pretty(&answers)?);
                let request = answers.lesson_request(&topic, &language);
                println!("{}", serde_json::to_string_pretty(&request)?);
                return Ok(());
            }
        };
    }
}

async fn proctor(ticks: usize, period: Duration) -> anyhow::Result<()> {
    let started_at = now_utc();
    let (tx, mut rx) = mpsc::channel(16);
    let runner = tokio::spawn(ProctorFeed::with_rng().run(period, tx));
    // the start notice, then `ticks` alerts
    for _ in 0..=ticks {
        let Some(alert) = rx.recv().await else {
            break;
        };
        println!("{} {alert}", alert.at.format(&Rfc3339)?);
    }
    drop(rx);
    runner.abort();
    let ended_at = now_utc();
    let session = ProctorSession {
        id: Uuid::new_v4().to_string(),
        user_id: "local".to_string(),
        test_name: "Local practice session".to_string(),
        started_at,
        ended_at: Some(ended_at),
    };
    let report = simulate_report(&mut rng(), &session, ended_at);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_output(args: &[&str]) -> Option<LogOutput> {
        let cli = Cli::parse_from(std::iter::once("learnova").chain(args.iter().copied()));
        cli.command.log_output()
    }

    #[test]
    fn printing_commands_log_to_stderr() {
        assert_eq!(log_output(&["settings", "show"]), Some(LogOutput::Stderr));
        assert_eq!(log_output(&["settings", "theme", "dark"]), Some(LogOutput::Stderr));
        assert_eq!(log_output(&["token"]), Some(LogOutput::Stderr));
        assert_eq!(log_output(&["survey", "--topic", "Algebra"]), Some(LogOutput::Stderr));
        assert_eq!(log_output(&["proctor", "--ticks", "1"]), Some(LogOutput::Stderr));
        assert_eq!(log_output(&["serve"]), None);
    }
}
