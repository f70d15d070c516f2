use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::mpsc;

use remedy::config::RemedyConfig;
use remedy::db::Database;
use remedy::{
    load_config, logging, ActiveJobSession, ClearSessionOnFinish, ConfigError, JobId, JobPoller,
    JobQuery, JobRecord, JobStatus, JobStore, PollObserver, PollState, PollerConfig,
    SessionStore, SqliteJobStore,
};

const USAGE: &str = "usage: remedy <config.json> status <job-id>
       remedy <config.json> watch [<job-id>]
       remedy <config.json> list [<status>]";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> remedy::Result<ExitCode> {
    let [config_path, command, rest @ ..] = args else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    let config = load_config(config_path)?;
    logging::init(&config.log_level, config.log_json)?;

    let db_path = config
        .resolved_database_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "cannot determine database path, set database_path".to_string(),
        })?;
    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(Database::open(&db_path)?));

    match (command.as_str(), rest) {
        ("status", [job_id]) => {
            let job = store.get(&JobId::from(job_id.as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(ExitCode::SUCCESS)
        }
        ("list", [] | [_]) => {
            let status = match rest.first() {
                Some(s) => Some(JobStatus::parse(s).ok_or_else(|| ConfigError::Validation {
                    message: format!("unknown status '{}'", s),
                })?),
                None => None,
            };
            let query = JobQuery {
                status,
                limit: Some(50),
                ..JobQuery::default()
            };
            let jobs = store.list(&query).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(ExitCode::SUCCESS)
        }
        ("watch", [] | [_]) => watch(&config, store, rest.first()).await,
        _ => {
            eprintln!("{}", USAGE);
            Ok(ExitCode::from(2))
        }
    }
}

enum Seen {
    Done,
    Error(String),
}

/// Logs progress and forwards the end of the watch to `main`.
struct CliObserver {
    tx: mpsc::UnboundedSender<Seen>,
}

impl PollObserver for CliObserver {
    fn on_update(&self, record: &JobRecord) {
        info!(
            "{} {}% ({}/{}) ok={} failed={} skipped={}{}",
            record.status,
            record.progress,
            record.processed_items,
            record.total_items,
            record.success_count,
            record.failed_count,
            record.skipped_count,
            record
                .current_item
                .as_deref()
                .map(|item| format!(" current={}", item))
                .unwrap_or_default()
        );
    }

    fn on_done(&self, record: &JobRecord) {
        info!(
            "Job {} finished: {} succeeded, {} failed, {} skipped",
            record.id, record.success_count, record.failed_count, record.skipped_count
        );
        if let Some(failure) = record.last_failure() {
            info!("Last failure: {} ({})", failure.reason, failure.item_id);
        }
        let _ = self.tx.send(Seen::Done);
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(Seen::Error(message.to_string()));
    }
}

async fn watch(
    config: &RemedyConfig,
    store: Arc<dyn JobStore>,
    explicit: Option<&String>,
) -> remedy::Result<ExitCode> {
    let sessions = config.resolved_session_path().map(SessionStore::new);

    let job_id = match explicit {
        Some(id) => {
            let job = store.get(&JobId::from(id.as_str())).await?;
            if let Some(sessions) = &sessions {
                if !job.is_finished() {
                    sessions.save(&ActiveJobSession::new(job.id.clone(), &job.target_key))?;
                }
            }
            job.id
        }
        None => {
            let saved = match &sessions {
                Some(sessions) => sessions.load()?,
                None => None,
            };
            match saved {
                Some(session) => {
                    info!("Resuming watch of job {} ({})", session.job_id, session.target_key);
                    session.job_id
                }
                None => {
                    eprintln!("no job id given and no saved session");
                    return Ok(ExitCode::from(2));
                }
            }
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let observer = CliObserver { tx };
    let poller = JobPoller::new(store, PollerConfig::from_config(config));

    match sessions {
        Some(sessions) => poller.start(
            job_id.clone(),
            ClearSessionOnFinish::new(observer, sessions, job_id),
        ),
        None => poller.start(job_id, observer),
    }

    while let Some(seen) = rx.recv().await {
        match seen {
            Seen::Done => return Ok(ExitCode::SUCCESS),
            Seen::Error(message) if poller.state() == PollState::Errored => {
                error!("{}", message);
                return Ok(ExitCode::FAILURE);
            }
            Seen::Error(message) => warn!("Fetch failed, retrying: {}", message),
        }
    }

    Ok(ExitCode::FAILURE)
}
