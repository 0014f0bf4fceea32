//! # Command Line
//!
//! Runs a single request session from JSON files, for scripting and CI:
//!
//! - `getman-dispatch send request.json --env env.json --interval 5 --ticks 3`
//! - `getman-dispatch export request.json` prints the equivalent curl command

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use getman_dispatch::channel::{DispatchScope, StreamRegistry, STREAM_PROTOCOL};
use getman_dispatch::dispatch::{DispatchContext, Event, Orchestrator, SessionHandle};
use getman_dispatch::environment::{Environment, TemplateRenderer};
use getman_dispatch::http::client::HttpBackend;
use getman_dispatch::http::request::RequestDefinition;
use getman_dispatch::notify::{LogNotifier, Notifier, RequestStats};
use getman_dispatch::plugins::PluginPipeline;
use getman_dispatch::settings::Settings;
use getman_dispatch::shortcuts::parse_seconds;
use getman_dispatch::storage::{self, SqliteStore};
use getman_dispatch::{DispatchError, Result};

const LOCAL_ORGANIZATION: &str = "org_local";
const LOCAL_PROJECT: &str = "proj_local";

#[derive(Parser, Debug)]
#[command(name = "getman-dispatch")]
#[command(about = "Send Getman requests now, after a delay, or on an interval")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log dispatch decisions at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SQLite database to load requests into (defaults to .getman/getman.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Settings file (defaults to .getman/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a request, or connect if it is an event stream
    Send {
        /// Request definition as JSON
        request: PathBuf,
        /// Environment to render with, as JSON
        #[arg(short, long, value_name = "FILE")]
        environment: Option<PathBuf>,
        /// Wait this many seconds before sending
        #[arg(long, value_name = "SECS", value_parser = seconds, conflicts_with = "interval")]
        delay: Option<Duration>,
        /// Repeat every this many seconds
        #[arg(long, value_name = "SECS", value_parser = seconds)]
        interval: Option<Duration>,
        /// Interval dispatches to wait for before stopping
        #[arg(long, default_value_t = 1, value_name = "N")]
        ticks: u64,
        /// Write the response body to the download directory
        #[arg(long)]
        download: bool,
    },
    /// Print the rendered request as a curl command
    Export {
        /// Request definition as JSON
        request: PathBuf,
        /// Environment to render with, as JSON
        #[arg(short, long, value_name = "FILE")]
        environment: Option<PathBuf>,
    },
}

fn seconds(input: &str) -> std::result::Result<Duration, String> {
    parse_seconds(input).ok_or_else(|| format!("`{input}` is not a positive number of seconds"))
}

/// What a `send` run waits for before exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Now { download: bool },
    Delay(Duration),
    Interval { period: Duration, ticks: u64 },
}

impl Trigger {
    fn from_args(
        delay: Option<Duration>,
        interval: Option<Duration>,
        ticks: u64,
        download: bool,
    ) -> Self {
        match (delay, interval) {
            (Some(delay), _) => Trigger::Delay(delay),
            (None, Some(period)) => Trigger::Interval {
                period,
                ticks: ticks.max(1),
            },
            (None, None) => Trigger::Now { download },
        }
    }

    fn event(self) -> Event {
        match self {
            Trigger::Now { download } => Event::ManualDispatch {
                prompt_for_post_download: download,
            },
            Trigger::Delay(delay) => Event::DelayRequested(delay),
            Trigger::Interval { period, .. } => Event::IntervalRequested(period),
        }
    }

    fn expected_dispatches(self) -> u64 {
        match self {
            Trigger::Interval { ticks, .. } => ticks,
            Trigger::Now { .. } | Trigger::Delay(_) => 1,
        }
    }
}

struct Runner {
    store: Arc<SqliteStore>,
    settings: Arc<Settings>,
    streams: Arc<StreamRegistry>,
    backend: Arc<HttpBackend>,
    orchestrator: Arc<Orchestrator>,
}

impl Runner {
    fn new(args: &Args) -> Result<Self> {
        let settings_path = args.settings.clone().unwrap_or_else(Settings::default_path);
        let mut settings = Settings::load(&settings_path)?;
        if let Commands::Send { download: true, .. } = &args.command {
            if settings.download_path.is_none() {
                settings.set_download_path(Some(storage::data_dir().join("downloads")));
            }
        }
        let settings = Arc::new(settings);

        let database = args.database.clone().unwrap_or_else(storage::default_database_path);
        let store = Arc::new(SqliteStore::open(&database)?);
        let streams = Arc::new(StreamRegistry::new());
        let backend = Arc::new(HttpBackend::new(&settings, streams.clone())?);

        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(TemplateRenderer::new(notifier.clone())),
            Arc::new(PluginPipeline::new(settings.plugins.clone(), notifier.clone())),
            backend.clone(),
            streams.clone(),
            store.clone(),
            notifier,
            Arc::new(RequestStats::new()),
        ));

        Ok(Self {
            store,
            settings,
            streams,
            backend,
            orchestrator,
        })
    }

    fn context(
        &self,
        request: &RequestDefinition,
        environment_id: Option<String>,
    ) -> DispatchContext {
        DispatchContext {
            scope: DispatchScope {
                organization_id: LOCAL_ORGANIZATION.into(),
                project_id: LOCAL_PROJECT.into(),
                workspace_id: request.workspace_id.clone(),
                request_id: request.id.clone(),
            },
            environment_id,
            cookie_jars: self.store.clone(),
            settings: self.settings.clone(),
        }
    }

    async fn send(
        &self,
        request: RequestDefinition,
        environment_id: Option<String>,
        trigger: Trigger,
    ) -> Result<ExitCode> {
        let ctx = self.context(&request, environment_id);
        let session = SessionHandle::new(self.orchestrator.clone(), ctx, request.clone());

        if request.is_event_stream() {
            return self.stream(&session, trigger).await;
        }

        info!(request_id = %request.id, ?trigger, "starting session");
        session.send(trigger.event());
        let expected = trigger.expected_dispatches();
        let mut changes = session.subscribe();
        tokio::select! {
            finished = changes.wait_for(|s| s.completed >= expected) => {
                finished.map_err(|_| DispatchError::SessionClosed)?;
            }
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                warn!("interrupted");
            }
        }
        session.shutdown();

        match self.backend.last_response() {
            Some(response) => {
                println!(
                    "{}  ({} ms, {} bytes)",
                    response.status, response.duration_ms, response.size_bytes
                );
                println!("{}\n", response.headers);
                println!("{}", response.body);
                if let Some(path) = response.downloaded_to {
                    eprintln!("saved to {}", path.display());
                }
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::FAILURE),
        }
    }

    /// Connect, print stream data until Ctrl-C, then disconnect.
    async fn stream(&self, session: &SessionHandle, trigger: Trigger) -> Result<ExitCode> {
        let mut chunks = self.backend.subscribe_streams();
        session.send(trigger.event());
        eprintln!("{} (Ctrl-C to disconnect)", session.button_label());

        loop {
            tokio::select! {
                chunk = chunks.recv() => match chunk {
                    Ok(chunk) => print!("{}", chunk.data),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stream output lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted?;
                    break;
                }
            }
        }

        session.shutdown();
        let request_id = &session.context().scope.request_id;
        let open = self.streams.is_ready(request_id, STREAM_PROTOCOL);
        info!(%request_id, open, "disconnected");
        Ok(ExitCode::SUCCESS)
    }

    async fn export(
        &self,
        request: RequestDefinition,
        environment_id: Option<String>,
    ) -> Result<ExitCode> {
        let ctx = self.context(&request, environment_id);
        match self.orchestrator.export_curl(&ctx, &request).await? {
            Some(curl) => {
                println!("{curl}");
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::FAILURE),
        }
    }
}

/// Store the request (and environment, if given) so the pipeline can load
/// them. Returns the request and the environment id to render with.
fn load_inputs(
    store: &SqliteStore,
    request_path: &Path,
    environment_path: Option<&Path>,
) -> Result<(RequestDefinition, Option<String>)> {
    let request: RequestDefinition = serde_json::from_str(&fs::read_to_string(request_path)?)?;
    store.upsert_request(&request)?;

    let Some(environment_path) = environment_path else {
        return Ok((request, None));
    };
    let mut environment: Environment =
        serde_json::from_str(&fs::read_to_string(environment_path)?)?;
    if environment.workspace_id.is_empty() {
        environment.workspace_id = request.workspace_id.clone();
    }
    store.upsert_environment(&environment, false)?;
    Ok((request, Some(environment.id)))
}

pub async fn run(args: Args) -> Result<ExitCode> {
    let runner = Runner::new(&args)?;
    match args.command {
        Commands::Send {
            request,
            environment,
            delay,
            interval,
            ticks,
            download,
        } => {
            let (request, environment_id) =
                load_inputs(&runner.store, &request, environment.as_deref())?;
            let trigger = Trigger::from_args(delay, interval, ticks, download);
            runner.send(request, environment_id, trigger).await
        }
        Commands::Export { request, environment } => {
            let (request, environment_id) =
                load_inputs(&runner.store, &request, environment.as_deref())?;
            runner.export(request, environment_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interval_send() {
        let args = Args::try_parse_from([
            "getman-dispatch",
            "send",
            "req.json",
            "--interval",
            "2.5",
            "--ticks",
            "3",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        let Commands::Send { interval, ticks, .. } = args.command else {
            panic!("expected send");
        };
        assert_eq!(interval, Some(Duration::from_millis(2500)));
        assert_eq!(ticks, 3);
    }

    #[test]
    fn delay_and_interval_conflict() {
        let result = Args::try_parse_from([
            "getman-dispatch",
            "send",
            "req.json",
            "--delay",
            "1",
            "--interval",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_positive_seconds() {
        let args = ["getman-dispatch", "send", "req.json", "--delay", "0"];
        assert!(Args::try_parse_from(args).is_err());
    }

    #[test]
    fn trigger_follows_flags() {
        let second = Duration::from_secs(1);
        assert_eq!(
            Trigger::from_args(None, None, 1, true).event(),
            Event::ManualDispatch {
                prompt_for_post_download: true
            }
        );
        assert_eq!(Trigger::from_args(Some(second), None, 4, false).expected_dispatches(), 1);
        let interval = Trigger::from_args(None, Some(second), 0, false);
        assert_eq!(interval.event(), Event::IntervalRequested(second));
        assert_eq!(interval.expected_dispatches(), 1);
    }

    #[test]
    fn load_inputs_stores_request_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let request_path = dir.path().join("req.json");
        let environment_path = dir.path().join("env.json");
        fs::write(
            &request_path,
            r#"{"id":"req_1","workspaceId":"wrk_1","url":"https://{{ host }}/x"}"#,
        )
        .unwrap();
        fs::write(
            &environment_path,
            r#"{"id":"env_dev","variables":[{"key":"host","value":"dev.example.com"}]}"#,
        )
        .unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let (request, environment_id) =
            load_inputs(&store, &request_path, Some(environment_path.as_path())).unwrap();

        assert_eq!(request.id, "req_1");
        assert_eq!(environment_id.as_deref(), Some("env_dev"));
        assert_eq!(store.load_request("req_1").unwrap(), Some(request));
    }
}
