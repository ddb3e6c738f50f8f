use std::io::Write;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{info, warn};

use spelltale::config::Config;
use spelltale::engine::content_client::ContentClient;
use spelltale::engine::engine::ReaderEngine;
use spelltale::engine::event_log::StoryEventLog;
use spelltale::engine::identity::{FileStore, KeyValueStore, MemoryStore, SessionIdentity};
use spelltale::engine::protocol::{ReaderCommand, ReaderResponse};
use spelltale::engine::realtime::{RealtimeChannel, WsConnector};
use spelltale::engine::reveal::RevealTiming;
use spelltale::engine::scheduler::{Scheduler, ThreadScheduler};
use spelltale::engine::session::{ReadingSession, SessionOutput};
use spelltale::engine::transport::{HttpTransport, ReqwestTransport};
use spelltale::engine::world_client::WorldClient;
use spelltale::logging;
use spelltale::model::story_event::{StoryEvent, StoryEventKind};

/// Read a generated story in the terminal.
#[derive(Debug, Parser)]
#[command(name = "spelltale", version)]
struct Cli {
    /// Story service base URL (overrides settings and environment)
    #[arg(long)]
    base_url: Option<String>,

    /// Stop after this many pages have been read
    #[arg(long, default_value_t = 3)]
    pages: u32,

    /// Also follow live events from this world
    #[arg(long, env = "SPELLTALE_WORLD")]
    world: Option<String>,

    /// Reuse the reader identity saved from a previous run
    #[arg(long)]
    resume: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::load().context("loading configuration")?;
    if let Some(url) = cli.base_url.clone() {
        config = config.with_base_url(url);
        config.validate()?;
    }

    let store: Arc<dyn KeyValueStore> = if cli.resume {
        Arc::new(FileStore::default_location())
    } else {
        Arc::new(MemoryStore::new())
    };

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.request_timeout)?);
    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let client = ContentClient::new(
        config.clone(),
        transport.clone(),
        SessionIdentity::reader(store),
        scheduler.clone(),
    );

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (resp_tx, resp_rx) = mpsc::channel();

    thread::spawn(move || {
        let mut engine = ReaderEngine::new(client, cmd_rx, resp_tx);
        engine.run();
    });

    let _channel = cli
        .world
        .as_deref()
        .map(|world_id| {
            show_cast(&config, transport.clone(), world_id);
            follow_world(&config, scheduler.clone(), world_id)
        });

    cmd_tx.send(ReaderCommand::Start)?;
    let mut session = ReadingSession::new(RevealTiming::from(&config), cli.pages);

    match resp_rx.recv()? {
        ReaderResponse::ConnectionError(reason) => {
            bail!(
                "cannot reach the story service at {}: {reason}",
                config.base_url
            );
        }
        started @ ReaderResponse::Started { .. } => {
            render(&session.on_response(started), &cmd_tx)?;
        }
        other => bail!("unexpected engine response: {other:?}"),
    }

    let mut last = Instant::now();
    while !session.is_done() {
        thread::sleep(config.reveal_tick);
        let now = Instant::now();
        render(&session.tick(now - last), &cmd_tx)?;
        last = now;

        while let Ok(resp) = resp_rx.try_recv() {
            render(&session.on_response(resp), &cmd_tx)?;
        }
    }

    info!(pages_read = session.pages_read(), "done reading");
    Ok(())
}

fn render(outputs: &[SessionOutput], cmd_tx: &mpsc::Sender<ReaderCommand>) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for output in outputs {
        match output {
            SessionOutput::ChapterTitle { title, read_time } => {
                writeln!(out, "== {title} ({read_time}) ==")?;
            }
            SessionOutput::PageHeader {
                page_number,
                total_pages,
            } => {
                if *total_pages > 0 {
                    writeln!(out, "\n[page {page_number} of {total_pages}]")?;
                } else {
                    writeln!(out, "\n[page {page_number}]")?;
                }
            }
            SessionOutput::Text(text) => write!(out, "{text}")?,
            SessionOutput::PageEnd => writeln!(out)?,
            SessionOutput::RequestNextPage => cmd_tx.send(ReaderCommand::NextPage)?,
        }
    }
    out.flush()?;
    Ok(())
}

/// Print the world's characters to stderr before following its events.
fn show_cast(config: &Config, transport: Arc<dyn HttpTransport>, world_id: &str) {
    let gm = SessionIdentity::game_master(Arc::new(MemoryStore::new()));
    let client = WorldClient::new(config.clone(), transport, gm);

    // Failures are already logged by the client.
    let Ok(list) = client.get_characters(world_id) else {
        return;
    };
    for c in &list.characters {
        eprintln!(
            "{} ({}): health {}, energy {}, mood {}",
            c.name,
            c.role,
            c.health(),
            c.energy(),
            c.mood()
        );
    }
}

fn follow_world(config: &Config, scheduler: Arc<dyn Scheduler>, world_id: &str) -> RealtimeChannel {
    let channel = RealtimeChannel::new(config, Arc::new(WsConnector::new()), scheduler);
    let log = Arc::new(Mutex::new(StoryEventLog::with_capacity(100)));

    let handle = channel.connect(world_id, move |message| {
        let mut log = log.lock();
        if let Some(event) = log.apply(&message) {
            match &event.character {
                Some(name) => eprintln!("\n<{}> {}: {}", world_label(event), name, event.content),
                None => eprintln!("\n<{}> {}", world_label(event), event.content),
            }
        }
    });

    if handle.is_open() {
        channel.request_world_state();
    } else {
        warn!(world_id, "world events unavailable");
    }
    channel
}

fn world_label(event: &StoryEvent) -> &'static str {
    match event.kind {
        StoryEventKind::Scene => "scene",
        StoryEventKind::Action => "action",
        _ => "event",
    }
}
