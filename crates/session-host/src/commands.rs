use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use session_core::machine::{MachineDescription, MachineLoader};
use session_core::{
    ConfigRef, EngineLoader, LoopbackLoader, SessionController, SessionState, StopReason,
};
use tracing::{debug, info};

use crate::cli::{Command, RenderArgs, RunArgs, SourceArgs};
use crate::console::Console;

const STDIN_CHUNK: usize = 4096;
const DRAIN_POLL: Duration = Duration::from_millis(2);
const DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Executes one parsed subcommand.
pub fn execute(command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Run(args) => run(args),
        Command::Check(args) => check(args),
        Command::Render(args) => render(args),
    }
}

/// Engine configuration ready to hand to a session.
///
/// Holds the rendered temporary file alive when the source is a machine
/// description.
struct PreparedConfig {
    path: PathBuf,
    _rendered: Option<MachineLoader>,
}

fn prepare(source: &SourceArgs) -> anyhow::Result<PreparedConfig> {
    match (&source.config, &source.machine) {
        (Some(config), _) => Ok(PreparedConfig {
            path: config.clone(),
            _rendered: None,
        }),
        (None, Some(machine)) => {
            let description = MachineDescription::from_path(machine)
                .with_context(|| format!("loading machine description {}", machine.display()))?;
            let base_dir = std::path::absolute(resolve_base_dir(
                machine,
                source.base_dir.as_deref(),
            ))
            .context("resolving image directory")?;
            let rendered = MachineLoader::load(&description, &base_dir)
                .context("rendering engine configuration")?;
            debug!(
                description = %machine.display(),
                config = %rendered.config_path().display(),
                "machine description rendered"
            );
            Ok(PreparedConfig {
                path: rendered.config_path().to_path_buf(),
                _rendered: Some(rendered),
            })
        }
        (None, None) => bail!("either --config or --machine is required"),
    }
}

fn resolve_base_dir(description: &Path, base_dir: Option<&Path>) -> PathBuf {
    base_dir.map_or_else(
        || {
            description
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf()
        },
        Path::to_path_buf,
    )
}

fn check(args: &SourceArgs) -> anyhow::Result<()> {
    let prepared = prepare(args)?;
    let config = ConfigRef::new(&prepared.path)?;
    LoopbackLoader
        .load(&config)
        .with_context(|| format!("checking {config}"))?;
    let shown = args.machine.as_deref().unwrap_or(&prepared.path);
    println!("ok: {}", shown.display());
    Ok(())
}

fn render(args: &RenderArgs) -> anyhow::Result<()> {
    let description = MachineDescription::from_path(&args.machine)
        .with_context(|| format!("loading machine description {}", args.machine.display()))?;
    let base_dir = std::path::absolute(resolve_base_dir(
        &args.machine,
        args.base_dir.as_deref(),
    ))
    .context("resolving image directory")?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(description.render(&base_dir).as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    let prepared = prepare(&args.source)?;
    let session = SessionController::new(&prepared.path)?;
    let console = Arc::new(Console::new(io::stdout()));
    session.set_delegate(&console);
    session
        .start()
        .with_context(|| format!("starting session for {}", prepared.path.display()))?;
    info!(config = %prepared.path.display(), "console attached");

    forward_stdin(&session)?;
    drain(&session, &*console, Duration::from_millis(args.drain_ms));
    let state = session.state();
    session.stop();

    match state {
        SessionState::Stopped(StopReason::EngineFault(fault)) => {
            bail!("session ended with {fault}")
        }
        other => {
            debug!(state = %other, "console detached");
            Ok(())
        }
    }
}

fn forward_stdin<L: EngineLoader>(session: &SessionController<L>) -> anyhow::Result<()> {
    let mut stdin = io::stdin().lock();
    let mut buffer = [0u8; STDIN_CHUNK];
    loop {
        let read = match stdin.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("reading stdin"),
        };
        if let Err(err) = session.write_data(&buffer[..read]) {
            debug!(error = %err, "session no longer accepts input");
            return Ok(());
        }
    }
}

/// Waits until queued input was consumed and every emitted chunk was handed
/// to the console, and the session stayed that way for `quiet`.
fn drain<L: EngineLoader, W: Write + Send>(
    session: &SessionController<L>,
    console: &Console<W>,
    quiet: Duration,
) {
    let deadline = Instant::now() + DRAIN_LIMIT;
    let mut idle_since: Option<Instant> = None;
    while Instant::now() < deadline {
        let snapshot = session.diagnostics();
        let state = session.state();
        let awaiting_terminal = state
            .stop_reason()
            .is_some_and(|reason| reason.was_started() && *reason != StopReason::Requested)
            && console.terminated().is_none();
        let settled = session.pending_input() == 0
            && snapshot.output_chunks
                == snapshot.delivered_chunks + snapshot.dropped_chunks + snapshot.delegate_panics
            && !awaiting_terminal;
        if settled {
            let since = *idle_since.get_or_insert_with(Instant::now);
            if state.is_stopped() || since.elapsed() >= quiet {
                return;
            }
        } else {
            idle_since = None;
        }
        thread::sleep(DRAIN_POLL);
    }
    debug!("output still pending after drain limit");
}
