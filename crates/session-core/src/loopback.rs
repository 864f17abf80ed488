//! Built-in console loopback engine.
//!
//! Loads and validates a machine configuration the way a full-system engine
//! would, then acts as a serial console wired back to itself: every data
//! event submitted by the host is emitted as one output chunk.

use std::path::Path;

use tracing::{debug, info};

use crate::machine::MachineConfig;
use crate::{
    ConfigError, ConfigRef, Engine, EngineFault, EngineIo, EngineLoader, InputEvent, InputPoll,
};

/// Loader producing [`LoopbackEngine`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackLoader;

impl EngineLoader for LoopbackLoader {
    type Engine = LoopbackEngine;

    fn load(&self, config: &ConfigRef) -> Result<LoopbackEngine, ConfigError> {
        let machine = MachineConfig::from_path(config.path())?;
        machine.validate()?;
        let base_dir = config.path().parent().unwrap_or_else(|| Path::new("."));
        machine.verify_images(base_dir)?;
        let architecture = machine.machine()?;
        let memory_mib = machine.memory_size_mib()?;
        info!(config = %config, architecture, memory_mib, "loopback engine loaded");
        Ok(LoopbackEngine {
            machine,
            console_size: None,
        })
    }
}

/// Engine that echoes host console input back as guest output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackEngine {
    machine: MachineConfig,
    console_size: Option<(u16, u16)>,
}

impl LoopbackEngine {
    /// Configuration the engine was built from.
    #[must_use]
    pub const fn machine(&self) -> &MachineConfig {
        &self.machine
    }

    /// Latest console geometry reported by the host, as `(columns, rows)`.
    #[must_use]
    pub const fn console_size(&self) -> Option<(u16, u16)> {
        self.console_size
    }

    fn apply(&mut self, event: InputEvent, io: &EngineIo) {
        match event {
            InputEvent::Data(bytes) => {
                let len = bytes.len();
                if !io.output.emit(bytes) {
                    debug!(len, "echo dropped, notifier gone");
                }
            }
            InputEvent::Resize { columns, rows } => {
                debug!(columns, rows, "console resized");
                self.console_size = Some((columns, rows));
            }
        }
    }
}

impl Engine for LoopbackEngine {
    fn run(&mut self, io: &EngineIo) -> Result<(), EngineFault> {
        while !io.should_stop() {
            match io.input.next_timeout(io.poll_interval) {
                InputPoll::Event(event) => self.apply(event, io),
                InputPoll::Empty => {}
                InputPoll::Closed => break,
            }
        }
        debug!("loopback run loop exited");
        Ok(())
    }
}
