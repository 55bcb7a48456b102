//! Line-based control console used while playing
//!
//! ```text
//! set <part> <param> <value>   frequency | amplitude | volume | pan | mute
//! assign <part> <engine>       oscillator | granular | spectral
//! clear <part>
//! panic
//! status
//! quit
//! ```

use anyhow::{anyhow, bail, Result};

use locus::engine::EngineManager;
use locus::synth::{build_engine, EngineKind};

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Set { part: String, param: String, value: f32 },
    Assign { part: String, engine: EngineKind },
    Clear { part: String },
    Panic,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            [] => return Ok(None),
            ["set", part, param, value] => ConsoleCommand::Set {
                part: part.to_string(),
                param: param.to_ascii_lowercase(),
                value: value
                    .parse()
                    .map_err(|_| anyhow!("'{}' is not a number", value))?,
            },
            ["assign", part, engine] => ConsoleCommand::Assign {
                part: part.to_string(),
                engine: engine.parse()?,
            },
            ["clear", part] => ConsoleCommand::Clear {
                part: part.to_string(),
            },
            ["panic"] => ConsoleCommand::Panic,
            ["status"] => ConsoleCommand::Status,
            ["help"] | ["?"] => ConsoleCommand::Help,
            ["quit"] | ["exit"] => ConsoleCommand::Quit,
            [word, ..] => bail!("unknown command '{}' (try 'help')", word),
        };
        Ok(Some(command))
    }

    /// Apply the command, returning text to show the user
    pub fn execute(
        &self,
        manager: &mut EngineManager,
        buffer_duration: f32,
    ) -> Result<Option<String>> {
        match self {
            ConsoleCommand::Set { part, param, value } => {
                manager.set_param(part, param, *value)?;
                Ok(None)
            }
            ConsoleCommand::Assign { part, engine } => {
                let engine = build_engine(*engine, manager.sample_rate(), buffer_duration);
                manager.assign_engine(part, engine)?;
                Ok(None)
            }
            ConsoleCommand::Clear { part } => {
                manager.clear_engine(part)?;
                Ok(None)
            }
            ConsoleCommand::Panic => {
                manager.panic()?;
                Ok(None)
            }
            ConsoleCommand::Status => {
                let snapshot = serde_json::to_string_pretty(&manager.snapshot())?;
                Ok(Some(snapshot))
            }
            ConsoleCommand::Help => Ok(Some(HELP.trim().to_string())),
            ConsoleCommand::Quit => Ok(None),
        }
    }
}

const HELP: &str = r#"
set <part> <param> <value>   frequency | amplitude | volume | pan | mute
assign <part> <engine>       oscillator | granular | spectral
clear <part>                 remove the part's engine
panic                        silence every part
status                       print a JSON snapshot
quit                         stop playback and exit
"#;
