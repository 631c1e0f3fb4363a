//! Line-oriented operator console: command parsing and status rendering.

use anyhow::{anyhow, bail};
use shared::{
    domain::{LaneId, LightReading},
    protocol::{IntersectionSnapshot, Notice},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Start,
    Stop,
    Duration(u32),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "commands: start | stop | duration <seconds> | status | help | quit";

pub fn parse_command(line: &str) -> anyhow::Result<OperatorCommand> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => OperatorCommand::Start,
        "stop" => OperatorCommand::Stop,
        "status" => OperatorCommand::Status,
        "help" | "?" => OperatorCommand::Help,
        "quit" | "exit" => OperatorCommand::Quit,
        "duration" => {
            let raw = words
                .next()
                .ok_or_else(|| anyhow!("usage: duration <seconds>"))?;
            let secs = raw
                .parse::<u32>()
                .map_err(|_| anyhow!("'{raw}' is not a whole number of seconds"))?;
            OperatorCommand::Duration(secs)
        }
        other => bail!("unknown command '{other}' ({HELP})"),
    };
    if words.next().is_some() {
        bail!("unexpected trailing input after '{verb}'");
    }
    Ok(command)
}

fn bulb(reading: LightReading) -> &'static str {
    match reading {
        LightReading::Red => "R--",
        LightReading::Yellow { lit: true } => "-Y-",
        LightReading::Yellow { lit: false } => "---",
        LightReading::Green => "--G",
    }
}

pub fn status_line(snapshot: &IntersectionSnapshot) -> String {
    let lanes = LaneId::all()
        .map(|lane| format!("lane {}:{}", lane.0 + 1, bulb(snapshot.reading(lane))))
        .collect::<Vec<_>>()
        .join("  ");
    let state = if snapshot.running { "running" } else { "stopped" };
    let mut line = format!(
        "[{state}] {lanes}  | remaining {}s (green {}s)",
        snapshot.countdown, snapshot.configured_secs
    );
    if let Some(pending) = snapshot.pending_secs {
        line.push_str(&format!(", next {pending}s"));
    }
    line
}

pub fn notice_line(notice: &Notice) -> String {
    match notice {
        Notice::Started {
            lane,
            duration_secs,
        } => format!("started at lane {} with {duration_secs}s green", lane.0 + 1),
        Notice::Stopped => "stopped: all lanes red".to_string(),
        Notice::Handoff { from, to } => format!("lane {} -> lane {}", from.0 + 1, to.0 + 1),
        Notice::DurationChanged { secs, deferred: false } => format!("green set to {secs}s"),
        Notice::DurationChanged { secs, deferred: true } => {
            format!("green set to {secs}s, applies after the next stop")
        }
        Notice::Fault(fault) => format!("fault on lane {}: {}", fault.lane.0 + 1, fault.message),
    }
}
