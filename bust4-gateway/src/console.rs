//! Line-oriented operator console on the USB serial port
//!
//! ```text
//! open | close | stop | pos <0-100> | cmd <hex>
//! raw <hex frame>
//! inf <NN:AA> <whose> <submenu> <run> <next> [data]
//! mcu <submenu> [data]
//! autoclose|photoclose|alwaysclose on|off
//! dump | stats | save | reset
//! ```

use std::io::BufRead;
use std::sync::mpsc::Sender;

use log::{info, warn};
use nice_bust4::interpreter::Setting;
use nice_bust4::CoverCall;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Cover(CoverCall),
    Control(u8),
    Raw(String),
    Inf {
        to: String,
        whose: String,
        submenu: String,
        run: String,
        next_data: String,
        data: String,
    },
    Mcu {
        submenu: String,
        data: String,
    },
    Setting(Setting, bool),
    Dump,
    Stats,
    Save,
    Reset,
}

/// Parse one console line. `Err` carries a message for the operator.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty line".to_string());
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("open", []) => ConsoleCommand::Cover(CoverCall::open()),
        ("close", []) => ConsoleCommand::Cover(CoverCall::close()),
        ("stop", []) => ConsoleCommand::Cover(CoverCall::stop()),
        ("pos", [percent]) => {
            let percent: f32 = percent
                .parse()
                .map_err(|_| format!("bad percent '{}'", percent))?;
            ConsoleCommand::Cover(CoverCall::position(percent / 100.0))
        }
        ("cmd", [code]) => ConsoleCommand::Control(
            u8::from_str_radix(code, 16).map_err(|_| format!("bad command code '{}'", code))?,
        ),
        ("raw", rest) if !rest.is_empty() => ConsoleCommand::Raw(rest.concat()),
        ("inf", [to, whose, submenu, run, next_data, data @ ..]) if data.len() <= 1 => {
            ConsoleCommand::Inf {
                to: to.to_string(),
                whose: whose.to_string(),
                submenu: submenu.to_string(),
                run: run.to_string(),
                next_data: next_data.to_string(),
                data: data.concat(),
            }
        }
        ("mcu", [submenu, data @ ..]) if data.len() <= 1 => ConsoleCommand::Mcu {
            submenu: submenu.to_string(),
            data: data.concat(),
        },
        ("autoclose", [state]) => ConsoleCommand::Setting(Setting::AutoClose, parse_switch(state)?),
        ("photoclose", [state]) => {
            ConsoleCommand::Setting(Setting::PhotoClose, parse_switch(state)?)
        }
        ("alwaysclose", [state]) => {
            ConsoleCommand::Setting(Setting::AlwaysClose, parse_switch(state)?)
        }
        ("dump", []) => ConsoleCommand::Dump,
        ("stats", []) => ConsoleCommand::Stats,
        ("save", []) => ConsoleCommand::Save,
        ("reset", []) => ConsoleCommand::Reset,
        _ => return Err(format!("unrecognised command '{}'", line.trim())),
    };
    Ok(command)
}

fn parse_switch(word: &str) -> Result<bool, String> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        _ => Err(format!("expected on/off, got '{}'", word)),
    }
}

/// Read stdin forever, forwarding parsed commands.
pub fn console_task(tx: Sender<ConsoleCommand>) {
    info!("Console ready");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console read failed: {}", e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(command) => {
                if tx.send(command).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Console: {}", e),
        }
    }
}
