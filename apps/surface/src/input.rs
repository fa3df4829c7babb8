use anyhow::{anyhow, bail, Context, Result};
use shared::{
    domain::{ItemId, ManualItemId, TransitionKind},
    protocol::Button,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Press(Button),
    Status,
    Quit,
}

pub const HELP: &str = "next | stop | pause | preview <item> | arm <cut|mix|wipe|stinger> | \
arm-manual <id> | preview-manual <id> | exec <id> | overlay <item> | clear <item> | status | quit";

/// Parses one line typed on the surface into a button press.
pub fn parse_line(line: &str) -> Result<Input> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        bail!("empty command");
    };
    let argument = words.next();
    let input = match command.to_ascii_lowercase().as_str() {
        "next" | "n" => Input::Press(Button::Next),
        "stop" => Input::Press(Button::Stop),
        "pause" | "p" => Input::Press(Button::Pause),
        "preview" => Input::Press(Button::Preview {
            item_id: ItemId(id(argument)?),
        }),
        "arm" => Input::Press(Button::ArmTransition {
            transition: transition(argument)?,
        }),
        "arm-manual" => Input::Press(Button::ArmManualItem {
            manual_item_id: ManualItemId(id(argument)?),
        }),
        "preview-manual" => Input::Press(Button::PreviewManualItem {
            manual_item_id: ManualItemId(id(argument)?),
        }),
        "exec" => Input::Press(Button::ExecuteManualItem {
            manual_item_id: ManualItemId(id(argument)?),
        }),
        "overlay" => Input::Press(Button::TriggerOverlay {
            overlay_id: ItemId(id(argument)?),
        }),
        "clear" => Input::Press(Button::ClearOverlay {
            overlay_id: ItemId(id(argument)?),
        }),
        "status" | "s" => Input::Status,
        "quit" | "exit" | "q" => Input::Quit,
        other => bail!("unknown command '{other}'"),
    };
    Ok(input)
}

fn id(argument: Option<&str>) -> Result<i64> {
    let raw = argument.ok_or_else(|| anyhow!("missing id"))?;
    raw.parse().with_context(|| format!("'{raw}' is not an id"))
}

fn transition(argument: Option<&str>) -> Result<TransitionKind> {
    match argument.map(str::to_ascii_lowercase).as_deref() {
        Some("cut") => Ok(TransitionKind::Cut),
        Some("mix") => Ok(TransitionKind::Mix),
        Some("wipe") => Ok(TransitionKind::Wipe),
        Some("stinger") => Ok(TransitionKind::Stinger),
        Some(other) => bail!("unknown transition '{other}'"),
        None => bail!("missing transition"),
    }
}
