//! The builtin scenes of an era-style game.
//!
//! Every builtin first runs the shared start step: a `<scene>_scene` hook
//! replaces the whole flow; otherwise `<scene>_event_start` is notified and
//! the builtin flow runs.

use tracing::{debug, warn};

use super::callback::{hook_name, HookKind, HookSpec};
use super::manager::{Scene, SceneContext};
use crate::save::{SaveData, SaveHeader};
use crate::{EraError, Result};

/// Input that leaves a menu.
pub const LEAVE: i64 = 100;

/// Commands understood by the base scene.
pub mod command {
    pub const TRAIN: i64 = 100;
    pub const SHOP: i64 = 101;
    pub const ABILITY_UP: i64 = 102;
    pub const SAVE_GAME: i64 = 103;
    pub const LOAD_GAME: i64 = 104;
    pub const TURN_END: i64 = 105;
    pub const TITLE: i64 = 199;
}

const PROMPT: &str = "> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinScene {
    Title,
    NewGame,
    Autosave,
    Base,
    Shop,
    Train,
    AbilityUp,
    TrainEnd,
    TurnEnd,
    LoadEnd,
    SaveGame,
    LoadGame,
}

use BuiltinScene::*;

enum Start {
    /// A `<scene>_scene` hook ran; carries the pending next scene.
    Replaced(Option<String>),
    Builtin,
}

impl BuiltinScene {
    pub const ALL: [BuiltinScene; 12] = [
        Title, NewGame, Autosave, Base, Shop, Train, AbilityUp, TrainEnd, TurnEnd, LoadEnd,
        SaveGame, LoadGame,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Title => "title",
            NewGame => "new_game",
            Autosave => "autosave",
            Base => "base",
            Shop => "shop",
            Train => "train",
            AbilityUp => "ability_up",
            TrainEnd => "train_end",
            TurnEnd => "turn_end",
            LoadEnd => "load_end",
            SaveGame => "save_game",
            LoadGame => "load_game",
        }
    }

    pub fn from_name(name: &str) -> Option<BuiltinScene> {
        Self::ALL.into_iter().find(|scene| scene.as_str() == name)
    }

    fn hook(self, kind: HookKind, detail: &str) -> String {
        hook_name(self.as_str(), kind, detail)
    }

    fn at_start(self, cx: &SceneContext<'_>) -> Result<Start> {
        if cx.callbacks.check_call(&self.hook(HookKind::Scene, ""))? {
            debug!("scene {} replaced by script", self.as_str());
            return Ok(Start::Replaced(cx.links.next()));
        }
        cx.callbacks.maybe_call(&self.hook(HookKind::Event, "start"))?;
        Ok(Start::Builtin)
    }

    /// Run the builtin flow and name the successor.
    fn run(self, cx: &mut SceneContext<'_>) -> Result<String> {
        let next = match self {
            Title => title(cx),
            NewGame => new_game(cx),
            Autosave => autosave(cx),
            Base => base(cx),
            Shop => shop(cx),
            Train => train(cx),
            AbilityUp => ability_up(cx),
            TrainEnd => train_end(cx),
            TurnEnd => turn_end(cx),
            LoadEnd => load_end(cx),
            SaveGame => return save_game(cx),
            LoadGame => return load_game(cx),
        }?;
        Ok(next.as_str().to_string())
    }
}

impl Scene for BuiltinScene {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn next(&self, cx: &mut SceneContext<'_>) -> Result<Option<String>> {
        match self.at_start(cx)? {
            Start::Replaced(next) => Ok(next),
            Start::Builtin => self.run(cx).map(Some),
        }
    }

    fn hooks(&self) -> &[HookSpec] {
        match self {
            Title => TITLE_HOOKS,
            NewGame => NEW_GAME_HOOKS,
            Autosave => AUTOSAVE_HOOKS,
            Base => BASE_HOOKS,
            Shop => SHOP_HOOKS,
            Train => TRAIN_HOOKS,
            AbilityUp => ABILITY_UP_HOOKS,
            TrainEnd => TRAIN_END_HOOKS,
            TurnEnd => TURN_END_HOOKS,
            LoadEnd => LOAD_END_HOOKS,
            SaveGame => SAVE_GAME_HOOKS,
            LoadGame => &[],
        }
    }
}

const TITLE_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::Replace, "menu")];
const NEW_GAME_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::User, "setup")];
const AUTOSAVE_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::Event, "saved")];
const BASE_HOOKS: &[HookSpec] = &[
    HookSpec::new(HookKind::User, "show_status"),
    HookSpec::new(HookKind::User, "show_menu"),
    HookSpec::new(HookKind::Replace, "command"),
];
const SHOP_HOOKS: &[HookSpec] = &[
    HookSpec::new(HookKind::User, "show_items"),
    HookSpec::new(HookKind::User, "buy"),
];
const TRAIN_HOOKS: &[HookSpec] = &[
    HookSpec::new(HookKind::Event, "begin"),
    HookSpec::new(HookKind::User, "show_commands"),
    HookSpec::new(HookKind::User, "command"),
];
const ABILITY_UP_HOOKS: &[HookSpec] = &[
    HookSpec::new(HookKind::User, "show"),
    HookSpec::new(HookKind::User, "command"),
];
const TRAIN_END_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::Event, "end")];
const TURN_END_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::User, "process")];
const LOAD_END_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::Event, "loaded")];
const SAVE_GAME_HOOKS: &[HookSpec] = &[HookSpec::new(HookKind::Event, "saved")];

fn title(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    if !cx.callbacks.check_call(&Title.hook(HookKind::Replace, "menu"))? {
        cx.print_line(&cx.game.title)?;
        cx.print_line("")?;
        cx.print_line("[0] New game")?;
        cx.print_line("[1] Load game")?;
    }
    loop {
        match cx.input_int(PROMPT)? {
            0 => return Ok(NewGame),
            1 => return Ok(LoadGame),
            _ => {}
        }
    }
}

fn new_game(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    cx.callbacks.caution_call(&NewGame.hook(HookKind::User, "setup"))?;
    Ok(Base)
}

fn base(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    loop {
        cx.callbacks
            .caution_call(&Base.hook(HookKind::User, "show_status"))?;
        cx.callbacks.caution_call(&Base.hook(HookKind::User, "show_menu"))?;

        let cmd = cx.input_int(PROMPT)?;
        let (called, handled) = cx
            .callbacks
            .check_call_bool_arg_int(&Base.hook(HookKind::Replace, "command"), cmd)?;
        if called && handled {
            return Ok(Base);
        }

        let next = match cmd {
            command::TRAIN => Train,
            command::SHOP => Shop,
            command::ABILITY_UP => AbilityUp,
            command::SAVE_GAME => SaveGame,
            command::LOAD_GAME => LoadGame,
            command::TURN_END => TurnEnd,
            command::TITLE => Title,
            _ => continue,
        };
        return Ok(next);
    }
}

fn shop(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    cx.callbacks
        .caution_call(&Shop.hook(HookKind::User, "show_items"))?;
    let item = cx.input_int(PROMPT)?;
    if item == LEAVE {
        return Ok(Base);
    }
    if !cx
        .callbacks
        .caution_call_bool_arg_int(&Shop.hook(HookKind::User, "buy"), item)?
    {
        cx.print_line("You can't buy that.")?;
    }
    Ok(Shop)
}

fn train(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    cx.callbacks.maybe_call(&Train.hook(HookKind::Event, "begin"))?;
    loop {
        cx.callbacks
            .caution_call(&Train.hook(HookKind::User, "show_commands"))?;
        let cmd = cx.input_int(PROMPT)?;
        if cmd == LEAVE {
            break;
        }
        if !cx
            .callbacks
            .caution_call_bool_arg_int(&Train.hook(HookKind::User, "command"), cmd)?
        {
            break;
        }
    }
    Ok(TrainEnd)
}

fn train_end(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    cx.callbacks.maybe_call(&TrainEnd.hook(HookKind::Event, "end"))?;
    Ok(if cx.game.ability_up { AbilityUp } else { TurnEnd })
}

/// Loops until the player leaves, so the previous scene stays the one that
/// led here.
fn ability_up(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    loop {
        cx.callbacks
            .caution_call(&AbilityUp.hook(HookKind::User, "show"))?;
        let cmd = cx.input_int(PROMPT)?;
        if cmd == LEAVE {
            break;
        }
        cx.callbacks
            .caution_call_bool_arg_int(&AbilityUp.hook(HookKind::User, "command"), cmd)?;
    }
    let after_training = cx.links.prev().as_deref() == Some(TrainEnd.as_str());
    Ok(if after_training { TurnEnd } else { Base })
}

fn turn_end(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    cx.callbacks
        .caution_call(&TurnEnd.hook(HookKind::User, "process"))?;
    Ok(if cx.game.autosave { Autosave } else { Base })
}

fn autosave(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    let data = cx.state.snapshot()?;
    let comment = format!("{} (autosave)", cx.game.title);
    cx.saves
        .save(&SaveData::new(cx.game.autosave_slot, comment, data))?;
    cx.callbacks
        .maybe_call(&Autosave.hook(HookKind::Event, "saved"))?;
    Ok(Base)
}

fn load_end(cx: &mut SceneContext<'_>) -> Result<BuiltinScene> {
    cx.callbacks
        .maybe_call(&LoadEnd.hook(HookKind::Event, "loaded"))?;
    Ok(Base)
}

enum Slot {
    Empty,
    Saved(SaveHeader),
    Unreadable,
}

fn slot_state(cx: &SceneContext<'_>, slot: u32) -> Slot {
    match cx.saves.header(slot) {
        Ok(Some(header)) => Slot::Saved(header),
        Ok(None) => Slot::Empty,
        Err(e) => {
            warn!("save slot {} is unreadable: {}", slot, e);
            Slot::Unreadable
        }
    }
}

/// Slots a menu offers. Loading also offers the autosave slot while
/// autosaving is on or the slot still holds data.
fn menu_slots(cx: &SceneContext<'_>, with_autosave: bool) -> Vec<u32> {
    let mut slots: Vec<u32> = (0..cx.game.save_slots).collect();
    if with_autosave {
        let autosave = cx.game.autosave_slot;
        if cx.game.autosave || !matches!(slot_state(cx, autosave), Slot::Empty) {
            slots.push(autosave);
        }
    }
    slots
}

fn list_slots(cx: &SceneContext<'_>, slots: &[u32]) -> Result<()> {
    for &slot in slots {
        let line = match slot_state(cx, slot) {
            Slot::Saved(header) => format!(
                "[{slot:2}] {} ({})",
                header.comment,
                header.saved_at.format("%Y-%m-%d %H:%M")
            ),
            Slot::Empty => format!("[{slot:2}] ----"),
            Slot::Unreadable => format!("[{slot:2}] (unreadable)"),
        };
        cx.print_line(&line)?;
    }
    cx.print_line(&format!("[{LEAVE}] Back"))
}

fn slot_of(slots: &[u32], input: i64) -> Option<u32> {
    u32::try_from(input).ok().filter(|slot| slots.contains(slot))
}

/// Scene to return to from a menu, falling back to `fallback`.
fn back(cx: &SceneContext<'_>, fallback: BuiltinScene) -> String {
    cx.links
        .prev()
        .filter(|prev| cx.links.is_registered(prev))
        .unwrap_or_else(|| fallback.as_str().to_string())
}

fn save_game(cx: &mut SceneContext<'_>) -> Result<String> {
    let slots = menu_slots(cx, false);
    list_slots(cx, &slots)?;
    loop {
        let input = cx.input_int(PROMPT)?;
        if input == LEAVE {
            return Ok(back(cx, Base));
        }
        let Some(slot) = slot_of(&slots, input) else {
            continue;
        };
        let data = cx.state.snapshot()?;
        cx.saves
            .save(&SaveData::new(slot, cx.game.title.clone(), data))?;
        cx.print_line(&format!("Saved to slot {slot}."))?;
        cx.callbacks
            .maybe_call(&SaveGame.hook(HookKind::Event, "saved"))?;
        return Ok(back(cx, Base));
    }
}

fn load_game(cx: &mut SceneContext<'_>) -> Result<String> {
    let slots = menu_slots(cx, true);
    list_slots(cx, &slots)?;
    loop {
        let input = cx.input_int(PROMPT)?;
        if input == LEAVE {
            return Ok(back(cx, Title));
        }
        let Some(slot) = slot_of(&slots, input) else {
            continue;
        };
        match slot_state(cx, slot) {
            Slot::Saved(_) => {}
            Slot::Empty => {
                cx.print_line("No data in that slot.")?;
                continue;
            }
            Slot::Unreadable => {
                cx.print_line("That slot cannot be read.")?;
                continue;
            }
        }
        let data = match cx.saves.load(slot) {
            Ok(data) => data,
            Err(EraError::Save(e)) => {
                warn!("failed to load slot {}: {}", slot, e);
                cx.print_line("That slot cannot be read.")?;
                continue;
            }
            Err(e) => return Err(e),
        };
        cx.state.restore(&data.data)?;
        debug!("loaded slot {}", slot);
        return Ok(LoadEnd.as_str().to_string());
    }
}
